use std::sync::Arc;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};

use crate::errors::{Error, Result};
use crate::ingest::Ingestor;
use crate::payload::{BatchUpload, RawReading};

pub const READING_TOPIC: &str = "vitals/reading";
pub const BATCH_TOPIC: &str = "vitals/batch";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

pub async fn run_mqtt(
    broker: String,
    port: u16,
    client_id: String,
    ingestor: Arc<Ingestor>,
) -> Result<()> {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 1000);

    let topic = "vitals/#";
    client.subscribe(topic, QoS::AtLeastOnce).await?;
    info!("Subscribed to {} with QoS 1", topic);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );

                match process_message_with_retry(&ingestor, &publish.topic, &publish.payload).await {
                    Ok(()) => {}
                    Err(e) if e.is_request_error() => {
                        warn!("Rejected message on {}: {}", publish.topic, e);
                    }
                    Err(e) => {
                        error!("Failed to process message on {}: {}", publish.topic, e);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                // rumqttc reconnects on the next poll
                error!("MQTT error: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Retries storage failures with exponential backoff. Request errors are
/// final: the same payload would be rejected again.
async fn process_message_with_retry(ingestor: &Ingestor, topic: &str, payload: &[u8]) -> Result<()> {
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match process_message(ingestor, topic, payload).await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Message processed successfully on attempt {}", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES || !e.is_retryable() {
                    return Err(e);
                }

                warn!(
                    "Message processing failed (attempt {}/{}): {}. Retrying in {}ms...",
                    attempt, MAX_RETRIES, e, backoff_ms
                );
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}

async fn process_message(ingestor: &Ingestor, topic: &str, payload: &[u8]) -> Result<()> {
    match topic {
        READING_TOPIC => {
            let raw = RawReading::from_value(serde_json::from_slice(payload)?)?;
            let user_id = raw.user_id()?;
            let outcome = ingestor.ingest_one(user_id, &raw).await?;
            debug!(reading_id = outcome.reading_id, "Reading ingested from MQTT");
            Ok(())
        }
        BATCH_TOPIC => {
            let upload: BatchUpload = serde_json::from_slice(payload)?;
            let outcome = ingestor.ingest_upload(upload).await?;
            debug!(
                saved = outcome.saved_readings,
                total = outcome.total_readings,
                "Batch ingested from MQTT"
            );
            Ok(())
        }
        other => Err(Error::MalformedPayload(format!("unsupported topic {other}"))),
    }
}
