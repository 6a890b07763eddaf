mod vitals;

use std::time::Duration;

use clap::Parser;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vitals::Device;

const READING_TOPIC: &str = "vitals/reading";
const BATCH_TOPIC: &str = "vitals/batch";

/// Publishes synthetic vital-sign readings to the ingestor over MQTT.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Devices are assigned to users 1..=users round robin.
    #[arg(long, env = "USERS", default_value_t = 1)]
    users: i64,

    #[arg(long, env = "DEVICES", default_value_t = 5)]
    devices: usize,

    /// Readings per second across all devices, at most 1000.
    #[arg(long, env = "RATE", default_value_t = 10)]
    rate: u64,

    /// Chance per tick that a device loses or regains connectivity.
    #[arg(long, env = "OFFLINE_PROBABILITY", default_value_t = 0.02)]
    offline_probability: f64,

    /// Offline readings buffered before the device forces an upload.
    #[arg(long, env = "MAX_BUFFER", default_value_t = 50)]
    max_buffer: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let users = args.users.max(1);
    let devices = args.devices.max(1);
    let rate = args.rate.clamp(1, 1000);
    let offline_probability = args.offline_probability.clamp(0.0, 1.0);

    info!("Starting vitals simulator");
    info!(
        "Broker: {}:{}, Rate: {} readings/s, Devices: {}, Users: {}",
        args.broker, args.port, rate, devices, users
    );

    let client_id = format!("vitals-sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 1000);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!("MQTT eventloop error: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("Connected to MQTT broker, starting to publish readings");

    let mut rng = rand::thread_rng();
    let mut fleet: Vec<Device> = (0..devices)
        .map(|i| Device::new(format!("ESP32_{:03}", i + 1), (i as i64 % users) + 1, &mut rng))
        .collect();
    let fleet_len = fleet.len();

    let tick = Duration::from_micros(1_000_000 / rate);
    let mut ticker = tokio::time::interval(tick);
    let mut published = 0u64;
    let mut next = 0usize;

    loop {
        ticker.tick().await;
        let device = &mut fleet[next];
        next = (next + 1) % fleet_len;

        let flip = rng.gen_bool(offline_probability);
        if device.offline && (flip || device.buffer.len() >= args.max_buffer) {
            device.offline = false;
            if let Some(batch) = device.drain_batch() {
                info!(
                    device_id = %batch.device_id,
                    readings = batch.readings.len(),
                    "Device back online, uploading buffered readings"
                );
                if publish(&client, BATCH_TOPIC, &batch).await {
                    published += 1;
                }
            }
        } else if !device.offline && flip {
            info!(device_id = %device.id, "Device went offline, buffering readings");
            device.offline = true;
        }

        let reading = device.sample(&mut rng);
        if device.offline {
            device.buffer.push(reading);
            continue;
        }

        if publish(&client, READING_TOPIC, &reading).await {
            published += 1;
            if published % 100 == 0 {
                info!("Published {} messages", published);
            }
        }
    }
}

async fn publish<T: Serialize>(client: &AsyncClient, topic: &str, message: &T) -> bool {
    let payload = match serde_json::to_vec(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            return false;
        }
    };

    match client.publish(topic, QoS::AtLeastOnce, false, payload).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to publish to {}: {}", topic, e);
            false
        }
    }
}
