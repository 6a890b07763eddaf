//! MQTT load tests against a running ingestor and broker on localhost.
//! Users 1..=10 must exist. Run with `--ignored`.

use chrono::Utc;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::sleep;

fn random_reading(user_id: i64, device_id: &str) -> Value {
    let mut rng = rand::thread_rng();
    json!({
        "user_id": user_id,
        "device_id": device_id,
        "body_temperature": rng.gen_range(96.5..101.5),
        "pulse_rate": rng.gen_range(55..135),
        "heart_rate": rng.gen_range(55..135),
        "spo2": rng.gen_range(86.0..100.0),
        "battery_level": rng.gen_range(5.0..100.0),
        "recorded_at": Utc::now().to_rfc3339(),
    })
}

async fn connect(client_id: &str) -> AsyncClient {
    let mut mqtt_options = MqttOptions::new(client_id, "localhost", 1883);
    mqtt_options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 20000);
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                eprintln!("MQTT error: {}", e);
                break;
            }
        }
    });

    sleep(Duration::from_millis(500)).await;
    client
}

#[tokio::test]
#[ignore]
async fn test_500_readings_per_second() {
    println!("\n🚀 Starting Load Test: 500 readings/s");

    let test_duration_secs = 10;
    let target_rate = 500;
    let total_messages = test_duration_secs * target_rate;

    let client = connect("vitals-load-test").await;

    let start = Instant::now();
    let mut sent_count = 0;
    let mut error_count = 0;

    let burst_size = 50;
    let delay_per_burst = Duration::from_micros((burst_size * 1_000_000) / target_rate as u64);

    for batch_start in (0..total_messages).step_by(burst_size as usize) {
        for i in batch_start..std::cmp::min(batch_start + burst_size, total_messages) {
            let user_id = (i % 10) as i64 + 1;
            let device_id = format!("load-test-dev-{}", i % 10);
            let payload = random_reading(user_id, &device_id).to_string();

            match client
                .publish("vitals/reading", QoS::AtLeastOnce, false, payload)
                .await
            {
                Ok(_) => sent_count += 1,
                Err(e) => {
                    error_count += 1;
                    if error_count < 10 {
                        eprintln!("Send error: {}", e);
                    }
                }
            }
        }

        sleep(delay_per_burst).await;
    }

    let duration = start.elapsed();
    let actual_rate = sent_count as f64 / duration.as_secs_f64();

    println!("\n📈 Results:");
    println!("  Total Sent:     {}", sent_count);
    println!("  Errors:         {}", error_count);
    println!("  Duration:       {:.2}s", duration.as_secs_f64());
    println!("  Actual Rate:    {:.2} msg/s", actual_rate);

    assert!(
        actual_rate >= 450.0,
        "Throughput too low: {:.2} msg/s (expected >= 450)",
        actual_rate
    );
    assert_eq!(error_count, 0, "Too many errors: {}", error_count);
}

#[tokio::test]
#[ignore]
async fn test_offline_batch_uploads() {
    println!("\n🚀 Starting Batch Upload Test: 200 uploads of 100 readings");

    let client = connect("vitals-load-test-batch").await;
    let start = Instant::now();
    let mut error_count = 0;

    for i in 0..200 {
        let user_id = (i % 10) as i64 + 1;
        let device_id = format!("load-test-dev-{}", i % 10);
        let readings: Vec<Value> = (0..100)
            .map(|_| random_reading(user_id, &device_id))
            .collect();
        let payload = json!({
            "user_id": user_id,
            "device_id": device_id,
            "readings": readings,
        })
        .to_string();

        if client
            .publish("vitals/batch", QoS::AtLeastOnce, false, payload)
            .await
            .is_err()
        {
            error_count += 1;
        }
        sleep(Duration::from_millis(10)).await;
    }

    println!("\n✅ Batch Test Complete in {:.2}s", start.elapsed().as_secs_f64());
    assert_eq!(error_count, 0);
}
