//! Telemetry over the in-memory transport.
//!
//! Sends a handful of sensor readings, drives the client until every
//! reading is confirmed, then answers one cloud-to-device command.
//!
//! Run with: cargo run --example telemetry_memory

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use telemetry_client::{
    //
    memory_provider_with_hub,
    ClientBuilder,
    ClientStatus,
    ConfirmationResult,
    MemoryHub,
    Message,
    MessageDisposition,
};

#[derive(Debug, Serialize)]
struct Reading {
    sensor: &'static str,
    celsius: f64,
}

fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let hub = MemoryHub::new();
    let mut client = ClientBuilder::new()
        .connection_string("HostName=demo.azure-devices.net;DeviceId=thermostat;SharedAccessKey=ZGVtbw==")
        .provider(memory_provider_with_hub(hub.clone()))
        .message_timeout_ms(5_000)
        .build()?;

    let confirmed = Arc::new(Mutex::new(Vec::new()));

    for (n, celsius) in [20.5, 21.0, 21.75].into_iter().enumerate() {
        let body = serde_json::to_string(&Reading {
            sensor: "living-room",
            celsius,
        })?;
        let mut message = Message::from_text(body);
        message.set_message_id(format!("reading-{n}"));

        let confirmed = confirmed.clone();
        client.send_event_async(
            &message,
            Some(Box::new(move |result: ConfirmationResult, _| {
                confirmed.lock().unwrap().push((n, result));
            })),
            None,
        )?;
    }

    client.set_message_callback(
        Some(Box::new(|message, _| {
            println!("command received: {}", message.as_text().unwrap_or("<binary>"));
            MessageDisposition::Accepted
        })),
        None,
    )?;
    hub.send_to_device("thermostat", Message::from_text(r#"{"set_point":22.0}"#));

    // ---
    // Drive the client until nothing is queued or in flight.
    while client.get_send_status()? == ClientStatus::Busy {
        client.do_work();
        std::thread::sleep(Duration::from_millis(10));
    }
    client.do_work();

    for (n, result) in confirmed.lock().unwrap().iter() {
        println!("reading {n}: {result:?}");
    }
    println!("hub received {} message(s)", hub.received_count("thermostat"));

    Ok(())
}
