// tests/transport_memory.rs

use telemetry_client::{
    // ---
    provider_for,
    Batch,
    BatchResult,
    ClientStatus,
    DeviceConfig,
    Error,
    MemoryHub,
    Message,
    MessageDisposition,
    OptionValue,
    OutboundQueue,
    TransportConfig,
    TransportConsumer,
    TransportPtr,
};

/// Consumer with an empty outbound queue that only records inbound traffic.
#[derive(Default)]
struct InboundOnly {
    queue: OutboundQueue,
    inbound: Vec<String>,
    completions: usize,
}

impl TransportConsumer for InboundOnly {
    fn waiting_to_send(&mut self) -> &mut OutboundQueue {
        &mut self.queue
    }

    fn send_complete(&mut self, completed: Batch, _result: BatchResult) {
        self.completions += completed.len();
    }

    fn deliver_inbound(&mut self, message: &Message) -> MessageDisposition {
        // ---
        self.inbound
            .push(message.as_text().unwrap_or_default().to_string());
        MessageDisposition::Abandoned
    }
}

fn transport_config(id: &str) -> TransportConfig {
    // ---
    TransportConfig {
        transport_id: id.into(),
        hub_name: "hub".into(),
        hub_suffix: "example.net".into(),
        protocol_gateway_host: None,
        keep_alive_secs: None,
    }
}

#[test]
fn memory_provider_by_name_creates_transport() {
    // ---
    // Arrange
    // ---
    let provider = provider_for("memory").expect("memory provider");

    // ---
    // Act
    // ---
    let transport = provider
        .create(&transport_config("tmp-create"))
        .expect("failed to create memory transport");

    // ---
    // Assert
    // ---
    assert_eq!(transport.protocol(), "memory");
    assert_eq!(transport.transport_id(), "tmp-create");
    transport.destroy();
}

#[test]
fn memory_delivers_inbound_per_device() {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let transport: TransportPtr = hub.create_transport("tmp-inbound");

    let a = transport.register(&DeviceConfig::new("a", "key")).unwrap();
    let b = transport.register(&DeviceConfig::new("b", "key")).unwrap();
    transport.subscribe(&a).unwrap();
    transport.subscribe(&b).unwrap();

    hub.send_to_device("a", Message::from_text("for-a-1"));
    hub.send_to_device("b", Message::from_text("for-b"));
    hub.send_to_device("a", Message::from_text("for-a-2"));

    // ---
    // Act
    // ---
    let mut consumer_a = InboundOnly::default();
    transport.do_work(&a, &mut consumer_a);

    // ---
    // Assert
    // ---
    assert_eq!(consumer_a.inbound, vec!["for-a-1", "for-a-2"]);
    assert_eq!(consumer_a.completions, 0);
    assert_eq!(
        hub.dispositions("a"),
        vec![MessageDisposition::Abandoned, MessageDisposition::Abandoned]
    );
    assert!(hub.dispositions("b").is_empty());

    let mut consumer_b = InboundOnly::default();
    transport.do_work(&b, &mut consumer_b);
    assert_eq!(consumer_b.inbound, vec!["for-b"]);
}

#[test]
fn memory_unsubscribe_stops_delivery() {
    // ---
    let hub = MemoryHub::new();
    let transport = hub.create_transport("tmp-unsub");
    let device = transport.register(&DeviceConfig::new("d", "key")).unwrap();

    transport.subscribe(&device).unwrap();
    transport.unsubscribe(&device);
    hub.send_to_device("d", Message::from_text("held"));

    let mut consumer = InboundOnly::default();
    transport.do_work(&device, &mut consumer);
    assert!(consumer.inbound.is_empty());

    transport.subscribe(&device).unwrap();
    transport.do_work(&device, &mut consumer);
    assert_eq!(consumer.inbound, vec!["held"]);
}

#[test]
fn memory_status_and_options() {
    // ---
    let hub = MemoryHub::new();
    let transport = hub.create_transport("tmp-status");
    let device = transport.register(&DeviceConfig::new("d", "key")).unwrap();

    assert_eq!(
        transport
            .get_send_status(&device, &OutboundQueue::new())
            .unwrap(),
        ClientStatus::Idle
    );
    assert!(transport
        .set_option("batching", &OptionValue::Bool(true))
        .is_ok());
    assert!(matches!(
        transport.set_option("keepalive", &OptionValue::U64(10)),
        Err(Error::UnsupportedOption(_))
    ));

    transport.unregister(&device);
    assert!(transport
        .get_send_status(&device, &OutboundQueue::new())
        .is_err());
}
