//! MQTT protocol transports.
//!
//! This module contains transport implementations for MQTT brokers.
//! Currently supports:
//! - rumqttc - MQTT 3.1.1

#[cfg(feature = "transport_rumqttc")]
mod rumqttc;

/// Protocol name of the MQTT transport.
pub const MQTT_PROTOCOL: &str = "rumqttc";

#[cfg(feature = "transport_rumqttc")]
pub use self::rumqttc::mqtt_provider;

/// Provider stand-in used when the `transport_rumqttc` feature is disabled.
#[cfg(not(feature = "transport_rumqttc"))]
struct DisabledProvider;

#[cfg(not(feature = "transport_rumqttc"))]
impl crate::TransportProvider for DisabledProvider {
    fn name(&self) -> &'static str {
        MQTT_PROTOCOL
    }

    fn create(&self, _config: &crate::TransportConfig) -> crate::Result<Box<dyn crate::Transport>> {
        Err(crate::Error::Transport(
            "transport_rumqttc feature is not enabled".into(),
        ))
    }
}

/// Provider for MQTT transports; fails on `create` without the
/// `transport_rumqttc` feature.
#[cfg(not(feature = "transport_rumqttc"))]
pub fn mqtt_provider() -> crate::ProviderPtr {
    std::sync::Arc::new(DisabledProvider)
}

#[cfg(all(test, not(feature = "transport_rumqttc")))]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_disabled_provider_fails_on_create() {
        // ---
        let config = crate::TransportConfig {
            transport_id: "dev".into(),
            hub_name: "hub".into(),
            hub_suffix: "example.net".into(),
            protocol_gateway_host: None,
            keep_alive_secs: None,
        };
        assert!(matches!(
            mqtt_provider().create(&config),
            Err(crate::Error::Transport(_))
        ));
    }
}
