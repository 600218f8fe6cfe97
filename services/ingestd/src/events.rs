//! Domain event derivation.
//!
//! Rules are evaluated independently per reading against the device's last
//! stored state; several events may come out of one reading. A device with
//! no prior state derives nothing from the ignition rule — absence of
//! history is not a transition.

use crate::store::LastDeviceState;
use rastro_protocol::{DomainEvent, EventType, NormalizedTelemetry};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventRules {
    /// Speeds strictly above this derive a SPEED_ALERT (km/h).
    pub speed_alert_threshold: f64,
}

impl Default for EventRules {
    fn default() -> Self {
        EventRules {
            speed_alert_threshold: 120.0,
        }
    }
}

/// Derive events for one reading.
pub fn derive_events(
    reading: &NormalizedTelemetry,
    last: Option<LastDeviceState>,
    rules: &EventRules,
) -> Vec<DomainEvent> {
    let mut events = Vec::new();

    if let (Some(ignition), Some(previous)) =
        (reading.ignition, last.and_then(|l| l.ignition))
    {
        if ignition != previous {
            events.push(event(
                reading,
                if ignition {
                    EventType::IgnitionOn
                } else {
                    EventType::IgnitionOff
                },
                serde_json::Map::new(),
            ));
        }
    }

    if reading.speed > rules.speed_alert_threshold {
        let mut metadata = serde_json::Map::new();
        metadata.insert("speed".to_owned(), json!(reading.speed));
        events.push(event(reading, EventType::SpeedAlert, metadata));
    }

    events
}

fn event(
    reading: &NormalizedTelemetry,
    event_type: EventType,
    metadata: serde_json::Map<String, serde_json::Value>,
) -> DomainEvent {
    DomainEvent {
        id: Uuid::new_v4(),
        device_serial_number: reading.device_serial_number.clone(),
        event_type,
        timestamp: reading.timestamp,
        latitude: reading.latitude,
        longitude: reading.longitude,
        metadata,
    }
}
