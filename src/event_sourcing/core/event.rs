use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::error::StoreError;

// ============================================================================
// Event Envelope - Typed Event + Metadata
// ============================================================================
//
// Wraps domain events with the metadata proper event sourcing needs.
// This is GENERIC and works with ANY event type.
//
// ============================================================================

/// Generic event envelope - wraps any domain event with metadata.
///
/// Type Parameter:
/// - `E`: The domain event type (must implement DomainEvent trait)
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub stream_id: Uuid,
    pub version: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation (for distributed tracing)
    pub causation_id: Option<Uuid>,      // What command/event caused this
    pub correlation_id: Uuid,            // Groups related events across streams

    // Timing
    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        stream_id: Uuid,
        version: i64,
        event_type: String,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            stream_id,
            version,
            event_type,
            event_version: E::event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Serialize into the form backend drivers persist.
    pub fn into_record(self) -> Result<RecordedEvent, StoreError> {
        let payload = serde_json::to_string(&self.event_data)?;
        Ok(RecordedEvent {
            event_id: self.event_id,
            stream_id: self.stream_id,
            version: self.version,
            event_type: self.event_type,
            event_version: self.event_version,
            payload,
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
            recorded_at: self.timestamp,
        })
    }
}

// ============================================================================
// Recorded Event - The Driver-Boundary Form
// ============================================================================

/// Serialized event as exchanged with backend drivers.
///
/// The store maps typed envelopes to records on append and back on read;
/// drivers never see domain types, only JSON payloads.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub event_id: Uuid,
    pub stream_id: Uuid,
    pub version: i64,
    pub event_type: String,
    pub event_version: i32,
    pub payload: String,
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// Deserialize back into a typed envelope, upcasting old payloads first.
    pub fn into_envelope<E: DomainEvent>(
        self,
        upcaster: Option<&dyn EventUpcaster>,
    ) -> Result<EventEnvelope<E>, StoreError> {
        let payload = match upcaster {
            Some(up) if self.event_version < E::event_version() => {
                up.upcast(self.event_version, &self.payload)?
            }
            _ => self.payload,
        };

        let event_data: E = serde_json::from_str(&payload)?;

        Ok(EventEnvelope {
            event_id: self.event_id,
            stream_id: self.stream_id,
            version: self.version,
            event_type: self.event_type,
            event_version: self.event_version,
            event_data,
            causation_id: self.causation_id,
            correlation_id: self.correlation_id,
            timestamp: self.recorded_at,
        })
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Generic domain event trait.
///
/// All domain events must implement this trait to be used with the event store.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    fn event_type() -> &'static str where Self: Sized;

    /// Current payload schema version. Bump when the JSON shape changes.
    fn event_version() -> i32 where Self: Sized { 1 }
}

// ============================================================================
// Event Versioning Support
// ============================================================================

/// Upcaster hook for evolving event schemas.
///
/// Called on read for any record whose stored `event_version` is older than
/// the current one; must rewrite the payload JSON into the current shape.
pub trait EventUpcaster: Send + Sync {
    fn upcast(&self, from_version: i32, payload: &str) -> Result<String, StoreError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct TestEvent {
        data: String,
    }

    impl DomainEvent for TestEvent {
        fn event_type() -> &'static str { "TestEvent" }
        fn event_version() -> i32 { 2 }
    }

    struct TestUpcaster;

    impl EventUpcaster for TestUpcaster {
        fn upcast(&self, from_version: i32, payload: &str) -> Result<String, StoreError> {
            // v1 stored the field under "value"
            assert_eq!(from_version, 1);
            let mut json: serde_json::Value = serde_json::from_str(payload)?;
            if let Some(obj) = json.as_object_mut() {
                if let Some(v) = obj.remove("value") {
                    obj.insert("data".to_string(), v);
                }
            }
            Ok(serde_json::to_string(&json)?)
        }
    }

    #[test]
    fn test_envelope_creation() {
        let stream_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let event = TestEvent {
            data: "test".to_string(),
        };

        let envelope = EventEnvelope::new(
            stream_id,
            1,
            TestEvent::event_type().to_string(),
            event,
            correlation_id,
        );

        assert_eq!(envelope.stream_id, stream_id);
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.event_type, "TestEvent");
        assert_eq!(envelope.event_version, 2);
        assert_eq!(envelope.correlation_id, correlation_id);
        assert!(envelope.causation_id.is_none());
    }

    #[test]
    fn test_envelope_record_round_trip() {
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            3,
            "TestEvent".to_string(),
            TestEvent { data: "payload".to_string() },
            Uuid::new_v4(),
        )
        .with_causation(Uuid::new_v4());

        let record = envelope.clone().into_record().unwrap();
        assert_eq!(record.version, 3);
        assert!(record.payload.contains("payload"));

        let back: EventEnvelope<TestEvent> = record.into_envelope(None).unwrap();
        assert_eq!(back.event_id, envelope.event_id);
        assert_eq!(back.event_data, envelope.event_data);
        assert_eq!(back.causation_id, envelope.causation_id);
    }

    #[test]
    fn test_upcaster_rewrites_old_payloads() {
        let record = RecordedEvent {
            event_id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            version: 1,
            event_type: "TestEvent".to_string(),
            event_version: 1,
            payload: r#"{"value":"legacy"}"#.to_string(),
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
        };

        let envelope: EventEnvelope<TestEvent> =
            record.into_envelope(Some(&TestUpcaster)).unwrap();
        assert_eq!(envelope.event_data.data, "legacy");
    }

    #[test]
    fn test_current_version_payload_skips_upcaster() {
        let record = RecordedEvent {
            event_id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            version: 1,
            event_type: "TestEvent".to_string(),
            event_version: 2,
            payload: r#"{"data":"current"}"#.to_string(),
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
        };

        // Upcaster asserts it is only called for v1 records.
        let envelope: EventEnvelope<TestEvent> =
            record.into_envelope(Some(&TestUpcaster)).unwrap();
        assert_eq!(envelope.event_data.data, "current");
    }

    #[test]
    fn test_bad_payload_is_serialization_error() {
        let record = RecordedEvent {
            event_id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            version: 1,
            event_type: "TestEvent".to_string(),
            event_version: 2,
            payload: "not json".to_string(),
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
        };

        let err = record.into_envelope::<TestEvent>(None).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
