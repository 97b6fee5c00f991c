//! Domain event abstractions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Closed set of aggregate types recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    /// A registered patient.
    Patient,
    /// A clinical visit.
    Visit,
    /// A booked appointment.
    Appointment,
    /// A prescription.
    Prescription,
    /// An uploaded document.
    Document,
    /// A free-form medical note.
    MedicalNote,
    /// A platform user.
    User,
    /// A hospital (tenant sub-unit).
    Hospital,
    /// A single bookable slot.
    AppointmentSlot,
    /// One run of the slot generator.
    SlotGeneration,
    /// A doctor profile.
    DoctorProfile,
    /// A recurring weekly schedule.
    DoctorSchedule,
    /// A per-date schedule override.
    ScheduleOverride,
    /// A leave request.
    LeaveRequest,
    /// A hospital holiday.
    Holiday,
    /// An emergency unavailability window.
    EmergencyUnavailability,
    /// An administrative forced block.
    ForcedBlock,
    /// A room.
    Room,
    /// A piece of equipment.
    Equipment,
}

impl AggregateType {
    /// Wire name as stored in the `aggregate_type` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Visit => "visit",
            Self::Appointment => "appointment",
            Self::Prescription => "prescription",
            Self::Document => "document",
            Self::MedicalNote => "medical_note",
            Self::User => "user",
            Self::Hospital => "hospital",
            Self::AppointmentSlot => "appointment_slot",
            Self::SlotGeneration => "slot_generation",
            Self::DoctorProfile => "doctor_profile",
            Self::DoctorSchedule => "doctor_schedule",
            Self::ScheduleOverride => "schedule_override",
            Self::LeaveRequest => "leave_request",
            Self::Holiday => "holiday",
            Self::EmergencyUnavailability => "emergency_unavailability",
            Self::ForcedBlock => "forced_block",
            Self::Room => "room",
            Self::Equipment => "equipment",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_owned()))
            .map_err(|_| DomainError::Infrastructure(format!("unknown aggregate type: {s}")))
    }
}

/// Client context captured at the command boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// User agent of the submitting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Source IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Device identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Metadata attached to every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlation ID for tracing a request through its effects.
    pub correlation_id: Uuid,
    /// ID of the command that caused this event.
    pub causation_id: Uuid,
    /// The acting user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    /// Client context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
    /// Forward-compatible extension values.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// A persisted, immutable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Global, strictly increasing log position.
    pub sequence: i64,
    /// Aggregate type of the stream.
    pub aggregate_type: AggregateType,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Version within the aggregate stream (starts at 1, gapless).
    pub aggregate_version: i64,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Payload schema version.
    pub schema_version: i32,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Tracing and actor metadata.
    pub metadata: EventMetadata,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Caller-supplied dedup token.
    pub idempotency_key: Option<String>,
    /// Time the store accepted the event.
    pub occurred_at: DateTime<Utc>,
}

/// An event awaiting persistence; the store assigns id, sequence and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    /// Aggregate type of the stream.
    pub aggregate_type: AggregateType,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Target version; must be exactly current version + 1.
    pub aggregate_version: i64,
    /// Event type name.
    pub event_type: String,
    /// Payload schema version.
    pub schema_version: i32,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Tracing and actor metadata.
    pub metadata: EventMetadata,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Caller-supplied dedup token.
    pub idempotency_key: Option<String>,
}

/// Trait that typed event enums implement.
///
/// Implementors are adjacently tagged enums
/// (`#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]`)
/// so the variant name doubles as the stored event type.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + fmt::Debug {
    /// Aggregate type whose stream carries these events.
    const AGGREGATE_TYPE: AggregateType;

    /// Returns the event type name (must match the serde tag).
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn schema_version(&self) -> i32 {
        1
    }

    /// Splits the event into its stored type name and payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    fn encode(&self) -> Result<(String, serde_json::Value), DomainError> {
        let value = serde_json::to_value(self)
            .map_err(|e| DomainError::Infrastructure(format!("event serialization failed: {e}")))?;
        let payload = match value {
            serde_json::Value::Object(mut map) => map
                .remove("payload")
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
            other => other,
        };
        Ok((self.event_type().to_owned(), payload))
    }

    /// Rebuilds the typed event from a stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the payload does not match.
    fn decode(event: &Event) -> Result<Self, DomainError> {
        let tagged = serde_json::json!({
            "event_type": event.event_type,
            "payload": event.payload,
        });
        serde_json::from_value(tagged).map_err(|e| {
            DomainError::Infrastructure(format!(
                "event deserialization failed for {} #{}: {e}",
                event.event_type, event.sequence
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Opened {
        label: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
    enum RoomEvent {
        RoomOpened(Opened),
    }

    impl DomainEvent for RoomEvent {
        const AGGREGATE_TYPE: AggregateType = AggregateType::Room;

        fn event_type(&self) -> &'static str {
            match self {
                Self::RoomOpened(_) => "room_opened",
            }
        }
    }

    fn stored(event_type: &str, payload: serde_json::Value) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            sequence: 7,
            aggregate_type: AggregateType::Room,
            aggregate_id: Uuid::new_v4(),
            aggregate_version: 1,
            event_type: event_type.to_owned(),
            schema_version: 1,
            payload,
            metadata: EventMetadata {
                correlation_id: Uuid::new_v4(),
                causation_id: Uuid::new_v4(),
                actor_id: None,
                client: None,
                extensions: serde_json::Map::new(),
            },
            tenant_id: Uuid::new_v4(),
            idempotency_key: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_encode_strips_tag_from_payload() {
        let event = RoomEvent::RoomOpened(Opened {
            label: "A-101".into(),
        });

        let (event_type, payload) = event.encode().unwrap();

        assert_eq!(event_type, "room_opened");
        assert_eq!(payload, serde_json::json!({ "label": "A-101" }));
    }

    #[test]
    fn test_decode_uses_stored_event_type() {
        let event = stored("room_opened", serde_json::json!({ "label": "B-2" }));

        let decoded = RoomEvent::decode(&event).unwrap();

        assert_eq!(
            decoded,
            RoomEvent::RoomOpened(Opened {
                label: "B-2".into()
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_event_type() {
        let event = stored("room_demolished", serde_json::json!({}));

        match RoomEvent::decode(&event) {
            Err(DomainError::Infrastructure(msg)) => assert!(msg.contains("room_demolished")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_type_round_trips_through_str() {
        let parsed: AggregateType = "emergency_unavailability".parse().unwrap();

        assert_eq!(parsed, AggregateType::EmergencyUnavailability);
        assert_eq!(parsed.as_str(), "emergency_unavailability");
        assert!("spaceship".parse::<AggregateType>().is_err());
    }
}
