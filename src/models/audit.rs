use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "entity_kind", rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Offer,
    Booking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "event_actor", rename_all = "snake_case")]
pub enum EventActor {
    Customer,
    Driver,
    System,
}

/// Append-only record of a status change on a request, offer or booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StatusLog {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub status: String,
    pub note: String,
    pub actor_id: Option<Uuid>,
    pub changed_at: DateTime<Utc>,
}

impl StatusLog {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Uuid,
        status: impl Into<String>,
        note: impl Into<String>,
        actor_id: Option<Uuid>,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_kind,
            entity_id,
            status: status.into(),
            note: note.into(),
            actor_id,
            changed_at,
        }
    }
}

/// Request-level audit trail (`request_created`, `driver_offered`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestEvent {
    pub id: Uuid,
    pub request_id: Uuid,
    pub event_type: String,
    pub actor_type: EventActor,
    pub actor_id: Option<Uuid>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl RequestEvent {
    pub fn new(
        request_id: Uuid,
        event_type: &str,
        actor_type: EventActor,
        actor_id: Option<Uuid>,
        payload: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            event_type: event_type.to_string(),
            actor_type,
            actor_id,
            payload,
            created_at,
        }
    }
}
