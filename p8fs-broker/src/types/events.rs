use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured observability events for broker state transitions. Shares
/// the same broadcast-channel consumption shape as `p8fs_core::events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BrokerEvent {
    StreamEnsured { stream: String, at: DateTime<Utc> },
    ConsumerEnsured { stream: String, consumer: String, at: DateTime<Utc> },
    Published { subject: String, at: DateTime<Utc> },
    Delivered { subject: String, delivery_count: u32, at: DateTime<Utc> },
    Acked { subject: String, at: DateTime<Utc> },
    Naked { subject: String, reason: String, at: DateTime<Utc> },
    Reconnecting { attempt: u32, at: DateTime<Utc> },
    Reconnected { at: DateTime<Utc> },
}

impl BrokerEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StreamEnsured { .. } => "stream_ensured",
            Self::ConsumerEnsured { .. } => "consumer_ensured",
            Self::Published { .. } => "published",
            Self::Delivered { .. } => "delivered",
            Self::Acked { .. } => "acked",
            Self::Naked { .. } => "naked",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Reconnected { .. } => "reconnected",
        }
    }
}
