pub mod ids;
pub mod ctx;
pub mod record;
pub mod capabilities;
pub mod events;

pub use ids::{AckToken, ConsumerName, StreamName};
pub use ctx::BrokerCtx;
pub use record::Delivery;
pub use capabilities::BrokerCapabilities;
pub use events::BrokerEvent;
/// The broker re-uses the pipeline-wide storage event model rather than
/// defining its own: router and workers both parse this same type.
pub use p8fs_core::{StorageEvent, StorageEventType as EventType};
