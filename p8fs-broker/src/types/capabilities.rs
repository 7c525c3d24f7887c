use serde::{Deserialize, Serialize};

/// Explicit feature detection for a `Broker` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerCapabilities {
    /// Topology (streams/consumers) can be provisioned at runtime.
    pub ensure_topology: bool,
    /// Redelivery on nak/ack-wait-expiry is honored.
    pub redelivery: bool,
    /// Messages are durable across a process restart.
    pub durable: bool,
}

impl BrokerCapabilities {
    pub fn in_memory() -> Self {
        Self {
            ensure_topology: true,
            redelivery: true,
            durable: false,
        }
    }

    pub fn durable_broker() -> Self {
        Self {
            ensure_topology: true,
            redelivery: true,
            durable: true,
        }
    }
}
