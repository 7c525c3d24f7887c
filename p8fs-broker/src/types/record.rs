use serde::{Deserialize, Serialize};

use super::ids::AckToken;

/// One pulled, unacknowledged message. `raw_payload` is kept alongside
/// the parsed view so the router can republish it byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub subject: String,
    pub raw_payload: Vec<u8>,
    pub ack_token: AckToken,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
    pub published_at: i64,
}

impl Delivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}
