use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Context carried through every broker operation, for tracing and
/// per-tenant log correlation. The broker itself has no tenant isolation
/// concept (streams/subjects are shared); this exists purely for
/// observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerCtx {
    pub trace_id: Option<String>,
    pub request_id: Option<String>,
    pub tags: HashMap<String, String>,
}

impl BrokerCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_tag(mut self, key: String, value: String) -> Self {
        self.tags.insert(key, value);
        self
    }
}
