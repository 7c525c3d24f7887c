//! p8fs-router: the C3 tiered router. Pulls events off the ingress
//! consumer, classifies them by size, and republishes unmodified to the
//! matching tier subject, acking only after the republish succeeds.

pub mod config;
pub mod error;
pub mod router;

pub use config::RouterConfig;
pub use error::{RouterError, RouterResult};
pub use router::run;
