//! Provisioned stream/consumer topology for the storage event pipeline.
//!
//! Mirrors the tables in the original NATS stream/consumer managers:
//! one ingress stream fanning out into three size-tiered streams, each
//! with a single durable pull consumer.

use std::time::Duration;

/// Size tier a storage event is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Small,
    Medium,
    Large,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Small => "small",
            Tier::Medium => "medium",
            Tier::Large => "large",
        }
    }

    /// Binary (MiB/GiB) classification, per the resolved open question:
    /// `size < 100 MiB` small, `100 MiB <= size < 1 GiB` medium, else large.
    pub fn classify(size_bytes: i64) -> Tier {
        const MIB: i64 = 1024 * 1024;
        const GIB: i64 = 1024 * MIB;
        if size_bytes < 100 * MIB {
            Tier::Small
        } else if size_bytes < GIB {
            Tier::Medium
        } else {
            Tier::Large
        }
    }
}

/// Declarative definition of a durable stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub name: &'static str,
    pub subjects: &'static [&'static str],
    pub retention: Duration,
    pub max_consumers: i64,
}

/// Declarative definition of a durable pull consumer bound to a stream.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub name: &'static str,
    pub stream: &'static str,
    pub filter_subject: &'static str,
    pub ack_wait: Duration,
    pub max_deliver: i64,
    pub max_ack_pending: i64,
}

pub const INGRESS_SUBJECT: &str = "p8fs.storage.events";

pub const STREAM_INGRESS: StreamConfig = StreamConfig {
    name: "P8FS_STORAGE_EVENTS",
    subjects: &["p8fs.storage.events"],
    retention: Duration::from_secs(24 * 3600),
    max_consumers: 10,
};

pub const STREAM_SMALL: StreamConfig = StreamConfig {
    name: "P8FS_STORAGE_EVENTS_SMALL",
    subjects: &["p8fs.storage.events.small"],
    retention: Duration::from_secs(24 * 3600),
    max_consumers: 50,
};

pub const STREAM_MEDIUM: StreamConfig = StreamConfig {
    name: "P8FS_STORAGE_EVENTS_MEDIUM",
    subjects: &["p8fs.storage.events.medium"],
    retention: Duration::from_secs(24 * 3600),
    max_consumers: 20,
};

pub const STREAM_LARGE: StreamConfig = StreamConfig {
    name: "P8FS_STORAGE_EVENTS_LARGE",
    subjects: &["p8fs.storage.events.large"],
    retention: Duration::from_secs(48 * 3600),
    max_consumers: 5,
};

pub const CONSUMER_ROUTER: ConsumerConfig = ConsumerConfig {
    name: "router-consumer",
    stream: STREAM_INGRESS.name,
    filter_subject: "p8fs.storage.events",
    ack_wait: Duration::from_secs(60),
    max_deliver: 5,
    max_ack_pending: 200,
};

pub const CONSUMER_SMALL: ConsumerConfig = ConsumerConfig {
    name: "small-workers",
    stream: STREAM_SMALL.name,
    filter_subject: "p8fs.storage.events.small",
    ack_wait: Duration::from_secs(300),
    max_deliver: 3,
    max_ack_pending: 100,
};

pub const CONSUMER_MEDIUM: ConsumerConfig = ConsumerConfig {
    name: "medium-workers",
    stream: STREAM_MEDIUM.name,
    filter_subject: "p8fs.storage.events.medium",
    ack_wait: Duration::from_secs(600),
    max_deliver: 3,
    max_ack_pending: 50,
};

pub const CONSUMER_LARGE: ConsumerConfig = ConsumerConfig {
    name: "large-workers",
    stream: STREAM_LARGE.name,
    filter_subject: "p8fs.storage.events.large",
    ack_wait: Duration::from_secs(1800),
    max_deliver: 2,
    max_ack_pending: 10,
};

pub const STORAGE_STREAMS: &[StreamConfig] =
    &[STREAM_INGRESS, STREAM_SMALL, STREAM_MEDIUM, STREAM_LARGE];

pub const STORAGE_CONSUMERS: &[ConsumerConfig] =
    &[CONSUMER_ROUTER, CONSUMER_SMALL, CONSUMER_MEDIUM, CONSUMER_LARGE];

impl Tier {
    pub fn stream(&self) -> &'static StreamConfig {
        match self {
            Tier::Small => &STREAM_SMALL,
            Tier::Medium => &STREAM_MEDIUM,
            Tier::Large => &STREAM_LARGE,
        }
    }

    pub fn consumer(&self) -> &'static ConsumerConfig {
        match self {
            Tier::Small => &CONSUMER_SMALL,
            Tier::Medium => &CONSUMER_MEDIUM,
            Tier::Large => &CONSUMER_LARGE,
        }
    }

    pub fn subject(&self) -> &'static str {
        self.stream().subjects[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_at_mib_gib_boundaries() {
        const MIB: i64 = 1024 * 1024;
        const GIB: i64 = 1024 * MIB;
        assert_eq!(Tier::classify(0), Tier::Small);
        assert_eq!(Tier::classify(100 * MIB - 1), Tier::Small);
        assert_eq!(Tier::classify(100 * MIB), Tier::Medium);
        assert_eq!(Tier::classify(GIB - 1), Tier::Medium);
        assert_eq!(Tier::classify(GIB), Tier::Large);
    }

    #[test]
    fn tier_subjects_match_topology_table() {
        assert_eq!(Tier::Small.subject(), "p8fs.storage.events.small");
        assert_eq!(Tier::Medium.subject(), "p8fs.storage.events.medium");
        assert_eq!(Tier::Large.subject(), "p8fs.storage.events.large");
    }
}
