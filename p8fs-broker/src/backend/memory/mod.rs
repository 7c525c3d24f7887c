mod storage;

pub use storage::MemoryBroker;
