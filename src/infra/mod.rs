//! Infrastructure adapters for the messaging boundary.

pub mod broker;
pub use broker::InMemoryBroker;
