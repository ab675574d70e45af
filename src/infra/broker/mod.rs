//! Broker backends.

pub mod memory;

pub use memory::{
    InMemoryBroker, InMemoryIngressEndpoint, InMemorySchedulerEndpoint, InMemoryWorkerEndpoint,
    Route, EXCHANGE,
};
