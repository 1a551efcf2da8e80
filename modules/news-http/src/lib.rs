pub mod circuit;
pub mod client;
pub mod counters;
pub mod retry;
pub mod test_support;

pub use circuit::{Admission, BreakerState, CircuitBreaker};
pub use client::HttpClient;
pub use counters::{CounterSnapshot, Counters};
