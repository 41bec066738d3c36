//! TCP ping strategy.

mod prober;

pub use prober::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT, TcpPingData, TcpProber, aggregate};
