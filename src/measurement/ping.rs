//! ICMP ping strategy.
//!
//! [`PingProber`] runs the system `ping` tool and feeds its output through a
//! [`PingOutputParser`](crate::measurement::OutputParser) line by line.

mod executor;
mod parser;

pub use executor::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_PING_PROGRAM, PingProber, ping_args};
pub use parser::PingOutputParser;
