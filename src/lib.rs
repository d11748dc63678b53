//! Protocol-detecting TCP connection multiplexer.
//!
//! Several unrelated services share one listening endpoint: each
//! accepted connection's first bytes are peeked (never consumed),
//! classified against an ordered set of protocol matchers, and the
//! full duplex stream is relayed to the backend bound to the first
//! matching rule. The multiplexer never terminates TLS, SSH, or any
//! other protocol; it only classifies and forwards raw bytes.

pub mod activation;
pub mod cli;
pub mod config;
pub mod error;
pub mod mux;

pub use config::HostPort;
pub use error::MuxError;
pub use mux::{
    peek_initial, BackendTarget, Dispatcher, Listener, ListenerSource, MatchRule, Matcher,
    MatcherRegistry, PeekedSegment,
};
