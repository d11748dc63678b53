//! Protocol detection and dispatch engine.
//!
//! This module provides:
//! - Non-destructive capture of a connection's first bytes
//! - Ordered protocol matchers over the peeked segment
//! - Backend dial and bidirectional relay
//! - Listener management and accept loops
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> Peek Reader -> Matcher Registry -> Dial -> Relay -> Backend
//! ```
//!
//! Peeking leaves the bytes queued in the kernel, so the relay always
//! forwards the stream from its true beginning.

mod dispatch;
mod listener;
mod matcher;
mod peek;

pub use dispatch::Dispatcher;
pub use listener::{Listener, ListenerSource};
pub use matcher::{BackendTarget, MatchRule, Matcher, MatcherRegistry};
pub use peek::{peek_initial, PeekedSegment, CONTROL_CAPACITY, PEEK_CAPACITY};
