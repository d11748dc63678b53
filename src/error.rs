//! Error types for the multiplexer.

use std::io;

use thiserror::Error;

/// Multiplexer errors.
///
/// Startup errors (`Argument`, `HostPortParse`, `RegexCompile`) are
/// fatal: the process reports them and exits without a partial run.
/// Connection errors (`Peek`, `Dial`, `ProtocolNotRecognized`) abandon
/// the single affected connection; the process keeps serving.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The command line could not be parsed.
    #[error("{0}")]
    Argument(String),

    /// A `[host:]port` specification could not be parsed.
    #[error("bad host:port specification '{spec}': {reason}")]
    HostPortParse { spec: String, reason: String },

    /// A `--regex` pattern failed to compile.
    #[error("failed to compile regular expression '{pattern}': {source}")]
    RegexCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Peeking the head of an accepted connection failed.
    #[error("peek failed: {0}")]
    Peek(#[source] io::Error),

    /// Dialing the resolved backend failed.
    #[error("dial {addr} failed: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// No matcher in the registry accepted the peeked bytes.
    #[error("protocol not recognized")]
    ProtocolNotRecognized,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
