//! Listen and backend address specifications.

use std::fmt;

use crate::error::MuxError;

/// A `[host:]port` specification from the command line.
///
/// A bare value with no `:` is the port, with the host defaulting to
/// `localhost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    /// Parse a `[host:]port` specification.
    pub fn parse(spec: &str) -> Result<Self, MuxError> {
        let (host, port_str) = match spec.split_once(':') {
            Some((host, port_str)) => (host, port_str),
            None => ("localhost", spec),
        };

        if host.is_empty() {
            return Err(MuxError::HostPortParse {
                spec: spec.to_string(),
                reason: "empty host".to_string(),
            });
        }

        let port = port_str
            .parse::<u16>()
            .map_err(|e| MuxError::HostPortParse {
                spec: spec.to_string(),
                reason: format!("bad port '{port_str}': {e}"),
            })?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Address to bind a listener on.
    ///
    /// `localhost` is rewritten to the wildcard address so a bare port
    /// spec listens on all interfaces. The rewrite applies to listener
    /// binds only; backend dial targets resolve `localhost` normally
    /// (see [`BackendTarget::addr`](crate::mux::BackendTarget::addr)).
    pub fn listen_addr(&self) -> String {
        if self.host == "localhost" {
            format!("0.0.0.0:{}", self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_port_defaults_to_localhost() {
        let hp = HostPort::parse("2222").unwrap();
        assert_eq!(hp.host, "localhost");
        assert_eq!(hp.port, 2222);
    }

    #[test]
    fn parse_host_and_port() {
        let hp = HostPort::parse("10.0.0.5:443").unwrap();
        assert_eq!(hp.host, "10.0.0.5");
        assert_eq!(hp.port, 443);
    }

    #[test]
    fn parse_rejects_bad_port() {
        assert!(matches!(
            HostPort::parse("example.com:notaport"),
            Err(MuxError::HostPortParse { .. })
        ));
        assert!(matches!(
            HostPort::parse("70000"),
            Err(MuxError::HostPortParse { .. })
        ));
    }

    #[test]
    fn parse_rejects_empty_host() {
        assert!(matches!(
            HostPort::parse(":22"),
            Err(MuxError::HostPortParse { .. })
        ));
    }

    #[test]
    fn localhost_listen_addr_binds_wildcard() {
        let hp = HostPort::parse("8080").unwrap();
        assert_eq!(hp.listen_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn explicit_host_listen_addr_unchanged() {
        let hp = HostPort::parse("127.0.0.1:8080").unwrap();
        assert_eq!(hp.listen_addr(), "127.0.0.1:8080");
    }
}
