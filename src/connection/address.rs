//! Backend address parsing
//!
//! Supports formats:
//! * host:port
//! * host (default port 5432)
//! * [ipv6]:port and [ipv6]

use crate::protocol::constants::DEFAULT_PORT;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Host and port of the backend SQL node serving a session.
///
/// Resolution from a tenant name to an address happens outside this crate;
/// the host may be a DNS name or an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddress {
    host: String,
    port: u16,
}

impl BackendAddress {
    /// Create an address from parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host[:port]`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("backend address is empty".into()));
        }

        // Bracketed IPv6 literal
        if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                Error::Config(format!("unterminated IPv6 literal in address '{}'", s))
            })?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => {
                    let port = after.strip_prefix(':').ok_or_else(|| {
                        Error::Config(format!("unexpected characters after ']' in '{}'", s))
                    })?;
                    parse_port(port, s)?
                }
            };
            return Self::checked(host, port, s);
        }

        match s.rsplit_once(':') {
            // More than one colon without brackets: bare IPv6 literal
            Some((host, _)) if host.contains(':') => Self::checked(s, DEFAULT_PORT, s),
            Some((host, port)) => Self::checked(host, parse_port(port, s)?, s),
            None => Self::checked(s, DEFAULT_PORT, s),
        }
    }

    fn checked(host: &str, port: u16, original: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::Config(format!(
                "backend address '{}' has no host",
                original
            )));
        }
        Ok(Self::new(host, port))
    }

    /// Host name or IP literal (without brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_port(port: &str, original: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::Config(format!(
            "invalid port '{}' in backend address '{}'",
            port, original
        ))),
        Ok(p) => Ok(p),
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BackendAddress {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<std::net::SocketAddr> for BackendAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}
