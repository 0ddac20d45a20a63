//! Address types for the external server directory seam.

use std::fmt;

/// One CM server endpoint as returned by the directory service. The
/// directory lookup itself is external; the client only consumes the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmServer {
    pub host: String,
    pub port: u16,
}

impl CmServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for CmServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
