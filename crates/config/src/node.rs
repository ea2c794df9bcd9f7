//! Backend node identity
//!
//! A backend is identified by the triple (host, data port, management
//! port). Two specs with equal triples refer to the same logical backend
//! everywhere in the router.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identity of a downstream StatsD node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Hostname or IP of the node
    pub host: String,

    /// UDP port receiving metric data
    pub port: u16,

    /// TCP port answering `health` probes
    pub mgmt_port: u16,
}

impl NodeSpec {
    /// Create a node spec from its parts
    pub fn new(host: impl Into<String>, port: u16, mgmt_port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            mgmt_port,
        }
    }

    /// Address of the UDP data side, suitable for resolution
    pub fn data_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address of the TCP management side, suitable for resolution
    pub fn mgmt_addr(&self) -> String {
        format!("{}:{}", self.host, self.mgmt_port)
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.mgmt_port)
    }
}

impl FromStr for NodeSpec {
    type Err = ConfigError;

    /// Parse a `host:port:mgmt_port` string (the `--master` flag format)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(host), Some(port), Some(mgmt_port), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::invalid_node_spec(
                s,
                "expected exactly 3 parts in host:port:mgmt_port format",
            ));
        };

        if host.is_empty() {
            return Err(ConfigError::invalid_node_spec(s, "host is empty"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::invalid_node_spec(s, "port is not a valid u16"))?;
        let mgmt_port: u16 = mgmt_port
            .parse()
            .map_err(|_| ConfigError::invalid_node_spec(s, "mgmt_port is not a valid u16"))?;

        Ok(Self::new(host, port, mgmt_port))
    }
}
