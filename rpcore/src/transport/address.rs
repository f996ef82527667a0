//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Canonical network addresses.
//!
//! Pools and registries key their maps by the canonical form of an address
//! (`tcp://host:port`), so `Localhost:80` and `tcp://localhost:80` refer to
//! the same destination.

use crate::transport::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// Network protocol of an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Stream transport.
    #[default]
    Tcp,
    /// Datagram transport.
    Udp,
}

impl Network {
    /// Scheme used in the canonical form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved destination: host, port and network.
///
/// # Examples
///
/// ```rust
/// use rpcore::transport::{Network, RemoteAddress};
///
/// let a: RemoteAddress = "LocalHost:8080".parse().unwrap();
/// let b: RemoteAddress = "tcp://localhost:8080".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "tcp://localhost:8080");
/// assert_eq!(a.authority(), "localhost:8080");
///
/// let udp: RemoteAddress = "udp://[::1]:53".parse().unwrap();
/// assert_eq!(udp.network(), Network::Udp);
/// assert_eq!(udp.host(), "::1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteAddress {
    host: String,
    port: u16,
    network: Network,
}

impl RemoteAddress {
    /// Creates a TCP address. The host is lowercased.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
            network: Network::Tcp,
        }
    }

    /// Sets the network.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Host name or IP literal, without brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Network protocol.
    pub fn network(&self) -> Network {
        self.network
    }

    /// `host:port`, bracketing IPv6 literals, suitable for socket APIs.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.authority())
    }
}

impl FromStr for RemoteAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidConfiguration {
            reason: format!("invalid address '{}': {}", s, reason),
        };

        let (network, rest) = match s.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "tcp" => (Network::Tcp, rest),
                "udp" => (Network::Udp, rest),
                _ => return Err(invalid("unsupported scheme")),
            },
            None => (Network::Tcp, s),
        };

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;

        Ok(RemoteAddress::new(host, port).with_network(network))
    }
}

impl TryFrom<String> for RemoteAddress {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteAddress> for String {
    fn from(address: RemoteAddress) -> Self {
        address.to_string()
    }
}

impl From<SocketAddr> for RemoteAddress {
    fn from(addr: SocketAddr) -> Self {
        RemoteAddress::new(addr.ip().to_string(), addr.port())
    }
}
