// Target specifiers (`user@host[:port]`) and their IPv4 addresses

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl Target {
    pub fn parse(spec: &str) -> AppResult<Self> {
        let spec = spec.trim();
        let invalid = || AppError::InvalidTarget(spec.to_string());

        let (user, rest) = match spec.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid()),
            None => (None, spec),
        };

        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (rest, None),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Target {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// Destination argument for ssh/scp, without the port
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// The IPv4 address used for route matching. Dotted quads are taken
    /// as-is; anything else goes through DNS.
    pub async fn resolve_ipv4(&self) -> AppResult<Ipv4Addr> {
        if let Ok(addr) = self.host.parse::<Ipv4Addr>() {
            return Ok(addr);
        }

        let addrs = tokio::net::lookup_host((self.host.as_str(), 0))
            .await
            .map_err(|e| {
                tracing::debug!("DNS lookup for {} failed: {}", self.host, e);
                AppError::AddressResolution(self.host.clone())
            })?;

        let found = addrs
            .filter_map(|sa| match sa.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next();

        match found {
            Some(addr) => {
                tracing::debug!("Resolved {} to {}", self.host, addr);
                Ok(addr)
            }
            None => Err(AppError::AddressResolution(self.host.clone())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.destination(), port),
            None => f.write_str(&self.destination()),
        }
    }
}
