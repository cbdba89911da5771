// Routes module - jump-host route table model, loading and resolution

pub mod lookup;
pub mod parser;

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// The network side of a route: a CIDR block or the `default` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Network {
    Cidr { address: Ipv4Addr, prefix_len: u8 },
    Default,
}

impl Network {
    pub fn is_default(&self) -> bool {
        matches!(self, Network::Default)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Cidr {
                address,
                prefix_len,
            } => write!(f, "{}/{}", address, prefix_len),
            Network::Default => f.write_str("default"),
        }
    }
}

/// How a matched target is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Connect straight to the target, no jump hosts
    Direct,
    /// Ordered `user@host[:port]` hops; never empty
    Hops(Vec<String>),
}

impl Chain {
    /// Hop list in the comma-separated form OpenSSH expects for `-J`
    pub fn proxy_jump(&self) -> Option<String> {
        match self {
            Chain::Direct => None,
            Chain::Hops(hops) => Some(hops.join(",")),
        }
    }

    pub fn first_hop(&self) -> Option<&str> {
        match self {
            Chain::Direct => None,
            Chain::Hops(hops) => hops.first().map(String::as_str),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Direct => f.write_str("direct"),
            Chain::Hops(hops) => f.write_str(&hops.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub network: Network,
    pub chain: Chain,
    pub description: Option<String>,
    /// Line (or JSON entry) the route was read from, 1-based
    pub line: usize,
}

/// Routes in file order. Loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteTable {
    pub routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        RouteTable { routes }
    }

    /// The first `default` entry; later ones are ignored
    pub fn default_route(&self) -> Option<&Route> {
        self.routes.iter().find(|r| r.network.is_default())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Outcome of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub route: &'a Route,
    pub via_default: bool,
}

impl Resolution<'_> {
    pub fn chain(&self) -> &Chain {
        &self.route.chain
    }
}
