// Route lookup engine with first-match-wins semantics

use super::{Network, Resolution, RouteTable};
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no route found for {0} and no default route configured")]
    NoRouteFound(Ipv4Addr),
}

/// Pick the route for `dest`.
///
/// Non-default routes are tested in file order and the first containing
/// `dest` wins, regardless of how specific later entries are. Only when
/// none match is the first `default` route used.
pub fn resolve(dest: Ipv4Addr, table: &RouteTable) -> Result<Resolution<'_>, ResolveError> {
    for route in &table.routes {
        if let Network::Cidr {
            address,
            prefix_len,
        } = route.network
        {
            if ip_v4_matches(address, dest, prefix_len) {
                tracing::debug!("{} matched {} (line {})", dest, route.network, route.line);
                return Ok(Resolution {
                    route,
                    via_default: false,
                });
            }
        }
    }

    match table.default_route() {
        Some(route) => {
            tracing::debug!("{} fell through to default route (line {})", dest, route.line);
            Ok(Resolution {
                route,
                via_default: true,
            })
        }
        None => Err(ResolveError::NoRouteFound(dest)),
    }
}

pub(crate) fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        p if p >= 32 => 0xFFFFFFFF,
        p => 0xFFFFFFFF << (32 - p),
    }
}

fn ip_v4_matches(network: Ipv4Addr, addr: Ipv4Addr, prefix_len: u8) -> bool {
    let mask = prefix_mask(prefix_len);
    (u32::from(network) & mask) == (u32::from(addr) & mask)
}
