// Route table loaders for the line-oriented text format and JSON route files

use super::{Chain, Network, Route, RouteTable};
use crate::error::{AppError, AppResult};
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;
use thiserror::Error;

/// Why a route line was left out of the table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRoute {
    #[error("missing network")]
    MissingNetwork,

    #[error("expected `<network> via <chain>`")]
    MissingVia,

    #[error("missing chain after `via`")]
    MissingChain,

    #[error("empty hop in chain")]
    EmptyHop,

    #[error("invalid hop `{0}`")]
    InvalidHop(String),

    #[error("invalid IPv4 address `{0}`")]
    InvalidAddress(String),

    #[error("invalid prefix length `{0}` (expected 0-32)")]
    InvalidPrefix(String),

    #[error("`direct` cannot be combined with other hops")]
    DirectInChain,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// A line the loader skipped, kept so the caller can warn about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub content: String,
    pub reason: MalformedRoute,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({})", self.line, self.reason, self.content)
    }
}

/// A loaded table together with everything that was skipped on the way
#[derive(Debug, Clone, Default)]
pub struct LoadedRoutes {
    pub table: RouteTable,
    pub skipped: Vec<SkippedLine>,
}

impl LoadedRoutes {
    fn new(routes: Vec<Route>, skipped: Vec<SkippedLine>) -> Self {
        for s in &skipped {
            tracing::warn!("Skipping malformed route {}", s);
        }

        let mut defaults = routes.iter().filter(|r| r.network.is_default());
        if let Some(first) = defaults.next() {
            for extra in defaults {
                tracing::warn!(
                    "Ignoring default route on line {}: default already set on line {}",
                    extra.line,
                    first.line
                );
            }
        }

        LoadedRoutes {
            table: RouteTable::new(routes),
            skipped,
        }
    }
}

/// Load a route table from disk. `.json` files use the JSON layout,
/// anything else the `<network> via <chain>` text format.
pub fn load_route_table(path: &Path) -> AppResult<LoadedRoutes> {
    tracing::info!("Loading routes from: {}", path.display());

    let content = std::fs::read(path).map_err(|source| AppError::RouteFileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let loaded = if is_json {
        let content = std::str::from_utf8(&content)
            .map_err(|_| AppError::RouteFileFormat("JSON routes file is not valid UTF-8".to_string()))?;
        parse_json_routes(content)?
    } else {
        parse_route_bytes(&content)
    };

    tracing::info!(
        "Loaded {} route(s), skipped {}",
        loaded.table.len(),
        loaded.skipped.len()
    );
    Ok(loaded)
}

/// Parse the text format. Never fails as a whole; bad lines land in `skipped`.
pub fn parse_routes(content: &str) -> LoadedRoutes {
    parse_route_bytes(content.as_bytes())
}

/// Raw file contents; a line that is not UTF-8 is skipped on its own
pub fn parse_route_bytes(content: &[u8]) -> LoadedRoutes {
    let mut routes = Vec::new();
    let mut skipped = Vec::new();

    for (idx, raw) in content.split(|b| *b == b'\n').enumerate() {
        let line_no = idx + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let Ok(line) = std::str::from_utf8(raw) else {
            skipped.push(SkippedLine {
                line: line_no,
                content: String::from_utf8_lossy(raw).trim().to_string(),
                reason: MalformedRoute::InvalidUtf8,
            });
            continue;
        };

        match parse_route_line(line, line_no) {
            Ok(Some(route)) => routes.push(route),
            Ok(None) => {}
            Err(reason) => skipped.push(SkippedLine {
                line: line_no,
                content: line.trim().to_string(),
                reason,
            }),
        }
    }

    LoadedRoutes::new(routes, skipped)
}

/// Parse one text line. Blank and comment-only lines yield `Ok(None)`.
pub fn parse_route_line(line: &str, line_no: usize) -> Result<Option<Route>, MalformedRoute> {
    let (body, description) = match line.split_once('#') {
        Some((body, comment)) => {
            let comment = comment.trim();
            (body, (!comment.is_empty()).then(|| comment.to_string()))
        }
        None => (line, None),
    };

    let mut parts = body.split_whitespace();
    let Some(network) = parts.next() else {
        return Ok(None);
    };

    match parts.next() {
        Some(kw) if kw.eq_ignore_ascii_case("via") => {}
        _ => return Err(MalformedRoute::MissingVia),
    }

    let chain = parts.collect::<Vec<_>>().join(" ");

    Ok(Some(Route {
        network: parse_network(network)?,
        chain: parse_chain(&chain)?,
        description,
        line: line_no,
    }))
}

/// `default`, `a.b.c.d/len`, or a bare address meaning `/32`
pub fn parse_network(s: &str) -> Result<Network, MalformedRoute> {
    let s = s.trim();
    if s.is_empty() {
        return Err(MalformedRoute::MissingNetwork);
    }
    if s == "default" {
        return Ok(Network::Default);
    }

    let (addr, prefix) = match s.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (s, None),
    };

    let address: Ipv4Addr = addr
        .parse()
        .map_err(|_| MalformedRoute::InvalidAddress(addr.to_string()))?;

    let prefix_len = match prefix {
        Some(p) => match p.parse::<u8>() {
            Ok(len) if len <= 32 => len,
            _ => return Err(MalformedRoute::InvalidPrefix(p.to_string())),
        },
        None => 32,
    };

    Ok(Network::Cidr {
        address,
        prefix_len,
    })
}

/// `direct` or a comma-separated hop list. Hop syntax is left to ssh.
pub fn parse_chain(s: &str) -> Result<Chain, MalformedRoute> {
    let s = s.trim();
    if s.is_empty() {
        return Err(MalformedRoute::MissingChain);
    }
    if s == "direct" {
        return Ok(Chain::Direct);
    }

    let mut hops = Vec::new();
    for hop in s.split(',') {
        let hop = hop.trim();
        if hop.is_empty() {
            return Err(MalformedRoute::EmptyHop);
        }
        if hop == "direct" {
            return Err(MalformedRoute::DirectInChain);
        }
        if hop.contains(char::is_whitespace) {
            return Err(MalformedRoute::InvalidHop(hop.to_string()));
        }
        hops.push(hop.to_string());
    }

    Ok(Chain::Hops(hops))
}

#[derive(Debug, Deserialize)]
struct JsonRouteFile {
    routes: Option<Vec<JsonRoute>>,
}

#[derive(Debug, Deserialize)]
struct JsonRoute {
    network: Option<String>,
    via: Option<String>,
    description: Option<String>,
}

/// Parse `{"routes": [{"network", "via", "description"}]}`. Entries are
/// numbered from 1 in the `line` field of routes and diagnostics.
pub fn parse_json_routes(content: &str) -> AppResult<LoadedRoutes> {
    let file: JsonRouteFile = serde_json::from_str(content)?;
    let entries = file
        .routes
        .ok_or_else(|| AppError::RouteFileFormat("'routes' key not found".to_string()))?;

    let mut routes = Vec::new();
    let mut skipped = Vec::new();

    for (idx, entry) in entries.into_iter().enumerate() {
        let entry_no = idx + 1;
        let network = entry.network.as_deref().unwrap_or_default();
        let via = entry.via.as_deref().unwrap_or_default();

        let parsed = parse_network(network).and_then(|network| {
            parse_chain(via).map(|chain| Route {
                network,
                chain,
                description: entry.description.clone().filter(|d| !d.is_empty()),
                line: entry_no,
            })
        });

        match parsed {
            Ok(route) => routes.push(route),
            Err(reason) => skipped.push(SkippedLine {
                line: entry_no,
                content: format!("{} via {}", network, via),
                reason,
            }),
        }
    }

    Ok(LoadedRoutes::new(routes, skipped))
}
