// Subcommand handlers: resolve, list, exec

use serde::Serialize;
use std::fmt::Write as _;
use std::net::Ipv4Addr;

use crate::config::{Config, ExecArgs};
use crate::error::{AppError, AppResult};
use crate::exec::{ExecReport, Executor};
use crate::routes::lookup::resolve;
use crate::routes::parser::{load_route_table, parse_chain, LoadedRoutes};
use crate::routes::{Chain, Network, Resolution, RouteTable};
use crate::target::Target;
use crate::transport::Transport;

const RULE: &str = "========================================";

/// `resolve --json` output; `route` uses the same text as plain output
#[derive(Debug, Serialize)]
struct ResolveOutput {
    target: String,
    address: Ipv4Addr,
    route: String,
    network: String,
    via_default: bool,
    line: usize,
}

impl ResolveOutput {
    fn new(target: &Target, address: Ipv4Addr, resolution: &Resolution<'_>) -> Self {
        ResolveOutput {
            target: target.to_string(),
            address,
            route: resolution.chain().to_string(),
            network: resolution.route.network.to_string(),
            via_default: resolution.via_default,
            line: resolution.route.line,
        }
    }
}

/// `resolve`: print the chain a target would use
pub async fn resolve_target(config: &Config, spec: &str, json: bool) -> AppResult<()> {
    let target = Target::parse(spec)?;
    let address = target.resolve_ipv4().await?;
    let loaded = load_route_table(&config.routes_file)?;
    let resolution = resolve(address, &loaded.table)?;

    if json {
        let out = ResolveOutput::new(&target, address, &resolution);
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", resolution.chain());
    }
    Ok(())
}

/// `list`: print every route, optionally probing each first hop
pub async fn list_routes<T: Transport>(config: &Config, transport: &T, probe: bool) -> AppResult<()> {
    let loaded = load_route_table(&config.routes_file)?;

    let reachability = if probe {
        probe_first_hops(&loaded.table, transport, config).await
    } else {
        vec![None; loaded.table.len()]
    };

    print!(
        "{}",
        render_route_list(&config.routes_file.display().to_string(), &loaded, &reachability)
    );
    Ok(())
}

/// One entry per route: `None` when not probed or direct
async fn probe_first_hops<T: Transport>(table: &RouteTable, transport: &T, config: &Config) -> Vec<Option<bool>> {
    let mut results = Vec::with_capacity(table.len());

    for route in &table.routes {
        let Some(first_hop) = route.chain.first_hop() else {
            results.push(None);
            continue;
        };

        let reachable = match Target::parse(first_hop) {
            Ok(hop) => matches!(
                transport
                    .execute(&hop, &Chain::Direct, "echo ok", config.timeouts.probe)
                    .await,
                Ok(out) if out.success()
            ),
            Err(e) => {
                tracing::warn!("Cannot probe hop on line {}: {}", route.line, e);
                false
            }
        };
        results.push(Some(reachable));
    }

    results
}

pub fn render_route_list(source: &str, loaded: &LoadedRoutes, reachability: &[Option<bool>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  SSH Routes Configuration");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Routes File: {}\n", source);

    for (idx, route) in loaded.table.routes.iter().enumerate() {
        match route.network {
            Network::Default => {
                let _ = writeln!(out, "Route {}: DEFAULT ROUTE", idx + 1);
            }
            network => {
                let _ = writeln!(out, "Route {}: {}", idx + 1, network);
            }
        }

        if let Some(description) = &route.description {
            let _ = writeln!(out, "  Description: {}", description);
        }

        match &route.chain {
            Chain::Direct => {
                let _ = writeln!(out, "  Jump Chain: DIRECT (no jump host)");
            }
            chain => {
                let _ = writeln!(out, "  Jump Chain: {}", chain);
            }
        }

        match reachability.get(idx).copied().flatten() {
            Some(true) => {
                let _ = writeln!(out, "  First hop: reachable");
            }
            Some(false) => {
                let _ = writeln!(out, "  First hop: unreachable");
            }
            None => {}
        }
        out.push('\n');
    }

    if !loaded.skipped.is_empty() {
        let _ = writeln!(out, "Skipped entries:");
        for skipped in &loaded.skipped {
            let _ = writeln!(out, "  {}", skipped);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Total routes configured: {}", loaded.table.len());
    let _ = writeln!(out, "{}", RULE);
    out
}

/// `exec`: route, connect, run. Returns whether the run succeeded.
pub async fn exec_on_target<T: Transport>(config: &Config, transport: &T, args: &ExecArgs) -> AppResult<bool> {
    let job = args.job().ok_or(AppError::MissingJob)?;
    let target = Target::parse(&args.target)?;

    // With an explicit chain the name may only resolve behind the jump hosts
    let (address, chain) = match args.via.as_deref() {
        Some(via) => {
            let chain = explicit_chain(via)?;
            let address = match target.resolve_ipv4().await {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::debug!("Continuing without a local address: {}", e);
                    None
                }
            };
            (address, chain)
        }
        None => {
            let address = target.resolve_ipv4().await?;
            (Some(address), table_chain(config, address)?)
        }
    };

    let executor = Executor::new(transport, &target, &chain, config.timeouts);
    let report = executor.run(address, &job).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report.success)
}

/// `--via` chain; the route table is not read then
fn explicit_chain(via: &str) -> AppResult<Chain> {
    parse_chain(via).map_err(|reason| AppError::InvalidChain {
        chain: via.to_string(),
        reason,
    })
}

fn table_chain(config: &Config, address: Ipv4Addr) -> AppResult<Chain> {
    let loaded = load_route_table(&config.routes_file)?;
    let resolution = resolve(address, &loaded.table)?;
    tracing::info!(
        "Route for {}: {} (line {}{})",
        address,
        resolution.chain(),
        resolution.route.line,
        if resolution.via_default { ", default" } else { "" }
    );
    Ok(resolution.chain().clone())
}

pub fn render_report(report: &ExecReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "  SSH Router - Auto Route Selection");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Target Host: {}", report.target);
    match report.target_ip {
        Some(ip) => {
            let _ = writeln!(out, "Target IP: {}", ip);
        }
        None => {
            let _ = writeln!(out, "Target IP: unresolved (left to the jump hosts)");
        }
    }
    if report.route == "direct" {
        let _ = writeln!(out, "Route: DIRECT (no jump host)");
    } else {
        let _ = writeln!(out, "Route: {}", report.route);
    }
    if let Some(cmd) = &report.command {
        let _ = writeln!(out, "Command: {}", cmd);
    }
    if let Some(script) = &report.script {
        let _ = writeln!(out, "Script: {}", script.display());
    }

    let _ = writeln!(out, "-----------------------------------");
    out.push_str(&report.output);
    if !report.output.is_empty() && !report.output.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "-----------------------------------");

    for err in &report.errors {
        let _ = writeln!(out, "Error: {}", err);
    }
    match (report.success, report.exit_code) {
        (true, _) => {
            let _ = writeln!(out, "Execution succeeded");
        }
        (false, Some(code)) => {
            let _ = writeln!(out, "Execution failed (exit code: {})", code);
        }
        (false, None) => {
            let _ = writeln!(out, "Execution failed");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::tests::{ok_output, Call, RecordingTransport};
    use crate::exec::Timeouts;
    use crate::routes::parser::parse_routes;
    use crate::transport::{ExecOutput, SshOptions};
    use std::io::Write;
    use std::path::PathBuf;
    use tracing::Level;

    fn config_with_routes(path: PathBuf) -> Config {
        Config {
            routes_file: path,
            log_level: Level::WARN,
            ssh: SshOptions::default(),
            timeouts: Timeouts::default(),
            config_file: None,
        }
    }

    fn routes_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".conf").tempfile().unwrap();
        write!(file, "{}", text).unwrap();
        file
    }

    fn exec_args(target: &str, command: &str, via: Option<&str>) -> ExecArgs {
        ExecArgs {
            target: target.to_string(),
            command: Some(command.to_string()),
            script: None,
            keep_script: false,
            via: via.map(str::to_string),
            json: true,
        }
    }

    #[test]
    fn test_render_route_list() {
        let loaded = parse_routes(
            "10.0.0.0/8 via a@bastion,b@inner  # Lab\n192.168.9.0/24 via direct\n999.1.1.1/40 via X\ndefault via x@edge\n",
        );
        let text = render_route_list("routes.conf", &loaded, &[Some(true), None, Some(false)]);

        assert!(text.contains("Route 1: 10.0.0.0/8\n  Description: Lab\n  Jump Chain: a@bastion,b@inner\n  First hop: reachable"));
        assert!(text.contains("Route 2: 192.168.9.0/24\n  Jump Chain: DIRECT (no jump host)\n\n"));
        assert!(text.contains("Route 3: DEFAULT ROUTE\n  Jump Chain: x@edge\n  First hop: unreachable"));
        assert!(text.contains("Skipped entries:\n  line 3: invalid IPv4 address `999.1.1.1`"));
        assert!(text.contains("Total routes configured: 3"));
    }

    #[tokio::test]
    async fn test_probe_first_hops() {
        let loaded = parse_routes("10.0.0.0/8 via a@bastion:2222,b@inner\n192.168.0.0/16 via direct\ndefault via x@edge\n");
        let transport = RecordingTransport::with_replies(vec![
            Ok(ok_output("ok\n")),
            Ok(ExecOutput {
                exit_code: 255,
                ..ExecOutput::default()
            }),
        ]);
        let config = config_with_routes(PathBuf::from("unused"));

        let results = probe_first_hops(&loaded.table, &transport, &config).await;

        assert_eq!(results, vec![Some(true), None, Some(false)]);
        assert_eq!(
            transport.calls(),
            vec![
                Call::Execute {
                    target: "a@bastion:2222".to_string(),
                    chain: Chain::Direct,
                    command: "echo ok".to_string()
                },
                Call::Execute {
                    target: "x@edge".to_string(),
                    chain: Chain::Direct,
                    command: "echo ok".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_exec_uses_resolved_chain() {
        let file = routes_file("10.0.0.0/8 via a@hop-a\n10.0.5.0/24 via b@hop-b\n");
        let config = config_with_routes(file.path().to_path_buf());
        let transport = RecordingTransport::default();

        let ok = exec_on_target(&config, &transport, &exec_args("root@10.0.5.1", "uptime", None))
            .await
            .unwrap();

        assert!(ok);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            match call {
                Call::Execute { chain, .. } => assert_eq!(chain.to_string(), "a@hop-a"),
                other => panic!("unexpected call {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_exec_no_route_is_an_error() {
        let file = routes_file("192.168.0.0/16 via a@b\n");
        let config = config_with_routes(file.path().to_path_buf());
        let transport = RecordingTransport::default();

        let err = exec_on_target(&config, &transport, &exec_args("root@10.0.0.5", "id", None))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Resolve(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_exec_via_overrides_table() {
        let config = config_with_routes(PathBuf::from("/nonexistent/routes.conf"));
        let transport = RecordingTransport::default();

        exec_on_target(&config, &transport, &exec_args("root@10.0.0.5", "id", Some("j1@a, j2@b")))
            .await
            .unwrap();

        match &transport.calls()[0] {
            Call::Execute { chain, .. } => assert_eq!(chain.proxy_jump().as_deref(), Some("j1@a,j2@b")),
            other => panic!("unexpected call {:?}", other),
        }

        let err = exec_on_target(&config, &transport, &exec_args("root@10.0.0.5", "id", Some("a@b,,c@d")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidChain { .. }));
    }

    #[tokio::test]
    async fn test_exec_via_does_not_need_local_dns() {
        let config = config_with_routes(PathBuf::from("/nonexistent/routes.conf"));
        let transport = RecordingTransport::default();

        let ok = exec_on_target(
            &config,
            &transport,
            &exec_args("root@db01.internal.invalid", "hostname", Some("ops@bastion")),
        )
        .await
        .unwrap();

        assert!(ok);
        let calls = transport.calls();
        assert!(!calls.is_empty());
        for call in calls {
            match call {
                Call::Execute { target, chain, .. } => {
                    assert_eq!(target, "root@db01.internal.invalid");
                    assert_eq!(chain.to_string(), "ops@bastion");
                }
                other => panic!("unexpected call {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_exec_without_job_is_an_error() {
        let config = config_with_routes(PathBuf::from("/nonexistent/routes.conf"));
        let transport = RecordingTransport::default();
        let mut args = exec_args("root@10.0.0.5", "id", Some("direct"));
        args.command = None;

        let err = exec_on_target(&config, &transport, &args).await.unwrap_err();

        assert!(matches!(err, AppError::MissingJob));
        assert!(!err.is_recoverable());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_resolve_output_json_shape() {
        let loaded = parse_routes("10.0.0.0/8 via a@bastion,b@inner
default via direct
");
        let target = Target::parse("root@10.1.2.3").unwrap();
        let address = Ipv4Addr::new(10, 1, 2, 3);
        let resolution = resolve(address, &loaded.table).unwrap();

        let value = serde_json::to_value(ResolveOutput::new(&target, address, &resolution)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "target": "root@10.1.2.3",
                "address": "10.1.2.3",
                "route": "a@bastion,b@inner",
                "network": "10.0.0.0/8",
                "via_default": false,
                "line": 1
            })
        );

        let fallback = resolve(Ipv4Addr::new(8, 8, 8, 8), &loaded.table).unwrap();
        let value = serde_json::to_value(ResolveOutput::new(&target, Ipv4Addr::new(8, 8, 8, 8), &fallback)).unwrap();
        assert_eq!(value["route"], "direct");
        assert_eq!(value["network"], "default");
        assert_eq!(value["via_default"], true);
    }

    #[test]
    fn test_render_report() {
        let report = ExecReport {
            operation: "ssh_router",
            timestamp: "2026-10-16T10:00:00+00:00".to_string(),
            target: "root@192.168.9.5".to_string(),
            target_ip: Some(Ipv4Addr::new(192, 168, 9, 5)),
            route: "direct".to_string(),
            command: Some("uptime".to_string()),
            script: None,
            executed_by: "ops@laptop".to_string(),
            success: false,
            exit_code: Some(3),
            output: "boom".to_string(),
            errors: vec![],
            remote_script_path: None,
        };
        let text = render_report(&report);
        assert!(text.contains("Route: DIRECT (no jump host)"));
        assert!(text.contains("boom\n---"));
        assert!(text.ends_with("Execution failed (exit code: 3)\n"));

        let unresolved = ExecReport { target_ip: None, ..report };
        assert!(render_report(&unresolved).contains("Target IP: unresolved"));
    }
}
