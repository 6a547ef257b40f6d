#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use ocm_peer_lib::compat::{classify, ProfileRegistry};
use ocm_peer_lib::config::{load_from_path, Config};
use ocm_peer_lib::outbound::{Resolver, SafeClient, SystemResolver};
use ocm_peer_lib::telemetry::{encode_metrics, init_metrics, init_tracing, Metrics};
use ocm_peer_lib::{FederationError, Orchestrator};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "OCM federation peer tooling (safe outbound client, compatibility profiles)")]
struct Cli {
    /// Path to configuration TOML file. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE", env = "OCM_PEER_CONFIG")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics to stdout after the command
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the SSRF check for a host and print the addresses it resolves to
    CheckHost { host: String },
    /// Show the compatibility profile a peer host resolves to
    Profile { host: String },
    /// Fetch a JSON document from a peer through the safe client
    Fetch { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match cli.config {
        Some(ref path) => match load_from_path(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("failed to load configuration: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    if let Err(err) = init_tracing(&cfg.logging.level, cfg.logging.show_target) {
        eprintln!("failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    let (metrics, registry) = match init_metrics() {
        Ok(pair) => pair,
        Err(err) => {
            error!(%err, "failed to initialize metrics");
            return ExitCode::FAILURE;
        }
    };

    let (client, orchestrator) = match build_peer(&cfg, metrics) {
        Ok(pair) => pair,
        Err(err) => {
            error!(%err, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let code = match cli.command {
        Command::CheckHost { host } => check_host(&client, &cancel, &host).await,
        Command::Profile { host } => profile(&orchestrator, &host),
        Command::Fetch { url } => fetch(&client, &cancel, &url).await,
    };

    if cli.print_metrics {
        match encode_metrics(&registry) {
            Ok(text) => print!("{text}"),
            Err(err) => error!(%err, "failed to encode metrics"),
        }
    }
    code
}

fn build_peer(
    cfg: &Config,
    metrics: Arc<Metrics>,
) -> Result<(SafeClient, Orchestrator), FederationError> {
    let profiles = Arc::new(ProfileRegistry::from_config(&cfg.peer_profiles)?);
    info!(
        ssrf_mode = ?cfg.outbound.ssrf_mode,
        mappings = profiles.mapping_count(),
        "configuration loaded"
    );

    let resolver: Arc<dyn Resolver> = Arc::new(SystemResolver);
    let client = SafeClient::build(&cfg.outbound, resolver, Some(Arc::clone(&metrics)))?;
    let orchestrator = Orchestrator::new(profiles).with_metrics(metrics);
    Ok((client, orchestrator))
}

async fn check_host(client: &SafeClient, cancel: &CancellationToken, host: &str) -> ExitCode {
    match client.check_host(cancel, host).await {
        Ok(addrs) => {
            let addrs: Vec<String> = addrs.iter().map(ToString::to_string).collect();
            println!("{}", json!({ "host": host, "allowed": true, "addresses": addrs }));
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!(
                "{}",
                json!({
                    "host": host,
                    "allowed": false,
                    "kind": err.kind().as_str(),
                    "error": err.to_string(),
                })
            );
            ExitCode::FAILURE
        }
    }
}

fn profile(orchestrator: &Orchestrator, host: &str) -> ExitCode {
    let profile = orchestrator.registry().resolve(host);
    let quirks: Vec<_> = profile
        .quirks
        .iter()
        .map(|q| {
            let reasons: Vec<_> = q.applies_to.iter().map(|r| r.as_str()).collect();
            json!({ "name": q.name, "applies_to": reasons })
        })
        .collect();
    let flags = profile.flags;
    println!(
        "{}",
        json!({
            "host": host,
            "profile": profile.name,
            "quirks": quirks,
            "flags": {
                "allow_unsigned_inbound": flags.allow_unsigned_inbound,
                "allow_unsigned_outbound": flags.allow_unsigned_outbound,
                "allow_mismatched_host": flags.allow_mismatched_host,
                "allow_http": flags.allow_http,
                "relax_must_exchange_token": flags.relax_must_exchange_token,
            },
        })
    );
    ExitCode::SUCCESS
}

async fn fetch(client: &SafeClient, cancel: &CancellationToken, url: &str) -> ExitCode {
    match client.get_json(cancel, url).await {
        Ok(response) => {
            info!(url = %response.url, status = %response.status, bytes = response.body.len(), "fetched");
            println!("{}", String::from_utf8_lossy(&response.body));
            if response.status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            let reason = classify(&err);
            error!(%url, %reason, kind = err.kind().as_str(), error = %err, "fetch failed");
            ExitCode::FAILURE
        }
    }
}
