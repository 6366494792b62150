//! auth-replay
//!
//! Command-line client that:
//! 1. Registers one HTTP transport per configured upstream
//! 2. Issues the requested GETs through auth-intercepted handles
//! 3. Answers login-required notifications by replaying with a bearer token
//!    (or cancelling when none is configured)
//! 4. Prints one JSON line per request

mod config;
mod responder;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_recovery::{AuthCoordinator, BroadcastSink, RequestError, Settlement};
use futures_util::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{HttpFailure, HttpRequest, HttpResponse, HttpTransport};

use crate::config::Config;
use crate::responder::Responder;

/// One request from the command line, written `<transport>:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    transport: String,
    path: String,
}

impl Target {
    fn parse(arg: &str) -> Result<Self> {
        let (transport, path) = arg
            .split_once(':')
            .with_context(|| format!("expected <transport>:<path>, got {arg}"))?;
        if transport.is_empty() || !path.starts_with('/') {
            anyhow::bail!("expected <transport>:/<path>, got {arg}");
        }
        Ok(Self {
            transport: transport.to_string(),
            path: path.to_string(),
        })
    }
}

/// Split argv into the optional `--config` path and the request targets.
fn parse_args(args: &[String]) -> Result<(Option<String>, Vec<Target>)> {
    let mut config_path = None;
    let mut targets = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = Some(path.clone());
        } else {
            targets.push(Target::parse(arg)?);
        }
    }
    Ok((config_path, targets))
}

fn build_coordinator(
    config: &Config,
    sink: Arc<BroadcastSink<HttpFailure>>,
) -> Result<AuthCoordinator<HttpTransport>> {
    let mut builder = AuthCoordinator::builder();
    for entry in &config.transports {
        let timeout = Duration::from_secs(config.timeout_for(entry));
        let transport = HttpTransport::new(&entry.base_url, timeout)
            .with_context(|| format!("failed to build transport {}", entry.name))?;
        builder = builder.register(entry.name.as_str(), Arc::new(transport));
    }
    Ok(builder.build(sink)?)
}

/// JSON line describing how one request settled.
fn report(target: &Target, settlement: &Settlement<HttpResponse, HttpFailure>) -> serde_json::Value {
    let mut line = serde_json::json!({
        "transport": target.transport,
        "path": target.path,
    });
    let outcome = match settlement {
        Ok(response) => {
            line["status"] = response.status.into();
            line["body"] = response.body.clone().into();
            "success"
        }
        Err(e) => {
            line["error"] = e.to_string().into();
            match e {
                RequestError::AuthRequired(_) => "auth_required",
                RequestError::Forbidden(_) => "forbidden",
                RequestError::Transport(_) => "failure",
                RequestError::Cancelled(_) => "cancelled",
                RequestError::ConfigUpdate(_) => "config_update",
            }
        }
    };
    line["outcome"] = outcome.into();
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (cli_config_path, targets) = parse_args(&args)?;
    if targets.is_empty() {
        anyhow::bail!("usage: auth-replay [--config <path>] <transport>:<path>...");
    }

    let config_path = Config::resolve_path(cli_config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let token = config
        .resolve_token()
        .context("failed to load re-authentication token")?;

    info!(
        transports = config.transports.len(),
        credential = token.is_some(),
        requests = targets.len(),
        "configuration loaded"
    );

    let sink = Arc::new(BroadcastSink::new(config.client.event_capacity));
    let events = sink.subscribe();
    let coordinator = build_coordinator(&config, sink)?;
    let responder = Responder::new(coordinator.clone(), token).spawn(events);

    let mut calls = Vec::with_capacity(targets.len());
    for target in &targets {
        let interceptor = coordinator
            .transport(&target.transport)
            .with_context(|| format!("unknown transport: {}", target.transport))?;
        let request = HttpRequest::get(target.path.clone());
        calls.push(async move { interceptor.issue(request).await });
    }

    let settlements = join_all(calls).await;
    responder.abort();

    let mut failures = 0usize;
    for (target, settlement) in targets.iter().zip(&settlements) {
        if settlement.is_err() {
            failures += 1;
        }
        println!("{}", report(target, settlement));
    }

    if failures > 0 {
        warn!(failures, total = targets.len(), "some requests failed");
        anyhow::bail!("{failures} of {} requests failed", targets.len());
    }
    info!(total = targets.len(), "all requests succeeded");
    Ok(())
}
