#[path = "gemini_relay/cli.rs"]
mod cli;

use std::time::Duration;

use clap::Parser;
use gemini_relay::Env;
use gemini_relay::gateway::observability::{self, TracingGuard};
use gemini_relay::gateway::{FailoverProxy, GatewayHttpState, GatewaySettings, router};
use tracing::{info, warn};

use cli::{Cli, Command, ServeArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::IssueToken(args) => {
            let now = time::OffsetDateTime::now_utc().unix_timestamp();
            println!("{}", args.issue(now)?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match &args.config {
        Some(path) => GatewaySettings::load(path)?,
        None => GatewaySettings::default(),
    };
    args.apply(&mut settings);

    let env = match &args.dotenv {
        Some(path) => Env::load_dotenv(path)?,
        None => Env::default(),
    };
    let _tracing = init_tracing(&args, settings.json_logs)?;

    let store = settings.storage.open(&env).await?;
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let mut proxy = FailoverProxy::new(store.clone(), http)
        .with_attempt_timeout(Duration::from_secs(settings.attempt_timeout_secs.max(1)));
    if settings.oauth_token_cache {
        proxy = proxy.with_token_cache();
    }

    let secret = settings.resolve_admin_secret(&env);
    if let Some(secret) = &secret {
        proxy = proxy.with_client_secret(secret.clone());
    }
    let mut state = GatewayHttpState::new(proxy).with_max_body_bytes(settings.max_body_bytes);
    match secret {
        Some(secret) => state = state.with_admin_secret(secret),
        None => warn!(
            env = %settings.admin_secret_env,
            "no admin secret; caller tokens are not checked and /_config is disabled"
        ),
    }

    let listener = tokio::net::TcpListener::bind(&settings.listen).await?;
    info!(
        listen = %settings.listen,
        store = store.kind(),
        readonly = store.readonly(),
        "gemini-relay listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(feature = "gateway-otel")]
fn init_tracing(
    args: &ServeArgs,
    json_logs: bool,
) -> Result<TracingGuard, Box<dyn std::error::Error>> {
    if args.otel {
        return observability::init_tracing_with_otel(
            "gemini-relay",
            args.otel_endpoint.as_deref(),
            json_logs,
        );
    }
    observability::init_tracing(json_logs)
}

#[cfg(not(feature = "gateway-otel"))]
fn init_tracing(
    args: &ServeArgs,
    json_logs: bool,
) -> Result<TracingGuard, Box<dyn std::error::Error>> {
    if args.otel || args.otel_endpoint.is_some() {
        return Err("--otel requires the gateway-otel feature".into());
    }
    observability::init_tracing(json_logs)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
