use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gemini_relay::auth::{ClientTokenPayload, issue_client_token};
use gemini_relay::gateway::{GatewaySettings, StorageSettings};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Parser)]
#[command(name = "gemini-relay", version)]
#[command(about = "Failover gateway for the Gemini API")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the gateway.
    Serve(ServeArgs),
    /// Print a signed caller token.
    IssueToken(IssueTokenArgs),
}

#[derive(Debug, Args)]
pub(crate) struct ServeArgs {
    /// TOML settings file; flags below override it.
    #[arg(long, env = "GEMINI_RELAY_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub listen: Option<String>,
    /// Secret for caller tokens and `/_config`. Defaults to
    /// `$CLIENT_KEY_VALIDATION_SECRET`.
    #[arg(long)]
    pub admin_secret: Option<String>,
    /// Read variables from this dotenv file before the process environment.
    #[arg(long)]
    pub dotenv: Option<PathBuf>,
    #[arg(long, conflicts_with_all = ["sqlite", "redis"])]
    pub state_file: Option<PathBuf>,
    #[arg(long, conflicts_with = "redis")]
    pub sqlite: Option<PathBuf>,
    #[arg(long)]
    pub redis: Option<String>,
    #[arg(long, requires = "redis")]
    pub redis_prefix: Option<String>,
    #[arg(long)]
    pub attempt_timeout_secs: Option<u64>,
    #[arg(long)]
    pub max_body_bytes: Option<usize>,
    /// Reuse service-account access tokens until shortly before expiry.
    #[arg(long)]
    pub oauth_token_cache: bool,
    #[arg(long)]
    pub json_logs: bool,
    #[arg(long)]
    pub otel: bool,
    #[arg(long, requires = "otel")]
    pub otel_endpoint: Option<String>,
}

impl ServeArgs {
    pub fn apply(&self, settings: &mut GatewaySettings) {
        if let Some(listen) = &self.listen {
            settings.listen = listen.clone();
        }
        if let Some(secret) = &self.admin_secret {
            settings.admin_secret = Some(secret.clone());
        }
        if let Some(path) = &self.state_file {
            settings.storage = StorageSettings::StateFile { path: path.clone() };
        }
        if let Some(path) = &self.sqlite {
            settings.storage = StorageSettings::Sqlite { path: path.clone() };
        }
        if let Some(url) = &self.redis {
            settings.storage = StorageSettings::Redis {
                url: url.clone(),
                prefix: self.redis_prefix.clone(),
            };
        }
        if let Some(secs) = self.attempt_timeout_secs {
            settings.attempt_timeout_secs = secs;
        }
        if let Some(bytes) = self.max_body_bytes {
            settings.max_body_bytes = bytes;
        }
        settings.oauth_token_cache |= self.oauth_token_cache;
        settings.json_logs |= self.json_logs;
    }
}

#[derive(Debug, Args)]
pub(crate) struct IssueTokenArgs {
    #[arg(long, env = "CLIENT_KEY_VALIDATION_SECRET", hide_env_values = true)]
    pub secret: String,
    /// RFC 3339 start of validity. Defaults to now.
    #[arg(long)]
    pub not_before: Option<String>,
    /// RFC 3339 end of validity.
    #[arg(long, required_unless_present = "ttl_secs", conflicts_with = "ttl_secs")]
    pub expires: Option<String>,
    /// Validity in seconds from the start.
    #[arg(long)]
    pub ttl_secs: Option<i64>,
    #[arg(long)]
    pub note: Option<String>,
    /// Endpoint pattern recorded in the token; repeatable. Defaults to `.*`.
    #[arg(long = "allow-endpoint")]
    pub allowed_endpoints: Vec<String>,
}

impl IssueTokenArgs {
    pub fn payload(&self, now: i64) -> Result<ClientTokenPayload, Box<dyn std::error::Error>> {
        let nbf = match &self.not_before {
            Some(raw) => parse_timestamp(raw)?,
            None => now,
        };
        let exp = match (&self.expires, self.ttl_secs) {
            (Some(raw), _) => parse_timestamp(raw)?,
            (None, Some(ttl)) => nbf.saturating_add(ttl),
            (None, None) => return Err("either --expires or --ttl-secs is required".into()),
        };

        let mut payload = ClientTokenPayload::new(nbf, exp);
        if let Some(note) = &self.note {
            payload = payload.with_note(note.clone());
        }
        if !self.allowed_endpoints.is_empty() {
            payload = payload.with_allowed_endpoints(self.allowed_endpoints.clone());
        }
        Ok(payload)
    }

    pub fn issue(&self, now: i64) -> Result<String, Box<dyn std::error::Error>> {
        let payload = self.payload(now)?;
        Ok(issue_client_token(&self.secret, &payload)?)
    }
}

fn parse_timestamp(raw: &str) -> Result<i64, Box<dyn std::error::Error>> {
    let parsed = OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|err| format!("invalid RFC 3339 timestamp {raw:?}: {err}"))?;
    Ok(parsed.unix_timestamp())
}
