//! CLI command definitions and argument parsing

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use upmate::{
    DecisionOutcome, DisplayPolicy, FileStore, IdentityStatus, InMemoryStore, KeyValueStore,
    PresentationGateway, UpMate, UpdateDecision, UpdateError,
};

use crate::config::{CliOverrides, Config};
use crate::console::ConsoleGateway;
use crate::output::{OutputFormat, OutputFormatter};
use crate::ExitCode;

/// upmate CLI - in-app update announcements from the terminal
#[derive(Parser, Debug)]
#[command(name = "upmate")]
#[command(version, about = "upmate CLI - check for and present in-app update announcements")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: text, json
    #[arg(long, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tenant API key
    #[arg(long, env = "UPMATE_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Version of the app being announced
    #[arg(long, env = "UPMATE_APP_VERSION", global = true)]
    pub app_version: Option<String>,

    /// Backend origin
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Store namespace
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Directory for the file store
    #[arg(long, global = true)]
    pub store_dir: Option<PathBuf>,

    /// Store backend: file, memory, keychain
    #[arg(long, global = true)]
    pub store: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check for an update and present it according to the display policy
    Check {
        /// Present even if this version was already acknowledged
        #[arg(long)]
        always: bool,
    },
    /// Present a URL directly, bypassing the update check
    Present {
        /// URL of the update surface
        url: String,
        /// Presentation style (fullScreen, pageSheet, formSheet, ...)
        #[arg(long)]
        style: Option<String>,
        /// Lightweight non-modal presentation
        #[arg(long)]
        toast: bool,
    },
    /// Show the persisted version state and identity
    State,
    /// Show the backend identifier, provisioning it if needed
    Identity,
    /// Remove all persisted state
    Reset,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Check { .. } => "check",
            Self::Present { .. } => "present",
            Self::State => "state",
            Self::Identity => "identity",
            Self::Reset => "reset",
        }
    }
}

impl Cli {
    /// Command-line values that take precedence over the config file.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_key: self.api_key.clone(),
            app_version: self.app_version.clone(),
            base_url: self.base_url.clone(),
            service: self.service.clone(),
            store_dir: self.store_dir.clone(),
            store_backend: self.store.clone(),
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        config.validate()?;
        let out = OutputFormatter::new(self.output);
        let command = self.command.name();

        match self.command {
            Commands::Check { always } => {
                let policy = if always {
                    DisplayPolicy::AlwaysShow
                } else {
                    DisplayPolicy::ShowIfNeeded
                };
                let sdk = start_sdk(&config, &out).await?;
                let decision = sdk.display_update(policy).await;
                let result = report_decision(&out, command, sdk.current_version(), decision).await;
                sdk.flush().await;
                result
            }
            Commands::Present { url, style, toast } => {
                let sdk = start_sdk(&config, &out).await?;
                let result = match sdk.present_update(&url, style.as_deref(), toast).await {
                    Ok(dismissal) => {
                        let reason = dismissal.wait().await;
                        debug!("Surface dismissed: {:?}", reason);
                        out.emit(
                            command,
                            serde_json::json!({ "url": url, "presented": true }),
                            &format!("Presented {url}"),
                        )?;
                        Ok(ExitCode::Success)
                    }
                    Err(e @ UpdateError::InvalidConfiguration(_)) => {
                        out.emit_failure::<()>(command, None, &e.to_string())?;
                        Ok(ExitCode::InvalidInput)
                    }
                    Err(e) => {
                        out.emit_failure::<()>(command, None, &e.to_string())?;
                        Ok(ExitCode::GeneralError)
                    }
                };
                sdk.flush().await;
                result
            }
            Commands::State => {
                let sdk = start_sdk(&config, &out).await?;
                // Let startup provisioning settle so the user id is reported.
                sdk.flush().await;
                let state = sdk.version_state().await?;
                let report = StateReport {
                    current_version: state.current_version,
                    last_seen_version: state.last_seen_version,
                    acknowledged: state.acknowledged,
                    user_id: sdk.remote_user_id().await,
                    store: config.storage.backend.clone(),
                };
                let text = format!(
                    "Current version:   {}\nLast seen version: {}\nAcknowledged:      {}\nUser id:           {}",
                    report.current_version,
                    report.last_seen_version.as_deref().unwrap_or("-"),
                    report.acknowledged,
                    report.user_id.as_deref().unwrap_or("(pending)"),
                );
                out.emit(command, &report, &text)?;
                Ok(ExitCode::Success)
            }
            Commands::Identity => {
                let sdk = start_sdk(&config, &out).await?;
                let status = sdk.ensure_identity().await;
                sdk.flush().await;
                match status {
                    IdentityStatus::Known(user_id) => {
                        out.emit(
                            command,
                            serde_json::json!({ "userId": user_id }),
                            &user_id,
                        )?;
                        Ok(ExitCode::Success)
                    }
                    IdentityStatus::Pending => {
                        out.emit_failure::<()>(
                            command,
                            None,
                            "identity could not be provisioned; see logs",
                        )?;
                        Ok(ExitCode::GeneralError)
                    }
                }
            }
            Commands::Reset => {
                // Straight to the store: starting the SDK would reconcile
                // and provision again.
                let store = open_store(&config)?;
                store.remove_all().await?;
                out.emit(
                    command,
                    serde_json::json!({ "service": config.sdk.service }),
                    &format!("Cleared state for {}", config.sdk.service),
                )?;
                Ok(ExitCode::Success)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateReport {
    current_version: String,
    last_seen_version: Option<String>,
    acknowledged: bool,
    user_id: Option<String>,
    store: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionReport {
    policy: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presentation_style: Option<String>,
    version_changed: Option<bool>,
}

impl From<&UpdateDecision> for DecisionReport {
    fn from(decision: &UpdateDecision) -> Self {
        Self {
            policy: decision.policy.to_string(),
            outcome: decision.outcome.label(),
            url: decision.offer.as_ref().map(|o| o.url.to_string()),
            presentation_style: decision
                .offer
                .as_ref()
                .map(|o| o.presentation_style.to_string()),
            version_changed: decision.reconciliation.as_ref().map(|r| r.transitioned),
        }
    }
}

async fn report_decision(
    out: &OutputFormatter,
    command: &str,
    version: &str,
    decision: UpdateDecision,
) -> anyhow::Result<ExitCode> {
    let report = DecisionReport::from(&decision);
    if let Some(dismissal) = decision.dismissal {
        debug!("Surface dismissed: {:?}", dismissal.wait().await);
    }

    match &decision.outcome {
        DecisionOutcome::NoOffer => {
            out.emit(command, &report, &format!("No update available for {version}"))?;
            Ok(ExitCode::Success)
        }
        DecisionOutcome::Presented => {
            // The console gateway already printed the surface in text mode.
            if out.format() == OutputFormat::Json {
                out.emit(command, &report, "")?;
            }
            Ok(ExitCode::Success)
        }
        DecisionOutcome::Suppressed => {
            let url = report.url.as_deref().unwrap_or("-");
            out.emit(
                command,
                &report,
                &format!("Update {url} already acknowledged for {version}"),
            )?;
            Ok(ExitCode::Success)
        }
        DecisionOutcome::CheckFailed(failure) => {
            out.emit_failure(
                command,
                Some(&report),
                &format!("update check failed ({}): {}", failure.kind, failure.message),
            )?;
            Ok(ExitCode::CheckFailed)
        }
        DecisionOutcome::PresentationFailed(message) => {
            out.emit_failure(command, Some(&report), message)?;
            Ok(ExitCode::GeneralError)
        }
    }
}

async fn start_sdk(config: &Config, out: &OutputFormatter) -> anyhow::Result<UpMate> {
    let api_key = config
        .credentials
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .context("no API key: pass --api-key, set UPMATE_API_KEY or add it to the config file")?;
    let app_version = config
        .credentials
        .app_version
        .clone()
        .filter(|v| !v.trim().is_empty())
        .context(
            "no app version: pass --app-version, set UPMATE_APP_VERSION or add it to the config file",
        )?;

    let gateway: Arc<dyn PresentationGateway> = match out.format() {
        OutputFormat::Text => Arc::new(ConsoleGateway::new()),
        OutputFormat::Json => Arc::new(ConsoleGateway::quiet()),
    };

    let sdk = UpMate::builder(api_key, app_version)
        .config(config.sdk.clone())
        .store(open_store(config)?)
        .gateway(gateway)
        .start()
        .await?;
    Ok(sdk)
}

/// Open the configured store backend.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "file" => {
            let store = FileStore::open(config.store_dir(), &config.sdk.service);
            debug!("Using file store at {}", store.path().display());
            Ok(Arc::new(store))
        }
        "keychain" => open_keychain(&config.sdk.service),
        other => anyhow::bail!("unknown storage backend '{other}'"),
    }
}

#[cfg(feature = "keychain")]
fn open_keychain(service: &str) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(upmate::KeyringStore::new(service)))
}

#[cfg(not(feature = "keychain"))]
fn open_keychain(_service: &str) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    anyhow::bail!("this build does not include the keychain store; rebuild with --features keychain")
}
