use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use nfe_app::{commands, setup, ServiceError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nfe", version, about = "Issue, query and cancel NF-e / NFC-e invoices")]
struct Cli {
    /// Bearer token identifying the caller.
    #[arg(long, env = "NFE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a request file and print the document without sending it.
    Build { file: PathBuf },
    /// Issue one request file.
    Issue { file: PathBuf },
    /// Issue every `*.json` request under a folder.
    IssueDir { dir: PathBuf },
    /// Refresh an invoice status from the fiscal API.
    Status { invoice_id: String },
    Cancel {
        invoice_id: String,
        #[arg(long)]
        justification: String,
    },
    /// List your invoices, newest first.
    List,
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    /// Set a dotted key, e.g. `provider.base_url`.
    Set { key: String, value: String },
    /// Store a secret (api_key, client_secret, jwt_secret) in the keychain.
    SetSecret { name: String, value: String },
    DeleteSecret { name: String },
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn require_token(token: Option<String>) -> Result<String> {
    token.ok_or_else(|| {
        anyhow!(ServiceError::Unauthenticated(
            "pass --token or set NFE_TOKEN".to_string()
        ))
    })
}

fn run_settings(action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => print_json(&commands::get_settings()?),
        SettingsAction::Set { key, value } => print_json(&commands::update_setting(&key, &value)?),
        SettingsAction::SetSecret { name, value } => commands::set_secret(&name, &value),
        SettingsAction::DeleteSecret { name } => commands::delete_secret(&name),
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Command::Settings { action } = cli.command {
        return run_settings(action);
    }

    let cfg = config::load()?;
    let service = setup::open_service(&cfg)?;

    match cli.command {
        Command::Build { file } => print_json(&commands::build(&service, &file)?),
        Command::Issue { file } => {
            let token = require_token(cli.token)?;
            print_json(&commands::issue(&service, &token, &file).await?)
        }
        Command::IssueDir { dir } => {
            let token = require_token(cli.token)?;
            print_json(&commands::issue_dir(&service, &token, &dir).await?)
        }
        Command::Status { invoice_id } => {
            let token = require_token(cli.token)?;
            print_json(&commands::status(&service, &token, &invoice_id).await?)
        }
        Command::Cancel {
            invoice_id,
            justification,
        } => {
            let token = require_token(cli.token)?;
            print_json(&commands::cancel(&service, &token, &invoice_id, &justification).await?)
        }
        Command::List => {
            let token = require_token(cli.token)?;
            print_json(&commands::list(&service, &token).await?)
        }
        Command::Settings { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let report = match err.downcast_ref::<ServiceError>() {
                Some(service_err) => serde_json::to_string_pretty(&service_err.report()),
                None => serde_json::to_string_pretty(&serde_json::json!({
                    "kind": "internal",
                    "message": format!("{err:#}"),
                })),
            };
            match report {
                Ok(text) => eprintln!("{text}"),
                Err(_) => eprintln!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
