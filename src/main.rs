use clap::{Parser, Subcommand};
use k_snapshot::snapshot::api::{BackupRequest, RestoreRequest};
use k_snapshot::snapshot::application::Application;
use k_snapshot::snapshot::engine::Engine;
use k_snapshot::snapshot::engine_config::EngineConfig;
use k_snapshot::snapshot::result_error::result::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tracing::error;

/// Back up and restore the workloads of a Kubernetes namespace
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file, defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an application so it can be backed up
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        namespace: String,
    },
    /// Back up every supported resource of a registered application
    Backup {
        /// Application id, as returned by `register`
        #[arg(long)]
        app: String,
    },
    /// Restore a backup into a namespace
    Restore {
        /// Backup id, as returned by `backup`
        #[arg(long)]
        backup: String,
        #[arg(long)]
        namespace: String,
    },
    /// List stored backups
    List,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns whether the request found what it was asked to act on.
fn run(args: Args) -> Result<bool> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default().checked()?,
    };
    let engine = Engine::new(&config, Arc::new(config.kubectl().clone()))?;

    match args.command {
        Command::Register { name, namespace } => {
            let app = Application::builder().name(name).namespace(namespace).build();
            print_json(&engine.register_application(&app)?)?;
            Ok(true)
        }
        Command::Backup { app } => {
            let response = engine.create_backup(&BackupRequest { app_id: app })?;
            print_json(&response)?;
            Ok(!response.is_not_found())
        }
        Command::Restore { backup, namespace } => {
            let response = engine.restore_backup(&RestoreRequest {
                namespace,
                backup_id: backup.parse()?,
            })?;
            print_json(&response)?;
            Ok(!response.is_not_found())
        }
        Command::List => {
            print_json(&engine.list_backups()?)?;
            Ok(true)
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match run(args) {
        Ok(true) => {}
        Ok(false) => exit(2),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
