use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pairline::{
    Config,
    cli::{Cli, Commands, ConfigCommands, SessionCommands},
    core::storage::{Storage, StorageError},
    core::SessionSnapshot,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        project: None,
        defer: false,
    });

    match command {
        Commands::Serve {
            host,
            port,
            project,
            defer,
        } => {
            let mut config = Config::load()?;
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            if let Some(project) = project {
                config.project.default_path = Some(project);
                config.project.defer_init = false;
            }
            if defer {
                config.project.defer_init = true;
            }
            tracing::info!(version = %pairline::build_info::version_string(), "pairline");
            pairline::api::serve(config).await?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
            ConfigCommands::GenerateToken => {
                let token = pairline::config::ApiConfig::generate_token();
                println!("Generated API token:\n");
                println!("  {token}\n");
                println!("Add to your config.toml:");
                println!("  [api]");
                println!("  token = \"{token}\"\n");
                println!("Or set environment variable:");
                println!(
                    "  export {}=\"{token}\"",
                    pairline::config::ENV_API_TOKEN
                );
            }
        },

        Commands::Session { command } => {
            handle_session_command(command)?;
        }
    }

    Ok(())
}

fn load_snapshots(storage: &Storage) -> anyhow::Result<Vec<SessionSnapshot>> {
    let mut snapshots = Vec::new();
    for key in storage.list()? {
        match storage.read::<SessionSnapshot>(&key) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => tracing::warn!(key = %key, error = %e, "skipping unreadable session"),
        }
    }
    snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(snapshots)
}

fn handle_session_command(command: SessionCommands) -> anyhow::Result<()> {
    let config = Config::load()?;
    let storage = Storage::with_root(config.sessions_dir()?);

    match command {
        SessionCommands::List { format, limit } => {
            let sessions: Vec<_> = load_snapshots(&storage)?.into_iter().take(limit).collect();

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else {
                // Table format
                println!("{:<36} {:<10} {:>8} Created", "ID", "Mode", "Entries");
                println!("{}", "-".repeat(80));
                for session in sessions {
                    let created = chrono::DateTime::from_timestamp_millis(session.created_at)
                        .map_or_else(
                            || "Unknown".to_string(),
                            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
                        );
                    println!(
                        "{:<36} {:<10} {:>8} {}",
                        session.id,
                        session.mode.to_string(),
                        session.transcript.len(),
                        created
                    );
                }
            }
        }

        SessionCommands::Show { session_id, format } => {
            let snapshot: SessionSnapshot = match storage.read(&session_id) {
                Ok(snapshot) => snapshot,
                Err(StorageError::NotFound(_)) => anyhow::bail!("session not found: {session_id}"),
                Err(e) => return Err(e.into()),
            };

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("# {} ({})", snapshot.id, snapshot.project_root.display());
                for entry in snapshot.transcript.entries() {
                    let role = serde_json::to_value(entry.role)?;
                    println!("\n[{}]\n{}", role.as_str().unwrap_or("?"), entry.content);
                }
            }
        }

        SessionCommands::Delete { session_id } => {
            storage.remove(&session_id)?;
            println!("Deleted session {session_id}");
        }
    }

    Ok(())
}
