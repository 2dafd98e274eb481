//! # itrack
//!
//! Internship approval server binary. Wires settings, telemetry, the
//! SQLite store and the HTTP router together, and carries a few
//! operator commands for seeding profiles and minting credentials.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use itrack_auth::JwtCredentialIssuer;
use itrack_core::ids::PrincipalId;
use itrack_core::principal::validate_role_assignment;
use itrack_core::{Principal, Role, Site};
use itrack_server::{shutdown_signal, AppState, ItrackServer};
use itrack_settings::{expand_home, ItrackSettings};
use itrack_store::{Database, ProfileRepo};
use itrack_telemetry::{init_telemetry, LogQuery, SqliteLogSink, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "itrack", about = "Internship approval pipeline")]
struct Cli {
    /// Settings file (defaults to `~/.itrack/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Override the database path.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Print the effective settings as JSON after validation.
    CheckConfig,
    /// Mint a credential for an existing profile.
    IssueToken {
        #[arg(long)]
        id: String,
        /// Repeat for several roles.
        #[arg(long = "role", required = true)]
        roles: Vec<Role>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        site: Option<Site>,
    },
    /// Create or update a student profile.
    AddStudent {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        site: Option<Site>,
        #[arg(long)]
        mentor: Option<String>,
    },
    /// Create or update a staff profile.
    AddStaff {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        site: Option<Site>,
    },
    /// Print persisted warnings and errors as JSON, newest first.
    Logs {
        #[arg(long)]
        record_id: Option<String>,
        #[arg(long)]
        actor_id: Option<String>,
        /// WARN or ERROR.
        #[arg(long)]
        level: Option<String>,
        /// Substring of the emitting module path.
        #[arg(long)]
        target: Option<String>,
        /// RFC 3339 lower bound on the timestamp.
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        /// Print only the number of persisted rows.
        #[arg(long)]
        count: bool,
    },
}

fn load(config: Option<&PathBuf>) -> Result<ItrackSettings> {
    let settings = match config {
        Some(path) => itrack_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => itrack_settings::load_settings().context("Failed to load settings")?,
    };
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn database_path(settings: &ItrackSettings) -> PathBuf {
    expand_home(&settings.storage.database_path)
}

fn open_database(path: &Path) -> Result<Database> {
    Database::open(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

/// The log sink gets its own file next to the record database unless one
/// is configured, so log writes never contend for the records' lock.
fn log_database_path(settings: &ItrackSettings, db_path: &Path) -> PathBuf {
    settings
        .logging
        .log_database_path
        .as_deref()
        .map_or_else(|| db_path.with_file_name(LOG_DB_FILE), expand_home)
}

const LOG_DB_FILE: &str = "itrack-logs.db";

fn telemetry_config(settings: &ItrackSettings, db_path: &Path) -> TelemetryConfig {
    TelemetryConfig {
        filter: settings.logging.level.clone(),
        module_levels: Vec::new(),
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: log_database_path(settings, db_path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
        db_path: None,
    }) {
        Command::Serve { host, port, db_path } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            let db_path = db_path.unwrap_or_else(|| database_path(&settings));
            serve(settings, db_path).await
        }
        Command::CheckConfig => {
            let json = redacted_json(&settings)?;
            println!("{json}");
            Ok(())
        }
        Command::IssueToken {
            id,
            roles,
            department,
            site,
        } => {
            for role in &roles {
                if let Err(e) = validate_role_assignment(*role, department.as_deref(), site) {
                    bail!("{e}");
                }
            }
            let issuer = JwtCredentialIssuer::new(
                &settings.auth.jwt_secret,
                &settings.auth.issuer,
                settings.auth.credential_ttl_secs,
            );
            let principal = Principal::new(PrincipalId::from_raw(id), roles, department, site);
            let token = issuer.issue(&principal).context("Failed to issue credential")?;
            println!("{token}");
            Ok(())
        }
        Command::AddStudent {
            id,
            name,
            department,
            site,
            mentor,
        } => {
            let db = open_database(&database_path(&settings))?;
            let mentor = mentor.map(PrincipalId::from_raw);
            ProfileRepo::new(db)
                .upsert_student(
                    &PrincipalId::from_raw(&id),
                    &name,
                    department.as_deref(),
                    site,
                    mentor.as_ref(),
                )
                .context("Failed to save student profile")?;
            println!("student {id} saved");
            Ok(())
        }
        Command::AddStaff {
            id,
            name,
            department,
            site,
        } => {
            let db = open_database(&database_path(&settings))?;
            ProfileRepo::new(db)
                .upsert_staff(&PrincipalId::from_raw(&id), &name, department.as_deref(), site)
                .context("Failed to save staff profile")?;
            println!("staff {id} saved");
            Ok(())
        }
        Command::Logs {
            record_id,
            actor_id,
            level,
            target,
            since,
            limit,
            count,
        } => {
            let path = log_database_path(&settings, &database_path(&settings));
            let sink = SqliteLogSink::new(&path)
                .with_context(|| format!("Failed to open log database at {}", path.display()))?;
            if count {
                println!("{}", sink.count().context("Failed to count logs")?);
                return Ok(());
            }
            let rows = sink
                .query(&LogQuery {
                    level: level.map(|l| l.to_uppercase()),
                    target,
                    record_id,
                    actor_id,
                    since,
                    limit: Some(limit),
                })
                .context("Failed to query logs")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("Failed to render logs")?
            );
            Ok(())
        }
    }
}

async fn serve(settings: ItrackSettings, db_path: PathBuf) -> Result<()> {
    init_telemetry(&telemetry_config(&settings, &db_path));
    if settings.auth.uses_dev_secret() {
        warn!("auth.jwtSecret is the built-in development secret; set ITRACK_JWT_SECRET");
    }

    let db = open_database(&db_path)?;
    let state = AppState::from_settings(&settings, &db).context("Failed to build pipeline")?;
    let server = ItrackServer::new(settings.server.clone(), state);
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        db = %db_path.display(),
        "starting itrack"
    );
    server
        .serve(shutdown_signal())
        .await
        .context("Server terminated with an error")
}

/// Settings as pretty JSON with the signing secret masked.
fn redacted_json(settings: &ItrackSettings) -> Result<String> {
    let mut value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    if let Some(secret) = value.pointer_mut("/auth/jwtSecret") {
        *secret = serde_json::Value::String("<redacted>".into());
    }
    serde_json::to_string_pretty(&value).context("Failed to render settings")
}
