use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use mapnotes::config::{ConfigError, MapConfig};
use mapnotes::doc::{GeometryModel, ShapeKind};
use mapnotes::engine::{EngineCore, StaleLoad};
use mapnotes::geojson::{self, DocumentError, ImportReport};
use mapnotes::services::auth::StaticAuth;
use mapnotes::services::http_store::HttpFileStore;
use mapnotes::services::persistence::{Confirm, DeleteOutcome, LoadedDocument, PersistenceError, PersistenceGateway, SaveOutcome};
use mapnotes::services::store::StoreError;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing session token; pass --session-token or set MAPNOTES_SESSION_TOKEN")]
    MissingSessionToken,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Stale(#[from] StaleLoad),
}

#[derive(Parser, Debug)]
#[command(name = "mapnotes", about = "Inspect, save and load map annotation documents")]
struct Cli {
    #[arg(long, env = "MAPNOTES_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "MAPNOTES_SESSION_TOKEN")]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone)]
struct CliContext {
    config: MapConfig,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a local GeoJSON file and summarize its shapes.
    Inspect { path: PathBuf },
    /// Import a local GeoJSON file and print its canonical export.
    Normalize { path: PathBuf },
    /// List your saved maps.
    Files,
    /// Load one of your saved maps.
    Load {
        name: String,
        #[arg(long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Save a local GeoJSON file under a name.
    Save { name: String, path: PathBuf },
    /// Delete one of your saved maps.
    Delete {
        name: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Delete all of your saved maps.
    DeleteAll {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Show who the session token belongs to.
    Whoami,
    Admin(AdminCommand),
}

#[derive(Args, Debug)]
struct AdminCommand {
    #[command(subcommand)]
    command: AdminSubcommand,
}

#[derive(Subcommand, Debug)]
enum AdminSubcommand {
    /// List every saved map of every user.
    Files,
    /// Load any user's saved map.
    Load {
        owner: String,
        name: String,
        #[arg(long, help = "Write to this file instead of stdout")]
        output: Option<PathBuf>,
    },
    /// Delete any user's saved map.
    Delete {
        owner: String,
        name: String,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Delete every saved map of every user.
    DeleteAll {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let mut config = MapConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(token) = cli.session_token {
        config.session_token = Some(token);
    }
    let ctx = CliContext { config };

    match cli.command {
        Command::Inspect { path } => run_inspect(&path),
        Command::Normalize { path } => run_normalize(&path),
        Command::Files => run_files(&ctx).await,
        Command::Load { name, output } => run_load(&ctx, &name, output.as_deref()).await,
        Command::Save { name, path } => run_save(&ctx, &name, &path).await,
        Command::Delete { name, yes } => {
            let gateway = connect(&ctx).await?;
            let outcome = gateway.delete(&name, &confirmer(yes)).await?;
            print_delete(outcome);
            Ok(())
        }
        Command::DeleteAll { yes } => {
            let gateway = connect(&ctx).await?;
            let outcome = gateway.delete_all(&confirmer(yes)).await?;
            print_delete(outcome);
            Ok(())
        }
        Command::Whoami => run_whoami(&ctx).await,
        Command::Admin(admin) => run_admin(&ctx, admin).await,
    }
}

// =============================================================================
// OFFLINE
// =============================================================================

fn run_inspect(path: &Path) -> Result<(), CliError> {
    let report = import_file(path)?;
    for (index, shape) in report.shapes.iter().enumerate() {
        let measure = match shape.kind() {
            ShapeKind::Point => String::new(),
            ShapeKind::LineString => shape.props.length.map(|m| format!("{m:.1} m")).unwrap_or_default(),
            ShapeKind::Polygon => shape.props.area.map(|m| format!("{m:.1} m²")).unwrap_or_default(),
        };
        println!("{index:>4}  {:<10}  {:<24}  {measure}", shape.kind().as_str(), shape.props.display_name());
    }
    println!("{} shapes, {} skipped", report.shapes.len(), report.skipped.len());
    print_skipped(&report);
    Ok(())
}

fn run_normalize(path: &Path) -> Result<(), CliError> {
    let report = import_file(path)?;
    print_skipped(&report);
    let mut model = GeometryModel::new();
    model.replace_all(report.shapes);
    println!("{}", geojson::export_string(&model)?);
    Ok(())
}

// =============================================================================
// OWN FILES
// =============================================================================

async fn run_files(ctx: &CliContext) -> Result<(), CliError> {
    let gateway = connect(ctx).await?;
    for name in gateway.list().await? {
        println!("{name}");
    }
    Ok(())
}

async fn run_load(ctx: &CliContext, name: &str, output: Option<&Path>) -> Result<(), CliError> {
    let gateway = connect(ctx).await?;
    let mut core = EngineCore::from_config(&ctx.config);
    let ticket = core.begin_load(name);
    let loaded = gateway.load(ticket.name()).await?;
    write_loaded(&mut core, ticket, loaded, output)
}

async fn run_save(ctx: &CliContext, name: &str, path: &Path) -> Result<(), CliError> {
    let report = import_file(path)?;
    print_skipped(&report);
    let mut model = GeometryModel::new();
    model.replace_all(report.shapes);

    let gateway = connect(ctx).await?;
    match gateway.save(name, &model).await? {
        SaveOutcome::Saved => println!("saved {name} ({} shapes)", model.len()),
        SaveOutcome::Dropped => println!("another save is in progress; {name} was not saved"),
    }
    Ok(())
}

async fn run_whoami(ctx: &CliContext) -> Result<(), CliError> {
    let token = ctx.config.session_token.as_deref().ok_or(CliError::MissingSessionToken)?;
    let identity = HttpFileStore::fetch_identity(&ctx.config.base_url, token).await?;
    let role = if identity.is_admin { "admin" } else { "user" };
    println!("{} ({role})", identity.email);
    Ok(())
}

// =============================================================================
// ADMIN
// =============================================================================

async fn run_admin(ctx: &CliContext, admin: AdminCommand) -> Result<(), CliError> {
    let gateway = connect(ctx).await?;
    match admin.command {
        AdminSubcommand::Files => {
            for entry in gateway.admin_list().await? {
                let created = entry.created_at.map(|t| t.to_string()).unwrap_or_else(|| "-".to_owned());
                println!("{}\t{}\t{created}", entry.owner, entry.name);
            }
            Ok(())
        }
        AdminSubcommand::Load { owner, name, output } => {
            let mut core = EngineCore::from_config(&ctx.config);
            let ticket = core.begin_load(&name);
            let loaded = gateway.admin_load(&owner, ticket.name()).await?;
            write_loaded(&mut core, ticket, loaded, output.as_deref())
        }
        AdminSubcommand::Delete { owner, name, yes } => {
            print_delete(gateway.admin_delete(&owner, &name, &confirmer(yes)).await?);
            Ok(())
        }
        AdminSubcommand::DeleteAll { yes } => {
            print_delete(gateway.admin_delete_all(&confirmer(yes)).await?);
            Ok(())
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn connect(ctx: &CliContext) -> Result<PersistenceGateway, CliError> {
    let token = ctx.config.session_token.as_deref().ok_or(CliError::MissingSessionToken)?;
    let identity = HttpFileStore::fetch_identity(&ctx.config.base_url, token).await?;
    debug!(email = %identity.email, admin = identity.is_admin, "session identity");
    let store = HttpFileStore::new(&ctx.config.base_url, token, identity.owner())?;
    Ok(PersistenceGateway::new(Arc::new(store), Arc::new(StaticAuth::signed_in(identity))))
}

fn import_file(path: &Path) -> Result<ImportReport, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_owned(), source })?;
    Ok(geojson::import_str(&text)?)
}

fn write_loaded(
    core: &mut EngineCore,
    ticket: mapnotes::engine::LoadTicket,
    loaded: LoadedDocument,
    output: Option<&Path>,
) -> Result<(), CliError> {
    print_skipped(&loaded.report);
    core.finish_load(ticket, loaded.report.shapes)?;
    let text = core.export().map(|value| value.to_string())?;
    match output {
        Some(path) => {
            fs::write(path, text).map_err(|source| CliError::Write { path: path.to_owned(), source })?;
            eprintln!("wrote {} ({} shapes) to {}", loaded.name, core.model.len(), path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn print_skipped(report: &ImportReport) {
    for skipped in &report.skipped {
        eprintln!("skipped feature {}: {}", skipped.index, skipped.reason);
    }
}

fn print_delete(outcome: DeleteOutcome) {
    match outcome {
        DeleteOutcome::Deleted => println!("deleted"),
        DeleteOutcome::Cancelled => println!("cancelled"),
    }
}

/// `--yes` skips the prompt; otherwise ask on the terminal.
fn confirmer(assume_yes: bool) -> impl Confirm {
    move |prompt: &str| assume_yes || ask(prompt)
}

fn ask(prompt: &str) -> bool {
    eprint!("{prompt} [y/N] ");
    if let Err(e) = io::stderr().flush() {
        debug!(error = %e, "stderr flush failed");
    }
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
        Err(e) => {
            debug!(error = %e, "reading confirmation failed");
            false
        }
    }
}
