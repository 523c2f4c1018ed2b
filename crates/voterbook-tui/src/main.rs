//! Voterbook - a terminal client for branch voter management.
//!
//! Runs as a full-screen TUI by default. Subcommands cover the batch jobs
//! (CSV import and export, HTML report, SMS draft, stats, account
//! registration) without entering the TUI.

mod app;
mod ui;

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voterbook_core::cache::CacheManager;
use voterbook_core::config::{ENV_PASSWORD, ENV_EMAIL};
use voterbook_core::export::{parse_field_list, write_csv, Report};
use voterbook_core::import::ImportError;
use voterbook_core::models::{LocationLevel, LocationPath, Role, VoterData, VoterField};
use voterbook_core::repository::RepositoryError;
use voterbook_core::stats::by_child_location;
use voterbook_core::store::DocumentStore;
use voterbook_core::{
    user_message, Config, CredentialStore, LocationHierarchy, Principal, Session, SessionData, SmsCampaign,
    StoreClient, UserRepository, VoterFilter, VoterRepository, VoterStats,
};

use app::{App, AppState};
use ui::input::handle_input;
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

/// Voterbook - branch voter management
#[derive(Parser, Debug)]
#[command(name = "voterbook", version)]
#[command(about = "Branch voter management. Starts the terminal client when no command is given.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Location narrowing shared by the voter commands.
#[derive(Args, Debug, Clone, Default)]
struct At {
    /// Comma-separated location ids, root first (e.g. 6,47,367)
    #[arg(long, value_name = "IDS", value_parser = parse_location_path)]
    at: Option<LocationPath>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import voters from a CSV file
    Import {
        file: PathBuf,
        #[command(flatten)]
        at: At,
    },
    /// Export voters to CSV
    Export {
        file: PathBuf,
        /// Comma-separated columns (e.g. voter_name,age,upazila)
        #[arg(long, value_name = "FIELDS", value_parser = parse_fields)]
        fields: Option<FieldList>,
        #[command(flatten)]
        at: At,
    },
    /// Write a printable HTML voter list
    Report {
        file: PathBuf,
        /// Comma-separated columns (e.g. voter_name,age,upazila)
        #[arg(long, value_name = "FIELDS", value_parser = parse_fields)]
        fields: Option<FieldList>,
        #[command(flatten)]
        at: At,
    },
    /// Draft an SMS campaign; recipients go to stdout
    SmsDraft {
        message: String,
        /// Print the whole campaign as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        at: At,
    },
    /// Print dashboard counts as JSON
    Stats {
        #[command(flatten)]
        at: At,
    },
    /// Create an account and request access
    Register {
        email: String,
        /// super_admin, division_admin, district_admin, upazila_admin, union_admin or village_admin
        #[arg(value_parser = parse_role)]
        role: Role,
        /// Requested scope as comma-separated location ids, root first
        #[arg(value_name = "IDS", value_parser = parse_location_path)]
        scope: Option<LocationPath>,
    },
}

/// Export columns parsed from `--fields`.
#[derive(Debug, Clone, PartialEq)]
struct FieldList(Vec<VoterField>);

fn parse_fields(value: &str) -> Result<FieldList, String> {
    parse_field_list(value).map(FieldList).map_err(|e| e.to_string())
}

/// `6,47,367` into a location path. Every segment must be a non-empty id.
fn parse_location_path(value: &str) -> Result<LocationPath, String> {
    let ids: Vec<&str> = value.split(',').map(str::trim).collect();
    if let Some(pos) = ids.iter().position(|id| id.is_empty()) {
        return Err(format!("empty location id at position {}", pos + 1));
    }
    if ids.len() > LocationLevel::ALL.len() {
        return Err(format!("at most {} location ids are allowed", LocationLevel::ALL.len()));
    }
    Ok(LocationPath::from_ids(&ids))
}

fn parse_role(value: &str) -> Result<Role, String> {
    match Role::from(value.to_string()) {
        Role::Unknown(name) => {
            let known: Vec<&str> = Role::ASSIGNABLE.iter().map(Role::as_str).collect();
            Err(format!("unknown role '{}', expected one of {}", name, known.join(", ")))
        }
        role => Ok(role),
    }
}

/// Log to a daily file in the cache directory while the TUI owns the
/// terminal; otherwise to stderr. The guard must live until exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "voterbook.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Some(command) = cli.command {
        let _guard = init_tracing(None);
        if let Err(e) = run_command(command).await {
            eprintln!("Error: {:#}", e);
            eprintln!("{}", user_message(&e));
            std::process::exit(1);
        }
        return Ok(());
    }

    let log_dir = Config::load().ok().and_then(|c| c.cache_dir().ok());
    if let Some(ref dir) = log_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;
    }
    let _guard = init_tracing(log_dir.as_deref());
    info!("Voterbook starting");

    // Put the terminal back before a panic message is printed
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        default_hook(panic);
    }));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = match App::new().await {
        Ok(mut app) => {
            // Cached data first, so something shows behind the login overlay
            app.load_from_cache();

            if !app.is_authenticated() {
                app.start_login();
            } else {
                app.refresh_all_background().await;
            }

            run_app(&mut terminal, &mut app).await
        }
        Err(e) => Err(e),
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
    }

    info!("Voterbook shutting down");
    Ok(())
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| render(f, app))?;

        // Poll with a timeout so background results still get drawn
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            if let Event::Key(key) = event::read()? {
                // Ctrl+C to quit
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }

                if handle_input(app, key).await? {
                    return Ok(());
                }
            }
        }

        app.check_background_tasks();

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

// ============================================================================
// Command-line mode
// ============================================================================

async fn run_command(command: Command) -> Result<()> {
    match command {
        Command::Import { file, at } => import(file, at).await,
        Command::Export { file, fields, at } => export(file, fields, at).await,
        Command::Report { file, fields, at } => report(file, fields, at).await,
        Command::SmsDraft { message, json, at } => sms_draft(&message, json, at).await,
        Command::Stats { at } => stats(at).await,
        Command::Register { email, role, scope } => register(&email, role, scope.unwrap_or_default()).await,
    }
}

fn columns(fields: Option<FieldList>) -> Vec<VoterField> {
    fields.map(|f| f.0).unwrap_or_else(|| VoterField::DEFAULT_EXPORT.to_vec())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Signed-in state for one command-line run.
struct CliContext {
    principal: Principal,
    voters: VoterRepository,
    hierarchy: Option<Arc<LocationHierarchy>>,
}

impl CliContext {
    async fn connect() -> Result<Self> {
        let mut config = Config::load()?;
        let cache_dir = config.cache_dir()?;
        let (project, key) = config.store_credentials()?;
        let mut client = StoreClient::new(project, key)?;

        let session = cli_session(&mut config, &client, &cache_dir).await?;
        client.set_token(session.id_token.clone());

        let hierarchy = load_hierarchy(&config, &client, &cache_dir).await;
        let store: Arc<dyn DocumentStore> = Arc::new(client);
        let users = UserRepository::new(store.clone());
        let principal = users.principal(&session.uid).await?;
        info!(role = %principal.role(), "Signed in");

        let mut voters = VoterRepository::new(store);
        if let Some(ref h) = hierarchy {
            voters = voters.with_hierarchy(h.clone());
        }
        Ok(Self {
            principal,
            voters,
            hierarchy,
        })
    }

    async fn list(&self, at: At) -> Result<(VoterFilter, Vec<VoterData>)> {
        let filter = at.at.map(VoterFilter::at).unwrap_or_default();
        let voters = self.voters.list(&self.principal, &filter).await?;
        debug!(count = voters.len(), "Voters listed");
        Ok((filter, voters))
    }
}

/// Reuse the saved session when possible, otherwise sign in with the
/// password from the environment, the keychain or a prompt.
async fn cli_session(config: &mut Config, client: &StoreClient, cache_dir: &Path) -> Result<SessionData> {
    let mut session = Session::new(cache_dir.to_path_buf());
    if session.load()? {
        if let Some(ref data) = session.data {
            if !data.needs_refresh() {
                return Ok(data.clone());
            }
            match client.refresh_session(data).await {
                Ok(fresh) => {
                    session.update(fresh.clone());
                    session.save()?;
                    return Ok(fresh);
                }
                Err(e) => warn!(error = %e, "Session refresh failed, signing in again"),
            }
        }
    }

    let email = match config.last_email.clone() {
        Some(email) => email,
        None => prompt(&format!("Email ({} is not set): ", ENV_EMAIL))?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(p) if !p.is_empty() => p,
        _ => match CredentialStore::get_password(&email) {
            Ok(p) => p,
            Err(_) => rpassword::prompt_password(format!("Password for {}: ", email))?,
        },
    };

    let data = client.authenticate(&email, &password).await?;
    if let Err(e) = CredentialStore::store(&email, &password) {
        warn!(error = %e, "Failed to store credentials");
    }
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    session.update(data.clone());
    session.save()?;
    Ok(data)
}

/// Cached locations first, then the configured source. Commands still run
/// without a hierarchy, using raw ids.
async fn load_hierarchy(config: &Config, client: &StoreClient, cache_dir: &Path) -> Option<Arc<LocationHierarchy>> {
    let cache = CacheManager::new(cache_dir.to_path_buf()).ok()?;
    if let Ok(Some(cached)) = cache.load_locations() {
        if !cached.is_stale() {
            return Some(Arc::new(cached.data.into_hierarchy()));
        }
    }
    let source = config.location_source()?;
    match LocationHierarchy::load(&source, client.http()).await {
        Ok(h) => {
            if let Err(e) = cache.save_locations(&h) {
                warn!(error = %e, "Failed to cache locations");
            }
            Some(Arc::new(h))
        }
        Err(e) => {
            warn!(error = %e, "Location data unavailable, using raw ids");
            None
        }
    }
}

async fn import(path: PathBuf, at: At) -> Result<()> {
    let ctx = CliContext::connect().await?;
    let file = std::fs::File::open(&path).with_context(|| format!("Opening {}", path.display()))?;
    let defaults = at.at;

    match ctx.voters.import_csv(&ctx.principal, file, defaults.as_ref()).await {
        Ok(report) => {
            println!(
                "Imported {} voters in {} batch(es) from {}",
                report.imported,
                report.batches,
                path.display()
            );
            if !report.skipped.is_empty() {
                let lines: Vec<String> = report.skipped.iter().map(usize::to_string).collect();
                println!("Skipped rows without a name: {}", lines.join(", "));
            }
            Ok(())
        }
        Err(RepositoryError::Import(ImportError::Rejected(rows))) => {
            for row in &rows {
                eprintln!("  {}", row);
            }
            bail!("{} row(s) failed validation, nothing was imported", rows.len())
        }
        Err(e) => Err(e.into()),
    }
}

async fn export(path: PathBuf, fields: Option<FieldList>, at: At) -> Result<()> {
    let fields = columns(fields);
    let ctx = CliContext::connect().await?;
    let (_, voters) = ctx.list(at).await?;

    let file = std::fs::File::create(&path).with_context(|| format!("Creating {}", path.display()))?;
    write_csv(file, &voters, &fields, ctx.hierarchy.as_deref())?;
    println!("Exported {} voters to {}", voters.len(), path.display());
    Ok(())
}

async fn report(path: PathBuf, fields: Option<FieldList>, at: At) -> Result<()> {
    let fields = columns(fields);
    let ctx = CliContext::connect().await?;
    let (filter, voters) = ctx.list(at).await?;
    let summary = filter.summary(ctx.hierarchy.as_deref());

    let html = Report {
        title: "Voter List",
        filter_summary: &summary,
        generated_at: Local::now(),
        fields: &fields,
        hierarchy: ctx.hierarchy.as_deref(),
    }
    .render(&voters);
    std::fs::write(&path, html).with_context(|| format!("Writing {}", path.display()))?;
    println!("Wrote report of {} voters to {}", voters.len(), path.display());
    Ok(())
}

async fn sms_draft(message: &str, json: bool, at: At) -> Result<()> {
    let ctx = CliContext::connect().await?;
    let (_, voters) = ctx.list(at).await?;
    let campaign = SmsCampaign::draft(message, &voters);

    if json {
        println!("{}", serde_json::to_string_pretty(&campaign)?);
        return Ok(());
    }

    eprintln!("{}", campaign.summary());
    for skipped in &campaign.skipped {
        eprintln!("  skipped {}: {}", skipped.name, skipped.reason);
    }
    campaign.write_recipients(io::stdout().lock())?;
    Ok(())
}

#[derive(Serialize)]
struct StatsOutput {
    scope: String,
    total: usize,
    by_gender: BTreeMap<String, usize>,
    by_intent: BTreeMap<String, usize>,
    by_priority: BTreeMap<String, usize>,
    by_age: Vec<(&'static str, usize)>,
    needs_transport: usize,
    family_abroad: usize,
    by_location: Vec<LocationRow>,
}

#[derive(Serialize)]
struct LocationRow {
    id: String,
    name: String,
    count: usize,
}

async fn stats(at: At) -> Result<()> {
    let ctx = CliContext::connect().await?;
    let (filter, voters) = ctx.list(at).await?;
    let stats = VoterStats::compute(&voters);

    let by_location = match ctx.hierarchy {
        Some(ref h) => {
            let deepest = filter.location.deepest();
            let parent = deepest.and_then(|level| filter.location.get(level));
            by_child_location(&voters, h, deepest, parent)
                .into_iter()
                .map(|r| LocationRow {
                    id: r.id,
                    name: r.name,
                    count: r.count,
                })
                .collect()
        }
        None => Vec::new(),
    };

    let output = StatsOutput {
        scope: filter.summary(ctx.hierarchy.as_deref()),
        total: stats.total,
        by_age: stats.age_rows(),
        by_gender: stats.by_gender,
        by_intent: stats.by_intent,
        by_priority: stats.by_priority,
        needs_transport: stats.needs_transport,
        family_abroad: stats.family_abroad,
        by_location,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn register(email: &str, role: Role, scope: LocationPath) -> Result<()> {
    let config = Config::load()?;
    let (project, key) = config.store_credentials()?;
    let client = StoreClient::new(project, key)?;

    let name = prompt("Name (optional): ")?;
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let session = client.sign_up(email, &password).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(client.with_token(session.id_token.clone()));
    let users = UserRepository::new(store);
    let name = (!name.is_empty()).then_some(name.as_str());
    let user = users.register(&session.uid, email, name, role, scope).await?;

    println!(
        "Registered {} as {}. An administrator must approve the account before it can be used.",
        user.email,
        user.role.display_name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("voterbook").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_command_runs_tui() {
        assert!(parse(&[]).unwrap().command.is_none());
    }

    #[test]
    fn test_export_with_fields_and_location() {
        let cli = parse(&["export", "out.csv", "--fields", "voter_name,age", "--at", "6, 47"]).unwrap();
        match cli.command {
            Some(Command::Export { file, fields, at }) => {
                assert_eq!(file, PathBuf::from("out.csv"));
                assert_eq!(fields, Some(FieldList(vec![VoterField::VoterName, VoterField::Age])));
                assert_eq!(at.at, Some(LocationPath::from_ids(&["6", "47"])));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_misspelled_flag_is_rejected() {
        let err = parse(&["export", "out.csv", "--feilds", "voter_name"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
        assert!(parse(&["stats", "--att", "6"]).is_err());
        assert!(parse(&["export", "out.csv", "--fields", "voter_name,shoe"]).is_err());
    }

    #[test]
    fn test_location_path_rejects_empty_segments() {
        assert!(parse_location_path("6,,367").is_err());
        assert!(parse_location_path("").is_err());
        assert!(parse_location_path("6,47,").is_err());
        assert!(parse_location_path("1,2,3,4,5,6").is_err());
        assert_eq!(parse_location_path("6,47,367"), Ok(LocationPath::from_ids(&["6", "47", "367"])));
        assert!(parse(&["stats", "--at", "6,,367"]).is_err());
    }

    #[test]
    fn test_register_role_and_scope() {
        let cli = parse(&["register", "ua@example.com", "upazila_admin", "6,47,367"]).unwrap();
        match cli.command {
            Some(Command::Register { email, role, scope }) => {
                assert_eq!(email, "ua@example.com");
                assert_eq!(role, Role::UpazilaAdmin);
                assert_eq!(scope, Some(LocationPath::from_ids(&["6", "47", "367"])));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse(&["register", "x@example.com", "observer"]).is_err());
    }

    #[test]
    fn test_sms_draft_json_flag() {
        let cli = parse(&["sms-draft", "ভোট দিন", "--json"]).unwrap();
        assert!(matches!(cli.command, Some(Command::SmsDraft { json: true, .. })));
    }
}
