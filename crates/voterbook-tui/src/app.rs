//! Application state management for Voterbook.
//!
//! This module contains the core `App` struct that manages all application state,
//! including UI state, cached data, session management, and background task coordination.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use voterbook_core::auth::{CredentialStore, Session};
use voterbook_core::cache::{CacheAges, CacheKey, CacheManager};
use voterbook_core::export::{write_csv, ExportError};
use voterbook_core::form::{FormError, VoterForm, FORM_FIELDS};
use voterbook_core::hierarchy::{LocationHierarchy, LocationSelection, LocationSource};
use voterbook_core::import::{GENDERS, PRIORITY_LEVELS, VOTING_INTENTS};
use voterbook_core::models::{
    priority_rank, AppUser, LocationLevel, VoterData, VoterField, VoterPatch, VoterSortColumn,
};
use voterbook_core::repository::{self, RepositoryError, UserRepository, VoterFilter, VoterRepository};
use voterbook_core::stats::{by_child_location, LocationCount, VoterStats};
use voterbook_core::store::DocumentStore;
use voterbook_core::utils::{cmp_ignore_case, contains_ignore_case};
use voterbook_core::{Config, Principal, StoreClient};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 64;

/// Maximum length for password input.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for a single form field.
const MAX_FIELD_LENGTH: usize = 200;

/// Number of items to scroll on page up/down.
pub const PAGE_SCROLL_SIZE: usize = 10;

// ============================================================================
// UI State Types
// ============================================================================

/// Main navigation tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Voters,
    Dashboard,
    Users,
}

impl Tab {
    pub fn title(&self) -> &'static str {
        match self {
            Tab::Voters => "Voters",
            Tab::Dashboard => "Dashboard",
            Tab::Users => "Users",
        }
    }

    /// Get the next tab (wrapping around)
    pub fn next(&self) -> Self {
        match self {
            Tab::Voters => Tab::Dashboard,
            Tab::Dashboard => Tab::Users,
            Tab::Users => Tab::Voters,
        }
    }

    /// Get the previous tab (wrapping around)
    pub fn prev(&self) -> Self {
        match self {
            Tab::Voters => Tab::Users,
            Tab::Dashboard => Tab::Voters,
            Tab::Users => Tab::Dashboard,
        }
    }
}

/// Current UI focus area (list panel or detail panel)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Detail,
}

/// Overall application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    Searching,
    ShowingHelp,
    LoggingIn,
    Filtering,
    EditingVoter,
    ConfirmingDelete,
    ConfirmingQuit,
    Quitting,
}

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginFocus {
    Email,
    Password,
    Button,
}

/// One row of the filter overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRow {
    Level(LocationLevel),
    Intent,
    Priority,
    Gender,
}

pub const FILTER_ROWS: [FilterRow; 8] = [
    FilterRow::Level(LocationLevel::Division),
    FilterRow::Level(LocationLevel::District),
    FilterRow::Level(LocationLevel::Upazila),
    FilterRow::Level(LocationLevel::Union),
    FilterRow::Level(LocationLevel::Village),
    FilterRow::Intent,
    FilterRow::Priority,
    FilterRow::Gender,
];

/// Filter being edited in the overlay; applied on Enter.
#[derive(Debug, Clone, Default)]
pub struct FilterDraft {
    pub selection: LocationSelection,
    pub voting_intent: Option<String>,
    pub priority_level: Option<String>,
    pub gender: Option<String>,
    pub row: usize,
}

/// One row of the new-voter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormRow {
    Field(VoterField),
    Location(LocationLevel),
}

pub fn form_rows() -> Vec<FormRow> {
    FORM_FIELDS
        .iter()
        .map(|f| FormRow::Field(*f))
        .chain(LocationLevel::ALL.iter().map(|l| FormRow::Location(*l)))
        .collect()
}

pub struct FormDraft {
    pub form: VoterForm,
    pub row: usize,
    pub error: Option<FormError>,
}

/// Record awaiting delete confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Voter { id: String, name: String },
    User { uid: String, email: String },
}

impl DeleteTarget {
    pub fn label(&self) -> &str {
        match self {
            DeleteTarget::Voter { name, .. } => name,
            DeleteTarget::User { email, .. } => email,
        }
    }
}

/// Step to the next value in `options`, going from None to the first
/// value and from the last value back to None.
pub fn cycle_option(current: Option<&str>, options: &[&str]) -> Option<String> {
    let next = match current.and_then(|c| options.iter().position(|o| *o == c)) {
        None => options.first(),
        Some(i) => options.get(i + 1),
    };
    next.map(|s| s.to_string())
}

/// Step the selection at `level` through its options, resetting deeper levels.
fn cycle_location(
    selection: &mut LocationSelection,
    hierarchy: &LocationHierarchy,
    level: LocationLevel,
    forward: bool,
) -> Result<(), voterbook_core::HierarchyError> {
    let options = selection.options(hierarchy, level);
    if options.is_empty() {
        return Ok(());
    }
    let current = selection
        .get(level)
        .and_then(|id| options.iter().position(|n| n.id == id));
    let next = match (current, forward) {
        (None, true) => 0,
        (None, false) => options.len() - 1,
        (Some(i), true) => (i + 1) % options.len(),
        (Some(i), false) => (i + options.len() - 1) % options.len(),
    };
    let id = options[next].id.clone();
    selection.select(hierarchy, level, Some(&id))
}

// ============================================================================
// Background Task Results
// ============================================================================

/// Results sent from background tasks back to the main loop.
enum RefreshResult {
    Principal(Principal),
    Hierarchy(Arc<LocationHierarchy>),
    Voters(Vec<VoterData>),
    Users(Vec<AppUser>),
    RefreshComplete,
    Error(String),
}

// ============================================================================
// Main Application Struct
// ============================================================================

pub struct App {
    // Core services
    pub config: Config,
    pub session: Session,
    pub store: Option<StoreClient>,
    pub cache: CacheManager,

    // UI State
    pub state: AppState,
    pub current_tab: Tab,
    pub focus: Focus,
    pub search_query: String,
    pub voter_sort_column: VoterSortColumn,
    pub voter_sort_ascending: bool,

    // Login form state
    pub login_email: String,
    pub login_password: String,
    pub login_focus: LoginFocus,
    pub login_error: Option<String>,

    // Selection indices
    pub voter_selection: usize,
    pub user_selection: usize,

    // Overlays
    pub filter_draft: Option<FilterDraft>,
    pub form_draft: Option<FormDraft>,
    pub pending_delete: Option<DeleteTarget>,

    // Data
    pub principal: Option<Principal>,
    pub hierarchy: Option<Arc<LocationHierarchy>>,
    pub filter: VoterFilter,
    pub voters: Vec<VoterData>,
    pub users: Vec<AppUser>,

    // Background task channel
    refresh_rx: mpsc::Receiver<RefreshResult>,
    refresh_tx: mpsc::Sender<RefreshResult>,
    pub refreshing: bool,

    pub status_message: Option<String>,
    pub cache_ages: CacheAges,

    // Offline mode - when true, only use cached data
    pub offline_mode: bool,
}

impl App {
    /// Create a new application instance
    pub async fn new() -> Result<Self> {
        debug!("App::new() starting");
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(project = ?config.project_id, "Config loaded");

        let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        debug!(?cache_dir, "Cache directory configured");

        let mut session = Session::new(cache_dir.clone());
        let load_result = session.load();
        debug!(?load_result, has_data = session.data.is_some(), "Session loaded");

        let store = match config.store_credentials() {
            Ok((project, key)) => {
                let mut client = StoreClient::new(project, key)?;
                if let Some(token) = session.token() {
                    client.set_token(token.to_string());
                }
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "Store not configured");
                None
            }
        };

        let mut cache = CacheManager::new(cache_dir.clone())?;

        let login_email = config.last_email.clone().unwrap_or_default();
        let login_password = std::env::var(voterbook_core::config::ENV_PASSWORD).unwrap_or_default();

        // With a saved session the keychain password unlocks the sealed cache
        if let Some(ref data) = session.data {
            match CredentialStore::get_password(&data.email) {
                Ok(password) => match CacheKey::for_dir(&cache_dir, &password) {
                    Ok(key) => cache.set_key(key),
                    Err(e) => warn!(error = %e, "Failed to derive cache key"),
                },
                Err(e) => debug!(error = %e, "No stored password, sealed cache stays locked"),
            }
        }

        let mut app = Self::from_parts(config, session, store, cache);
        app.login_email = login_email;
        app.login_password = login_password;
        Ok(app)
    }

    /// Assemble an app around already-loaded services.
    pub fn from_parts(config: Config, session: Session, store: Option<StoreClient>, cache: CacheManager) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let offline_mode = config.offline_mode;

        Self {
            config,
            session,
            store,
            cache,

            state: AppState::Normal,
            current_tab: Tab::Voters,
            focus: Focus::List,
            search_query: String::new(),
            voter_sort_column: VoterSortColumn::Name,
            voter_sort_ascending: true,

            login_email: String::new(),
            login_password: String::new(),
            login_focus: LoginFocus::Email,
            login_error: None,

            voter_selection: 0,
            user_selection: 0,

            filter_draft: None,
            form_draft: None,
            pending_delete: None,

            principal: None,
            hierarchy: None,
            filter: VoterFilter::default(),
            voters: Vec::new(),
            users: Vec::new(),

            refresh_rx: rx,
            refresh_tx: tx,
            refreshing: false,

            status_message: None,
            cache_ages: CacheAges::default(),
            offline_mode,
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// A session exists and its token can still be used or refreshed.
    pub fn is_authenticated(&self) -> bool {
        self.session.data.is_some() && self.cache.has_key()
    }

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self) -> Result<()> {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();

        if email.is_empty() || password.is_empty() {
            self.login_error = Some("Email and password required".to_string());
            anyhow::bail!("Email and password required");
        }

        let Some(ref mut store) = self.store else {
            self.login_error = Some("No project configured, set VOTERBOOK_PROJECT_ID".to_string());
            anyhow::bail!("Store not configured");
        };

        self.login_error = None;

        match store.authenticate(&email, &password).await {
            Ok(session_data) => {
                if let Err(e) = CredentialStore::store(&email, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }
                match CacheKey::for_dir(self.cache.cache_dir(), &password) {
                    Ok(key) => self.cache.set_key(key),
                    Err(e) => warn!(error = %e, "Failed to derive cache key"),
                }

                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                store.set_token(session_data.id_token.clone());
                self.session.update(session_data);
                if let Err(e) = self.session.save() {
                    warn!(error = %e, "Failed to save session");
                }

                self.login_password.clear();
                self.state = AppState::Normal;
                info!("Login successful");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.login_error = Some(e.user_message().to_string());
                Err(e.into())
            }
        }
    }

    /// Start the login process (show login overlay)
    pub fn start_login(&mut self) {
        self.state = AppState::LoggingIn;
        self.login_focus = if self.login_email.is_empty() {
            LoginFocus::Email
        } else {
            LoginFocus::Password
        };
        self.login_error = None;
    }

    /// Exchange the refresh token if the id token is close to expiry.
    async fn ensure_fresh_token(&mut self) -> Result<()> {
        let (Some(store), Some(data)) = (self.store.as_mut(), self.session.data.as_ref()) else {
            return Ok(());
        };
        if !data.needs_refresh() {
            return Ok(());
        }
        if data.refresh_token.is_empty() {
            anyhow::bail!("Session has no refresh token");
        }
        debug!(minutes_left = data.minutes_until_expiry(), "Refreshing id token");
        let fresh = store.refresh_session(data).await.context("Refreshing session")?;
        store.set_token(fresh.id_token.clone());
        self.session.update(fresh);
        if let Err(e) = self.session.save() {
            warn!(error = %e, "Failed to save session");
        }
        Ok(())
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Load all data from cache
    pub fn load_from_cache(&mut self) {
        if let Ok(Some(cached)) = self.cache.load_locations() {
            self.hierarchy = Some(Arc::new(cached.data.into_hierarchy()));
        }
        if let Ok(Some(cached)) = self.cache.load_voters() {
            self.voters = cached.data;
        }
        if let Ok(Some(cached)) = self.cache.load_users() {
            self.users = cached.data;
        }
        self.cache_ages = self.cache.get_cache_ages();
    }

    // =========================================================================
    // Background Data Refresh
    // =========================================================================

    /// Spawn a background task to refresh the principal, locations, voters and users
    pub async fn refresh_all_background(&mut self) {
        if self.offline_mode {
            self.status_message = Some("Offline mode, press [o] to go online".to_string());
            return;
        }
        if let Err(e) = self.ensure_fresh_token().await {
            warn!(error = %e, "Token refresh failed");
            self.start_login();
            return;
        }

        let Some(store) = self.store.clone() else {
            self.status_message = Some("Error: no project configured".to_string());
            return;
        };
        let Some(uid) = self.session.uid().map(str::to_string) else {
            warn!("No uid available for refresh");
            return;
        };

        info!("Starting background refresh");
        let tx = self.refresh_tx.clone();
        let filter = self.filter.clone();
        let hierarchy = self.hierarchy.clone();
        let source = self.config.location_source();

        tokio::spawn(async move {
            Self::execute_background_refresh(tx, store, uid, filter, hierarchy, source).await;
        });

        self.refreshing = true;
        self.status_message = Some("Refreshing data...".to_string());
    }

    /// Helper to send refresh results, logging any channel errors
    async fn send_result(tx: &mpsc::Sender<RefreshResult>, result: RefreshResult) {
        if let Err(e) = tx.send(result).await {
            error!(error = %e, "Failed to send refresh result - channel closed");
        }
    }

    /// Helper to send a successful fetch result or an error
    async fn send_fetch_result<T, F>(
        tx: &mpsc::Sender<RefreshResult>,
        name: &str,
        result: repository::Result<T>,
        wrapper: F,
    ) where
        F: FnOnce(T) -> RefreshResult,
    {
        match result {
            Ok(data) => {
                debug!("{} fetched successfully", name);
                Self::send_result(tx, wrapper(data)).await;
            }
            Err(e) => {
                error!(error = %e, "{} fetch failed", name);
                Self::send_result(tx, RefreshResult::Error(format!("{}: {}", name, e.user_message()))).await;
            }
        }
    }

    /// Runs in a spawned task. The principal is resolved first since every
    /// other call is scoped by it.
    async fn execute_background_refresh(
        tx: mpsc::Sender<RefreshResult>,
        client: StoreClient,
        uid: String,
        filter: VoterFilter,
        hierarchy: Option<Arc<LocationHierarchy>>,
        source: Option<LocationSource>,
    ) {
        let http = client.http().clone();
        let store: Arc<dyn DocumentStore> = Arc::new(client);
        let users = UserRepository::new(store.clone());

        let principal = match users.principal(&uid).await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to resolve principal");
                Self::send_result(&tx, RefreshResult::Error(e.user_message().to_string())).await;
                Self::send_result(&tx, RefreshResult::RefreshComplete).await;
                return;
            }
        };
        Self::send_result(&tx, RefreshResult::Principal(principal.clone())).await;

        let hierarchy = match (hierarchy, source) {
            (Some(h), _) => Some(h),
            (None, Some(source)) => match LocationHierarchy::load(&source, &http).await {
                Ok(h) => {
                    let h = Arc::new(h);
                    Self::send_result(&tx, RefreshResult::Hierarchy(h.clone())).await;
                    Some(h)
                }
                Err(e) => {
                    error!(error = %e, "Location data failed to load");
                    Self::send_result(&tx, RefreshResult::Error(format!("Locations: {}", e))).await;
                    None
                }
            },
            (None, None) => {
                debug!("No location source configured");
                None
            }
        };

        let mut voters = VoterRepository::new(store);
        if let Some(h) = hierarchy {
            voters = voters.with_hierarchy(h);
        }

        let (voters_res, users_res) =
            futures::future::join(voters.list(&principal, &filter), users.list(&principal)).await;
        Self::send_fetch_result(&tx, "Voters", voters_res, RefreshResult::Voters).await;
        Self::send_fetch_result(&tx, "Users", users_res, RefreshResult::Users).await;

        info!("Background refresh complete");
        Self::send_result(&tx, RefreshResult::RefreshComplete).await;
    }

    /// Check for completed background tasks and process results
    pub fn check_background_tasks(&mut self) {
        while let Ok(result) = self.refresh_rx.try_recv() {
            self.process_refresh_result(result);
        }
    }

    fn process_refresh_result(&mut self, result: RefreshResult) {
        match result {
            RefreshResult::Principal(principal) => {
                debug!(role = %principal.role(), "Principal resolved");
                self.principal = Some(principal);
            }
            RefreshResult::Hierarchy(hierarchy) => {
                if let Err(e) = self.cache.save_locations(&hierarchy) {
                    warn!(error = %e, "Failed to cache locations");
                }
                self.hierarchy = Some(hierarchy);
            }
            RefreshResult::Voters(data) => {
                if let Err(e) = self.cache.save_voters(&data) {
                    warn!(error = %e, "Failed to cache voters");
                }
                self.voters = data;
                self.clamp_selections();
                self.cache_ages = self.cache.get_cache_ages();
            }
            RefreshResult::Users(data) => {
                if let Err(e) = self.cache.save_users(&data) {
                    warn!(error = %e, "Failed to cache users");
                }
                self.users = data;
                self.clamp_selections();
            }
            RefreshResult::RefreshComplete => {
                self.refreshing = false;
                // Only clear status if it's a progress message, preserve errors
                if let Some(ref msg) = self.status_message {
                    if !msg.starts_with("Error:") {
                        self.status_message = None;
                    }
                }
            }
            RefreshResult::Error(msg) => {
                error!(error = %msg, "Background task error");
                self.status_message = Some(format!("Error: {}", msg));
            }
        }
    }

    fn clamp_selections(&mut self) {
        let voters = self.visible_voters().len();
        self.voter_selection = self.voter_selection.min(voters.saturating_sub(1));
        self.user_selection = self.user_selection.min(self.users.len().saturating_sub(1));
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    fn voter_repo(&self) -> Option<VoterRepository> {
        let store: Arc<dyn DocumentStore> = Arc::new(self.store.clone()?);
        let repo = VoterRepository::new(store);
        Some(match self.hierarchy {
            Some(ref h) => repo.with_hierarchy(h.clone()),
            None => repo,
        })
    }

    fn user_repo(&self) -> Option<UserRepository> {
        let store: Arc<dyn DocumentStore> = Arc::new(self.store.clone()?);
        Some(UserRepository::new(store))
    }

    /// Everything needed for a write, or a status message explaining why not.
    /// Renews the id token first so a write never goes out with an expired one.
    async fn writable(&mut self) -> Option<(Principal, VoterRepository)> {
        if self.offline_mode {
            self.status_message = Some("Offline mode is read-only".to_string());
            return None;
        }
        let Some(principal) = self.principal.clone() else {
            self.status_message = Some("Still loading your account, press [u] to retry".to_string());
            return None;
        };
        if let Err(e) = self.ensure_fresh_token().await {
            warn!(error = %e, "Token refresh failed before write");
            self.start_login();
            self.login_error = Some("Session expired, please sign in again".to_string());
            return None;
        }
        let repo = self.voter_repo()?;
        Some((principal, repo))
    }

    fn report_error(&mut self, action: &str, err: &RepositoryError) {
        error!(error = %err, "{} failed", action);
        self.status_message = Some(format!("Error: {}", err.user_message()));
    }

    // =========================================================================
    // Voters
    // =========================================================================

    /// Voters matching the filter and search query, in the current sort order
    pub fn visible_voters(&self) -> Vec<&VoterData> {
        let mut sorted: Vec<&VoterData> = self.voters.iter().filter(|v| self.filter.matches(v)).collect();

        if !self.search_query.is_empty() {
            sorted.retain(|v| contains_ignore_case(&v.search_text(), &self.search_query));
        }

        let location_key = |v: &VoterData| {
            let path = v.location();
            match self.hierarchy {
                Some(ref h) => h.display_path(path),
                None => path.constraints().into_iter().map(|(_, id)| id).collect::<Vec<_>>().join("/"),
            }
        };

        sorted.sort_by(|a, b| {
            let name_cmp = || cmp_ignore_case(&a.voter_name, &b.voter_name);
            let cmp = match self.voter_sort_column {
                VoterSortColumn::Name => name_cmp(),
                VoterSortColumn::Age => a.age.cmp(&b.age).then_with(name_cmp),
                VoterSortColumn::Intent => a.voting_intent.cmp(&b.voting_intent).then_with(name_cmp),
                VoterSortColumn::Priority => priority_rank(a.priority_level.as_deref())
                    .cmp(&priority_rank(b.priority_level.as_deref()))
                    .then_with(name_cmp),
                VoterSortColumn::Location => location_key(a).cmp(&location_key(b)).then_with(name_cmp),
            };
            if self.voter_sort_ascending {
                cmp
            } else {
                cmp.reverse()
            }
        });

        sorted
    }

    pub fn selected_voter(&self) -> Option<&VoterData> {
        self.visible_voters().get(self.voter_selection).copied()
    }

    /// Toggle voter sort column - if already sorting by this column, flip direction;
    /// otherwise switch to this column with ascending=true. Resets selection to 0.
    pub fn toggle_voter_sort(&mut self, column: VoterSortColumn) {
        if self.voter_sort_column == column {
            self.voter_sort_ascending = !self.voter_sort_ascending;
        } else {
            self.voter_sort_column = column;
            self.voter_sort_ascending = true;
        }
        self.voter_selection = 0;
    }

    /// Step the selected voter's intent or priority to the next value.
    pub async fn cycle_selected(&mut self, field: VoterField) {
        let Some(voter) = self.selected_voter() else { return };
        let id = voter.id.clone();
        let mut patch = VoterPatch::default();
        match field {
            VoterField::VotingIntent => {
                patch.voting_intent = cycle_option(voter.voting_intent.as_deref(), VOTING_INTENTS)
                    .or_else(|| VOTING_INTENTS.first().map(|s| s.to_string()));
            }
            VoterField::PriorityLevel => {
                patch.priority_level = cycle_option(voter.priority_level.as_deref(), PRIORITY_LEVELS)
                    .or_else(|| PRIORITY_LEVELS.first().map(|s| s.to_string()));
            }
            _ => return,
        }

        let Some((principal, repo)) = self.writable().await else { return };
        match repo.update(&principal, &id, &patch).await {
            Ok(updated) => {
                self.status_message = Some(format!("{}: {} updated", updated.voter_name, field));
                self.replace_voter(updated);
            }
            Err(e) => self.report_error("Update", &e),
        }
    }

    fn replace_voter(&mut self, voter: VoterData) {
        match self.voters.iter_mut().find(|v| v.id == voter.id) {
            Some(existing) => *existing = voter,
            None => self.voters.push(voter),
        }
        if let Err(e) = self.cache.save_voters(&self.voters) {
            warn!(error = %e, "Failed to cache voters");
        }
    }

    pub fn confirm_delete_voter(&mut self) {
        if let Some(voter) = self.selected_voter() {
            self.pending_delete = Some(DeleteTarget::Voter {
                id: voter.id.clone(),
                name: voter.voter_name.clone(),
            });
            self.state = AppState::ConfirmingDelete;
        }
    }

    pub fn confirm_delete_user(&mut self) {
        if let Some(user) = self.users.get(self.user_selection) {
            self.pending_delete = Some(DeleteTarget::User {
                uid: user.uid.clone(),
                email: user.email.clone(),
            });
            self.state = AppState::ConfirmingDelete;
        }
    }

    pub async fn delete_pending(&mut self) {
        let Some(target) = self.pending_delete.take() else { return };
        let Some((principal, voters)) = self.writable().await else { return };
        match target {
            DeleteTarget::Voter { id, name } => match voters.delete(&principal, &id).await {
                Ok(()) => {
                    self.voters.retain(|v| v.id != id);
                    if let Err(e) = self.cache.save_voters(&self.voters) {
                        warn!(error = %e, "Failed to cache voters");
                    }
                    self.clamp_selections();
                    self.status_message = Some(format!("Deleted {}", name));
                }
                Err(e) => self.report_error("Delete voter", &e),
            },
            DeleteTarget::User { uid, email } => {
                let Some(users) = self.user_repo() else { return };
                match users.delete(&principal, &uid).await {
                    Ok(()) => {
                        self.users.retain(|u| u.uid != uid);
                        self.clamp_selections();
                        self.status_message = Some(format!("Deleted {}", email));
                    }
                    Err(e) => self.report_error("Delete user", &e),
                }
            }
        }
    }

    /// Write the visible voters to a timestamped CSV in the working directory.
    pub fn export_visible(&mut self) {
        let path = PathBuf::from(format!("voters-{}.csv", Local::now().format("%Y%m%d-%H%M%S")));
        let voters: Vec<VoterData> = self.visible_voters().into_iter().cloned().collect();
        let result = std::fs::File::create(&path)
            .map_err(ExportError::from)
            .and_then(|file| write_csv(file, &voters, &VoterField::DEFAULT_EXPORT, self.hierarchy.as_deref()));
        self.status_message = Some(match result {
            Ok(()) => format!("Exported {} voters to {}", voters.len(), path.display()),
            Err(e) => {
                error!(error = %e, "Export failed");
                format!("Error: {}", e)
            }
        });
    }

    // =========================================================================
    // Filter overlay
    // =========================================================================

    pub fn open_filter(&mut self) {
        let mut selection = match self.principal {
            Some(ref p) => LocationSelection::for_principal(p),
            None => LocationSelection::new(),
        };
        if let Some(ref h) = self.hierarchy {
            for level in LocationLevel::ALL {
                if let Some(id) = self.filter.location.get(level) {
                    if selection.get(level).is_none() {
                        let _ = selection.select(h, level, Some(id));
                    }
                }
            }
        }
        self.filter_draft = Some(FilterDraft {
            selection,
            voting_intent: self.filter.voting_intent.clone(),
            priority_level: self.filter.priority_level.clone(),
            gender: self.filter.gender.clone(),
            row: 0,
        });
        self.state = AppState::Filtering;
    }

    /// Left/right on a filter row.
    pub fn cycle_filter_row(&mut self, forward: bool) {
        let hierarchy = self.hierarchy.clone();
        let Some(ref mut draft) = self.filter_draft else { return };
        let result = match FILTER_ROWS[draft.row] {
            FilterRow::Level(level) => match hierarchy {
                Some(ref h) => cycle_location(&mut draft.selection, h, level, forward),
                None => Ok(()),
            },
            FilterRow::Intent => {
                draft.voting_intent = cycle_option(draft.voting_intent.as_deref(), VOTING_INTENTS);
                Ok(())
            }
            FilterRow::Priority => {
                draft.priority_level = cycle_option(draft.priority_level.as_deref(), PRIORITY_LEVELS);
                Ok(())
            }
            FilterRow::Gender => {
                draft.gender = cycle_option(draft.gender.as_deref(), GENDERS);
                Ok(())
            }
        };
        if let Err(e) = result {
            self.status_message = Some(e.to_string());
        }
    }

    pub fn clear_filter_row(&mut self) {
        let hierarchy = self.hierarchy.clone();
        let Some(ref mut draft) = self.filter_draft else { return };
        match FILTER_ROWS[draft.row] {
            FilterRow::Level(level) => {
                if let Some(ref h) = hierarchy {
                    if let Err(e) = draft.selection.select(h, level, None) {
                        self.status_message = Some(e.to_string());
                    }
                }
            }
            FilterRow::Intent => draft.voting_intent = None,
            FilterRow::Priority => draft.priority_level = None,
            FilterRow::Gender => draft.gender = None,
        }
    }

    /// Apply the draft and reload from the store, since location
    /// constraints are part of the query.
    pub async fn apply_filter(&mut self) {
        if let Some(draft) = self.filter_draft.take() {
            self.filter = VoterFilter {
                location: draft.selection.path().clone(),
                search: None,
                voting_intent: draft.voting_intent,
                priority_level: draft.priority_level,
                gender: draft.gender,
            };
        }
        self.state = AppState::Normal;
        self.voter_selection = 0;
        self.refresh_all_background().await;
    }

    pub async fn clear_filter(&mut self) {
        self.filter = VoterFilter::default();
        self.voter_selection = 0;
        self.refresh_all_background().await;
    }

    pub fn filter_summary(&self) -> String {
        self.filter.summary(self.hierarchy.as_deref())
    }

    // =========================================================================
    // New voter form
    // =========================================================================

    pub fn open_form(&mut self) {
        let Some(ref principal) = self.principal else {
            self.status_message = Some("Still loading your account, press [u] to retry".to_string());
            return;
        };
        self.form_draft = Some(FormDraft {
            form: VoterForm::new(principal),
            row: 0,
            error: None,
        });
        self.state = AppState::EditingVoter;
    }

    pub fn form_row(&self) -> Option<FormRow> {
        let draft = self.form_draft.as_ref()?;
        form_rows().get(draft.row).copied()
    }

    pub fn form_input(&mut self, c: char) {
        let Some(FormRow::Field(field)) = self.form_row() else { return };
        let Some(ref mut draft) = self.form_draft else { return };
        let mut value = draft.form.get(field).to_string();
        if value.chars().count() < MAX_FIELD_LENGTH && is_valid_input_char(c) {
            value.push(c);
            draft.form.set(field, value);
        }
    }

    pub fn form_backspace(&mut self) {
        let row = self.form_row();
        let hierarchy = self.hierarchy.clone();
        let Some(ref mut draft) = self.form_draft else { return };
        match row {
            Some(FormRow::Field(field)) => {
                let mut value = draft.form.get(field).to_string();
                value.pop();
                draft.form.set(field, value);
            }
            Some(FormRow::Location(level)) => {
                if let Some(ref h) = hierarchy {
                    if let Err(e) = draft.form.select_location(h, level, None) {
                        self.status_message = Some(e.to_string());
                    }
                }
            }
            None => {}
        }
    }

    pub fn form_cycle_location(&mut self, forward: bool) {
        let Some(FormRow::Location(level)) = self.form_row() else { return };
        let Some(hierarchy) = self.hierarchy.clone() else {
            self.status_message = Some("Location data not loaded".to_string());
            return;
        };
        let Some(ref mut draft) = self.form_draft else { return };
        let mut selection = draft.form.selection().clone();
        let result = cycle_location(&mut selection, &hierarchy, level, forward)
            .and_then(|()| draft.form.select_location(&hierarchy, level, selection.get(level)));
        if let Err(e) = result {
            self.status_message = Some(e.to_string());
        }
    }

    pub fn move_form_row(&mut self, delta: isize) {
        let max = form_rows().len() - 1;
        if let Some(ref mut draft) = self.form_draft {
            draft.row = draft.row.saturating_add_signed(delta).min(max);
        }
    }

    pub async fn submit_form(&mut self) {
        let Some((principal, repo)) = self.writable().await else { return };
        let Some(ref mut draft) = self.form_draft else { return };
        match draft.form.submit(&repo, &principal).await {
            Ok(voter) => {
                info!(id = %voter.id, "Voter created");
                self.status_message = Some(format!("Saved {}", voter.voter_name));
                self.form_draft = None;
                self.state = AppState::Normal;
                self.replace_voter(voter);
            }
            Err(e) => {
                warn!(error = %e, "Voter form rejected");
                self.status_message = Some(format!("Error: {}", e.user_message()));
                draft.error = Some(e);
            }
        }
    }

    // =========================================================================
    // Dashboard
    // =========================================================================

    pub fn stats(&self) -> VoterStats {
        let voters: Vec<VoterData> = self.visible_voters().into_iter().cloned().collect();
        VoterStats::compute(&voters)
    }

    /// Counts one level below the deepest filtered level.
    pub fn location_breakdown(&self) -> Vec<LocationCount> {
        let Some(ref hierarchy) = self.hierarchy else { return Vec::new() };
        let voters: Vec<VoterData> = self.visible_voters().into_iter().cloned().collect();
        let deepest = self.filter.location.deepest();
        let parent_id = deepest.and_then(|level| self.filter.location.get(level));
        by_child_location(&voters, hierarchy, deepest, parent_id)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn selected_user(&self) -> Option<&AppUser> {
        self.users.get(self.user_selection)
    }

    pub async fn approve_selected_user(&mut self) {
        let Some(uid) = self.selected_user().map(|u| u.uid.clone()) else { return };
        let Some((principal, _)) = self.writable().await else { return };
        let Some(users) = self.user_repo() else { return };
        match users.approve(&principal, &uid).await {
            Ok(user) => {
                self.status_message = Some(format!("Approved {}", user.email));
                if let Some(existing) = self.users.iter_mut().find(|u| u.uid == user.uid) {
                    *existing = user;
                }
            }
            Err(e) => self.report_error("Approve", &e),
        }
    }

    // =========================================================================
    // Offline mode
    // =========================================================================

    pub async fn toggle_offline(&mut self) {
        self.offline_mode = !self.offline_mode;
        self.config.offline_mode = self.offline_mode;
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        if self.offline_mode {
            info!("Entering offline mode");
            self.status_message = Some("Offline: showing cached data".to_string());
        } else {
            info!("Leaving offline mode");
            self.refresh_all_background().await;
        }
    }
}

// ============================================================================
// Input validation helpers (exported for use in input.rs)
// ============================================================================

/// Check if a character is valid for input (no control characters)
fn is_valid_input_char(c: char) -> bool {
    !c.is_control()
}

pub fn can_add_email_char(current_len: usize, c: char) -> bool {
    current_len < MAX_EMAIL_LENGTH && is_valid_input_char(c)
}

pub fn can_add_password_char(current_len: usize, c: char) -> bool {
    current_len < MAX_PASSWORD_LENGTH && is_valid_input_char(c)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use voterbook_core::auth::SessionData;
    use voterbook_core::models::{LocationNode, LocationPath, Role};

    fn hierarchy() -> LocationHierarchy {
        LocationHierarchy::from_levels([
            vec![LocationNode::new("6", "Dhaka"), LocationNode::new("1", "Chattogram")],
            vec![
                LocationNode::new("47", "Dhaka").with_parent(LocationLevel::District, "6"),
                LocationNode::new("41", "Gazipur").with_parent(LocationLevel::District, "6"),
            ],
            vec![LocationNode::new("367", "Dhamrai").with_parent(LocationLevel::Upazila, "47")],
            vec![],
            vec![],
        ])
    }

    #[test]
    fn test_tab_cycle() {
        assert_eq!(Tab::Voters.next(), Tab::Dashboard);
        assert_eq!(Tab::Users.next(), Tab::Voters);
        assert_eq!(Tab::Voters.prev(), Tab::Users);
        assert_eq!(Tab::Dashboard.prev(), Tab::Voters);
    }

    #[test]
    fn test_cycle_option_wraps_through_none() {
        assert_eq!(cycle_option(None, VOTING_INTENTS).as_deref(), Some("Yes"));
        assert_eq!(cycle_option(Some("Yes"), VOTING_INTENTS).as_deref(), Some("No"));
        assert_eq!(cycle_option(Some("Undecided"), VOTING_INTENTS), None);
        assert_eq!(cycle_option(Some("bogus"), VOTING_INTENTS).as_deref(), Some("Yes"));
    }

    #[test]
    fn test_cycle_location_resets_descendants() {
        let h = hierarchy();
        let mut selection = LocationSelection::new();
        cycle_location(&mut selection, &h, LocationLevel::Division, true).unwrap();
        cycle_location(&mut selection, &h, LocationLevel::District, true).unwrap();
        cycle_location(&mut selection, &h, LocationLevel::Upazila, true).unwrap();
        assert_eq!(selection.path(), &LocationPath::from_ids(&["6", "47", "367"]));

        cycle_location(&mut selection, &h, LocationLevel::District, true).unwrap();
        assert_eq!(selection.path(), &LocationPath::from_ids(&["6", "41"]));

        cycle_location(&mut selection, &h, LocationLevel::Division, false).unwrap();
        assert_eq!(selection.path(), &LocationPath::from_ids(&["1"]));
    }

    #[test]
    fn test_form_rows_end_with_locations() {
        let rows = form_rows();
        assert_eq!(rows.len(), FORM_FIELDS.len() + 5);
        assert_eq!(rows[0], FormRow::Field(VoterField::VoterName));
        assert_eq!(rows[rows.len() - 1], FormRow::Location(LocationLevel::Village));
    }

    #[test]
    fn test_delete_target_label() {
        let t = DeleteTarget::User { uid: "u1".into(), email: "a@example.com".into() };
        assert_eq!(t.label(), "a@example.com");
    }

    #[test]
    fn test_can_add_email_char() {
        assert!(can_add_email_char(0, 'a'));
        assert!(can_add_email_char(63, '@'));
        assert!(!can_add_email_char(64, 'a'));
        assert!(!can_add_email_char(0, '\n'));
    }

    #[test]
    fn test_can_add_password_char() {
        assert!(can_add_password_char(127, '!'));
        assert!(!can_add_password_char(128, 'a'));
        assert!(!can_add_password_char(0, '\x00'));
    }

    fn app_with_session(dir: &std::path::Path, age: Duration, refresh_token: &str) -> App {
        let mut session = Session::new(dir.to_path_buf());
        session.update(SessionData {
            id_token: "id-token".into(),
            refresh_token: refresh_token.into(),
            uid: "admin-1".into(),
            email: "admin@example.com".into(),
            expires_in_secs: 3600,
            created_at: Utc::now() - age,
        });
        let store = StoreClient::new("voterbook-test", "test-key").unwrap();
        let cache = CacheManager::new(dir.to_path_buf()).unwrap();
        let mut app = App::from_parts(Config::default(), session, Some(store), cache);

        let mut user = AppUser::new("admin-1", "admin@example.com", Role::SuperAdmin, LocationPath::default());
        user.approved = true;
        app.principal = Some(Principal::new(user).unwrap());
        app
    }

    #[tokio::test]
    async fn test_write_with_live_token_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_session(dir.path(), Duration::minutes(10), "refresh-token");
        assert!(app.writable().await.is_some());
        assert_eq!(app.state, AppState::Normal);
    }

    #[tokio::test]
    async fn test_write_renews_expired_token_first() {
        let dir = tempfile::tempdir().unwrap();
        // Expired an hour ago and cannot be renewed
        let mut app = app_with_session(dir.path(), Duration::hours(2), "");
        assert!(app.writable().await.is_none());
        assert_eq!(app.state, AppState::LoggingIn);
        assert!(app.login_error.is_some());
    }

    #[tokio::test]
    async fn test_offline_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app_with_session(dir.path(), Duration::minutes(10), "refresh-token");
        app.offline_mode = true;
        assert!(app.writable().await.is_none());
        assert_eq!(app.status_message.as_deref(), Some("Offline mode is read-only"));
    }
}
