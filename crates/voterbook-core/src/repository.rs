//! Voter and user repositories.
//!
//! Every call runs on behalf of a `Principal`. Listing pushes the
//! principal's scope down to the store as equality filters and re-checks
//! each returned record against the access rules before handing it out.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::access::{can_manage_user, has_access_to_voter, scope_constraints, AccessError, Principal};
use crate::api::ApiError;
use crate::hierarchy::{HierarchyError, LocationHierarchy};
use crate::import::{canonicalize_voter, parse_csv, FieldIssue, ImportError, RowError};
use crate::models::{AppUser, LocationLevel, LocationPath, Role, VoterData, VoterPatch};
use crate::store::{new_document_id, Document, DocumentStore, FieldFilter, Write, MAX_BATCH_WRITES};
use crate::utils::{cmp_ignore_case, contains_ignore_case};

pub const VOTERS_COLLECTION: &str = "voters";
pub const USERS_COLLECTION: &str = "users";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Invalid voter: {}", join_issues(.0))]
    Validation(Vec<FieldIssue>),

    #[error("No {collection} record with id {id}")]
    NotFound { collection: &'static str, id: String },

    #[error("Import stopped after {written} voters were saved: {source}")]
    PartialImport {
        written: usize,
        #[source]
        source: ApiError,
    },
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RepositoryError {
    /// Short Bengali message for the status bar.
    pub fn user_message(&self) -> &'static str {
        match self {
            RepositoryError::Api(e) | RepositoryError::PartialImport { source: e, .. } => e.user_message(),
            RepositoryError::Access(e) => e.user_message(),
            RepositoryError::Import(e) => e.user_message(),
            RepositoryError::Hierarchy(_) => "অবস্থান তথ্য সঠিক নয়",
            RepositoryError::Validation(_) => "প্রদত্ত তথ্য সঠিক নয়",
            RepositoryError::NotFound { .. } => "তথ্য পাওয়া যায়নি",
        }
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Voter list filter. Location constraints go to the store; the rest
/// apply client-side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoterFilter {
    pub location: LocationPath,
    pub search: Option<String>,
    pub voting_intent: Option<String>,
    pub priority_level: Option<String>,
    pub gender: Option<String>,
}

impl VoterFilter {
    pub fn at(location: LocationPath) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, voter: &VoterData) -> bool {
        let location_ok = LocationLevel::ALL.iter().all(|level| match self.location.get(*level) {
            Some(id) => voter.location.get(*level) == Some(id),
            None => true,
        });
        let eq = |want: &Option<String>, have: &Option<String>| match want {
            Some(w) => have.as_deref() == Some(w.as_str()),
            None => true,
        };
        let search_ok = match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => contains_ignore_case(&voter.search_text(), q),
            _ => true,
        };
        location_ok
            && search_ok
            && eq(&self.voting_intent, &voter.voting_intent)
            && eq(&self.priority_level, &voter.priority_level)
            && eq(&self.gender, &voter.gender)
    }

    /// One-line description for report headers and the status bar.
    pub fn summary(&self, hierarchy: Option<&LocationHierarchy>) -> String {
        let mut parts = Vec::new();
        if !self.location.is_empty() {
            parts.push(match hierarchy {
                Some(h) => h.display_path(&self.location),
                None => self
                    .location
                    .constraints()
                    .into_iter()
                    .map(|(_, id)| id)
                    .collect::<Vec<_>>()
                    .join(" › "),
            });
        }
        if let Some(ref q) = self.search {
            parts.push(format!("\"{}\"", q));
        }
        for (label, value) in [
            ("Intent", &self.voting_intent),
            ("Priority", &self.priority_level),
            ("Gender", &self.gender),
        ] {
            if let Some(v) = value {
                parts.push(format!("{}: {}", label, v));
            }
        }
        if parts.is_empty() {
            "All voters".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Merge scope and filter constraints. Returns None when they contradict,
/// meaning nothing can match.
fn merge_constraints(scope: Vec<(&'static str, String)>, filter: &LocationPath) -> Option<Vec<FieldFilter>> {
    let mut merged: BTreeMap<&'static str, String> = BTreeMap::new();
    for (field, id) in scope.into_iter().chain(filter.constraints()) {
        match merged.get(field) {
            Some(existing) if *existing != id => return None,
            _ => {
                merged.insert(field, id);
            }
        }
    }
    // Keep root-first order so the query reads naturally in logs
    let mut filters: Vec<FieldFilter> = LocationLevel::ALL
        .iter()
        .filter_map(|level| merged.remove(level.id_field()).map(|id| FieldFilter::eq(level.id_field(), id)))
        .collect();
    filters.extend(merged.into_iter().map(|(f, id)| FieldFilter::eq(f, id)));
    Some(filters)
}

/// Summary of a completed import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    /// File lines skipped because `Voter Name` was empty.
    pub skipped: Vec<usize>,
    pub batches: usize,
}

#[derive(Clone)]
pub struct VoterRepository {
    store: Arc<dyn DocumentStore>,
    hierarchy: Option<Arc<LocationHierarchy>>,
}

impl VoterRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, hierarchy: None }
    }

    /// Attach the location hierarchy so writes are checked against it.
    pub fn with_hierarchy(mut self, hierarchy: Arc<LocationHierarchy>) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    fn decode(doc: Document) -> Option<VoterData> {
        let id = doc.id.clone();
        match doc.into_typed::<VoterData>() {
            Ok(mut voter) => {
                voter.id = id;
                Some(voter)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping malformed voter document");
                None
            }
        }
    }

    fn check_location(&self, principal: &Principal, location: &LocationPath) -> Result<()> {
        principal.require_access(location)?;
        if let Some(ref h) = self.hierarchy {
            h.resolve_path(location)?;
        }
        Ok(())
    }

    /// Voters visible to `principal` that match `filter`, sorted by name.
    pub async fn list(&self, principal: &Principal, filter: &VoterFilter) -> Result<Vec<VoterData>> {
        let Some(scope) = scope_constraints(principal.user()) else {
            debug!(uid = principal.uid(), "Principal has no usable scope, returning no voters");
            return Ok(Vec::new());
        };
        let Some(filters) = merge_constraints(scope, &filter.location) else {
            debug!("Filter lies outside scope, returning no voters");
            return Ok(Vec::new());
        };

        let docs = self.store.query(VOTERS_COLLECTION, &filters).await?;
        let fetched = docs.len();
        let mut voters: Vec<VoterData> = docs
            .into_iter()
            .filter_map(Self::decode)
            .filter(|v| has_access_to_voter(principal.user(), v) && filter.matches(v))
            .collect();
        voters.sort_by(|a, b| cmp_ignore_case(&a.voter_name, &b.voter_name));

        debug!(
            constraints = filters.len(),
            fetched,
            visible = voters.len(),
            "Listed voters"
        );
        Ok(voters)
    }

    pub async fn count(&self, principal: &Principal, filter: &VoterFilter) -> Result<usize> {
        Ok(self.list(principal, filter).await?.len())
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<VoterData> {
        let doc = self
            .store
            .get(VOTERS_COLLECTION, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                collection: VOTERS_COLLECTION,
                id: id.to_string(),
            })?;
        let mut voter: VoterData = doc.into_typed()?;
        voter.id = id.to_string();
        principal.require_access(voter.location())?;
        Ok(voter)
    }

    /// Validate and store a new voter in canonical form. Returns it with
    /// its assigned id.
    pub async fn create(&self, principal: &Principal, mut voter: VoterData) -> Result<VoterData> {
        canonicalize_voter(&mut voter).map_err(RepositoryError::Validation)?;
        self.check_location(principal, voter.location())?;

        let now = Utc::now();
        voter.created_by = Some(principal.uid().to_string());
        voter.created_at = Some(now);
        voter.updated_at = Some(now);

        let doc = Document::from_typed("", &voter)?;
        voter.id = self.store.create(VOTERS_COLLECTION, None, doc.fields).await?;
        info!(id = %voter.id, "Voter created");
        Ok(voter)
    }

    /// Apply `patch` and write only the fields that changed.
    pub async fn update(&self, principal: &Principal, id: &str, patch: &VoterPatch) -> Result<VoterData> {
        let mut voter = self.get(principal, id).await?;
        if patch.is_empty() {
            return Ok(voter);
        }

        let mut changed = patch.apply(&mut voter);
        if changed.is_empty() {
            return Ok(voter);
        }
        // Canonical rewrites of stored legacy values are written too
        let rewritten = canonicalize_voter(&mut voter).map_err(RepositoryError::Validation)?;
        for field in rewritten {
            if !changed.contains(&field.key()) {
                changed.push(field.key());
            }
        }
        if changed.iter().any(|f| f.ends_with("_id")) {
            self.check_location(principal, voter.location())?;
        }

        voter.updated_at = Some(Utc::now());
        changed.push("updated_at");

        // Masked fields missing from the body are removed from the document
        let mut doc = Document::from_typed(id, &voter)?;
        doc.fields.retain(|k, _| changed.contains(&k.as_str()));
        let mask: Vec<String> = changed.iter().map(|f| f.to_string()).collect();
        self.store.update(VOTERS_COLLECTION, id, doc.fields, &mask).await?;
        info!(id, fields = ?changed, "Voter updated");
        Ok(voter)
    }

    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<()> {
        self.get(principal, id).await?;
        self.store.delete(VOTERS_COLLECTION, id).await?;
        info!(id, "Voter deleted");
        Ok(())
    }

    /// Import a voter CSV.
    ///
    /// Every row is checked before anything is written. Any invalid or
    /// out-of-scope row rejects the whole file. Valid rows are written in
    /// atomic batches of at most `MAX_BATCH_WRITES`.
    pub async fn import_csv<R: Read>(
        &self,
        principal: &Principal,
        reader: R,
        defaults: Option<&LocationPath>,
    ) -> Result<ImportReport> {
        let defaults = defaults.cloned().unwrap_or_else(|| principal.default_location());
        let mut plan = parse_csv(reader, self.hierarchy.as_deref(), &defaults)?;

        for row in &plan.rows {
            if !principal.can_access(row.voter.location()) {
                plan.errors.push(RowError {
                    line: row.line,
                    field: None,
                    message: "Location is outside your access scope".to_string(),
                });
            }
        }
        if !plan.errors.is_empty() {
            plan.errors.sort_by_key(|e| e.line);
            warn!(errors = plan.errors.len(), "Import rejected");
            return Err(ImportError::Rejected(plan.errors).into());
        }

        let mut report = ImportReport {
            skipped: plan.skipped,
            ..Default::default()
        };
        if plan.rows.is_empty() {
            info!(skipped = report.skipped.len(), "Import had no rows to write");
            return Ok(report);
        }

        let now = Utc::now();
        let mut writes = Vec::with_capacity(plan.rows.len());
        for row in plan.rows {
            let mut voter = row.voter;
            voter.created_by = Some(principal.uid().to_string());
            voter.created_at = Some(now);
            voter.updated_at = Some(now);
            let doc = Document::from_typed(new_document_id(), &voter)?;
            writes.push(Write::Create {
                collection: VOTERS_COLLECTION.to_string(),
                id: doc.id,
                fields: doc.fields,
            });
        }

        for chunk in writes.chunks(MAX_BATCH_WRITES) {
            if let Err(source) = self.store.commit(chunk.to_vec()).await {
                return Err(if report.imported == 0 {
                    source.into()
                } else {
                    RepositoryError::PartialImport {
                        written: report.imported,
                        source,
                    }
                });
            }
            report.imported += chunk.len();
            report.batches += 1;
        }

        info!(
            imported = report.imported,
            skipped = report.skipped.len(),
            batches = report.batches,
            "Import complete"
        );
        Ok(report)
    }
}

/// The `users` collection.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The user document for `uid`, if one exists.
    pub async fn current(&self, uid: &str) -> Result<Option<AppUser>> {
        let Some(doc) = self.store.get(USERS_COLLECTION, uid).await? else {
            return Ok(None);
        };
        let mut user: AppUser = doc.into_typed()?;
        user.uid = uid.to_string();
        Ok(Some(user))
    }

    /// Look up `uid` and wrap it as a principal. Fails for missing or
    /// unapproved accounts.
    pub async fn principal(&self, uid: &str) -> Result<Principal> {
        let user = self.require(uid).await?;
        Ok(Principal::new(user)?)
    }

    async fn require(&self, uid: &str) -> Result<AppUser> {
        self.current(uid).await?.ok_or_else(|| RepositoryError::NotFound {
            collection: USERS_COLLECTION,
            id: uid.to_string(),
        })
    }

    /// Accounts `principal` may see: everyone for super admins, otherwise
    /// themselves plus the accounts they can manage.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<AppUser>> {
        let docs = self.store.query(USERS_COLLECTION, &[]).await?;
        let mut users: Vec<AppUser> = docs
            .into_iter()
            .filter_map(|doc| {
                let uid = doc.id.clone();
                match doc.into_typed::<AppUser>() {
                    Ok(mut user) => {
                        user.uid = uid;
                        Some(user)
                    }
                    Err(e) => {
                        warn!(uid = %uid, error = %e, "Skipping malformed user document");
                        None
                    }
                }
            })
            .filter(|u| u.uid == principal.uid() || can_manage_user(principal.user(), &u.role, &u.access_scope))
            .collect();
        users.sort_by(|a, b| {
            (!a.approved, a.role.depth().unwrap_or(usize::MAX), a.display_name().to_lowercase()).cmp(&(
                !b.approved,
                b.role.depth().unwrap_or(usize::MAX),
                b.display_name().to_lowercase(),
            ))
        });
        Ok(users)
    }

    /// Create the user document for a freshly signed-up account. The
    /// account starts unapproved and sees nothing until approved.
    pub async fn register(
        &self,
        uid: &str,
        email: &str,
        name: Option<&str>,
        requested_role: Role,
        requested_scope: LocationPath,
    ) -> Result<AppUser> {
        let mut user = AppUser::new(uid, email, requested_role, requested_scope);
        user.name = name.map(str::to_string);
        user.created_at = Some(Utc::now());

        let doc = Document::from_typed(uid, &user)?;
        self.store.create(USERS_COLLECTION, Some(uid), doc.fields).await?;
        info!(uid, role = %user.role, "User registered, awaiting approval");
        Ok(user)
    }

    pub async fn approve(&self, principal: &Principal, uid: &str) -> Result<AppUser> {
        let mut target = self.require(uid).await?;
        principal.require_manage(&target.role, &target.access_scope)?;
        target.approved = true;

        let mut fields = serde_json::Map::new();
        fields.insert("approved".to_string(), Value::Bool(true));
        self.store
            .update(USERS_COLLECTION, uid, fields, &["approved".to_string()])
            .await?;
        info!(uid, by = principal.uid(), "User approved");
        Ok(target)
    }

    /// Change a user's role and scope. The actor must be able to manage the
    /// account both as it is and as it will be.
    pub async fn assign(&self, principal: &Principal, uid: &str, role: Role, scope: LocationPath) -> Result<AppUser> {
        let mut target = self.require(uid).await?;
        principal.require_manage(&target.role, &target.access_scope)?;

        let mut scope = scope;
        match role.scope_level() {
            Some(level) => scope.truncate(level),
            None => scope = LocationPath::default(),
        }
        principal.require_manage(&role, &scope)?;

        target.role = role;
        target.access_scope = scope;
        let doc = Document::from_typed(uid, &target)?;
        let mask = vec!["role".to_string(), "accessScope".to_string()];
        let fields = doc.fields.into_iter().filter(|(k, _)| mask.contains(k)).collect();
        self.store.update(USERS_COLLECTION, uid, fields, &mask).await?;
        info!(uid, role = %target.role, by = principal.uid(), "User reassigned");
        Ok(target)
    }

    pub async fn delete(&self, principal: &Principal, uid: &str) -> Result<()> {
        if uid == principal.uid() {
            return Err(AccessError::CannotManage {
                actor: principal.role().to_string(),
                target: "own".to_string(),
            }
            .into());
        }
        let target = self.require(uid).await?;
        principal.require_manage(&target.role, &target.access_scope)?;
        self.store.delete(USERS_COLLECTION, uid).await?;
        info!(uid, by = principal.uid(), "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::sample;
    use crate::store::MemoryStore;

    fn principal(role: Role, ids: &[&str]) -> Principal {
        let mut user = AppUser::new("admin-1", "admin@example.com", role, LocationPath::from_ids(ids));
        user.approved = true;
        Principal::new(user).unwrap()
    }

    fn repo() -> (Arc<MemoryStore>, VoterRepository) {
        let store = Arc::new(MemoryStore::new());
        let repo = VoterRepository::new(store.clone()).with_hierarchy(Arc::new(sample()));
        (store, repo)
    }

    fn seed(store: &MemoryStore, id: &str, name: &str, ids: &[&str]) {
        store
            .seed(VOTERS_COLLECTION, id, &VoterData::new(name, LocationPath::from_ids(ids)))
            .unwrap();
    }

    #[test]
    fn test_merge_constraints() {
        let scope = vec![("division_id", "6".to_string()), ("district_id", "47".to_string())];
        let filters = merge_constraints(scope.clone(), &LocationPath::from_ids(&["6", "47", "367"])).unwrap();
        let fields: Vec<_> = filters.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["division_id", "district_id", "upazila_id"]);

        assert!(merge_constraints(scope, &LocationPath::from_ids(&["6", "41"])).is_none());
    }

    #[test]
    fn test_filter_summary() {
        let filter = VoterFilter {
            location: LocationPath::from_ids(&["6", "47"]),
            voting_intent: Some("Yes".into()),
            ..Default::default()
        };
        assert_eq!(filter.summary(Some(&sample())), "Dhaka › Dhaka, Intent: Yes");
        assert_eq!(VoterFilter::default().summary(None), "All voters");
    }

    #[tokio::test]
    async fn test_list_is_scoped() {
        let (store, repo) = repo();
        seed(&store, "a", "Amina", &["6", "47", "367"]);
        seed(&store, "b", "Babul", &["6", "47", "368"]);
        seed(&store, "c", "Chandan", &["6", "41", "330"]);

        let upazila = principal(Role::UpazilaAdmin, &["6", "47", "367"]);
        let visible = repo.list(&upazila, &VoterFilter::default()).await.unwrap();
        assert_eq!(visible.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(), vec!["a"]);

        let district = principal(Role::DistrictAdmin, &["6", "47"]);
        assert_eq!(repo.count(&district, &VoterFilter::default()).await.unwrap(), 2);

        let outside = VoterFilter::at(LocationPath::from_ids(&["6", "41"]));
        assert!(repo.list(&district, &outside).await.unwrap().is_empty());

        let sa = principal(Role::SuperAdmin, &[]);
        let names: Vec<_> = repo
            .list(&sa, &VoterFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.voter_name)
            .collect();
        assert_eq!(names, vec!["Amina", "Babul", "Chandan"]);
    }

    #[tokio::test]
    async fn test_unknown_role_sees_nothing() {
        let (store, repo) = repo();
        seed(&store, "a", "Amina", &["6", "47", "367"]);
        let odd = principal(Role::Unknown("observer".into()), &["6"]);
        assert!(repo.list(&odd, &VoterFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_access_and_fields() {
        let (store, repo) = repo();
        let upazila = principal(Role::UpazilaAdmin, &["6", "47", "367"]);

        let outside = VoterData::new("X", LocationPath::from_ids(&["6", "47", "368"]));
        assert!(matches!(
            repo.create(&upazila, outside).await,
            Err(RepositoryError::Access(AccessError::OutOfScope(_)))
        ));

        let incomplete = VoterData::new("Y", LocationPath::from_ids(&["6", "47"]));
        assert!(matches!(repo.create(&upazila, incomplete).await, Err(RepositoryError::Validation(_))));

        let ok = VoterData::new("Z", LocationPath::from_ids(&["6", "47", "367", "3701"]));
        let created = repo.create(&upazila, ok).await.unwrap();
        assert_eq!(created.id.len(), 20);
        assert_eq!(created.created_by.as_deref(), Some("admin-1"));
        assert_eq!(store.len(VOTERS_COLLECTION), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_broken_chain() {
        let (_store, repo) = repo();
        let sa = principal(Role::SuperAdmin, &[]);
        let broken = VoterData::new("X", LocationPath::from_ids(&["6", "47", "330"]));
        assert!(matches!(repo.create(&sa, broken).await, Err(RepositoryError::Hierarchy(_))));
    }

    #[tokio::test]
    async fn test_update_writes_changed_fields_only() {
        let (store, repo) = repo();
        let mut voter = VoterData::new("Amina", LocationPath::from_ids(&["6", "47", "367", "3701"]));
        voter.remarks = Some("keep".into());
        store.seed(VOTERS_COLLECTION, "a", &voter).unwrap();
        let sa = principal(Role::SuperAdmin, &[]);

        let patch = VoterPatch {
            voting_intent: Some("Yes".into()),
            location: Some(LocationPath::from_ids(&["6", "47", "367"])),
            ..Default::default()
        };
        let updated = repo.update(&sa, "a", &patch).await.unwrap();
        assert_eq!(updated.voting_intent.as_deref(), Some("Yes"));

        let doc = store.get(VOTERS_COLLECTION, "a").await.unwrap().unwrap();
        assert_eq!(doc.fields["voting_intent"], "Yes");
        assert_eq!(doc.fields["remarks"], "keep");
        assert!(!doc.fields.contains_key("union_id"));
        assert!(doc.fields.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn test_create_stores_canonical_values() {
        let (store, repo) = repo();
        let sa = principal(Role::SuperAdmin, &[]);
        let mut voter = VoterData::new("Salma", LocationPath::from_ids(&["6", "47", "367"]));
        voter.gender = Some("female".into());
        voter.voting_intent = Some("yes".into());
        voter.phone = Some("+88 01712-345678".into());
        let created = repo.create(&sa, voter).await.unwrap();

        let doc = store.get(VOTERS_COLLECTION, &created.id).await.unwrap().unwrap();
        assert_eq!(doc.fields["gender"], "Female");
        assert_eq!(doc.fields["voting_intent"], "Yes");
        assert_eq!(doc.fields["phone"], "01712345678");

        let female = VoterFilter {
            gender: Some("Female".into()),
            ..Default::default()
        };
        assert_eq!(repo.count(&sa, &female).await.unwrap(), 1);
        let yes = VoterFilter {
            voting_intent: Some("Yes".into()),
            ..Default::default()
        };
        assert_eq!(repo.count(&sa, &yes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_canonicalizes_patch_and_legacy_values() {
        let (store, repo) = repo();
        let mut legacy = VoterData::new("Amina", LocationPath::from_ids(&["6", "47", "367"]));
        legacy.gender = Some("FEMALE".into());
        store.seed(VOTERS_COLLECTION, "a", &legacy).unwrap();
        let sa = principal(Role::SuperAdmin, &[]);

        let patch = VoterPatch {
            priority_level: Some("high".into()),
            phone: Some("০১৭১২৩৪৫৬৭৮".into()),
            ..Default::default()
        };
        let updated = repo.update(&sa, "a", &patch).await.unwrap();
        assert_eq!(updated.priority_level.as_deref(), Some("High"));

        let doc = store.get(VOTERS_COLLECTION, "a").await.unwrap().unwrap();
        assert_eq!(doc.fields["priority_level"], "High");
        assert_eq!(doc.fields["phone"], "01712345678");
        assert_eq!(doc.fields["gender"], "Female");

        let bad = VoterPatch {
            voting_intent: Some("maybe".into()),
            ..Default::default()
        };
        assert!(matches!(repo.update(&sa, "a", &bad).await, Err(RepositoryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete_check_scope() {
        let (store, repo) = repo();
        seed(&store, "b", "Babul", &["6", "47", "368"]);
        let upazila = principal(Role::UpazilaAdmin, &["6", "47", "367"]);
        let patch = VoterPatch {
            remarks: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(repo.update(&upazila, "b", &patch).await, Err(RepositoryError::Access(_))));
        assert!(matches!(repo.delete(&upazila, "b").await, Err(RepositoryError::Access(_))));
        assert!(matches!(
            repo.delete(&upazila, "missing").await,
            Err(RepositoryError::NotFound { .. })
        ));
        assert_eq!(store.len(VOTERS_COLLECTION), 1);
    }

    #[tokio::test]
    async fn test_import_blocks_on_any_invalid_row() {
        let (store, repo) = repo();
        let sa = principal(Role::SuperAdmin, &[]);
        let csv = "Voter Name,Age,Division,District,Upazila\n\
                   Amina,30,Dhaka,Dhaka,Dhamrai\n\
                   Babul,200,Dhaka,Dhaka,Dhamrai\n";
        let err = repo.import_csv(&sa, csv.as_bytes(), None).await.unwrap_err();
        match err {
            RepositoryError::Import(ImportError::Rejected(errors)) => assert_eq!(errors[0].line, 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_import_rejects_out_of_scope_rows() {
        let (store, repo) = repo();
        let upazila = principal(Role::UpazilaAdmin, &["6", "47", "367"]);
        let csv = "Voter Name,Upazila\nAmina,Dhamrai\nBabul,Savar\n";
        let err = repo.import_csv(&upazila, csv.as_bytes(), None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Import(ImportError::Rejected(ref e)) if e.len() == 1));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_import_zero_rows_writes_nothing() {
        let (store, repo) = repo();
        let sa = principal(Role::SuperAdmin, &[]);
        let report = repo.import_csv(&sa, "Voter Name,Age\n,30\n".as_bytes(), None).await.unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, vec![2]);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_import_chunks_batches() {
        let (store, repo) = repo();
        let sa = principal(Role::SuperAdmin, &[]);
        let mut csv = String::from("Voter Name,Division,District,Upazila\n");
        for i in 0..1001 {
            csv.push_str(&format!("Voter {},6,47,367\n", i));
        }
        let report = repo.import_csv(&sa, csv.as_bytes(), None).await.unwrap();
        assert_eq!(report.imported, 1001);
        assert_eq!(report.batches, 3);
        assert_eq!(store.commit_count(), 3);
        assert_eq!(store.len(VOTERS_COLLECTION), 1001);
    }

    #[tokio::test]
    async fn test_user_approval_flow() {
        let store = Arc::new(MemoryStore::new());
        let users = UserRepository::new(store.clone());

        let mut admin = AppUser::new("admin-1", "da@example.com", Role::DistrictAdmin, LocationPath::from_ids(&["6", "47"]));
        admin.approved = true;
        store.seed(USERS_COLLECTION, "admin-1", &admin).unwrap();

        users
            .register("new-1", "ua@example.com", Some("Rahim"), Role::UpazilaAdmin, LocationPath::from_ids(&["6", "47", "367"]))
            .await
            .unwrap();
        assert!(matches!(users.principal("new-1").await, Err(RepositoryError::Access(AccessError::NotApproved(_)))));

        let actor = users.principal("admin-1").await.unwrap();
        assert_eq!(users.list(&actor).await.unwrap().len(), 2);
        users.approve(&actor, "new-1").await.unwrap();
        assert!(users.principal("new-1").await.is_ok());

        let moved = users
            .assign(&actor, "new-1", Role::UnionAdmin, LocationPath::from_ids(&["6", "47", "367", "3701", "90001"]))
            .await
            .unwrap();
        assert_eq!(moved.access_scope, LocationPath::from_ids(&["6", "47", "367", "3701"]));

        assert!(users
            .assign(&actor, "new-1", Role::UnionAdmin, LocationPath::from_ids(&["6", "41", "330", "1"]))
            .await
            .is_err());
        assert!(users.delete(&actor, "admin-1").await.is_err());
        users.delete(&actor, "new-1").await.unwrap();
        assert!(users.current("new-1").await.unwrap().is_none());
    }
}
