//! Location-scoped access control.
//!
//! A user's role pins them to one level of the location hierarchy and their
//! `access_scope` names the node at that level (plus its ancestors). A user
//! may act on a record only if the record's location tuple agrees with the
//! scope on every level down to the role's level. Super admins see
//! everything; unknown roles and incomplete scopes see nothing.
//!
//! This is the only implementation of the check. The repositories, the
//! voter form and every TUI screen go through it.

use thiserror::Error;

use crate::models::{AppUser, LocationLevel, LocationPath, Role, VoterData};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Account {0} is awaiting approval")]
    NotApproved(String),

    #[error("Location is outside the access scope of {0}")]
    OutOfScope(String),

    #[error("{actor} may not manage a {target} account")]
    CannotManage { actor: String, target: String },

    #[error("Role {role} requires a scope down to {level}")]
    IncompleteScope { role: String, level: LocationLevel },
}

impl AccessError {
    /// Short Bengali message for the status bar.
    pub fn user_message(&self) -> &'static str {
        match self {
            AccessError::NotApproved(_) => "আপনার অ্যাকাউন্ট এখনও অনুমোদিত হয়নি",
            AccessError::OutOfScope(_) | AccessError::CannotManage { .. } => {
                "এই কাজের অনুমতি আপনার নেই"
            }
            AccessError::IncompleteScope { .. } => "অবস্থান তথ্য অসম্পূর্ণ",
        }
    }
}

fn level_matches(scope: &LocationPath, target: &LocationPath, level: LocationLevel) -> bool {
    match (scope.get(level), target.get(level)) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

/// Whether `user` may view or edit a record located at `target`.
pub fn can_access_location(user: &AppUser, target: &LocationPath) -> bool {
    match (&user.role, user.role.scope_level()) {
        (Role::SuperAdmin, _) => true,
        (_, Some(role_level)) => LocationLevel::ALL
            .iter()
            .take_while(|level| **level <= role_level)
            .all(|level| level_matches(&user.access_scope, target, *level)),
        (_, None) => false,
    }
}

pub fn has_access_to_voter(user: &AppUser, voter: &VoterData) -> bool {
    can_access_location(user, voter.location())
}

/// Equality constraints that restrict a store query to the user's scope.
///
/// `Some(vec![])` means unrestricted. `None` means the user can see nothing
/// and the query should not be sent at all.
pub fn scope_constraints(user: &AppUser) -> Option<Vec<(&'static str, String)>> {
    match (&user.role, user.role.scope_level()) {
        (Role::SuperAdmin, _) => Some(Vec::new()),
        (_, Some(role_level)) => {
            if !scope_is_complete(&user.role, &user.access_scope) {
                return None;
            }
            let mut scope = user.access_scope.clone();
            scope.truncate(role_level);
            Some(scope.constraints())
        }
        (_, None) => None,
    }
}

/// A scope is complete for a role when every level down to the role's
/// level carries an id. Super admins need no scope; unknown roles never
/// have a complete one.
pub fn scope_is_complete(role: &Role, scope: &LocationPath) -> bool {
    match (role, role.scope_level()) {
        (Role::SuperAdmin, _) => true,
        (_, Some(role_level)) => LocationLevel::ALL
            .iter()
            .take_while(|level| **level <= role_level)
            .all(|level| scope.get(*level).is_some_and(|id| !id.is_empty())),
        (_, None) => false,
    }
}

/// Whether `actor` may approve, re-scope or delete an account holding
/// `target_role` at `target_scope`.
///
/// Super admins manage everyone. Other admins manage only strictly deeper
/// roles whose scope lies inside their own.
pub fn can_manage_user(actor: &AppUser, target_role: &Role, target_scope: &LocationPath) -> bool {
    if actor.role == Role::SuperAdmin {
        return true;
    }
    let (Some(actor_depth), Some(target_depth)) = (actor.role.depth(), target_role.depth()) else {
        return false;
    };
    target_depth > actor_depth
        && scope_is_complete(target_role, target_scope)
        && can_access_location(actor, target_scope)
}

/// An approved user on whose behalf repository calls run.
#[derive(Debug, Clone)]
pub struct Principal {
    user: AppUser,
}

impl Principal {
    pub fn new(user: AppUser) -> Result<Self, AccessError> {
        if !user.approved {
            return Err(AccessError::NotApproved(user.email.clone()));
        }
        Ok(Self { user })
    }

    pub fn user(&self) -> &AppUser {
        &self.user
    }

    pub fn uid(&self) -> &str {
        &self.user.uid
    }

    pub fn role(&self) -> &Role {
        &self.user.role
    }

    pub fn can_access(&self, target: &LocationPath) -> bool {
        can_access_location(&self.user, target)
    }

    pub fn require_access(&self, target: &LocationPath) -> Result<(), AccessError> {
        if self.can_access(target) {
            Ok(())
        } else {
            Err(AccessError::OutOfScope(self.user.email.clone()))
        }
    }

    pub fn require_manage(&self, target_role: &Role, target_scope: &LocationPath) -> Result<(), AccessError> {
        if let Some(level) = target_role.scope_level() {
            if !scope_is_complete(target_role, target_scope) {
                return Err(AccessError::IncompleteScope {
                    role: target_role.to_string(),
                    level,
                });
            }
        }
        if can_manage_user(&self.user, target_role, target_scope) {
            Ok(())
        } else {
            Err(AccessError::CannotManage {
                actor: self.user.role.to_string(),
                target: target_role.to_string(),
            })
        }
    }

    /// The scope a new record defaults to: the user's scope cut at the
    /// role's level, or empty for super admins.
    pub fn default_location(&self) -> LocationPath {
        match self.user.role.scope_level() {
            Some(level) => {
                let mut scope = self.user.access_scope.clone();
                scope.truncate(level);
                scope
            }
            None => LocationPath::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, ids: &[&str]) -> AppUser {
        let mut u = AppUser::new("uid-1", "admin@example.com", role, LocationPath::from_ids(ids));
        u.approved = true;
        u
    }

    #[test]
    fn test_super_admin_sees_everything() {
        let admin = user(Role::SuperAdmin, &[]);
        assert!(can_access_location(&admin, &LocationPath::default()));
        assert!(can_access_location(&admin, &LocationPath::from_ids(&["7", "60"])));
        assert_eq!(scope_constraints(&admin), Some(vec![]));
    }

    #[test]
    fn test_village_admin_requires_full_match() {
        let va = user(Role::VillageAdmin, &["3", "18", "152", "1400", "9001"]);

        assert!(can_access_location(&va, &LocationPath::from_ids(&["3", "18", "152", "1400", "9001"])));
        // Same village id under a different union is not the same village
        assert!(!can_access_location(&va, &LocationPath::from_ids(&["3", "18", "152", "1401", "9001"])));
        assert!(!can_access_location(&va, &LocationPath::from_ids(&["3", "18", "152", "1400", "9002"])));
        // Missing village on the target fails
        assert!(!can_access_location(&va, &LocationPath::from_ids(&["3", "18", "152", "1400"])));
    }

    #[test]
    fn test_district_admin_ignores_deeper_levels() {
        let da = user(Role::DistrictAdmin, &["3", "18"]);
        assert!(can_access_location(&da, &LocationPath::from_ids(&["3", "18"])));
        assert!(can_access_location(&da, &LocationPath::from_ids(&["3", "18", "152", "1400"])));
        assert!(!can_access_location(&da, &LocationPath::from_ids(&["3", "19", "160"])));
        assert!(!can_access_location(&da, &LocationPath::from_ids(&["4", "18"])));
    }

    #[test]
    fn test_unknown_role_fails_closed() {
        let u = user(Role::Unknown("volunteer".into()), &["3", "18"]);
        assert!(!can_access_location(&u, &LocationPath::from_ids(&["3", "18"])));
        assert_eq!(scope_constraints(&u), None);
    }

    #[test]
    fn test_incomplete_scope_fails_closed() {
        // Upazila admin whose stored scope stops at district
        let u = user(Role::UpazilaAdmin, &["3", "18"]);
        assert!(!can_access_location(&u, &LocationPath::from_ids(&["3", "18", "152"])));
        assert_eq!(scope_constraints(&u), None);
    }

    #[test]
    fn test_scope_constraints_cut_at_role_level() {
        // Extra deeper ids on the scope do not narrow the query
        let u = user(Role::DistrictAdmin, &["3", "18", "152"]);
        assert_eq!(
            scope_constraints(&u),
            Some(vec![("division_id", "3".to_string()), ("district_id", "18".to_string())])
        );
    }

    #[test]
    fn test_can_manage_user() {
        let da = user(Role::DistrictAdmin, &["3", "18"]);
        assert!(can_manage_user(&da, &Role::UpazilaAdmin, &LocationPath::from_ids(&["3", "18", "152"])));
        assert!(!can_manage_user(&da, &Role::UpazilaAdmin, &LocationPath::from_ids(&["3", "19", "160"])));
        assert!(!can_manage_user(&da, &Role::DistrictAdmin, &LocationPath::from_ids(&["3", "18"])));
        assert!(!can_manage_user(&da, &Role::SuperAdmin, &LocationPath::default()));
        assert!(!can_manage_user(&da, &Role::UnionAdmin, &LocationPath::from_ids(&["3", "18"])));

        let sa = user(Role::SuperAdmin, &[]);
        assert!(can_manage_user(&sa, &Role::DivisionAdmin, &LocationPath::from_ids(&["3"])));
    }

    #[test]
    fn test_principal_rejects_unapproved() {
        let mut u = user(Role::SuperAdmin, &[]);
        u.approved = false;
        assert!(matches!(Principal::new(u), Err(AccessError::NotApproved(_))));
    }

    #[test]
    fn test_principal_default_location() {
        let p = Principal::new(user(Role::UpazilaAdmin, &["3", "18", "152", "1400"])).unwrap();
        assert_eq!(p.default_location(), LocationPath::from_ids(&["3", "18", "152"]));
        assert!(p.require_access(&LocationPath::from_ids(&["3", "18", "152"])).is_ok());
        assert!(p.require_access(&LocationPath::from_ids(&["3", "18"])).is_err());
    }
}
