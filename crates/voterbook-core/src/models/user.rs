use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::{LocationLevel, LocationPath};

/// Administrative role of an application user.
///
/// Stored as a plain string. Strings outside the known set are preserved in
/// `Unknown` so a round trip through the client never rewrites them, but
/// they grant no access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    DivisionAdmin,
    DistrictAdmin,
    UpazilaAdmin,
    UnionAdmin,
    VillageAdmin,
    Unknown(String),
}

impl Role {
    /// Every assignable role, broadest first.
    pub const ASSIGNABLE: [Role; 6] = [
        Role::SuperAdmin,
        Role::DivisionAdmin,
        Role::DistrictAdmin,
        Role::UpazilaAdmin,
        Role::UnionAdmin,
        Role::VillageAdmin,
    ];

    /// The hierarchy level this role is pinned to.
    /// `None` for super admins (unrestricted) and unknown roles.
    pub fn scope_level(&self) -> Option<LocationLevel> {
        match self {
            Role::DivisionAdmin => Some(LocationLevel::Division),
            Role::DistrictAdmin => Some(LocationLevel::District),
            Role::UpazilaAdmin => Some(LocationLevel::Upazila),
            Role::UnionAdmin => Some(LocationLevel::Union),
            Role::VillageAdmin => Some(LocationLevel::Village),
            Role::SuperAdmin | Role::Unknown(_) => None,
        }
    }

    /// Role depth: 0 for super admin, 1..=5 down to village admin.
    pub fn depth(&self) -> Option<usize> {
        match self {
            Role::SuperAdmin => Some(0),
            Role::Unknown(_) => None,
            other => other.scope_level().map(|l| l.depth()),
        }
    }

    pub fn for_level(level: LocationLevel) -> Self {
        match level {
            LocationLevel::Division => Role::DivisionAdmin,
            LocationLevel::District => Role::DistrictAdmin,
            LocationLevel::Upazila => Role::UpazilaAdmin,
            LocationLevel::Union => Role::UnionAdmin,
            LocationLevel::Village => Role::VillageAdmin,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::DivisionAdmin => "division_admin",
            Role::DistrictAdmin => "district_admin",
            Role::UpazilaAdmin => "upazila_admin",
            Role::UnionAdmin => "union_admin",
            Role::VillageAdmin => "village_admin",
            Role::Unknown(s) => s.as_str(),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Role::SuperAdmin => "Super Admin".to_string(),
            Role::Unknown(s) => format!("Unknown ({})", s),
            other => format!("{} Admin", other.scope_level().map(|l| l.label()).unwrap_or("?")),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.trim() {
            "super_admin" => Role::SuperAdmin,
            "division_admin" => Role::DivisionAdmin,
            "district_admin" => Role::DistrictAdmin,
            "upazila_admin" => Role::UpazilaAdmin,
            "union_admin" => Role::UnionAdmin,
            "village_admin" => Role::VillageAdmin,
            _ => Role::Unknown(s),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A document in the `users` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    /// Document id; equals the auth service's user id.
    #[serde(default, skip_serializing)]
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub access_scope: LocationPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AppUser {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, role: Role, access_scope: LocationPath) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            name: None,
            role,
            approved: false,
            access_scope,
            created_at: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}
