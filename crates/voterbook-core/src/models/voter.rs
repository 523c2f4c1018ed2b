use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::LocationPath;

/// A document in the `voters` collection.
///
/// Optional fields that are unset are left out of the stored document
/// rather than written as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoterData {
    /// Document id, assigned by the store.
    #[serde(default, skip_serializing)]
    pub id: String,

    pub voter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_or_husband_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_name: Option<String>,

    // Demographics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marital_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub religion: Option<String>,

    // Registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_center: Option<String>,

    // Contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_members: Option<u32>,

    // Campaign
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub political_affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting_intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_family_abroad: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_transport: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(flatten)]
    pub location: LocationPath,

    // Audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl VoterData {
    pub fn new(voter_name: impl Into<String>, location: LocationPath) -> Self {
        Self {
            voter_name: voter_name.into(),
            location,
            ..Default::default()
        }
    }

    pub fn location(&self) -> &LocationPath {
        &self.location
    }

    pub fn age_str(&self) -> String {
        self.age.map(|a| a.to_string()).unwrap_or_default()
    }

    /// Lowercased haystack for free-text search.
    pub fn search_text(&self) -> String {
        [
            Some(self.voter_name.as_str()),
            self.father_or_husband_name.as_deref(),
            self.phone.as_deref(),
            self.nid.as_deref(),
            self.voter_serial.as_deref(),
            self.house_address.as_deref(),
        ]
        .iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// A partial update to a voter. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoterPatch {
    pub voter_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub occupation: Option<String>,
    pub political_affiliation: Option<String>,
    pub voting_intent: Option<String>,
    pub priority_level: Option<String>,
    pub needs_transport: Option<bool>,
    pub remarks: Option<String>,
    /// Replaces the whole location tuple when present.
    pub location: Option<LocationPath>,
}

impl VoterPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch in place and return the field paths that changed.
    pub fn apply(&self, voter: &mut VoterData) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let patch = self;

        macro_rules! patch {
            ($($field:ident),*) => {
                $(
                    if let Some(ref value) = patch.$field {
                        if voter.$field.as_ref() != Some(value) {
                            voter.$field = Some(value.clone());
                            changed.push(stringify!($field));
                        }
                    }
                )*
            };
        }

        if let Some(ref name) = self.voter_name {
            if &voter.voter_name != name {
                voter.voter_name = name.clone();
                changed.push("voter_name");
            }
        }

        patch!(
            age,
            gender,
            phone,
            occupation,
            political_affiliation,
            voting_intent,
            priority_level,
            needs_transport,
            remarks
        );

        if let Some(ref location) = self.location {
            for level in super::LocationLevel::ALL {
                if voter.location.get(level) != location.get(level) {
                    changed.push(level.id_field());
                }
            }
            voter.location = location.clone();
        }

        changed
    }
}

/// Columns the voter table can sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterSortColumn {
    Name,
    Age,
    Intent,
    Priority,
    Location,
}

impl VoterSortColumn {
    pub fn label(&self) -> &'static str {
        match self {
            VoterSortColumn::Name => "Name",
            VoterSortColumn::Age => "Age",
            VoterSortColumn::Intent => "Intent",
            VoterSortColumn::Priority => "Priority",
            VoterSortColumn::Location => "Location",
        }
    }
}

/// Sort rank for priority values; unknown priorities sort last.
pub fn priority_rank(priority: Option<&str>) -> u8 {
    match priority {
        Some("High") => 0,
        Some("Medium") => 1,
        Some("Low") => 2,
        _ => 3,
    }
}
