//! The new-voter form: free-text inputs plus a cascading location picker.

use std::collections::HashMap;

use thiserror::Error;

use crate::access::Principal;
use crate::hierarchy::{HierarchyError, LocationHierarchy, LocationSelection};
use crate::import::{assign_field, validate_voter, FieldIssue, FieldRule};
use crate::models::{LocationLevel, VoterData, VoterField};
use crate::repository::{RepositoryError, VoterRepository};

/// Text inputs in display order. Location is picked separately.
pub const FORM_FIELDS: [VoterField; 23] = [
    VoterField::VoterName,
    VoterField::FatherOrHusbandName,
    VoterField::MotherName,
    VoterField::Age,
    VoterField::Gender,
    VoterField::MaritalStatus,
    VoterField::Occupation,
    VoterField::Education,
    VoterField::Religion,
    VoterField::Nid,
    VoterField::VoterSerial,
    VoterField::VotingCenter,
    VoterField::Phone,
    VoterField::Whatsapp,
    VoterField::Email,
    VoterField::HouseAddress,
    VoterField::FamilyMembers,
    VoterField::PoliticalAffiliation,
    VoterField::VotingIntent,
    VoterField::PriorityLevel,
    VoterField::HasFamilyAbroad,
    VoterField::NeedsTransport,
    VoterField::Remarks,
];

#[derive(Error, Debug)]
pub enum FormError {
    #[error("{}", .0.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; "))]
    Invalid(Vec<FieldIssue>),

    #[error(transparent)]
    Location(#[from] HierarchyError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl FormError {
    pub fn user_message(&self) -> &'static str {
        match self {
            FormError::Invalid(_) => "ফর্মে ভুল আছে",
            FormError::Location(_) => "অবস্থান তথ্য সঠিক নয়",
            FormError::Repository(e) => e.user_message(),
        }
    }

    /// Issues attached to `field`, for inline display.
    pub fn issues_for(&self, field: VoterField) -> Vec<&str> {
        match self {
            FormError::Invalid(issues) => issues
                .iter()
                .filter(|i| i.field == field)
                .map(|i| i.message.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VoterForm {
    values: HashMap<VoterField, String>,
    selection: LocationSelection,
}

impl VoterForm {
    /// An empty form whose location starts at, and is locked to, the
    /// principal's scope.
    pub fn new(principal: &Principal) -> Self {
        Self {
            values: HashMap::new(),
            selection: LocationSelection::for_principal(principal),
        }
    }

    pub fn get(&self, field: VoterField) -> &str {
        self.values.get(&field).map(String::as_str).unwrap_or_default()
    }

    pub fn set(&mut self, field: VoterField, value: impl Into<String>) {
        if field.location_level().is_none() {
            self.values.insert(field, value.into());
        }
    }

    pub fn selection(&self) -> &LocationSelection {
        &self.selection
    }

    /// Pick a location at `level`, clearing every level below it.
    pub fn select_location(
        &mut self,
        hierarchy: &LocationHierarchy,
        level: LocationLevel,
        id: Option<&str>,
    ) -> Result<(), HierarchyError> {
        self.selection.select(hierarchy, level, id)
    }

    /// Clear all inputs and every unlocked location level.
    pub fn reset(&mut self) {
        self.values.clear();
        self.selection.reset();
    }

    /// Check every input and build the voter. The voter carries exactly
    /// the selected location ids.
    pub fn build(&self) -> Result<VoterData, FormError> {
        let mut voter = VoterData::default();
        let mut issues = Vec::new();

        for field in FORM_FIELDS {
            let raw = self.get(field).trim();
            if raw.is_empty() {
                continue;
            }
            match FieldRule::for_field(field) {
                Some(rule) => match rule.check(field, raw) {
                    Ok(value) => assign_field(&mut voter, field, value),
                    Err(message) => issues.push(FieldIssue { field, message }),
                },
                None => assign_field(&mut voter, field, raw.to_string()),
            }
        }
        voter.location = self.selection.path().clone();

        // Rule failures above already left their fields unset
        issues.extend(validate_voter(&voter));
        if issues.is_empty() {
            Ok(voter)
        } else {
            Err(FormError::Invalid(issues))
        }
    }

    pub async fn submit(&self, repo: &VoterRepository, principal: &Principal) -> Result<VoterData, FormError> {
        let voter = self.build()?;
        Ok(repo.create(principal, voter).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hierarchy::test_support::sample;
    use crate::models::{AppUser, LocationPath, Role};
    use crate::repository::VOTERS_COLLECTION;
    use crate::store::{DocumentStore, MemoryStore};

    fn principal(role: Role, ids: &[&str]) -> Principal {
        let mut user = AppUser::new("u1", "u1@example.com", role, LocationPath::from_ids(ids));
        user.approved = true;
        Principal::new(user).unwrap()
    }

    #[tokio::test]
    async fn test_super_admin_submits_without_union_or_village() {
        let hierarchy = Arc::new(sample());
        let store = Arc::new(MemoryStore::new());
        let repo = VoterRepository::new(store.clone()).with_hierarchy(hierarchy.clone());
        let sa = principal(Role::SuperAdmin, &[]);

        let mut form = VoterForm::new(&sa);
        form.set(VoterField::VoterName, "Rahima Begum");
        form.set(VoterField::Age, "34");
        form.select_location(&hierarchy, LocationLevel::Division, Some("6")).unwrap();
        form.select_location(&hierarchy, LocationLevel::District, Some("47")).unwrap();
        form.select_location(&hierarchy, LocationLevel::Upazila, Some("367")).unwrap();

        let voter = form.submit(&repo, &sa).await.unwrap();
        let doc = store.get(VOTERS_COLLECTION, &voter.id).await.unwrap().unwrap();
        assert_eq!(doc.fields["division_id"], "6");
        assert_eq!(doc.fields["district_id"], "47");
        assert_eq!(doc.fields["upazila_id"], "367");
        assert!(!doc.fields.contains_key("union_id"));
        assert!(!doc.fields.contains_key("village_id"));
        assert_eq!(doc.fields["age"], 34);
    }

    #[test]
    fn test_changing_ancestor_resets_descendants() {
        let hierarchy = sample();
        let sa = principal(Role::SuperAdmin, &[]);
        let mut form = VoterForm::new(&sa);
        for (level, id) in [
            (LocationLevel::Division, "6"),
            (LocationLevel::District, "47"),
            (LocationLevel::Upazila, "367"),
            (LocationLevel::Union, "3701"),
            (LocationLevel::Village, "90001"),
        ] {
            form.select_location(&hierarchy, level, Some(id)).unwrap();
        }
        form.select_location(&hierarchy, LocationLevel::District, Some("41")).unwrap();
        assert_eq!(form.selection().path(), &LocationPath::from_ids(&["6", "41"]));
    }

    #[test]
    fn test_build_collects_issues() {
        let sa = principal(Role::SuperAdmin, &[]);
        let mut form = VoterForm::new(&sa);
        form.set(VoterField::Age, "abc");
        form.set(VoterField::Gender, "female");
        let err = form.build().unwrap_err();
        assert_eq!(err.issues_for(VoterField::Age), vec!["Age must be between 0 and 120"]);
        assert_eq!(err.issues_for(VoterField::VoterName), vec!["Voter Name is required"]);
        assert!(err.issues_for(VoterField::Gender).is_empty());
        assert!(!err.issues_for(VoterField::Division).is_empty());
    }

    #[test]
    fn test_scoped_form_is_locked() {
        let hierarchy = sample();
        let ua = principal(Role::UpazilaAdmin, &["6", "47", "367"]);
        let mut form = VoterForm::new(&ua);
        assert!(matches!(
            form.select_location(&hierarchy, LocationLevel::Upazila, Some("368")),
            Err(HierarchyError::Locked(LocationLevel::Upazila))
        ));
        form.select_location(&hierarchy, LocationLevel::Union, Some("3702")).unwrap();
        form.set(VoterField::VoterName, "Karim");
        form.reset();
        assert_eq!(form.get(VoterField::VoterName), "");
        assert_eq!(form.selection().path(), &LocationPath::from_ids(&["6", "47", "367"]));
    }
}
