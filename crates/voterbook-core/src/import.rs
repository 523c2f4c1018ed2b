//! CSV import and the per-field validation rules shared with the voter form.
//!
//! Parsing never writes anything. `parse_csv` turns a file into an
//! `ImportPlan`; the repository refuses to write a plan that carries any
//! row error, so one bad row blocks the whole file.

use std::fmt;
use std::io::Read;

use thiserror::Error;
use tracing::debug;

use crate::hierarchy::LocationHierarchy;
use crate::models::{LocationLevel, LocationPath, VoterData, VoterField};
use crate::utils::{ascii_digit, normalize_bd_mobile};

pub const GENDERS: &[&str] = &["Male", "Female", "Other"];
pub const MARITAL_STATUSES: &[&str] = &["Single", "Married", "Widowed", "Divorced"];
pub const VOTING_INTENTS: &[&str] = &["Yes", "No", "Undecided"];
pub const PRIORITY_LEVELS: &[&str] = &["High", "Medium", "Low"];
pub const RELIGIONS: &[&str] = &["Islam", "Hinduism", "Buddhism", "Christianity", "Other"];

pub const MAX_AGE: u32 = 120;
pub const MAX_FAMILY_MEMBERS: u32 = 50;

/// Levels every voter must carry.
pub const REQUIRED_LEVELS: [LocationLevel; 3] =
    [LocationLevel::Division, LocationLevel::District, LocationLevel::Upazila];

/// How a field's text is checked and canonicalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// One of a fixed set, matched case-insensitively.
    OneOf(&'static [&'static str]),
    /// Whole number in an inclusive range.
    Range(u32, u32),
    /// Bangladeshi mobile number, stored as `01XXXXXXXXX`.
    Phone,
    Email,
    /// Yes/No, also accepting true/false and 1/0.
    Flag,
}

impl FieldRule {
    pub fn for_field(field: VoterField) -> Option<Self> {
        match field {
            VoterField::Gender => Some(FieldRule::OneOf(GENDERS)),
            VoterField::MaritalStatus => Some(FieldRule::OneOf(MARITAL_STATUSES)),
            VoterField::Religion => Some(FieldRule::OneOf(RELIGIONS)),
            VoterField::VotingIntent => Some(FieldRule::OneOf(VOTING_INTENTS)),
            VoterField::PriorityLevel => Some(FieldRule::OneOf(PRIORITY_LEVELS)),
            VoterField::Age => Some(FieldRule::Range(0, MAX_AGE)),
            VoterField::FamilyMembers => Some(FieldRule::Range(0, MAX_FAMILY_MEMBERS)),
            VoterField::Phone | VoterField::Whatsapp => Some(FieldRule::Phone),
            VoterField::Email => Some(FieldRule::Email),
            VoterField::HasFamilyAbroad | VoterField::NeedsTransport => Some(FieldRule::Flag),
            _ => None,
        }
    }

    /// Check `raw` and return its canonical text.
    pub fn check(&self, field: VoterField, raw: &str) -> Result<String, String> {
        let raw = raw.trim();
        match self {
            FieldRule::OneOf(allowed) => allowed
                .iter()
                .find(|a| a.eq_ignore_ascii_case(raw))
                .map(|a| a.to_string())
                .ok_or_else(|| format!("{} must be one of {}", field, allowed.join(", "))),
            FieldRule::Range(min, max) => match raw
                .chars()
                .map(|c| ascii_digit(c).unwrap_or(c))
                .collect::<String>()
                .parse::<u32>()
            {
                Ok(n) if (*min..=*max).contains(&n) => Ok(n.to_string()),
                _ => Err(format!("{} must be between {} and {}", field, min, max)),
            },
            FieldRule::Phone => normalize_bd_mobile(raw)
                .map(|n| n[3..].to_string())
                .ok_or_else(|| format!("{} must be a mobile number like 01712345678", field)),
            FieldRule::Email => match raw.split_once('@') {
                Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(raw.to_string()),
                _ => Err(format!("{} is not a valid email address", field)),
            },
            FieldRule::Flag => match raw.to_ascii_lowercase().as_str() {
                "yes" | "true" | "1" => Ok("Yes".to_string()),
                "no" | "false" | "0" => Ok("No".to_string()),
                _ => Err(format!("{} must be Yes or No", field)),
            },
        }
    }
}

/// A validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: VoterField,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Run every field rule and the required-field checks against a voter.
pub fn validate_voter(voter: &VoterData) -> Vec<FieldIssue> {
    canonicalize_voter(&mut voter.clone()).err().unwrap_or_default()
}

/// Validate `voter` and rewrite every ruled field in canonical form
/// (`female` → `Female`, `+88 01712-345678` → `01712345678`), the same text
/// an import would store. Returns the fields that were rewritten.
pub fn canonicalize_voter(voter: &mut VoterData) -> Result<Vec<VoterField>, Vec<FieldIssue>> {
    let mut issues = Vec::new();
    let mut rewritten = Vec::new();

    let trimmed = voter.voter_name.trim();
    if trimmed.is_empty() {
        issues.push(FieldIssue {
            field: VoterField::VoterName,
            message: "Voter Name is required".to_string(),
        });
    } else if trimmed.len() != voter.voter_name.len() {
        voter.voter_name = trimmed.to_string();
        rewritten.push(VoterField::VoterName);
    }

    for field in VoterField::ALL {
        let (Some(rule), Some(text)) = (FieldRule::for_field(field), field.text(voter)) else {
            continue;
        };
        match rule.check(field, &text) {
            Ok(canonical) if canonical != text => {
                assign_field(voter, field, canonical);
                rewritten.push(field);
            }
            Ok(_) => {}
            Err(message) => issues.push(FieldIssue { field, message }),
        }
    }

    for level in REQUIRED_LEVELS {
        if voter.location.get(level).map_or(true, str::is_empty) {
            issues.push(FieldIssue {
                field: VoterField::for_level(level),
                message: format!("{} is required", level.label()),
            });
        }
    }
    if !voter.location.is_prefix_consistent() {
        issues.push(FieldIssue {
            field: VoterField::Division,
            message: "Location has a gap between levels".to_string(),
        });
    }

    if issues.is_empty() {
        Ok(rewritten)
    } else {
        Err(issues)
    }
}

/// Store canonical text into the matching voter field.
pub(crate) fn assign_field(voter: &mut VoterData, field: VoterField, value: String) {
    let flag = |v: &str| v == "Yes";
    match field {
        VoterField::VoterName => voter.voter_name = value,
        VoterField::FatherOrHusbandName => voter.father_or_husband_name = Some(value),
        VoterField::MotherName => voter.mother_name = Some(value),
        VoterField::Age => voter.age = value.parse().ok(),
        VoterField::Gender => voter.gender = Some(value),
        VoterField::MaritalStatus => voter.marital_status = Some(value),
        VoterField::Occupation => voter.occupation = Some(value),
        VoterField::Education => voter.education = Some(value),
        VoterField::Religion => voter.religion = Some(value),
        VoterField::Nid => voter.nid = Some(value),
        VoterField::VoterSerial => voter.voter_serial = Some(value),
        VoterField::VotingCenter => voter.voting_center = Some(value),
        VoterField::Phone => voter.phone = Some(value),
        VoterField::Whatsapp => voter.whatsapp = Some(value),
        VoterField::Email => voter.email = Some(value),
        VoterField::HouseAddress => voter.house_address = Some(value),
        VoterField::FamilyMembers => voter.family_members = value.parse().ok(),
        VoterField::PoliticalAffiliation => voter.political_affiliation = Some(value),
        VoterField::VotingIntent => voter.voting_intent = Some(value),
        VoterField::PriorityLevel => voter.priority_level = Some(value),
        VoterField::HasFamilyAbroad => voter.has_family_abroad = Some(flag(&value)),
        VoterField::NeedsTransport => voter.needs_transport = Some(flag(&value)),
        VoterField::Remarks => voter.remarks = Some(value),
        // Location columns are resolved separately
        VoterField::Division
        | VoterField::District
        | VoterField::Upazila
        | VoterField::Union
        | VoterField::Village => {}
    }
}

/// A row-level error, numbered by file line (the header is line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub line: usize,
    pub field: Option<VoterField>,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "Row {}, {}: {}", self.line, field, self.message),
            None => write!(f, "Row {}: {}", self.line, self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("{} row(s) failed validation, nothing was imported", .0.len())]
    Rejected(Vec<RowError>),
}

impl ImportError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ImportError::Csv(_) | ImportError::MissingColumn(_) => "ফাইলটি পড়া যায়নি",
            ImportError::Rejected(_) => "কিছু সারিতে ভুল আছে, কোনো তথ্য যোগ করা হয়নি",
        }
    }
}

/// A voter parsed from one CSV line.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub line: usize,
    pub voter: VoterData,
}

/// Result of parsing a file, before any write.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
    pub rows: Vec<ParsedRow>,
    /// Lines skipped because `Voter Name` was empty.
    pub skipped: Vec<usize>,
    pub errors: Vec<RowError>,
}

impl ImportPlan {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse and validate a voter CSV.
///
/// Location columns may hold ids or names; names are resolved against
/// `hierarchy` when one is given. Levels the file leaves out are taken
/// from `defaults`.
pub fn parse_csv<R: Read>(
    reader: R,
    hierarchy: Option<&LocationHierarchy>,
    defaults: &LocationPath,
) -> Result<ImportPlan, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<Option<VoterField>> = csv_reader
        .headers()?
        .iter()
        .map(|h| {
            let field = VoterField::from_header(h);
            if field.is_none() && !h.is_empty() {
                debug!(header = h, "Ignoring unknown CSV column");
            }
            field
        })
        .collect();

    if !columns.contains(&Some(VoterField::VoterName)) {
        return Err(ImportError::MissingColumn(VoterField::VoterName.header()));
    }

    let mut plan = ImportPlan::default();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        let line = index + 2;
        let cell = |field: VoterField| {
            columns
                .iter()
                .position(|c| *c == Some(field))
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
        };

        if cell(VoterField::VoterName).is_none() {
            plan.skipped.push(line);
            continue;
        }

        let mut voter = VoterData::default();
        let mut row_errors = Vec::new();
        let mut push_err = |field: Option<VoterField>, message: String| {
            row_errors.push(RowError { line, field, message });
        };

        for field in VoterField::ALL {
            if field.location_level().is_some() {
                continue;
            }
            let Some(raw) = cell(field) else { continue };
            match FieldRule::for_field(field) {
                Some(rule) => match rule.check(field, raw) {
                    Ok(value) => assign_field(&mut voter, field, value),
                    Err(message) => push_err(Some(field), message),
                },
                None => assign_field(&mut voter, field, raw.to_string()),
            }
        }

        let mut location = defaults.clone();
        let mut location_resolved = true;
        for level in LocationLevel::ALL {
            let Some(raw) = cell(VoterField::for_level(level)) else { continue };
            let id = match hierarchy {
                Some(h) => {
                    let parent = level.parent().and_then(|p| location.get(p));
                    let message = match h.lookup(level, parent, raw) {
                        Ok(Some(node)) => {
                            location.set(level, Some(node.id.clone()));
                            continue;
                        }
                        Ok(None) => format!("Unknown {} '{}'", level.label(), raw),
                        Err(e) => e.to_string(),
                    };
                    push_err(Some(VoterField::for_level(level)), message);
                    location_resolved = false;
                    break;
                }
                None => raw.to_string(),
            };
            location.set(level, Some(id));
        }
        voter.location = location;

        for issue in validate_voter(&voter) {
            // Field rule failures were already reported with the raw text,
            // and an unresolved name already explains a missing level
            let is_location = issue.field.location_level().is_some();
            if FieldRule::for_field(issue.field).is_none() && (location_resolved || !is_location) {
                push_err(Some(issue.field), issue.message);
            }
        }

        if row_errors.is_empty() {
            plan.rows.push(ParsedRow { line, voter });
        } else {
            plan.errors.extend(row_errors);
        }
    }

    debug!(
        rows = plan.rows.len(),
        skipped = plan.skipped.len(),
        errors = plan.errors.len(),
        "CSV parsed"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::sample;

    fn parse(csv: &str) -> ImportPlan {
        parse_csv(csv.as_bytes(), Some(&sample()), &LocationPath::default()).unwrap()
    }

    #[test]
    fn test_rule_canonicalizes() {
        let rule = FieldRule::for_field(VoterField::Gender).unwrap();
        assert_eq!(rule.check(VoterField::Gender, "female"), Ok("Female".to_string()));
        assert!(rule.check(VoterField::Gender, "F").is_err());

        let phone = FieldRule::Phone;
        assert_eq!(phone.check(VoterField::Phone, "+88 01712-345678"), Ok("01712345678".to_string()));
        assert_eq!(FieldRule::Flag.check(VoterField::NeedsTransport, "TRUE"), Ok("Yes".to_string()));
        assert_eq!(phone.check(VoterField::Phone, "০১৭১২৩৪৫৬৭৮"), Ok("01712345678".to_string()));
        assert_eq!(FieldRule::Range(0, MAX_AGE).check(VoterField::Age, "৪৫"), Ok("45".to_string()));
    }

    #[test]
    fn test_canonicalize_rewrites_in_place() {
        let mut voter = VoterData::new("  Salma Khatun ", LocationPath::from_ids(&["6", "47", "367"]));
        voter.gender = Some("female".into());
        voter.voting_intent = Some("yes".into());
        voter.priority_level = Some("HIGH".into());
        voter.phone = Some("+88 01712-345678".into());
        voter.whatsapp = Some("01912345678".into());

        let rewritten = canonicalize_voter(&mut voter).unwrap();
        assert_eq!(voter.voter_name, "Salma Khatun");
        assert_eq!(voter.gender.as_deref(), Some("Female"));
        assert_eq!(voter.voting_intent.as_deref(), Some("Yes"));
        assert_eq!(voter.priority_level.as_deref(), Some("High"));
        assert_eq!(voter.phone.as_deref(), Some("01712345678"));
        assert!(!rewritten.contains(&VoterField::Whatsapp));
        assert!(rewritten.contains(&VoterField::Phone));
        assert_eq!(rewritten.len(), 5);

        voter.religion = Some("Jedi".into());
        let issues = canonicalize_voter(&mut voter).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, VoterField::Religion);
    }

    #[test]
    fn test_shared_village_name_is_row_error() {
        let plan = parse(
            "Voter Name,Division,District,Upazila,Union,Village\n\
             A,Dhaka,Dhaka,Dhamrai,Sombhag,Uttar Para\n\
             B,Dhaka,Dhaka,Dhamrai,Sombhag,90005\n",
        );
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].line, 2);
        assert_eq!(plan.errors[0].field, Some(VoterField::Village));
        assert!(plan.errors[0].message.contains("'Uttar Para'"));
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].voter.location.get(LocationLevel::Village), Some("90005"));
    }

    #[test]
    fn test_missing_name_is_skipped() {
        let plan = parse(
            "Voter Name,Age,Division,District,Upazila\n\
             Rahim Uddin,45,Dhaka,Dhaka,Dhamrai\n\
             ,30,Dhaka,Dhaka,Dhamrai\n",
        );
        assert!(plan.is_valid());
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.skipped, vec![3]);
        assert_eq!(plan.rows[0].voter.location, LocationPath::from_ids(&["6", "47", "367"]));
    }

    #[test]
    fn test_age_out_of_range_rejected() {
        let plan = parse(
            "Voter Name,Age,Division,District,Upazila\n\
             Rahim Uddin,130,Dhaka,Dhaka,Dhamrai\n",
        );
        assert!(!plan.is_valid());
        assert!(plan.rows.is_empty());
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].line, 2);
        assert_eq!(plan.errors[0].field, Some(VoterField::Age));
        assert_eq!(plan.errors[0].message, "Age must be between 0 and 120");
    }

    #[test]
    fn test_unknown_location_and_missing_level() {
        let plan = parse(
            "Voter Name,Division,District,Upazila\n\
             A,Dhaka,Gazipur,Dhamrai\n\
             B,Dhaka,Dhaka,\n",
        );
        assert_eq!(plan.errors.len(), 2);
        assert!(plan.errors[0].message.contains("Unknown Upazila 'Dhamrai'"));
        assert_eq!(plan.errors[1].message, "Upazila is required");
    }

    #[test]
    fn test_defaults_fill_missing_columns() {
        let defaults = LocationPath::from_ids(&["6", "47", "367"]);
        let plan = parse_csv(
            "Voter Name,Union,Voting Intent\nKarim,Kushura,undecided\n".as_bytes(),
            Some(&sample()),
            &defaults,
        )
        .unwrap();
        assert!(plan.is_valid());
        let voter = &plan.rows[0].voter;
        assert_eq!(voter.location, LocationPath::from_ids(&["6", "47", "367", "3701"]));
        assert_eq!(voter.voting_intent.as_deref(), Some("Undecided"));
    }

    #[test]
    fn test_missing_name_column() {
        let err = parse_csv("Age\n30\n".as_bytes(), None, &LocationPath::default()).unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("Voter Name")));
    }

    #[test]
    fn test_zero_valid_rows() {
        let plan = parse("Voter Name,Age\n,40\n,50\n");
        assert!(plan.is_valid());
        assert!(plan.rows.is_empty());
        assert_eq!(plan.skipped, vec![2, 3]);
    }

    #[test]
    fn test_validate_voter_reports_required() {
        let issues = validate_voter(&VoterData::default());
        let fields: Vec<_> = issues.iter().map(|i| i.field).collect();
        assert!(fields.contains(&VoterField::VoterName));
        assert!(fields.contains(&VoterField::Upazila));
    }
}
