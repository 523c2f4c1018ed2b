use super::location::LocationLevel;
use super::voter::VoterData;

/// A voter column as it appears in CSV files and reports.
///
/// The header labels are shared by import and export so an exported file
/// can be imported again unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoterField {
    VoterName,
    FatherOrHusbandName,
    MotherName,
    Age,
    Gender,
    MaritalStatus,
    Occupation,
    Education,
    Religion,
    Nid,
    VoterSerial,
    VotingCenter,
    Phone,
    Whatsapp,
    Email,
    HouseAddress,
    FamilyMembers,
    PoliticalAffiliation,
    VotingIntent,
    PriorityLevel,
    HasFamilyAbroad,
    NeedsTransport,
    Remarks,
    Division,
    District,
    Upazila,
    Union,
    Village,
}

impl VoterField {
    pub const ALL: [VoterField; 28] = [
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
        VoterField::Division,
        VoterField::District,
        VoterField::Upazila,
        VoterField::Union,
        VoterField::Village,
    ];

    /// Columns used when no explicit field list is given.
    pub const DEFAULT_EXPORT: [VoterField; 10] = [
        VoterField::VoterName,
        VoterField::Age,
        VoterField::Gender,
        VoterField::Phone,
        VoterField::VotingIntent,
        VoterField::PriorityLevel,
        VoterField::Division,
        VoterField::District,
        VoterField::Upazila,
        VoterField::Union,
    ];

    /// Human column label, e.g. `Voter Name`.
    pub fn header(&self) -> &'static str {
        match self {
            VoterField::VoterName => "Voter Name",
            VoterField::FatherOrHusbandName => "Father/Husband Name",
            VoterField::MotherName => "Mother Name",
            VoterField::Age => "Age",
            VoterField::Gender => "Gender",
            VoterField::MaritalStatus => "Marital Status",
            VoterField::Occupation => "Occupation",
            VoterField::Education => "Education",
            VoterField::Religion => "Religion",
            VoterField::Nid => "NID",
            VoterField::VoterSerial => "Voter Serial",
            VoterField::VotingCenter => "Voting Center",
            VoterField::Phone => "Phone",
            VoterField::Whatsapp => "WhatsApp",
            VoterField::Email => "Email",
            VoterField::HouseAddress => "House Address",
            VoterField::FamilyMembers => "Family Members",
            VoterField::PoliticalAffiliation => "Political Affiliation",
            VoterField::VotingIntent => "Voting Intent",
            VoterField::PriorityLevel => "Priority Level",
            VoterField::HasFamilyAbroad => "Has Family Abroad",
            VoterField::NeedsTransport => "Needs Transport",
            VoterField::Remarks => "Remarks",
            VoterField::Division => "Division",
            VoterField::District => "District",
            VoterField::Upazila => "Upazila",
            VoterField::Union => "Union",
            VoterField::Village => "Village",
        }
    }

    /// Stored document field name, e.g. `voter_name` or `district_id`.
    pub fn key(&self) -> &'static str {
        match self {
            VoterField::VoterName => "voter_name",
            VoterField::FatherOrHusbandName => "father_or_husband_name",
            VoterField::MotherName => "mother_name",
            VoterField::Age => "age",
            VoterField::Gender => "gender",
            VoterField::MaritalStatus => "marital_status",
            VoterField::Occupation => "occupation",
            VoterField::Education => "education",
            VoterField::Religion => "religion",
            VoterField::Nid => "nid",
            VoterField::VoterSerial => "voter_serial",
            VoterField::VotingCenter => "voting_center",
            VoterField::Phone => "phone",
            VoterField::Whatsapp => "whatsapp",
            VoterField::Email => "email",
            VoterField::HouseAddress => "house_address",
            VoterField::FamilyMembers => "family_members",
            VoterField::PoliticalAffiliation => "political_affiliation",
            VoterField::VotingIntent => "voting_intent",
            VoterField::PriorityLevel => "priority_level",
            VoterField::HasFamilyAbroad => "has_family_abroad",
            VoterField::NeedsTransport => "needs_transport",
            VoterField::Remarks => "remarks",
            VoterField::Division => "division_id",
            VoterField::District => "district_id",
            VoterField::Upazila => "upazila_id",
            VoterField::Union => "union_id",
            VoterField::Village => "village_id",
        }
    }

    /// Match a CSV header, ignoring case and surrounding whitespace.
    pub fn from_header(header: &str) -> Option<Self> {
        let header = header.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.header().eq_ignore_ascii_case(header))
    }

    /// Match either a document key (`voting_intent`) or a header label.
    /// Location keys may be given with or without the `_id` suffix.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.key() == name || f.key().strip_suffix("_id") == Some(name))
            .or_else(|| Self::from_header(name))
    }

    pub fn for_level(level: LocationLevel) -> Self {
        match level {
            LocationLevel::Division => VoterField::Division,
            LocationLevel::District => VoterField::District,
            LocationLevel::Upazila => VoterField::Upazila,
            LocationLevel::Union => VoterField::Union,
            LocationLevel::Village => VoterField::Village,
        }
    }

    pub fn location_level(&self) -> Option<LocationLevel> {
        match self {
            VoterField::Division => Some(LocationLevel::Division),
            VoterField::District => Some(LocationLevel::District),
            VoterField::Upazila => Some(LocationLevel::Upazila),
            VoterField::Union => Some(LocationLevel::Union),
            VoterField::Village => Some(LocationLevel::Village),
            _ => None,
        }
    }

    /// The field's value as text. Numbers print in decimal, flags as
    /// `Yes`/`No`, locations as their ids. Unset fields are `None`.
    pub fn text(&self, voter: &VoterData) -> Option<String> {
        let flag = |b: bool| if b { "Yes" } else { "No" }.to_string();
        match self {
            VoterField::VoterName => Some(voter.voter_name.clone()).filter(|n| !n.is_empty()),
            VoterField::FatherOrHusbandName => voter.father_or_husband_name.clone(),
            VoterField::MotherName => voter.mother_name.clone(),
            VoterField::Age => voter.age.map(|a| a.to_string()),
            VoterField::Gender => voter.gender.clone(),
            VoterField::MaritalStatus => voter.marital_status.clone(),
            VoterField::Occupation => voter.occupation.clone(),
            VoterField::Education => voter.education.clone(),
            VoterField::Religion => voter.religion.clone(),
            VoterField::Nid => voter.nid.clone(),
            VoterField::VoterSerial => voter.voter_serial.clone(),
            VoterField::VotingCenter => voter.voting_center.clone(),
            VoterField::Phone => voter.phone.clone(),
            VoterField::Whatsapp => voter.whatsapp.clone(),
            VoterField::Email => voter.email.clone(),
            VoterField::HouseAddress => voter.house_address.clone(),
            VoterField::FamilyMembers => voter.family_members.map(|n| n.to_string()),
            VoterField::PoliticalAffiliation => voter.political_affiliation.clone(),
            VoterField::VotingIntent => voter.voting_intent.clone(),
            VoterField::PriorityLevel => voter.priority_level.clone(),
            VoterField::HasFamilyAbroad => voter.has_family_abroad.map(flag),
            VoterField::NeedsTransport => voter.needs_transport.map(flag),
            VoterField::Remarks => voter.remarks.clone(),
            VoterField::Division
            | VoterField::District
            | VoterField::Upazila
            | VoterField::Union
            | VoterField::Village => self
                .location_level()
                .and_then(|level| voter.location.get(level))
                .map(str::to_string),
        }
    }
}

impl std::fmt::Display for VoterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header())
    }
}
