//! Dashboard counts over a loaded voter list.

use std::collections::BTreeMap;

use crate::hierarchy::LocationHierarchy;
use crate::models::{LocationLevel, VoterData};

/// Age brackets in display order.
pub const AGE_BRACKETS: [&str; 6] = ["18-25", "26-35", "36-45", "46-60", "60+", "Unknown"];

/// Label used for voters with no value in a counted field.
pub const NOT_SET: &str = "Not set";

pub fn age_bracket(age: Option<u32>) -> &'static str {
    match age {
        Some(18..=25) => "18-25",
        Some(26..=35) => "26-35",
        Some(36..=45) => "36-45",
        Some(46..=60) => "46-60",
        Some(a) if a > 60 => "60+",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoterStats {
    pub total: usize,
    pub by_gender: BTreeMap<String, usize>,
    pub by_intent: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_age: BTreeMap<&'static str, usize>,
    pub needs_transport: usize,
    pub family_abroad: usize,
}

impl VoterStats {
    pub fn compute(voters: &[VoterData]) -> Self {
        let mut stats = VoterStats {
            total: voters.len(),
            ..Default::default()
        };
        let label = |v: &Option<String>| v.clone().unwrap_or_else(|| NOT_SET.to_string());

        for voter in voters {
            *stats.by_gender.entry(label(&voter.gender)).or_default() += 1;
            *stats.by_intent.entry(label(&voter.voting_intent)).or_default() += 1;
            *stats.by_priority.entry(label(&voter.priority_level)).or_default() += 1;
            *stats.by_age.entry(age_bracket(voter.age)).or_default() += 1;
            if voter.needs_transport == Some(true) {
                stats.needs_transport += 1;
            }
            if voter.has_family_abroad == Some(true) {
                stats.family_abroad += 1;
            }
        }
        stats
    }

    /// Age counts in bracket order, including empty brackets.
    pub fn age_rows(&self) -> Vec<(&'static str, usize)> {
        AGE_BRACKETS
            .iter()
            .map(|b| (*b, self.by_age.get(b).copied().unwrap_or(0)))
            .collect()
    }

    pub fn intent(&self, value: &str) -> usize {
        self.by_intent.get(value).copied().unwrap_or(0)
    }

    /// Share of `count` in the total, as a whole percentage.
    pub fn percent(&self, count: usize) -> u16 {
        if self.total == 0 {
            0
        } else {
            ((count * 100 + self.total / 2) / self.total) as u16
        }
    }
}

/// Count of voters under one child location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationCount {
    pub id: String,
    pub name: String,
    pub count: usize,
}

/// Voters per child of `parent_id` at the level below `parent_level`
/// (or per division when no parent is given). Children with no voters are
/// listed with a zero count. Sorted by count descending, then name.
pub fn by_child_location(
    voters: &[VoterData],
    hierarchy: &LocationHierarchy,
    parent_level: Option<LocationLevel>,
    parent_id: Option<&str>,
) -> Vec<LocationCount> {
    let (child_level, children) = match (parent_level, parent_id) {
        (Some(level), Some(id)) => match level.child() {
            Some(child) => (child, hierarchy.get_children(id, child)),
            None => return Vec::new(),
        },
        _ => (LocationLevel::Division, hierarchy.roots()),
    };

    let mut counts: BTreeMap<&str, usize> = children.iter().map(|n| (n.id.as_str(), 0)).collect();
    for voter in voters {
        let under_parent = match (parent_level, parent_id) {
            (Some(level), Some(id)) => voter.location.get(level) == Some(id),
            _ => true,
        };
        if !under_parent {
            continue;
        }
        if let Some(count) = voter.location.get(child_level).and_then(|id| counts.get_mut(id)) {
            *count += 1;
        }
    }

    let mut rows: Vec<LocationCount> = children
        .iter()
        .map(|n| LocationCount {
            id: n.id.clone(),
            name: n.name.clone(),
            count: counts.get(n.id.as_str()).copied().unwrap_or(0),
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    rows
}
