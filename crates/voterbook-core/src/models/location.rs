use serde::{Deserialize, Serialize};

/// One level of the administrative hierarchy, ordered from the root down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationLevel {
    Division,
    District,
    Upazila,
    Union,
    Village,
}

impl LocationLevel {
    /// All levels, root first.
    pub const ALL: [LocationLevel; 5] = [
        LocationLevel::Division,
        LocationLevel::District,
        LocationLevel::Upazila,
        LocationLevel::Union,
        LocationLevel::Village,
    ];

    /// 1 for Division through 5 for Village.
    pub fn depth(&self) -> usize {
        *self as usize + 1
    }

    pub fn from_depth(depth: usize) -> Option<Self> {
        depth.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn parent(&self) -> Option<Self> {
        Self::from_depth(self.depth() - 1)
    }

    pub fn child(&self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    /// Name of the field holding this level's id on voters and scopes.
    pub fn id_field(&self) -> &'static str {
        match self {
            LocationLevel::Division => "division_id",
            LocationLevel::District => "district_id",
            LocationLevel::Upazila => "upazila_id",
            LocationLevel::Union => "union_id",
            LocationLevel::Village => "village_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LocationLevel::Division => "Division",
            LocationLevel::District => "District",
            LocationLevel::Upazila => "Upazila",
            LocationLevel::Union => "Union",
            LocationLevel::Village => "Village",
        }
    }

    /// Seed file name for this level's node list.
    pub fn file_name(&self) -> &'static str {
        match self {
            LocationLevel::Division => "divisions.json",
            LocationLevel::District => "districts.json",
            LocationLevel::Upazila => "upazilas.json",
            LocationLevel::Union => "unions.json",
            LocationLevel::Village => "villages.json",
        }
    }
}

impl std::fmt::Display for LocationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A node of the location tree as it appears in the seed files.
///
/// The parent id is stored under a level-specific key (`division_id` on a
/// district, `district_id` on an upazila, and so on); all of them are
/// accepted here and `parent_id()` picks the one matching the node's level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationNode {
    #[serde(deserialize_with = "crate::utils::de_string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bn_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::utils::de_opt_string_or_number")]
    pub division_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::utils::de_opt_string_or_number")]
    pub district_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::utils::de_opt_string_or_number")]
    pub upazila_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "crate::utils::de_opt_string_or_number")]
    pub union_id: Option<String>,
}

impl LocationNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            bn_name: None,
            division_id: None,
            district_id: None,
            upazila_id: None,
            union_id: None,
        }
    }

    /// Builder used by tests and fixtures to attach the parent id for `level`.
    pub fn with_parent(mut self, level: LocationLevel, parent_id: impl Into<String>) -> Self {
        let parent_id = Some(parent_id.into());
        match level {
            LocationLevel::Division => {}
            LocationLevel::District => self.division_id = parent_id,
            LocationLevel::Upazila => self.district_id = parent_id,
            LocationLevel::Union => self.upazila_id = parent_id,
            LocationLevel::Village => self.union_id = parent_id,
        }
        self
    }

    /// The parent id for a node living at `level`. Divisions have none.
    pub fn parent_id(&self, level: LocationLevel) -> Option<&str> {
        match level {
            LocationLevel::Division => None,
            LocationLevel::District => self.division_id.as_deref(),
            LocationLevel::Upazila => self.district_id.as_deref(),
            LocationLevel::Union => self.upazila_id.as_deref(),
            LocationLevel::Village => self.union_id.as_deref(),
        }
    }

    /// "Name (বাংলা)" when a Bengali name is present.
    pub fn display_name(&self) -> String {
        match self.bn_name.as_deref() {
            Some(bn) if !bn.is_empty() => format!("{} ({})", self.name, bn),
            _ => self.name.clone(),
        }
    }
}

/// A partial location-id tuple.
///
/// Used both as a voter's denormalized address and as a user's access
/// scope. Serialized flat, so it can be `#[serde(flatten)]`ed into either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upazila_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub union_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub village_id: Option<String>,
}

impl LocationPath {
    /// Build a path from ids given root first; extra ids are ignored.
    pub fn from_ids(ids: &[&str]) -> Self {
        let mut path = Self::default();
        for (level, id) in LocationLevel::ALL.iter().zip(ids) {
            *path.slot_mut(*level) = Some((*id).to_string());
        }
        path
    }

    pub fn get(&self, level: LocationLevel) -> Option<&str> {
        match level {
            LocationLevel::Division => self.division_id.as_deref(),
            LocationLevel::District => self.district_id.as_deref(),
            LocationLevel::Upazila => self.upazila_id.as_deref(),
            LocationLevel::Union => self.union_id.as_deref(),
            LocationLevel::Village => self.village_id.as_deref(),
        }
    }

    fn slot_mut(&mut self, level: LocationLevel) -> &mut Option<String> {
        match level {
            LocationLevel::Division => &mut self.division_id,
            LocationLevel::District => &mut self.district_id,
            LocationLevel::Upazila => &mut self.upazila_id,
            LocationLevel::Union => &mut self.union_id,
            LocationLevel::Village => &mut self.village_id,
        }
    }

    /// Set the id at `level` and clear every deeper level.
    pub fn set(&mut self, level: LocationLevel, id: Option<String>) {
        *self.slot_mut(level) = id.filter(|s| !s.is_empty());
        self.truncate(level);
    }

    /// Clear every level deeper than `level`.
    pub fn truncate(&mut self, level: LocationLevel) {
        for deeper in LocationLevel::ALL.iter().filter(|l| **l > level) {
            *self.slot_mut(*deeper) = None;
        }
    }

    /// The deepest level that has an id.
    pub fn deepest(&self) -> Option<LocationLevel> {
        LocationLevel::ALL
            .iter()
            .rev()
            .copied()
            .find(|l| self.get(*l).is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.deepest().is_none()
    }

    /// True when no level is set without all of its ancestors.
    pub fn is_prefix_consistent(&self) -> bool {
        let mut gap = false;
        for level in LocationLevel::ALL {
            match (self.get(level).is_some(), gap) {
                (true, true) => return false,
                (false, _) => gap = true,
                _ => {}
            }
        }
        true
    }

    /// (field, id) pairs for every set level, root first.
    pub fn constraints(&self) -> Vec<(&'static str, String)> {
        LocationLevel::ALL
            .iter()
            .filter_map(|l| self.get(*l).map(|id| (l.id_field(), id.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_navigation() {
        assert_eq!(LocationLevel::Division.depth(), 1);
        assert_eq!(LocationLevel::Village.depth(), 5);
        assert_eq!(LocationLevel::Division.parent(), None);
        assert_eq!(LocationLevel::Union.parent(), Some(LocationLevel::Upazila));
        assert_eq!(LocationLevel::Union.child(), Some(LocationLevel::Village));
        assert_eq!(LocationLevel::Village.child(), None);
        assert_eq!(LocationLevel::from_depth(0), None);
        assert_eq!(LocationLevel::from_depth(3), Some(LocationLevel::Upazila));
    }

    #[test]
    fn test_set_clears_descendants() {
        let mut path = LocationPath::from_ids(&["3", "18", "150", "1400", "9000"]);
        path.set(LocationLevel::District, Some("19".to_string()));
        assert_eq!(path.get(LocationLevel::Division), Some("3"));
        assert_eq!(path.get(LocationLevel::District), Some("19"));
        assert_eq!(path.get(LocationLevel::Upazila), None);
        assert_eq!(path.get(LocationLevel::Village), None);
        assert_eq!(path.deepest(), Some(LocationLevel::District));
    }

    #[test]
    fn test_prefix_consistency() {
        assert!(LocationPath::default().is_prefix_consistent());
        assert!(LocationPath::from_ids(&["1", "2"]).is_prefix_consistent());

        let gap = LocationPath {
            division_id: Some("1".into()),
            upazila_id: Some("9".into()),
            ..Default::default()
        };
        assert!(!gap.is_prefix_consistent());
    }

    #[test]
    fn test_path_serializes_flat_and_skips_absent() {
        let path = LocationPath::from_ids(&["3", "18"]);
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json, serde_json::json!({"division_id": "3", "district_id": "18"}));
    }

    #[test]
    fn test_node_accepts_numeric_ids() {
        let node: LocationNode =
            serde_json::from_str(r#"{"id": 47, "division_id": "3", "name": "Dhaka", "bn_name": "ঢাকা"}"#)
                .unwrap();
        assert_eq!(node.id, "47");
        assert_eq!(node.parent_id(LocationLevel::District), Some("3"));
        assert_eq!(node.display_name(), "Dhaka (ঢাকা)");
    }
}
