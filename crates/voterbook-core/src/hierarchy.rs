//! Location hierarchy cache and cascading selection.
//!
//! The five seed lists (divisions, districts, upazilas, unions, villages)
//! are loaded once per session, either from a local directory or from an
//! HTTP base URL, and indexed by parent id so dropdown-style lookups are a
//! single hash lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::access::Principal;
use crate::models::{LocationLevel, LocationNode, LocationPath};
use crate::utils::contains_ignore_case;

#[derive(Error, Debug)]
pub enum HierarchyError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Failed to fetch location data: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown {level} id {id}")]
    UnknownNode { level: LocationLevel, id: String },

    #[error("{level} {id} does not belong to the selected parent")]
    BrokenChain { level: LocationLevel, id: String },

    #[error("{0} is set but its parent level is empty")]
    ParentNotSelected(LocationLevel),

    #[error("{0} is fixed by your access scope")]
    Locked(LocationLevel),

    #[error("{count} {level} entries are named '{name}', use the id instead")]
    AmbiguousName {
        level: LocationLevel,
        name: String,
        count: usize,
    },
}

/// Where the seed files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSource {
    Dir(PathBuf),
    Url(String),
}

impl LocationSource {
    /// `http://` and `https://` values are URLs, anything else is a path.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            LocationSource::Url(value.trim_end_matches('/').to_string())
        } else {
            LocationSource::Dir(PathBuf::from(value))
        }
    }
}

/// Parse one seed file.
///
/// Accepts either a bare array of nodes or a database export wrapper: an
/// array of header objects where one element carries the rows in `data`.
pub fn parse_seed(file: &str, contents: &str) -> Result<Vec<LocationNode>, HierarchyError> {
    let parse_err = |message: String| HierarchyError::Parse {
        file: file.to_string(),
        message,
    };

    let value: Value = serde_json::from_str(contents).map_err(|e| parse_err(e.to_string()))?;
    let rows = match value {
        Value::Array(items) => {
            let wrapped = items
                .iter()
                .find_map(|item| item.get("data").and_then(Value::as_array).cloned());
            match wrapped {
                Some(data) => data,
                None => items,
            }
        }
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(data)) => data,
            _ => return Err(parse_err("expected an array of locations".to_string())),
        },
        _ => return Err(parse_err("expected an array of locations".to_string())),
    };

    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| parse_err(e.to_string())))
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct LocationHierarchy {
    nodes: HashMap<LocationLevel, Vec<LocationNode>>,
    /// (level, id) -> index into `nodes[level]`
    by_id: HashMap<(LocationLevel, String), usize>,
    /// (child level, parent id) -> children, in seed order
    children: HashMap<(LocationLevel, String), Vec<LocationNode>>,
}

impl LocationHierarchy {
    /// Build the indexes from the five node lists.
    pub fn from_levels(levels: [Vec<LocationNode>; 5]) -> Self {
        let mut hierarchy = Self::default();

        for (level, nodes) in LocationLevel::ALL.into_iter().zip(levels) {
            for (i, node) in nodes.iter().enumerate() {
                hierarchy.by_id.insert((level, node.id.clone()), i);
                if let Some(parent_id) = node.parent_id(level) {
                    hierarchy
                        .children
                        .entry((level, parent_id.to_string()))
                        .or_default()
                        .push(node.clone());
                } else if level != LocationLevel::Division {
                    warn!(%level, id = %node.id, "Location node has no parent id");
                }
            }
            hierarchy.nodes.insert(level, nodes);
        }

        debug!(
            divisions = hierarchy.count(LocationLevel::Division),
            districts = hierarchy.count(LocationLevel::District),
            upazilas = hierarchy.count(LocationLevel::Upazila),
            unions = hierarchy.count(LocationLevel::Union),
            villages = hierarchy.count(LocationLevel::Village),
            "Location hierarchy indexed"
        );
        hierarchy
    }

    /// Load the seed files from a directory. `villages.json` is optional.
    pub fn load_dir(dir: &Path) -> Result<Self, HierarchyError> {
        let mut levels: [Vec<LocationNode>; 5] = Default::default();
        for (slot, level) in levels.iter_mut().zip(LocationLevel::ALL) {
            let path = dir.join(level.file_name());
            if level == LocationLevel::Village && !path.exists() {
                debug!("No villages.json, village level left empty");
                continue;
            }
            let contents = std::fs::read_to_string(&path).map_err(|source| HierarchyError::Io {
                path: path.clone(),
                source,
            })?;
            *slot = parse_seed(level.file_name(), &contents)?;
        }
        Ok(Self::from_levels(levels))
    }

    /// Fetch the seed files from `{base_url}/{file}`. A 404 on villages is
    /// treated as an empty level.
    pub async fn fetch(client: &reqwest::Client, base_url: &str) -> Result<Self, HierarchyError> {
        let mut levels: [Vec<LocationNode>; 5] = Default::default();
        for (slot, level) in levels.iter_mut().zip(LocationLevel::ALL) {
            let url = format!("{}/{}", base_url, level.file_name());
            let response = client.get(&url).send().await?;
            if level == LocationLevel::Village && response.status() == reqwest::StatusCode::NOT_FOUND {
                debug!(url = %url, "No villages file, village level left empty");
                continue;
            }
            let text = response.error_for_status()?.text().await?;
            *slot = parse_seed(level.file_name(), &text)?;
        }
        Ok(Self::from_levels(levels))
    }

    pub async fn load(source: &LocationSource, client: &reqwest::Client) -> Result<Self, HierarchyError> {
        let hierarchy = match source {
            LocationSource::Dir(dir) => Self::load_dir(dir)?,
            LocationSource::Url(url) => Self::fetch(client, url).await?,
        };
        info!(divisions = hierarchy.count(LocationLevel::Division), "Location data loaded");
        Ok(hierarchy)
    }

    pub fn count(&self, level: LocationLevel) -> usize {
        self.nodes.get(&level).map(Vec::len).unwrap_or(0)
    }

    /// The node lists in seed order, root level first.
    pub fn levels(&self) -> [Vec<LocationNode>; 5] {
        LocationLevel::ALL.map(|level| self.all(level).to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.count(LocationLevel::Division) == 0
    }

    /// All nodes at a level, in seed order.
    pub fn all(&self, level: LocationLevel) -> &[LocationNode] {
        self.nodes.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[LocationNode] {
        self.all(LocationLevel::Division)
    }

    /// Children at `level` whose parent is `parent_id`.
    pub fn get_children(&self, parent_id: &str, level: LocationLevel) -> &[LocationNode] {
        self.children
            .get(&(level, parent_id.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node(&self, level: LocationLevel, id: &str) -> Option<&LocationNode> {
        let index = *self.by_id.get(&(level, id.to_string()))?;
        self.nodes.get(&level).and_then(|nodes| nodes.get(index))
    }

    pub fn name_of(&self, level: LocationLevel, id: &str) -> Option<&str> {
        self.node(level, id).map(|n| n.name.as_str())
    }

    /// Find a child of `parent_id` (or a division when `parent_id` is None)
    /// by id, English name or Bengali name. An id match wins; a name shared
    /// by several siblings is an error rather than a guess.
    pub fn lookup(
        &self,
        level: LocationLevel,
        parent_id: Option<&str>,
        key: &str,
    ) -> Result<Option<&LocationNode>, HierarchyError> {
        let key = key.trim();
        let candidates = self.siblings(level, parent_id);
        if let Some(node) = candidates.iter().find(|n| n.id == key) {
            return Ok(Some(node));
        }

        let mut matches = candidates.iter().filter(|n| Self::is_named(n, key));
        let first = matches.next();
        let others = matches.count();
        if others > 0 {
            return Err(HierarchyError::AmbiguousName {
                level,
                name: key.to_string(),
                count: others + 1,
            });
        }
        Ok(first)
    }

    fn siblings(&self, level: LocationLevel, parent_id: Option<&str>) -> &[LocationNode] {
        match parent_id {
            Some(parent) => self.get_children(parent, level),
            None if level == LocationLevel::Division => self.roots(),
            None => &[],
        }
    }

    fn is_named(node: &LocationNode, key: &str) -> bool {
        node.name.eq_ignore_ascii_case(key) || node.bn_name.as_deref() == Some(key)
    }

    /// Text that `lookup` maps back to exactly this node: its name, or its
    /// id when a sibling shares the name or has the name as its id.
    pub fn export_label<'a>(&'a self, level: LocationLevel, id: &'a str) -> &'a str {
        let Some(node) = self.node(level, id) else {
            return id;
        };
        let clashes = self
            .siblings(level, node.parent_id(level))
            .iter()
            .any(|n| n.id != node.id && (n.id == node.name || n.name.eq_ignore_ascii_case(&node.name)));
        if clashes {
            id
        } else {
            &node.name
        }
    }

    /// Case-insensitive name search within a level.
    pub fn search(&self, level: LocationLevel, query: &str) -> Vec<&LocationNode> {
        self.all(level)
            .iter()
            .filter(|n| contains_ignore_case(&n.name, query))
            .collect()
    }

    /// Check that every id on `path` exists and hangs under the id above it.
    pub fn resolve_path(&self, path: &LocationPath) -> Result<Vec<&LocationNode>, HierarchyError> {
        let mut resolved = Vec::new();
        let mut parent: Option<&str> = None;

        for level in LocationLevel::ALL {
            let Some(id) = path.get(level) else {
                parent = None;
                continue;
            };
            if level != LocationLevel::Division && parent.is_none() {
                return Err(HierarchyError::ParentNotSelected(level));
            }
            let node = self.node(level, id).ok_or_else(|| HierarchyError::UnknownNode {
                level,
                id: id.to_string(),
            })?;
            if node.parent_id(level) != parent {
                return Err(HierarchyError::BrokenChain {
                    level,
                    id: id.to_string(),
                });
            }
            resolved.push(node);
            parent = Some(id);
        }
        Ok(resolved)
    }

    /// "Dhaka › Dhaka › Dhamrai", falling back to raw ids for unknown nodes.
    pub fn display_path(&self, path: &LocationPath) -> String {
        LocationLevel::ALL
            .iter()
            .filter_map(|level| {
                path.get(*level)
                    .map(|id| self.name_of(*level, id).unwrap_or(id).to_string())
            })
            .collect::<Vec<_>>()
            .join(" › ")
    }
}

/// The state of a division → district → upazila → union → village picker.
///
/// Changing a level clears every level below it. Levels covered by the
/// user's access scope can be locked so a scoped admin cannot pick outside
/// their own subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationSelection {
    path: LocationPath,
    /// Levels at or above this are locked.
    locked_to: Option<LocationLevel>,
}

impl LocationSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A selection pre-filled and locked to the principal's scope.
    pub fn for_principal(principal: &Principal) -> Self {
        Self {
            path: principal.default_location(),
            locked_to: principal.role().scope_level(),
        }
    }

    pub fn path(&self) -> &LocationPath {
        &self.path
    }

    pub fn get(&self, level: LocationLevel) -> Option<&str> {
        self.path.get(level)
    }

    pub fn is_locked(&self, level: LocationLevel) -> bool {
        self.locked_to.is_some_and(|locked| level <= locked)
    }

    /// Select `id` at `level` (or clear it with None), resetting every
    /// descendant selection. The id must be a child of the current parent
    /// selection.
    pub fn select(
        &mut self,
        hierarchy: &LocationHierarchy,
        level: LocationLevel,
        id: Option<&str>,
    ) -> Result<(), HierarchyError> {
        if self.is_locked(level) {
            return Err(HierarchyError::Locked(level));
        }

        if let Some(id) = id {
            let parent = level.parent().and_then(|p| self.path.get(p));
            if level != LocationLevel::Division && parent.is_none() {
                return Err(HierarchyError::ParentNotSelected(level));
            }
            let valid = match parent {
                Some(parent_id) => hierarchy.get_children(parent_id, level).iter().any(|n| n.id == id),
                None => hierarchy.roots().iter().any(|n| n.id == id),
            };
            if !valid {
                return Err(HierarchyError::BrokenChain {
                    level,
                    id: id.to_string(),
                });
            }
        }

        self.path.set(level, id.map(str::to_string));
        Ok(())
    }

    /// The choices for `level` given the current parent selection.
    pub fn options<'a>(&self, hierarchy: &'a LocationHierarchy, level: LocationLevel) -> &'a [LocationNode] {
        match level.parent() {
            None => hierarchy.roots(),
            Some(parent) => match self.path.get(parent) {
                Some(parent_id) => hierarchy.get_children(parent_id, level),
                None => &[],
            },
        }
    }

    /// Clear every unlocked level.
    pub fn reset(&mut self) {
        match self.locked_to {
            Some(level) => self.path.truncate(level),
            None => self.path = LocationPath::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    fn node(level: LocationLevel, id: &str, name: &str, parent: Option<&str>) -> LocationNode {
        let n = LocationNode::new(id, name);
        match parent {
            Some(p) => n.with_parent(level, p),
            None => n,
        }
    }

    /// Two divisions, enough depth under Dhaka › Dhaka › Dhamrai to reach villages.
    pub fn sample() -> LocationHierarchy {
        use LocationLevel::*;
        let mut dhaka = node(Division, "6", "Dhaka", None);
        dhaka.bn_name = Some("ঢাকা".to_string());
        LocationHierarchy::from_levels([
            vec![dhaka, node(Division, "1", "Chattogram", None)],
            vec![
                node(District, "47", "Dhaka", Some("6")),
                node(District, "41", "Gazipur", Some("6")),
                node(District, "9", "Chattogram", Some("1")),
            ],
            vec![
                node(Upazila, "367", "Dhamrai", Some("47")),
                node(Upazila, "368", "Savar", Some("47")),
                node(Upazila, "330", "Kaliakair", Some("41")),
            ],
            vec![
                node(Union, "3701", "Kushura", Some("367")),
                node(Union, "3702", "Sombhag", Some("367")),
                node(Union, "3801", "Ashulia", Some("368")),
            ],
            vec![
                node(Village, "90001", "Kushura Bazar", Some("3701")),
                node(Village, "90002", "Bhadail", Some("3701")),
                node(Village, "90003", "Sombhag Para", Some("3702")),
                node(Village, "90004", "Uttar Para", Some("3702")),
                node(Village, "90005", "Uttar Para", Some("3702")),
            ],
        ])
    }
}
