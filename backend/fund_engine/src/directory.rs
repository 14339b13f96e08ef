//! Display-name lookup for people and projects.
//!
//! Profiles live in another service.  The engine only needs names to enrich
//! read-side views, so the lookup is a small trait; a missing name is never
//! an error.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{FundError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Talent,
    Mentor,
    Company,
    Project,
}

pub trait Directory: Send + Sync {
    fn display_name(&self, kind: EntityKind, id: i64) -> Option<String>;
}

/// A fixed set of names, usually loaded from the `DIRECTORY_FILE` JSON:
///
/// ```json
/// { "talents": { "11": "Ana" }, "mentors": { "3": "Dr. Okafor" } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticDirectory {
    #[serde(default)]
    talents: HashMap<i64, String>,
    #[serde(default)]
    mentors: HashMap<i64, String>,
    #[serde(default)]
    companies: HashMap<i64, String>,
    #[serde(default)]
    projects: HashMap<i64, String>,
}

impl StaticDirectory {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FundError::Config(format!("cannot read directory file {}: {e}", path.display()))
        })?;
        let directory: StaticDirectory = serde_json::from_str(&raw).map_err(|e| {
            FundError::Config(format!("invalid directory file {}: {e}", path.display()))
        })?;
        info!(
            path = %path.display(),
            talents = directory.talents.len(),
            mentors = directory.mentors.len(),
            "Directory loaded"
        );
        Ok(directory)
    }

    pub fn with_name(mut self, kind: EntityKind, id: i64, name: impl Into<String>) -> Self {
        self.names_mut(kind).insert(id, name.into());
        self
    }

    fn names(&self, kind: EntityKind) -> &HashMap<i64, String> {
        match kind {
            EntityKind::Talent => &self.talents,
            EntityKind::Mentor => &self.mentors,
            EntityKind::Company => &self.companies,
            EntityKind::Project => &self.projects,
        }
    }

    fn names_mut(&mut self, kind: EntityKind) -> &mut HashMap<i64, String> {
        match kind {
            EntityKind::Talent => &mut self.talents,
            EntityKind::Mentor => &mut self.mentors,
            EntityKind::Company => &mut self.companies,
            EntityKind::Project => &mut self.projects,
        }
    }
}

impl Directory for StaticDirectory {
    fn display_name(&self, kind: EntityKind, id: i64) -> Option<String> {
        self.names(kind).get(&id).cloned()
    }
}
