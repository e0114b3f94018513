// ABOUTME: Immutable per-kind snapshots published to subscribers; a new list always replaces the old one

use serde::{Deserialize, Serialize};

/// Label the compose tooling stamps on every container it creates
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Group holding containers that belong to no compose project
pub const STANDALONE_GROUP: &str = "Standalone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    /// First 12 characters of the engine id
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub status: String,
    pub state: String,
    pub compose_project: Option<String>,
}

impl ContainerRecord {
    /// First name without the engine's leading slash
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map_or(self.id.as_str(), |name| name.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub name: String,
    pub containers: Vec<ContainerRecord>,
}

impl ResourceGroup {
    pub fn is_standalone(&self) -> bool {
        self.name == STANDALONE_GROUP
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Digest without the `sha256:` prefix
    pub id: String,
    pub size: i64,
    pub tags: Vec<String>,
    /// RFC 3339, UTC
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRecord {
    /// Volumes are keyed by name, so this repeats it
    pub id: String,
    pub name: String,
    /// Only reported when the engine computed usage data
    pub size: Option<i64>,
    pub tags: Vec<String>,
    pub created_at: String,
}
