//! Migration manifest
//!
//! The expected V2 inventory: which tables, functions, endpoints and
//! references the migrated workspace must contain. Loaded from JSON.

use crate::checks::CheckTarget;
use mv_core::{ConfigError, StageKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Expected table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Columns that must exist
    #[serde(default)]
    pub columns: Vec<String>,
}

impl TableSpec {
    /// Table with no column expectations
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }
}

/// Expected function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    /// Function name
    pub name: String,
    /// Sample input sent on invocation
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Expected endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,
    /// Path relative to the target base url
    pub path: String,
    /// Status the endpoint must answer with
    #[serde(default = "default_status")]
    pub expected_status: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

const fn default_status() -> u16 {
    200
}

impl EndpointSpec {
    /// GET endpoint expecting 200
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            name: None,
            method: default_method(),
            path: path.into(),
            expected_status: default_status(),
        }
    }

    /// Explicit name, or `METHOD path`
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method.to_uppercase(), self.path))
    }
}

/// Expected foreign reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSpec {
    /// Table holding the field
    pub table: String,
    /// Referencing field
    pub field: String,
    /// Referenced table
    pub target_table: String,
}

/// Expected V2 inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationManifest {
    /// Tables
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    /// Functions
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    /// Endpoints
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    /// References
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
}

impl MigrationManifest {
    /// Load from a JSON file
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the file is unreadable or malformed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ConfigError::Invalid(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        Self::from_json(&bytes)
            .map_err(|e| ConfigError::Invalid(format!("manifest {}: {e}", path.display())))
    }

    /// Parse from JSON bytes
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the document is malformed
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check targets for a kind, in manifest order
    #[must_use]
    pub fn targets(&self, kind: StageKind) -> Vec<CheckTarget> {
        match kind {
            StageKind::Tables => self.tables.iter().cloned().map(CheckTarget::table).collect(),
            StageKind::Functions => self
                .functions
                .iter()
                .cloned()
                .map(CheckTarget::function)
                .collect(),
            StageKind::Endpoints => self
                .endpoints
                .iter()
                .cloned()
                .map(CheckTarget::endpoint)
                .collect(),
            StageKind::References => self
                .references
                .iter()
                .cloned()
                .map(CheckTarget::reference)
                .collect(),
        }
    }

    /// Number of expected items for a kind
    #[must_use]
    pub fn count(&self, kind: StageKind) -> usize {
        match kind {
            StageKind::Tables => self.tables.len(),
            StageKind::Functions => self.functions.len(),
            StageKind::Endpoints => self.endpoints.len(),
            StageKind::References => self.references.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "tables": [{ "name": "users", "columns": ["id", "email"] }, { "name": "orders" }],
        "functions": [{ "name": "send_welcome", "input": { "userId": 1 } }],
        "endpoints": [{ "path": "/api/users" }, { "method": "post", "path": "/api/orders", "expectedStatus": 201 }],
        "references": [{ "table": "orders", "field": "user_id", "targetTable": "users" }]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let manifest = MigrationManifest::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.count(StageKind::Tables), 2);
        assert!(manifest.tables[1].columns.is_empty());
        assert_eq!(manifest.endpoints[0].method, "GET");
        assert_eq!(manifest.endpoints[0].expected_status, 200);
        assert_eq!(manifest.endpoints[1].expected_status, 201);
    }

    #[test]
    fn targets_follow_manifest_order() {
        let manifest = MigrationManifest::from_json(SAMPLE.as_bytes()).unwrap();
        let names: Vec<String> = manifest
            .targets(StageKind::Endpoints)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["GET /api/users", "POST /api/orders"]);
        assert_eq!(manifest.targets(StageKind::References).len(), 1);
    }

    #[test]
    fn malformed_manifest_is_config_error() {
        let err = MigrationManifest::from_json(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let err = MigrationManifest::load("/nonexistent/manifest.json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read manifest"));
    }
}
