//! Per-directory configuration.

use serde::{Deserialize, Serialize};

/// Behavior switches and naming overrides for one directory.
///
/// Deserializes from camelCase JSON; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DirectoryConfig {
    /// Stamp `creationDate` (epoch ms) on records built by `create`.
    pub add_creation_timestamp: bool,
    /// Maintain the `serial` version stamp on create and on every update.
    pub use_serial: bool,
    /// Collection to target instead of the model name.
    pub collection_name: Option<String>,
    /// Namespace for the resolved model name.
    pub model_namespace: Option<String>,
    /// Model name to use instead of registry/convention resolution.
    pub model_name: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            add_creation_timestamp: true,
            use_serial: true,
            collection_name: None,
            model_namespace: None,
            model_name: None,
        }
    }
}

impl DirectoryConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
