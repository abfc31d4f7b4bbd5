//! Explicit model bindings for directories.
//!
//! # Responsibility
//! - Map directory names to the model each of them produces.
//! - Resolve a directory's identity (model name, namespace, collection) once,
//!   at directory construction.
//!
//! # Invariants
//! - Resolution order: config override, then registry entry, then the
//!   `FooDirectory` -> `FooModel` convention.
//! - Without a `collectionName` override, a collection is named after its
//!   bare model name.

use crate::directory::config::DirectoryConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Namespace used when neither config nor registry names one.
pub const DEFAULT_MODEL_NAMESPACE: &str = "model";

const DIRECTORY_SUFFIX: &str = "Directory";
const MODEL_SUFFIX: &str = "Model";

static TYPE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid type name regex"));

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidDirectoryName(String),
    InvalidModelName(String),
    DuplicateDirectory(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDirectoryName(name) => write!(f, "directory name is invalid: {name}"),
            Self::InvalidModelName(name) => write!(f, "model name is invalid: {name}"),
            Self::DuplicateDirectory(name) => {
                write!(f, "directory already registered: {name}")
            }
        }
    }
}

impl Error for RegistryError {}

/// Model produced by one directory variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBinding {
    pub model_name: String,
    pub namespace: Option<String>,
}

impl ModelBinding {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Resolved identity shared by a directory and every record it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryIdentity {
    pub directory_name: String,
    pub model_namespace: String,
    pub model_name: String,
    pub collection: String,
}

impl DirectoryIdentity {
    /// `namespace::Model` form of the model name.
    pub fn qualified_model_name(&self) -> String {
        format!("{}::{}", self.model_namespace, self.model_name)
    }
}

/// Directory name -> model binding table.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    bindings: BTreeMap<String, ModelBinding>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `directory_name` to an explicit model.
    pub fn register(
        &mut self,
        directory_name: &str,
        binding: ModelBinding,
    ) -> Result<(), RegistryError> {
        let directory_name = directory_name.trim();
        if !TYPE_NAME_RE.is_match(directory_name) {
            return Err(RegistryError::InvalidDirectoryName(
                directory_name.to_string(),
            ));
        }
        if !TYPE_NAME_RE.is_match(&binding.model_name) {
            return Err(RegistryError::InvalidModelName(binding.model_name));
        }
        if self.bindings.contains_key(directory_name) {
            return Err(RegistryError::DuplicateDirectory(directory_name.to_string()));
        }

        self.bindings.insert(directory_name.to_string(), binding);
        Ok(())
    }

    pub fn get(&self, directory_name: &str) -> Option<&ModelBinding> {
        self.bindings.get(directory_name.trim())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Sorted registered directory names.
    pub fn directory_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Resolves the identity of `directory_name` under `config`.
    pub fn resolve(&self, directory_name: &str, config: &DirectoryConfig) -> DirectoryIdentity {
        let directory_name = directory_name.trim();
        let binding = self.get(directory_name);

        let model_name = config
            .model_name
            .clone()
            .or_else(|| binding.map(|b| b.model_name.clone()))
            .unwrap_or_else(|| convention_model_name(directory_name));
        let model_namespace = config
            .model_namespace
            .clone()
            .or_else(|| binding.and_then(|b| b.namespace.clone()))
            .unwrap_or_else(|| DEFAULT_MODEL_NAMESPACE.to_string());
        let collection = config
            .collection_name
            .clone()
            .unwrap_or_else(|| model_name.clone());

        DirectoryIdentity {
            directory_name: directory_name.to_string(),
            model_namespace,
            model_name,
            collection,
        }
    }
}

/// `FooDirectory` -> `FooModel`; names without the suffix just gain `Model`.
pub fn convention_model_name(directory_name: &str) -> String {
    let stem = directory_name
        .strip_suffix(DIRECTORY_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(directory_name);
    format!("{stem}{MODEL_SUFFIX}")
}
