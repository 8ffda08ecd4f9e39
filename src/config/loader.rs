//! Configuration loader
//!
//! Loads the schema document and plugin manifests from a config directory.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::format_validation_errors;
use crate::plugin::{PluginDescriptor, PluginManifest, PluginRegistry, ResolverCatalog};
use crate::schema::{validate, SchemaDocument};
use crate::session::Session;

const SCHEMA_FILES: [&str; 3] = ["schema.yaml", "schema.yml", "schema.json"];

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Create loader from DSL_CONFIG_DIR env var or default to "config"
    ///
    /// Path resolution order:
    /// 1. DSL_CONFIG_DIR environment variable (explicit override)
    /// 2. Relative "config" path (works when running from the crate root)
    /// 3. CARGO_MANIFEST_DIR/config (works under cargo run and cargo test)
    pub fn from_env() -> Self {
        if let Ok(dir) = std::env::var("DSL_CONFIG_DIR") {
            return Self::new(dir);
        }

        if Self::looks_like_config(Path::new("config")) {
            return Self::new("config");
        }

        let compile_time_config = concat!(env!("CARGO_MANIFEST_DIR"), "/config");
        if Self::looks_like_config(Path::new(compile_time_config)) {
            return Self::new(compile_time_config);
        }

        // Last resort - return "config" and let it fail with clear error
        Self::new("config")
    }

    fn looks_like_config(dir: &Path) -> bool {
        dir.join("plugins").is_dir() || SCHEMA_FILES.iter().any(|f| dir.join(f).is_file())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the schema document, the first of schema.yaml, schema.yml
    /// and schema.json that exists
    pub fn schema_path(&self) -> Option<PathBuf> {
        SCHEMA_FILES
            .iter()
            .map(|f| self.config_dir.join(f))
            .find(|p| p.is_file())
    }

    /// Load and validate the schema document
    pub fn load_schema(&self) -> Result<SchemaDocument> {
        let path = self.schema_path().with_context(|| {
            format!("No schema document found in {}", self.config_dir.display())
        })?;
        Self::load_schema_file(&path)
    }

    /// Load and validate a schema document from an explicit path
    pub fn load_schema_file(path: &Path) -> Result<SchemaDocument> {
        info!("Loading schema from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let schema = if is_json(path) {
            SchemaDocument::from_json_str(&content)
        } else {
            SchemaDocument::from_yaml_str(&content)
        }
        .with_context(|| format!("Failed to parse {}", path.display()))?;

        let errors = validate(&schema);
        if !errors.is_empty() {
            bail!(
                "Invalid schema {}: {}",
                path.display(),
                format_validation_errors(&errors)
            );
        }

        info!(
            "Loaded schema with {} variables",
            schema.declared_names().len()
        );
        Ok(schema)
    }

    /// Read every manifest under plugins/, in file name order. A missing
    /// plugins/ directory means no manifests.
    pub fn load_manifests(&self) -> Result<Vec<PluginManifest>> {
        let plugins_dir = self.config_dir.join("plugins");
        if !plugins_dir.is_dir() {
            debug!("No plugins directory at {}", plugins_dir.display());
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&plugins_dir)
            .with_context(|| format!("Failed to read directory {}", plugins_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("yaml" | "yml" | "json")
                    )
            })
            .collect();
        paths.sort();

        let mut manifests = Vec::with_capacity(paths.len());
        for path in paths {
            debug!("Loading plugin manifest {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let manifest = if is_json(&path) {
                PluginManifest::from_json_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            } else {
                PluginManifest::from_yaml_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            };
            manifests.push(manifest);
        }
        Ok(manifests)
    }

    /// Build descriptors for every manifest
    pub fn load_plugins(&self, catalog: &ResolverCatalog) -> Result<Vec<PluginDescriptor>> {
        self.load_manifests()?
            .into_iter()
            .map(|manifest| {
                let name = manifest.name.clone();
                manifest
                    .into_descriptor(catalog)
                    .with_context(|| format!("Failed to build plugin '{}'", name))
            })
            .collect()
    }

    /// Register every manifest plugin, returning how many were registered
    pub fn register_plugins(
        &self,
        registry: &PluginRegistry,
        catalog: &ResolverCatalog,
    ) -> Result<usize> {
        let plugins = self.load_plugins(catalog)?;
        let count = plugins.len();
        for plugin in plugins {
            registry.register(plugin);
        }
        info!("Registered {} plugins from {}", count, self.config_dir.display());
        Ok(count)
    }

    /// Register manifest plugins and start a session over the schema
    pub fn load_session(
        &self,
        registry: Arc<PluginRegistry>,
        catalog: &ResolverCatalog,
    ) -> Result<Session> {
        self.register_plugins(&registry, catalog)?;
        let schema = self.load_schema()?;
        Ok(Session::new(registry, &schema)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_yaml_schema() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "schema.yaml", "variables:\n  name: demo\n");
        let schema = ConfigLoader::new(dir.path()).load_schema().unwrap();
        assert_eq!(schema.declared_names(), vec!["name"]);
    }

    #[test]
    fn test_invalid_schema_reports_all_errors() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "schema.json",
            r#"{"variables": {"9x": 1, "_result": 2}}"#,
        );
        let err = ConfigLoader::new(dir.path()).load_schema().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid variable name '9x'"), "{}", message);
        assert!(message.contains("'_result' is reserved"), "{}", message);
    }

    #[test]
    fn test_missing_schema() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigLoader::new(dir.path()).load_schema().is_err());
    }

    #[test]
    fn test_manifests_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "plugins/b.yaml",
            "name: beta\ntokens:\n  - { name: W, pattern: '\\w+' }\n",
        );
        write(
            dir.path(),
            "plugins/a.json",
            r#"{"name": "alpha", "tokens": [{"name": "W", "pattern": "\\w+"}]}"#,
        );
        write(dir.path(), "plugins/notes.txt", "ignored");

        let manifests = ConfigLoader::new(dir.path()).load_manifests().unwrap();
        let names: Vec<&str> = manifests.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_bad_manifest_names_the_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "plugins/broken.yaml", "name: [\n");
        let err = ConfigLoader::new(dir.path()).load_manifests().unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_no_plugins_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigLoader::new(dir.path())
            .load_manifests()
            .unwrap()
            .is_empty());
    }
}
