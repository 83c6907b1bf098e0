//! Configuration file for the `actis` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actis_kernel::{CapabilityRegistry, ExecutionLimits};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ActisConfig {
    /// Capability table (TOML, or JSON by extension). Relative paths are
    /// resolved against the config file's directory. The standard table is
    /// used when absent.
    #[serde(default)]
    pub capability_table: Option<PathBuf>,
    pub limits: ExecutionLimits,
}

impl ActisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if let (Some(table), Some(dir)) = (&config.capability_table, path.parent()) {
            if table.is_relative() {
                config.capability_table = Some(dir.join(table));
            }
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn registry(&self) -> Result<Arc<CapabilityRegistry>> {
        registry_from(self.capability_table.as_deref())
    }
}

/// The registry named by `table`, or the standard one.
pub fn registry_from(table: Option<&Path>) -> Result<Arc<CapabilityRegistry>> {
    let registry = match table {
        Some(path) => CapabilityRegistry::from_path(path)
            .with_context(|| format!("Failed to load capability table {}", path.display()))?,
        None => CapabilityRegistry::standard(),
    };
    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use actis_kernel::FilesystemPolicy;

    use super::*;

    #[test]
    fn parses_the_documented_layout() {
        let config = ActisConfig::parse(
            r#"
            [limits]
            wall_time_ms = 5000
            memory_bytes = 16777216
            allowed_capabilities = ["print", "len", "respond"]

            [limits.filesystem]
            mode = "read_only_scoped"
            root = "./workspace"
            "#,
        )
        .expect("config parses");
        assert!(config.capability_table.is_none());
        assert_eq!(config.limits.wall_time, Duration::from_secs(5));
        assert!(config.limits.allows("respond"));
        assert_eq!(
            config.limits.filesystem,
            FilesystemPolicy::ReadOnlyScoped {
                root: PathBuf::from("./workspace")
            }
        );
        assert!(config.registry().expect("standard").contains("print"));
    }

    #[test]
    fn ceilings_have_no_defaults() {
        let err = ActisConfig::parse("[limits]\nallowed_capabilities = []\n");
        assert!(err.is_err());
    }

    #[test]
    fn capability_table_is_relative_to_the_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("caps.toml"),
            "[[capability]]\nname = \"ping\"\neffect = \"pure\"\n",
        )
        .expect("write table");
        let path = dir.path().join("actis.toml");
        std::fs::write(
            &path,
            "capability_table = \"caps.toml\"\n\n[limits]\nwall_time_ms = 100\nmemory_bytes = 1024\nallowed_capabilities = []\n",
        )
        .expect("write config");

        let config = ActisConfig::load(&path).expect("loads");
        assert_eq!(config.capability_table, Some(dir.path().join("caps.toml")));
        let registry = config.registry().expect("table loads");
        assert!(registry.contains("ping"));
        assert!(!registry.contains("print"));
    }

    #[test]
    fn missing_config_names_the_file() {
        let err = ActisConfig::load(Path::new("/nonexistent/actis.toml")).expect_err("missing");
        assert!(err.to_string().contains("/nonexistent/actis.toml"));
    }
}
