//! Resource and capability limits for one execution.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a script may touch and for how long.
///
/// There are deliberately no defaults for the ceilings: callers always say
/// how much time and memory a run gets and which capabilities it may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Wall-clock ceiling for the whole run.
    #[serde(rename = "wall_time_ms", with = "duration_ms")]
    pub wall_time: Duration,
    /// Ceiling on the estimated size of live script values.
    pub memory_bytes: usize,
    /// Capabilities the script may call, a subset of the registry.
    pub allowed_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub filesystem: FilesystemPolicy,
    #[serde(default)]
    pub network: NetworkPolicy,
}

impl ExecutionLimits {
    /// Limits with no filesystem and no network access.
    pub fn new<I, S>(wall_time: Duration, memory_bytes: usize, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wall_time,
            memory_bytes,
            allowed_capabilities: allowed.into_iter().map(Into::into).collect(),
            filesystem: FilesystemPolicy::default(),
            network: NetworkPolicy::default(),
        }
    }

    pub fn with_filesystem(mut self, policy: FilesystemPolicy) -> Self {
        self.filesystem = policy;
        self
    }

    pub fn with_network(mut self, policy: NetworkPolicy) -> Self {
        self.network = policy;
        self
    }

    pub fn allows(&self, capability: &str) -> bool {
        self.allowed_capabilities.contains(capability)
    }
}

/// Filesystem access granted to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FilesystemPolicy {
    /// Every filesystem access is denied.
    #[default]
    #[serde(rename = "none")]
    Disabled,
    /// Reads under `root` only.
    ReadOnlyScoped { root: PathBuf },
    /// Reads and writes under `root` only.
    ReadWriteScoped { root: PathBuf },
}

impl FilesystemPolicy {
    pub fn root(&self) -> Option<&Path> {
        match self {
            FilesystemPolicy::Disabled => None,
            FilesystemPolicy::ReadOnlyScoped { root } | FilesystemPolicy::ReadWriteScoped { root } => {
                Some(root)
            }
        }
    }

    pub fn allows_write(&self) -> bool {
        matches!(self, FilesystemPolicy::ReadWriteScoped { .. })
    }
}

/// Network access granted to a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NetworkPolicy {
    #[default]
    Deny,
    /// Exact host names, or `*.example.com` for any subdomain.
    AllowListed { hosts: Vec<String> },
}

impl NetworkPolicy {
    pub fn allows_host(&self, host: &str) -> bool {
        let NetworkPolicy::AllowListed { hosts } = self else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        hosts.iter().any(|pattern| {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_prefix("*.") {
                Some(suffix) => host
                    .strip_suffix(suffix)
                    .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1),
                None => host == pattern,
            }
        })
    }
}

/// Serialize a `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_toml() {
        let limits: ExecutionLimits = toml::from_str(
            r#"
            wall_time_ms = 2500
            memory_bytes = 1048576
            allowed_capabilities = ["print", "read_files"]

            [filesystem]
            mode = "read_only_scoped"
            root = "/srv/data"

            [network]
            mode = "allow_listed"
            hosts = ["example.com", "*.internal"]
            "#,
        )
        .expect("limits parse");
        assert_eq!(limits.wall_time, Duration::from_millis(2500));
        assert!(limits.allows("print"));
        assert!(!limits.allows("http_get"));
        assert_eq!(
            limits.filesystem,
            FilesystemPolicy::ReadOnlyScoped {
                root: PathBuf::from("/srv/data")
            }
        );
        assert!(limits.network.allows_host("api.internal"));
    }

    #[test]
    fn policies_default_to_closed() {
        let limits: ExecutionLimits = serde_json::from_str(
            r#"{"wall_time_ms": 100, "memory_bytes": 1024, "allowed_capabilities": []}"#,
        )
        .expect("limits parse");
        assert_eq!(limits.filesystem, FilesystemPolicy::Disabled);
        assert_eq!(limits.network, NetworkPolicy::Deny);
    }

    #[test]
    fn ceilings_are_required() {
        let missing = serde_json::from_str::<ExecutionLimits>(r#"{"memory_bytes": 1024, "allowed_capabilities": []}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn disabled_filesystem_serializes_as_none() {
        let json = serde_json::to_value(FilesystemPolicy::Disabled).expect("json");
        assert_eq!(json, serde_json::json!({"mode": "none"}));
    }

    #[test]
    fn host_matching() {
        let policy = NetworkPolicy::AllowListed {
            hosts: vec!["example.com".into(), "*.example.org".into()],
        };
        assert!(policy.allows_host("example.com"));
        assert!(policy.allows_host("EXAMPLE.com."));
        assert!(!policy.allows_host("www.example.com"));
        assert!(policy.allows_host("api.example.org"));
        assert!(!policy.allows_host("example.org"));
        assert!(!policy.allows_host("badexample.org"));
        assert!(!NetworkPolicy::Deny.allows_host("example.com"));
    }
}
