//! Client configuration file.
//!
//! ```toml
//! [defaults]
//! consistency = "local_quorum"
//! keywordize = true
//! query_cache_capacity = 256
//! log_level = "corvid=debug"
//!
//! [cluster]
//! contact_points = ["10.0.0.1", "10.0.0.2"]
//! port = 9042
//! keyspace = "app"
//!
//! [cluster.options]
//! load_balancing = "dc_aware"
//! ```
//!
//! Everything under `[cluster.options]` is handed to the cluster factory as is.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::context;
use crate::query::cache::LruQueryCache;
use crate::query::consistency::Consistency;
use crate::session::{self, Cluster, ClusterFactory, ClusterOptions, Session};

/// Parsed client configuration.
#[derive(Debug, Default, Clone)]
pub struct ClientConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl ClientConfig {
    /// Loads `explicit`, else the default path. A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => RawConfig::default(),
        };
        validate(&data)?;
        Ok(Self { path, data })
    }

    /// File the configuration was loaded from or will be persisted to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Default consistency level.
    pub fn consistency(&self) -> Option<Consistency> {
        self.data.defaults.consistency
    }

    /// Default keywordize flag.
    pub fn keywordize(&self) -> Option<bool> {
        self.data.defaults.keywordize
    }

    /// Capacity for the process query cache.
    pub fn query_cache_capacity(&self) -> Option<usize> {
        self.data.defaults.query_cache_capacity
    }

    /// Filter directive for [`crate::logging::init_logging`].
    pub fn log_level(&self) -> Option<&str> {
        self.data.defaults.log_level.as_deref()
    }

    /// Keyspace to bind sessions to.
    pub fn keyspace(&self) -> Option<&str> {
        self.data.cluster.keyspace.as_deref()
    }

    /// Options for the cluster factory.
    pub fn cluster_options(&self) -> ClusterOptions {
        self.data.cluster.options.clone()
    }

    /// Sets the default consistency level.
    pub fn set_consistency(&mut self, consistency: Option<Consistency>) {
        self.data.defaults.consistency = consistency;
    }

    /// Installs the `[defaults]` section into the process-wide ambient slots.
    ///
    /// Unset keys leave the corresponding slot untouched.
    pub fn apply_globals(&self) {
        let defaults = &self.data.defaults;
        if let Some(consistency) = defaults.consistency {
            context::set_consistency(consistency);
        }
        if let Some(keywordize) = defaults.keywordize {
            context::set_keywordize(keywordize);
        }
        if let Some(capacity) = defaults.query_cache_capacity {
            context::set_query_cache(Arc::new(LruQueryCache::with_capacity(capacity)));
        }
        debug!(
            consistency = ?defaults.consistency,
            keywordize = ?defaults.keywordize,
            query_cache_capacity = ?defaults.query_cache_capacity,
            "applied configuration defaults"
        );
    }

    /// Builds a cluster from `[cluster]` and opens a session on the configured keyspace.
    pub fn connect(
        &self,
        factory: &dyn ClusterFactory,
    ) -> crate::Result<(Arc<dyn Cluster>, Arc<dyn Session>)> {
        let cluster = session::cluster(factory, &self.cluster_options())?;
        let session = session::connect(cluster.as_ref(), self.keyspace())?;
        Ok((cluster, session))
    }

    /// Writes the configuration back to its path, or the default path.
    pub fn persist(&self) -> Result<PathBuf, ConfigError> {
        let target = match self.path.clone().or_else(default_config_path) {
            Some(path) => path,
            None => return Err(ConfigError::NoConfigPath),
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = toml::to_string_pretty(&self.data)
            .map_err(|source| ConfigError::Serialize { source })?;
        fs::write(&target, serialized).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }
}

impl FromStr for ClientConfig {
    type Err = ConfigError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let data: RawConfig =
            toml::from_str(contents).map_err(|source| ConfigError::ParseInline { source })?;
        validate(&data)?;
        Ok(Self { path: None, data })
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn validate(data: &RawConfig) -> Result<(), ConfigError> {
    if data.defaults.query_cache_capacity == Some(0) {
        return Err(ConfigError::InvalidValue {
            key: "defaults.query_cache_capacity",
            value: "0".into(),
        });
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    defaults: DefaultsSection,
    #[serde(default)]
    cluster: ClusterSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
struct DefaultsSection {
    consistency: Option<Consistency>,
    keywordize: Option<bool>,
    query_cache_capacity: Option<usize>,
    log_level: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
struct ClusterSection {
    keyspace: Option<String>,
    #[serde(flatten)]
    options: ClusterOptions,
}

/// Failure to load or store a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read client config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse client config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// In-memory contents are not valid TOML for this schema.
    #[error("failed to parse client config: {source}")]
    ParseInline {
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// A key parsed but holds an unusable value.
    #[error("client config key '{key}' has invalid value '{value}'")]
    InvalidValue {
        /// Dotted key path.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// The configuration could not be serialized.
    #[error("failed to serialize client config: {source}")]
    Serialize {
        /// Underlying TOML error.
        source: toml::ser::Error,
    },
    /// The file could not be written.
    #[error("failed to write client config {path}: {source}")]
    Write {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The parent directory could not be created.
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        /// Directory that was created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// There is no explicit path and no platform config directory.
    #[error("no config directory found; pass an explicit config path")]
    NoConfigPath,
}

/// `<platform config dir>/corvid/client.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("corvid").join("client.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::MemoryClusterFactory;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
        [defaults]
        consistency = "LOCAL_QUORUM"
        keywordize = false
        query_cache_capacity = 16

        [cluster]
        contact_points = ["10.0.0.1"]
        port = 9042
        keyspace = "app"

        [cluster.options]
        load_balancing = "dc_aware"
    "#;

    #[test]
    fn parses_defaults_and_cluster_sections() {
        let config: ClientConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.consistency(), Some(Consistency::LocalQuorum));
        assert_eq!(config.keywordize(), Some(false));
        assert_eq!(config.query_cache_capacity(), Some(16));
        assert_eq!(config.keyspace(), Some("app"));
        let options = config.cluster_options();
        assert_eq!(options.contact_points, vec!["10.0.0.1".to_string()]);
        assert_eq!(options.port, Some(9042));
        assert_eq!(
            options.options.get("load_balancing"),
            Some(&toml::Value::String("dc_aware".into()))
        );
    }

    #[test]
    fn unknown_consistency_is_a_parse_error() {
        let err = "[defaults]\nconsistency = \"most\"\n"
            .parse::<ClientConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseInline { .. }));
    }

    #[test]
    fn zero_cache_capacity_is_rejected() {
        let err = "[defaults]\nquery_cache_capacity = 0\n"
            .parse::<ClientConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ClientConfig::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.consistency(), None);
        assert!(config.cluster_options().contact_points.is_empty());
    }

    #[test]
    fn persist_round_trips_through_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, SAMPLE).unwrap();

        let mut config = ClientConfig::load(Some(path.clone())).unwrap();
        config.set_consistency(Some(Consistency::EachQuorum));
        assert_eq!(config.persist().unwrap(), path);

        let reloaded = ClientConfig::load(Some(path)).unwrap();
        assert_eq!(reloaded.consistency(), Some(Consistency::EachQuorum));
        assert_eq!(reloaded.cluster_options(), config.cluster_options());
    }

    #[test]
    fn read_errors_carry_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        fs::write(&path, "[defaults\n").unwrap();
        match ClientConfig::load(Some(path.clone())) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn connect_opens_a_session_on_the_configured_keyspace() {
        let config: ClientConfig = SAMPLE.parse().unwrap();
        let factory = MemoryClusterFactory::new();
        let (cluster, session) = config.connect(&factory).unwrap();
        assert_eq!(session.keyspace().as_deref(), Some("app"));
        crate::session::shutdown_cluster(cluster.as_ref());
        assert!(factory.clusters()[0].is_shut_down());
    }
}
