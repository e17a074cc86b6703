use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use svcgraph_cluster::ClusterConfig;
use svcgraph_graph::StoreConfig;
use svcgraph_log::LogConfig;

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            inner: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// A value that is neither `true` nor `false`.
#[derive(Debug, thiserror::Error)]
#[error("expected a boolean, got {0:?}")]
struct InvalidBool(String);

fn parse_bool(value: &str) -> Result<bool, InvalidBool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(InvalidBool(value.to_owned())),
    }
}

/// A time to live of zero would never admit an edge into the deduplication window.
#[derive(Debug, thiserror::Error)]
#[error("dedup ttl must be greater than zero")]
struct ZeroTtl;

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The host the server should bind to (network interface).
    pub host: Option<String>,
    /// The port to bind for the HTTP server.
    pub port: Option<String>,
    /// Base URL of the graph store.
    pub store_uri: Option<String>,
    /// User of the graph store.
    pub store_username: Option<String>,
    /// Password of the graph store.
    pub store_password: Option<String>,
    /// `"true"` if ownership lookups in the cluster are enabled, `"false"` otherwise.
    pub cluster_enabled: Option<String>,
    /// Deduplication window in seconds.
    pub dedup_ttl: Option<String>,
    /// Shutdown timeout in seconds.
    pub shutdown_timeout: Option<String>,
}

/// Network settings of the HTTP server.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Server {
    /// The host to which the server should bind.
    host: IpAddr,
    /// The port to which the server should bind.
    port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8083,
        }
    }
}

/// Controls the deduplication of graph writes.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Dedup {
    /// Seconds during which repeated observations of the same edge are not written again.
    ttl: u64,
}

impl Default for Dedup {
    fn default() -> Self {
        Dedup { ttl: 600 }
    }
}

/// Controls various limits.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Limits {
    /// The maximum size of a decompressed trace export request in bytes.
    max_request_size: usize,
    /// The maximum number of seconds to process a single trace export request.
    request_timeout: u64,
    /// The maximum number of seconds to wait for pending requests after receiving a shutdown
    /// signal.
    shutdown_timeout: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_request_size: 10 * 1024 * 1024,
            request_timeout: 30,
            shutdown_timeout: 10,
        }
    }
}

/// Controls the trace archive.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct Archive {
    /// Directory to write received spans to as JSON lines. Disabled if not set.
    path: Option<PathBuf>,
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"svcgraph"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "svcgraph".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    server: Server,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    cluster: ClusterConfig,
    #[serde(default)]
    dedup: Dedup,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    archive: Archive,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
}

impl ConfigValues {
    const FILE_NAME: &'static str = "config.yml";

    fn path(base: &Path) -> PathBuf {
        base.join(Self::FILE_NAME)
    }

    /// Loads the config file from the given directory, or defaults if it does not exist.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path));
            }
        };

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path: path.clone(),
        };

        config
            .validate()
            .map_err(|e| e.file(ConfigValues::path(&path)))?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let server = &mut self.values.server;

        if let Some(host) = overrides.host {
            server.host = host
                .parse::<IpAddr>()
                .map_err(|err| ConfigError::for_field(err, "host"))?;
        }

        if let Some(port) = overrides.port {
            server.port = port
                .as_str()
                .parse()
                .map_err(|err| ConfigError::for_field(err, "port"))?;
        }

        let store = &mut self.values.store;
        if let Some(uri) = overrides.store_uri {
            store.uri = uri;
        }
        if let Some(username) = overrides.store_username {
            store.username = username;
        }
        if let Some(password) = overrides.store_password {
            store.password = password;
        }

        if let Some(enabled) = overrides.cluster_enabled {
            self.values.cluster.enabled =
                parse_bool(&enabled).map_err(|err| ConfigError::for_field(err, "cluster_enabled"))?;
        }

        if let Some(ttl) = overrides.dedup_ttl {
            self.values.dedup.ttl = ttl
                .parse()
                .map_err(|err| ConfigError::for_field(err, "dedup_ttl"))?;
        }

        if let Some(shutdown_timeout) = overrides.shutdown_timeout {
            self.values.limits.shutdown_timeout = shutdown_timeout
                .parse()
                .map_err(|err| ConfigError::for_field(err, "shutdown_timeout"))?;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.values.dedup.ttl == 0 {
            return Err(ConfigError::for_field(ZeroTtl, "dedup.ttl"));
        }
        Ok(())
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the socket address the HTTP server binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        (self.values.server.host, self.values.server.port).into()
    }

    /// Returns the graph store connection settings.
    pub fn store(&self) -> &StoreConfig {
        &self.values.store
    }

    /// Returns the timeout of a graph store transaction.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.values.store.timeout)
    }

    /// Returns the cluster connection settings.
    pub fn cluster(&self) -> &ClusterConfig {
        &self.values.cluster
    }

    /// Returns `true` if ownership is looked up in the cluster.
    pub fn cluster_enabled(&self) -> bool {
        self.values.cluster.enabled
    }

    /// Returns the timeout of a single cluster query.
    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.values.cluster.timeout)
    }

    /// Returns the deduplication window of graph writes.
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.values.dedup.ttl)
    }

    /// Returns the maximum size of a decompressed trace export request.
    pub fn max_request_size(&self) -> usize {
        self.values.limits.max_request_size
    }

    /// Returns the time budget for processing a single request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.values.limits.request_timeout)
    }

    /// Returns the timeout for graceful shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.limits.shutdown_timeout)
    }

    /// Returns the directory for archived spans, if enabled.
    pub fn archive_path(&self) -> Option<&Path> {
        self.values.archive.path.as_deref()
    }

    /// Returns logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use svcgraph_log::{Level, LogFormat};

    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:8083".parse().unwrap());
        assert_eq!(config.store().uri, "http://localhost:7474");
        assert!(config.cluster_enabled());
        assert_eq!(config.dedup_ttl(), Duration::from_secs(600));
        assert_eq!(config.max_request_size(), 10 * 1024 * 1024);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.archive_path(), None);
        assert_eq!(config.statsd_addr(), None);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        write!(
            file,
            r#"
server:
  port: 9000
store:
  uri: https://neo4j.internal:7473
  database: graph
cluster:
  enabled: false
dedup:
  ttl: 60
archive:
  path: /var/lib/svcgraph/traces
logging:
  level: debug
  format: json
metrics:
  statsd: 127.0.0.1:8125
  default_tags:
    region: eu
"#
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.listen_addr().port(), 9000);
        assert_eq!(config.store().database, "graph");
        assert_eq!(config.store().username, "neo4j");
        assert!(!config.cluster_enabled());
        assert_eq!(config.dedup_ttl(), Duration::from_secs(60));
        assert_eq!(
            config.archive_path(),
            Some(Path::new("/var/lib/svcgraph/traces"))
        );
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
        assert_eq!(config.metrics_default_tags()["region"], "eu");
    }

    #[test]
    fn test_bad_yaml_names_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "server: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().contains("config.yml"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let error = Config::from_json_value(serde_json::json!({"dedup": {"ttl": 0}})).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        insta::assert_snapshot!(error, @"invalid config value (field dedup.ttl)");
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();

        config
            .apply_override(OverridableConfig {
                host: Some("127.0.0.1".to_owned()),
                port: Some("8090".to_owned()),
                store_uri: Some("http://neo4j:7474".to_owned()),
                store_password: Some("secret".to_owned()),
                cluster_enabled: Some("false".to_owned()),
                dedup_ttl: Some("30".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.listen_addr(), "127.0.0.1:8090".parse().unwrap());
        assert_eq!(config.store().uri, "http://neo4j:7474");
        assert_eq!(config.store().password, "secret");
        assert!(!config.cluster_enabled());
        assert_eq!(config.dedup_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_override_names_field() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();

        let error = config
            .apply_override(OverridableConfig {
                port: Some("eighty".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        insta::assert_snapshot!(error, @"invalid config value (field port)");

        let error = config
            .apply_override(OverridableConfig {
                cluster_enabled: Some("maybe".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(error.to_string().ends_with("(field cluster_enabled)"));

        let error = config
            .apply_override(OverridableConfig {
                dedup_ttl: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(error.to_string().ends_with("(field dedup.ttl)"));
    }

    #[test]
    fn test_yaml_dump() {
        let config = Config::from_json_value(serde_json::json!({"server": {"port": 9001}})).unwrap();
        let yaml = config.to_yaml_string().unwrap();

        let reparsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed["server"]["port"].as_u64(), Some(9001));
        assert_eq!(reparsed["dedup"]["ttl"].as_u64(), Some(600));
    }
}
