use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::errors::{to_env_var, ConfigError};
use crate::providers::configs::{GeminiProviderConfig, ProviderConfig, GEMINI_HOST, GEMINI_MODEL};
use crate::rate_limiter::DEFAULT_RPM_LIMIT;

pub const GENERATOR_WORKFLOW: &str = "Dynamic Workflow Generator";
pub const GENERATOR_CONFIG_FILE: &str = "generator_agent_config.json";

/// Workflows offered when their configuration file is present, in display order
const WORKFLOWS: [(&str, &str); 6] = [
    (GENERATOR_WORKFLOW, GENERATOR_CONFIG_FILE),
    ("Python Task", "agents_config_python.json"),
    ("C++ Task", "agents_config_cpp.json"),
    ("Java Task", "agents_config_java.json"),
    ("JavaScript Task", "agents_config_javascript.json"),
    ("Python Plugin Developer", "plugin_developer_config.json"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl ProviderSettings {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::Gemini(GeminiProviderConfig {
            host: self.host.clone(),
            api_key: self.api_key.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: u32,
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: PathBuf,
}

impl Settings {
    /// Defaults, then `baton.toml` in the working directory if present, then `BATON_*` vars
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Like [`Settings::new`] but reading the given file instead of `baton.toml`
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("baton").required(false),
        };

        let config = Config::builder()
            .set_default("server.host", default_server_host())?
            .set_default("server.port", default_port())?
            .set_default("provider.host", default_provider_host())?
            .set_default("provider.model", default_model())?
            .set_default("rpm_limit", i64::from(default_rpm_limit()))?
            .set_default("workflows_dir", "workflows")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("BATON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            if let Some(field) = missing_field_path(&err.to_string()) {
                return ConfigError::MissingEnvVar {
                    env_var: to_env_var(&field),
                };
            }
            match err {
                config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                    env_var: to_env_var(&field),
                },
                other => ConfigError::Other(other),
            }
        })?;

        if settings.rpm_limit == 0 {
            return Err(ConfigError::InvalidRpmLimit(0));
        }
        Ok(settings)
    }
}

/// Pull `provider.api_key` out of messages like "missing field `api_key` for key `provider`"
fn missing_field_path(message: &str) -> Option<String> {
    let rest = message.strip_prefix("missing field `")?;
    let (field, rest) = rest.split_once('`')?;
    let key = rest
        .split_once("for key `")
        .and_then(|(_, key)| key.split_once('`'))
        .map(|(key, _)| key)
        .filter(|key| !key.is_empty());

    Some(match key {
        Some(key) => format!("{}.{}", key, field),
        // the only required nested field
        None if field == "api_key" => "provider.api_key".to_string(),
        None => field.to_string(),
    })
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_provider_host() -> String {
    GEMINI_HOST.to_string()
}

fn default_model() -> String {
    GEMINI_MODEL.to_string()
}

fn default_rpm_limit() -> u32 {
    DEFAULT_RPM_LIMIT
}

fn default_workflows_dir() -> PathBuf {
    PathBuf::from("workflows")
}

/// A runnable workflow and the file that defines its agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowEntry {
    pub name: String,
    pub path: PathBuf,
    /// The file defines a generator whose reply is the real agent list
    pub is_generator: bool,
}

/// The workflows available in a directory
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    entries: Vec<WorkflowEntry>,
}

impl WorkflowCatalog {
    /// Offer every known workflow whose file exists under `dir`
    pub fn discover(dir: &Path) -> Self {
        let entries = WORKFLOWS
            .iter()
            .filter_map(|(name, file)| {
                let path = dir.join(file);
                if !path.is_file() {
                    tracing::debug!(workflow = name, path = %path.display(), "workflow file not found");
                    return None;
                }
                Some(WorkflowEntry {
                    name: name.to_string(),
                    path,
                    is_generator: *name == GENERATOR_WORKFLOW,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[WorkflowEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<&WorkflowEntry, ConfigError> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ConfigError::UnknownWorkflow(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("BATON_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("BATON_PROVIDER__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.provider.host, GEMINI_HOST);
        assert_eq!(settings.provider.api_key, "test-key");
        assert_eq!(settings.provider.model, "gemini-2.5-pro-exp-03-25");
        assert_eq!(settings.rpm_limit, 10);
        assert_eq!(settings.workflows_dir, PathBuf::from("workflows"));

        env::remove_var("BATON_PROVIDER__API_KEY");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("BATON_SERVER__PORT", "8080");
        env::set_var("BATON_PROVIDER__API_KEY", "test-key");
        env::set_var("BATON_PROVIDER__HOST", "http://localhost:9000");
        env::set_var("BATON_PROVIDER__MODEL", "gemini-2.0-flash");
        env::set_var("BATON_RPM_LIMIT", "30");
        env::set_var("BATON_WORKFLOWS_DIR", "/tmp/flows");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.provider.host, "http://localhost:9000");
        assert_eq!(settings.provider.model, "gemini-2.0-flash");
        assert_eq!(settings.rpm_limit, 30);
        assert_eq!(settings.workflows_dir, PathBuf::from("/tmp/flows"));

        let ProviderConfig::Gemini(config) = settings.provider.provider_config();
        assert_eq!(config.host, "http://localhost:9000");
        assert_eq!(config.api_key, "test-key");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key() {
        clean_env();
        let err = Settings::new().unwrap_err();
        assert!(
            matches!(&err, ConfigError::MissingEnvVar { env_var } if env_var == "BATON_PROVIDER__API_KEY"),
            "{:?}",
            err
        );
    }

    #[test]
    #[serial]
    fn test_zero_rpm_limit_is_rejected() {
        clean_env();
        env::set_var("BATON_PROVIDER__API_KEY", "test-key");
        env::set_var("BATON_RPM_LIMIT", "0");

        let err = Settings::new().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRpmLimit(0)));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_settings_file() {
        clean_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            "rpm_limit = 5\n[provider]\napi_key = \"from-file\"\n[server]\nport = 4000\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.rpm_limit, 5);
        assert_eq!(settings.provider.api_key, "from-file");
        assert_eq!(settings.server.port, 4000);
    }

    #[test]
    fn test_missing_field_path() {
        assert_eq!(
            missing_field_path("missing field `api_key` for key `provider`").as_deref(),
            Some("provider.api_key")
        );
        assert_eq!(
            missing_field_path("missing field `api_key`").as_deref(),
            Some("provider.api_key")
        );
        assert_eq!(missing_field_path("invalid type"), None);
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_catalog_only_offers_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("agents_config_java.json"), "[]").unwrap();
        fs::write(dir.path().join(GENERATOR_CONFIG_FILE), "[]").unwrap();

        let catalog = WorkflowCatalog::discover(dir.path());
        let names: Vec<&str> = catalog.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![GENERATOR_WORKFLOW, "Java Task"]);
        assert!(catalog.get(GENERATOR_WORKFLOW).unwrap().is_generator);
        assert!(!catalog.get("Java Task").unwrap().is_generator);
        assert!(matches!(
            catalog.get("Python Task"),
            Err(ConfigError::UnknownWorkflow(_))
        ));

        let empty = WorkflowCatalog::discover(&dir.path().join("nope"));
        assert!(empty.is_empty());
    }
}
