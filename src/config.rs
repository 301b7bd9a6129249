use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::commission::{Rate, DEFAULT_COMMISSION_RATE};
use crate::error::MigrateError;

const ENV_PREFIX: &str = "PETMIGRATE_";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl DatabaseConfig {
    const DEFAULT_PATH: &'static str = "pet_transport.db";

    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from(Self::DEFAULT_PATH),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&'static str; 5] = ["error", "warn", "info", "debug", "trace"];
    const DEFAULT_LEVEL: &'static str = "info";

    fn default() -> Self {
        LoggingConfig {
            level: Self::DEFAULT_LEVEL.to_string(),
        }
    }

    /// flexi_logger spec string scoping the level to this crate.
    pub fn log_spec(&self) -> String {
        format!("petmigrate={}", self.level)
    }

    fn ensure_valid(&mut self) {
        let str_original = self.level.clone();
        self.level = self.level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.level.as_str()) {
            eprintln!(
                "Config error: log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::DEFAULT_LEVEL
            );
            self.level = Self::DEFAULT_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommissionConfig {
    #[serde(deserialize_with = "rate_string")]
    default_rate: String,
}

/// Accepts `default_rate = "0.07"` as well as a bare number, which is how environment
/// variables and unquoted TOML values arrive.
fn rate_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRate {
        Text(String),
        Number(f64),
    }

    Ok(match RawRate::deserialize(deserializer)? {
        RawRate::Text(s) => s,
        RawRate::Number(n) => n.to_string(),
    })
}

impl CommissionConfig {
    fn default() -> Self {
        CommissionConfig {
            default_rate: DEFAULT_COMMISSION_RATE.to_string(),
        }
    }

    pub fn default_rate(&self) -> Rate {
        // ensure_valid guarantees the string parses
        self.default_rate.parse().unwrap_or(DEFAULT_COMMISSION_RATE)
    }

    fn ensure_valid(&mut self) {
        match self.default_rate.parse::<Rate>() {
            Ok(rate) => self.default_rate = rate.to_string(),
            Err(e) => {
                eprintln!(
                    "Config error: commission rate of '{}' is invalid ({}) - using default of '{}'",
                    self.default_rate, e, DEFAULT_COMMISSION_RATE
                );
                self.default_rate = DEFAULT_COMMISSION_RATE.to_string();
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub commission: CommissionConfig,
}

impl Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            commission: CommissionConfig::default(),
        }
    }

    /// Loads configuration from `explicit_path` if given, otherwise from `config.toml` in
    /// the user's config directory. In the latter case a missing file is created with the
    /// defaults and a file that fails to parse falls back to the defaults. An explicit
    /// path must exist and parse.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, MigrateError> {
        let mut config = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(MigrateError::Error(format!(
                        "Config file '{}' does not exist",
                        path.display()
                    )));
                }
                Self::extract(path)?
            }
            None => {
                let config_path = Self::default_path()?;
                Self::write_default_if_missing(&config_path);

                Self::extract(&config_path).unwrap_or_else(|err| {
                    eprintln!(
                        "Could not load config file {}: {}. Using default configuration.",
                        config_path.display(),
                        err
                    );
                    Self::default()
                })
            }
        };

        config.ensure_valid();

        Ok(config)
    }

    fn default_path() -> Result<PathBuf, MigrateError> {
        let project_dirs = ProjectDirs::from("", "", "petmigrate").ok_or_else(|| {
            MigrateError::Error("Could not determine the user configuration directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    fn write_default_if_missing(config_path: &Path) {
        if config_path.exists() {
            return;
        }

        if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!(
                    "Failed to create configuration directory {}: {}",
                    parent.display(),
                    e
                );
            }
        }
        if let Ok(toml_string) = toml::to_string_pretty(&Self::default()) {
            if let Err(e) = fs::write(config_path, toml_string) {
                eprintln!(
                    "Failed to write default config to {}: {}",
                    config_path.display(),
                    e
                );
            }
        } else {
            eprintln!("Failed to serialize default config.");
        }
    }

    /// Defaults, overlaid by the TOML file, overlaid by `PETMIGRATE_*` environment variables.
    fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(config_path: &Path) -> Result<Self, MigrateError> {
        Self::figment(config_path)
            .extract()
            .map_err(|e| MigrateError::ConfigError(Box::new(e)))
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.commission.ensure_valid();
    }
}
