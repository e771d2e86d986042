//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;
use uuid::Uuid;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "echoes";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_ECHO_LIMIT: usize = 500;
const DEFAULT_CACHE_PAGE_LIMIT: usize = 200;
const DEFAULT_CACHE_TODAY_LIMIT: usize = 4;
const DEFAULT_CACHE_TEXT_LIMIT: usize = 16;
const DEFAULT_CACHE_GROUP_KEY_LIMIT: usize = 1024;
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_OWNER_USERNAME: &str = "admin";
const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECENT_TEMPERATURE: f32 = 0.7;
const DEFAULT_LAYOUT_TEMPERATURE: f32 = 0.2;

/// Command-line arguments for the echoes operations binary.
#[derive(Debug, Parser)]
#[command(name = "echoes", version, about = "Echoes timeline operations")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ECHOES_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Act as an anonymous visitor instead of the site owner.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub anonymous: bool,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the site timezone (IANA name).
    #[arg(long = "site-timezone", value_name = "TZ", global = true)]
    pub site_timezone: Option<String>,

    /// Enable or disable the text generator.
    #[arg(
        long = "generator-enabled",
        value_name = "BOOL",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub generator_enabled: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,
    /// Recommend a layout for a JSON request.
    Recommend(InputArgs),
    /// Print the summary of recent activity.
    Summary,
    /// Echo operations.
    #[command(subcommand)]
    Echo(EchoCommand),
    /// Tag operations.
    #[command(subcommand)]
    Tags(TagsCommand),
}

#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// JSON file to read, or `-` for stdin.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,
}

#[derive(Debug, Subcommand, Clone)]
pub enum EchoCommand {
    /// Show one echo.
    Get { id: Uuid },
    /// List echoes, newest first.
    List(ListArgs),
    /// List echoes created today in the site timezone.
    Today,
    /// Create an echo from a JSON payload.
    Create(InputArgs),
    /// Like an echo.
    Like { id: Uuid },
    /// Delete an echo and its media.
    Delete { id: Uuid },
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    #[arg(long = "page-size", default_value_t = 10)]
    pub page_size: u32,

    /// Case-insensitive content search.
    #[arg(long)]
    pub search: Option<String>,

    /// Only echoes carrying this tag.
    #[arg(long = "tag-id")]
    pub tag_id: Option<Uuid>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TagsCommand {
    /// List tags, most used first.
    List,
    /// Create a tag.
    Create { name: String },
    /// Delete a tag and its associations.
    Delete { id: Uuid },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub site: SiteSettings,
    pub generator: GeneratorSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// `None` selects the in-memory repositories.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub echo_limit: usize,
    pub page_limit: usize,
    pub today_limit: usize,
    pub text_limit: usize,
    pub group_key_limit: usize,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub timezone: Tz,
    pub owner_id: Uuid,
    pub owner_username: String,
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub enabled: bool,
    pub base_url: Option<Url>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
    pub recent_temperature: f32,
    pub layout_temperature: f32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("ECHOES").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    site: RawSiteSettings,
    generator: RawGeneratorSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(timezone) = overrides.site_timezone.as_ref() {
            self.site.timezone = Some(timezone.clone());
        }
        if let Some(enabled) = overrides.generator_enabled {
            self.generator.enabled = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            site,
            generator,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache),
            site: build_site_settings(site)?,
            generator: build_generator_settings(generator)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    if max_connections == 0 {
        return Err(LoadError::invalid(
            "database.max_connections",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

/// Zero limits are clamped to one by the cache itself.
fn build_cache_settings(cache: RawCacheSettings) -> CacheSettings {
    CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        echo_limit: cache.echo_limit.unwrap_or(DEFAULT_CACHE_ECHO_LIMIT),
        page_limit: cache.page_limit.unwrap_or(DEFAULT_CACHE_PAGE_LIMIT),
        today_limit: cache.today_limit.unwrap_or(DEFAULT_CACHE_TODAY_LIMIT),
        text_limit: cache.text_limit.unwrap_or(DEFAULT_CACHE_TEXT_LIMIT),
        group_key_limit: cache
            .group_key_limit
            .unwrap_or(DEFAULT_CACHE_GROUP_KEY_LIMIT),
    }
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let timezone_name = non_blank(site.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(&timezone_name).map_err(|err| {
        LoadError::invalid("site.timezone", format!("`{timezone_name}`: {err}"))
    })?;

    let owner_id = match non_blank(site.owner_id) {
        Some(value) => Uuid::parse_str(&value)
            .map_err(|err| LoadError::invalid("site.owner_id", err.to_string()))?,
        None => Uuid::nil(),
    };

    let owner_username =
        non_blank(site.owner_username).unwrap_or_else(|| DEFAULT_OWNER_USERNAME.to_string());

    Ok(SiteSettings {
        timezone,
        owner_id,
        owner_username,
    })
}

fn build_generator_settings(
    generator: RawGeneratorSettings,
) -> Result<GeneratorSettings, LoadError> {
    let enabled = generator.enabled.unwrap_or(false);

    let base_url = non_blank(generator.base_url)
        .map(|value| Url::parse(&value))
        .transpose()
        .map_err(|err| LoadError::invalid("generator.base_url", err.to_string()))?;
    let model = non_blank(generator.model);

    if enabled && base_url.is_none() {
        return Err(LoadError::invalid(
            "generator.base_url",
            "required when the generator is enabled",
        ));
    }
    if enabled && model.is_none() {
        return Err(LoadError::invalid(
            "generator.model",
            "required when the generator is enabled",
        ));
    }

    let timeout_secs = generator
        .timeout_seconds
        .unwrap_or(DEFAULT_GENERATOR_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "generator.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(GeneratorSettings {
        enabled,
        base_url,
        api_key: non_blank(generator.api_key),
        model,
        timeout: Duration::from_secs(timeout_secs),
        recent_temperature: temperature(
            generator.recent_temperature,
            DEFAULT_RECENT_TEMPERATURE,
            "generator.recent_temperature",
        )?,
        layout_temperature: temperature(
            generator.layout_temperature,
            DEFAULT_LAYOUT_TEMPERATURE,
            "generator.layout_temperature",
        )?,
    })
}

fn temperature(value: Option<f32>, default: f32, key: &'static str) -> Result<f32, LoadError> {
    let value = value.unwrap_or(default);
    if !(0.0..=2.0).contains(&value) {
        return Err(LoadError::invalid(key, "must be between 0 and 2"));
    }
    Ok(value)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    echo_limit: Option<usize>,
    page_limit: Option<usize>,
    today_limit: Option<usize>,
    text_limit: Option<usize>,
    group_key_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    timezone: Option<String>,
    owner_id: Option<String>,
    owner_username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGeneratorSettings {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_seconds: Option<u64>,
    recent_temperature: Option<f32>,
    layout_temperature: Option<f32>,
}
