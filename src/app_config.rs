//! Application configuration: `config.toml` tunables, CLI overrides, and
//! credentials from the environment.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use book_courier::download::{DEFAULT_MIRROR_LABEL, DEFAULT_WEBDRIVER_URL, DownloadWait};
use book_courier::http::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts};
use book_courier::library::DEFAULT_CONVERTER;
use book_courier::relevance::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};

use crate::cli::Args;

const APP_DIR: &str = "book-courier";

/// Key = value file configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory the browser downloads into.
    pub downloads_dir: Option<PathBuf>,
    /// Directory normalized books are collected in.
    pub books_dir: Option<PathBuf>,
    /// Directory holding the not-found log.
    pub logs_dir: Option<PathBuf>,
    /// Longest wait for one browser download.
    pub download_timeout_secs: Option<u64>,
    /// Delay between download-directory checks.
    pub poll_interval_secs: Option<u64>,
    /// Pause between navigation and the first check.
    pub settle_delay_secs: Option<u64>,
    /// Chromedriver endpoint.
    pub webdriver_url: Option<String>,
    /// Run the browser without a window.
    pub headless: Option<bool>,
    /// Chat model used for the relevance check.
    pub llm_model: Option<String>,
    /// Base URL of the OpenAI-compatible API.
    pub llm_base_url: Option<String>,
    /// Label of the direct-download link on mirror pages.
    pub mirror_label: Option<String>,
    /// EPUB converter executable.
    pub converter: Option<String>,
    /// Subject line of outgoing mail.
    pub mail_subject: Option<String>,
    /// HTTP connect timeout.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("download_timeout_secs", self.download_timeout_secs, 1, 3600)?;
        validate_range("poll_interval_secs", self.poll_interval_secs, 1, 600)?;
        validate_range("settle_delay_secs", self.settle_delay_secs, 0, 120)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        for (field, value) in [
            ("webdriver_url", &self.webdriver_url),
            ("llm_base_url", &self.llm_base_url),
        ] {
            if let Some(url) = value
                && url::Url::parse(url).is_err()
            {
                bail!("Invalid config value for `{field}`: '{url}' is not a URL");
            }
        }
        for (field, value) in [
            ("llm_model", &self.llm_model),
            ("mirror_label", &self.mirror_label),
            ("converter", &self.converter),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                bail!("Invalid config value for `{field}`: must not be empty");
            }
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/book-courier/config.toml`
/// 2. `$HOME/.config/book-courier/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let string = || {
            parse_string_literal(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };
        let integer = || {
            parse_integer_u64(value)
                .with_context(|| format!("Invalid `{key}` value on line {line_no}"))
        };

        match key {
            "downloads_dir" => cfg.downloads_dir = Some(PathBuf::from(string()?)),
            "books_dir" => cfg.books_dir = Some(PathBuf::from(string()?)),
            "logs_dir" => cfg.logs_dir = Some(PathBuf::from(string()?)),
            "download_timeout_secs" => cfg.download_timeout_secs = Some(integer()?),
            "poll_interval_secs" => cfg.poll_interval_secs = Some(integer()?),
            "settle_delay_secs" => cfg.settle_delay_secs = Some(integer()?),
            "webdriver_url" => cfg.webdriver_url = Some(string()?),
            "headless" => {
                let parsed = parse_boolean(value)
                    .with_context(|| format!("Invalid `headless` value on line {line_no}"))?;
                cfg.headless = Some(parsed);
            }
            "llm_model" => cfg.llm_model = Some(string()?),
            "llm_base_url" => cfg.llm_base_url = Some(string()?),
            "mirror_label" => cfg.mirror_label = Some(string()?),
            "converter" => cfg.converter = Some(string()?),
            "mail_subject" => cfg.mail_subject = Some(string()?),
            "connect_timeout_secs" => cfg.connect_timeout_secs = Some(integer()?),
            "read_timeout_secs" => cfg.read_timeout_secs = Some(integer()?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

/// Effective settings after applying CLI flags over the file over defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub downloads_dir: PathBuf,
    pub books_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub wait: DownloadWait,
    pub settle_delay: Duration,
    pub webdriver_url: String,
    pub headless: bool,
    pub llm_model: String,
    pub llm_base_url: String,
    pub mirror_label: String,
    pub converter: String,
    pub mail_subject: Option<String>,
    pub timeouts: HttpTimeouts,
}

impl Settings {
    /// Merges CLI flags, file config and defaults.
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        let file = file.cloned().unwrap_or_default();
        let download_timeout_secs = args
            .download_timeout
            .or(file.download_timeout_secs)
            .unwrap_or(300);
        validate_range("download timeout", Some(download_timeout_secs), 1, 3600)?;

        let settings = Self {
            downloads_dir: args
                .downloads_dir
                .clone()
                .or(file.downloads_dir)
                .unwrap_or_else(|| PathBuf::from("Downloads")),
            books_dir: args
                .books_dir
                .clone()
                .or(file.books_dir)
                .unwrap_or_else(|| PathBuf::from("Books")),
            logs_dir: args
                .logs_dir
                .clone()
                .or(file.logs_dir)
                .unwrap_or_else(|| PathBuf::from("Logs")),
            wait: DownloadWait::new(
                Duration::from_secs(download_timeout_secs),
                Duration::from_secs(file.poll_interval_secs.unwrap_or(10)),
            ),
            settle_delay: Duration::from_secs(file.settle_delay_secs.unwrap_or(4)),
            webdriver_url: args
                .webdriver_url
                .clone()
                .or(file.webdriver_url)
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            headless: file.headless.unwrap_or(true),
            llm_model: file
                .llm_model
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: file
                .llm_base_url
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            mirror_label: file
                .mirror_label
                .unwrap_or_else(|| DEFAULT_MIRROR_LABEL.to_string()),
            converter: file
                .converter
                .unwrap_or_else(|| DEFAULT_CONVERTER.to_string()),
            mail_subject: file.mail_subject,
            timeouts: HttpTimeouts {
                connect_secs: file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                read_secs: file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            },
        };
        Ok(settings)
    }
}

/// Secrets and addresses read from the environment (optionally via `.env`).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub sender_email: Option<String>,
    pub kindle_email: Option<String>,
    pub zlibrary_email: Option<String>,
    pub zlibrary_password: Option<String>,
    pub zlibrary_user_id: Option<String>,
    pub zlibrary_user_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("sender_email", &self.sender_email)
            .field("kindle_email", &self.kindle_email)
            .field("zlibrary_email", &self.zlibrary_email)
            .field("zlibrary_password", &secret(&self.zlibrary_password))
            .field("zlibrary_user_id", &self.zlibrary_user_id)
            .field("zlibrary_user_key", &secret(&self.zlibrary_user_key))
            .field("sendgrid_api_key", &secret(&self.sendgrid_api_key))
            .field("openai_api_key", &secret(&self.openai_api_key))
            .finish()
    }
}

/// How the fallback catalog logs in, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackLogin<'a> {
    /// Cached session pair.
    Token { user_id: &'a str, user_key: &'a str },
    /// Account credentials.
    Password { email: &'a str, password: &'a str },
}

impl Credentials {
    /// Reads credentials through `lookup` (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let sender_email = read("SENDER_EMAIL");
        Self {
            zlibrary_email: read("ZLIBRARY_EMAIL").or_else(|| sender_email.clone()),
            sender_email,
            kindle_email: read("KINDLE_EMAIL"),
            zlibrary_password: read("ZLIBRARY_PASSWORD"),
            zlibrary_user_id: read("ZLIBRARY_USER_ID"),
            zlibrary_user_key: read("ZLIBRARY_USER_KEY"),
            sendgrid_api_key: read("SENDGRID_API_KEY"),
            openai_api_key: read("OPENAI_API_KEY"),
        }
    }

    /// Reads credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Preferred fallback login: the cached token pair, else email and password.
    #[must_use]
    pub fn fallback_login(&self) -> Option<FallbackLogin<'_>> {
        if let (Some(user_id), Some(user_key)) = (&self.zlibrary_user_id, &self.zlibrary_user_key) {
            return Some(FallbackLogin::Token { user_id, user_key });
        }
        if let (Some(email), Some(password)) = (&self.zlibrary_email, &self.zlibrary_password) {
            return Some(FallbackLogin::Password { email, password });
        }
        None
    }
}
