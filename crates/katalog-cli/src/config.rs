// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use katalog_app::{ColumnLayout, DEFAULT_COLUMN_WIDTH, DatasetKind, MIN_COLUMN_WIDTH};
use log::LevelFilter;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const APP_NAME: &str = "katalog";
const CONFIG_VERSION: i64 = 1;
const CONFIG_PATH_ENV: &str = "KATALOG_CONFIG_PATH";
const BASE_URL_ENV: &str = "KATALOG_BASE_URL";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_TIMEOUT: &str = "5s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: Server::default(),
            grid: Grid::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grid {
    pub start_table: Option<String>,
    pub default_column_width: Option<u16>,
    pub min_column_width: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub path: Option<String>,
    pub level: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set {CONFIG_PATH_ENV} to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [server], [grid], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate it with --print-example-config",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(timeout) = &self.server.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "server.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(table) = &self.grid.start_table {
            parse_table(table)
                .with_context(|| format!("grid.start_table in {}", path.display()))?;
        }

        if let Some(min) = self.grid.min_column_width
            && min == 0
        {
            bail!(
                "grid.min_column_width in {} must be positive, got 0",
                path.display()
            );
        }

        let min = self.grid.min_column_width.unwrap_or(MIN_COLUMN_WIDTH);
        if let Some(default) = self.grid.default_column_width
            && default < min
        {
            bail!(
                "grid.default_column_width in {} must be at least min_column_width ({min}), got {default}",
                path.display()
            );
        }

        if let Some(level) = &self.log.level {
            parse_level(level).with_context(|| format!("log.level in {}", path.display()))?;
        }

        Ok(())
    }

    /// The file wins, then `KATALOG_BASE_URL`, then the local default.
    pub fn base_url(&self) -> String {
        let configured = self
            .server
            .base_url
            .clone()
            .or_else(|| env::var(BASE_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        configured.trim().trim_end_matches('/').to_owned()
    }

    pub fn timeout(&self) -> Result<Duration> {
        parse_duration(self.server.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn start_table(&self) -> Result<DatasetKind> {
        match &self.grid.start_table {
            Some(table) => parse_table(table),
            None => Ok(DatasetKind::Books),
        }
    }

    pub fn column_layout(&self) -> ColumnLayout {
        ColumnLayout::new(
            self.grid
                .default_column_width
                .unwrap_or(DEFAULT_COLUMN_WIDTH),
            self.grid.min_column_width.unwrap_or(MIN_COLUMN_WIDTH),
        )
    }

    /// Logging is off unless a path is configured.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log
            .path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        parse_level(self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# katalog config\n# Place this file at: {}\n\nversion = 1\n\n[server]\n# Falls back to $KATALOG_BASE_URL, then {}\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[grid]\n# One of: {}\nstart_table = \"books\"\ndefault_column_width = {}\nmin_column_width = {}\n\n[log]\n# Optional. Logging is disabled when no path is set.\n# path = \"/absolute/path/to/katalog.log\"\nlevel = \"{}\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            table_names(),
            DEFAULT_COLUMN_WIDTH,
            MIN_COLUMN_WIDTH,
            DEFAULT_LOG_LEVEL,
        )
    }
}

pub fn parse_table(raw: &str) -> Result<DatasetKind> {
    DatasetKind::parse(raw)
        .ok_or_else(|| anyhow!("unknown table {raw:?}; use one of: {}", table_names()))
}

fn table_names() -> String {
    DatasetKind::ALL
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_level(raw: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(raw.trim()).map_err(|_| {
        anyhow!("invalid log level {raw:?}; use one of: off, error, warn, info, debug, trace")
    })
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
