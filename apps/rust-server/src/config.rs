// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, default values and the typed [`AppConfig`]
//! loaded once at startup. Invalid values fail startup with a
//! [`ConfigError`] naming the variable.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for stored messages | `./data` |
//! | `STORAGE_BACKEND` | `local` (single JSON file) or `records` (redb) | `local` |
//! | `SENDER` | `simulated`, `kakao` or `relay` | `simulated` |
//! | `KAKAO_ACCESS_TOKEN` | Bearer token for the KakaoTalk memo API | Unset |
//! | `KAKAO_API_BASE_URL` | KakaoTalk API base URL | `https://kapi.kakao.com` |
//! | `KAKAO_LINK_URL` | Link attached to sent memos | `https://developers.kakao.com` |
//! | `RELAY_BASE_URL` | Relay backend base URL | `http://localhost:3000/api` |
//! | `POLL_INTERVAL_SECS` | Seconds between dispatcher sweeps | `5` |
//! | `SEND_TIMEOUT_SECS` | Upper bound on one delivery attempt | `15` |
//! | `SIMULATED_SEND_DELAY_MS` | Artificial latency of the simulated sender | `0` |
//! | `SCHEDULE_UTC_OFFSET` | Offset used to read and display schedules | `+09:00` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::dispatcher::{DispatcherConfig, DEFAULT_POLL_INTERVAL, DEFAULT_SEND_TIMEOUT};
use crate::providers::kakao::{DEFAULT_API_BASE_URL, DEFAULT_LINK_URL};
use crate::providers::relay::DEFAULT_RELAY_BASE_URL;
use crate::schedule::{default_offset, parse_utc_offset};
use crate::storage::paths::DATA_ROOT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// Both storage backends keep their files directly under this directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";
pub const SENDER_ENV: &str = "SENDER";

/// Initial KakaoTalk bearer token. Can be replaced at runtime through
/// `PUT /v1/settings/kakao-token`; runtime changes are not written back.
pub const KAKAO_ACCESS_TOKEN_ENV: &str = "KAKAO_ACCESS_TOKEN";

pub const KAKAO_API_BASE_URL_ENV: &str = "KAKAO_API_BASE_URL";
pub const KAKAO_LINK_URL_ENV: &str = "KAKAO_LINK_URL";
pub const RELAY_BASE_URL_ENV: &str = "RELAY_BASE_URL";
pub const POLL_INTERVAL_SECS_ENV: &str = "POLL_INTERVAL_SECS";
pub const SEND_TIMEOUT_SECS_ENV: &str = "SEND_TIMEOUT_SECS";
pub const SIMULATED_SEND_DELAY_MS_ENV: &str = "SIMULATED_SEND_DELAY_MS";
pub const SCHEDULE_UTC_OFFSET_ENV: &str = "SCHEDULE_UTC_OFFSET";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Local,
    Records,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "records" => Ok(Self::Records),
            _ => Err("expected `local` or `records`".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderKind {
    #[default]
    Simulated,
    Kakao,
    Relay,
}

impl FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "kakao" => Ok(Self::Kakao),
            "relay" => Ok(Self::Relay),
            _ => Err("expected `simulated`, `kakao` or `relay`".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err("expected `pretty` or `json`".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    pub sender: SenderKind,
    pub kakao_access_token: Option<String>,
    pub kakao_api_base_url: String,
    pub kakao_link_url: String,
    pub relay_base_url: String,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
    pub simulated_send_delay: Duration,
    pub utc_offset: FixedOffset,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DATA_ROOT),
            storage_backend: StorageBackend::default(),
            sender: SenderKind::default(),
            kakao_access_token: None,
            kakao_api_base_url: DEFAULT_API_BASE_URL.to_string(),
            kakao_link_url: DEFAULT_LINK_URL.to_string(),
            relay_base_url: DEFAULT_RELAY_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            simulated_send_delay: Duration::ZERO,
            utc_offset: default_offset(),
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names. Empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let host = match get(HOST_ENV) {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid(HOST_ENV, &raw, format!("{e}")))?,
            None => defaults.host,
        };

        let utc_offset = match get(SCHEDULE_UTC_OFFSET_ENV) {
            Some(raw) => parse_utc_offset(&raw).ok_or_else(|| {
                ConfigError::invalid(SCHEDULE_UTC_OFFSET_ENV, &raw, "expected `+HH:MM` or `Z`")
            })?,
            None => defaults.utc_offset,
        };

        let poll_interval = Duration::from_secs(parse_or(
            get(POLL_INTERVAL_SECS_ENV),
            POLL_INTERVAL_SECS_ENV,
            defaults.poll_interval.as_secs(),
        )?);
        if poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                POLL_INTERVAL_SECS_ENV,
                "0",
                "must be at least 1",
            ));
        }

        let send_timeout = Duration::from_secs(parse_or(
            get(SEND_TIMEOUT_SECS_ENV),
            SEND_TIMEOUT_SECS_ENV,
            defaults.send_timeout.as_secs(),
        )?);
        if send_timeout.is_zero() {
            return Err(ConfigError::invalid(
                SEND_TIMEOUT_SECS_ENV,
                "0",
                "must be at least 1",
            ));
        }

        Ok(Self {
            host,
            port: parse_or(get(PORT_ENV), PORT_ENV, defaults.port)?,
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            storage_backend: parse_or(
                get(STORAGE_BACKEND_ENV),
                STORAGE_BACKEND_ENV,
                defaults.storage_backend,
            )?,
            sender: parse_or(get(SENDER_ENV), SENDER_ENV, defaults.sender)?,
            kakao_access_token: get(KAKAO_ACCESS_TOKEN_ENV),
            kakao_api_base_url: base_url(
                get(KAKAO_API_BASE_URL_ENV),
                KAKAO_API_BASE_URL_ENV,
                defaults.kakao_api_base_url,
            )?,
            kakao_link_url: base_url(
                get(KAKAO_LINK_URL_ENV),
                KAKAO_LINK_URL_ENV,
                defaults.kakao_link_url,
            )?,
            relay_base_url: base_url(
                get(RELAY_BASE_URL_ENV),
                RELAY_BASE_URL_ENV,
                defaults.relay_base_url,
            )?,
            poll_interval,
            send_timeout,
            simulated_send_delay: Duration::from_millis(parse_or(
                get(SIMULATED_SEND_DELAY_MS_ENV),
                SIMULATED_SEND_DELAY_MS_ENV,
                0,
            )?),
            utc_offset,
            log_format: parse_or(get(LOG_FORMAT_ENV), LOG_FORMAT_ENV, defaults.log_format)?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: self.poll_interval,
            send_timeout: self.send_timeout,
        }
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, &raw, e.to_string())),
        None => Ok(default),
    }
}

/// Validate an http(s) URL; keep the original text.
fn base_url(raw: Option<String>, name: &'static str, default: String) -> Result<String, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let parsed = url::Url::parse(&raw).map_err(|e| ConfigError::invalid(name, &raw, e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(name, &raw, "scheme must be http or https"));
    }
    Ok(raw)
}
