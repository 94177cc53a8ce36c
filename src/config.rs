//! Process configuration: command-line flags with environment fallbacks.

pub mod duration;

use std::time::Duration;

use clap::{Args, Parser};
use flexibee_source::FlexibeeConfig;

use crate::sync::EngineConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "flexibee-sync", version, about = "Mirror Flexibee evidences into PostgreSQL")]
pub struct Config {
    #[command(flatten)]
    pub flexibee: FlexibeeOpts,

    #[command(flatten)]
    pub database: DatabaseOpts,

    #[command(flatten)]
    pub sync: SyncOpts,

    #[command(flatten)]
    pub cleanup: CleanupOpts,

    #[command(flatten)]
    pub logging: LogOpts,
}

#[derive(Args, Debug, Clone)]
pub struct FlexibeeOpts {
    /// Flexibee server URL
    #[arg(long, env = "FLEXIBEE_URL")]
    pub flexibee_url: Option<String>,

    /// Flexibee company identifier
    #[arg(long, env = "FLEXIBEE_COMPANY")]
    pub flexibee_company: Option<String>,

    /// Flexibee username
    #[arg(long, env = "FLEXIBEE_USERNAME")]
    pub flexibee_username: Option<String>,

    /// Flexibee password
    #[arg(long, env = "FLEXIBEE_PASSWORD", hide_env_values = true)]
    pub flexibee_password: Option<String>,

    /// Per-request HTTP timeout
    #[arg(long, env = "HTTP_TIMEOUT", default_value = "30s")]
    pub http_timeout: String,
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseOpts {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncOpts {
    /// Time between sync passes
    #[arg(long, env = "SYNC_INTERVAL", default_value = "5m")]
    pub sync_interval: String,

    /// Records fetched per page
    #[arg(long, env = "SYNC_BATCH_SIZE", default_value_t = 100, allow_negative_numbers = true)]
    pub sync_batch_size: i64,

    /// Entities synced at the same time
    #[arg(long, env = "SYNC_CONCURRENCY", default_value_t = 4, allow_negative_numbers = true)]
    pub sync_concurrency: i64,
}

#[derive(Args, Debug, Clone)]
pub struct CleanupOpts {
    /// Days of history to keep; 0 disables cleanup
    #[arg(long, env = "RETENTION_DAYS", default_value_t = 365, allow_negative_numbers = true)]
    pub retention_days: i64,

    /// Time between cleanup passes
    #[arg(long, env = "CLEANUP_INTERVAL", default_value = "24h")]
    pub cleanup_interval: String,

    /// Rows deleted per round-trip
    #[arg(long, env = "CLEANUP_BATCH_SIZE", default_value_t = 1000, allow_negative_numbers = true)]
    pub cleanup_batch_size: i64,
}

#[derive(Args, Debug, Clone)]
pub struct LogOpts {
    /// Log level: debug, info, warn or error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

/// Every validation failure found in a [`Config`].
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration{}", .0.iter().map(|p| format!("\n  - {p}")).collect::<String>())]
pub struct ConfigError(pub Vec<String>);

/// Validated settings, ready to wire up the process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub flexibee: FlexibeeConfig,
    pub database_url: String,
    pub engine: EngineConfig,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Check every option and collect all problems before failing.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut errors = Vec::new();

        let mut required = |value: &Option<String>, name: &str| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    errors.push(format!("{name} is required"));
                    String::new()
                }
            }
        };
        let base_url = required(&self.flexibee.flexibee_url, "FLEXIBEE_URL");
        let company = required(&self.flexibee.flexibee_company, "FLEXIBEE_COMPANY");
        let username = required(&self.flexibee.flexibee_username, "FLEXIBEE_USERNAME");
        let password = required(&self.flexibee.flexibee_password, "FLEXIBEE_PASSWORD");
        let database_url = required(&self.database.database_url, "DATABASE_URL");

        let mut duration = |value: &str, name: &str| -> Duration {
            duration::parse_duration(value).unwrap_or_else(|e| {
                errors.push(format!("{name}: {e}"));
                Duration::ZERO
            })
        };
        let timeout = duration(&self.flexibee.http_timeout, "HTTP_TIMEOUT");
        let sync_interval = duration(&self.sync.sync_interval, "SYNC_INTERVAL");
        let cleanup_interval = duration(&self.cleanup.cleanup_interval, "CLEANUP_INTERVAL");

        let mut positive = |value: i64, name: &str| -> u64 {
            if value > 0 {
                value as u64
            } else {
                errors.push(format!("{name} must be greater than 0, got {value}"));
                0
            }
        };
        let batch_size = positive(self.sync.sync_batch_size, "SYNC_BATCH_SIZE");
        let concurrency = positive(self.sync.sync_concurrency, "SYNC_CONCURRENCY");
        let cleanup_batch_size = positive(self.cleanup.cleanup_batch_size, "CLEANUP_BATCH_SIZE");

        let retention_days = match u32::try_from(self.cleanup.retention_days) {
            Ok(days) => days,
            Err(_) => {
                errors.push(format!(
                    "RETENTION_DAYS must be 0 or greater, got {}",
                    self.cleanup.retention_days
                ));
                0
            }
        };

        let log_level = self.logging.log_level.trim().to_ascii_lowercase();
        if !matches!(log_level.as_str(), "debug" | "info" | "warn" | "error") {
            errors.push(format!(
                "LOG_LEVEL must be one of debug, info, warn, error; got '{}'",
                self.logging.log_level
            ));
        }
        let log_format = match self.logging.log_format.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => {
                errors.push(format!("LOG_FORMAT must be json or text; got '{other}'"));
                LogFormat::Json
            }
        };

        if !errors.is_empty() {
            return Err(ConfigError(errors));
        }

        Ok(Settings {
            flexibee: FlexibeeConfig {
                base_url,
                company,
                username,
                password,
                timeout,
            },
            database_url,
            engine: EngineConfig {
                sync_interval,
                batch_size: u32::try_from(batch_size).unwrap_or(u32::MAX),
                concurrency: usize::try_from(concurrency).unwrap_or(usize::MAX),
                retention_days,
                cleanup_interval,
                cleanup_batch_size,
            },
            log_level,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["flexibee-sync"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    const REQUIRED: &[&str] = &[
        "--flexibee-url",
        "https://demo.flexibee.eu",
        "--flexibee-company",
        "demo",
        "--flexibee-username",
        "winstrom",
        "--flexibee-password",
        "winstrom",
        "--database-url",
        "postgres://localhost/metabase",
    ];

    #[test]
    fn test_defaults() {
        let settings = parse(REQUIRED).validate().unwrap();

        assert_eq!(settings.engine.sync_interval, Duration::from_secs(300));
        assert_eq!(settings.engine.batch_size, 100);
        assert_eq!(settings.engine.concurrency, 4);
        assert_eq!(settings.engine.retention_days, 365);
        assert_eq!(settings.engine.cleanup_interval, Duration::from_secs(86_400));
        assert_eq!(settings.engine.cleanup_batch_size, 1000);
        assert_eq!(settings.flexibee.timeout, Duration::from_secs(30));
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let mut args = REQUIRED.to_vec();
        args.extend_from_slice(&[
            "--sync-interval",
            "30s",
            "--retention-days",
            "0",
            "--log-format",
            "text",
        ]);
        let settings = parse(&args).validate().unwrap();

        assert_eq!(settings.engine.sync_interval, Duration::from_secs(30));
        assert_eq!(settings.engine.retention_days, 0);
        assert_eq!(settings.log_format, LogFormat::Text);
    }

    #[test]
    fn test_collects_every_problem() {
        let mut args = REQUIRED[2..].to_vec();
        args.extend_from_slice(&[
            "--sync-interval",
            "soon",
            "--sync-batch-size",
            "0",
            "--sync-concurrency",
            "-2",
            "--retention-days",
            "-1",
            "--log-level",
            "trace",
        ]);
        let err = parse(&args).validate().unwrap_err();

        assert_eq!(err.0.len(), 6, "{err}");
        let message = err.to_string();
        assert!(message.contains("FLEXIBEE_URL is required"));
        assert!(message.contains("SYNC_INTERVAL"));
        assert!(message.contains("SYNC_BATCH_SIZE"));
        assert!(message.contains("SYNC_CONCURRENCY"));
        assert!(message.contains("RETENTION_DAYS"));
        assert!(message.contains("LOG_LEVEL"));
    }
}
