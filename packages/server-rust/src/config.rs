//! Command-line and environment configuration for the `allsrv` binary.

use std::time::Duration;

use clap::Parser;

use crate::network::NetworkConfig;
use crate::telemetry::LogFormat;

/// Errors found while validating [`ServerArgs`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("basic auth needs both a user and a password")]
    PartialCredentials,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("sqlite dsn must not be blank")]
    BlankDsn,
}

/// Where foos are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageChoice {
    InMemory,
    Sqlite(String),
}

/// allsrv: a small resource-oriented foo service.
#[derive(Debug, Clone, Parser)]
#[command(name = "allsrv", version, about)]
pub struct ServerArgs {
    /// Address to bind.
    #[arg(long, env = "ALLSRV_HOST", default_value = "localhost")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "ALLSRV_PORT", default_value_t = 8091)]
    pub port: u16,

    /// `SQLite` DSN, e.g. `sqlite://allsrv.db`. Unset keeps foos in memory.
    #[arg(long, env = "ALLSRV_SQLITE_DSN")]
    pub sqlite_dsn: Option<String>,

    /// Basic auth user. Auth is off when user and password are both empty.
    #[arg(long, env = "ALLSRV_USER", default_value = "")]
    pub user: String,

    /// Basic auth password.
    #[arg(long, env = "ALLSRV_PASS", default_value = "", hide_env_values = true)]
    pub pass: String,

    /// Per-request deadline in seconds.
    #[arg(long, env = "ALLSRV_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Log output format.
    #[arg(long, env = "ALLSRV_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl ServerArgs {
    /// Checks combinations clap cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user.is_empty() != self.pass.is_empty() {
            return Err(ConfigError::PartialCredentials);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.sqlite_dsn.as_deref().is_some_and(|dsn| dsn.trim().is_empty()) {
            return Err(ConfigError::BlankDsn);
        }
        Ok(())
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    /// The basic auth pair, if auth is enabled.
    #[must_use]
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.user.is_empty() {
            return None;
        }
        Some((self.user.clone(), self.pass.clone()))
    }

    #[must_use]
    pub fn storage(&self) -> StorageChoice {
        match &self.sqlite_dsn {
            Some(dsn) => StorageChoice::Sqlite(dsn.clone()),
            None => StorageChoice::InMemory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerArgs {
        ServerArgs::try_parse_from(std::iter::once("allsrv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&["--host", "localhost"]);
        assert_eq!(args.port, 8091);
        assert_eq!(args.request_timeout_secs, 30);
        assert!(args.validate().is_ok());
        assert!(args.credentials().is_none());

        let net = args.network_config();
        assert_eq!(net.addr(), "localhost:8091");
        assert_eq!(net.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn flags_override() {
        let args = parse(&[
            "--port",
            "9000",
            "--user",
            "admin",
            "--pass",
            "pass",
            "--sqlite-dsn",
            "sqlite://foos.db",
            "--log-format",
            "pretty",
        ]);
        assert_eq!(args.port, 9000);
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert_eq!(
            args.credentials(),
            Some(("admin".to_string(), "pass".to_string()))
        );
        assert_eq!(
            args.storage(),
            StorageChoice::Sqlite("sqlite://foos.db".to_string())
        );
    }

    #[test]
    fn validation_errors() {
        let mut args = parse(&["--user", "admin"]);
        assert_eq!(args.validate(), Err(ConfigError::PartialCredentials));

        args.pass = "pass".to_string();
        args.request_timeout_secs = 0;
        assert_eq!(args.validate(), Err(ConfigError::ZeroTimeout));

        args.request_timeout_secs = 5;
        args.sqlite_dsn = Some("  ".to_string());
        assert_eq!(args.validate(), Err(ConfigError::BlankDsn));
    }
}
