//! Operator configuration read from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::CommandSpec;
use crate::provenance::ProvenanceStamper;
use crate::waiter::Backoff;

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default limit on a single backup or restore execution
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 3600;

/// Default delay between phase observations
pub const DEFAULT_WAIT_INTERVAL_SECS: u64 = 10;

/// Default observation budget when waiting for a backup
pub const DEFAULT_BACKUP_WAIT_STEPS: u32 = 10;

/// Default observation budget when waiting for a restore
pub const DEFAULT_RESTORE_WAIT_STEPS: u32 = 24;

const DEFAULT_BACKUP_COMMAND: &str = "/usr/local/bin/mysql-backup-agent backup";
const DEFAULT_RESTORE_COMMAND: &str = "/usr/local/bin/mysql-backup-agent restore";

/// How long callers wait for each operation kind
#[derive(Clone, Debug, PartialEq)]
pub struct WaitPolicy {
    pub backup: Backoff,
    pub restore: Backoff,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            backup: Backoff::with_duration_secs(DEFAULT_WAIT_INTERVAL_SECS)
                .steps(DEFAULT_BACKUP_WAIT_STEPS),
            restore: Backoff::with_duration_secs(DEFAULT_WAIT_INTERVAL_SECS)
                .steps(DEFAULT_RESTORE_WAIT_STEPS),
        }
    }
}

impl WaitPolicy {
    /// Read `MYSQL_BACKUP_WAIT_STEPS`, `MYSQL_RESTORE_WAIT_STEPS` and
    /// `MYSQL_WAIT_INTERVAL_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let interval = parse_var(&lookup, "MYSQL_WAIT_INTERVAL_SECS", DEFAULT_WAIT_INTERVAL_SECS)?;
        let backup_steps = parse_var(&lookup, "MYSQL_BACKUP_WAIT_STEPS", DEFAULT_BACKUP_WAIT_STEPS)?;
        let restore_steps =
            parse_var(&lookup, "MYSQL_RESTORE_WAIT_STEPS", DEFAULT_RESTORE_WAIT_STEPS)?;
        if backup_steps == 0 || restore_steps == 0 {
            return Err(Error::config("wait steps must be greater than 0"));
        }

        Ok(Self {
            backup: Backoff::with_duration_secs(interval).steps(backup_steps),
            restore: Backoff::with_duration_secs(interval).steps(restore_steps),
        })
    }
}

/// Operator runtime configuration
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub metrics_port: u16,
    pub provenance: ProvenanceStamper,
    /// A Running operation older than this is considered interrupted
    pub execution_timeout: Duration,
    pub backup_command: CommandSpec,
    pub restore_command: CommandSpec,
    pub wait_policy: WaitPolicy,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provenance = match lookup("MYSQL_OPERATOR_VERSION") {
            Some(version) => ProvenanceStamper::new(version)?,
            None => ProvenanceStamper::current(),
        };
        let execution_timeout = parse_var(
            &lookup,
            "MYSQL_OPERATOR_EXECUTION_TIMEOUT_SECS",
            DEFAULT_EXECUTION_TIMEOUT_SECS,
        )?;
        let backup_command = lookup("MYSQL_OPERATOR_BACKUP_COMMAND")
            .unwrap_or_else(|| DEFAULT_BACKUP_COMMAND.to_string());
        let restore_command = lookup("MYSQL_OPERATOR_RESTORE_COMMAND")
            .unwrap_or_else(|| DEFAULT_RESTORE_COMMAND.to_string());

        Ok(Self {
            metrics_port: parse_var(&lookup, "MYSQL_OPERATOR_METRICS_PORT", DEFAULT_METRICS_PORT)?,
            provenance,
            execution_timeout: Duration::from_secs(execution_timeout),
            backup_command: CommandSpec::parse(&backup_command)?,
            restore_command: CommandSpec::parse(&restore_command)?,
            wait_policy: WaitPolicy::from_lookup(&lookup)?,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
