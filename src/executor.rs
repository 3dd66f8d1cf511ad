//! Execution of backup and restore work
//!
//! Dumping, uploading and loading data are handled outside the operator. The
//! operator hands each request to an [`OperationExecutor`] and only keeps the
//! opaque artifact location it gets back.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Backup work handed to an executor
#[derive(Clone, Debug, PartialEq)]
pub struct BackupRequest {
    pub namespace: String,
    pub name: String,
    pub cluster: String,
    /// Member the backup is pinned to
    pub member: String,
    pub databases: Vec<String>,
    pub credentials_secret: String,
}

/// Restore work handed to an executor
#[derive(Clone, Debug, PartialEq)]
pub struct RestoreRequest {
    pub namespace: String,
    pub name: String,
    pub cluster: String,
    pub member: String,
    pub backup: String,
    /// Artifact produced by the source backup
    pub location: String,
}

/// Performs the data-moving part of an operation
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Run a backup and return the artifact location
    async fn backup(&self, request: &BackupRequest) -> Result<String>;

    /// Replace the target databases with the artifact's content
    async fn restore(&self, request: &RestoreRequest) -> Result<()>;
}

/// A program and its arguments
#[derive(Clone, Debug, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parse a whitespace separated command line
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::config("command must not be empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Runs external commands, passing the request through environment variables.
///
/// The backup command must print the artifact location as its last non-empty
/// line on stdout.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    backup: CommandSpec,
    restore: CommandSpec,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(backup: CommandSpec, restore: CommandSpec, timeout: Duration) -> Self {
        Self {
            backup,
            restore,
            timeout,
        }
    }

    async fn run(&self, spec: &CommandSpec, env: Vec<(&str, String)>, description: &str) -> Result<String> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(env).kill_on_drop(true);

        info!(program = %spec.program, "{}", description);
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                warn!("{} timed out after {:?}", description, self.timeout);
                Error::execution(format!("{} timed out after {:?}", description, self.timeout))
            })?
            .map_err(|e| Error::execution(format!("failed to execute {}: {}", spec.program, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "{} failed", description);
            Err(Error::execution(format!(
                "{} exited with {}: {}",
                description,
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl OperationExecutor for CommandExecutor {
    async fn backup(&self, request: &BackupRequest) -> Result<String> {
        let env = vec![
            ("MYSQL_BACKUP_NAME", request.name.clone()),
            ("MYSQL_NAMESPACE", request.namespace.clone()),
            ("MYSQL_CLUSTER", request.cluster.clone()),
            ("MYSQL_MEMBER", request.member.clone()),
            ("MYSQL_DATABASES", request.databases.join(",")),
            ("MYSQL_CREDENTIALS_SECRET", request.credentials_secret.clone()),
        ];
        let stdout = self.run(&self.backup, env, "backup command").await?;

        stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| Error::execution("backup command did not report an artifact location"))
    }

    async fn restore(&self, request: &RestoreRequest) -> Result<()> {
        let env = vec![
            ("MYSQL_RESTORE_NAME", request.name.clone()),
            ("MYSQL_NAMESPACE", request.namespace.clone()),
            ("MYSQL_CLUSTER", request.cluster.clone()),
            ("MYSQL_MEMBER", request.member.clone()),
            ("MYSQL_BACKUP_NAME", request.backup.clone()),
            ("MYSQL_BACKUP_LOCATION", request.location.clone()),
        ];
        self.run(&self.restore, env, "restore command").await?;
        Ok(())
    }
}
