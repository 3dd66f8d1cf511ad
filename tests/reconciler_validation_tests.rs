//! Integration tests for reconciler validation logic
//!
//! These tests verify that the validation functions for each CRD type
//! correctly accept valid specs and reject invalid ones.

use mysql_backup_operator::crd::{new_backup, new_restore, MySQLBackup, MySQLRestore};
use mysql_backup_operator::reconcilers::{backup, restore};
use mysql_backup_operator::Error;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Test Helpers
// ============================================================================

fn valid_backup() -> MySQLBackup {
    new_backup("db1", "db1-backup-", "s3-credentials", &["employees"])
}

fn valid_restore() -> MySQLRestore {
    new_restore("db1", "db1-backup-x7k2p", "db1-restore-")
}

fn assert_validation_error(result: mysql_backup_operator::Result<()>, needle: &str) {
    match result {
        Err(Error::Validation(msg)) => assert!(
            msg.contains(needle),
            "expected message containing '{}', got '{}'",
            needle,
            msg
        ),
        other => panic!("expected validation error, got {:?}", other),
    }
}

// ============================================================================
// Backup Validation Tests
// ============================================================================

#[test]
fn test_backup_valid_spec() {
    assert_ok!(backup::validate(&valid_backup()));
}

#[test]
fn test_backup_multiple_databases() {
    let b = new_backup("db1", "b-", "creds", &["employees", "payroll", "audit"]);
    assert_ok!(backup::validate(&b));
}

#[test]
fn test_backup_missing_cluster() {
    let mut b = valid_backup();
    b.spec.cluster.name = String::new();
    assert_validation_error(backup::validate(&b), "cluster");
}

#[test]
fn test_backup_no_databases() {
    let b = new_backup("db1", "b-", "creds", &[]);
    assert_validation_error(backup::validate(&b), "At least one database");
}

#[test]
fn test_backup_blank_database_name() {
    let b = new_backup("db1", "b-", "creds", &["employees", "  "]);
    assert_validation_error(backup::validate(&b), "must not be empty");
}

#[test]
fn test_backup_duplicate_database() {
    let b = new_backup("db1", "b-", "creds", &["employees", "employees"]);
    assert_validation_error(backup::validate(&b), "more than once");
}

#[test]
fn test_backup_missing_credentials() {
    let b = new_backup("db1", "b-", "", &["employees"]);
    assert_validation_error(backup::validate(&b), "credentials");
}

#[test]
fn test_backup_preassigned_agent_is_valid() {
    let mut b = valid_backup();
    b.spec.agent_scheduled = Some("db1-0".to_string());
    assert_ok!(backup::validate(&b));
}

// ============================================================================
// Restore Validation Tests
// ============================================================================

#[test]
fn test_restore_valid_spec() {
    assert_ok!(restore::validate(&valid_restore()));
}

#[test]
fn test_restore_missing_cluster() {
    let r = new_restore("", "db1-backup-x7k2p", "r-");
    assert_validation_error(restore::validate(&r), "cluster");
}

#[test]
fn test_restore_missing_backup_ref() {
    let r = new_restore("db1", "", "r-");
    assert_validation_error(restore::validate(&r), "backup");
}

#[test]
fn test_validation_errors_are_permanent() {
    let r = new_restore("db1", "", "r-");
    let err = assert_err!(restore::validate(&r));
    assert!(err.is_permanent());
}
