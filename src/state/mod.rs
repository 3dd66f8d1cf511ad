//! Phase state machines for MySQLBackup and MySQLRestore
//!
//! The reconcilers never write a phase directly: they compute the next state
//! by applying an event to the current one, and only persist what the state
//! machine accepts.

pub mod backup;
pub mod restore;

pub use backup::{BackupEvent, BackupState};
pub use restore::{RestoreEvent, RestoreState};

use crate::crd::OperationPhase;
use crate::error::{Error, Result};

/// Reject transitions out of terminal phases and backwards moves.
fn ensure_forward<P: OperationPhase>(kind: &'static str, from: P, to: P) -> Result<()> {
    let forward = to.is_failure() || to.rank() == from.rank() + 1;
    if from.is_terminal() || !forward {
        return Err(Error::InvalidTransition {
            kind,
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}
