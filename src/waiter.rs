//! Bounded polling for operation phases.
//!
//! The reconciling controller runs out of process, so callers (tests, CLIs,
//! other controllers) synchronise with it by polling. [`wait_for_phase`] is a
//! pure function over an injected observation callback and a [`Backoff`]
//! policy: it returns the resource once it is observed in the target phase,
//! fails fast on a terminal phase that can never become the target, and
//! otherwise gives up with a timeout once the step budget is spent.
//!
//! # Example
//!
//! ```ignore
//! use mysql_backup_operator::crd::BackupPhase;
//! use mysql_backup_operator::waiter::{wait_for_phase, Backoff};
//!
//! let backup = wait_for_phase(
//!     &name,
//!     BackupPhase::Complete,
//!     &Backoff::with_duration_secs(10).steps(10),
//!     || api.get(&name),
//! )
//! .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crd::{MySQLBackup, MySQLRestore, OperationPhase};

/// A resource whose progress is expressed as an [`OperationPhase`]
pub trait PhaseObserved {
    type Phase: OperationPhase;

    /// Phase as currently observed
    fn observed_phase(&self) -> Self::Phase;

    /// Detail attached by the controller, reported on failure
    fn observed_message(&self) -> Option<&str> {
        None
    }
}

impl PhaseObserved for MySQLBackup {
    type Phase = crate::crd::BackupPhase;

    fn observed_phase(&self) -> Self::Phase {
        self.phase()
    }

    fn observed_message(&self) -> Option<&str> {
        self.message()
    }
}

impl PhaseObserved for MySQLRestore {
    type Phase = crate::crd::RestorePhase;

    fn observed_phase(&self) -> Self::Phase {
        self.phase()
    }

    fn observed_message(&self) -> Option<&str> {
        self.message()
    }
}

/// Bounded retry schedule.
///
/// `steps` is the maximum number of observations; the delay between two
/// observations starts at `duration`, is multiplied by `factor` after each
/// step and never exceeds `cap`. Up to `jitter * delay` is added at random.
/// Delays saturate at `Duration::MAX`; a non-finite `factor` keeps the delay
/// constant and a non-finite `jitter` disables jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    pub steps: u32,
    pub duration: Duration,
    pub factor: f64,
    pub jitter: f64,
    pub cap: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
            cap: None,
        }
    }
}

impl Backoff {
    /// Constant delay without jitter
    pub fn constant(steps: u32, duration: Duration) -> Self {
        Self {
            steps,
            duration,
            factor: 1.0,
            jitter: 0.0,
            cap: None,
        }
    }

    /// Default step count with a delay of `secs` seconds between observations
    pub fn with_duration_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
            ..Default::default()
        }
    }

    /// Replace the step budget
    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Observations this policy allows; always at least one
    pub fn attempts(&self) -> u32 {
        self.steps.max(1)
    }

    /// Base delays slept between observations, before jitter
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut current = self.duration;
        (1..self.attempts()).map(move |_| {
            let delay = current;
            current = self.advance(current);
            delay
        })
    }

    fn advance(&self, current: Duration) -> Duration {
        let next = if self.factor.is_finite() && self.factor > 1.0 {
            scale(current, self.factor)
        } else {
            current
        };
        match self.cap {
            Some(cap) => next.min(cap),
            None => next,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter.is_finite() || self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay
            .checked_add(scale(delay, extra))
            .unwrap_or(Duration::MAX)
    }
}

/// `delay * factor`, saturating at `Duration::MAX`
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Why a wait ended without reaching the target phase
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WaitError {
    /// The resource reached a failure phase
    #[error("{name} failed in phase {phase}: {}", .message.as_deref().unwrap_or("no detail reported"))]
    Failed {
        name: String,
        phase: String,
        message: Option<String>,
    },

    /// The resource reached a successful terminal phase other than the target
    #[error("{name} reached terminal phase {phase} and can never reach {target}")]
    Unreachable {
        name: String,
        phase: String,
        target: String,
    },

    /// The step budget ran out first
    #[error(
        "timed out waiting for {name} to reach {target} after {attempts} observations (last phase: {})",
        .last_phase.as_deref().unwrap_or("unobserved")
    )]
    Timeout {
        name: String,
        target: String,
        attempts: u32,
        last_phase: Option<String>,
        last_error: Option<String>,
    },
}

impl WaitError {
    /// The operation itself failed; waiting longer will not help
    pub fn is_failure(&self) -> bool {
        matches!(self, WaitError::Failed { .. } | WaitError::Unreachable { .. })
    }

    /// The budget ran out while the operation may still be in progress
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    /// Last phase observed before the wait ended
    pub fn last_phase(&self) -> Option<&str> {
        match self {
            WaitError::Failed { phase, .. } | WaitError::Unreachable { phase, .. } => Some(phase),
            WaitError::Timeout { last_phase, .. } => last_phase.as_deref(),
        }
    }
}

/// Classification of a single observation against a target phase
#[derive(Debug)]
pub enum PhaseObservation<R> {
    /// Observed in the target phase
    Reached(R),
    /// Not there yet; a later observation may succeed
    InProgress(R),
    /// Observed in a failure phase
    Failed(R),
    /// Observed in a successful terminal phase that is not the target
    Unreachable(R),
}

impl<R> PhaseObservation<R> {
    pub fn into_inner(self) -> R {
        match self {
            Self::Reached(r) | Self::InProgress(r) | Self::Failed(r) | Self::Unreachable(r) => r,
        }
    }
}

/// Classify one observation without waiting
pub fn poll_phase<R: PhaseObserved>(resource: R, target: R::Phase) -> PhaseObservation<R> {
    let phase = resource.observed_phase();
    if phase == target {
        PhaseObservation::Reached(resource)
    } else if phase.is_failure() {
        PhaseObservation::Failed(resource)
    } else if phase.is_terminal() {
        PhaseObservation::Unreachable(resource)
    } else {
        PhaseObservation::InProgress(resource)
    }
}

/// Poll `resolve` until the resource is observed in `target`.
///
/// Returns the resource in exactly `target`, or an error. Errors from
/// `resolve` are treated as transient: they consume a step but never end the
/// wait early.
pub async fn wait_for_phase<R, F, Fut, E>(
    name: &str,
    target: R::Phase,
    backoff: &Backoff,
    mut resolve: F,
) -> Result<R, WaitError>
where
    R: PhaseObserved,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Display,
{
    let attempts = backoff.attempts();
    let mut delays = backoff.delays();
    let mut last_phase: Option<String> = None;
    let mut last_error: Option<String> = None;

    for attempt in 1..=attempts {
        match resolve().await {
            Ok(resource) => {
                let phase = resource.observed_phase();
                last_error = None;
                match poll_phase(resource, target) {
                    PhaseObservation::Reached(resource) => {
                        debug!(name = %name, phase = %phase, attempt, "Target phase reached");
                        return Ok(resource);
                    }
                    PhaseObservation::Failed(resource) => {
                        return Err(WaitError::Failed {
                            name: name.to_string(),
                            phase: phase.to_string(),
                            message: resource.observed_message().map(str::to_string),
                        });
                    }
                    PhaseObservation::Unreachable(_) => {
                        return Err(WaitError::Unreachable {
                            name: name.to_string(),
                            phase: phase.to_string(),
                            target: target.to_string(),
                        });
                    }
                    PhaseObservation::InProgress(_) => {
                        debug!(
                            name = %name,
                            phase = %phase,
                            target = %target,
                            attempt,
                            attempts,
                            "Waiting for phase"
                        );
                        last_phase = Some(phase.to_string());
                    }
                }
            }
            Err(e) => {
                warn!(name = %name, attempt, attempts, error = %e, "Observation failed, retrying");
                last_error = Some(e.to_string());
            }
        }

        if let Some(delay) = delays.next() {
            tokio::time::sleep(backoff.jittered(delay)).await;
        }
    }

    Err(WaitError::Timeout {
        name: name.to_string(),
        target: target.to_string(),
        attempts,
        last_phase,
        last_error,
    })
}

/// Retry `condition` until it reports `true` or the budget is spent.
///
/// Errors from `condition` are transient and consume a step.
pub async fn retry<F, Fut, E>(backoff: &Backoff, name: &str, mut condition: F) -> Result<(), WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
{
    let attempts = backoff.attempts();
    let mut delays = backoff.delays();
    let mut last_error: Option<String> = None;

    for attempt in 1..=attempts {
        match condition().await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                debug!(name = %name, attempt, attempts, "Condition not met");
                last_error = None;
            }
            Err(e) => {
                warn!(name = %name, attempt, attempts, error = %e, "Condition check failed, retrying");
                last_error = Some(e.to_string());
            }
        }

        if let Some(delay) = delays.next() {
            tokio::time::sleep(backoff.jittered(delay)).await;
        }
    }

    Err(WaitError::Timeout {
        name: name.to_string(),
        target: "condition".to_string(),
        attempts,
        last_phase: None,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::crd::BackupPhase;

    #[derive(Debug)]
    struct Observed(BackupPhase);

    impl PhaseObserved for Observed {
        type Phase = BackupPhase;

        fn observed_phase(&self) -> BackupPhase {
            self.0
        }

        fn observed_message(&self) -> Option<&str> {
            Some("member db1-0 unreachable")
        }
    }

    #[test]
    fn delays_grow_by_factor_up_to_cap() {
        let backoff = Backoff {
            steps: 5,
            duration: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.0,
            cap: Some(Duration::from_secs(5)),
        };
        let delays: Vec<_> = backoff.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn uncapped_growth_saturates() {
        let backoff = Backoff {
            steps: 80,
            duration: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.0,
            cap: None,
        };
        let delays: Vec<_> = backoff.delays().collect();
        assert_eq!(delays.len(), 79);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays.last(), Some(&Duration::MAX));
    }

    #[test]
    fn non_finite_factor_and_jitter_are_ignored() {
        for factor in [f64::NAN, f64::INFINITY] {
            let backoff = Backoff {
                steps: 4,
                duration: Duration::from_secs(3),
                factor,
                jitter: 0.0,
                cap: None,
            };
            assert!(backoff.delays().all(|d| d == Duration::from_secs(3)));
        }
        for jitter in [f64::NAN, f64::INFINITY] {
            let backoff = Backoff {
                jitter,
                ..Backoff::with_duration_secs(10)
            };
            assert_eq!(backoff.jittered(Duration::from_secs(10)), Duration::from_secs(10));
        }
    }

    #[test]
    fn jitter_on_saturated_delay_does_not_overflow() {
        let backoff = Backoff {
            jitter: 0.5,
            ..Backoff::with_duration_secs(10)
        };
        assert_eq!(backoff.jittered(Duration::MAX), Duration::MAX);
    }

    #[test]
    fn zero_steps_still_observes_once() {
        let backoff = Backoff::constant(0, Duration::from_secs(1));
        assert_eq!(backoff.attempts(), 1);
        assert_eq!(backoff.delays().count(), 0);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = Backoff {
            jitter: 0.5,
            ..Backoff::with_duration_secs(10)
        };
        for _ in 0..100 {
            let d = backoff.jittered(Duration::from_secs(10));
            assert!(d >= Duration::from_secs(10));
            assert!(d <= Duration::from_secs(15));
        }
    }

    #[test]
    fn poll_phase_classifies() {
        assert!(matches!(
            poll_phase(Observed(BackupPhase::Running), BackupPhase::Complete),
            PhaseObservation::InProgress(_)
        ));
        assert!(matches!(
            poll_phase(Observed(BackupPhase::Failed), BackupPhase::Complete),
            PhaseObservation::Failed(_)
        ));
        assert!(matches!(
            poll_phase(Observed(BackupPhase::Complete), BackupPhase::Running),
            PhaseObservation::Unreachable(_)
        ));
        assert!(matches!(
            poll_phase(Observed(BackupPhase::Failed), BackupPhase::Failed),
            PhaseObservation::Reached(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_resource_once_target_reached() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = wait_for_phase(
            "b1",
            BackupPhase::Complete,
            &Backoff::constant(10, Duration::from_secs(10)),
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    let phase = match n {
                        0 => BackupPhase::New,
                        1 => BackupPhase::Scheduled,
                        2 => BackupPhase::Running,
                        _ => BackupPhase::Complete,
                    };
                    Ok::<_, String>(Observed(phase))
                }
            },
        )
        .await;

        assert_eq!(result.unwrap().0, BackupPhase::Complete);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exact_step_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = tokio::time::Instant::now();
        let err = wait_for_phase(
            "b1",
            BackupPhase::Complete,
            &Backoff::constant(3, Duration::from_secs(10)),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(Observed(BackupPhase::Running)) }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_timeout());
        assert_eq!(err.last_phase(), Some("Running"));
        // Two sleeps between three observations, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn uncapped_exponential_policy_still_waits() {
        let backoff = Backoff {
            steps: 80,
            duration: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.1,
            cap: None,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = wait_for_phase("b1", BackupPhase::Complete, &backoff, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                let phase = if n < 5 {
                    BackupPhase::Running
                } else {
                    BackupPhase::Complete
                };
                Ok::<_, String>(Observed(phase))
            }
        })
        .await;

        assert_eq!(result.unwrap().0, BackupPhase::Complete);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_phase_short_circuits() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let err = wait_for_phase(
            "b1",
            BackupPhase::Complete,
            &Backoff::constant(10, Duration::from_secs(10)),
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    let phase = if n == 0 {
                        BackupPhase::Scheduled
                    } else {
                        BackupPhase::Failed
                    };
                    Ok::<_, String>(Observed(phase))
                }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.is_failure());
        assert!(err.to_string().contains("member db1-0 unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_success_other_than_target_is_unreachable() {
        let err = wait_for_phase(
            "b1",
            BackupPhase::Running,
            &Backoff::constant(5, Duration::from_secs(1)),
            || async { Ok::<_, String>(Observed(BackupPhase::Complete)) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WaitError::Unreachable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_consume_budget_without_failing() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = wait_for_phase(
            "b1",
            BackupPhase::Complete,
            &Backoff::constant(3, Duration::from_secs(1)),
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("connection refused".to_string())
                    } else {
                        Ok(Observed(BackupPhase::Complete))
                    }
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_by_transient_errors_reports_last_error() {
        let err = wait_for_phase(
            "b1",
            BackupPhase::Complete,
            &Backoff::constant(2, Duration::from_secs(1)),
            || async { Err::<Observed, _>("connection refused") },
        )
        .await
        .unwrap_err();

        match err {
            WaitError::Timeout {
                attempts,
                last_phase,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 2);
                assert!(last_phase.is_none());
                assert_eq!(last_error.as_deref(), Some("connection refused"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_condition_holds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry(&Backoff::default(), "password", move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err("not found"),
                    1 => Ok(false),
                    _ => Ok(true),
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_budget() {
        let result = retry(&Backoff::default(), "password", || async {
            Ok::<_, String>(false)
        })
        .await;

        assert!(result.unwrap_err().is_timeout());
    }
}
