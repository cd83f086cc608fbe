//! Delayed re-invocation of state operations.
//!
//! Every scheduled task re-checks the current state before acting, so a task
//! may be delivered late, twice, or after a player already caused the same
//! transition. Nothing is ever cancelled.

use crate::state::AppState;
use crate::types::{GameId, GameStage, RoundId, RoundStage, SubmissionId, UserId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A follow-up operation to run later
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledTask {
    RoundProgress {
        round_id: RoundId,
        from_stage: RoundStage,
    },
    GameProgress {
        game_id: GameId,
        /// The host the fallback acts on behalf of
        host_id: UserId,
        from_stage: GameStage,
    },
    PublicGameProgress {
        from_stage: RoundStage,
    },
    GenerateImage {
        submission_id: SubmissionId,
    },
    SubmissionTimeout {
        submission_id: SubmissionId,
    },
}

/// Durable-delay contract: run `task` no earlier than `delay` from now, at least once
pub trait Scheduler: Send + Sync {
    fn run_after(&self, delay: Duration, task: ScheduledTask);
}

#[derive(Debug)]
pub struct ScheduledJob {
    pub delay: Duration,
    pub task: ScheduledTask,
}

/// Hands jobs to [`spawn_task_runner`], which sleeps and dispatches them on tokio
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<ScheduledJob>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Scheduler for TokioScheduler {
    fn run_after(&self, delay: Duration, task: ScheduledTask) {
        if self.tx.send(ScheduledJob { delay, task }).is_err() {
            tracing::error!("Task runner is gone, dropping scheduled task");
        }
    }
}

/// Spawn the background loop that executes scheduled jobs
pub fn spawn_task_runner(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<ScheduledJob>) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(job.delay).await;
                tracing::debug!("Running scheduled task {:?}", job.task);
                if let Err(e) = state.run_scheduled(job.task.clone()).await {
                    tracing::error!("Scheduled task {:?} failed: {}", job.task, e);
                }
            });
        }
        tracing::info!("Task runner stopped");
    });
}

/// Queues jobs without running them; the owner decides when they fire
#[derive(Debug, Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<ScheduledJob>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything scheduled so far, in scheduling order
    pub fn take(&self) -> Vec<ScheduledJob> {
        match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        match self.pending.lock() {
            Ok(pending) => pending.iter().map(|job| job.task.clone()).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|job| job.task.clone())
                .collect(),
        }
    }
}

impl Scheduler for ManualScheduler {
    fn run_after(&self, delay: Duration, task: ScheduledTask) {
        match self.pending.lock() {
            Ok(mut pending) => pending.push(ScheduledJob { delay, task }),
            Err(poisoned) => poisoned.into_inner().push(ScheduledJob { delay, task }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_scheduler_queues_in_order() {
        let scheduler = ManualScheduler::new();
        scheduler.run_after(
            Duration::from_secs(1),
            ScheduledTask::PublicGameProgress {
                from_stage: RoundStage::Guess,
            },
        );
        scheduler.run_after(
            Duration::ZERO,
            ScheduledTask::GenerateImage {
                submission_id: "s1".to_string(),
            },
        );

        assert_eq!(scheduler.tasks().len(), 2);
        let jobs = scheduler.take();
        assert_eq!(jobs[0].delay, Duration::from_secs(1));
        assert!(matches!(jobs[1].task, ScheduledTask::GenerateImage { .. }));
        assert!(scheduler.take().is_empty());
    }

    #[tokio::test]
    async fn test_tokio_scheduler_forwards_jobs() {
        let (scheduler, mut rx) = TokioScheduler::new();
        scheduler.run_after(
            Duration::from_millis(5),
            ScheduledTask::SubmissionTimeout {
                submission_id: "s1".to_string(),
            },
        );
        let job = rx.recv().await.unwrap();
        assert_eq!(job.delay, Duration::from_millis(5));
    }
}
