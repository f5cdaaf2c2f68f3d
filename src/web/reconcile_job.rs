// Background reconciliation job: recomputes denormalized counters from the
// relation rows, periodically and on demand via POST /api/reconcile.
//
// Only one pass runs at a time; POST /api/reconcile returns 409 if one is
// already active.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::counters::CounterReconciler;

/// Live status of the reconciliation job, exposed via GET /api/status.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStatus {
    /// True while a pass is in progress.
    pub running: bool,
    /// ISO 8601 timestamp of when the current/last pass started.
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Counters corrected by the last completed pass.
    pub last_corrected: usize,
    pub total_runs: u64,
    /// Error message from the last pass, if it failed.
    pub last_error: Option<String>,
}

/// Mark the job as running. Returns false if a pass is already active.
pub async fn try_start(status: &RwLock<ReconcileStatus>) -> bool {
    let mut s = status.write().await;
    if s.running {
        return false;
    }
    s.running = true;
    s.started_at = Some(Utc::now().to_rfc3339());
    s.last_error = None;
    true
}

/// Run one pass. The caller must have claimed the job with `try_start`.
pub async fn run_pass(counters: &CounterReconciler, status: &RwLock<ReconcileStatus>) {
    let result = counters.reconcile().await;

    let mut s = status.write().await;
    s.running = false;
    s.finished_at = Some(Utc::now().to_rfc3339());
    s.total_runs += 1;
    match result {
        Ok(drifts) => s.last_corrected = drifts.len(),
        Err(e) => {
            error!(error = %e, "Counter reconciliation failed");
            s.last_error = Some(e.to_string());
        }
    }
}

/// Launch a single pass in a background tokio task.
/// Returns immediately. Callers poll `running` to track progress.
pub fn launch(counters: CounterReconciler, status: Arc<RwLock<ReconcileStatus>>) {
    tokio::spawn(async move {
        run_pass(&counters, &status).await;
    });
}

/// Run a pass every `interval`. A zero interval disables the job.
pub fn spawn_periodic(
    counters: CounterReconciler,
    status: Arc<RwLock<ReconcileStatus>>,
    interval: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval.is_zero() {
        info!("Periodic counter reconciliation disabled");
        return None;
    }

    info!(interval_secs = interval.as_secs(), "Periodic counter reconciliation enabled");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if try_start(&status).await {
                run_pass(&counters, &status).await;
            }
        }
    }))
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::db::models::CounterField;
    use crate::db::sqlite::SqliteDatabase;
    use crate::db::Database;

    #[tokio::test]
    async fn test_single_pass_updates_status() {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let alice = db.create_user("alice").await.unwrap();
        let post = db.create_post(alice, "x").await.unwrap();
        db.adjust_counter(post.id, CounterField::Comment, 3)
            .await
            .unwrap();

        let counters = CounterReconciler::new(db.clone(), EventBus::new());
        let status = RwLock::new(ReconcileStatus::default());

        assert!(try_start(&status).await);
        assert!(!try_start(&status).await);
        run_pass(&counters, &status).await;

        let s = status.read().await;
        assert!(!s.running);
        assert_eq!(s.last_corrected, 1);
        assert_eq!(s.total_runs, 1);
        assert!(s.last_error.is_none());
        assert_eq!(db.post_counts(post.id).await.unwrap().unwrap().comments, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_disables() {
        let db: Arc<dyn Database> = Arc::new(SqliteDatabase::in_memory().unwrap());
        let handle = spawn_periodic(
            CounterReconciler::new(db, EventBus::new()),
            Arc::new(RwLock::new(ReconcileStatus::default())),
            Duration::ZERO,
        );
        assert!(handle.is_none());
    }
}
