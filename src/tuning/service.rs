//! Background tuning job runner
//!
//! Jobs run as supervised tasks with a deadline. All job state lives on
//! the job row: callers poll the store, and failures are recorded there
//! rather than propagated.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::db::repositories::{AlgorithmStore, MpiStore, TuningStore};
use crate::models::{TuningJob, TuningParams, TuningResults, TuningStatus};
use crate::Result;

use super::{calculate_log_odds, calculate_m_probs, calculate_u_probs, log_odds_list, recommend_windows};

/// Starts and supervises tuning jobs
#[derive(Clone)]
pub struct TuningRunner {
    mpi: Arc<dyn MpiStore>,
    tuning: Arc<dyn TuningStore>,
    algorithms: Arc<dyn AlgorithmStore>,
    timeout: Duration,
}

impl TuningRunner {
    pub fn new(
        mpi: Arc<dyn MpiStore>,
        tuning: Arc<dyn TuningStore>,
        algorithms: Arc<dyn AlgorithmStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            mpi,
            tuning,
            algorithms,
            timeout,
        }
    }

    /// Create a job and spawn its supervisor. Fails with a conflict
    /// while another job is active.
    pub async fn start(&self, params: TuningParams) -> Result<TuningJob> {
        let tuning = Arc::clone(&self.tuning);
        let job = tokio::task::spawn_blocking(move || tuning.start_job(params))
            .await
            .map_err(|e| crate::Error::Internal(format!("blocking task failed: {e}")))??;
        let runner = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            runner.supervise(job_id, params).await;
        });
        Ok(job)
    }

    /// Fail any job left PENDING/RUNNING by a previous process once it
    /// exceeds the age threshold
    pub fn fail_stale_jobs(&self, max_age_secs: i64) -> Result<usize> {
        self.tuning.fail_stale_jobs(max_age_secs)
    }

    /// Fetch a job by id
    pub async fn get(&self, id: Uuid) -> Result<Option<TuningJob>> {
        let tuning = Arc::clone(&self.tuning);
        tokio::task::spawn_blocking(move || tuning.get_job(id))
            .await
            .map_err(|e| crate::Error::Internal(format!("blocking task failed: {e}")))?
    }

    async fn supervise(self, job_id: Uuid, params: TuningParams) {
        if let Err(e) = self.tuning.update_job(job_id, TuningStatus::Running, None) {
            tracing::error!(job = %job_id, error = %e, "failed to mark tuning job running");
            return;
        }

        let mpi = Arc::clone(&self.mpi);
        let algorithms = Arc::clone(&self.algorithms);
        let work = tokio::task::spawn_blocking(move || run_job(mpi, algorithms, params));

        let outcome = match tokio::time::timeout(self.timeout, work).await {
            Err(_) => Err("job timed out".to_string()),
            Ok(Err(join_error)) => Err(format!("tuning task panicked: {join_error}")),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(results))) => Ok(results),
        };

        let update = match outcome {
            Ok(results) => {
                tracing::info!(job = %job_id, "tuning job completed");
                self.tuning
                    .update_job(job_id, TuningStatus::Completed, Some(results))
            }
            Err(details) => {
                tracing::warn!(job = %job_id, details = %details, "tuning job failed");
                self.tuning.update_job(
                    job_id,
                    TuningStatus::Failed,
                    Some(TuningResults {
                        details,
                        ..Default::default()
                    }),
                )
            }
        };
        if let Err(e) = update {
            tracing::error!(job = %job_id, error = %e, "failed to record tuning job outcome");
        }
    }
}

fn run_job(
    mpi: Arc<dyn MpiStore>,
    algorithms: Arc<dyn AlgorithmStore>,
    params: TuningParams,
) -> Result<TuningResults> {
    let sample = mpi.sample_tuning_pairs(params.true_match_pairs, params.non_match_pairs)?;
    if sample.true_match.is_empty() || sample.non_match.is_empty() {
        return Err(crate::Error::Validation(
            "the MPI holds too few labeled pairs to tune".to_string(),
        ));
    }

    let m_probs = calculate_m_probs(&sample.true_match);
    let u_probs = calculate_u_probs(&sample.non_match);
    let log_odds = calculate_log_odds(&m_probs, &u_probs);

    let algorithm = algorithms
        .default_algorithm()?
        .ok_or_else(|| crate::Error::NotFound("no default algorithm to tune".to_string()))?;
    let passes = recommend_windows(&algorithm, &log_odds, &sample.true_match, &sample.non_match)?;

    Ok(TuningResults {
        true_matches_found: sample.true_match.len(),
        non_matches_found: sample.non_match.len(),
        log_odds: log_odds_list(&log_odds),
        passes,
        details: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::PersonAttachment;
    use crate::db::MemoryStore;
    use crate::models::{default_algorithm, PIIRecord};

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.create_algorithm(&default_algorithm()).unwrap();
        for family in ["Shepard", "Vakarian", "Zorah"] {
            let record = PIIRecord::from_value(serde_json::json!({
                "birth_date": "1980-06-01",
                "sex": "M",
                "name": [{"given": ["Test"], "family": family}],
            }))
            .unwrap();
            store
                .bulk_insert_patients(
                    &[record.clone(), record],
                    PersonAttachment::NewPerson,
                    None,
                )
                .unwrap();
        }
        store
    }

    fn runner(store: &Arc<MemoryStore>) -> TuningRunner {
        TuningRunner::new(
            Arc::clone(store) as Arc<dyn MpiStore>,
            Arc::clone(store) as Arc<dyn TuningStore>,
            Arc::clone(store) as Arc<dyn AlgorithmStore>,
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_job_runs_to_completion() {
        let store = seeded_store();
        let runner = runner(&store);
        let job = runner
            .start(TuningParams {
                true_match_pairs: 10,
                non_match_pairs: 10,
            })
            .await
            .unwrap();

        // poll until the supervisor settles the job
        let mut status = job.status;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = runner.get(job.id).await.unwrap().unwrap().status;
            if !status.is_active() {
                break;
            }
        }
        assert_eq!(status, TuningStatus::Completed);

        let finished = runner.get(job.id).await.unwrap().unwrap();
        let results = finished.results.unwrap();
        assert!(results.true_matches_found > 0);
        assert!(results.non_matches_found > 0);
        assert!(!results.log_odds.is_empty());
        assert_eq!(results.passes.len(), 2);
        assert!(finished.finished_at.unwrap() >= finished.started_at);
    }

    #[tokio::test]
    async fn test_empty_mpi_fails_job_without_propagating() {
        let store = Arc::new(MemoryStore::new());
        store.create_algorithm(&default_algorithm()).unwrap();
        let runner = runner(&store);
        let job = runner
            .start(TuningParams {
                true_match_pairs: 5,
                non_match_pairs: 5,
            })
            .await
            .unwrap();

        let mut finished = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let current = runner.get(job.id).await.unwrap().unwrap();
            if !current.status.is_active() {
                finished = Some(current);
                break;
            }
        }
        let finished = finished.expect("job should settle");
        assert_eq!(finished.status, TuningStatus::Failed);
        assert!(!finished.results.unwrap().details.is_empty());
    }

    #[tokio::test]
    async fn test_second_job_conflicts_while_active() {
        let store = seeded_store();
        let runner = runner(&store);
        let params = TuningParams {
            true_match_pairs: 10,
            non_match_pairs: 10,
        };
        // occupy the single active-job slot directly on the store
        store.start_job(params).unwrap();
        match runner.start(params).await {
            Err(crate::Error::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
