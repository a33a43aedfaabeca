//! Diesel implementation of the tuning job store

use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::models::{TuningJob, TuningParams, TuningResults, TuningStatus};
use crate::Result;

use super::models::{DbTuningJob, NewDbTuningJob};
use super::repositories::TuningStore;
use super::schema::tuning_job;
use super::PgStore;

const ACTIVE_STATUSES: [&str; 2] = ["PENDING", "RUNNING"];

impl TuningStore for PgStore {
    fn start_job(&self, params: TuningParams) -> Result<TuningJob> {
        params.validate()?;
        let mut conn = self.conn()?;
        conn.transaction::<TuningJob, crate::Error, _>(|conn| {
            let active: i64 = tuning_job::table
                .filter(tuning_job::status.eq_any(ACTIVE_STATUSES.to_vec()))
                .count()
                .get_result(conn)?;
            if active > 0 {
                return Err(crate::Error::Conflict(
                    "a tuning job is already active".to_string(),
                ));
            }
            let new_job = NewDbTuningJob {
                id: Uuid::new_v4(),
                status: TuningStatus::Pending.as_str().to_string(),
                params: serde_json::to_value(params).map_err(|e| {
                    crate::Error::Internal(format!("tuning params serialization failed: {e}"))
                })?,
                started_at: Utc::now(),
            };
            let row: DbTuningJob = diesel::insert_into(tuning_job::table)
                .values(&new_job)
                .get_result(conn)?;
            row.into_domain()
        })
        .map_err(|e| match e {
            // the partial unique index backs the single-active invariant
            crate::Error::Database(diesel::result::Error::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => crate::Error::Conflict("a tuning job is already active".to_string()),
            other => other,
        })
    }

    fn get_job(&self, id: Uuid) -> Result<Option<TuningJob>> {
        let mut conn = self.conn()?;
        let row: Option<DbTuningJob> = tuning_job::table
            .filter(tuning_job::id.eq(id))
            .first(&mut conn)
            .optional()?;
        row.map(DbTuningJob::into_domain).transpose()
    }

    fn update_job(
        &self,
        id: Uuid,
        status: TuningStatus,
        results: Option<TuningResults>,
    ) -> Result<TuningJob> {
        let mut conn = self.conn()?;
        conn.transaction::<TuningJob, crate::Error, _>(|conn| {
            let row: DbTuningJob = tuning_job::table
                .filter(tuning_job::id.eq(id))
                .first(conn)
                .optional()?
                .ok_or_else(|| crate::Error::NotFound(format!("no tuning job with id {id}")))?;

            let finished_at = if status.is_active() {
                row.finished_at
            } else {
                Some(Utc::now())
            };
            let results_value = match &results {
                Some(results) => Some(serde_json::to_value(results).map_err(|e| {
                    crate::Error::Internal(format!("tuning results serialization failed: {e}"))
                })?),
                None => row.results.clone(),
            };
            let updated: DbTuningJob = diesel::update(tuning_job::table.filter(tuning_job::id.eq(id)))
                .set((
                    tuning_job::status.eq(status.as_str().to_string()),
                    tuning_job::results.eq(results_value),
                    tuning_job::finished_at.eq(finished_at),
                ))
                .get_result(conn)?;
            updated.into_domain()
        })
    }

    fn fail_stale_jobs(&self, max_age_secs: i64) -> Result<usize> {
        let mut conn = self.conn()?;
        let threshold = Utc::now() - Duration::seconds(max_age_secs);
        let results = serde_json::to_value(TuningResults {
            details: "canceled incomplete job".to_string(),
            ..Default::default()
        })
        .map_err(|e| crate::Error::Internal(format!("tuning results serialization failed: {e}")))?;
        let failed = diesel::update(
            tuning_job::table
                .filter(tuning_job::status.eq_any(ACTIVE_STATUSES.to_vec()))
                .filter(tuning_job::started_at.lt(threshold)),
        )
        .set((
            tuning_job::status.eq(TuningStatus::Failed.as_str().to_string()),
            tuning_job::results.eq(Some(results)),
            tuning_job::finished_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)?;
        Ok(failed)
    }
}
