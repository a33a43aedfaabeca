//! Diesel implementation of the algorithm config store

use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;

use crate::models::Algorithm;
use crate::Result;

use super::models::{DbAlgorithm, NewDbAlgorithm};
use super::repositories::AlgorithmStore;
use super::schema::algorithm;
use super::PgStore;

fn new_row(algo: &Algorithm) -> Result<NewDbAlgorithm> {
    Ok(NewDbAlgorithm {
        label: algo.label.clone(),
        description: algo.description.clone(),
        is_default: algo.is_default,
        data: serde_json::to_value(algo)
            .map_err(|e| crate::Error::Internal(format!("algorithm serialization failed: {e}")))?,
    })
}

/// A second default algorithm is rejected before the write
fn check_single_default(
    conn: &mut PgConnection,
    algo: &Algorithm,
    existing_label: Option<&str>,
) -> Result<()> {
    if !algo.is_default {
        return Ok(());
    }
    let default_labels: Vec<String> = algorithm::table
        .filter(algorithm::is_default.eq(true))
        .select(algorithm::label)
        .load(conn)?;
    for label in default_labels {
        if Some(label.as_str()) != existing_label {
            return Err(crate::Error::Validation(
                "there can only be one default algorithm".to_string(),
            ));
        }
    }
    Ok(())
}

fn map_unique_violation(err: crate::Error, label: &str) -> crate::Error {
    match err {
        crate::Error::Database(diesel::result::Error::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            _,
        )) => crate::Error::Conflict(format!("algorithm with label '{label}' already exists")),
        other => other,
    }
}

impl AlgorithmStore for PgStore {
    fn list_algorithms(&self) -> Result<Vec<Algorithm>> {
        let mut conn = self.conn()?;
        let rows: Vec<DbAlgorithm> = algorithm::table.order(algorithm::id.asc()).load(&mut conn)?;
        rows.into_iter().map(DbAlgorithm::into_domain).collect()
    }

    fn get_algorithm(&self, label: &str) -> Result<Option<Algorithm>> {
        let mut conn = self.conn()?;
        let row: Option<DbAlgorithm> = algorithm::table
            .filter(algorithm::label.eq(label))
            .first(&mut conn)
            .optional()?;
        row.map(DbAlgorithm::into_domain).transpose()
    }

    fn default_algorithm(&self) -> Result<Option<Algorithm>> {
        let mut conn = self.conn()?;
        let row: Option<DbAlgorithm> = algorithm::table
            .filter(algorithm::is_default.eq(true))
            .first(&mut conn)
            .optional()?;
        row.map(DbAlgorithm::into_domain).transpose()
    }

    fn create_algorithm(&self, algo: &Algorithm) -> Result<()> {
        algo.validate()?;
        let mut conn = self.conn()?;
        conn.transaction::<(), crate::Error, _>(|conn| {
            check_single_default(conn, algo, None)?;
            diesel::insert_into(algorithm::table)
                .values(&new_row(algo)?)
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| map_unique_violation(e, &algo.label))
    }

    fn update_algorithm(&self, label: &str, algo: &Algorithm) -> Result<()> {
        algo.validate()?;
        let mut conn = self.conn()?;
        conn.transaction::<(), crate::Error, _>(|conn| {
            let existing: DbAlgorithm = algorithm::table
                .filter(algorithm::label.eq(label))
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    crate::Error::NotFound(format!("no algorithm with label '{label}'"))
                })?;
            check_single_default(conn, algo, Some(label))?;
            let row = new_row(algo)?;
            diesel::update(algorithm::table.filter(algorithm::id.eq(existing.id)))
                .set((
                    algorithm::label.eq(row.label),
                    algorithm::description.eq(row.description),
                    algorithm::is_default.eq(row.is_default),
                    algorithm::data.eq(row.data),
                ))
                .execute(conn)?;
            Ok(())
        })
        .map_err(|e| map_unique_violation(e, &algo.label))
    }

    fn delete_algorithm(&self, label: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let deleted =
            diesel::delete(algorithm::table.filter(algorithm::label.eq(label))).execute(&mut conn)?;
        if deleted == 0 {
            return Err(crate::Error::NotFound(format!(
                "no algorithm with label '{label}'"
            )));
        }
        Ok(())
    }
}
