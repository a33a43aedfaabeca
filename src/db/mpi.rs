//! Diesel implementation of the MPI store

use std::collections::{HashMap, HashSet};

use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{AlgorithmPass, BlockingKey, PIIRecord, Patient, Person};
use crate::Result;

use super::models::{
    DbBlockingValue, DbPatient, DbPerson, NewDbBlockingValue, NewDbPatient, NewDbPerson,
};
use super::repositories::{MpiStore, PersonAttachment, TuningPairSample};
use super::schema::{mpi_blocking_value, mpi_patient, mpi_person};
use super::PgStore;

/// Source recorded for externally supplied person ids
const EXTERNAL_PERSON_SOURCE: &str = "IRIS";

fn insert_person(conn: &mut PgConnection) -> Result<Person> {
    let row: DbPerson = diesel::insert_into(mpi_person::table)
        .values(&NewDbPerson {
            reference_id: Uuid::new_v4(),
        })
        .get_result(conn)?;
    Ok(row.into())
}

fn resolve_attachment(
    conn: &mut PgConnection,
    attachment: PersonAttachment<'_>,
) -> Result<Option<Person>> {
    match attachment {
        PersonAttachment::Existing(person) => Ok(Some(person.clone())),
        PersonAttachment::NewPerson => Ok(Some(insert_person(conn)?)),
        PersonAttachment::Orphaned => Ok(None),
    }
}

fn insert_blocking_values(
    conn: &mut PgConnection,
    entries: &[(i64, &PIIRecord)],
) -> Result<()> {
    let mut rows: Vec<NewDbBlockingValue> = Vec::new();
    for (patient_id, record) in entries {
        for (key, value) in record.blocking_values() {
            rows.push(NewDbBlockingValue {
                patient_id: *patient_id,
                blockingkey: key.id(),
                value,
            });
        }
    }
    if rows.is_empty() {
        return Ok(());
    }
    diesel::insert_into(mpi_blocking_value::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn delete_blocking_values_for_patient(conn: &mut PgConnection, patient_id: i64) -> Result<()> {
    diesel::delete(mpi_blocking_value::table.filter(mpi_blocking_value::patient_id.eq(patient_id)))
        .execute(conn)?;
    Ok(())
}

fn new_patient_row(
    record: &PIIRecord,
    person_id: Option<i64>,
    external_patient_id: Option<&str>,
    external_person_id: Option<&str>,
) -> Result<NewDbPatient> {
    Ok(NewDbPatient {
        person_id,
        reference_id: Uuid::new_v4(),
        data: record.to_value()?,
        external_patient_id: external_patient_id.map(str::to_string),
        external_person_id: external_person_id.map(str::to_string),
        external_person_source: external_person_id.map(|_| EXTERNAL_PERSON_SOURCE.to_string()),
    })
}

fn load_persons_by_ids(conn: &mut PgConnection, ids: Vec<i64>) -> Result<HashMap<i64, Person>> {
    let rows: Vec<DbPerson> = mpi_person::table
        .filter(mpi_person::id.eq_any(ids))
        .load(conn)?;
    Ok(rows.into_iter().map(|p| (p.id, p.into())).collect())
}

fn get_person_row(conn: &mut PgConnection, reference_id: Uuid) -> Result<Option<Person>> {
    let row: Option<DbPerson> = mpi_person::table
        .filter(mpi_person::reference_id.eq(reference_id))
        .first(conn)
        .optional()?;
    Ok(row.map(Into::into))
}

impl MpiStore for PgStore {
    fn insert_patient(
        &self,
        record: &PIIRecord,
        person: PersonAttachment<'_>,
        external_patient_id: Option<&str>,
        external_person_id: Option<&str>,
    ) -> Result<Patient> {
        let mut conn = self.conn()?;
        conn.transaction::<Patient, crate::Error, _>(|conn| {
            let person = resolve_attachment(conn, person)?;
            let new_row = new_patient_row(
                record,
                person.as_ref().map(|p| p.id),
                external_patient_id,
                external_person_id,
            )?;
            let row: DbPatient = diesel::insert_into(mpi_patient::table)
                .values(&new_row)
                .get_result(conn)?;
            insert_blocking_values(conn, &[(row.id, record)])?;
            row.into_domain(person)
        })
    }

    fn bulk_insert_patients(
        &self,
        records: &[PIIRecord],
        person: PersonAttachment<'_>,
        external_person_id: Option<&str>,
    ) -> Result<Vec<Patient>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        conn.transaction::<Vec<Patient>, crate::Error, _>(|conn| {
            let person = resolve_attachment(conn, person)?;
            let person_id = person.as_ref().map(|p| p.id);

            // per-row inserts preserve input ordering of the returned ids
            let mut patients = Vec::with_capacity(records.len());
            for record in records {
                let new_row = new_patient_row(
                    record,
                    person_id,
                    record.external_id.as_deref(),
                    external_person_id,
                )?;
                let row: DbPatient = diesel::insert_into(mpi_patient::table)
                    .values(&new_row)
                    .get_result(conn)?;
                insert_blocking_values(conn, &[(row.id, record)])?;
                patients.push(row.into_domain(person.clone())?);
            }
            Ok(patients)
        })
    }

    fn update_patient(
        &self,
        reference_id: Uuid,
        record: Option<&PIIRecord>,
        person: Option<&Person>,
        external_patient_id: Option<&str>,
    ) -> Result<Patient> {
        let mut conn = self.conn()?;
        conn.transaction::<Patient, crate::Error, _>(|conn| {
            let row: DbPatient = mpi_patient::table
                .filter(mpi_patient::reference_id.eq(reference_id))
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    crate::Error::NotFound(format!("no patient with reference id {reference_id}"))
                })?;

            if let Some(record) = record {
                diesel::update(mpi_patient::table.filter(mpi_patient::id.eq(row.id)))
                    .set(mpi_patient::data.eq(record.to_value()?))
                    .execute(conn)?;
                // the blocking index must always mirror the stored record
                delete_blocking_values_for_patient(conn, row.id)?;
                insert_blocking_values(conn, &[(row.id, record)])?;
            }
            if let Some(person) = person {
                diesel::update(mpi_patient::table.filter(mpi_patient::id.eq(row.id)))
                    .set(mpi_patient::person_id.eq(Some(person.id)))
                    .execute(conn)?;
            }
            if let Some(external_patient_id) = external_patient_id {
                diesel::update(mpi_patient::table.filter(mpi_patient::id.eq(row.id)))
                    .set(mpi_patient::external_patient_id.eq(Some(external_patient_id.to_string())))
                    .execute(conn)?;
            }

            let row: DbPatient = mpi_patient::table
                .filter(mpi_patient::id.eq(row.id))
                .first(conn)?;
            let person = match row.person_id {
                Some(person_id) => load_persons_by_ids(conn, vec![person_id])?
                    .remove(&person_id),
                None => None,
            };
            row.into_domain(person)
        })
    }

    fn get_patients(&self, reference_ids: &[Uuid]) -> Result<Vec<Option<Patient>>> {
        let mut conn = self.conn()?;
        conn.transaction::<Vec<Option<Patient>>, crate::Error, _>(|conn| {
            let rows: Vec<DbPatient> = mpi_patient::table
                .filter(mpi_patient::reference_id.eq_any(reference_ids.to_vec()))
                .load(conn)?;
            let person_ids: Vec<i64> = rows.iter().filter_map(|r| r.person_id).collect();
            let persons = load_persons_by_ids(conn, person_ids)?;

            let mut by_reference: HashMap<Uuid, Patient> = HashMap::new();
            for row in rows {
                let person = row.person_id.and_then(|id| persons.get(&id).cloned());
                by_reference.insert(row.reference_id, row.into_domain(person)?);
            }
            Ok(reference_ids
                .iter()
                .map(|rid| by_reference.remove(rid))
                .collect())
        })
    }

    fn delete_patient(&self, reference_id: Uuid) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<(), crate::Error, _>(|conn| {
            let row: DbPatient = mpi_patient::table
                .filter(mpi_patient::reference_id.eq(reference_id))
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    crate::Error::NotFound(format!("no patient with reference id {reference_id}"))
                })?;
            delete_blocking_values_for_patient(conn, row.id)?;
            diesel::delete(mpi_patient::table.filter(mpi_patient::id.eq(row.id))).execute(conn)?;
            Ok(())
        })
    }

    fn create_person(&self) -> Result<Person> {
        let mut conn = self.conn()?;
        conn.transaction::<Person, crate::Error, _>(|conn| insert_person(conn))
    }

    fn get_person(&self, reference_id: Uuid) -> Result<Option<Person>> {
        let mut conn = self.conn()?;
        get_person_row(&mut conn, reference_id)
    }

    fn update_person_cluster(
        &self,
        patient_reference_ids: &[Uuid],
        person: Option<&Person>,
    ) -> Result<Person> {
        let mut conn = self.conn()?;
        conn.transaction::<Person, crate::Error, _>(|conn| {
            let person = match person {
                Some(person) => person.clone(),
                None => insert_person(conn)?,
            };
            for reference_id in patient_reference_ids {
                let updated = diesel::update(
                    mpi_patient::table.filter(mpi_patient::reference_id.eq(reference_id)),
                )
                .set(mpi_patient::person_id.eq(Some(person.id)))
                .execute(conn)?;
                if updated == 0 {
                    return Err(crate::Error::NotFound(format!(
                        "no patient with reference id {reference_id}"
                    )));
                }
            }
            Ok(person)
        })
    }

    fn update_patient_person_ids(
        &self,
        person: &Person,
        old_person_reference_ids: &[Uuid],
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        conn.transaction::<usize, crate::Error, _>(|conn| {
            let old_ids: Vec<i64> = mpi_person::table
                .filter(mpi_person::reference_id.eq_any(old_person_reference_ids.to_vec()))
                .select(mpi_person::id)
                .load(conn)?;
            let old_ids: Vec<Option<i64>> = old_ids.into_iter().map(Some).collect();
            let moved = diesel::update(
                mpi_patient::table.filter(mpi_patient::person_id.eq_any(old_ids)),
            )
            .set(mpi_patient::person_id.eq(Some(person.id)))
            .execute(conn)?;
            Ok(moved)
        })
    }

    fn delete_persons(&self, persons: &[Person]) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<(), crate::Error, _>(|conn| {
            for person in persons {
                let attached: i64 = mpi_patient::table
                    .filter(mpi_patient::person_id.eq(Some(person.id)))
                    .count()
                    .get_result(conn)?;
                if attached > 0 {
                    return Err(crate::Error::Conflict(format!(
                        "person {} still has {attached} attached patients",
                        person.reference_id
                    )));
                }
                diesel::delete(mpi_person::table.filter(mpi_person::id.eq(person.id)))
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    fn get_orphaned_patients(&self, limit: i64, cursor: Option<Uuid>) -> Result<Vec<Patient>> {
        let mut conn = self.conn()?;
        let mut query = mpi_patient::table
            .filter(mpi_patient::person_id.is_null())
            .order(mpi_patient::reference_id.asc())
            .limit(limit)
            .into_boxed();
        if let Some(cursor) = cursor {
            query = query.filter(mpi_patient::reference_id.gt(cursor));
        }
        let rows: Vec<DbPatient> = query.load(&mut conn)?;
        rows.into_iter().map(|r| r.into_domain(None)).collect()
    }

    fn get_block_data(
        &self,
        record: &PIIRecord,
        pass: &AlgorithmPass,
        max_missing_allowed_proportion: f64,
    ) -> Result<Vec<Patient>> {
        let total = pass.blocking_keys.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let mut key_values: Vec<(BlockingKey, Vec<String>)> = Vec::new();
        let mut missing = 0usize;
        for key in &pass.blocking_keys {
            let vals: Vec<String> = record.blocking_keys(*key).into_iter().collect();
            if vals.is_empty() {
                missing += 1;
            } else {
                key_values.push((*key, vals));
            }
        }
        // the record is insufficiently described for this pass
        if key_values.is_empty() || (missing as f64 / total as f64) > max_missing_allowed_proportion
        {
            return Ok(Vec::new());
        }

        let mut conn = self.conn()?;
        conn.transaction::<Vec<Patient>, crate::Error, _>(|conn| {
            // patients agreeing on every non-missing key
            let mut seeds: Option<HashSet<i64>> = None;
            for (key, vals) in &key_values {
                let ids: Vec<i64> = mpi_blocking_value::table
                    .inner_join(mpi_patient::table)
                    .filter(mpi_blocking_value::blockingkey.eq(key.id()))
                    .filter(mpi_blocking_value::value.eq_any(vals.clone()))
                    .filter(mpi_patient::person_id.is_not_null())
                    .select(mpi_patient::id)
                    .distinct()
                    .load(conn)?;
                let found: HashSet<i64> = ids.into_iter().collect();
                seeds = Some(match seeds {
                    None => found,
                    Some(prev) => prev.intersection(&found).copied().collect(),
                });
                if seeds.as_ref().is_some_and(HashSet::is_empty) {
                    return Ok(Vec::new());
                }
            }
            let seeds: Vec<i64> = seeds.unwrap_or_default().into_iter().collect();

            // expand to the full person clusters of the seed patients
            let person_ids: Vec<i64> = mpi_patient::table
                .filter(mpi_patient::id.eq_any(seeds))
                .select(mpi_patient::person_id)
                .distinct()
                .load::<Option<i64>>(conn)?
                .into_iter()
                .flatten()
                .collect();
            if person_ids.is_empty() {
                return Ok(Vec::new());
            }
            let person_id_filters: Vec<Option<i64>> =
                person_ids.iter().copied().map(Some).collect();
            let rows: Vec<DbPatient> = mpi_patient::table
                .filter(mpi_patient::person_id.eq_any(person_id_filters))
                .order(mpi_patient::id.asc())
                .load(conn)?;

            // reject cluster members that actively disagree on a key
            let patient_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let key_ids: Vec<i16> = key_values.iter().map(|(k, _)| k.id()).collect();
            let bvs: Vec<DbBlockingValue> = mpi_blocking_value::table
                .filter(mpi_blocking_value::patient_id.eq_any(patient_ids))
                .filter(mpi_blocking_value::blockingkey.eq_any(key_ids))
                .load(conn)?;
            let mut values_by_patient: HashMap<i64, HashMap<i16, Vec<String>>> = HashMap::new();
            for bv in bvs {
                values_by_patient
                    .entry(bv.patient_id)
                    .or_default()
                    .entry(bv.blockingkey)
                    .or_default()
                    .push(bv.value);
            }

            let persons = load_persons_by_ids(conn, person_ids)?;
            let mut patients = Vec::new();
            for row in rows {
                let agrees = key_values.iter().all(|(key, vals)| {
                    match values_by_patient
                        .get(&row.id)
                        .and_then(|by_key| by_key.get(&key.id()))
                    {
                        // absent keys are unconstrained
                        None => true,
                        Some(own) => own.iter().any(|v| vals.contains(v)),
                    }
                });
                if !agrees {
                    continue;
                }
                let person = row.person_id.and_then(|id| persons.get(&id).cloned());
                patients.push(row.into_domain(person)?);
            }
            Ok(patients)
        })
    }

    fn sample_tuning_pairs(
        &self,
        true_match_pairs: usize,
        non_match_pairs: usize,
    ) -> Result<TuningPairSample> {
        use diesel::sql_types::BigInt;

        #[derive(QueryableByName)]
        struct PairRow {
            #[diesel(sql_type = diesel::sql_types::Jsonb)]
            record_a: serde_json::Value,
            #[diesel(sql_type = diesel::sql_types::Jsonb)]
            record_b: serde_json::Value,
        }

        fn into_pairs(rows: Vec<PairRow>) -> Result<Vec<(PIIRecord, PIIRecord)>> {
            rows.into_iter()
                .map(|row| {
                    Ok((
                        PIIRecord::from_value(row.record_a)?,
                        PIIRecord::from_value(row.record_b)?,
                    ))
                })
                .collect()
        }

        let mut conn = self.conn()?;
        let true_rows: Vec<PairRow> = diesel::sql_query(
            "SELECT p1.data AS record_a, p2.data AS record_b \
             FROM mpi_patient p1 \
             JOIN mpi_patient p2 ON p1.person_id = p2.person_id AND p1.id < p2.id \
             WHERE p1.person_id IS NOT NULL \
             ORDER BY random() LIMIT $1",
        )
        .bind::<BigInt, _>(true_match_pairs as i64)
        .load(&mut conn)?;

        let non_rows: Vec<PairRow> = diesel::sql_query(
            "SELECT p1.data AS record_a, p2.data AS record_b \
             FROM mpi_patient p1 \
             JOIN mpi_patient p2 ON p1.person_id <> p2.person_id AND p1.id < p2.id \
             WHERE p1.person_id IS NOT NULL AND p2.person_id IS NOT NULL \
             ORDER BY random() LIMIT $1",
        )
        .bind::<BigInt, _>(non_match_pairs as i64)
        .load(&mut conn)?;

        Ok(TuningPairSample {
            true_match: into_pairs(true_rows)?,
            non_match: into_pairs(non_rows)?,
        })
    }

    fn reset_mpi(&self) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction::<(), crate::Error, _>(|conn| {
            diesel::delete(mpi_blocking_value::table).execute(conn)?;
            diesel::delete(mpi_patient::table).execute(conn)?;
            diesel::delete(mpi_person::table).execute(conn)?;
            Ok(())
        })
    }

    fn check_connection(&self) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(|e| crate::Error::Upstream(e.to_string()))?;
        Ok(())
    }
}
