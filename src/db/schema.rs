//! Diesel table definitions
//!
//! Blocking key ids stored in `mpi_blocking_value.blockingkey` are part
//! of the on-disk format; see [`crate::models::BlockingKey`].

diesel::table! {
    mpi_person (id) {
        id -> Int8,
        reference_id -> Uuid,
    }
}

diesel::table! {
    mpi_patient (id) {
        id -> Int8,
        person_id -> Nullable<Int8>,
        reference_id -> Uuid,
        data -> Jsonb,
        #[max_length = 255]
        external_patient_id -> Nullable<Varchar>,
        #[max_length = 255]
        external_person_id -> Nullable<Varchar>,
        #[max_length = 100]
        external_person_source -> Nullable<Varchar>,
    }
}

diesel::table! {
    mpi_blocking_value (id) {
        id -> Int8,
        patient_id -> Int8,
        blockingkey -> Int2,
        #[max_length = 20]
        value -> Varchar,
    }
}

diesel::table! {
    algorithm (id) {
        id -> Int8,
        #[max_length = 255]
        label -> Varchar,
        description -> Nullable<Text>,
        is_default -> Bool,
        data -> Jsonb,
    }
}

diesel::table! {
    tuning_job (id) {
        id -> Uuid,
        #[max_length = 16]
        status -> Varchar,
        params -> Jsonb,
        results -> Nullable<Jsonb>,
        started_at -> Timestamptz,
        finished_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(mpi_patient -> mpi_person (person_id));
diesel::joinable!(mpi_blocking_value -> mpi_patient (patient_id));

diesel::allow_tables_to_appear_in_same_query!(mpi_person, mpi_patient, mpi_blocking_value);
