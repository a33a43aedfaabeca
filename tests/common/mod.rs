//! Shared helpers for integration tests

use axum::Router;

use record_linkage::api::rest::{create_router, AppState};
use record_linkage::config::Config;
use record_linkage::db::AlgorithmStore;
use record_linkage::models::default_algorithm;

/// Build a router over a fresh in-memory store with the built-in
/// default algorithm installed
#[allow(dead_code)]
pub fn create_test_app() -> (Router, AppState) {
    let state = AppState::with_memory_store(Config::default());
    state
        .algorithms
        .create_algorithm(&default_algorithm())
        .expect("install default algorithm");
    (create_router(state.clone()), state)
}

/// A PII record JSON body that blocks well under the default algorithm
#[allow(dead_code)]
pub fn sample_record(given: &str, family: &str) -> serde_json::Value {
    serde_json::json!({
        "birth_date": "1980-01-01",
        "sex": "M",
        "name": [{"given": [given], "family": family}],
        "address": [{"zip": "15935"}]
    })
}
