//! Blocking key definitions
//!
//! A [`BlockingKey`] maps a PII record to a set of short strings used to
//! drive candidate retrieval. When a patient is loaded into the MPI, all
//! possible blocking values are materialized for every key; an algorithm
//! pass then selects which keys actually participate in blocking. Defining
//! them all upfront lets users adjust their algorithm configuration
//! without reloading data.
//!
//! HERE BE DRAGONS: the numeric ids are part of the on-disk format and
//! MUST NOT be renumbered in a running deployment.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::feature::{Feature, FeatureAttribute};
use super::pii::{first_chars, last_chars, PIIRecord};

/// Maximum length of a blocking value; every derivation below fits
pub const BLOCKING_VALUE_MAX_LENGTH: usize = 20;

/// The universe of blocking keys with their stable ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockingKey {
    Birthdate,
    Mrn,
    Sex,
    Zip,
    FirstName,
    LastName,
    Address,
    Phone,
    Email,
    Identifier,
}

impl BlockingKey {
    /// All blocking keys, in id order
    pub const ALL: [BlockingKey; 10] = [
        BlockingKey::Birthdate,
        BlockingKey::Mrn,
        BlockingKey::Sex,
        BlockingKey::Zip,
        BlockingKey::FirstName,
        BlockingKey::LastName,
        BlockingKey::Address,
        BlockingKey::Phone,
        BlockingKey::Email,
        BlockingKey::Identifier,
    ];

    /// The stable id stored in the blocking value table
    pub fn id(&self) -> i16 {
        match self {
            BlockingKey::Birthdate => 1,
            BlockingKey::Mrn => 2,
            BlockingKey::Sex => 3,
            BlockingKey::Zip => 4,
            BlockingKey::FirstName => 5,
            BlockingKey::LastName => 6,
            BlockingKey::Address => 7,
            BlockingKey::Phone => 8,
            BlockingKey::Email => 9,
            BlockingKey::Identifier => 10,
        }
    }

    /// Resolve a stored id back to its key
    pub fn from_id(id: i16) -> Option<BlockingKey> {
        BlockingKey::ALL.iter().copied().find(|k| k.id() == id)
    }

    /// Human-readable description of the derivation
    pub fn description(&self) -> &'static str {
        match self {
            BlockingKey::Birthdate => "Date of birth",
            BlockingKey::Mrn => "Last 4 chars of MRN",
            BlockingKey::Sex => "Sex",
            BlockingKey::Zip => "Zip code",
            BlockingKey::FirstName => "First 4 chars of first name",
            BlockingKey::LastName => "First 4 chars of last name",
            BlockingKey::Address => "First 4 chars of address",
            BlockingKey::Phone => "Last 4 digits of phone",
            BlockingKey::Email => "First 4 chars of email",
            BlockingKey::Identifier => "Identifier type, authority and value",
        }
    }

    /// Derive the set of blocking values for this key from a record.
    /// Many keys will only have one possible value, but some (like first
    /// name) can have several. Empty strings are never included. The
    /// derivation is pure.
    pub fn derive(&self, record: &PIIRecord) -> BTreeSet<String> {
        let mut vals: BTreeSet<String> = BTreeSet::new();
        match self {
            BlockingKey::Birthdate => {
                vals.extend(record.field_iter(FeatureAttribute::Birthdate.into()));
            }
            BlockingKey::Mrn => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::Mrn.into())
                        .iter()
                        .map(|v| last_chars(v, 4)),
                );
            }
            BlockingKey::Sex => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::Sex.into())
                        .iter()
                        .map(|v| v.to_uppercase()),
                );
            }
            BlockingKey::Zip => {
                vals.extend(record.field_iter(FeatureAttribute::Zip.into()));
            }
            BlockingKey::FirstName => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::FirstName.into())
                        .iter()
                        .map(|v| first_chars(v, 4)),
                );
            }
            BlockingKey::LastName => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::LastName.into())
                        .iter()
                        .map(|v| first_chars(v, 4)),
                );
            }
            BlockingKey::Address => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::Address.into())
                        .iter()
                        .map(|v| first_chars(v, 4)),
                );
            }
            BlockingKey::Phone => {
                for value in record.field_iter(FeatureAttribute::Phone.into()) {
                    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                    if !digits.is_empty() {
                        vals.insert(last_chars(&digits, 4));
                    }
                }
            }
            BlockingKey::Email => {
                vals.extend(
                    record
                        .field_iter(FeatureAttribute::Email.into())
                        .iter()
                        .map(|v| first_chars(v, 4)),
                );
            }
            BlockingKey::Identifier => {
                for ident in &record.identifiers {
                    if ident.value.is_empty() {
                        continue;
                    }
                    let authority = ident
                        .authority
                        .as_deref()
                        .map(|a| first_chars(&a.to_lowercase(), 2))
                        .unwrap_or_default();
                    vals.insert(format!(
                        "{}:{}:{}",
                        ident.r#type,
                        authority,
                        last_chars(&ident.value.to_lowercase(), 4)
                    ));
                }
            }
        }
        vals.remove("");
        debug_assert!(vals.iter().all(|v| v.len() <= BLOCKING_VALUE_MAX_LENGTH));
        vals
    }
}

impl std::fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BlockingKey::Birthdate => "BIRTHDATE",
            BlockingKey::Mrn => "MRN",
            BlockingKey::Sex => "SEX",
            BlockingKey::Zip => "ZIP",
            BlockingKey::FirstName => "FIRST_NAME",
            BlockingKey::LastName => "LAST_NAME",
            BlockingKey::Address => "ADDRESS",
            BlockingKey::Phone => "PHONE",
            BlockingKey::Email => "EMAIL",
            BlockingKey::Identifier => "IDENTIFIER",
        };
        write!(f, "{name}")
    }
}
