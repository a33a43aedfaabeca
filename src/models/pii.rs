//! Canonical PII record model
//!
//! [`PIIRecord`] is the in-memory representation of an incoming patient
//! record. Normalization happens at deserialization time (birth dates,
//! sex codes, state abbreviations, SSN formatting), so a parsed record
//! is always canonical and re-parsing it is a no-op.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::blocking::BlockingKey;
use super::feature::{Feature, FeatureAttribute};
use super::identifier::{Identifier, IdentifierType};

/// Administrative sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    /// The canonical single-letter code
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Unknown => "U",
        }
    }

    /// Parse a sex value leniently: `m`/`male` and `f`/`female` resolve,
    /// anything else non-empty is Unknown
    pub fn parse(value: &str) -> Option<Sex> {
        match value.trim().to_lowercase().as_str() {
            "" => None,
            "m" | "male" => Some(Sex::Male),
            "f" | "female" => Some(Sex::Female),
            _ => Some(Sex::Unknown),
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Sex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Sex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sex::parse(&s).ok_or_else(|| serde::de::Error::custom("empty sex value"))
    }
}

/// OMB race category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Race {
    AmericanIndian,
    Asian,
    Black,
    Hawaiian,
    White,
    Other,
    AskedUnknown,
    Unknown,
}

impl Race {
    /// The canonical wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Race::AmericanIndian => "AMERICAN_INDIAN",
            Race::Asian => "ASIAN",
            Race::Black => "BLACK",
            Race::Hawaiian => "HAWAIIAN",
            Race::White => "WHITE",
            Race::Other => "OTHER",
            Race::AskedUnknown => "ASKED_UNKNOWN",
            Race::Unknown => "UNKNOWN",
        }
    }

    /// Parse a race value from either the canonical code or the OMB
    /// display string; unrecognized values resolve to Unknown
    pub fn parse(value: &str) -> Race {
        let v = value.trim().to_lowercase().replace('_', " ");
        match v.as_str() {
            "american indian" | "american indian or alaska native" => Race::AmericanIndian,
            "asian" => Race::Asian,
            "black" | "african american" | "black or african american" => Race::Black,
            "hawaiian"
            | "native hawaiian"
            | "pacific islander"
            | "native hawaiian or other pacific islander" => Race::Hawaiian,
            "white" => Race::White,
            "other" => Race::Other,
            "asked unknown" | "asked but unknown" => Race::AskedUnknown,
            _ => Race::Unknown,
        }
    }
}

impl std::fmt::Display for Race {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Race {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Race {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Race::parse(&s))
    }
}

/// A name record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Name {
    pub family: String,
    pub given: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suffix: Vec<String>,
}

impl Name {
    /// The composed `"<given...> <family>"` form, or None when empty
    pub fn composed(&self) -> Option<String> {
        let mut parts: Vec<&str> = self
            .given
            .iter()
            .map(String::as_str)
            .filter(|g| !g.is_empty())
            .collect();
        if !self.family.is_empty() {
            parts.push(&self.family);
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// An address record
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(default)]
pub struct Address {
    pub line: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
#[serde(default)]
struct AddressShadow {
    line: Vec<String>,
    city: Option<String>,
    state: Option<String>,
    #[serde(
        alias = "postalcode",
        alias = "postalCode",
        alias = "zip_code",
        alias = "zipcode",
        alias = "zipCode",
        alias = "zip"
    )]
    postal_code: Option<String>,
    county: Option<String>,
    country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl Default for AddressShadow {
    fn default() -> Self {
        Self {
            line: Vec::new(),
            city: None,
            state: None,
            postal_code: None,
            county: None,
            country: None,
            latitude: None,
            longitude: None,
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = AddressShadow::deserialize(deserializer)?;
        Ok(Address {
            line: raw.line,
            city: raw.city,
            state: raw.state.map(|s| normalize_state(&s)),
            postal_code: raw.postal_code,
            county: raw.county,
            country: raw.country,
            latitude: raw.latitude,
            longitude: raw.longitude,
        })
    }
}

/// A telecom record (phone, email, etc.)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Telecom {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#use: Option<String>,
}

/// The canonical PII record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PIIRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(
        alias = "birthdate",
        alias = "birthDate",
        deserialize_with = "de_birth_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub sex: Option<Sex>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<Name>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<Telecom>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<String>)]
    pub race: Vec<Race>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
}

fn de_birth_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_birth_date(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a birth date from ISO or common locale formats; dates after
/// today are rejected
pub fn parse_birth_date(value: &str) -> crate::Result<NaiveDate> {
    const FORMATS: [&str; 8] = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%Y%m%d",
        "%m/%d/%Y",
        "%m-%d-%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%d %B %Y",
    ];
    let value = value.trim();
    let date = FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| crate::Error::Validation(format!("invalid birth date: '{value}'")))?;
    if date > chrono::Utc::now().date_naive() {
        return Err(crate::Error::Validation(format!(
            "birth date cannot be in the future: '{value}'"
        )));
    }
    Ok(date)
}

/// Normalize a state value to its two-letter USPS code where resolvable
pub fn normalize_state(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return trimmed.to_uppercase();
    }
    let code = match trimmed.to_lowercase().as_str() {
        "alabama" => "AL",
        "alaska" => "AK",
        "arizona" => "AZ",
        "arkansas" => "AR",
        "california" => "CA",
        "colorado" => "CO",
        "connecticut" => "CT",
        "delaware" => "DE",
        "district of columbia" => "DC",
        "florida" => "FL",
        "georgia" => "GA",
        "hawaii" => "HI",
        "idaho" => "ID",
        "illinois" => "IL",
        "indiana" => "IN",
        "iowa" => "IA",
        "kansas" => "KS",
        "kentucky" => "KY",
        "louisiana" => "LA",
        "maine" => "ME",
        "maryland" => "MD",
        "massachusetts" => "MA",
        "michigan" => "MI",
        "minnesota" => "MN",
        "mississippi" => "MS",
        "missouri" => "MO",
        "montana" => "MT",
        "nebraska" => "NE",
        "nevada" => "NV",
        "new hampshire" => "NH",
        "new jersey" => "NJ",
        "new mexico" => "NM",
        "new york" => "NY",
        "north carolina" => "NC",
        "north dakota" => "ND",
        "ohio" => "OH",
        "oklahoma" => "OK",
        "oregon" => "OR",
        "pennsylvania" => "PA",
        "puerto rico" => "PR",
        "rhode island" => "RI",
        "south carolina" => "SC",
        "south dakota" => "SD",
        "tennessee" => "TN",
        "texas" => "TX",
        "utah" => "UT",
        "vermont" => "VT",
        "virginia" => "VA",
        "washington" => "WA",
        "west virginia" => "WV",
        "wisconsin" => "WI",
        "wyoming" => "WY",
        _ => return trimmed.to_string(),
    };
    code.to_string()
}

/// Take the first `n` characters of a string
pub(crate) fn first_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Take the last `n` characters of a string
pub(crate) fn last_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

impl PIIRecord {
    /// Parse a record from a JSON value, normalizing all fields
    pub fn from_value(value: serde_json::Value) -> crate::Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::Error::Validation(format!("invalid PII record: {e}")))
    }

    /// Serialize this record to a JSON value for storage
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| crate::Error::Internal(format!("PII record serialization failed: {e}")))
    }

    /// Iterate all string values for a feature, lowercased and in a
    /// deterministic order. Empty strings are never yielded.
    pub fn field_iter(&self, feature: Feature) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        match feature.attribute {
            FeatureAttribute::Birthdate => {
                if let Some(date) = self.birth_date {
                    values.push(date.format("%Y-%m-%d").to_string());
                }
            }
            FeatureAttribute::Sex => {
                if let Some(sex) = self.sex {
                    values.push(sex.as_str().to_lowercase());
                }
            }
            FeatureAttribute::Mrn => {
                for ident in &self.identifiers {
                    if ident.r#type == IdentifierType::MR && !ident.value.is_empty() {
                        values.push(ident.value.to_lowercase());
                    }
                }
            }
            FeatureAttribute::FirstName | FeatureAttribute::GivenName => {
                for name in &self.name {
                    for given in &name.given {
                        if !given.is_empty() {
                            values.push(given.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::LastName => {
                for name in &self.name {
                    if !name.family.is_empty() {
                        values.push(name.family.to_lowercase());
                    }
                }
            }
            FeatureAttribute::Name => {
                for name in &self.name {
                    if let Some(composed) = name.composed() {
                        values.push(composed.to_lowercase());
                    }
                }
            }
            FeatureAttribute::Suffix => {
                for name in &self.name {
                    for suffix in &name.suffix {
                        if !suffix.is_empty() {
                            values.push(suffix.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::Address => {
                // only the first line of an address is comparable, the
                // rest are informational
                for address in &self.address {
                    if let Some(line) = address.line.first() {
                        if !line.is_empty() {
                            values.push(line.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::City => {
                for address in &self.address {
                    if let Some(city) = address.city.as_deref() {
                        if !city.is_empty() {
                            values.push(city.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::State => {
                for address in &self.address {
                    if let Some(state) = address.state.as_deref() {
                        if !state.is_empty() {
                            values.push(state.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::Zip => {
                for address in &self.address {
                    if let Some(postal) = address.postal_code.as_deref() {
                        // only the first 5 characters are comparable
                        let zip = first_chars(postal, 5);
                        if !zip.is_empty() {
                            values.push(zip.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::County => {
                for address in &self.address {
                    if let Some(county) = address.county.as_deref() {
                        if !county.is_empty() {
                            values.push(county.to_lowercase());
                        }
                    }
                }
            }
            FeatureAttribute::Race => {
                for race in &self.race {
                    values.push(race.as_str().to_lowercase());
                }
            }
            FeatureAttribute::Telecom => {
                for telecom in &self.telecom {
                    if !telecom.value.is_empty() {
                        values.push(telecom.value.to_lowercase());
                    }
                }
            }
            FeatureAttribute::Phone => {
                for telecom in &self.telecom {
                    if telecom.system.as_deref() == Some("phone") && !telecom.value.is_empty() {
                        values.push(telecom.value.to_lowercase());
                    }
                }
            }
            FeatureAttribute::Email => {
                for telecom in &self.telecom {
                    if telecom.system.as_deref() == Some("email") && !telecom.value.is_empty() {
                        values.push(telecom.value.to_lowercase());
                    }
                }
            }
            FeatureAttribute::Identifier => {
                for ident in &self.identifiers {
                    if let Some(suffix) = feature.suffix {
                        if ident.r#type != suffix {
                            continue;
                        }
                    }
                    if !ident.value.is_empty() {
                        values.push(
                            format!(
                                "{}:{}:{}",
                                ident.value,
                                ident.authority.as_deref().unwrap_or(""),
                                ident.r#type
                            )
                            .to_lowercase(),
                        );
                    }
                }
            }
        }
        values
    }

    /// All possible blocking values for a single key
    pub fn blocking_keys(&self, key: BlockingKey) -> std::collections::BTreeSet<String> {
        key.derive(self)
    }

    /// All `(key, value)` blocking pairs for this record, across every
    /// enabled blocking key
    pub fn blocking_values(&self) -> Vec<(BlockingKey, String)> {
        let mut pairs = Vec::new();
        for key in BlockingKey::ALL {
            for value in key.derive(self) {
                pairs.push((key, value));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> PIIRecord {
        PIIRecord::from_value(json).unwrap()
    }

    #[test]
    fn test_sex_normalization() {
        assert_eq!(Sex::parse("M"), Some(Sex::Male));
        assert_eq!(Sex::parse("male"), Some(Sex::Male));
        assert_eq!(Sex::parse(" Female "), Some(Sex::Female));
        assert_eq!(Sex::parse("other"), Some(Sex::Unknown));
        assert_eq!(Sex::parse("u"), Some(Sex::Unknown));
        assert_eq!(Sex::parse(""), None);
    }

    #[test]
    fn test_birth_date_formats() {
        for raw in ["1980-01-15", "1980/01/15", "01/15/1980", "January 15, 1980"] {
            assert_eq!(
                parse_birth_date(raw).unwrap(),
                NaiveDate::from_ymd_opt(1980, 1, 15).unwrap(),
                "failed to parse {raw}"
            );
        }
    }

    #[test]
    fn test_birth_date_future_rejected() {
        assert!(parse_birth_date("2999-01-01").is_err());
    }

    #[test]
    fn test_birth_date_garbage_rejected() {
        assert!(parse_birth_date("not a date").is_err());
    }

    #[test]
    fn test_postal_code_aliases() {
        for key in ["postal_code", "postalCode", "zip", "zipcode"] {
            let raw = format!(r#"{{"address": [{{"{key}": "15935-1234"}}]}}"#);
            let rec: PIIRecord = serde_json::from_str(&raw).unwrap();
            assert_eq!(
                rec.field_iter(FeatureAttribute::Zip.into()),
                vec!["15935".to_string()],
                "alias {key}"
            );
        }
    }

    #[test]
    fn test_state_normalization() {
        let rec = record(serde_json::json!({"address": [{"state": "Pennsylvania"}]}));
        assert_eq!(rec.address[0].state.as_deref(), Some("PA"));
        assert_eq!(
            rec.field_iter(FeatureAttribute::State.into()),
            vec!["pa".to_string()]
        );
    }

    #[test]
    fn test_field_iter_first_name_all_given_values() {
        let rec = record(serde_json::json!({
            "name": [
                {"given": ["John", "Quincy"], "family": "Adams"},
                {"given": ["Johnny"], "family": "Adams"}
            ]
        }));
        assert_eq!(
            rec.field_iter(FeatureAttribute::FirstName.into()),
            vec!["john", "quincy", "johnny"]
        );
    }

    #[test]
    fn test_field_iter_composed_name() {
        let rec = record(serde_json::json!({
            "name": [{"given": ["John", "Quincy"], "family": "Adams"}]
        }));
        assert_eq!(
            rec.field_iter(FeatureAttribute::Name.into()),
            vec!["john quincy adams"]
        );
    }

    #[test]
    fn test_field_iter_address_first_line_only() {
        let rec = record(serde_json::json!({
            "address": [{"line": ["123 Main St", "Apt 4"], "city": "Springfield"}]
        }));
        assert_eq!(
            rec.field_iter(FeatureAttribute::Address.into()),
            vec!["123 main st"]
        );
    }

    #[test]
    fn test_field_iter_skips_empty_strings() {
        let rec = record(serde_json::json!({
            "name": [{"given": [""], "family": ""}]
        }));
        assert!(rec.field_iter(FeatureAttribute::FirstName.into()).is_empty());
        assert!(rec.field_iter(FeatureAttribute::LastName.into()).is_empty());
        assert!(rec.field_iter(FeatureAttribute::Name.into()).is_empty());
    }

    #[test]
    fn test_field_iter_typed_identifier() {
        let rec = record(serde_json::json!({
            "identifiers": [
                {"type": "MR", "value": "123456", "authority": "General"},
                {"type": "SS", "value": "123456789"}
            ]
        }));
        assert_eq!(
            rec.field_iter(Feature::identifier(IdentifierType::MR)),
            vec!["123456:general:mr"]
        );
        assert_eq!(
            rec.field_iter(Feature::identifier(IdentifierType::SS)),
            vec!["123-45-6789::ss"]
        );
        assert_eq!(rec.field_iter(FeatureAttribute::Mrn.into()), vec!["123456"]);
    }

    #[test]
    fn test_field_iter_telecom_systems() {
        let rec = record(serde_json::json!({
            "telecom": [
                {"value": "555-123-4567", "system": "phone"},
                {"value": "john@example.com", "system": "email"}
            ]
        }));
        assert_eq!(
            rec.field_iter(FeatureAttribute::Phone.into()),
            vec!["555-123-4567"]
        );
        assert_eq!(
            rec.field_iter(FeatureAttribute::Email.into()),
            vec!["john@example.com"]
        );
        assert_eq!(rec.field_iter(FeatureAttribute::Telecom.into()).len(), 2);
    }

    #[test]
    fn test_canonicalization_idempotent() {
        let rec = record(serde_json::json!({
            "birth_date": "01/15/1980",
            "sex": "male",
            "name": [{"given": ["John"], "family": "Shepard"}],
            "address": [{"line": ["1 Citadel Way"], "state": "Washington", "zip": "98101-4400"}],
            "identifiers": [{"type": "SS", "value": "123456789"}]
        }));
        let round_tripped = PIIRecord::from_value(rec.to_value().unwrap()).unwrap();
        assert_eq!(rec, round_tripped);
    }
}
