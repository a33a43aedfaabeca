//! Skip-value cleaner
//!
//! Strips configured placeholder values ("John Doe", "999-99-9999", ...)
//! from a record before evaluation. Matching is case-insensitive glob
//! matching against the string representation each feature emits;
//! cleaning always operates on a deep copy.

use regex::Regex;

use crate::models::{Feature, FeatureAttribute, IdentifierType, PIIRecord, SkipValue};

/// Compile a glob pattern (`*`, `?`) into an anchored, case-insensitive
/// regex
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            _ => expr.push_str(&regex::escape(&c.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).ok()
}

/// Whether the value matches any of the glob patterns
fn matches(value: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(value))
}

/// Return a copy of the incoming record, cleaned of any values
/// identified in the skip list. The original record is not mutated.
pub fn clean(record: &PIIRecord, skips: &[SkipValue]) -> PIIRecord {
    let mut cleaned = record.clone();
    for skip in skips {
        let patterns: Vec<Regex> = skip
            .values
            .iter()
            .filter_map(|v| glob_to_regex(v))
            .collect();
        if patterns.is_empty() {
            continue;
        }

        let (feat_attr, feat_suff): (Option<FeatureAttribute>, Option<IdentifierType>) =
            if skip.feature == "*" {
                (None, None)
            } else {
                match Feature::parse(&skip.feature) {
                    Ok(feature) => (Some(feature.attribute), feature.suffix),
                    Err(_) => {
                        // config validation rejects unparseable features;
                        // ignore rather than fail evaluation
                        tracing::warn!(feature = %skip.feature, "ignoring unparseable skip feature");
                        continue;
                    }
                }
            };
        let applies = |attr: FeatureAttribute| feat_attr.is_none() || feat_attr == Some(attr);

        if applies(FeatureAttribute::Birthdate) {
            if let Some(date) = record.birth_date {
                if matches(&date.format("%Y-%m-%d").to_string(), &patterns) {
                    cleaned.birth_date = None;
                }
            }
        }
        if applies(FeatureAttribute::Sex) {
            if let Some(sex) = record.sex {
                if matches(sex.as_str(), &patterns) {
                    cleaned.sex = None;
                }
            }
        }
        if applies(FeatureAttribute::Address) {
            for (idx, address) in record.address.iter().enumerate() {
                if let Some(line) = address.line.first() {
                    if !line.is_empty() && matches(line, &patterns) {
                        cleaned.address[idx].line[0] = String::new();
                    }
                }
            }
        }
        if applies(FeatureAttribute::City) {
            for (idx, address) in record.address.iter().enumerate() {
                if let Some(city) = address.city.as_deref() {
                    if !city.is_empty() && matches(city, &patterns) {
                        cleaned.address[idx].city = Some(String::new());
                    }
                }
            }
        }
        if applies(FeatureAttribute::State) {
            for (idx, address) in record.address.iter().enumerate() {
                if let Some(state) = address.state.as_deref() {
                    if !state.is_empty() && matches(state, &patterns) {
                        cleaned.address[idx].state = Some(String::new());
                    }
                }
            }
        }
        if applies(FeatureAttribute::Zip) {
            for (idx, address) in record.address.iter().enumerate() {
                if let Some(postal) = address.postal_code.as_deref() {
                    if !postal.is_empty() && matches(postal, &patterns) {
                        cleaned.address[idx].postal_code = Some(String::new());
                    }
                }
            }
        }
        if applies(FeatureAttribute::County) {
            for (idx, address) in record.address.iter().enumerate() {
                if let Some(county) = address.county.as_deref() {
                    if !county.is_empty() && matches(county, &patterns) {
                        cleaned.address[idx].county = Some(String::new());
                    }
                }
            }
        }
        if applies(FeatureAttribute::FirstName) || applies(FeatureAttribute::GivenName) {
            for (n_idx, name) in record.name.iter().enumerate() {
                for (g_idx, given) in name.given.iter().enumerate() {
                    if !given.is_empty() && matches(given, &patterns) {
                        cleaned.name[n_idx].given[g_idx] = String::new();
                    }
                }
            }
        }
        if applies(FeatureAttribute::LastName) {
            for (idx, name) in record.name.iter().enumerate() {
                if !name.family.is_empty() && matches(&name.family, &patterns) {
                    cleaned.name[idx].family = String::new();
                }
            }
        }
        if applies(FeatureAttribute::Name) {
            for (idx, name) in record.name.iter().enumerate() {
                if let Some(composed) = name.composed() {
                    if matches(&composed, &patterns) {
                        cleaned.name[idx].given = Vec::new();
                        cleaned.name[idx].family = String::new();
                    }
                }
            }
        }
        if applies(FeatureAttribute::Suffix) {
            for (n_idx, name) in record.name.iter().enumerate() {
                for (s_idx, suffix) in name.suffix.iter().enumerate() {
                    if !suffix.is_empty() && matches(suffix, &patterns) {
                        cleaned.name[n_idx].suffix[s_idx] = String::new();
                    }
                }
            }
        }
        if applies(FeatureAttribute::Race) {
            // iterate backwards so removals don't shift pending indices
            for idx in (0..record.race.len()).rev() {
                if matches(record.race[idx].as_str(), &patterns) {
                    cleaned.race.remove(idx);
                }
            }
        }
        if applies(FeatureAttribute::Telecom) {
            for (idx, telecom) in record.telecom.iter().enumerate() {
                if !telecom.value.is_empty() && matches(&telecom.value, &patterns) {
                    cleaned.telecom[idx].value = String::new();
                }
            }
        }
        if applies(FeatureAttribute::Phone) {
            for (idx, telecom) in record.telecom.iter().enumerate() {
                if telecom.system.as_deref() == Some("phone")
                    && !telecom.value.is_empty()
                    && matches(&telecom.value, &patterns)
                {
                    cleaned.telecom[idx].value = String::new();
                }
            }
        }
        if applies(FeatureAttribute::Email) {
            for (idx, telecom) in record.telecom.iter().enumerate() {
                if telecom.system.as_deref() == Some("email")
                    && !telecom.value.is_empty()
                    && matches(&telecom.value, &patterns)
                {
                    cleaned.telecom[idx].value = String::new();
                }
            }
        }
        if applies(FeatureAttribute::Identifier) {
            for (idx, ident) in record.identifiers.iter().enumerate() {
                if feat_suff.is_some() && feat_suff != Some(ident.r#type) {
                    continue;
                }
                let composed = format!(
                    "{}:{}:{}",
                    ident.value,
                    ident.authority.as_deref().unwrap_or(""),
                    ident.r#type
                );
                if !ident.value.is_empty() && matches(&composed, &patterns) {
                    cleaned.identifiers[idx].value = String::new();
                }
            }
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureAttribute;

    fn record(json: serde_json::Value) -> PIIRecord {
        PIIRecord::from_value(json).unwrap()
    }

    fn skip(feature: &str, values: &[&str]) -> SkipValue {
        SkipValue {
            feature: feature.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_original_not_mutated() {
        let rec = record(serde_json::json!({"name": [{"given": ["John"], "family": "Doe"}]}));
        let cleaned = clean(&rec, &[skip("NAME", &["john doe"])]);
        assert_eq!(rec.name[0].family, "Doe");
        assert!(cleaned.name[0].family.is_empty());
        assert!(cleaned.name[0].given.is_empty());
    }

    #[test]
    fn test_case_insensitive_glob() {
        let rec = record(serde_json::json!({"name": [{"given": ["Baby"], "family": "Boy Smith"}]}));
        let cleaned = clean(&rec, &[skip("LAST_NAME", &["BOY*"])]);
        assert!(cleaned.name[0].family.is_empty());
    }

    #[test]
    fn test_question_mark_wildcard() {
        let rec = record(serde_json::json!({"name": [{"given": ["Jon", "Joan"], "family": "X"}]}));
        let cleaned = clean(&rec, &[skip("GIVEN_NAME", &["j?n"])]);
        assert!(cleaned.name[0].given[0].is_empty());
        assert_eq!(cleaned.name[0].given[1], "Joan");
    }

    #[test]
    fn test_star_feature_applies_everywhere() {
        let rec = record(serde_json::json!({
            "name": [{"given": ["Unknown"], "family": "Unknown"}],
            "address": [{"city": "Unknown"}]
        }));
        let cleaned = clean(&rec, &[skip("*", &["unknown"])]);
        assert!(cleaned.name[0].given[0].is_empty());
        assert!(cleaned.name[0].family.is_empty());
        assert_eq!(cleaned.address[0].city.as_deref(), Some(""));
    }

    #[test]
    fn test_scalar_fields_cleared_to_null() {
        let rec = record(serde_json::json!({"birth_date": "1900-01-01", "sex": "M"}));
        let cleaned = clean(
            &rec,
            &[skip("BIRTHDATE", &["1900-01-01"]), skip("SEX", &["M"])],
        );
        assert!(cleaned.birth_date.is_none());
        assert!(cleaned.sex.is_none());
    }

    #[test]
    fn test_race_entries_removed() {
        let rec = record(serde_json::json!({"race": ["WHITE", "OTHER", "ASIAN"]}));
        let cleaned = clean(&rec, &[skip("RACE", &["other"])]);
        assert_eq!(cleaned.race.len(), 2);
    }

    #[test]
    fn test_typed_identifier_skip() {
        let rec = record(serde_json::json!({
            "identifiers": [
                {"type": "SS", "value": "999-99-9999"},
                {"type": "MR", "value": "999-99-9999"}
            ]
        }));
        let cleaned = clean(&rec, &[skip("IDENTIFIER:SS", &["999-99-9999*"])]);
        assert!(cleaned.identifiers[0].value.is_empty());
        assert_eq!(cleaned.identifiers[1].value, "999-99-9999");
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let rec = record(serde_json::json!({
            "name": [{"given": ["Baby", "Boy"], "family": "Jones"}],
            "telecom": [{"value": "555-555-5555", "system": "phone"}]
        }));
        let skips = vec![skip("GIVEN_NAME", &["baby*"]), skip("PHONE", &["555*"])];
        let once = clean(&rec, &skips);
        let twice = clean(&once, &skips);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_cleared_values_vanish_from_field_iter() {
        let rec = record(serde_json::json!({"name": [{"given": ["John"], "family": "Doe"}]}));
        let cleaned = clean(&rec, &[skip("NAME", &["john doe"])]);
        assert!(cleaned.field_iter(FeatureAttribute::Name.into()).is_empty());
        assert!(cleaned
            .field_iter(FeatureAttribute::FirstName.into())
            .is_empty());
    }
}
