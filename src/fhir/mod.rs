//! FHIR bundle adapter
//!
//! Converts the first Patient resource of a FHIR bundle into a
//! [`PIIRecord`], and annotates bundles with Person resources after
//! linkage. The bundle itself is treated as opaque JSON; only the
//! fields the linkage core understands are extracted.

use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::PIIRecord;
use crate::Result;

const GEOLOCATION_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/geolocation";
const US_CORE_RACE_EXTENSION: &str =
    "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race";

/// Get the first Patient resource from a FHIR bundle, if any
pub fn get_first_patient_resource(bundle: &Value) -> Option<&Value> {
    bundle
        .get("entry")?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("resource"))
        .find(|resource| {
            resource.get("resourceType").and_then(Value::as_str) == Some("Patient")
        })
}

/// Parse a FHIR Patient resource into a PII record
pub fn fhir_record_to_pii_record(resource: &Value) -> Result<PIIRecord> {
    let empty = Vec::new();

    let mut identifiers: Vec<Value> = Vec::new();
    for identifier in resource
        .get("identifier")
        .and_then(Value::as_array)
        .unwrap_or(&empty)
    {
        let authority = identifier
            .pointer("/assigner/identifier/value")
            .and_then(Value::as_str)
            .unwrap_or("");
        for coding in identifier
            .pointer("/type/coding")
            .and_then(Value::as_array)
            .unwrap_or(&empty)
        {
            identifiers.push(json!({
                "value": identifier.get("value").cloned().unwrap_or(Value::Null),
                "type": coding.get("code").cloned().unwrap_or(Value::Null),
                "authority": authority,
            }));
        }
    }

    let mut addresses: Vec<Value> = resource
        .get("address")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for address in &mut addresses {
        let county = address
            .get("district")
            .cloned()
            .unwrap_or(Value::String(String::new()));
        let mut latitude = Value::Null;
        let mut longitude = Value::Null;
        for extension in address
            .get("extension")
            .and_then(Value::as_array)
            .unwrap_or(&empty)
        {
            if extension.get("url").and_then(Value::as_str) != Some(GEOLOCATION_EXTENSION) {
                continue;
            }
            for coord in extension
                .get("extension")
                .and_then(Value::as_array)
                .unwrap_or(&empty)
            {
                match coord.get("url").and_then(Value::as_str) {
                    Some("latitude") => {
                        latitude = coord.get("valueDecimal").cloned().unwrap_or(Value::Null);
                    }
                    Some("longitude") => {
                        longitude = coord.get("valueDecimal").cloned().unwrap_or(Value::Null);
                    }
                    _ => {}
                }
            }
        }
        if let Some(map) = address.as_object_mut() {
            map.insert("county".to_string(), county);
            map.insert("latitude".to_string(), latitude);
            map.insert("longitude".to_string(), longitude);
            map.remove("extension");
        }
    }

    let mut races: Vec<Value> = Vec::new();
    for extension in resource
        .get("extension")
        .and_then(Value::as_array)
        .unwrap_or(&empty)
    {
        if extension.get("url").and_then(Value::as_str) != Some(US_CORE_RACE_EXTENSION) {
            continue;
        }
        for ext in extension
            .get("extension")
            .and_then(Value::as_array)
            .unwrap_or(&empty)
        {
            if ext.get("url").and_then(Value::as_str) == Some("ombCategory") {
                if let Some(display) = ext.pointer("/valueCoding/display") {
                    races.push(display.clone());
                }
            }
        }
    }

    PIIRecord::from_value(json!({
        "external_id": resource.get("id").cloned().unwrap_or(Value::Null),
        "name": resource.get("name").cloned().unwrap_or(json!([])),
        "birthDate": resource.get("birthDate").cloned().unwrap_or(Value::Null),
        "sex": resource.get("gender").cloned().unwrap_or(Value::Null),
        "address": addresses,
        "telecom": resource.get("telecom").cloned().unwrap_or(json!([])),
        "race": races,
        "identifiers": identifiers,
    }))
}

/// Parse the first Patient resource of a bundle; a bundle without one
/// is a validation failure
pub fn bundle_to_pii_record(bundle: &Value) -> Result<PIIRecord> {
    let resource = get_first_patient_resource(bundle).ok_or_else(|| {
        crate::Error::Validation("bundle contains no Patient resource".to_string())
    })?;
    fhir_record_to_pii_record(resource)
}

/// Add a simplified Person resource linking to the matched patient.
/// Returns the bundle with the new entry appended.
pub fn add_person_resource(person_id: Uuid, patient_id: Uuid, mut bundle: Value) -> Value {
    let person_resource = json!({
        "fullUrl": format!("urn:uuid:{person_id}"),
        "resource": {
            "resourceType": "Person",
            "id": person_id.to_string(),
            "link": [{"target": {"reference": format!("Patient/{patient_id}")}}],
        },
        "request": {
            "method": "PUT",
            "url": format!("Person/{person_id}"),
        },
    });
    match bundle.get_mut("entry").and_then(Value::as_array_mut) {
        Some(entries) => entries.push(person_resource),
        None => {
            if let Some(map) = bundle.as_object_mut() {
                map.insert("entry".to_string(), json!([person_resource]));
            }
        }
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureAttribute, IdentifierType, Sex};

    fn sample_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Observation", "id": "obs-1"}},
                {"resource": {
                    "resourceType": "Patient",
                    "id": "pat-1",
                    "gender": "female",
                    "birthDate": "1985-03-20",
                    "name": [{"family": "Shepard", "given": ["Jane"]}],
                    "address": [{
                        "line": ["1 Citadel Way"],
                        "city": "Vancouver",
                        "state": "WA",
                        "postalCode": "98660",
                        "district": "Clark",
                        "extension": [{
                            "url": "http://hl7.org/fhir/StructureDefinition/geolocation",
                            "extension": [
                                {"url": "latitude", "valueDecimal": 45.63},
                                {"url": "longitude", "valueDecimal": -122.66}
                            ]
                        }]
                    }],
                    "telecom": [{"value": "555-123-4567", "system": "phone"}],
                    "identifier": [{
                        "value": "123456",
                        "type": {"coding": [{"code": "MR"}]},
                        "assigner": {"identifier": {"value": "General Hospital"}}
                    }],
                    "extension": [{
                        "url": "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race",
                        "extension": [{
                            "url": "ombCategory",
                            "valueCoding": {"display": "White"}
                        }]
                    }]
                }}
            ]
        })
    }

    #[test]
    fn test_bundle_to_pii_record() {
        let record = bundle_to_pii_record(&sample_bundle()).unwrap();
        assert_eq!(record.external_id.as_deref(), Some("pat-1"));
        assert_eq!(record.sex, Some(Sex::Female));
        assert_eq!(record.birth_date.unwrap().to_string(), "1985-03-20");
        assert_eq!(record.name[0].family, "Shepard");
        assert_eq!(record.address[0].county.as_deref(), Some("Clark"));
        assert_eq!(record.address[0].latitude, Some(45.63));
        assert_eq!(record.identifiers[0].r#type, IdentifierType::MR);
        assert_eq!(
            record.identifiers[0].authority.as_deref(),
            Some("General Hospital")
        );
        assert_eq!(
            record.field_iter(FeatureAttribute::Race.into()),
            vec!["white"]
        );
    }

    #[test]
    fn test_bundle_without_patient_is_rejected() {
        let bundle = json!({"entry": [{"resource": {"resourceType": "Observation"}}]});
        assert!(matches!(
            bundle_to_pii_record(&bundle),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_add_person_resource_appends_entry() {
        let person_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        let updated = add_person_resource(person_id, patient_id, sample_bundle());
        let entries = updated["entry"].as_array().unwrap();
        let last = entries.last().unwrap();
        assert_eq!(last["resource"]["resourceType"], "Person");
        assert_eq!(
            last["resource"]["link"][0]["target"]["reference"],
            format!("Patient/{patient_id}")
        );
    }
}
