//! Comparable record attributes
//!
//! A [`Feature`] names a attribute of a PII record that evaluators can
//! compare, e.g. `FIRST_NAME` or `IDENTIFIER:MR` (an identifier feature
//! scoped to a single identifier type).

use serde::{Deserialize, Serialize};

use super::identifier::IdentifierType;

/// The closed set of comparable attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureAttribute {
    Birthdate,
    Sex,
    Mrn,
    FirstName,
    LastName,
    Address,
    City,
    State,
    Zip,
    GivenName,
    Name,
    Suffix,
    County,
    Race,
    Telecom,
    Phone,
    Email,
    Identifier,
}

impl FeatureAttribute {
    /// All comparable attributes
    pub const ALL: [FeatureAttribute; 18] = [
        FeatureAttribute::Birthdate,
        FeatureAttribute::Sex,
        FeatureAttribute::Mrn,
        FeatureAttribute::FirstName,
        FeatureAttribute::LastName,
        FeatureAttribute::Address,
        FeatureAttribute::City,
        FeatureAttribute::State,
        FeatureAttribute::Zip,
        FeatureAttribute::GivenName,
        FeatureAttribute::Name,
        FeatureAttribute::Suffix,
        FeatureAttribute::County,
        FeatureAttribute::Race,
        FeatureAttribute::Telecom,
        FeatureAttribute::Phone,
        FeatureAttribute::Email,
        FeatureAttribute::Identifier,
    ];

    /// The wire representation of this attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureAttribute::Birthdate => "BIRTHDATE",
            FeatureAttribute::Sex => "SEX",
            FeatureAttribute::Mrn => "MRN",
            FeatureAttribute::FirstName => "FIRST_NAME",
            FeatureAttribute::LastName => "LAST_NAME",
            FeatureAttribute::Address => "ADDRESS",
            FeatureAttribute::City => "CITY",
            FeatureAttribute::State => "STATE",
            FeatureAttribute::Zip => "ZIP",
            FeatureAttribute::GivenName => "GIVEN_NAME",
            FeatureAttribute::Name => "NAME",
            FeatureAttribute::Suffix => "SUFFIX",
            FeatureAttribute::County => "COUNTY",
            FeatureAttribute::Race => "RACE",
            FeatureAttribute::Telecom => "TELECOM",
            FeatureAttribute::Phone => "PHONE",
            FeatureAttribute::Email => "EMAIL",
            FeatureAttribute::Identifier => "IDENTIFIER",
        }
    }
}

impl std::str::FromStr for FeatureAttribute {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        FeatureAttribute::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == name)
            .ok_or_else(|| crate::Error::Validation(format!("invalid feature: '{s}'")))
    }
}

impl std::fmt::Display for FeatureAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A comparable feature: an attribute with an optional identifier-type
/// suffix, written `ATTRIBUTE` or `IDENTIFIER:<TYPE>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Feature {
    pub attribute: FeatureAttribute,
    pub suffix: Option<IdentifierType>,
}

impl Feature {
    /// A feature with no identifier suffix
    pub fn new(attribute: FeatureAttribute) -> Self {
        Self {
            attribute,
            suffix: None,
        }
    }

    /// An identifier feature scoped to a single identifier type
    pub fn identifier(suffix: IdentifierType) -> Self {
        Self {
            attribute: FeatureAttribute::Identifier,
            suffix: Some(suffix),
        }
    }

    /// Parse a feature string, e.g. `"FIRST_NAME"` or `"IDENTIFIER:MR"`
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s.split_once(':') {
            None => Ok(Feature::new(s.parse()?)),
            Some((attr, suffix)) => {
                let attribute: FeatureAttribute = attr.parse()?;
                if attribute != FeatureAttribute::Identifier {
                    return Err(crate::Error::Validation(format!(
                        "only IDENTIFIER features accept a suffix: '{s}'"
                    )));
                }
                Ok(Feature {
                    attribute,
                    suffix: Some(suffix.parse()?),
                })
            }
        }
    }
}

impl From<FeatureAttribute> for Feature {
    fn from(attribute: FeatureAttribute) -> Self {
        Feature::new(attribute)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.suffix {
            Some(suffix) => write!(f, "{}:{}", self.attribute, suffix),
            None => write!(f, "{}", self.attribute),
        }
    }
}

impl Serialize for Feature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Feature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Feature::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_feature() {
        let feature = Feature::parse("FIRST_NAME").unwrap();
        assert_eq!(feature.attribute, FeatureAttribute::FirstName);
        assert_eq!(feature.suffix, None);
    }

    #[test]
    fn test_parse_identifier_suffix() {
        let feature = Feature::parse("IDENTIFIER:MR").unwrap();
        assert_eq!(feature.attribute, FeatureAttribute::Identifier);
        assert_eq!(feature.suffix, Some(IdentifierType::MR));
    }

    #[test]
    fn test_parse_case_insensitive() {
        let feature = Feature::parse("last_name").unwrap();
        assert_eq!(feature.attribute, FeatureAttribute::LastName);
    }

    #[test]
    fn test_suffix_rejected_on_non_identifier() {
        assert!(Feature::parse("FIRST_NAME:MR").is_err());
    }

    #[test]
    fn test_parse_unknown_feature() {
        assert!(Feature::parse("SHOE_SIZE").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["BIRTHDATE", "IDENTIFIER:SS", "ZIP"] {
            assert_eq!(Feature::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_serde_string_form() {
        let feature: Feature = serde_json::from_str("\"IDENTIFIER:MR\"").unwrap();
        assert_eq!(serde_json::to_string(&feature).unwrap(), "\"IDENTIFIER:MR\"");
    }
}
