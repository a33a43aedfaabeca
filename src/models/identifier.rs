//! Identifier model definition

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! identifier_types {
    ($($variant:ident),+ $(,)?) => {
        /// HL7 v2 identifier type codes (MR, SS, DL, etc.)
        ///
        /// This is the universe of identifier types a record may carry; the
        /// code doubles as the wire representation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum IdentifierType {
            $($variant,)+
        }

        impl IdentifierType {
            /// All identifier type codes
            pub const ALL: &'static [IdentifierType] = &[$(IdentifierType::$variant,)+];

            /// The wire representation of this code
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(IdentifierType::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

identifier_types!(
    AC, ACSN, AIN, AM, AMA, AN, ANC, AND, ANON, ANT, APRN, ASID, BA, BC, BCFN,
    BCT, BR, BRN, BSNR, CAII, CC, CONM, CY, CZ, DC, DCFN, DDS, DEA, DFN, DI,
    DL, DN, DO, DP, DPM, DR, DS, DSG, EI, EN, ESN, FDR, FDRFN, FGN, FI, FILL,
    GI, GIN, GL, GN, HC, IND, IRISTEM, JHN, LACSN, LANR, LI, LN, LR, MA, MB,
    MC, MCD, MCN, MCR, MCT, MD, MI, MR, MRT, MS, NBSNR, NCT, NE, NH, NI, NII,
    NIIP, NP, NPI, OBI, OD, PA, PC, PCN, PE, PEN, PGN, PHC, PHE, PHO, PI, PIN,
    PLAC, PN, PNT, PPIN, PPN, PRC, PRN, PT, QA, RI, RN, RPH, RR, RRI, RRP,
    SAMN, SB, SID, SL, SN, SNBSN, SNO, SP, SR, SRX, SS, STN, TAX, TN, TPR,
    TRL, U, UDI, UPIN, USID, VN, VP, VS, WC, WCN, WP, XV, XX,
);

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IdentifierType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        IdentifierType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == code)
            .ok_or_else(|| crate::Error::Validation(format!("invalid identifier type: '{s}'")))
    }
}

/// A typed patient identifier (MRN, SSN, driver's license, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Identifier {
    /// Identifier type code
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub r#type: IdentifierType,

    /// The identifier value, whitespace-trimmed
    #[serde(default)]
    pub value: String,

    /// The assigning authority, whitespace-trimmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

#[derive(Deserialize)]
struct IdentifierShadow {
    #[serde(rename = "type")]
    r#type: IdentifierType,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    authority: Option<String>,
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = IdentifierShadow::deserialize(deserializer)?;
        Ok(Identifier::new(
            raw.r#type,
            raw.value.unwrap_or_default(),
            raw.authority,
        ))
    }
}

impl Identifier {
    /// Create a normalized identifier: values are whitespace-trimmed and
    /// nine-digit SSNs are reformatted to XXX-XX-XXXX
    pub fn new(r#type: IdentifierType, value: String, authority: Option<String>) -> Self {
        let mut value = value.trim().to_string();
        if r#type == IdentifierType::SS
            && value.len() == 9
            && value.chars().all(|c| c.is_ascii_digit())
        {
            value = format!("{}-{}-{}", &value[..3], &value[3..5], &value[5..]);
        }
        let authority = authority.map(|a| a.trim().to_string());
        Self {
            r#type,
            value,
            authority,
        }
    }

    /// Create a Medical Record Number identifier
    pub fn mrn(value: impl Into<String>) -> Self {
        Self::new(IdentifierType::MR, value.into(), None)
    }

    /// Create a Social Security Number identifier
    pub fn ssn(value: impl Into<String>) -> Self {
        Self::new(IdentifierType::SS, value.into(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_type_round_trip() {
        for t in IdentifierType::ALL {
            assert_eq!(t.as_str().parse::<IdentifierType>().unwrap(), *t);
        }
    }

    #[test]
    fn test_identifier_type_parse_case_insensitive() {
        assert_eq!("mr".parse::<IdentifierType>().unwrap(), IdentifierType::MR);
        assert!("BOGUS".parse::<IdentifierType>().is_err());
    }

    #[test]
    fn test_ssn_reformatted() {
        let ident = Identifier::ssn("123456789");
        assert_eq!(ident.value, "123-45-6789");

        // already formatted values are untouched
        let ident = Identifier::ssn("123-45-6789");
        assert_eq!(ident.value, "123-45-6789");
    }

    #[test]
    fn test_whitespace_trimmed() {
        let ident = Identifier::new(
            IdentifierType::MR,
            "  12345  ".to_string(),
            Some(" General Hospital ".to_string()),
        );
        assert_eq!(ident.value, "12345");
        assert_eq!(ident.authority.as_deref(), Some("General Hospital"));
    }

    #[test]
    fn test_deserialize_normalizes() {
        let ident: Identifier =
            serde_json::from_str(r#"{"type": "SS", "value": "987654321"}"#).unwrap();
        assert_eq!(ident.r#type, IdentifierType::SS);
        assert_eq!(ident.value, "987-65-4321");
    }
}
