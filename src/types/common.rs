use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub type AnyJson = serde_json::Value;

/// The kind of merchant project the credentials belong to.
///
/// Decides which fields are signed and which pingback fields are mandatory.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    VirtualCurrency,
    DigitalGoods,
    Cart,
}

impl AccountType {
    /// Numeric code used by the platform.
    pub fn code(&self) -> u8 {
        match self {
            AccountType::VirtualCurrency => 1,
            AccountType::DigitalGoods => 2,
            AccountType::Cart => 3,
        }
    }
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::VirtualCurrency => write!(f, "virtual_currency"),
            AccountType::DigitalGoods => write!(f, "digital_goods"),
            AccountType::Cart => write!(f, "cart"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignatureVersion {
    /// Fixed field subset, values concatenated with the secret, MD5.
    #[default]
    V1,
    /// HMAC-SHA256 over every parameter sorted by key.
    V2,
}

impl SignatureVersion {
    pub fn code(&self) -> u8 {
        match self {
            SignatureVersion::V1 => 1,
            SignatureVersion::V2 => 2,
        }
    }
}

impl TryFrom<u8> for SignatureVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SignatureVersion::V1),
            2 => Ok(SignatureVersion::V2),
            other => Err(Error::InvalidSignatureVersion(other.to_string())),
        }
    }
}

impl FromStr for SignatureVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(SignatureVersion::V1),
            "2" => Ok(SignatureVersion::V2),
            other => Err(Error::InvalidSignatureVersion(other.to_string())),
        }
    }
}

impl Display for SignatureVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for SignatureVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for SignatureVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = u8::deserialize(deserializer)?;
        SignatureVersion::try_from(v).map_err(serde::de::Error::custom)
    }
}
