//! Server-shaped observation records
//!
//! These structures mirror the JSON the Biocaching API returns for a single
//! sighting. Fields the normalizer treats as mandatory are still optional
//! here, so a malformed record surfaces as a [`NormalizationError`] naming the
//! missing part rather than as an opaque deserialization failure.
//!
//! [`NormalizationError`]: crate::error::NormalizationError

use crate::types::UserId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One observation as stored by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub id: u64,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub taxon: Option<RawTaxon>,
    /// Observation timestamp as sent by the server
    #[serde(default)]
    pub observed_at: Option<String>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub comments_count: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes: Vec<RawLike>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pictures: Vec<RawPicture>,
    /// Observer id, resolved against the response's user directory
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Taxon reference embedded in an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTaxon {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    /// Common names keyed by ISO 639-2 language code
    #[serde(default, deserialize_with = "names_without_nulls")]
    pub all_common_names: HashMap<String, String>,
}

impl RawTaxon {
    /// Common name for `language`, if the server has a non-empty one
    pub fn common_name(&self, language: &str) -> Option<&str> {
        self.all_common_names
            .get(language)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Geo point; the search index stores it as `{lat, lon}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub lat: Option<RawCoordinate>,
    #[serde(default, alias = "lon")]
    pub lng: Option<RawCoordinate>,
}

/// A coordinate component; usually a decimal string, occasionally a number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    /// Parse to a finite number of degrees
    pub fn to_degrees(&self) -> Option<f64> {
        let value = match self {
            RawCoordinate::Number(n) => *n,
            RawCoordinate::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Original text, for error reporting
    pub fn as_text(&self) -> String {
        match self {
            RawCoordinate::Number(n) => n.to_string(),
            RawCoordinate::Text(s) => s.clone(),
        }
    }
}

/// A like, on an observation or on one of its pictures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLike {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// A photo attached to an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPicture {
    #[serde(default, deserialize_with = "null_as_default")]
    pub primary: bool,
    #[serde(default)]
    pub photographer: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub urls: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub likes: Vec<RawLike>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// The server sends `null` for languages without a translation
fn names_without_nulls<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let names: Option<HashMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(names
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(lang, name)| name.map(|n| (lang, n)))
        .collect())
}
