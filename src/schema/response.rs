//! Response envelopes returned by the Biocaching API
//!
//! Single-observation and search endpoints both ship a user directory next to
//! the records, since the server does not embed profiles per observation.

use super::raw_observation::RawObservation;
use crate::types::{UserDirectory, UserId};
use serde::{Deserialize, Serialize};

/// `GET observations/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationResponse {
    pub observation: RawObservation,
    #[serde(default)]
    pub users: UserDirectory,
}

/// `GET observations/?...` (search index result)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    #[serde(default)]
    pub users: UserDirectory,
}

impl SearchResponse {
    /// Raw records in hit order
    pub fn records(&self) -> impl Iterator<Item = &RawObservation> {
        self.hits.iter().map(|hit| &hit.source)
    }
}

/// One search hit wrapping the stored record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_source")]
    pub source: RawObservation,
}

/// `POST users/sign_in`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub authentication_token: Option<String>,
    #[serde(default)]
    pub displayname: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub picture: Option<ProfilePicture>,
}

/// Profile picture URLs of the signed-in user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePicture {
    #[serde(default)]
    pub thumb: Option<String>,
}

/// `GET terms/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsResponse {
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TermsResponse {
    /// Render the terms as one numbered HTML fragment followed by the revision date
    pub fn to_html(&self) -> String {
        let mut html: String = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, term)| format!("{}. {}<br>", i + 1, term))
            .collect();
        if let Some(updated_at) = &self.updated_at {
            html.push_str(updated_at);
        }
        html
    }
}

/// `GET terms/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}

impl TermsStatusResponse {
    pub fn is_accepted(&self) -> bool {
        self.status.as_deref() == Some("accepted")
    }
}

/// A saved API response holding observations, in either envelope
#[derive(Debug, Clone)]
pub enum ObservationPayload {
    Single(ObservationResponse),
    Search(SearchResponse),
}

/// Parsers for raw response text
pub struct ResponseParser;

impl ResponseParser {
    /// Parse a single-observation response
    pub fn parse_observation(json: &str) -> Result<ObservationResponse, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse a search/listing response
    pub fn parse_search(json: &str) -> Result<SearchResponse, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parse either envelope, telling them apart by the `hits` key
    pub fn parse_payload(json: &str) -> Result<ObservationPayload, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("hits").is_some() {
            Ok(ObservationPayload::Search(serde_json::from_value(value)?))
        } else {
            Ok(ObservationPayload::Single(serde_json::from_value(value)?))
        }
    }
}
