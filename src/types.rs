//! Core types for the Biocaching SDK
//!
//! This module defines the canonical, consumer-facing values produced by the
//! SDK: the caller's session and normalized observations. Server-shaped
//! records live in [`crate::schema`].

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Language used when no preference was ever persisted (ISO 639-2)
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Server-side user identifier
///
/// The API is inconsistent about id representation: sign-in responses and
/// like lists carry numbers, user directories are keyed by strings and the
/// persisted session stores text. Every representation is folded into this
/// type at the boundary so comparisons are always typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl UserId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId(id)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UserIdVisitor;

        impl Visitor<'_> for UserIdVisitor {
            type Value = UserId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<UserId, E> {
                Ok(UserId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<UserId, E> {
                u64::try_from(v)
                    .map(UserId)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<UserId, E> {
                v.parse()
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(UserIdVisitor)
    }
}

/// Public profile of a Biocaching user, as found in a user directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    /// Any other profile attributes the server sends (pictures, counters, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Name to show for this user: `displayname`, else "first last"
    pub fn display_name(&self) -> String {
        display_name_from(
            self.displayname.as_deref(),
            self.firstname.as_deref(),
            self.lastname.as_deref(),
        )
    }
}

/// Pick the configured display name, falling back to the joined first/last name
pub(crate) fn display_name_from(
    displayname: Option<&str>,
    firstname: Option<&str>,
    lastname: Option<&str>,
) -> String {
    match displayname {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{} {}", firstname.unwrap_or(""), lastname.unwrap_or(""))
            .trim()
            .to_string(),
    }
}

/// Batch-scoped mapping from user id to profile, sent next to listing responses
pub type UserDirectory = HashMap<UserId, UserProfile>;

/// Identity and credentials of the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: Option<String>,
    pub user_id: Option<UserId>,
    /// Authentication token; never serialized
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub display_name: Option<String>,
    pub picture: Option<String>,
    /// Preferred language (ISO 639-2)
    pub language: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            email: None,
            user_id: None,
            token: None,
            display_name: None,
            picture: None,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Session {
    /// A session is authorized iff email, user id and token are all present
    pub fn is_authorized(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.email) && present(&self.token) && self.user_id.is_some()
    }

    /// Drop every identity field, keeping the language preference
    pub(crate) fn clear_identity(&mut self) {
        self.email = None;
        self.user_id = None;
        self.token = None;
        self.display_name = None;
        self.picture = None;
    }
}

/// Outcome of restoring a persisted session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub authorized: bool,
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Taxon reference with display names resolved for the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxon {
    pub id: u64,
    /// Scientific name with its first character uppercased
    pub scientific_name: String,
    /// Common name in the preferred language, English, or the scientific name
    pub common_name: String,
}

/// A photo attached to an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPicture {
    pub liked_by_current_user: bool,
    pub primary: bool,
    pub photographer: Option<String>,
    /// Image URLs keyed by size label
    pub urls: BTreeMap<String, String>,
    pub likes_count: usize,
}

/// Canonical observation, independent of the server's record layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: u64,
    pub comment: Option<String>,
    pub species_id: u64,
    /// When the sighting happened, if the server sent a timestamp
    pub time: Option<DateTime<Utc>>,
    pub location: LatLng,
    /// Observer profile; `None` when the directory did not contain the user
    pub user: Option<UserProfile>,
    /// `None` when the server omitted the count
    pub comments_count: Option<u64>,
    pub likes_count: usize,
    pub liked_by_current_user: bool,
    /// Pictures in server order
    pub pictures: Vec<ObservationPicture>,
    pub taxon: Taxon,
}

/// Photo file sent with a new or edited observation
#[derive(Debug, Clone, PartialEq)]
pub struct PictureUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl PictureUpload {
    /// Read a photo from disk, guessing the MIME type from the extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "picture".to_string());
        let mime_type = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => Some("image/jpeg".to_string()),
            Some("png") => Some("image/png".to_string()),
            Some("gif") => Some("image/gif".to_string()),
            _ => None,
        };
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

/// A sighting to upload
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub picture: PictureUpload,
    pub taxon_id: u64,
    pub observed_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Changes to an existing observation; unset fields are left alone
///
/// Latitude and longitude are only sent together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationEdit {
    pub picture: Option<PictureUpload>,
    pub taxon_id: Option<u64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub position: Option<LatLng>,
}

impl ObservationEdit {
    pub fn is_empty(&self) -> bool {
        self.picture.is_none()
            && self.taxon_id.is_none()
            && self.observed_at.is_none()
            && self.position.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_numbers_and_strings() {
        let from_number: UserId = serde_json::from_str("42").unwrap();
        let from_string: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<UserId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<UserId>("-1").is_err());
    }

    #[test]
    fn test_user_directory_keys_are_parsed() {
        let dir: UserDirectory =
            serde_json::from_str(r#"{"7": {"displayname": "Ada"}, "9": {}}"#).unwrap();
        assert_eq!(dir[&UserId(7)].display_name(), "Ada");
        assert!(dir.contains_key(&UserId(9)));
    }

    #[test]
    fn test_display_name_fallback() {
        let profile = UserProfile {
            firstname: Some("Carl".to_string()),
            lastname: Some("Linnaeus".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "Carl Linnaeus");

        let named = UserProfile {
            displayname: Some("botanist".to_string()),
            ..profile
        };
        assert_eq!(named.display_name(), "botanist");
    }

    #[test]
    fn test_session_authorization() {
        let mut session = Session {
            email: Some("a@b.c".to_string()),
            user_id: Some(UserId(1)),
            token: Some("t".to_string()),
            ..Default::default()
        };
        assert!(session.is_authorized());

        session.token = Some(String::new());
        assert!(!session.is_authorized());

        session.token = Some("t".to_string());
        session.user_id = None;
        assert!(!session.is_authorized());
    }

    #[test]
    fn test_picture_upload_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toad.JPG");
        std::fs::write(&path, [0xFF, 0xD8]).unwrap();

        let upload = PictureUpload::from_path(&path).unwrap();
        assert_eq!(upload.file_name, "toad.JPG");
        assert_eq!(upload.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(upload.bytes, vec![0xFF, 0xD8]);
    }

    #[test]
    fn test_empty_edit() {
        assert!(ObservationEdit::default().is_empty());
        let edit = ObservationEdit {
            taxon_id: Some(1),
            ..Default::default()
        };
        assert!(!edit.is_empty());
    }

    #[test]
    fn test_session_never_serializes_token() {
        let session = Session {
            token: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"language\":\"eng\""));
    }
}
