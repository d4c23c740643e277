//! Observation normalization
//!
//! This module turns server-shaped observation records into canonical
//! [`Observation`] values:
//! - Observer profile resolved from the response's user directory
//! - Like counts and "liked by me" flags, per observation and per picture
//! - Coordinates parsed to numbers, timestamps parsed to UTC
//! - Taxon display names resolved (preferred language, English, scientific)
//!
//! Normalization is pure: the output owns all of its data and the input is
//! never modified.

use crate::error::NormalizationError;
use crate::schema::{RawCoordinate, RawLike, RawObservation, RawPicture, RawTaxon};
use crate::types::{
    LatLng, Observation, ObservationPicture, Taxon, UserDirectory, UserId, DEFAULT_LANGUAGE,
};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Naive timestamp layouts the API has been seen to emit, read as UTC
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Normalizer bound to the caller's identity and language
#[derive(Debug, Clone)]
pub struct ObservationNormalizer {
    current_user: Option<UserId>,
    language: String,
}

impl Default for ObservationNormalizer {
    fn default() -> Self {
        Self::new(None, DEFAULT_LANGUAGE)
    }
}

impl ObservationNormalizer {
    /// `current_user` drives the "liked by me" flags; `None` never matches
    pub fn new(current_user: Option<UserId>, language: &str) -> Self {
        Self {
            current_user,
            language: language.to_string(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Normalize one raw observation
    pub fn normalize(
        &self,
        raw: &RawObservation,
        users: &UserDirectory,
    ) -> Result<Observation, NormalizationError> {
        let taxon = raw
            .taxon
            .as_ref()
            .ok_or(NormalizationError::MissingField("taxon"))?;
        let taxon = self.resolve_taxon(taxon)?;
        let location = parse_location(raw)?;
        let time = raw.observed_at.as_deref().map(parse_timestamp).transpose()?;

        // A user missing from the directory is left unresolved
        let user = raw.user_id.and_then(|id| users.get(&id)).cloned();

        let pictures = raw
            .pictures
            .iter()
            .map(|picture| self.normalize_picture(picture))
            .collect();

        Ok(Observation {
            id: raw.id,
            comment: raw.comment.clone(),
            species_id: taxon.id,
            time,
            location,
            user,
            comments_count: raw.comments_count,
            likes_count: raw.likes.len(),
            liked_by_current_user: self.is_liked(&raw.likes),
            pictures,
            taxon,
        })
    }

    /// Normalize a listing, preserving order.
    ///
    /// Fails fast: the first malformed record aborts the batch, and the error
    /// names its index and id.
    pub fn normalize_batch<'a, I>(
        &self,
        raws: I,
        users: &UserDirectory,
    ) -> Result<Vec<Observation>, NormalizationError>
    where
        I: IntoIterator<Item = &'a RawObservation>,
    {
        raws.into_iter()
            .enumerate()
            .map(|(index, raw)| {
                self.normalize(raw, users)
                    .map_err(|e| NormalizationError::BatchElement {
                        index,
                        id: raw.id,
                        source: Box::new(e),
                    })
            })
            .collect()
    }

    /// Check every record of a listing, reporting each malformed one
    pub fn validate_batch<'a, I>(&self, raws: I, users: &UserDirectory) -> Vec<BatchIssue>
    where
        I: IntoIterator<Item = &'a RawObservation>,
    {
        raws.into_iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                self.normalize(raw, users).err().map(|error| BatchIssue {
                    index,
                    id: raw.id,
                    error,
                })
            })
            .collect()
    }

    fn normalize_picture(&self, picture: &RawPicture) -> ObservationPicture {
        ObservationPicture {
            liked_by_current_user: self.is_liked(&picture.likes),
            primary: picture.primary,
            photographer: picture.photographer.clone(),
            urls: picture.urls.clone(),
            likes_count: picture.likes.len(),
        }
    }

    fn is_liked(&self, likes: &[RawLike]) -> bool {
        match self.current_user {
            Some(me) => likes.iter().any(|like| like.user_id == Some(me)),
            None => false,
        }
    }

    fn resolve_taxon(&self, taxon: &RawTaxon) -> Result<Taxon, NormalizationError> {
        let id = taxon.id.ok_or(NormalizationError::MissingField("taxon.id"))?;
        let scientific_name = taxon
            .scientific_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(capitalize_first)
            .ok_or(NormalizationError::MissingField("taxon.scientific_name"))?;

        let common_name = taxon
            .common_name(&self.language)
            .or_else(|| taxon.common_name(DEFAULT_LANGUAGE))
            .map(str::to_string)
            .unwrap_or_else(|| scientific_name.clone());

        Ok(Taxon {
            id,
            scientific_name,
            common_name,
        })
    }
}

/// A record rejected by [`ObservationNormalizer::validate_batch`]
#[derive(Debug)]
pub struct BatchIssue {
    pub index: usize,
    pub id: u64,
    pub error: NormalizationError,
}

/// Uppercase the first character, leaving the rest untouched
fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_location(raw: &RawObservation) -> Result<LatLng, NormalizationError> {
    let location = raw
        .location
        .as_ref()
        .ok_or(NormalizationError::MissingField("location"))?;
    let lat = location
        .lat
        .as_ref()
        .ok_or(NormalizationError::MissingField("location.lat"))?;
    let lng = location
        .lng
        .as_ref()
        .ok_or(NormalizationError::MissingField("location.lng"))?;

    Ok(LatLng {
        lat: parse_coordinate("lat", lat)?,
        lng: parse_coordinate("lng", lng)?,
    })
}

fn parse_coordinate(axis: &'static str, value: &RawCoordinate) -> Result<f64, NormalizationError> {
    value
        .to_degrees()
        .ok_or_else(|| NormalizationError::InvalidCoordinate {
            axis,
            value: value.as_text(),
        })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, NormalizationError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| NormalizationError::InvalidTimestamp(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserProfile;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawObservation {
        serde_json::from_value(value).unwrap()
    }

    fn fir(common_names: serde_json::Value) -> RawObservation {
        raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba", "all_common_names": common_names},
            "location": {"lat": "46.0", "lng": "8.0"}
        }))
    }

    fn common_name(record: &RawObservation, language: &str) -> String {
        ObservationNormalizer::new(None, language)
            .normalize(record, &UserDirectory::new())
            .unwrap()
            .taxon
            .common_name
    }

    #[test]
    fn test_common_name_fallback_chain() {
        assert_eq!(common_name(&fir(json!({})), "fra"), "Abies alba");
        assert_eq!(common_name(&fir(json!({"eng": "Silver fir"})), "fra"), "Silver fir");
        assert_eq!(common_name(&fir(json!({"fra": "Sapin"})), "fra"), "Sapin");
        assert_eq!(
            common_name(&fir(json!({"fra": "", "eng": "Silver fir"})), "fra"),
            "Silver fir"
        );
        assert_eq!(
            common_name(&fir(json!({"fra": "Sapin", "eng": "Silver fir"})), "fra"),
            "Sapin"
        );
    }

    #[test]
    fn test_capitalization_keeps_remainder() {
        assert_eq!(capitalize_first("apis mellifera"), "Apis mellifera");
        assert_eq!(capitalize_first("quercus ROBUR"), "Quercus ROBUR");
        assert_eq!(capitalize_first("Bufo"), "Bufo");
        assert_eq!(capitalize_first("ørret"), "Ørret");
    }

    #[test]
    fn test_like_derivation() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "0", "lng": "0"},
            "likes": [{"user_id": 5}, {"user_id": 7}]
        }));
        let users = UserDirectory::new();

        let mine = ObservationNormalizer::new(Some(UserId(7)), "eng")
            .normalize(&record, &users)
            .unwrap();
        assert!(mine.liked_by_current_user);
        assert_eq!(mine.likes_count, 2);

        let other = ObservationNormalizer::new(Some(UserId(9)), "eng")
            .normalize(&record, &users)
            .unwrap();
        assert!(!other.liked_by_current_user);

        let anonymous = ObservationNormalizer::default()
            .normalize(&record, &users)
            .unwrap();
        assert!(!anonymous.liked_by_current_user);
    }

    #[test]
    fn test_duplicate_likes_are_counted() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "0", "lng": "0"},
            "likes": [{"user_id": 5}, {"user_id": "5"}]
        }));
        let observation = ObservationNormalizer::new(Some(UserId(5)), "eng")
            .normalize(&record, &UserDirectory::new())
            .unwrap();
        assert_eq!(observation.likes_count, 2);
        assert!(observation.liked_by_current_user);
    }

    #[test]
    fn test_pictures_keep_order_and_own_likes() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "0", "lng": "0"},
            "likes": [{"user_id": 3}],
            "pictures": [
                {"primary": true, "photographer": "P1", "urls": {"thumb": "1"}, "likes": []},
                {"primary": false, "photographer": "P2", "urls": {"thumb": "2"}, "likes": [{"user_id": 3}, {"user_id": 4}]},
                {"primary": false, "photographer": "P3", "urls": {"thumb": "3"}, "likes": [{"user_id": 4}]}
            ]
        }));
        let observation = ObservationNormalizer::new(Some(UserId(3)), "eng")
            .normalize(&record, &UserDirectory::new())
            .unwrap();

        let photographers: Vec<_> = observation
            .pictures
            .iter()
            .map(|p| p.photographer.as_deref().unwrap())
            .collect();
        assert_eq!(photographers, vec!["P1", "P2", "P3"]);

        let liked: Vec<_> = observation
            .pictures
            .iter()
            .map(|p| p.liked_by_current_user)
            .collect();
        assert_eq!(liked, vec![false, true, false]);

        let counts: Vec<_> = observation.pictures.iter().map(|p| p.likes_count).collect();
        assert_eq!(counts, vec![0, 2, 1]);
        assert!(observation.pictures[0].primary);
    }

    #[test]
    fn test_minimal_record_scenario() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "apis mellifera", "all_common_names": {}},
            "location": {"lat": "10.5", "lng": "20.25"},
            "likes": [],
            "comments_count": 0,
            "pictures": []
        }));

        let observation = ObservationNormalizer::new(Some(UserId(3)), "deu")
            .normalize(&record, &UserDirectory::new())
            .unwrap();

        assert_eq!(
            observation,
            Observation {
                id: 1,
                comment: None,
                species_id: 9,
                time: None,
                location: LatLng { lat: 10.5, lng: 20.25 },
                user: None,
                comments_count: Some(0),
                likes_count: 0,
                liked_by_current_user: false,
                pictures: vec![],
                taxon: Taxon {
                    id: 9,
                    scientific_name: "Apis mellifera".to_string(),
                    common_name: "Apis mellifera".to_string(),
                },
            }
        );
    }

    #[test]
    fn test_user_resolution() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "0", "lng": "0"},
            "user_id": 42
        }));
        let mut users = UserDirectory::new();
        users.insert(
            UserId(42),
            UserProfile {
                displayname: Some("Kari".to_string()),
                ..Default::default()
            },
        );

        let normalizer = ObservationNormalizer::default();
        let resolved = normalizer.normalize(&record, &users).unwrap();
        assert_eq!(resolved.user.unwrap().display_name(), "Kari");

        let unresolved = normalizer.normalize(&record, &UserDirectory::new()).unwrap();
        assert!(unresolved.user.is_none());
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            parse_timestamp("2016-05-02T10:15:00.000Z").unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 10, 15, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2016-05-02T12:15:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 10, 15, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2016-05-02 10:15:00").unwrap(),
            Utc.with_ymd_and_hms(2016, 5, 2, 10, 15, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(NormalizationError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_malformed_records() {
        let normalizer = ObservationNormalizer::default();
        let users = UserDirectory::new();

        let no_taxon = raw(json!({"id": 1, "location": {"lat": "0", "lng": "0"}}));
        assert!(matches!(
            normalizer.normalize(&no_taxon, &users),
            Err(NormalizationError::MissingField("taxon"))
        ));

        let no_name = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "all_common_names": {"eng": "Silver fir"}},
            "location": {"lat": "0", "lng": "0"}
        }));
        assert!(matches!(
            normalizer.normalize(&no_name, &users),
            Err(NormalizationError::MissingField("taxon.scientific_name"))
        ));

        let bad_lat = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "north", "lng": "0"}
        }));
        match normalizer.normalize(&bad_lat, &users) {
            Err(NormalizationError::InvalidCoordinate { axis, value }) => {
                assert_eq!(axis, "lat");
                assert_eq!(value, "north");
            }
            other => panic!("expected invalid coordinate, got {other:?}"),
        }

        let no_location = raw(json!({"id": 1, "taxon": {"id": 9, "scientific_name": "abies alba"}}));
        assert!(matches!(
            normalizer.normalize(&no_location, &users),
            Err(NormalizationError::MissingField("location"))
        ));
    }

    #[test]
    fn test_normalization_is_pure() {
        let record = raw(json!({
            "id": 1,
            "comment": "first",
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "1", "lng": "2"},
            "pictures": [{"primary": true, "urls": {"thumb": "t"}, "likes": []}]
        }));
        let snapshot = record.clone();
        let normalizer = ObservationNormalizer::default();
        let users = UserDirectory::new();

        let first = normalizer.normalize(&record, &users).unwrap();
        let mut second = normalizer.normalize(&record, &users).unwrap();
        assert_eq!(first, second);

        second.comment = Some("edited".to_string());
        second.pictures[0].urls.insert("thumb".to_string(), "changed".to_string());
        assert_eq!(record, snapshot);
        assert_ne!(first, second);
    }

    #[test]
    fn test_batch_preserves_order_and_fails_fast() {
        let records: Vec<RawObservation> = (1..=3)
            .map(|id| {
                raw(json!({
                    "id": id,
                    "taxon": {"id": 9, "scientific_name": "abies alba"},
                    "location": {"lat": "0", "lng": "0"}
                }))
            })
            .collect();
        let normalizer = ObservationNormalizer::default();
        let users = UserDirectory::new();

        let ids: Vec<u64> = normalizer
            .normalize_batch(&records, &users)
            .unwrap()
            .iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let mut broken = records.clone();
        broken[1].location = None;
        broken[2].taxon = None;
        match normalizer.normalize_batch(&broken, &users) {
            Err(NormalizationError::BatchElement { index, id, source }) => {
                assert_eq!(index, 1);
                assert_eq!(id, 2);
                assert!(matches!(*source, NormalizationError::MissingField("location")));
            }
            other => panic!("expected batch error, got {other:?}"),
        }

        let issues = normalizer.validate_batch(&broken, &users);
        let bad: Vec<(usize, u64)> = issues.iter().map(|i| (i.index, i.id)).collect();
        assert_eq!(bad, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn test_search_hit_without_taxon_id_is_reported_per_record() {
        let page = crate::schema::ResponseParser::parse_search(
            &json!({
                "hits": [
                    {"_source": {
                        "id": 10,
                        "taxon": {"id": 9, "scientific_name": "abies alba"},
                        "location": {"lat": "0", "lng": "0"},
                        "pictures": [{"primary": null, "likes": null}]
                    }},
                    {"_source": {
                        "id": 11,
                        "taxon": {"scientific_name": "abies alba"},
                        "location": {"lat": "0", "lng": "0"}
                    }}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let normalizer = ObservationNormalizer::default();

        match normalizer.normalize_batch(page.records(), &page.users) {
            Err(NormalizationError::BatchElement { index, id, source }) => {
                assert_eq!((index, id), (1, 11));
                assert!(matches!(*source, NormalizationError::MissingField("taxon.id")));
            }
            other => panic!("expected batch error, got {other:?}"),
        }

        let issues = normalizer.validate_batch(page.records(), &page.users);
        let bad: Vec<(usize, u64)> = issues.iter().map(|i| (i.index, i.id)).collect();
        assert_eq!(bad, vec![(1, 11)]);
    }

    #[test]
    fn test_missing_comment_count_stays_absent() {
        let record = raw(json!({
            "id": 1,
            "taxon": {"id": 9, "scientific_name": "abies alba"},
            "location": {"lat": "0", "lng": "0"}
        }));
        let observation = ObservationNormalizer::default()
            .normalize(&record, &UserDirectory::new())
            .unwrap();
        assert_eq!(observation.comments_count, None);
    }
}
