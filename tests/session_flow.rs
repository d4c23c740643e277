//! End-to-end flow: sign in, restart from the persisted file, list, normalize

use async_trait::async_trait;
use biocaching::schema::ResponseParser;
use biocaching::{
    ApiRequest, Biocaching, ClientConfig, ClientError, FileStore, KeyValueStore,
    ObservationNormalizer, Transport, TransportError, UserId,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

struct CannedTransport {
    responses: Mutex<VecDeque<Value>>,
    urls: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        self.urls.lock().unwrap().push(request.url);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Request("unexpected request".to_string()))
    }
}

fn search_page() -> Value {
    json!({
        "hits": [
            {"_source": {
                "id": 11,
                "comment": "under a stone",
                "taxon": {
                    "id": 61057,
                    "scientific_name": "bufo bufo",
                    "all_common_names": {"eng": "Common toad", "nob": "Padde"}
                },
                "observed_at": "2016-05-02T10:15:00Z",
                "location": {"lat": 59.91, "lng": 10.75},
                "likes": [{"user_id": 7}],
                "user_id": 7
            }},
            {"_source": {
                "id": 12,
                "taxon": {"id": 3, "scientific_name": "picea abies", "all_common_names": {"eng": null}},
                "location": {"lat": "60.1", "lon": "11.2"},
                "user_id": 8
            }}
        ],
        "users": {"7": {"displayname": "Ada"}}
    })
}

#[tokio::test]
async fn test_login_persist_restart_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let login = json!({
        "id": 7,
        "email": "ada@example.org",
        "authentication_token": "tok-123",
        "displayname": "Ada"
    });
    let mut client = Biocaching::new(
        ClientConfig::new("key").with_language("nob"),
        CannedTransport::new(vec![login]),
        FileStore::open(&path).unwrap(),
    )
    .unwrap();
    client.login("ada@example.org", "secret").await.unwrap();
    drop(client);

    // A fresh process picks the session up from disk
    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get("token").as_deref(), Some("tok-123"));

    let client = Biocaching::new(
        ClientConfig::new("key"),
        CannedTransport::new(vec![search_page()]),
        store,
    )
    .unwrap();
    assert!(client.is_authorized());
    assert_eq!(client.session().user_id, Some(UserId(7)));
    assert_eq!(client.session().language, "nob");

    let observations = client.observations(0, 2).await.unwrap();
    assert_eq!(observations.len(), 2);

    let toad = &observations[0];
    assert_eq!(toad.taxon.common_name, "Padde");
    assert!(toad.liked_by_current_user);
    assert_eq!(toad.user.as_ref().map(|u| u.display_name()), Some("Ada".to_string()));
    assert!(toad.time.is_some());

    let spruce = &observations[1];
    assert_eq!(spruce.taxon.scientific_name, "Picea abies");
    assert_eq!(spruce.taxon.common_name, "Picea abies");
    assert_eq!(spruce.location.lng, 11.2);
    assert!(spruce.user.is_none());
    assert!(spruce.time.is_none());

    assert_eq!(
        client.transport().urls.lock().unwrap().as_slice(),
        ["https://api.biocaching.com/observations/?from=0&size=2"]
    );
}

#[tokio::test]
async fn test_logout_keeps_language_and_blocks_calls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(
        &path,
        r#"{"email": "ada@example.org", "token": "tok", "userId": "7", "language": "deu"}"#,
    )
    .unwrap();

    let mut client = Biocaching::new(
        ClientConfig::new("key"),
        CannedTransport::new(Vec::new()),
        FileStore::open(&path).unwrap(),
    )
    .unwrap();
    assert!(client.is_authorized());

    client.logout().unwrap();
    assert!(matches!(
        client.observations(0, 10).await,
        Err(ClientError::NotAuthorized)
    ));

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.get("token"), None);
    assert_eq!(reopened.get("language").as_deref(), Some("deu"));
}

#[test]
fn test_offline_normalization_of_saved_response() {
    let response = ResponseParser::parse_search(&search_page().to_string()).unwrap();
    let normalizer = ObservationNormalizer::new(None, "eng");

    let observations = normalizer
        .normalize_batch(response.records(), &response.users)
        .unwrap();
    assert_eq!(observations[0].taxon.common_name, "Common toad");
    assert!(!observations[0].liked_by_current_user);
    assert!(normalizer
        .validate_batch(response.records(), &response.users)
        .is_empty());
}
