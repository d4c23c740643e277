//! Biocaching API client
//!
//! This module provides the public API of the SDK. [`Biocaching`] owns the
//! caller's [`SessionStore`], describes each endpoint as an [`ApiRequest`],
//! hands it to the injected [`Transport`] and runs observation payloads
//! through the [`ObservationNormalizer`] before returning them.
//!
//! Every request carries the API key; all endpoints except sign-in also carry
//! the signed-in user's email and token, and fail with
//! [`ClientError::NotAuthorized`] before any I/O when nobody is signed in.

use crate::config::ClientConfig;
use crate::error::{ClientError, NormalizationError, SessionError};
use crate::normalizer::ObservationNormalizer;
use crate::schema::{
    LoginResponse, ObservationResponse, RawObservation, SearchResponse, TermsResponse,
    TermsStatusResponse,
};
use crate::session::SessionStore;
use crate::storage::KeyValueStore;
use crate::transport::{ApiRequest, FormField, FormValue, Method, RequestBody, Transport};
use crate::types::{
    AuthState, NewObservation, Observation, ObservationEdit, PictureUpload, Session,
    UserDirectory, UserId,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const API_KEY_HEADER: &str = "X-User-Api-Key";

/// Client for the Biocaching API
pub struct Biocaching<T, S> {
    config: ClientConfig,
    transport: T,
    sessions: SessionStore<S>,
}

impl<T: Transport, S: KeyValueStore> Biocaching<T, S> {
    /// Create a client, seeding the language preference and restoring any
    /// persisted login from `store`
    pub fn new(config: ClientConfig, transport: T, store: S) -> Result<Self, ClientError> {
        let sessions = SessionStore::open(store, config.default_language())?;
        Ok(Self {
            config,
            transport,
            sessions,
        })
    }

    /// Re-read the persisted session
    pub fn restore_session(&mut self) -> AuthState {
        self.sessions.restore()
    }

    pub fn session(&self) -> &Session {
        self.sessions.session()
    }

    pub fn is_authorized(&self) -> bool {
        self.sessions.is_authorized()
    }

    pub fn sessions(&self) -> &SessionStore<S> {
        &self.sessions
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Persist an explicit language choice for taxon names
    pub fn set_language(&mut self, language: &str) -> Result<(), ClientError> {
        self.sessions.set_language(language)?;
        Ok(())
    }

    /// Sign in and persist the resulting session
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Session, ClientError> {
        let body = json!({
            "user": {
                "email": username,
                "password": password,
            }
        });
        let request = self.request(Method::Post, "users/sign_in", RequestBody::Json(body), false)?;
        let response = self.transport.send(request).await?;

        let login: LoginResponse = match serde_json::from_value(response.clone()) {
            Ok(login) => login,
            Err(e) => {
                tracing::warn!(error = %e, "unrecognized sign-in response");
                return Err(ClientError::LoginRejected(response));
            }
        };
        match self.sessions.apply_login_result(&login) {
            Ok(session) => Ok(session.clone()),
            Err(SessionError::IncompleteLogin(field)) => {
                tracing::warn!(field, "sign-in response carries no session");
                Err(ClientError::LoginRejected(response))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Forget the signed-in user
    pub fn logout(&mut self) -> Result<(), ClientError> {
        self.sessions.logout()?;
        Ok(())
    }

    /// Normalizer bound to the current user and language
    pub fn normalizer(&self) -> ObservationNormalizer {
        ObservationNormalizer::new(self.sessions.user_id(), self.sessions.language())
    }

    /// Normalize a raw observation for the current session
    pub fn normalize(
        &self,
        raw: &RawObservation,
        users: &UserDirectory,
    ) -> Result<Observation, NormalizationError> {
        self.normalizer().normalize(raw, users)
    }

    /// Normalize a listing for the current session
    pub fn normalize_batch(
        &self,
        raws: &[RawObservation],
        users: &UserDirectory,
    ) -> Result<Vec<Observation>, NormalizationError> {
        self.normalizer().normalize_batch(raws, users)
    }

    pub async fn user_settings(&self) -> Result<Value, ClientError> {
        self.call(Method::Get, "settings", RequestBody::Empty).await
    }

    pub async fn update_user_settings(&self, settings: &Value) -> Result<Value, ClientError> {
        self.call(Method::Put, "settings", RequestBody::Json(settings.clone()))
            .await
    }

    /// Fetch one observation
    pub async fn observation(&self, id: u64) -> Result<Observation, ClientError> {
        let response: ObservationResponse = self
            .call_as(Method::Get, &format!("observations/{id}"), RequestBody::Empty)
            .await?;
        Ok(self.normalize(&response.observation, &response.users)?)
    }

    /// Upload a new observation with its photo
    pub async fn upload_observation(&self, observation: &NewObservation) -> Result<Value, ClientError> {
        let fields = vec![
            picture_field(&observation.picture),
            FormField::text("observation[taxon_id]", observation.taxon_id),
            FormField::text("observation[observed_at]", observation.observed_at.to_rfc3339()),
            FormField::text("observation[latitude]", observation.latitude),
            FormField::text("observation[longitude]", observation.longitude),
        ];
        self.call(Method::Post, "observations", RequestBody::Form(fields))
            .await
    }

    /// Change an existing observation, sending only the fields that are set
    pub async fn edit_observation(&self, id: u64, edit: &ObservationEdit) -> Result<Value, ClientError> {
        if edit.is_empty() {
            return Err(ClientError::EmptyEdit);
        }

        let mut fields = Vec::new();
        if let Some(picture) = &edit.picture {
            fields.push(picture_field(picture));
        }
        if let Some(taxon_id) = edit.taxon_id {
            fields.push(FormField::text("observation[taxon_id]", taxon_id));
        }
        if let Some(observed_at) = edit.observed_at {
            fields.push(FormField::text("observation[observed_at]", observed_at.to_rfc3339()));
        }
        if let Some(position) = edit.position {
            fields.push(FormField::text("observation[latitude]", position.lat));
            fields.push(FormField::text("observation[longitude]", position.lng));
        }

        self.call(Method::Put, &format!("observations/{id}"), RequestBody::Form(fields))
            .await
    }

    /// Page through all observations
    pub async fn observations(&self, from: u32, size: u32) -> Result<Vec<Observation>, ClientError> {
        self.search(&format!("from={from}&size={size}")).await
    }

    /// Page through one user's observations
    pub async fn observations_by_user(
        &self,
        user: UserId,
        from: u32,
        size: u32,
    ) -> Result<Vec<Observation>, ClientError> {
        self.search(&format!("user_id={user}&from={from}&size={size}"))
            .await
    }

    /// Observations within `distance` meters of a point
    pub async fn observations_by_distance(
        &self,
        distance: f64,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<Observation>, ClientError> {
        self.search(&format!("latitude={lat}&longitude={lon}&distance={distance}"))
            .await
    }

    pub async fn delete_observation(&self, id: u64) -> Result<Value, ClientError> {
        self.call(Method::Delete, &format!("observations/{id}"), RequestBody::Empty)
            .await
    }

    /// Terms of use as one numbered HTML fragment
    pub async fn terms(&self) -> Result<String, ClientError> {
        let terms: TermsResponse = self.call_as(Method::Get, "terms/", RequestBody::Empty).await?;
        Ok(terms.to_html())
    }

    /// Whether the signed-in user has accepted the terms
    pub async fn terms_status(&self) -> Result<bool, ClientError> {
        let status: TermsStatusResponse = self
            .call_as(Method::Get, "terms/status", RequestBody::Empty)
            .await?;
        Ok(status.is_accepted())
    }

    pub async fn accept_terms(&self) -> Result<Value, ClientError> {
        self.call(Method::Get, "terms/accept", RequestBody::Empty).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Observation>, ClientError> {
        let response: SearchResponse = self
            .call_as(Method::Get, &format!("observations/?{query}"), RequestBody::Empty)
            .await?;
        Ok(self
            .normalizer()
            .normalize_batch(response.records(), &response.users)?)
    }

    async fn call_as<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<R, ClientError> {
        let value = self.call(method, path, body).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call(&self, method: Method, path: &str, body: RequestBody) -> Result<Value, ClientError> {
        let request = self.request(method, path, body, true)?;
        Ok(self.transport.send(request).await?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        authenticated: bool,
    ) -> Result<ApiRequest, ClientError> {
        let mut headers = vec![
            (API_KEY_HEADER.to_string(), self.config.api_key().to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        // reqwest sets the multipart boundary itself
        if !matches!(body, RequestBody::Form(_)) {
            headers.push(("Content-type".to_string(), "application/json".to_string()));
        }
        if authenticated {
            let auth = self.sessions.auth_headers().ok_or(ClientError::NotAuthorized)?;
            headers.extend(auth.into_iter().map(|(name, value)| (name.to_string(), value)));
        }

        tracing::debug!(method = method.as_str(), path, "api request");
        Ok(ApiRequest {
            method,
            url: self.config.url(path),
            headers,
            body,
        })
    }
}

fn picture_field(picture: &PictureUpload) -> FormField {
    FormField {
        name: "observation[picture]".to_string(),
        value: FormValue::File {
            file_name: picture.file_name.clone(),
            mime_type: picture.mime_type.clone(),
            bytes: picture.bytes.clone(),
        },
    }
}
