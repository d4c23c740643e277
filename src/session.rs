//! Session management
//!
//! [`SessionStore`] is the single source of truth for who the caller is and
//! whether they are authenticated. It mirrors its state into a
//! [`KeyValueStore`] so a login survives process restarts.
//!
//! A persisted session is all-or-nothing: if any of email, token or user id is
//! missing, every identity key is wiped and the caller is unauthenticated.
//! The language preference is kept apart from identity and survives both
//! that wipe and logout.

use crate::error::SessionError;
use crate::schema::LoginResponse;
use crate::storage::KeyValueStore;
use crate::types::{display_name_from, AuthState, Session, UserId};

/// Storage keys
pub mod keys {
    pub const EMAIL: &str = "email";
    pub const TOKEN: &str = "token";
    pub const USER_ID: &str = "userId";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const PICTURE: &str = "picture";
    pub const LANGUAGE: &str = "language";

    /// Keys describing the signed-in user
    pub const IDENTITY: [&str; 5] = [EMAIL, TOKEN, USER_ID, DISPLAY_NAME, PICTURE];
}

/// Persisted session state
#[derive(Debug)]
pub struct SessionStore<S> {
    store: S,
    session: Session,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Wrap a store without reading it
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: Session::default(),
        }
    }

    /// Seed the language preference and restore any persisted login
    pub fn open(store: S, default_language: &str) -> Result<Self, SessionError> {
        let mut sessions = Self::new(store);
        sessions.ensure_language(default_language)?;
        sessions.restore();
        Ok(sessions)
    }

    /// Reload identity from the store.
    ///
    /// Never fails: an incomplete or unreadable session is wiped and reported
    /// as unauthorized.
    pub fn restore(&mut self) -> AuthState {
        let read = |key: &str| self.store.get(key).filter(|v| !v.is_empty());

        self.session.email = read(keys::EMAIL);
        self.session.token = read(keys::TOKEN);
        self.session.user_id = read(keys::USER_ID).and_then(|id| id.parse::<UserId>().ok());
        self.session.display_name = read(keys::DISPLAY_NAME);
        self.session.picture = read(keys::PICTURE);

        if self.session.is_authorized() {
            tracing::debug!(user_id = ?self.session.user_id, "restored persisted session");
            return AuthState { authorized: true };
        }

        let stale = keys::IDENTITY
            .iter()
            .any(|key| self.store.get(key).is_some());
        if stale {
            tracing::warn!("persisted session is incomplete, clearing it");
        }
        self.wipe_identity();
        AuthState { authorized: false }
    }

    /// Adopt the persisted language, or persist `default_language` on first run.
    ///
    /// Once a language is stored, later defaults are ignored.
    pub fn ensure_language(&mut self, default_language: &str) -> Result<&str, SessionError> {
        match self.store.get(keys::LANGUAGE).filter(|l| !l.is_empty()) {
            Some(language) => self.session.language = language,
            None => {
                self.store.set(keys::LANGUAGE, default_language)?;
                self.session.language = default_language.to_string();
            }
        }
        Ok(&self.session.language)
    }

    /// Persist an explicit language choice
    pub fn set_language(&mut self, language: &str) -> Result<(), SessionError> {
        self.store.set(keys::LANGUAGE, language)?;
        self.session.language = language.to_string();
        Ok(())
    }

    /// Commit a successful sign-in response
    pub fn apply_login_result(&mut self, response: &LoginResponse) -> Result<&Session, SessionError> {
        let user_id = response.id.ok_or(SessionError::IncompleteLogin("id"))?;
        let email = non_empty(&response.email).ok_or(SessionError::IncompleteLogin("email"))?;
        let token = non_empty(&response.authentication_token)
            .ok_or(SessionError::IncompleteLogin("authentication_token"))?;

        let display_name = display_name_from(
            response.displayname.as_deref(),
            response.firstname.as_deref(),
            response.lastname.as_deref(),
        );
        let picture = response.picture.as_ref().and_then(|p| p.thumb.clone());

        self.store.set(keys::EMAIL, email)?;
        self.store.set(keys::TOKEN, token)?;
        self.store.set(keys::USER_ID, &user_id.to_string())?;
        self.store.set(keys::DISPLAY_NAME, &display_name)?;
        match &picture {
            Some(thumb) => self.store.set(keys::PICTURE, thumb)?,
            None => self.store.remove(keys::PICTURE)?,
        }

        self.session.email = Some(email.to_string());
        self.session.token = Some(token.to_string());
        self.session.user_id = Some(user_id);
        self.session.display_name = Some(display_name);
        self.session.picture = picture;

        tracing::info!(%user_id, "signed in");
        Ok(&self.session)
    }

    /// Forget the signed-in user, keeping the language preference
    pub fn logout(&mut self) -> Result<(), SessionError> {
        for key in keys::IDENTITY {
            self.store.remove(key)?;
        }
        self.session.clear_identity();
        tracing::info!("signed out");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authorized(&self) -> bool {
        self.session.is_authorized()
    }

    pub fn language(&self) -> &str {
        &self.session.language
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.session.user_id
    }

    /// `X-User-Email` / `X-User-Token` headers, when authorized
    pub fn auth_headers(&self) -> Option<[(&'static str, String); 2]> {
        if !self.is_authorized() {
            return None;
        }
        Some([
            ("X-User-Email", self.session.email.clone()?),
            ("X-User-Token", self.session.token.clone()?),
        ])
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn wipe_identity(&mut self) {
        for key in keys::IDENTITY {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove stale session key");
            }
        }
        self.session.clear_identity();
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
