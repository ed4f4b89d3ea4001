//! # Auth Gateway
//!
//! Credential check, failed attempt bookkeeping and the session cookie.
//!
//! ## Client identity
//!
//! Best effort, first header wins:
//! - `x-forwarded-for` (first entry)
//! - `x-real-ip`
//! - `cf-connecting-ip`
//!
//! Without any of them every client shares the `unknown` bucket.
//!
//! ## Failed attempts
//!
//! - Counted per client identity for the life of the process, never evicted
//! - Advisory only, the credential is always checked
//! - From the 5th consecutive failure the response points to an administrator
//! - A valid credential resets the counter
//!
//! ## Session
//!
//! The cookie holds the URL encoded person name, nothing else. No signature, no server side table, whoever
//! presents the cookie is that person. HttpOnly + SameSite=Lax, 7 days, whole site.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use axum::http::{HeaderMap, header::COOKIE};
use cookie::{Cookie, SameSite, time::Duration};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{error, info, warn};

use crate::{error::AppError, store::AssignmentStore};

pub const SESSION_COOKIE: &str = "secretSantaUser";
pub const SESSION_MAX_AGE: i64 = 7 * 24 * 60 * 60;
pub const LOCKOUT_THRESHOLD: u32 = 5;
pub const UNKNOWN_CLIENT: &str = "unknown";

const CLIENT_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

// Same unreserved set as JavaScript's encodeURIComponent.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub person: String,
    pub giftee: String,
}

#[derive(Default)]
pub struct FailedAttempts {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailedAttempts {
    pub fn record_failure(&self, client: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);

        let count = counts.entry(client.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&self, client: &str) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client);
    }

    pub fn count(&self, client: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client)
            .copied()
            .unwrap_or(0)
    }
}

pub struct AuthGateway {
    store: Arc<AssignmentStore>,
    attempts: FailedAttempts,
}

impl AuthGateway {
    pub fn new(store: Arc<AssignmentStore>) -> Self {
        Self {
            store,
            attempts: FailedAttempts::default(),
        }
    }

    pub fn attempts(&self) -> &FailedAttempts {
        &self.attempts
    }

    pub async fn verify(&self, client: &str, credential: &str) -> Result<Session, AppError> {
        let Some(person) = self.store.person_for_credential(credential).await else {
            let attempts = self.attempts.record_failure(client);
            warn!("Failed credential attempt {attempts} from {client}");

            return Err(if attempts >= LOCKOUT_THRESHOLD {
                AppError::CredentialLockout { attempts }
            } else {
                AppError::InvalidCredential { attempts }
            });
        };

        self.attempts.reset(client);

        let Some(giftee) = self.store.giftee_of(&person).await else {
            error!("Integrity bug: {person} holds a valid credential but has no assignment");
            return Err(AppError::MissingAssignment(person));
        };

        info!("{person} verified from {client}");
        Ok(Session { person, giftee })
    }
}

pub fn client_identity(headers: &HeaderMap) -> String {
    CLIENT_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or_default().trim())
        .find(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

pub fn session_cookie(person: &str) -> Cookie<'static> {
    let value = utf8_percent_encode(person, COMPONENT).to_string();

    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .max_age(Duration::seconds(SESSION_MAX_AGE))
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Person named by the session cookie. Values that do not decode to UTF-8 count as no session.
pub fn session_person(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|person| !person.is_empty())
        .ok_or(AppError::NotAuthenticated)
}
