use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::config::Admin;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "admin_session";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("malformed session token")]
    Malformed,
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("invalid session key")]
    InvalidKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn { email: String },
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn { .. })
    }
}

#[derive(Clone)]
pub struct SessionGate {
    email: String,
    password: String,
    mac: HmacSha256,
    ttl: Duration,
}

impl fmt::Debug for SessionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGate")
            .field("email", &self.email)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionGate {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        secret: &[u8],
        ttl: Duration,
    ) -> Result<Self, SessionError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SessionError::InvalidKey)?;
        Ok(Self {
            email: email.into(),
            password: password.into(),
            mac,
            ttl,
        })
    }

    /// Build from the admin config section. Without a configured secret a
    /// random one is generated, so sessions end when the process restarts.
    pub fn from_config(admin: &Admin) -> Result<Self, SessionError> {
        let secret = if admin.session_secret.is_empty() {
            warn!("admin.session_secret is not set; using a random key for this run");
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            key.to_vec()
        } else {
            admin.session_secret.as_bytes().to_vec()
        };
        Self::new(
            &admin.email,
            &admin.password,
            &secret,
            Duration::days(i64::from(admin.session_ttl_days)),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check credentials and issue a token on success.
    pub fn sign_in(&self, email: &str, password: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        if email != self.email || password != self.password {
            return Err(SessionError::InvalidCredentials);
        }
        Ok(self.issue(now))
    }

    /// `base64url("{email}:{issued_unix}") "." hex(hmac_sha256(payload))`
    pub fn issue(&self, now: DateTime<Utc>) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!("{}:{}", self.email, now.timestamp()));
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("{payload}.{sig}")
    }

    /// Email of a valid, unexpired token for the configured admin.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let (payload, sig) = token.split_once('.').ok_or(SessionError::Malformed)?;
        let sig = hex::decode(sig).map_err(|_| SessionError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig)
            .map_err(|_| SessionError::BadSignature)?;

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| SessionError::Malformed)?;
        let (email, issued) = decoded.rsplit_once(':').ok_or(SessionError::Malformed)?;
        let issued: i64 = issued.parse().map_err(|_| SessionError::Malformed)?;
        let issued = DateTime::from_timestamp(issued, 0).ok_or(SessionError::Malformed)?;

        // A rotated admin email invalidates older sessions.
        if email != self.email {
            return Err(SessionError::BadSignature);
        }
        match issued.checked_add_signed(self.ttl) {
            Some(expires) if now < expires => {}
            _ => return Err(SessionError::Expired),
        }
        Ok(email.to_string())
    }

    /// Session state carried by the request's cookie.
    pub fn state(&self, headers: &HeaderMap, now: DateTime<Utc>) -> SessionState {
        match cookie_value(headers, SESSION_COOKIE).map(|token| self.verify(token, now)) {
            Some(Ok(email)) => SessionState::SignedIn { email },
            _ => SessionState::SignedOut,
        }
    }

    /// `Set-Cookie` value carrying `token`.
    pub fn cookie(&self, token: &str, secure: bool) -> String {
        session_cookie(token, self.ttl.num_seconds(), secure)
    }
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

/// First value of cookie `name` across the request's `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
