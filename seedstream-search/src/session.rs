//! Tracker login session shared by every request.
//!
//! The tracker uses a form login that answers with `Set-Cookie`. The
//! cookie pairs are kept together with an expiry taken from `Expires` or
//! `Max-Age`, falling back to the configured session lifetime. A session
//! within one second of expiry is treated as expired.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use seedstream_core::config::TrackerConfig;
use tokio::sync::Mutex;

use crate::errors::SourceError;

const EXPIRY_MARGIN_SECS: i64 = 1;

/// Cookie header value and the moment it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSession {
    /// Value for the `Cookie` request header
    pub cookie: String,
    /// Expiry of the session
    pub expires_at: DateTime<Utc>,
}

impl CredentialSession {
    /// Checks validity at `now`, with a one second safety margin.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    /// Builds a session from the `Set-Cookie` values of a login response.
    ///
    /// Returns `None` when no cookie pair is present. The earliest expiry
    /// across all cookies wins.
    pub fn from_set_cookie_headers<'a>(
        headers: impl IntoIterator<Item = &'a str>,
        now: DateTime<Utc>,
        default_ttl: std::time::Duration,
    ) -> Option<Self> {
        let fallback = ChronoDuration::from_std(default_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or_else(|| now + ChronoDuration::hours(1));

        let mut pairs = Vec::new();
        let mut expires_at: Option<DateTime<Utc>> = None;

        for header in headers {
            let mut parts = header.split(';').map(str::trim);
            let Some(pair) = parts.next().filter(|pair| pair.contains('=')) else {
                continue;
            };
            pairs.push(pair.to_string());

            let mut cookie_expiry = None;
            for attribute in parts {
                let (name, value) = attribute.split_once('=').unwrap_or((attribute, ""));
                if name.eq_ignore_ascii_case("max-age") {
                    // Max-Age takes precedence over Expires
                    if let Ok(seconds) = value.trim().parse::<i64>() {
                        let expiry = ChronoDuration::try_seconds(seconds)
                            .and_then(|max_age| now.checked_add_signed(max_age));
                        cookie_expiry = Some(expiry.unwrap_or(fallback));
                        break;
                    }
                } else if name.eq_ignore_ascii_case("expires")
                    && let Some(parsed) = parse_cookie_date(value.trim())
                {
                    cookie_expiry = Some(parsed);
                }
            }

            if let Some(expiry) = cookie_expiry {
                expires_at = Some(expires_at.map_or(expiry, |current| current.min(expiry)));
            }
        }

        if pairs.is_empty() {
            return None;
        }

        Some(Self {
            cookie: pairs.join("; "),
            expires_at: expires_at.unwrap_or(fallback),
        })
    }
}

fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d %b %Y %H:%M:%S GMT"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Lazily logs in and hands out the shared session cookie.
///
/// The lock is held across the login request so concurrent callers that
/// find the session expired trigger a single re-login.
#[derive(Debug)]
pub struct SessionManager {
    client: reqwest::Client,
    login_url: String,
    source_name: String,
    username: String,
    password: String,
    session_ttl: std::time::Duration,
    session: Mutex<Option<CredentialSession>>,
}

impl SessionManager {
    /// Creates a manager for the configured tracker.
    ///
    /// # Errors
    ///
    /// - `SourceError::SourceUnavailable` - HTTP client could not be built
    pub fn new(config: &TrackerConfig) -> Result<Self, SourceError> {
        // Redirects stay visible so Set-Cookie on a 302 is not lost
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| SourceError::SourceUnavailable {
                source_name: config.source_name.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            login_url: format!("{}/login", config.base_url.trim_end_matches('/')),
            source_name: config.source_name.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            session_ttl: config.session_ttl,
            session: Mutex::new(None),
        })
    }

    /// Returns a valid cookie, logging in first if needed.
    ///
    /// # Errors
    ///
    /// - `SourceError::AuthenticationFailed` - Login rejected or no cookie returned
    /// - `SourceError::SourceUnavailable` - Tracker unreachable or timed out
    pub async fn cookie(&self) -> Result<String, SourceError> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref()
            && current.is_valid_at(Utc::now())
        {
            return Ok(current.cookie.clone());
        }

        tracing::debug!("Logging in to {}", self.source_name);
        let fresh = self.login().await?;
        let cookie = fresh.cookie.clone();
        *session = Some(fresh);
        Ok(cookie)
    }

    /// Drops the cached session so the next call logs in again.
    pub async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    async fn login(&self) -> Result<CredentialSession, SourceError> {
        let params = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let response = self
            .client
            .post(&self.login_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| SourceError::SourceUnavailable {
                source_name: self.source_name.clone(),
                reason: if e.is_timeout() {
                    "login timed out".to_string()
                } else {
                    format!("login request failed: {e}")
                },
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SourceError::SourceUnavailable {
                source_name: self.source_name.clone(),
                reason: format!("login answered {status}"),
            });
        }
        if !(status.is_success() || status.is_redirection()) {
            return Err(SourceError::AuthenticationFailed {
                source_name: self.source_name.clone(),
                reason: format!("login answered {status}"),
            });
        }

        let set_cookies = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());

        let session =
            CredentialSession::from_set_cookie_headers(set_cookies, Utc::now(), self.session_ttl)
                .ok_or_else(|| SourceError::AuthenticationFailed {
                    source_name: self.source_name.clone(),
                    reason: "login response carried no session cookie".to_string(),
                })?;
        if !session.is_valid_at(Utc::now()) {
            return Err(SourceError::AuthenticationFailed {
                source_name: self.source_name.clone(),
                reason: format!("login issued a session expiring at {}", session.expires_at),
            });
        }

        tracing::info!(
            "Logged in to {}, session valid until {}",
            self.source_name,
            session.expires_at
        );
        Ok(session)
    }
}
