use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use cookie::{Cookie, SameSite, time::Duration};
use hmac::{Hmac, Mac};
use http::{HeaderMap, HeaderValue, header::COOKIE};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{LoginForm, Session, SignupForm};
use crate::services::identity::IdentityProvider;
use crate::services::validation::check_signup;

pub const SESSION_COOKIE: &str = "__session";

/// Sessions last two weeks.
pub const SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 14;

/// A token can only become a session this soon after its sign-in.
pub const RECENT_SIGN_IN_SECS: i64 = 5 * 60;

type HmacSha256 = Hmac<Sha256>;

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    key: Vec<u8>,
    secure: bool,
}

impl SessionManager {
    pub fn new(identity: Arc<dyn IdentityProvider>, key: Vec<u8>, secure: bool) -> Self {
        Self {
            identity,
            key,
            secure,
        }
    }

    pub async fn login(&self, form: &LoginForm) -> Result<(Session, HeaderValue), AppError> {
        let id_token = self.identity.sign_in(&form.email, &form.password).await?;
        self.create_session(&id_token).await
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<(Session, HeaderValue), AppError> {
        let errors = check_signup(form);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        let email = form.email.as_deref().unwrap_or_default();
        let password = form.password.as_deref().unwrap_or_default();

        let id_token = self.identity.sign_up(email, password).await?;
        info!(email, "account created");
        self.create_session(&id_token).await
    }

    /// Exchanges a fresh id token for a signed session cookie.
    pub async fn create_session(&self, id_token: &str) -> Result<(Session, HeaderValue), AppError> {
        self.create_session_at(id_token, Utc::now().timestamp()).await
    }

    async fn create_session_at(
        &self,
        id_token: &str,
        now: i64,
    ) -> Result<(Session, HeaderValue), AppError> {
        let verified = self.identity.verify(id_token).await?;
        if now - verified.auth_time > RECENT_SIGN_IN_SECS {
            info!(uid = %verified.uid, "refusing session for a stale sign-in");
            return Err(AppError::RecentSignInRequired);
        }

        let session = Session {
            uid: verified.uid,
            email: verified.email,
            token: id_token.to_string(),
            auth_time: verified.auth_time,
            expires_at: now + SESSION_TTL_SECS,
        };
        let value = self.encode(&session)?;
        let header = self.cookie_header(value, SESSION_TTL_SECS)?;
        info!(uid = %session.uid, "session created");
        Ok((session, header))
    }

    /// Returns the session carried by the request, if it is present, authentic and unexpired.
    pub fn read_session(&self, headers: &HeaderMap) -> Option<Session> {
        self.read_session_at(headers, Utc::now().timestamp())
    }

    fn read_session_at(&self, headers: &HeaderMap, now: i64) -> Option<Session> {
        let value = cookie_value(headers, SESSION_COOKIE)?;
        let session = self.decode(&value)?;
        if session.expires_at <= now {
            debug!(uid = %session.uid, "session cookie expired");
            return None;
        }
        Some(session)
    }

    /// A `Set-Cookie` value that removes the session cookie.
    pub fn destroy_session(&self) -> Result<HeaderValue, AppError> {
        let mut cookie = self.session_cookie(String::new(), 0);
        cookie.make_removal();
        to_header(&cookie)
    }

    fn mac(&self) -> Result<HmacSha256, AppError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::from(anyhow::anyhow!("session key rejected by HMAC: {e}")))
    }

    fn encode(&self, session: &Session) -> Result<String, AppError> {
        let json = serde_json::to_vec(session).context("serializing session")?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    fn decode(&self, value: &str) -> Option<Session> {
        let (payload, signature) = value.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            debug!("session cookie signature mismatch");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    fn session_cookie(&self, value: String, max_age: i64) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::seconds(max_age))
            .build()
    }

    fn cookie_header(&self, value: String, max_age: i64) -> Result<HeaderValue, AppError> {
        to_header(&self.session_cookie(value, max_age))
    }
}

fn to_header(cookie: &Cookie<'_>) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&cookie.to_string())
        .context("session cookie is not a valid header value")
        .map_err(AppError::from)
}

/// Finds a cookie by name across every `Cookie` header of a request.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value_trimmed().to_string())
}
