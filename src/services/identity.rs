use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::IdentityError;
use crate::models::VerifiedToken;

/// A third-party service that checks credentials and issues id tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns an id token for an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, IdentityError>;

    /// Creates an account and returns its first id token.
    async fn sign_up(&self, email: &str, password: &str) -> Result<String, IdentityError>;

    async fn verify(&self, id_token: &str) -> Result<VerifiedToken, IdentityError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    auth_time: i64,
}

/// Reads the `auth_time` claim from a JWT payload. The signature is not
/// checked here; `verify` only calls this after the provider accepted the token.
pub fn auth_time_claim(id_token: &str) -> Result<i64, IdentityError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| IdentityError::Malformed("id token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdentityError::Malformed(format!("id token payload: {e}")))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| IdentityError::Malformed(format!("id token claims: {e}")))?;
    Ok(claims.auth_time)
}

/// Pulls the provider's message out of an error body, falling back to the raw text.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ProviderError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Client for the Firebase Identity Toolkit REST API.
pub struct FirebaseIdentity {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl FirebaseIdentity {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        FirebaseIdentity {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/accounts:{method}", self.api_url)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T, IdentityError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            let message = provider_message(&response_text);
            tracing::info!(method, status = status.as_u16(), %message, "identity provider rejected request");
            return Err(IdentityError::Rejected(message));
        }

        serde_json::from_str(&response_text)
            .map_err(|e| IdentityError::Malformed(format!("{method} response: {e}")))
    }

    async fn password_call(
        &self,
        method: &str,
        email: &str,
        password: &str,
    ) -> Result<String, IdentityError> {
        let request = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: TokenResponse = self.call(method, &request).await?;
        Ok(response.id_token)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, IdentityError> {
        self.password_call("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<String, IdentityError> {
        self.password_call("signUp", email, password).await
    }

    async fn verify(&self, id_token: &str) -> Result<VerifiedToken, IdentityError> {
        let response: LookupResponse = self.call("lookup", &json!({ "idToken": id_token })).await?;
        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Rejected("USER_NOT_FOUND".to_string()))?;

        Ok(VerifiedToken {
            uid: user.local_id,
            email: user.email,
            auth_time: auth_time_claim(id_token)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn reads_auth_time_from_payload() {
        let token = jwt(json!({ "sub": "u1", "auth_time": 1_700_000_000 }));
        assert_eq!(auth_time_claim(&token).unwrap(), 1_700_000_000);
    }

    #[test]
    fn rejects_tokens_without_auth_time() {
        let token = jwt(json!({ "sub": "u1" }));
        assert!(matches!(auth_time_claim(&token), Err(IdentityError::Malformed(_))));
        assert!(matches!(auth_time_claim("opaque"), Err(IdentityError::Malformed(_))));
    }

    #[test]
    fn provider_message_is_extracted() {
        let body = r#"{"error":{"code":400,"message":"INVALID_PASSWORD","errors":[]}}"#;
        assert_eq!(provider_message(body), "INVALID_PASSWORD");
        assert_eq!(provider_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn password_request_uses_provider_field_names() {
        let request = PasswordRequest {
            email: "reader@example.com",
            password: "hunter22",
            return_secure_token: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "email": "reader@example.com", "password": "hunter22", "returnSecureToken": true })
        );
    }

    #[test]
    fn endpoints_follow_the_accounts_namespace() {
        let identity = FirebaseIdentity::new("https://identitytoolkit.googleapis.com/v1/", "k");
        assert_eq!(
            identity.endpoint("signInWithPassword"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword"
        );
    }
}
