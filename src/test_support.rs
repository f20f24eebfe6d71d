use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::IdentityError;
use crate::models::VerifiedToken;
use crate::services::identity::IdentityProvider;

/// Identity provider double: accepts every credential, or rejects every one.
pub struct StaticIdentity {
    auth_time: i64,
    rejection: Option<String>,
    calls: AtomicUsize,
}

impl StaticIdentity {
    pub fn signed_in_at(auth_time: i64) -> Self {
        StaticIdentity {
            auth_time,
            rejection: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        StaticIdentity {
            auth_time: 0,
            rejection: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn token(&self, email: &str) -> Result<String, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.rejection {
            Some(message) => Err(IdentityError::Rejected(message.clone())),
            None => Ok(format!("token-for-{email}")),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn sign_in(&self, email: &str, _password: &str) -> Result<String, IdentityError> {
        self.token(email)
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<String, IdentityError> {
        self.token(email)
    }

    async fn verify(&self, _id_token: &str) -> Result<VerifiedToken, IdentityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.rejection {
            return Err(IdentityError::Rejected(message.clone()));
        }
        Ok(VerifiedToken {
            uid: "user-1".to_string(),
            email: Some("reader@example.com".to_string()),
            auth_time: self.auth_time,
        })
    }
}
