use std::env;
use std::net::SocketAddr;

use tracing::{info, warn};

use crate::error::ConfigError;

pub const DEFAULT_IDENTITY_API_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore {
        project_id: String,
        access_token: Option<String>,
        emulator_host: Option<String>,
    },
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub firebase_api_key: String,
    pub identity_api_url: String,
    pub session_secret: Vec<u8>,
    pub cookie_secure: bool,
    pub store: StoreBackend,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            info!("No .env file loaded: {e}");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let firebase_api_key =
            var("FIREBASE_API_KEY").ok_or(ConfigError::Missing("FIREBASE_API_KEY"))?;

        let session_secret = var("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "SESSION_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: format!("{e}"),
            })?;

        let cookie_secure = match var("COOKIE_SECURE").as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "COOKIE_SECURE",
                    reason: format!("expected true or false, got {other}"),
                });
            }
        };
        if !cookie_secure {
            warn!("Session cookies will be sent without the Secure attribute");
        }

        let identity_api_url = var("IDENTITY_API_URL")
            .unwrap_or_else(|| DEFAULT_IDENTITY_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let store = match var("BOOK_STORE").as_deref() {
            None | Some("firestore") => StoreBackend::Firestore {
                project_id: var("FIRESTORE_PROJECT_ID")
                    .ok_or(ConfigError::Missing("FIRESTORE_PROJECT_ID"))?,
                access_token: var("FIRESTORE_ACCESS_TOKEN"),
                emulator_host: var("FIRESTORE_EMULATOR_HOST"),
            },
            Some("memory") => {
                warn!("Using the in-memory book store, nothing will be persisted");
                StoreBackend::Memory
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "BOOK_STORE",
                    reason: format!("unknown backend {other}"),
                });
            }
        };

        Ok(Config {
            bind_addr,
            firebase_api_key,
            identity_api_url,
            session_secret: session_secret.into_bytes(),
            cookie_secure,
            store,
        })
    }
}
