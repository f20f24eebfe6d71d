mod config;
mod error;
mod models;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt};

use config::{Config, StoreBackend};
use routes::AppState;
use services::books::{BookService, BookStore};
use services::firestore::FirestoreStore;
use services::identity::FirebaseIdentity;
use services::memory::MemoryStore;
use services::session::SessionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load().context("loading configuration")?;

    let store: Arc<dyn BookStore> = match &config.store {
        StoreBackend::Firestore {
            project_id,
            access_token,
            emulator_host,
        } => {
            tracing::info!(project_id = %project_id, emulator = emulator_host.is_some(), "Using Firestore book store");
            Arc::new(FirestoreStore::new(
                project_id,
                access_token.clone(),
                emulator_host.as_deref(),
            )
            .context("configuring the Firestore client")?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let identity = Arc::new(FirebaseIdentity::new(
        &config.identity_api_url,
        &config.firebase_api_key,
    ));

    let app_state = AppState {
        books: BookService::new(store),
        sessions: Arc::new(SessionManager::new(
            identity,
            config.session_secret.clone(),
            config.cookie_secure,
        )),
    };

    let app = routes::app(app_state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
