use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header::SET_COOKIE, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::{
    Book, BookForm, LoginForm, NoteForm, Session, SessionUser, SignupForm, shelves,
};
use crate::services::books::BookService;
use crate::services::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub books: BookService,
    pub sessions: Arc<SessionManager>,
}

/// The signed-in user of the current request. Rejects with 401 when absent.
pub struct CurrentSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .read_session(&parts.headers)
            .map(CurrentSession)
            .ok_or(AppError::Unauthorized)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/books", get(list_books).post(create_book))
        .route(
            "/books/:id",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .route("/books/:id/notes", post(add_note))
        .route("/login", post(login))
        .route("/signup", post(signup))
        .route("/logout", post(logout))
        .route("/session", get(current_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_books(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let books = state.books.list(&params.q).await?;
    Ok(Json(json!({
        "shelves": shelves(&books),
        "books": books,
        "q": params.q,
    })))
}

async fn get_book(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    state.books.get(&id).await?.map(Json).ok_or(AppError::NotFound)
}

async fn create_book(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(form): Json<BookForm>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let book = state.books.create(&form).await?;
    tracing::debug!(uid = %session.uid, book_id = %book.id, "created by");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(id): Path<String>,
    Json(form): Json<BookForm>,
) -> Result<Json<Book>, AppError> {
    state.books.update(&id, &form).await?;
    state.books.get(&id).await?.map(Json).ok_or(AppError::NotFound)
}

async fn delete_book(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.books.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_note(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(id): Path<String>,
    Json(form): Json<NoteForm>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notes = state.books.append_note(&id, form.note.as_deref()).await?;
    Ok(Json(json!({ "id": id, "notes": notes })))
}

async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let (session, cookie) = state.sessions.login(&form).await?;
    Ok(([(SET_COOKIE, cookie)], Json(SessionUser::from(&session))))
}

async fn signup(
    State(state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> Result<impl IntoResponse, AppError> {
    let (session, cookie) = state.sessions.signup(&form).await?;
    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(SessionUser::from(&session)),
    ))
}

async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let cookie = state.sessions.destroy_session()?;
    Ok(([(SET_COOKIE, cookie)], StatusCode::NO_CONTENT))
}

async fn current_session(CurrentSession(session): CurrentSession) -> Json<SessionUser> {
    Json(SessionUser::from(&session))
}
