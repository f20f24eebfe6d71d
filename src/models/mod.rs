use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const IMAGE_PLACEHOLDER: &str = "https://d827xgdhgqbnd.cloudfront.net/wp-content/uploads/2016/04/09121712/book-cover-placeholder.png";
pub const DEFAULT_DESCRIPTION: &str = "No description available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookStatus {
    ToRead,
    Reading,
    Read,
}

impl BookStatus {
    pub const ALL: [BookStatus; 3] = [BookStatus::ToRead, BookStatus::Reading, BookStatus::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::ToRead => "to-read",
            BookStatus::Reading => "reading",
            BookStatus::Read => "read",
        }
    }

    /// Human readable label shown next to a book.
    pub fn label(&self) -> &'static str {
        match self {
            BookStatus::ToRead => "To Read",
            BookStatus::Reading => "Currently Reading",
            BookStatus::Read => "Already Read",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub status: BookStatus,
    pub image: String,
    pub description: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Book {
    /// Text the search box matches against.
    pub fn searchable_text(&self) -> String {
        format!(
            "{}{}{}{}",
            self.title,
            self.author,
            self.description,
            self.notes.concat()
        )
    }
}

/// Books sharing one status, listed under its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shelf {
    pub status: BookStatus,
    pub label: &'static str,
    pub books: Vec<Book>,
}

/// Splits books into one shelf per status, in `BookStatus::ALL` order.
/// Empty shelves are kept so clients always get all three.
pub fn shelves(books: &[Book]) -> Vec<Shelf> {
    BookStatus::ALL
        .into_iter()
        .map(|status| Shelf {
            status,
            label: status.label(),
            books: books.iter().filter(|b| b.status == status).cloned().collect(),
        })
        .collect()
}

/// Book fields as submitted by a client. Nothing is trusted until validated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookForm {
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
}

/// A validated book ready to be inserted. Defaults are already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub status: BookStatus,
    pub image: String,
    pub description: String,
}

/// A validated partial update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: Option<BookStatus>,
    pub image: Option<String>,
    pub description: Option<String>,
}

impl BookPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.status.is_none()
            && self.image.is_none()
            && self.description.is_none()
    }

    pub fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(status) = self.status {
            book.status = status;
        }
        if let Some(image) = &self.image {
            book.image = image.clone();
        }
        if let Some(description) = &self.description {
            book.description = description.clone();
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteForm {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub email: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

/// Field name to message, kept ordered so responses are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    pub fn insert(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// What the identity provider vouches for after checking a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub uid: String,
    pub email: Option<String>,
    /// Unix seconds of the sign-in that produced the token.
    pub auth_time: i64,
}

/// Payload of the signed session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    pub email: Option<String>,
    pub token: String,
    pub auth_time: i64,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub uid: String,
    pub email: Option<String>,
    pub expires_at: i64,
}

impl From<&Session> for SessionUser {
    fn from(session: &Session) -> Self {
        SessionUser {
            uid: session.uid.clone(),
            email: session.email.clone(),
            expires_at: session.expires_at,
        }
    }
}
