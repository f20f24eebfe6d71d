use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ConfigError, StoreError};
use crate::models::{Book, BookPatch, DEFAULT_DESCRIPTION, IMAGE_PLACEHOLDER, NewBook};
use crate::services::books::BookStore;

const COLLECTION: &str = "books";
const PAGE_SIZE: &str = "300";

/// Firestore's typed value encoding, limited to what books use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    #[serde(skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    array_value: Option<ArrayValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<Value>,
}

impl Value {
    fn string(s: &str) -> Self {
        Value {
            string_value: Some(s.to_string()),
            ..Value::default()
        }
    }

    fn strings(items: &[String]) -> Self {
        Value {
            array_value: Some(ArrayValue {
                values: items.iter().map(|s| Value::string(s)).collect(),
            }),
            ..Value::default()
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    #[serde(skip_serializing)]
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl Document {
    fn id(&self) -> Result<&str, StoreError> {
        self.name
            .as_deref()
            .and_then(|name| name.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::Decode("document without a name".to_string()))
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.string_value.as_deref())
    }

    fn notes(&self) -> Vec<String> {
        self.fields
            .get("notes")
            .and_then(|v| v.array_value.as_ref())
            .map(|array| {
                array
                    .values
                    .iter()
                    .filter_map(|v| v.string_value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn into_book(self) -> Result<Book, StoreError> {
        let id = self.id()?.to_string();
        let required = |key: &str| {
            self.string_field(key)
                .map(str::to_string)
                .ok_or_else(|| StoreError::Decode(format!("book {id} has no {key}")))
        };
        let title = required("title")?;
        let author = required("author")?;
        let status = required("status")?
            .parse()
            .map_err(|_| StoreError::Decode(format!("book {id} has an unknown status")))?;

        Ok(Book {
            title,
            author,
            status,
            image: self
                .string_field("image")
                .unwrap_or(IMAGE_PLACEHOLDER)
                .to_string(),
            description: self
                .string_field("description")
                .unwrap_or(DEFAULT_DESCRIPTION)
                .to_string(),
            notes: self.notes(),
            id,
        })
    }

    fn from_new_book(book: &NewBook) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), Value::string(&book.title));
        fields.insert("author".to_string(), Value::string(&book.author));
        fields.insert("status".to_string(), Value::string(book.status.as_str()));
        fields.insert("image".to_string(), Value::string(&book.image));
        fields.insert("description".to_string(), Value::string(&book.description));
        fields.insert("notes".to_string(), Value::strings(&[]));
        Document {
            fields,
            ..Document::default()
        }
    }

    fn from_patch(patch: &BookPatch) -> Self {
        let mut fields = BTreeMap::new();
        let mut put = |key: &str, value: Option<&str>| {
            if let Some(value) = value {
                fields.insert(key.to_string(), Value::string(value));
            }
        };
        put("title", patch.title.as_deref());
        put("author", patch.author.as_deref());
        put("status", patch.status.map(|s| s.as_str()));
        put("image", patch.image.as_deref());
        put("description", patch.description.as_deref());
        Document {
            fields,
            ..Document::default()
        }
    }
}

/// Book store backed by the Firestore REST API.
pub struct FirestoreStore {
    client: reqwest::Client,
    collection_url: Url,
    access_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(
        project_id: &str,
        access_token: Option<String>,
        emulator_host: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let root = match emulator_host {
            Some(host) => format!("http://{host}/"),
            None => "https://firestore.googleapis.com/".to_string(),
        };
        let invalid = |reason: String| ConfigError::Invalid {
            key: "FIRESTORE_EMULATOR_HOST",
            reason,
        };
        let mut collection_url = Url::parse(&root).map_err(|e| invalid(e.to_string()))?;
        collection_url
            .path_segments_mut()
            .map_err(|_| invalid(format!("{root} cannot carry a path")))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                project_id,
                "databases",
                "(default)",
                "documents",
                COLLECTION,
            ]);

        // The emulator accepts "owner" as a token that bypasses security rules.
        let access_token = access_token.or_else(|| emulator_host.map(|_| "owner".to_string()));

        Ok(FirestoreStore {
            client: reqwest::Client::new(),
            collection_url,
            access_token,
        })
    }

    /// URL of one book, or `None` for ids that cannot name a document.
    /// Anything else is pushed as a single escaped path segment.
    fn document_url(&self, id: &str) -> Option<Url> {
        if id.is_empty() || id == "." || id == ".." || id.contains(['/', '?', '#']) {
            debug!(id, "rejecting unusable document id");
            return None;
        }
        let mut url = self.collection_url.clone();
        url.path_segments_mut().ok()?.push(id);
        Some(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request_builder = self.client.request(method, url);
        match &self.access_token {
            Some(token) => request_builder.bearer_auth(token),
            None => request_builder,
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let Some(url) = self.document_url(id) else {
            return Ok(None);
        };
        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = check(response, id).await?.json().await?;
        Ok(Some(document))
    }
}

fn missing(id: &str) -> StoreError {
    StoreError::NotFound(id.to_string())
}

/// Turns a non-success response into the matching `StoreError`.
async fn check(response: Response, id: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(ErrorDetail {
            message: body,
            status: String::new(),
        });

    match (status, detail.status.as_str()) {
        (StatusCode::NOT_FOUND, _) | (_, "NOT_FOUND") => Err(missing(id)),
        (StatusCode::CONFLICT, _) | (_, "FAILED_PRECONDITION") | (_, "ABORTED") => {
            Err(StoreError::Conflict(id.to_string()))
        }
        _ => {
            warn!(status = status.as_u16(), message = %detail.message, "firestore request failed");
            Err(StoreError::Status {
                status: status.as_u16(),
                message: detail.message,
            })
        }
    }
}

#[async_trait]
impl BookStore for FirestoreStore {
    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        let mut books = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }
            let response = self
                .request(Method::GET, self.collection_url.clone())
                .query(&query)
                .send()
                .await?;
            let page: ListDocumentsResponse = check(response, COLLECTION).await?.json().await?;

            for document in page.documents {
                match document.into_book() {
                    Ok(book) => books.push(book),
                    Err(err) => warn!(error = %err, "skipping unreadable book document"),
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = books.len(), "fetched books from firestore");
        Ok(books)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        self.fetch(id).await?.map(Document::into_book).transpose()
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let response = self
            .request(Method::POST, self.collection_url.clone())
            .json(&Document::from_new_book(&book))
            .send()
            .await?;
        let created: Document = check(response, COLLECTION).await?.json().await?;

        Ok(Book {
            id: created.id()?.to_string(),
            title: book.title,
            author: book.author,
            status: book.status,
            image: book.image,
            description: book.description,
            notes: Vec::new(),
        })
    }

    async fn update(&self, id: &str, patch: &BookPatch) -> Result<(), StoreError> {
        let url = self.document_url(id).ok_or_else(|| missing(id))?;
        let document = Document::from_patch(patch);
        let mut query: Vec<(&str, &str)> = document
            .fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.as_str()))
            .collect();
        query.push(("currentDocument.exists", "true"));

        let response = self
            .request(Method::PATCH, url)
            .query(&query)
            .json(&document)
            .send()
            .await?;
        check(response, id).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let Some(url) = self.document_url(id) else {
            return Ok(());
        };
        let response = self.request(Method::DELETE, url).send().await?;
        check(response, id).await?;
        Ok(())
    }

    async fn append_note(&self, id: &str, note: &str) -> Result<Vec<String>, StoreError> {
        let url = self.document_url(id).ok_or_else(|| missing(id))?;
        let current = self.fetch(id).await?.ok_or_else(|| missing(id))?;
        let update_time = current
            .update_time
            .clone()
            .ok_or_else(|| StoreError::Decode(format!("book {id} has no updateTime")))?;

        let mut notes = current.notes();
        notes.push(note.to_string());

        // The write only lands if nobody touched the document since we read it.
        let body = json!({ "fields": { "notes": Value::strings(&notes) } });
        let response = self
            .request(Method::PATCH, url)
            .query(&[
                ("updateMask.fieldPaths", "notes"),
                ("currentDocument.updateTime", update_time.as_str()),
            ])
            .json(&body)
            .send()
            .await?;
        check(response, id).await?;
        Ok(notes)
    }
}
