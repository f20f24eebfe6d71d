use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AppError, StoreError};
use crate::models::{Book, BookForm, BookPatch, NewBook};
use crate::services::validation::{validate_book_patch, validate_new_book, validate_note};

/// A collection of book documents keyed by store-generated ids.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Every stored book, in the store's iteration order.
    async fn list(&self) -> Result<Vec<Book>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError>;

    /// Persists a new book and returns it with its assigned id.
    async fn insert(&self, book: NewBook) -> Result<Book, StoreError>;

    /// Writes the present fields of `patch`. Fails with `NotFound` if `id` is absent.
    async fn update(&self, id: &str, patch: &BookPatch) -> Result<(), StoreError>;

    /// Deleting an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Appends one note and returns the stored sequence. A concurrent writer
    /// must surface as `Conflict`, never as a silently dropped note.
    async fn append_note(&self, id: &str, note: &str) -> Result<Vec<String>, StoreError>;
}

pub fn matches_query(book: &Book, query: &str) -> bool {
    book.searchable_text()
        .to_lowercase()
        .contains(&query.to_lowercase())
}

#[derive(Clone)]
pub struct BookService {
    store: Arc<dyn BookStore>,
}

impl BookService {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, query: &str) -> Result<Vec<Book>, AppError> {
        let books = self.store.list().await?;
        let total = books.len();
        let matched: Vec<Book> = books
            .into_iter()
            .filter(|book| matches_query(book, query))
            .collect();
        debug!(query, total, matched = matched.len(), "listed books");
        Ok(matched)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Book>, AppError> {
        Ok(self.store.get(id).await?)
    }

    pub async fn create(&self, form: &BookForm) -> Result<Book, AppError> {
        let new_book = validate_new_book(form).map_err(AppError::Validation)?;
        let book = self.store.insert(new_book).await?;
        info!(book_id = %book.id, title = %book.title, "book added");
        Ok(book)
    }

    pub async fn update(&self, id: &str, form: &BookForm) -> Result<(), AppError> {
        let patch = validate_book_patch(form).map_err(AppError::Validation)?;
        if patch.is_empty() {
            // Nothing to write, but the id must still exist.
            return match self.store.get(id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::NotFound),
            };
        }
        self.store.update(id, &patch).await?;
        info!(book_id = %id, "book updated");
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        self.store.delete(id).await?;
        info!(book_id = %id, "book removed");
        Ok(())
    }

    pub async fn append_note(&self, id: &str, note: Option<&str>) -> Result<Vec<String>, AppError> {
        let note = validate_note(note).map_err(AppError::Validation)?;
        let notes = self.store.append_note(id, &note).await?;
        info!(book_id = %id, notes = notes.len(), "note added");
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookStatus;
    use crate::services::memory::MemoryStore;

    fn service() -> (BookService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (BookService::new(store.clone()), store)
    }

    fn form(title: &str, author: &str, status: &str) -> BookForm {
        BookForm {
            title: Some(title.to_string()),
            author: Some(author.to_string()),
            status: Some(status.to_string()),
            ..BookForm::default()
        }
    }

    async fn seed(service: &BookService) -> (Book, Book, Book) {
        let dune = service
            .create(&BookForm {
                description: Some("Desert planet politics".to_string()),
                ..form("Dune", "Frank Herbert", "read")
            })
            .await
            .unwrap();
        let emma = service.create(&form("Emma", "Jane Austen", "to-read")).await.unwrap();
        let snow = service
            .create(&form("Snow Crash", "Neal Stephenson", "reading"))
            .await
            .unwrap();
        (dune, emma, snow)
    }

    #[tokio::test]
    async fn empty_query_lists_everything() {
        let (service, _) = service();
        seed(&service).await;
        assert_eq!(service.list("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn query_is_case_insensitive_across_fields() {
        let (service, _) = service();
        let (dune, emma, snow) = seed(&service).await;
        service.append_note(&snow.id, Some("Hiro Protagonist")).await.unwrap();

        let ids = |books: Vec<Book>| books.into_iter().map(|b| b.id).collect::<Vec<_>>();

        assert_eq!(ids(service.list("DESERT").await.unwrap()), vec![dune.id.clone()]);
        assert_eq!(ids(service.list("austen").await.unwrap()), vec![emma.id.clone()]);
        assert_eq!(ids(service.list("hiro").await.unwrap()), vec![snow.id.clone()]);
        assert!(service.list("tolkien").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_matches_across_field_boundaries() {
        let (service, _) = service();
        let (_, emma, _) = seed(&service).await;
        // title and author are concatenated without a separator
        let found = service.list("emmajane").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, emma.id);
    }

    #[tokio::test]
    async fn list_returns_exactly_the_matching_subset() {
        let (service, _) = service();
        seed(&service).await;
        let all = service.list("").await.unwrap();
        for query in ["a", "N", "ste", "xyz", "read"] {
            let expected: Vec<Book> = all
                .iter()
                .filter(|b| b.searchable_text().to_lowercase().contains(&query.to_lowercase()))
                .cloned()
                .collect();
            assert_eq!(service.list(query).await.unwrap(), expected, "query {query}");
        }
    }

    #[tokio::test]
    async fn create_without_title_persists_nothing() {
        let (service, store) = service();
        let err = service
            .create(&BookForm {
                title: None,
                ..form("", "Someone", "read")
            })
            .await
            .unwrap_err();

        match err {
            AppError::Validation(errors) => assert!(errors.contains("title")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_unknown_status() {
        let (service, store) = service();
        let err = service.create(&form("Dune", "Frank Herbert", "archived")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.contains("status")));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (service, _) = service();
        let book = service.create(&form("Dune", "Frank Herbert", "to-read")).await.unwrap();
        let stored = service.get(&book.id).await.unwrap().unwrap();
        assert_eq!(stored.image, crate::models::IMAGE_PLACEHOLDER);
        assert_eq!(stored.description, crate::models::DEFAULT_DESCRIPTION);
        assert!(stored.notes.is_empty());
        assert_eq!(stored.status, BookStatus::ToRead);
    }

    #[tokio::test]
    async fn update_changes_only_submitted_fields() {
        let (service, _) = service();
        let (dune, _, _) = seed(&service).await;
        service.append_note(&dune.id, Some("spice")).await.unwrap();
        let before = service.get(&dune.id).await.unwrap().unwrap();

        service
            .update(
                &dune.id,
                &BookForm {
                    title: Some("New".to_string()),
                    ..BookForm::default()
                },
            )
            .await
            .unwrap();

        let after = service.get(&dune.id).await.unwrap().unwrap();
        assert_eq!(after.title, "New");
        assert_eq!(after, Book { title: "New".to_string(), ..before });
    }

    #[tokio::test]
    async fn update_of_missing_book_is_not_found() {
        let (service, _) = service();
        let err = service.update("nope", &form("A", "B", "read")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
        let err = service.update("nope", &BookForm::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn notes_append_in_order() {
        let (service, _) = service();
        let (dune, _, _) = seed(&service).await;

        let notes = service.append_note(&dune.id, Some("hello")).await.unwrap();
        assert_eq!(notes, vec!["hello".to_string()]);

        let notes = service.append_note(&dune.id, Some("again")).await.unwrap();
        assert_eq!(notes, vec!["hello".to_string(), "again".to_string()]);

        let stored = service.get(&dune.id).await.unwrap().unwrap();
        assert_eq!(stored.notes, notes);
    }

    #[tokio::test]
    async fn note_on_missing_book_fails() {
        let (service, _) = service();
        let err = service.append_note("ghost", Some("hello")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn empty_note_is_a_validation_error() {
        let (service, _) = service();
        let (dune, _, _) = seed(&service).await;
        let err = service.append_note(&dune.id, Some("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn removed_book_is_gone() {
        let (service, _) = service();
        let (dune, _, _) = seed(&service).await;
        service.remove(&dune.id).await.unwrap();
        assert!(service.get(&dune.id).await.unwrap().is_none());
        // second delete is a no-op
        service.remove(&dune.id).await.unwrap();
        assert_eq!(service.list("").await.unwrap().len(), 2);
    }
}
