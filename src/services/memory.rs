use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::models::{Book, BookPatch, NewBook};
use crate::services::books::BookStore;

/// In-process book store for tests and local runs. Keeps insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: Mutex<Vec<Book>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn books(&self) -> MutexGuard<'_, Vec<Book>> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.books.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        Ok(self.books().clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.books().iter().find(|b| b.id == id).cloned())
    }

    async fn insert(&self, book: NewBook) -> Result<Book, StoreError> {
        let book = Book {
            id: uuid::Uuid::new_v4().simple().to_string(),
            title: book.title,
            author: book.author,
            status: book.status,
            image: book.image,
            description: book.description,
            notes: Vec::new(),
        };
        self.books().push(book.clone());
        Ok(book)
    }

    async fn update(&self, id: &str, patch: &BookPatch) -> Result<(), StoreError> {
        let mut books = self.books();
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(book);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.books().retain(|b| b.id != id);
        Ok(())
    }

    async fn append_note(&self, id: &str, note: &str) -> Result<Vec<String>, StoreError> {
        let mut books = self.books();
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        book.notes.push(note.to_string());
        Ok(book.notes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookStatus;
    use std::sync::Arc;

    fn new_book(title: &str) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Anon".to_string(),
            status: BookStatus::ToRead,
            image: String::new(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn ids_are_unique_and_order_is_kept() {
        let store = MemoryStore::new();
        let a = store.insert(new_book("a")).await.unwrap();
        let b = store.insert(new_book("b")).await.unwrap();
        assert_ne!(a.id, b.id);

        let titles: Vec<String> = store.list().await.unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_appends_keep_every_note() {
        let store = Arc::new(MemoryStore::new());
        let book = store.insert(new_book("busy")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let id = book.id.clone();
            handles.push(tokio::spawn(async move {
                store.append_note(&id, &format!("note {i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(&book.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.len(), 16);
    }

    #[tokio::test]
    async fn update_of_missing_id_fails() {
        let store = MemoryStore::new();
        let err = store.update("missing", &BookPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
