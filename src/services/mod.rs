pub mod books;
pub mod firestore;
pub mod identity;
pub mod memory;
pub mod session;
pub mod validation;
