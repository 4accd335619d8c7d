#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AttemptRepository, DraftRepository, InMemoryRepository, QuizRepository, Storage,
    StorageError,
};
