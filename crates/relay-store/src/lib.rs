//! SQLite-backed message repository.
//!
//! This crate provides:
//! - AsyncDatabase: SQLite connection on a dedicated executor thread
//! - Migrations for the `messages` table
//! - SqliteRepository: The relay's Repository implementation

mod error;
mod executor;
mod migrations;
mod repository;

pub use error::{StoreError, StoreResult};
pub use executor::AsyncDatabase;
pub use migrations::CURRENT_VERSION;
pub use repository::{SqliteRepository, STATUS_IN_PROCESSING, STATUS_PROCESSED};
