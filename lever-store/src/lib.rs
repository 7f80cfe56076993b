//! libSQL (Turso) persistence for lever.
//!
//! [`TursoRecordStore`] and [`TursoExpiryIndex`] implement the core storage
//! contracts over one shared [`TursoDatabase`].

mod database;
mod error;
mod index;
mod records;

pub use database::TursoDatabase;
pub use error::{Result, StoreError};
pub use index::TursoExpiryIndex;
pub use records::TursoRecordStore;
