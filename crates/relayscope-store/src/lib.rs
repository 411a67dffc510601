//! Embedded SQLite storage for relayscope's reconstructed sessions, agents,
//! and analysis results.

mod blob;
pub mod error;
pub mod queries;
mod schema;
mod store;

pub use blob::{decode_signature, encode_signature};
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
pub use store::Store;
