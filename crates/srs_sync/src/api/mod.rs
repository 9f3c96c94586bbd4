//! Remote API access: client, envelopes, wire types and error classification.

mod client;
mod envelope;
mod error;
pub mod types;

pub use client::{ApiClient, CollectionPages, MutationResponse};
pub use envelope::{Entity, Page, decode_data, decode_entity, decode_page};
pub use error::{ApiError, Result};
