//! HTTP client for the nota notes API.
//!
//! Implements the [`nota_core`] service traits over the REST endpoints
//! (`/notes`, `/notes/:id/tags/:tagId`, `/tags`), translating transport
//! failures and status codes into [`nota_core::Error`] kinds the sync engine
//! can act on.

mod client;
mod services;

pub use client::{ApiClient, ClientConfig};
pub use services::{HttpNoteService, HttpTagService};
