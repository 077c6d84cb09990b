//! Storage seams behind the catalog handlers.
//!
//! Each store owns one slice of catalog state and is shared by every
//! concurrent call for the lifetime of the process:
//!
//! - [`RecordStore`] - laptops keyed by identifier; callers only ever see
//!   copies.
//! - [`BlobStore`] - write-only sink for image payloads.
//! - [`RatingStore`] - per-laptop running count and sum of scores.
//!
//! No handler needs atomicity across stores, so each store synchronizes
//! independently.

mod blob;
mod rating;
mod record;

pub use blob::{BlobRecord, DiskBlobStore, validate_content_type};
pub use rating::{InMemoryRatingStore, Rating};
pub use record::InMemoryRecordStore;

use crate::server::context::CallContext;
use bytes::Bytes;
use core::future::Future;
use pcbook_core::{
    Result,
    proto::{Filter, Laptop},
};

/// Concurrency-safe mapping from laptop identifier to laptop.
pub trait RecordStore: Send + Sync + 'static {
    /// Stores a copy of `laptop`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`](pcbook_core::Error::AlreadyExists) when the
    /// identifier is taken; the stored laptop is left untouched.
    fn save(&self, laptop: &Laptop) -> Result<()>;

    /// Returns a copy of the stored laptop, if any.
    fn find(&self, id: &str) -> Result<Option<Laptop>>;

    /// Calls `visit` with a copy of every stored laptop matching `filter`.
    ///
    /// The context is checked before each laptop and iteration stops with the
    /// cancellation outcome once it expires. A failing `visit` stops
    /// iteration and its error is returned. No lock is held while `visit`
    /// runs.
    fn search<F, Fut>(
        &self,
        ctx: &CallContext,
        filter: &Filter,
        visit: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        F: FnMut(Laptop) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send;
}

/// Durable sink for opaque payloads attached to a laptop.
pub trait BlobStore: Send + Sync + 'static {
    /// Persists `data` in full and returns the new record.
    ///
    /// Fails with
    /// [`Error::PayloadTooLarge`](pcbook_core::Error::PayloadTooLarge) before
    /// writing anything when `data` exceeds the store's maximum. On any
    /// failure no record is created and no partial file remains.
    fn save(
        &self,
        owner_id: &str,
        content_type: &str,
        data: Bytes,
    ) -> impl Future<Output = Result<BlobRecord>> + Send;
}

/// Per-laptop score aggregation.
pub trait RatingStore: Send + Sync + 'static {
    /// Adds `score` to the aggregate for `laptop_id` and returns the updated
    /// aggregate. Concurrent adds for the same laptop are never lost.
    fn add(&self, laptop_id: &str, score: f64) -> Result<Rating>;
}
