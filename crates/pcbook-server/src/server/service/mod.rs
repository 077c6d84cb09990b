//! The laptop catalog service.
//!
//! [`CatalogService`] owns the three stores and implements the four calls in
//! a transport-agnostic way ([`handler`]); [`grpc`] adapts those calls to the
//! generated `LaptopService` trait.
//!
//! ## Responsibilities
//!
//! - Validate and normalize incoming requests.
//! - Consult the [`CallContext`] at every loop boundary.
//! - Track in-flight calls so shutdown can drain them before cancelling.

pub mod grpc;
pub mod handler;

use crate::server::{
    config::ServerConfig,
    context::CallContext,
    store::{
        BlobStore, DiskBlobStore, InMemoryRatingStore, InMemoryRecordStore, RatingStore,
        RecordStore,
    },
};
use pcbook_core::{Error, Result};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// The catalog call handlers over a shared set of stores.
///
/// Cloning is cheap: every clone shares the same stores and lifecycle, which
/// is how one instance serves all concurrent calls.
pub struct CatalogService<R = InMemoryRecordStore, B = DiskBlobStore, S = InMemoryRatingStore> {
    config: ServerConfig,
    records: Arc<R>,
    blobs: Arc<B>,
    ratings: Arc<S>,
    lifecycle: Arc<Lifecycle>,
}

impl CatalogService {
    /// Builds a service over fresh in-memory stores and a blob directory
    /// taken from `config`.
    pub fn new(config: ServerConfig) -> Self {
        let blobs = DiskBlobStore::new(config.image_dir.clone(), config.max_image_size);
        Self::with_stores(
            config,
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(blobs),
            Arc::new(InMemoryRatingStore::new()),
        )
    }
}

impl<R, B, S> CatalogService<R, B, S>
where
    R: RecordStore,
    B: BlobStore,
    S: RatingStore,
{
    pub fn with_stores(
        config: ServerConfig,
        records: Arc<R>,
        blobs: Arc<B>,
        ratings: Arc<S>,
    ) -> Self {
        Self {
            config,
            records,
            blobs,
            ratings,
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<R> {
        &self.records
    }

    pub fn blobs(&self) -> &Arc<B> {
        &self.blobs
    }

    pub fn ratings(&self) -> &Arc<S> {
        &self.ratings
    }

    /// A fresh context for one call, cancelled when the service shuts down.
    pub fn call_context(&self) -> CallContext {
        CallContext::with_token(self.lifecycle.shutdown.child_token())
    }

    /// Number of calls currently being handled.
    pub fn calls_in_flight(&self) -> usize {
        self.lifecycle.inflight.load(Ordering::Acquire)
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new calls with [`Error::ServiceShutdown`].
    /// - Waits up to the configured timeout for in-flight calls to drain.
    /// - Cancels every remaining call through the shutdown token.
    pub async fn shutdown(&self) {
        tracing::info!("Refusing new requests");
        self.lifecycle.accepting.store(false, Ordering::Release);

        tracing::info!("Draining in-flight calls ({} active)", self.calls_in_flight());
        let drained = timeout(self.config.shutdown_timeout, async {
            while self.calls_in_flight() > 0 {
                sleep(core::time::Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight calls drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.calls_in_flight()
            ),
        }

        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.lifecycle.shutdown.cancel();
    }

    /// Registers a new call, failing once shutdown has begun.
    fn begin_call(&self) -> Result<CallGuard> {
        if !self.lifecycle.accepting.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }
        self.lifecycle.inflight.fetch_add(1, Ordering::AcqRel);
        Ok(CallGuard {
            lifecycle: Arc::clone(&self.lifecycle),
        })
    }
}

impl<R, B, S> Clone for CatalogService<R, B, S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            records: Arc::clone(&self.records),
            blobs: Arc::clone(&self.blobs),
            ratings: Arc::clone(&self.ratings),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    shutdown: CancellationToken,
    accepting: AtomicBool,
    inflight: AtomicUsize,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            accepting: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
        }
    }
}

/// Keeps a call counted as in flight until dropped.
struct CallGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
