//! Transport-agnostic implementations of the four catalog calls.
//!
//! | Call     | Inbound             | Outbound                  |
//! |----------|---------------------|---------------------------|
//! | `create` | one laptop          | one identifier            |
//! | `search` | one filter          | stream of laptops         |
//! | `upload` | info, then chunks   | one blob id + size        |
//! | `rate`   | stream of ratings   | one response per rating   |
//!
//! Every call ends in exactly one terminal outcome: the returned value or
//! error. Streaming calls may have sent messages before it.

use super::CatalogService;
use crate::server::{
    context::CallContext,
    store::{BlobStore, RatingStore, RecordStore, validate_content_type},
    streaming::{ResponseSender, recv, send, send_terminal},
    telemetry,
};
use bytes::BytesMut;
use core::pin::pin;
use futures::Stream;
use pcbook_core::{
    Error, Result,
    proto::{
        Filter, Laptop, RateLaptopRequest, RateLaptopResponse, SearchLaptopResponse,
        UploadImageRequest, UploadImageResponse, upload_image_request::Data,
    },
};
use tonic::Status;
use uuid::Uuid;

impl<R, B, S> CatalogService<R, B, S>
where
    R: RecordStore,
    B: BlobStore,
    S: RatingStore,
{
    /// Stores `laptop` and returns its identifier.
    ///
    /// A caller-supplied identifier must be a UUID; an empty one is replaced
    /// by a fresh random UUID. An unset `updated_at` is stamped with the
    /// current time.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for a malformed identifier, before any
    ///   store access.
    /// - [`Error::RequestCancelled`] / [`Error::DeadlineExceeded`] when the
    ///   context expired before saving.
    /// - [`Error::AlreadyExists`] when the identifier is taken.
    /// - [`Error::Internal`] for any other store failure.
    #[tracing::instrument(skip_all, fields(id = %laptop.id))]
    pub async fn create(&self, ctx: &CallContext, mut laptop: Laptop) -> Result<String> {
        let _call = self.begin_call()?;
        tracing::info!("Received create-laptop request");

        if laptop.id.is_empty() {
            laptop.id = Uuid::new_v4().to_string();
        } else if let Err(e) = Uuid::parse_str(&laptop.id) {
            return Err(Error::invalid_argument(format!(
                "Laptop ID is not a valid UUID: {e}"
            )));
        }

        ctx.check()?;

        if laptop.updated_at.is_none() {
            laptop.updated_at = Some(prost_types::Timestamp::from(std::time::SystemTime::now()));
        }

        self.records
            .save(&laptop)
            .map_err(|e| e.into_internal("Cannot save laptop to the store"))?;

        telemetry::increment_laptops_created();
        tracing::info!(id = %laptop.id, "Laptop saved");
        Ok(laptop.id)
    }

    /// Streams every stored laptop matching `filter` into `resp_tx`.
    ///
    /// Send and store failures are reported to the client as `Internal` and
    /// end the stream. Cancellation ends the stream without a trailing error;
    /// it is still returned so the caller can log it.
    #[tracing::instrument(skip_all)]
    pub async fn search(
        &self,
        ctx: &CallContext,
        filter: Filter,
        resp_tx: ResponseSender<SearchLaptopResponse>,
    ) -> Result<()> {
        let _call = match self.begin_call() {
            Ok(call) => call,
            Err(e) => {
                send_terminal(ctx, &resp_tx, &e).await;
                return Err(e);
            }
        };
        tracing::info!(?filter, "Received search-laptop request");

        let result = self
            .records
            .search(ctx, &filter, |laptop| {
                let tx = resp_tx.clone();
                let ctx = ctx.clone();
                async move {
                    let id = laptop.id.clone();
                    send(
                        &ctx,
                        &tx,
                        SearchLaptopResponse {
                            laptop: Some(laptop),
                        },
                    )
                    .await?;
                    tracing::debug!(%id, "Sent laptop");
                    Ok(())
                }
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancellation() => {
                tracing::debug!("Search stopped: {e}");
                Err(e)
            }
            Err(e) => {
                let e = e.into_internal("Unexpected error while searching");
                send_terminal(ctx, &resp_tx, &e).await;
                Err(e)
            }
        }
    }

    /// Receives an image for a stored laptop and persists it.
    ///
    /// The first message must be the [`ImageInfo`] header; every following
    /// message must carry chunk data. The payload is held in memory until the
    /// client closes its side, then written in one go.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] when the header is missing or the stream breaks.
    /// - [`Error::InvalidArgument`] for an unusable image type.
    /// - [`Error::NotFound`] when the laptop is not stored.
    /// - [`Error::PayloadTooLarge`] as soon as the received bytes exceed the
    ///   configured maximum; nothing is written.
    /// - [`Error::RequestCancelled`] / [`Error::DeadlineExceeded`] when the
    ///   context expires mid-upload.
    /// - [`Error::Internal`] when the blob store fails.
    ///
    /// [`ImageInfo`]: pcbook_core::proto::ImageInfo
    #[tracing::instrument(skip_all)]
    pub async fn upload<In>(&self, ctx: &CallContext, inbound: In) -> Result<UploadImageResponse>
    where
        In: Stream<Item = core::result::Result<UploadImageRequest, Status>> + Send,
    {
        let _call = self.begin_call()?;
        let mut inbound = pin!(inbound);

        let info = match recv(ctx, &mut inbound).await {
            Ok(Some(UploadImageRequest {
                data: Some(Data::Info(info)),
            })) => info,
            Err(e) if e.is_cancellation() => return Err(e),
            _ => return Err(Error::protocol("Cannot receive image info")),
        };
        tracing::info!(
            laptop_id = %info.laptop_id,
            image_type = %info.image_type,
            "Received upload-image request"
        );

        validate_content_type(&info.image_type)?;
        self.find_laptop(&info.laptop_id)?;

        let max = self.config.max_image_size;
        let mut image = BytesMut::new();

        loop {
            ctx.check()?;

            let Some(req) = recv(ctx, &mut inbound).await? else {
                tracing::debug!("No more data");
                break;
            };
            let chunk = match req.data {
                Some(Data::ChunkData(chunk)) => chunk,
                _ => return Err(Error::protocol("Expected chunk data after image info")),
            };

            let size = image.len() + chunk.len();
            if size > max {
                return Err(Error::PayloadTooLarge { size, max });
            }
            image.extend_from_slice(&chunk);
        }

        let size = image.len();
        let reported_size = u32::try_from(size)
            .map_err(|_| Error::internal(format!("Image size {size} does not fit the response")))?;

        let blob = self
            .blobs
            .save(&info.laptop_id, &info.image_type, image.freeze())
            .await
            .map_err(|e| match e {
                e @ Error::Internal { .. } => e.into_internal("Cannot save image to the store"),
                other => Error::internal(format!("Cannot save image to the store: {other}")),
            })?;

        telemetry::record_image_bytes(size as u64);
        tracing::info!(blob_id = %blob.id, size, "Image saved");

        Ok(UploadImageResponse {
            id: blob.id,
            size: reported_size,
        })
    }

    /// Applies each inbound rating and answers it with the updated count and
    /// average, until the client closes its side.
    ///
    /// The first failure ends the call. It is sent to the client as the
    /// stream's terminal status unless it was a cancellation or the client
    /// is already gone, and is returned either way.
    #[tracing::instrument(skip_all)]
    pub async fn rate<In>(
        &self,
        ctx: &CallContext,
        inbound: In,
        resp_tx: ResponseSender<RateLaptopResponse>,
    ) -> Result<()>
    where
        In: Stream<Item = core::result::Result<RateLaptopRequest, Status>> + Send,
    {
        let _call = match self.begin_call() {
            Ok(call) => call,
            Err(e) => {
                send_terminal(ctx, &resp_tx, &e).await;
                return Err(e);
            }
        };
        let mut inbound = pin!(inbound);

        let result = self.rate_loop(ctx, &mut inbound, &resp_tx).await;
        if let Err(e) = &result {
            send_terminal(ctx, &resp_tx, e).await;
        }
        result
    }

    async fn rate_loop<In>(
        &self,
        ctx: &CallContext,
        inbound: &mut In,
        resp_tx: &ResponseSender<RateLaptopResponse>,
    ) -> Result<()>
    where
        In: Stream<Item = core::result::Result<RateLaptopRequest, Status>> + Unpin,
    {
        loop {
            ctx.check()?;

            let Some(req) = recv(ctx, inbound).await? else {
                tracing::debug!("No more ratings");
                return Ok(());
            };
            let resp = self.apply_rating(req)?;
            send(ctx, resp_tx, resp).await?;
        }
    }

    fn apply_rating(&self, req: RateLaptopRequest) -> Result<RateLaptopResponse> {
        let RateLaptopRequest { laptop_id, score } = req;
        tracing::info!(%laptop_id, score, "Received rating");

        if !score.is_finite() {
            return Err(Error::invalid_argument(format!(
                "Score {score} is not a finite number"
            )));
        }
        self.find_laptop(&laptop_id)?;

        let rating = self
            .ratings
            .add(&laptop_id, score)
            .map_err(|e| e.into_internal("Cannot add the rating"))?;

        telemetry::increment_ratings();
        tracing::debug!(count = rating.count, average = rating.average(), "Rating applied");

        Ok(RateLaptopResponse {
            laptop_id,
            rated_count: rating.count,
            average_score: rating.average(),
        })
    }

    fn find_laptop(&self, id: &str) -> Result<Laptop> {
        self.records
            .find(id)
            .map_err(|e| e.into_internal("Cannot find laptop"))?
            .ok_or_else(|| Error::NotFound { id: id.to_string() })
    }
}
