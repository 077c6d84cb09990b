//! gRPC adapter for [`CatalogService`].
//!
//! Implements the generated [`LaptopService`] trait by building a
//! [`CallContext`] per request and delegating to the transport-agnostic
//! handlers. Streaming responses are produced by a spawned task writing into
//! a bounded channel whose receiver is returned as the response stream.
//!
//! Call contexts honour the client's `grpc-timeout` and are cancelled when
//! the client drops a response stream or the service shuts down.

use super::CatalogService;
use crate::server::{
    context::{CallContext, parse_grpc_timeout},
    store::{BlobStore, RatingStore, RecordStore},
    telemetry::{
        decrement_streams_inflight, increment_requests, increment_stream_errors,
        increment_streams_inflight,
    },
};
use core::pin::Pin;
use pcbook_core::{
    Error,
    proto::{
        CreateLaptopRequest, CreateLaptopResponse, RateLaptopRequest, RateLaptopResponse,
        SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest, UploadImageResponse,
        laptop_service_server::{LaptopService, LaptopServiceServer},
    },
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{
    Request, Response, Status, Streaming, codec::CompressionEncoding, metadata::MetadataMap,
};
use tracing::Instrument;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

impl<R, B, S> CatalogService<R, B, S>
where
    R: RecordStore,
    B: BlobStore,
    S: RatingStore,
{
    /// Wraps the service in the generated tonic server with compression
    /// enabled in both directions.
    pub fn into_server(self) -> LaptopServiceServer<Self> {
        LaptopServiceServer::new(self)
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    }

    fn request_context(&self, metadata: &MetadataMap) -> CallContext {
        let ctx = self.call_context();
        match metadata
            .get("grpc-timeout")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_grpc_timeout)
        {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }
}

#[tonic::async_trait]
impl<R, B, S> LaptopService for CatalogService<R, B, S>
where
    R: RecordStore,
    B: BlobStore,
    S: RatingStore,
{
    type SearchLaptopStream = ResponseStream<SearchLaptopResponse>;
    type RateLaptopStream = ResponseStream<RateLaptopResponse>;

    async fn create_laptop(
        &self,
        req: Request<CreateLaptopRequest>,
    ) -> Result<Response<CreateLaptopResponse>, Status> {
        increment_requests("create_laptop");
        let ctx = self.request_context(req.metadata());

        let Some(laptop) = req.into_inner().laptop else {
            return Err(Error::invalid_argument("Request carries no laptop").into());
        };

        match self.create(&ctx, laptop).await {
            Ok(id) => Ok(Response::new(CreateLaptopResponse { id })),
            Err(e) => {
                tracing::warn!("create-laptop failed: {e}");
                Err(e.into())
            }
        }
    }

    async fn search_laptop(
        &self,
        req: Request<SearchLaptopRequest>,
    ) -> Result<Response<Self::SearchLaptopStream>, Status> {
        increment_requests("search_laptop");
        let ctx = self.request_context(req.metadata());
        let filter = req.into_inner().filter.unwrap_or_default();

        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        ctx.cancel_on_close(&resp_tx);

        let service = self.clone();
        let fut = async move {
            increment_streams_inflight();
            if let Err(e) = service.search(&ctx, filter, resp_tx).await {
                if !e.is_cancellation() {
                    increment_stream_errors();
                }
                tracing::warn!("search-laptop ended early: {e}");
            }
            decrement_streams_inflight();
            ctx.cancel();
        };
        tokio::spawn(fut.instrument(tracing::info_span!("search_laptop")));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }

    async fn upload_image(
        &self,
        req: Request<Streaming<UploadImageRequest>>,
    ) -> Result<Response<UploadImageResponse>, Status> {
        increment_requests("upload_image");
        let ctx = self.request_context(req.metadata());

        match self.upload(&ctx, req.into_inner()).await {
            Ok(resp) => Ok(Response::new(resp)),
            Err(e) => {
                tracing::warn!("upload-image failed: {e}");
                Err(e.into())
            }
        }
    }

    async fn rate_laptop(
        &self,
        req: Request<Streaming<RateLaptopRequest>>,
    ) -> Result<Response<Self::RateLaptopStream>, Status> {
        increment_requests("rate_laptop");
        let ctx = self.request_context(req.metadata());
        let inbound = req.into_inner();

        let (resp_tx, resp_rx) = mpsc::channel(self.config.stream_buffer_size);
        ctx.cancel_on_close(&resp_tx);

        let service = self.clone();
        let fut = async move {
            increment_streams_inflight();
            if let Err(e) = service.rate(&ctx, inbound, resp_tx).await {
                if !e.is_cancellation() {
                    increment_stream_errors();
                }
                tracing::warn!("rate-laptop ended early: {e}");
            }
            decrement_streams_inflight();
            ctx.cancel();
        };
        tokio::spawn(fut.instrument(tracing::info_span!("rate_laptop")));

        Ok(Response::new(Box::pin(ReceiverStream::new(resp_rx))))
    }
}
