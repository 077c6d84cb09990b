use core::time::Duration;
use std::{collections::HashSet, path::Path};

use futures::stream;
use pcbook_core::{
    Error,
    proto::{
        Filter, Laptop, Memory, RateLaptopRequest, RateLaptopResponse, SearchLaptopResponse,
        UploadImageRequest, memory::Unit,
    },
    sample,
    types::memory_to_bits,
};
use pcbook_server::{
    CallContext, CatalogService, ServerConfig,
    server::store::RecordStore,
};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep, timeout},
};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Status};
use uuid::Uuid;

fn service_in(dir: &Path) -> CatalogService {
    CatalogService::new(ServerConfig {
        image_dir: dir.join("img"),
        ..ServerConfig::default()
    })
}

async fn stored_laptop(service: &CatalogService) -> Laptop {
    let id = service
        .create(&CallContext::new(), sample::new_laptop())
        .await
        .unwrap();
    service.records().find(&id).unwrap().unwrap()
}

async fn drain<T>(mut rx: mpsc::Receiver<Result<T, Status>>) -> Vec<Result<T, Status>> {
    let mut out = Vec::new();
    while let Some(msg) = rx.recv().await {
        out.push(msg);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_yield_distinct_uuids() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                let mut laptop = sample::new_laptop();
                laptop.id.clear();
                service.create(&CallContext::new(), laptop).await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle.await.unwrap().unwrap();
        Uuid::parse_str(&id).unwrap();
        ids.insert(id);
    }
    assert_eq!(ids.len(), 32);
    assert_eq!(service.records().len(), 32);
}

#[tokio::test]
async fn duplicate_id_keeps_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let original = stored_laptop(&service).await;

    let mut other = sample::new_laptop();
    other.id = original.id.clone();
    let err = service.create(&CallContext::new(), other).await.unwrap_err();

    assert_eq!(
        err,
        Error::AlreadyExists {
            id: original.id.clone()
        }
    );
    assert_eq!(Status::from(err).code(), Code::AlreadyExists);
    assert_eq!(service.records().find(&original.id).unwrap(), Some(original));
}

#[tokio::test]
async fn malformed_id_is_rejected_before_saving() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let mut laptop = sample::new_laptop();
    laptop.id = "not-a-uuid".to_string();
    let err = service.create(&CallContext::new(), laptop).await.unwrap_err();

    assert!(matches!(err, Error::InvalidArgument { .. }));
    assert!(service.records().is_empty());
}

#[tokio::test]
async fn expired_context_leaves_the_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let cancelled = CallContext::new();
    cancelled.cancel();
    let err = service
        .create(&cancelled, sample::new_laptop())
        .await
        .unwrap_err();
    assert_eq!(err, Error::RequestCancelled);
    assert_eq!(Status::from(err).code(), Code::Cancelled);

    let expired = CallContext::new().with_deadline(Instant::now());
    let err = service
        .create(&expired, sample::new_laptop())
        .await
        .unwrap_err();
    assert_eq!(err, Error::DeadlineExceeded);
    assert_eq!(Status::from(err).code(), Code::DeadlineExceeded);

    assert!(service.records().is_empty());
}

#[tokio::test]
async fn create_stamps_updated_at() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let mut laptop = sample::new_laptop();
    laptop.updated_at = None;
    let id = service.create(&CallContext::new(), laptop).await.unwrap();

    let stored = service.records().find(&id).unwrap().unwrap();
    assert!(stored.updated_at.is_some());
}

#[tokio::test]
async fn search_returns_exactly_the_matching_laptops() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let mut stored = Vec::new();
    for _ in 0..10 {
        stored.push(stored_laptop(&service).await);
    }

    let filter = Filter {
        max_price_inr: Some(100_000.0),
        min_cpu_cores: Some(4),
        min_cpu_ghz: Some(1.5),
        min_ram: Some(Memory {
            value: 2,
            unit: Unit::Gigabyte as i32,
        }),
    };

    let expected: HashSet<String> = stored
        .iter()
        .filter(|l| {
            let cpu = l.cpu.as_ref().unwrap();
            let ram = l.ram.as_ref().unwrap();
            l.price_inr <= 100_000.0
                && cpu.number_cores >= 4
                && cpu.min_ghz >= 1.5
                && memory_to_bits(ram) >= 2 * 8 * (1 << 30)
        })
        .map(|l| l.id.clone())
        .collect();

    let (tx, rx) = mpsc::channel(16);
    service.search(&CallContext::new(), filter, tx).await.unwrap();

    let found: HashSet<String> = drain(rx)
        .await
        .into_iter()
        .map(|msg| msg.unwrap().laptop.unwrap().id)
        .collect();
    assert_eq!(found, expected);
}

#[tokio::test]
async fn search_with_empty_filter_streams_everything() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    for _ in 0..5 {
        stored_laptop(&service).await;
    }

    // Capacity 1 forces the search to wait on the consumer.
    let (tx, rx) = mpsc::channel::<Result<SearchLaptopResponse, Status>>(1);
    let searcher = service.clone();
    let handle = tokio::spawn(async move {
        searcher
            .search(&CallContext::new(), Filter::default(), tx)
            .await
    });

    assert_eq!(drain(rx).await.len(), 5);
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn cancelled_search_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    stored_laptop(&service).await;

    let ctx = CallContext::new();
    ctx.cancel();
    let (tx, rx) = mpsc::channel(4);
    let err = service
        .search(&ctx, Filter::default(), tx)
        .await
        .unwrap_err();

    assert_eq!(err, Error::RequestCancelled);
    assert!(drain(rx).await.is_empty());
}

#[tokio::test]
async fn search_to_a_departed_client_is_internal() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    stored_laptop(&service).await;

    let (tx, rx) = mpsc::channel(4);
    drop(rx);
    let err = service
        .search(&CallContext::new(), Filter::default(), tx)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Internal { .. }));
}

#[tokio::test]
async fn upload_stores_every_byte() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let chunks: [&'static [u8]; 3] = [b"hello ", b"laptop ", b"image"];
    let mut messages: Vec<Result<UploadImageRequest, Status>> =
        vec![Ok(UploadImageRequest::info(&laptop.id, ".jpg"))];
    messages.extend(chunks.iter().map(|c| Ok(UploadImageRequest::chunk(*c))));

    let resp = service
        .upload(&CallContext::new(), stream::iter(messages))
        .await
        .unwrap();

    assert_eq!(resp.size, 18);
    let blob = service.blobs().get(&resp.id).unwrap();
    assert_eq!(blob.owner_id, laptop.id);
    assert_eq!(std::fs::read(&blob.path).unwrap(), b"hello laptop image");
}

#[tokio::test]
async fn repeated_uploads_create_independent_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let mut ids = HashSet::new();
    for _ in 0..2 {
        let messages: Vec<Result<UploadImageRequest, Status>> = vec![
            Ok(UploadImageRequest::info(&laptop.id, "png")),
            Ok(UploadImageRequest::chunk(&b"data"[..])),
        ];
        let resp = service
            .upload(&CallContext::new(), stream::iter(messages))
            .await
            .unwrap();
        ids.insert(resp.id);
    }
    assert_eq!(ids.len(), 2);
    assert_eq!(service.blobs().len(), 2);
}

#[tokio::test]
async fn oversized_upload_leaves_no_blob() {
    let dir = tempfile::tempdir().unwrap();
    let image_dir = dir.path().join("img");
    let service = CatalogService::new(ServerConfig {
        image_dir: image_dir.clone(),
        max_image_size: 16,
        ..ServerConfig::default()
    });
    let laptop = stored_laptop(&service).await;

    let messages: Vec<Result<UploadImageRequest, Status>> = vec![
        Ok(UploadImageRequest::info(&laptop.id, ".jpg")),
        Ok(UploadImageRequest::chunk(vec![0u8; 10])),
        Ok(UploadImageRequest::chunk(vec![0u8; 10])),
    ];
    let err = service
        .upload(&CallContext::new(), stream::iter(messages))
        .await
        .unwrap_err();

    assert_eq!(err, Error::PayloadTooLarge { size: 20, max: 16 });
    assert_eq!(Status::from(err).code(), Code::InvalidArgument);
    assert!(service.blobs().is_empty());
    assert!(!image_dir.exists() || std::fs::read_dir(&image_dir).unwrap().next().is_none());
}

#[tokio::test]
async fn upload_at_the_limit_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let service = CatalogService::new(ServerConfig {
        image_dir: dir.path().join("img"),
        max_image_size: 16,
        ..ServerConfig::default()
    });
    let laptop = stored_laptop(&service).await;

    let messages: Vec<Result<UploadImageRequest, Status>> = vec![
        Ok(UploadImageRequest::info(&laptop.id, ".bin")),
        Ok(UploadImageRequest::chunk(vec![7u8; 16])),
    ];
    let resp = service
        .upload(&CallContext::new(), stream::iter(messages))
        .await
        .unwrap();
    assert_eq!(resp.size, 16);
}

#[tokio::test]
async fn upload_without_info_is_a_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let messages: Vec<Result<UploadImageRequest, Status>> =
        vec![Ok(UploadImageRequest::chunk(&b"data"[..]))];
    let err = service
        .upload(&CallContext::new(), stream::iter(messages))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Protocol { .. }));
    assert_eq!(Status::from(err).code(), Code::Unknown);

    let empty = stream::iter(Vec::<Result<UploadImageRequest, Status>>::new());
    let err = service.upload(&CallContext::new(), empty).await.unwrap_err();
    assert!(matches!(err, Error::Protocol { .. }));
}

#[tokio::test]
async fn upload_for_unknown_laptop_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());

    let id = Uuid::new_v4().to_string();
    let messages: Vec<Result<UploadImageRequest, Status>> = vec![
        Ok(UploadImageRequest::info(&id, ".jpg")),
        Ok(UploadImageRequest::chunk(&b"data"[..])),
    ];
    let err = service
        .upload(&CallContext::new(), stream::iter(messages))
        .await
        .unwrap_err();

    assert_eq!(err, Error::NotFound { id });
    assert!(service.blobs().is_empty());
}

#[tokio::test]
async fn upload_rejects_unusable_image_types() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    for image_type in ["", "../etc", ".j/pg"] {
        let messages: Vec<Result<UploadImageRequest, Status>> = vec![
            Ok(UploadImageRequest::info(&laptop.id, image_type)),
            Ok(UploadImageRequest::chunk(&b"data"[..])),
        ];
        let err = service
            .upload(&CallContext::new(), stream::iter(messages))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{image_type}");
    }
    assert!(service.blobs().is_empty());
}

#[tokio::test]
async fn rating_stream_answers_each_score_with_the_running_average() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let requests: Vec<Result<RateLaptopRequest, Status>> = [4.0, 5.0, 3.0]
        .into_iter()
        .map(|score| {
            Ok(RateLaptopRequest {
                laptop_id: laptop.id.clone(),
                score,
            })
        })
        .collect();

    let (tx, rx) = mpsc::channel(8);
    service
        .rate(&CallContext::new(), stream::iter(requests), tx)
        .await
        .unwrap();

    let responses: Vec<RateLaptopResponse> =
        drain(rx).await.into_iter().map(Result::unwrap).collect();
    let summary: Vec<(u32, f64)> = responses
        .iter()
        .map(|r| (r.rated_count, r.average_score))
        .collect();
    assert_eq!(summary, vec![(1, 4.0), (2, 4.5), (3, 4.0)]);
    assert!(responses.iter().all(|r| r.laptop_id == laptop.id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ratings_are_never_lost() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let handles: Vec<_> = [4.0, 5.0, 3.0]
        .into_iter()
        .map(|score| {
            let service = service.clone();
            let laptop_id = laptop.id.clone();
            tokio::spawn(async move {
                let (tx, rx) = mpsc::channel(1);
                let inbound =
                    stream::iter(vec![Ok::<_, Status>(RateLaptopRequest { laptop_id, score })]);
                service.rate(&CallContext::new(), inbound, tx).await?;
                drop(rx);
                Ok::<_, Error>(())
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let rating = service.ratings().get(&laptop.id).unwrap();
    assert_eq!(rating.count, 3);
    assert_eq!(rating.average(), 4.0);
}

#[tokio::test]
async fn rating_an_unknown_laptop_ends_the_stream_with_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let requests: Vec<Result<RateLaptopRequest, Status>> = vec![
        Ok(RateLaptopRequest {
            laptop_id: laptop.id.clone(),
            score: 8.0,
        }),
        Ok(RateLaptopRequest {
            laptop_id: Uuid::new_v4().to_string(),
            score: 8.0,
        }),
        Ok(RateLaptopRequest {
            laptop_id: laptop.id.clone(),
            score: 2.0,
        }),
    ];

    let (tx, rx) = mpsc::channel(8);
    let err = service
        .rate(&CallContext::new(), stream::iter(requests), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let messages = drain(rx).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].as_ref().unwrap().rated_count, 1);
    assert_eq!(messages[1].as_ref().unwrap_err().code(), Code::NotFound);
    assert_eq!(service.ratings().get(&laptop.id).unwrap().count, 1);
}

#[tokio::test]
async fn shutdown_refuses_new_calls() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let ctx = service.call_context();

    service.shutdown().await;

    assert!(ctx.is_cancelled());
    let err = service
        .create(&CallContext::new(), sample::new_laptop())
        .await
        .unwrap_err();
    assert_eq!(err, Error::ServiceShutdown);
    assert_eq!(Status::from(err).code(), Code::Unavailable);

    let (tx, rx) = mpsc::channel(4);
    let err = service
        .search(&CallContext::new(), Filter::default(), tx)
        .await
        .unwrap_err();
    assert_eq!(err, Error::ServiceShutdown);

    let messages: Vec<Result<SearchLaptopResponse, Status>> = drain(rx).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].as_ref().unwrap_err().code(), Code::Unavailable);
}

#[tokio::test]
async fn search_cancelled_midway_stops_sending() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    for _ in 0..5 {
        stored_laptop(&service).await;
    }

    let ctx = CallContext::new();
    let (tx, mut rx) = mpsc::channel(1);
    let searcher = service.clone();
    let search_ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        searcher
            .search(&search_ctx, Filter::default(), tx)
            .await
    });

    let mut received = 0;
    for _ in 0..2 {
        rx.recv().await.unwrap().unwrap();
        received += 1;
    }
    ctx.cancel();

    assert_eq!(handle.await.unwrap(), Err(Error::RequestCancelled));
    for msg in drain(rx).await {
        msg.unwrap();
        received += 1;
    }
    assert!(received < 5, "{received} laptops sent after cancellation");
}

#[tokio::test]
async fn search_to_a_stalled_client_stops_at_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    for _ in 0..5 {
        stored_laptop(&service).await;
    }

    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    // Never read, so the second send finds the channel full.
    let (tx, _rx) = mpsc::channel(1);
    let result = timeout(
        Duration::from_secs(2),
        service.search(&ctx, Filter::default(), tx),
    )
    .await
    .expect("search blocked past its deadline");

    assert_eq!(result, Err(Error::DeadlineExceeded));
}

#[tokio::test]
async fn rate_to_a_stalled_client_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let requests: Vec<Result<RateLaptopRequest, Status>> = (0..5)
        .map(|_| {
            Ok(RateLaptopRequest {
                laptop_id: laptop.id.clone(),
                score: 5.0,
            })
        })
        .collect();

    let ctx = CallContext::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let (tx, _rx) = mpsc::channel(1);
    let result = timeout(
        Duration::from_secs(2),
        service.rate(&ctx, stream::iter(requests), tx),
    )
    .await
    .expect("rate blocked past cancellation");

    assert_eq!(result, Err(Error::RequestCancelled));
}

#[tokio::test(start_paused = true)]
async fn rate_stops_when_the_deadline_passes_between_messages() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let (in_tx, in_rx) = mpsc::channel::<Result<RateLaptopRequest, Status>>(4);
    in_tx
        .send(Ok(RateLaptopRequest {
            laptop_id: laptop.id.clone(),
            score: 7.0,
        }))
        .await
        .unwrap();

    let ctx = CallContext::new().with_timeout(Duration::from_secs(1));
    let (resp_tx, mut resp_rx) = mpsc::channel(4);
    let rater = service.clone();
    let handle = tokio::spawn(async move {
        rater
            .rate(&ctx, ReceiverStream::new(in_rx), resp_tx)
            .await
    });

    let first = resp_rx.recv().await.unwrap().unwrap();
    assert_eq!(first.rated_count, 1);

    assert_eq!(handle.await.unwrap(), Err(Error::DeadlineExceeded));
    assert!(drain(resp_rx).await.is_empty());
    assert_eq!(service.ratings().get(&laptop.id).unwrap().count, 1);
    drop(in_tx);
}

#[tokio::test]
async fn upload_cancelled_mid_stream_leaves_no_blob() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_in(dir.path());
    let laptop = stored_laptop(&service).await;

    let (in_tx, in_rx) = mpsc::channel::<Result<UploadImageRequest, Status>>(4);
    in_tx
        .send(Ok(UploadImageRequest::info(&laptop.id, ".jpg")))
        .await
        .unwrap();
    in_tx
        .send(Ok(UploadImageRequest::chunk(&b"first chunk"[..])))
        .await
        .unwrap();

    let ctx = CallContext::new();
    let uploader = service.clone();
    let upload_ctx = ctx.clone();
    let handle = tokio::spawn(async move {
        uploader
            .upload(&upload_ctx, ReceiverStream::new(in_rx))
            .await
    });

    sleep(Duration::from_millis(50)).await;
    ctx.cancel();

    assert_eq!(handle.await.unwrap(), Err(Error::RequestCancelled));
    assert!(service.blobs().is_empty());
    drop(in_tx);
}
