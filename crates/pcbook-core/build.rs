/// Generates the gRPC client and server code for the `pcbook.LaptopService`
/// using `tonic-build`'s manual service builder.
///
/// The message types are plain `prost` derives living in `src/proto.rs`, so no
/// `.proto` file or `protoc` binary is involved. Only the service plumbing
/// (server trait, router, client) is generated here.
///
/// # Methods
///
/// | RPC            | Kind                    |
/// |----------------|-------------------------|
/// | `CreateLaptop` | unary                   |
/// | `SearchLaptop` | server streaming        |
/// | `UploadImage`  | client streaming        |
/// | `RateLaptop`   | bidirectional streaming |
///
/// # Output
///
/// Generated code lands in `OUT_DIR/pcbook.LaptopService.rs` and is included
/// by the `proto` module:
///
/// ```rust,ignore
/// include!(concat!(env!("OUT_DIR"), "/pcbook.LaptopService.rs"));
/// ```
use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic_prost::ProstCodec";

fn main() {
    let service = Service::builder()
        .name("LaptopService")
        .package("pcbook")
        .method(
            Method::builder()
                .name("create_laptop")
                .route_name("CreateLaptop")
                .input_type("crate::proto::CreateLaptopRequest")
                .output_type("crate::proto::CreateLaptopResponse")
                .codec_path(CODEC)
                .build(),
        )
        .method(
            Method::builder()
                .name("search_laptop")
                .route_name("SearchLaptop")
                .input_type("crate::proto::SearchLaptopRequest")
                .output_type("crate::proto::SearchLaptopResponse")
                .codec_path(CODEC)
                .server_streaming()
                .build(),
        )
        .method(
            Method::builder()
                .name("upload_image")
                .route_name("UploadImage")
                .input_type("crate::proto::UploadImageRequest")
                .output_type("crate::proto::UploadImageResponse")
                .codec_path(CODEC)
                .client_streaming()
                .build(),
        )
        .method(
            Method::builder()
                .name("rate_laptop")
                .route_name("RateLaptop")
                .input_type("crate::proto::RateLaptopRequest")
                .output_type("crate::proto::RateLaptopResponse")
                .codec_path(CODEC)
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .build();

    Builder::new().compile(&[service]);
}
