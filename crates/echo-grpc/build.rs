//! Generates the `provisioner.Provisioner` service from the hand-declared
//! prost messages in `echo::proto`, so no `.proto` file or `protoc` is needed.

use tonic_build::manual::{Builder, Method, Service};

fn method(name: &str, route: &str, input: &str, output: &str) -> tonic_build::manual::MethodBuilder {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("echo::proto::{input}"))
        .output_type(format!("echo::proto::{output}"))
        .codec_path("tonic::codec::ProstCodec")
}

fn main() {
    let service = Service::builder()
        .name("Provisioner")
        .package("provisioner")
        .comment("Replays recorded provisioner responses.")
        .method(
            method("parse", "Parse", "ParseRequest", "ParseResponse")
                .server_streaming()
                .build(),
        )
        .method(
            method("provision", "Provision", "ProvisionRequest", "ProvisionResponse")
                .client_streaming()
                .server_streaming()
                .build(),
        )
        .method(method("shutdown", "Shutdown", "Empty", "Empty").build())
        .build();

    Builder::new()
        .build_server(true)
        .build_client(true) // Useful for testing
        .compile(&[service]);
}
