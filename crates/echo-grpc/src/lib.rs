//! Echo gRPC Server
//!
//! Serves the replay provisioner over the `provisioner.Provisioner` gRPC
//! service, the same surface a real provisioner daemon exposes.
//!
//! # Example Flow
//!
//! ```text
//! Client                                    Server
//! │                                           │
//! │  ProvisionRequest{apply{config}}          │
//! │ ─────────────────────────────────────────>│
//! │                                           │
//! │  ProvisionResponse  (0.provision.apply)   │
//! │<───────────────────────────────────────── │
//! │  ProvisionResponse  (1.provision.apply)   │
//! │<───────────────────────────────────────── │
//! │                                           │
//! │            ... nothing more ...           │
//! │                                           │
//! │  (client drops the call)                  │
//! │ ─────────────────────────────────────────>│
//! │                                   session ends
//! ```

pub mod proto {
    #![allow(missing_docs)]
    #![allow(clippy::doc_markdown)]
    pub use echo::proto::*;
    include!(concat!(env!("OUT_DIR"), "/provisioner.Provisioner.rs"));
}

mod server;

pub use server::{EchoServer, EchoService, Source};

// Re-export proto types for convenience
pub use proto::{
    ParseRequest, ParseResponse, ProvisionRequest, ProvisionResponse,
    provisioner_client::ProvisionerClient,
    provisioner_server::ProvisionerServer as ProvisionerGrpcServer,
};
