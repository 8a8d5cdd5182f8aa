//! gRPC server implementation for the Provisioner service.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use echo::{DirectoryStorage, EchoError, EchoProvisioner, MemoryStorage, Storage, StreamContext};

use crate::proto::{self, Empty, ParseRequest, ParseResponse, ProvisionRequest, ProvisionResponse};

/// Buffered responses per call before a send waits on the client.
const RESPONSE_BUFFER: usize = 32;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// The Provisioner gRPC service implementation.
///
/// Each call runs its replay session on its own task. The session's context
/// is cancelled when the client drops the call or when the service's
/// shutdown token fires.
#[derive(Clone, Debug)]
pub struct EchoService {
    provisioner: EchoProvisioner,
    shutdown: CancellationToken,
}

impl EchoService {
    /// Create a service replaying from `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_shutdown(storage, CancellationToken::new())
    }

    /// Create a service whose open calls all end when `shutdown` fires.
    pub fn with_shutdown(storage: Arc<dyn Storage>, shutdown: CancellationToken) -> Self {
        Self {
            provisioner: EchoProvisioner::new(storage),
            shutdown,
        }
    }

    /// Open the response half of a call.
    fn open_stream<T: Send + 'static>(
        &self,
    ) -> (
        mpsc::Sender<Result<T, Status>>,
        ResponseStream<T>,
        StreamContext,
    ) {
        let (tx, rx) = mpsc::channel::<Result<T, Status>>(RESPONSE_BUFFER);
        let ctx = StreamContext::with_parent(&self.shutdown);

        // The receiver is dropped when the client goes away.
        tokio::spawn({
            let tx = tx.clone();
            let ctx = ctx.clone();
            async move {
                tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("Client dropped the call");
                        ctx.cancel();
                    }
                    _ = ctx.done() => {}
                }
            }
        });

        let stream = ReceiverStream::new(rx);
        (tx, Box::pin(stream) as ResponseStream<T>, ctx)
    }
}

/// Log how a call ended and hand failures to the client as its final status.
async fn report<T>(
    call: &str,
    result: Result<(), EchoError>,
    tx: &mpsc::Sender<Result<T, Status>>,
) {
    match result {
        Ok(()) => tracing::debug!(call, "Call finished"),
        Err(e @ EchoError::Cancelled(_)) => {
            tracing::debug!(call, cause = %e, "Call ended by its context");
            // Fails when the client is already gone.
            let _ = tx.send(Err(e.into())).await;
        }
        Err(e) => {
            tracing::warn!(call, "Replay failed: {}", e);
            let _ = tx.send(Err(e.into())).await;
        }
    }
}

#[tonic::async_trait]
impl proto::provisioner_server::Provisioner for EchoService {
    type ParseStream = ResponseStream<ParseResponse>;
    type ProvisionStream = ResponseStream<ProvisionResponse>;

    async fn parse(
        &self,
        request: Request<ParseRequest>,
    ) -> Result<Response<Self::ParseStream>, Status> {
        let request = request.into_inner();
        let (mut tx, stream, ctx) = self.open_stream::<ParseResponse>();
        let provisioner = self.provisioner.clone();

        tokio::spawn(async move {
            let result = provisioner.parse(request, &mut tx, &ctx).await;
            report("parse", result, &tx).await;
            ctx.close();
        });

        Ok(Response::new(stream))
    }

    async fn provision(
        &self,
        request: Request<Streaming<ProvisionRequest>>,
    ) -> Result<Response<Self::ProvisionStream>, Status> {
        let mut inbound = request.into_inner();
        let (mut tx, stream, ctx) = self.open_stream::<ProvisionResponse>();
        let provisioner = self.provisioner.clone();

        tokio::spawn(async move {
            let result = provisioner.provision(&mut inbound, &mut tx, &ctx).await;
            report("provision", result, &tx).await;
            ctx.close();
        });

        Ok(Response::new(stream))
    }

    async fn shutdown(&self, request: Request<Empty>) -> Result<Response<Empty>, Status> {
        tracing::debug!("Shutdown requested");
        Ok(Response::new(self.provisioner.shutdown(request.into_inner())))
    }
}

/// Where a server reads recorded responses from.
#[derive(Debug, Clone)]
pub enum Source {
    /// The host filesystem, optionally confined to a root directory
    Filesystem {
        /// Directory that request paths resolve beneath
        root: Option<PathBuf>,
    },
    /// A packed archive loaded into memory
    Archive {
        /// Archive file produced by `echo::pack`
        path: PathBuf,
        /// Directory the archive's entries appear under
        mount: String,
    },
}

impl Source {
    /// Open the storage this source describes.
    pub async fn open(&self) -> Result<Arc<dyn Storage>, EchoError> {
        match self {
            Self::Filesystem { root: None } => Ok(Arc::new(DirectoryStorage::new())),
            Self::Filesystem { root: Some(root) } => {
                Ok(Arc::new(DirectoryStorage::rooted(root.clone())))
            }
            Self::Archive { path, mount } => {
                let archive = tokio::fs::read(path).await?;
                Ok(Arc::new(MemoryStorage::from_archive(mount, &archive)?))
            }
        }
    }
}

/// Server configuration and runner.
#[derive(Debug)]
pub struct EchoServer {
    addr: std::net::SocketAddr,
    source: Source,
}

impl EchoServer {
    /// Create a new server bound to the given address.
    pub fn new(addr: std::net::SocketAddr, source: Source) -> Self {
        Self { addr, source }
    }

    /// Run the server until shutdown signal.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let storage = self.source.open().await?;
        let shutdown = CancellationToken::new();
        let service = EchoService::with_shutdown(storage, shutdown.clone());

        tracing::info!(source = ?self.source, "Starting gRPC server on {}", self.addr);

        tonic::transport::Server::builder()
            .add_service(proto::provisioner_server::ProvisionerServer::new(service))
            .serve_with_shutdown(self.addr, cancel_on_signal(shutdown))
            .await?;

        tracing::info!("gRPC server shut down");
        Ok(())
    }
}

/// Cancel `shutdown` on Ctrl+C or, on unix, SIGTERM.
///
/// Open calls only end when their context does, so the token has to fire
/// before the transport can drain.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let signal = tokio::select! {
        name = ctrl_c() => name,
        name = terminate() => name,
    };
    tracing::info!(signal, "Shutting down, cancelling open calls");
    shutdown.cancel();
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn terminate() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
            "SIGTERM"
        }
        Err(e) => {
            tracing::error!("Failed to listen for SIGTERM: {}", e);
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() -> &'static str {
    std::future::pending().await
}
