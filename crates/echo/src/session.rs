//! Replay sessions: drive a resolver over an open stream.
//!
//! A session streams every recorded response it resolves, then waits for
//! the stream's context to end rather than returning. Real provisioner calls
//! are long-lived and only finish when the client closes them, and callers
//! of the replay provisioner rely on the same shape.

use std::sync::Arc;

use crate::context::{Cancelled, Inbound, Outbound, StreamContext};
use crate::error::EchoError;
use crate::proto::{
    Empty, ParseRequest, ParseResponse, ProvisionRequest, ProvisionResponse, RecordedMessage,
};
use crate::resolver::{ProvisionTarget, Resolver};
use crate::storage::Storage;
use crate::store::MessageStore;

/// The replay provisioner.
///
/// Holds nothing but the storage it reads from; every call keeps its own
/// position in the recorded sequence.
#[derive(Debug, Clone)]
pub struct EchoProvisioner {
    storage: Arc<dyn Storage>,
}

impl EchoProvisioner {
    /// Create a provisioner that replays from `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The storage recorded responses are read from.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Replay the parse responses recorded in the request's directory.
    pub async fn parse<O>(
        &self,
        request: ParseRequest,
        outbound: &mut O,
        ctx: &StreamContext,
    ) -> Result<(), EchoError>
    where
        O: Outbound<ParseResponse>,
    {
        tracing::debug!(directory = %request.directory, "Parse");
        let store = MessageStore::new(Arc::clone(&self.storage), request.directory);
        drive(Resolver::<ParseResponse>::parse(store), outbound, ctx).await
    }

    /// Replay the provision responses selected by the first request.
    ///
    /// A first request that is neither a plan nor an apply replays nothing
    /// and just waits for the stream to end.
    pub async fn provision<I, O>(
        &self,
        inbound: &mut I,
        outbound: &mut O,
        ctx: &StreamContext,
    ) -> Result<(), EchoError>
    where
        I: Inbound<ProvisionRequest>,
        O: Outbound<ProvisionResponse>,
    {
        let request = tokio::select! {
            biased;
            cause = ctx.done() => return finish(cause),
            request = inbound.recv() => request?,
        };

        let Some(target) = ProvisionTarget::from_request(&request) else {
            tracing::debug!("First provision request is not a plan or apply, nothing to replay");
            return finish(ctx.done().await);
        };

        tracing::debug!(
            operation = %target.operation,
            transition = target.transition.as_str_name(),
            directory = %target.directory,
            "Provision"
        );
        let store = MessageStore::new(Arc::clone(&self.storage), target.directory.clone());
        drive(Resolver::<ProvisionResponse>::provision(store, &target), outbound, ctx).await
    }

    /// Acknowledge a shutdown request. Replay holds no resources to release.
    pub fn shutdown(&self, _request: Empty) -> Empty {
        Empty {}
    }
}

/// Phases of a replay call after its configuration is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Resolving and sending recorded responses
    Streaming,
    /// Everything is sent; only the context ending finishes the call
    AwaitingCancellation,
}

/// Turn the context's end into the call's result.
fn finish(cause: Option<Cancelled>) -> Result<(), EchoError> {
    match cause {
        Some(cause) => Err(cause.into()),
        None => Ok(()),
    }
}

async fn drive<M, O>(
    mut resolver: Resolver<M>,
    outbound: &mut O,
    ctx: &StreamContext,
) -> Result<(), EchoError>
where
    M: RecordedMessage,
    O: Outbound<M>,
{
    let mut phase = Phase::Streaming;
    let mut sent = 0usize;
    loop {
        phase = match phase {
            Phase::Streaming => {
                let next = tokio::select! {
                    biased;
                    cause = ctx.done() => return finish(cause),
                    next = resolver.next() => next?,
                };
                match next {
                    Some(message) => {
                        tokio::select! {
                            biased;
                            cause = ctx.done() => return finish(cause),
                            result = outbound.send(message) => result?,
                        }
                        sent += 1;
                        Phase::Streaming
                    }
                    None => {
                        tracing::debug!(sent, "Replay finished, waiting for the stream to end");
                        Phase::AwaitingCancellation
                    }
                }
            }
            Phase::AwaitingCancellation => return finish(ctx.done().await),
        };
    }
}
