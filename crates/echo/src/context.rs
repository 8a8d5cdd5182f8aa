//! Stream context and the stream halves a session talks to.
//!
//! A [`StreamContext`] is the only way a replay call ends after it has run
//! out of recorded responses. Whoever owns the transport cancels it when the
//! client goes away, and the session returns the recorded cause.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::error::EchoError;

/// Why a stream context ended with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Cancelled {
    /// The client or the server canceled the call
    #[error("context canceled")]
    Canceled,
    /// The call ran past its deadline
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal for one open stream.
///
/// Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    token: CancellationToken,
    cause: Arc<OnceLock<Option<Cancelled>>>,
}

impl StreamContext {
    /// Create a context that only ends when told to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that also ends when `parent` is cancelled.
    ///
    /// Ending through the parent reports [`Cancelled::Canceled`].
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            cause: Arc::default(),
        }
    }

    /// End the stream as canceled.
    pub fn cancel(&self) {
        self.end(Some(Cancelled::Canceled));
    }

    /// End the stream as having run past its deadline.
    pub fn expire(&self) {
        self.end(Some(Cancelled::DeadlineExceeded));
    }

    /// End the stream cleanly. A waiting session returns `Ok(())`.
    pub fn close(&self) {
        self.end(None);
    }

    fn end(&self, cause: Option<Cancelled>) {
        // First cause wins, including a parent that fired before us.
        self.record_parent_end();
        let _ = self.cause.set(cause);
        self.token.cancel();
    }

    /// Record `Canceled` if the token fired without a local end.
    ///
    /// Local ends set the cause before cancelling the token, so a fired
    /// token with no cause can only come from the parent.
    fn record_parent_end(&self) {
        if self.token.is_cancelled() {
            let _ = self.cause.set(Some(Cancelled::Canceled));
        }
    }

    /// Whether the context has ended.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The error the context ended with, if it has ended with one.
    pub fn err(&self) -> Option<Cancelled> {
        if !self.is_done() {
            return None;
        }
        self.record_parent_end();
        self.cause.get().copied().flatten()
    }

    /// Wait for the context to end and return its error.
    pub async fn done(&self) -> Option<Cancelled> {
        self.token.cancelled().await;
        self.err()
    }
}

/// The receiving half of a stream.
#[async_trait]
pub trait Inbound<T>: Send {
    /// Wait for the next message from the client.
    async fn recv(&mut self) -> Result<T, EchoError>;
}

#[async_trait]
impl<T, S> Inbound<T> for S
where
    S: Stream<Item = Result<T, Status>> + Unpin + Send,
    T: Send + 'static,
{
    async fn recv(&mut self) -> Result<T, EchoError> {
        match self.next().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(status)) => Err(EchoError::Transport(status)),
            None => Err(EchoError::EndOfStream),
        }
    }
}

/// The sending half of a stream.
#[async_trait]
pub trait Outbound<T>: Send {
    /// Send one message to the client.
    async fn send(&mut self, message: T) -> Result<(), EchoError>;
}

#[async_trait]
impl<T: Send + 'static> Outbound<T> for mpsc::Sender<Result<T, Status>> {
    async fn send(&mut self, message: T) -> Result<(), EchoError> {
        mpsc::Sender::send(self, Ok(message))
            .await
            .map_err(|_| EchoError::Transport(Status::unavailable("response stream closed")))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn first_cause_wins() {
        let ctx = StreamContext::new();
        assert!(!ctx.is_done());
        assert_eq!(ctx.err(), None);

        ctx.expire();
        ctx.cancel();
        assert!(ctx.is_done());
        assert_eq!(ctx.done().await, Some(Cancelled::DeadlineExceeded));
    }

    #[tokio::test]
    async fn close_is_clean() {
        let ctx = StreamContext::new();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.done().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn parent_cancellation_reports_canceled() {
        let parent = CancellationToken::new();
        let ctx = StreamContext::with_parent(&parent);
        parent.cancel();
        assert_eq!(ctx.done().await, Some(Cancelled::Canceled));
    }

    #[tokio::test]
    async fn parent_end_is_not_overwritten_by_a_later_close() {
        let parent = CancellationToken::new();
        let ctx = StreamContext::with_parent(&parent);
        parent.cancel();

        ctx.close();
        assert_eq!(ctx.err(), Some(Cancelled::Canceled));
        assert_eq!(ctx.clone().done().await, Some(Cancelled::Canceled));
    }

    #[tokio::test]
    async fn stream_halves() {
        let mut inbound = tokio_stream::iter(vec![Ok::<_, Status>(1u32), Err(Status::aborted("x"))]);
        assert_eq!(inbound.recv().await.unwrap(), 1);
        assert!(matches!(
            inbound.recv().await,
            Err(EchoError::Transport(status)) if status.code() == tonic::Code::Aborted
        ));
        assert!(matches!(inbound.recv().await, Err(EchoError::EndOfStream)));

        let (mut tx, mut rx) = mpsc::channel::<Result<u32, Status>>(1);
        Outbound::send(&mut tx, 7).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), 7);
        drop(rx);
        assert!(Outbound::send(&mut tx, 8).await.is_err());
    }
}
