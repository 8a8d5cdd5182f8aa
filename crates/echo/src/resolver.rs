//! Response resolution: which recorded message a call streams next.

use std::marker::PhantomData;

use crate::error::EchoError;
use crate::naming::Operation;
use crate::proto::{
    LogLevel, ParseResponse, ProvisionConfig, ProvisionRequest, ProvisionResponse,
    RecordedMessage, WorkspaceTransition, provision_request,
};
use crate::store::MessageStore;

/// Suppresses recorded log responses below a minimum level.
///
/// Non-log responses always pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogFilter {
    threshold: Option<i32>,
}

impl LogFilter {
    /// A filter that lets every response through.
    pub fn all() -> Self {
        Self { threshold: None }
    }

    /// A filter that drops logs below `level`.
    pub fn at_least(level: LogLevel) -> Self {
        Self {
            threshold: Some(level.into()),
        }
    }

    /// Build a filter from a provision config's log level string.
    ///
    /// The empty string disables filtering. Names match case-insensitively;
    /// an unknown name counts as the lowest level, which also lets everything
    /// through.
    pub fn from_threshold(level: &str) -> Self {
        if level.is_empty() {
            return Self::all();
        }
        match LogLevel::from_str_name(&level.to_ascii_uppercase()) {
            Some(level) => Self::at_least(level),
            None => {
                tracing::warn!(level, "Unknown provisioner log level, not filtering logs");
                Self::at_least(LogLevel::Trace)
            }
        }
    }

    /// Whether `message` should be streamed.
    pub fn allows<M: RecordedMessage>(&self, message: &M) -> bool {
        match (message.log_level(), self.threshold) {
            (Some(level), Some(threshold)) => level >= threshold,
            _ => true,
        }
    }
}

/// Where a resolver is in its sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// The next lookup is at this index
    Reading(usize),
    /// The sequence has ended, or resolution failed
    Exhausted,
}

/// What a Provision call replays, fixed by its first request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionTarget {
    /// Apply or plan
    pub operation: Operation,
    /// Transition whose overrides are probed first
    pub transition: WorkspaceTransition,
    /// Directory holding the recorded responses
    pub directory: String,
    /// Log level string from the config
    pub log_level: String,
}

impl ProvisionTarget {
    /// Read the target out of a Provision call's first request.
    ///
    /// Returns `None` for a request that is neither a plan nor an apply, such
    /// as a cancel; such a call replays nothing.
    pub fn from_request(request: &ProvisionRequest) -> Option<Self> {
        let operation = match request.r#type {
            Some(provision_request::Type::Plan(_)) => Operation::Plan,
            Some(provision_request::Type::Apply(_)) => Operation::Apply,
            _ => return None,
        };
        let default_config = ProvisionConfig::default();
        let config = request.config().unwrap_or(&default_config);
        Some(Self {
            operation,
            transition: config.transition(),
            directory: config.directory.clone(),
            log_level: config.provisioner_log_level.clone(),
        })
    }
}

/// Walks one recorded sequence, yielding the messages to stream in order.
#[derive(Debug)]
pub struct Resolver<M> {
    store: MessageStore,
    operation: Operation,
    transition: Option<WorkspaceTransition>,
    filter: LogFilter,
    state: ResolverState,
    _message: PhantomData<fn() -> M>,
}

impl Resolver<ParseResponse> {
    /// Resolver for a Parse call.
    pub fn parse(store: MessageStore) -> Self {
        Self::new(store, Operation::Parse, None, LogFilter::all())
    }
}

impl Resolver<ProvisionResponse> {
    /// Resolver for a Provision call.
    pub fn provision(store: MessageStore, target: &ProvisionTarget) -> Self {
        Self::new(
            store,
            target.operation,
            Some(target.transition),
            LogFilter::from_threshold(&target.log_level),
        )
    }
}

impl<M: RecordedMessage> Resolver<M> {
    /// Create a resolver starting at index 0.
    pub fn new(
        store: MessageStore,
        operation: Operation,
        transition: Option<WorkspaceTransition>,
        filter: LogFilter,
    ) -> Self {
        Self {
            store,
            operation,
            transition,
            filter,
            state: ResolverState::Reading(0),
            _message: PhantomData,
        }
    }

    /// Current position.
    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// Resolve the next message to stream.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted. Filtered log
    /// responses are skipped without being returned. Any error is terminal:
    /// later calls return `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<M>, EchoError> {
        let result = self.advance().await;
        if result.is_err() {
            self.state = ResolverState::Exhausted;
        }
        result
    }

    async fn advance(&mut self) -> Result<Option<M>, EchoError> {
        loop {
            let ResolverState::Reading(index) = self.state else {
                return Ok(None);
            };

            let Some(entry) = self
                .store
                .lookup(self.operation, self.transition, index)
                .await?
            else {
                tracing::debug!(operation = %self.operation, index, "Recorded responses exhausted");
                self.state = ResolverState::Exhausted;
                return Ok(None);
            };
            self.state = ResolverState::Reading(index + 1);

            let message = <M as prost::Message>::decode(entry.data.as_slice()).map_err(
                |source| EchoError::Decode {
                    path: entry.path.clone(),
                    source,
                },
            )?;
            if !self.filter.allows(&message) {
                tracing::debug!(path = %entry.path, "Suppressed log response below threshold");
                continue;
            }

            tracing::debug!(path = %entry.path, "Replaying recorded response");
            return Ok(Some(message));
        }
    }
}
