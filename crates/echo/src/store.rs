//! Lookup of recorded responses by operation, transition and index.

use std::sync::Arc;

use crate::error::EchoError;
use crate::naming::{EntryName, Operation, entry_path};
use crate::proto::WorkspaceTransition;
use crate::storage::Storage;

/// A recorded response found in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Full path the entry was read from
    pub path: String,
    /// Encoded response
    pub data: Vec<u8>,
}

/// Recorded responses under one request directory.
#[derive(Debug, Clone)]
pub struct MessageStore {
    storage: Arc<dyn Storage>,
    directory: String,
}

impl MessageStore {
    /// Open the store for `directory`.
    pub fn new(storage: Arc<dyn Storage>, directory: impl Into<String>) -> Self {
        Self {
            storage,
            directory: directory.into(),
        }
    }

    /// The request directory this store reads from.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Candidate names for one index, most specific first.
    fn candidates(
        operation: Operation,
        transition: Option<WorkspaceTransition>,
        index: usize,
    ) -> Vec<EntryName> {
        match (operation, transition) {
            (Operation::Parse, _) | (_, None) => vec![EntryName {
                operation,
                transition: None,
                index,
            }],
            (_, Some(transition)) => vec![
                EntryName::transition(operation, transition, index),
                EntryName::provision(operation, index),
            ],
        }
    }

    /// Find the entry at `index`.
    ///
    /// With a transition, the transition-specific name is probed before the
    /// default name. Returns `Ok(None)` once a sequence runs out, but
    /// [`EchoError::NoState`] if nothing exists at index 0.
    pub async fn lookup(
        &self,
        operation: Operation,
        transition: Option<WorkspaceTransition>,
        index: usize,
    ) -> Result<Option<StoredEntry>, EchoError> {
        let mut last_probed = String::new();
        for name in Self::candidates(operation, transition, index) {
            let path = entry_path(&self.directory, &name);
            match self.storage.stat(&path).await {
                Ok(_) => {
                    let data = self
                        .storage
                        .read(&path)
                        .await
                        .map_err(|source| EchoError::Storage {
                            path: path.clone(),
                            source,
                        })?;
                    return Ok(Some(StoredEntry { path, data }));
                }
                Err(err) if err.is_not_found() => {
                    tracing::trace!(%path, "No recorded response");
                    last_probed = path;
                }
                Err(source) => return Err(EchoError::Storage { path, source }),
            }
        }

        if index == 0 {
            return Err(EchoError::NoState { path: last_probed });
        }
        Ok(None)
    }
}
