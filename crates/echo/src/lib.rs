//! Echo: a replay provisioner for tests
//!
//! Instead of running infrastructure operations, the echo provisioner streams
//! protocol responses recorded in a directory, in order, over the same
//! streaming calls a real provisioner serves. Tests use it to exercise request
//! framing, streaming and cancellation without a real backend.
//!
//! # Layout of a replay directory
//!
//! ```text
//! 0.parse.protobuf
//! 0.provision.apply.protobuf
//! 1.provision.apply.protobuf
//! 0.provision.plan.protobuf
//! 0.destroy.provision.apply.protobuf
//! ```
//!
//! Each file is one encoded response. A call streams index 0, 1, 2, ... until
//! an index is missing; if index 0 is missing the call fails with "no state".
//! Transition-specific names are probed before default names at every index.
//!
//! Directories are produced with [`pack`], which writes a [`Responses`] set
//! as a tar archive in exactly this layout.

pub mod proto;

mod archive;
mod context;
mod error;
mod naming;
mod resolver;
pub mod responses;
mod session;
mod storage;
mod store;

pub use archive::{ArchiveEntry, Responses, entries, pack, read_directory, unpack};
pub use context::{Cancelled, Inbound, Outbound, StreamContext};
pub use error::EchoError;
pub use naming::{EntryName, InvalidName, Operation, entry_path};
pub use resolver::{LogFilter, ProvisionTarget, Resolver, ResolverState};
pub use session::EchoProvisioner;
pub use storage::{DirEntry, DirectoryStorage, MemoryStorage, Metadata, Storage, StorageError};
pub use store::{MessageStore, StoredEntry};
