//! Archive codec for canned responses.
//!
//! [`pack`] writes a [`Responses`] set into a tar archive whose entry names
//! follow [`crate::naming`]. Unpacking that archive into a directory (or into
//! a [`crate::MemoryStorage`]) yields exactly the layout replay reads from.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::Read;

use prost::Message;
use serde::Serialize;
use tar::{Archive, Builder, EntryType, Header};

use crate::error::EchoError;
use crate::naming::{EntryName, Operation, file_path};
use crate::proto::{ParseResponse, ProvisionResponse, RecordedMessage, WorkspaceTransition};
use crate::responses;
use crate::storage::Storage;

/// File mode of every packed entry.
const ENTRY_MODE: u32 = 0o644;

/// A complete set of canned responses for one replay directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Responses {
    /// Responses to Parse
    pub parse: Vec<ParseResponse>,
    /// Responses to an apply Provision
    pub provision_apply: Vec<ProvisionResponse>,
    /// Responses to a plan Provision. `None` replays the apply responses.
    pub provision_plan: Option<Vec<ProvisionResponse>>,
    /// Apply responses that override the defaults for a single transition
    pub provision_apply_map: BTreeMap<WorkspaceTransition, Vec<ProvisionResponse>>,
    /// Plan responses that override the defaults for a single transition
    pub provision_plan_map: BTreeMap<WorkspaceTransition, Vec<ProvisionResponse>>,
}

impl Responses {
    /// The set used when a test has nothing specific to say: every operation
    /// completes immediately with an empty result.
    pub fn complete() -> Self {
        Self {
            parse: responses::parse_complete(),
            provision_apply: responses::provision_complete(),
            provision_plan: Some(responses::provision_complete()),
            ..Self::default()
        }
    }

    /// The plan sequence, falling back to the apply sequence.
    pub fn plan(&self) -> &[ProvisionResponse] {
        self.provision_plan
            .as_deref()
            .unwrap_or(&self.provision_apply)
    }
}

/// A named blob inside a packed archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// Entry name, e.g. `0.provision.apply.protobuf`
    pub name: String,
    /// Encoded response
    #[serde(skip)]
    pub data: Vec<u8>,
}

fn write_entry<M: Message>(
    builder: &mut Builder<Vec<u8>>,
    name: EntryName,
    message: &M,
) -> Result<(), EchoError> {
    let data = message.encode_to_vec();
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(ENTRY_MODE);
    builder.append_data(&mut header, name.to_string(), data.as_slice())?;
    Ok(())
}

fn write_sequence<M: Message>(
    builder: &mut Builder<Vec<u8>>,
    messages: &[M],
    name: impl Fn(usize) -> EntryName,
) -> Result<(), EchoError> {
    for (index, message) in messages.iter().enumerate() {
        write_entry(builder, name(index), message)?;
    }
    Ok(())
}

/// Pack a response set into a tar archive.
pub fn pack(responses: &Responses) -> Result<Vec<u8>, EchoError> {
    let mut builder = Builder::new(Vec::new());

    write_sequence(&mut builder, &responses.parse, EntryName::parse)?;
    write_sequence(&mut builder, &responses.provision_apply, |i| {
        EntryName::provision(Operation::Apply, i)
    })?;
    write_sequence(&mut builder, responses.plan(), |i| {
        EntryName::provision(Operation::Plan, i)
    })?;
    for (&transition, messages) in &responses.provision_apply_map {
        write_sequence(&mut builder, messages, |i| {
            EntryName::transition(Operation::Apply, transition, i)
        })?;
    }
    for (&transition, messages) in &responses.provision_plan_map {
        write_sequence(&mut builder, messages, |i| {
            EntryName::transition(Operation::Plan, transition, i)
        })?;
    }

    Ok(builder.into_inner()?)
}

/// List the regular-file entries of a packed archive, in archive order.
pub fn entries(archive: &[u8]) -> Result<Vec<ArchiveEntry>, EchoError> {
    let mut archive = Archive::new(archive);
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        let name = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        entries.push(ArchiveEntry { name, data });
    }
    Ok(entries)
}

/// Collects recorded responses by name and checks that every sequence is
/// dense from index 0.
#[derive(Default)]
struct Collector {
    parse: BTreeMap<usize, ParseResponse>,
    provision: BTreeMap<(Operation, Option<WorkspaceTransition>), BTreeMap<usize, ProvisionResponse>>,
}

impl Collector {
    fn add(&mut self, raw_name: &str, data: &[u8]) -> Result<(), EchoError> {
        let file_name = raw_name.rsplit('/').next().unwrap_or(raw_name);
        let name: EntryName = file_name.parse().map_err(|_| EchoError::InvalidEntry {
            name: raw_name.to_string(),
            reason: "name does not follow the recorded response convention".to_string(),
        })?;
        let decode_err = |source| EchoError::Decode {
            path: raw_name.to_string(),
            source,
        };
        match name.operation {
            Operation::Parse => {
                let message = ParseResponse::decode(data).map_err(decode_err)?;
                insert_once(&mut self.parse, raw_name, name.index, message)
            }
            Operation::Apply | Operation::Plan => {
                let message = ProvisionResponse::decode(data).map_err(decode_err)?;
                let sequence = self
                    .provision
                    .entry((name.operation, name.transition))
                    .or_default();
                insert_once(sequence, raw_name, name.index, message)
            }
        }
    }

    fn finish(mut self) -> Result<Responses, EchoError> {
        let mut responses = Responses {
            parse: dense(self.parse, EntryName::parse)?,
            ..Responses::default()
        };
        if let Some(apply) = self.provision.remove(&(Operation::Apply, None)) {
            responses.provision_apply =
                dense(apply, |i| EntryName::provision(Operation::Apply, i))?;
        }
        if let Some(plan) = self.provision.remove(&(Operation::Plan, None)) {
            responses.provision_plan = Some(dense(plan, |i| {
                EntryName::provision(Operation::Plan, i)
            })?);
        }
        for ((operation, transition), messages) in self.provision {
            let Some(transition) = transition else {
                continue;
            };
            let messages = dense(messages, |i| {
                EntryName::transition(operation, transition, i)
            })?;
            match operation {
                Operation::Apply => responses.provision_apply_map.insert(transition, messages),
                Operation::Plan => responses.provision_plan_map.insert(transition, messages),
                Operation::Parse => None,
            };
        }
        Ok(responses)
    }
}

/// Record one entry of a sequence, rejecting a second entry at the same index.
///
/// Names that differ only in case or index padding land on the same slot.
fn insert_once<M>(
    sequence: &mut BTreeMap<usize, M>,
    raw_name: &str,
    index: usize,
    message: M,
) -> Result<(), EchoError> {
    match sequence.entry(index) {
        Entry::Vacant(slot) => {
            slot.insert(message);
            Ok(())
        }
        Entry::Occupied(_) => Err(EchoError::InvalidEntry {
            name: raw_name.to_string(),
            reason: format!("sequence already has an entry at index {index}"),
        }),
    }
}

/// Flatten an indexed sequence, rejecting gaps.
///
/// Replay stops at the first missing index, so anything recorded after a gap
/// could never be streamed.
fn dense<M: RecordedMessage>(
    messages: BTreeMap<usize, M>,
    name: impl Fn(usize) -> EntryName,
) -> Result<Vec<M>, EchoError> {
    let mut out = Vec::with_capacity(messages.len());
    for (expected, (index, message)) in messages.into_iter().enumerate() {
        if index != expected {
            return Err(EchoError::InvalidEntry {
                name: name(index).to_string(),
                reason: format!("sequence has no entry at index {expected}"),
            });
        }
        out.push(message);
    }
    Ok(out)
}

/// Rebuild a response set from a packed archive.
pub fn unpack(archive: &[u8]) -> Result<Responses, EchoError> {
    let mut collector = Collector::default();
    for entry in entries(archive)? {
        collector.add(&entry.name, &entry.data)?;
    }
    collector.finish()
}

/// Rebuild a response set from a replay directory.
///
/// Files that do not follow the naming convention are ignored, since replay
/// directories often hold other template files too.
pub async fn read_directory(
    storage: &dyn Storage,
    directory: &str,
) -> Result<Responses, EchoError> {
    let storage_err = |path: &str| {
        let path = path.to_string();
        move |source| EchoError::Storage { path, source }
    };

    let mut collector = Collector::default();
    for entry in storage
        .list(directory)
        .await
        .map_err(storage_err(directory))?
    {
        if entry.is_dir {
            continue;
        }
        if entry.name.parse::<EntryName>().is_err() {
            tracing::debug!(name = %entry.name, "Skipping unrecognized file");
            continue;
        }
        let path = file_path(directory, &entry.name);
        let data = storage.read(&path).await.map_err(storage_err(&path))?;
        collector.add(&path, &data)?;
    }
    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Log, LogLevel, ParseComplete, provision_response};
    use crate::storage::MemoryStorage;

    fn log(output: &str) -> ProvisionResponse {
        ProvisionResponse {
            r#type: Some(provision_response::Type::Log(Log {
                level: LogLevel::Info.into(),
                output: output.to_string(),
            })),
        }
    }

    fn names(archive: &[u8]) -> Vec<String> {
        entries(archive)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[test]
    fn plan_defaults_to_apply() {
        let responses = Responses {
            provision_apply: vec![log("a"), log("b")],
            ..Responses::default()
        };
        let archive = pack(&responses).unwrap();
        assert_eq!(
            names(&archive),
            vec![
                "0.provision.apply.protobuf",
                "1.provision.apply.protobuf",
                "0.provision.plan.protobuf",
                "1.provision.plan.protobuf",
            ]
        );

        let unpacked = unpack(&archive).unwrap();
        assert_eq!(unpacked.provision_apply, responses.provision_apply);
        assert_eq!(unpacked.plan(), responses.provision_apply.as_slice());
    }

    #[test]
    fn transition_overrides_use_lowercase_names() {
        let mut responses = Responses::complete();
        responses
            .provision_apply_map
            .insert(WorkspaceTransition::Destroy, vec![log("bye")]);
        responses
            .provision_plan_map
            .insert(WorkspaceTransition::Stop, vec![log("p0"), log("p1")]);

        let archive = pack(&responses).unwrap();
        let names = names(&archive);
        assert!(names.contains(&"0.destroy.provision.apply.protobuf".to_string()));
        assert!(names.contains(&"1.stop.provision.plan.protobuf".to_string()));

        assert_eq!(unpack(&archive).unwrap(), responses);
    }

    #[test]
    fn entries_carry_encoded_messages() {
        let responses = Responses {
            parse: vec![ParseResponse {
                r#type: Some(crate::proto::parse_response::Type::Complete(ParseComplete {
                    error: "bad template".to_string(),
                    readme: Vec::new(),
                })),
            }],
            ..Responses::default()
        };
        let archive = pack(&responses).unwrap();
        let entries = entries(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, responses.parse[0].encode_to_vec());
    }

    #[test]
    fn unpack_rejects_gaps() {
        let mut builder = Builder::new(Vec::new());
        write_entry(
            &mut builder,
            EntryName::provision(Operation::Apply, 0),
            &log("0"),
        )
        .unwrap();
        write_entry(
            &mut builder,
            EntryName::provision(Operation::Apply, 2),
            &log("2"),
        )
        .unwrap();
        let archive = builder.into_inner().unwrap();

        let err = unpack(&archive).unwrap_err();
        assert!(matches!(err, EchoError::InvalidEntry { .. }), "{err}");
    }

    #[test]
    fn unpack_rejects_foreign_entries() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_ustar();
        header.set_entry_type(EntryType::Regular);
        header.set_size(2);
        header.set_mode(ENTRY_MODE);
        builder
            .append_data(&mut header, "main.tf", &b"{}"[..])
            .unwrap();
        let archive = builder.into_inner().unwrap();

        assert!(matches!(
            unpack(&archive),
            Err(EchoError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn unpack_rejects_duplicate_indices() {
        let mut builder = Builder::new(Vec::new());
        for name in ["0.stop.provision.plan.protobuf", "0.STOP.provision.plan.protobuf"] {
            let data = log(name).encode_to_vec();
            let mut header = Header::new_ustar();
            header.set_entry_type(EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(ENTRY_MODE);
            builder
                .append_data(&mut header, name, data.as_slice())
                .unwrap();
        }
        let archive = builder.into_inner().unwrap();

        match unpack(&archive).unwrap_err() {
            EchoError::InvalidEntry { name, .. } => {
                assert_eq!(name, "0.STOP.provision.plan.protobuf");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn read_directory_reads_names_as_listed() {
        let storage = MemoryStorage::new();
        storage
            .insert("/f/0.provision.apply.protobuf", log("default").encode_to_vec())
            .await;
        storage
            .insert("/f/0.STOP.provision.apply.protobuf", log("stop").encode_to_vec())
            .await;

        let read = read_directory(&storage, "/f").await.unwrap();
        assert_eq!(read.provision_apply, vec![log("default")]);
        assert_eq!(
            read.provision_apply_map.get(&WorkspaceTransition::Stop),
            Some(&vec![log("stop")])
        );
    }

    #[tokio::test]
    async fn read_directory_rejects_padded_duplicates() {
        let storage = MemoryStorage::new();
        let parse = Responses::complete().parse;
        storage
            .insert("/f/0.parse.protobuf", parse[0].encode_to_vec())
            .await;
        storage
            .insert("/f/00.parse.protobuf", parse[0].encode_to_vec())
            .await;

        let err = read_directory(&storage, "/f").await.unwrap_err();
        assert!(matches!(err, EchoError::InvalidEntry { .. }), "{err}");
    }

    #[tokio::test]
    async fn read_directory_matches_packed_set() {
        let mut responses = Responses::complete();
        responses.provision_plan = Some(vec![log("planning"), log("planned")]);
        responses
            .provision_apply_map
            .insert(WorkspaceTransition::Start, vec![log("starting")]);

        let storage = MemoryStorage::from_archive("/fixtures", &pack(&responses).unwrap()).unwrap();
        storage.insert("/fixtures/main.tf", b"resource {}".to_vec()).await;

        let read = read_directory(&storage, "/fixtures").await.unwrap();
        assert_eq!(read, responses);
    }
}
