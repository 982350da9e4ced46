//! Shard files on the blob store
//!
//! A shard is a primary file plus parts `index.part2.json`,
//! `index.part3.json`, ... each holding a contiguous slice of the entry
//! records. The primary declares how many files there are; loading reads
//! exactly that many, and any missing one is [`Error::NotFound`]. The shard
//! version is an xxh3 hash over the bytes of every file in order; a shard
//! that does not exist has version 0.

use std::collections::BTreeSet;

use memvault_core::path::{entry_storage_key, file_name, parent_dir, split_extension};
use memvault_core::{
    shard_part_path, BranchDescriptor, Error, IndexEntry, Result, ShardFile, ShardRecord,
    ValidationError,
};
use memvault_storage::{pack_greedy, BlobStore};
use serde::Deserialize;
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

/// Version of a shard with no persisted files
pub const ABSENT_VERSION: u64 = 0;

/// A shard held in memory
#[derive(Debug, Clone)]
pub struct LoadedShard {
    /// Root descriptor the shard was loaded for
    pub descriptor: BranchDescriptor,
    /// Entries in shard order
    pub entries: Vec<IndexEntry>,
    /// Version of the persisted files at load or last commit
    pub version: u64,
    /// Number of files on disk, primary included
    pub files: usize,
    /// Paths persisted at load or last commit
    pub persisted: BTreeSet<String>,
    /// In-memory entries differ from the persisted ones
    pub dirty: bool,
}

impl LoadedShard {
    /// A shard that has never been written
    pub fn empty(descriptor: BranchDescriptor) -> Self {
        LoadedShard {
            descriptor,
            entries: Vec::new(),
            version: ABSENT_VERSION,
            files: 0,
            persisted: BTreeSet::new(),
            dirty: false,
        }
    }

    /// Current in-memory path set
    pub fn paths(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    /// Position of `path` in the entry sequence
    pub fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.path == path)
    }
}

/// Raw files of a shard as read from the store
struct ShardBytes {
    files: Vec<(String, Vec<u8>)>,
    version: u64,
}

fn primary_key(descriptor: &BranchDescriptor) -> String {
    entry_storage_key(&descriptor.path)
}

#[derive(Deserialize)]
struct DeclaredParts {
    #[serde(default)]
    parts: Option<usize>,
}

/// Part files of `primary` present on the store, by ascending number
async fn stored_parts(store: &dyn BlobStore, primary: &str) -> Result<Vec<(usize, String)>> {
    let dir = parent_dir(primary);
    let (stem, ext) = split_extension(file_name(primary));
    let prefix = format!("{}.part", stem);
    let mut parts: Vec<(usize, String)> = store
        .list(dir)
        .await?
        .into_iter()
        .filter(|k| parent_dir(k) == dir)
        .filter_map(|k| {
            let n = file_name(&k)
                .strip_prefix(prefix.as_str())?
                .strip_suffix(ext)?
                .parse::<usize>()
                .ok()?;
            (n >= 2).then_some((n, k))
        })
        .collect();
    parts.sort();
    Ok(parts)
}

async fn read_files(store: &dyn BlobStore, descriptor: &BranchDescriptor) -> Result<ShardBytes> {
    let primary = primary_key(descriptor);
    let mut files = Vec::new();
    let bytes = match store.read(&primary).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => {
            return Ok(ShardBytes {
                files,
                version: ABSENT_VERSION,
            })
        }
        Err(e) => return Err(e),
    };

    // Without a declared count, every stored part up to the highest counts.
    let declared = serde_json::from_slice::<DeclaredParts>(&bytes)
        .ok()
        .and_then(|d| d.parts);
    let count = match declared {
        Some(count) => count,
        None => stored_parts(store, &primary)
            .await?
            .last()
            .map_or(1, |(n, _)| *n),
    };
    files.push((primary.clone(), bytes));

    for n in 2..=count {
        let key = shard_part_path(&primary, n);
        match store.read(&key).await {
            Ok(bytes) => files.push((key, bytes)),
            Err(e) if e.is_not_found() => {
                return Err(Error::NotFound(format!(
                    "shard part '{}' ({} of {} for '{}')",
                    key, n, count, descriptor.category
                )))
            }
            Err(e) => return Err(e),
        }
    }

    let mut hasher = Xxh3::new();
    for (_, bytes) in &files {
        hasher.update(bytes);
    }
    Ok(ShardBytes {
        files,
        version: hasher.digest(),
    })
}

/// Version of the shard as currently persisted
pub async fn persisted_version(
    store: &dyn BlobStore,
    descriptor: &BranchDescriptor,
) -> Result<u64> {
    Ok(read_files(store, descriptor).await?.version)
}

/// Load a shard, merging all of its parts
///
/// A missing primary file or part is [`Error::NotFound`]. Every file is
/// schema checked; a violation fails the whole load.
pub async fn load_shard(store: &dyn BlobStore, descriptor: &BranchDescriptor) -> Result<LoadedShard> {
    let raw = read_files(store, descriptor).await?;
    if raw.files.is_empty() {
        return Err(Error::NotFound(format!(
            "shard '{}' ({})",
            descriptor.category, descriptor.path
        )));
    }

    let namespace = descriptor.namespace();
    let mut entries = Vec::new();
    for (idx, (key, bytes)) in raw.files.iter().enumerate() {
        let file = ShardFile::parse(key, &descriptor.category, bytes)?;
        if idx > 0 && file.parts.is_some() {
            return Err(Error::Validation(ValidationError::Schema {
                file: key.clone(),
                reason: "only the primary file may declare parts".to_string(),
            }));
        }
        for record in file.files {
            entries.push(record.into_entry(namespace)?);
        }
    }

    let mut seen = BTreeSet::new();
    if let Some(dup) = entries.iter().find(|e| !seen.insert(e.path.as_str())) {
        return Err(Error::Validation(ValidationError::Schema {
            file: primary_key(descriptor),
            reason: format!("duplicate entry '{}'", dup.path),
        }));
    }

    debug!(
        category = %descriptor.category,
        entries = entries.len(),
        files = raw.files.len(),
        "Loaded shard"
    );
    let persisted = entries.iter().map(|e| e.path.clone()).collect();
    Ok(LoadedShard {
        descriptor: descriptor.clone(),
        entries,
        version: raw.version,
        files: raw.files.len(),
        persisted,
        dirty: false,
    })
}

/// Serialize a shard into one or more files of at most `max_bytes` each
///
/// Records are packed greedily by serialized size; a single record is
/// never broken across files, so an oversized record gets a file of its own.
pub fn encode_shard(shard: &LoadedShard, max_bytes: u64) -> Result<Vec<Vec<u8>>> {
    let category = &shard.descriptor.category;
    let namespace = shard.descriptor.namespace();
    let records: Vec<ShardRecord> = shard
        .entries
        .iter()
        .map(|e| ShardRecord::from_entry(e, namespace))
        .collect();

    let whole = ShardFile::new(category.clone(), records.clone()).to_bytes()?;
    if whole.len() as u64 <= max_bytes {
        return Ok(vec![whole]);
    }

    // envelope with the widest part count, plus the brackets and newlines
    // around a non-empty array
    let mut envelope = ShardFile::new(category.clone(), Vec::new());
    envelope.parts = Some(usize::MAX);
    let envelope = envelope.to_bytes()?.len() + 8;
    let budget = (max_bytes as usize).saturating_sub(envelope).max(1);
    let sized: Vec<(usize, ShardRecord)> = records
        .into_iter()
        .map(|r| Ok((pretty_size(&r)?, r)))
        .collect::<Result<_>>()?;

    let mut files: Vec<ShardFile> = pack_greedy(sized, budget, |(size, _)| *size)
        .into_iter()
        .map(|chunk| {
            let records = chunk.into_iter().map(|(_, r)| r).collect();
            ShardFile::new(category.clone(), records)
        })
        .collect();
    let count = files.len();
    if let Some(primary) = files.first_mut() {
        primary.parts = Some(count);
    }
    files
        .iter()
        .map(|file| Ok(file.to_bytes()?))
        .collect()
}

// Size of a record as it appears inside the pretty-printed `files` array.
fn pretty_size(record: &ShardRecord) -> Result<usize> {
    let bytes = serde_json::to_vec_pretty(record)?;
    let lines = bytes.iter().filter(|&&b| b == b'\n').count() + 1;
    // four spaces of extra indentation per line, plus ",\n"
    Ok(bytes.len() + lines * 4 + 2)
}

/// Persist a shard's entries as primary plus parts
///
/// Parts are written before the primary; parts left over from a larger
/// previous layout are deleted afterwards. Returns the new version.
pub async fn persist_shard(
    store: &dyn BlobStore,
    shard: &mut LoadedShard,
    max_bytes: u64,
) -> Result<u64> {
    let files = encode_shard(shard, max_bytes)?;
    let primary = primary_key(&shard.descriptor);

    for (idx, bytes) in files.iter().enumerate().skip(1) {
        store.write(&shard_part_path(&primary, idx + 1), bytes).await?;
    }
    store.write(&primary, &files[0]).await?;

    for (n, key) in stored_parts(store, &primary).await? {
        if n > files.len() {
            store.delete(&key).await?;
            debug!(category = %shard.descriptor.category, part = n, "Deleted stale shard part");
        }
    }

    let mut hasher = Xxh3::new();
    for bytes in &files {
        hasher.update(bytes);
    }
    shard.version = hasher.digest();
    shard.files = files.len();
    shard.persisted = shard.paths();
    shard.dirty = false;
    Ok(shard.version)
}
