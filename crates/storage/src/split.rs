//! Content splitter
//!
//! Oversized documents are stored as numbered part files next to the
//! original (`notes.md` becomes `notes.part1.md`, `notes.part2.md`, ...).
//! The original path keeps a stub whose front matter lists the parts, and
//! the directory's `memory_index.json` carries one [`SplitManifest`] per
//! split document.
//!
//! Text documents are split at semantic block boundaries first: paragraph
//! breaks, and explicit anchor blocks delimited by [`BLOCK_START`] and
//! [`BLOCK_END`]. Blocks are packed greedily into parts of at most
//! `max_part_bytes`. A block that alone exceeds the limit, and any content
//! that is not text, is cut at fixed byte offsets. Concatenating the parts in
//! order always reproduces the original bytes.
//!
//! Limits are checked before anything is written. On a rewrite the new parts
//! are written first, then the manifest is replaced, and only then are
//! stale parts deleted.

use chrono::{DateTime, Utc};
use memvault_core::path::{file_name, join, parent_dir, split_extension};
use memvault_core::{Error, Result, SplitManifest, SplitManifestFile, StorageLimits, SPLIT_MANIFEST_FILE};
use memvault_document::{split_front_matter, FrontMatter, PARTS_KEY};
use tracing::{debug, info};

use crate::store::BlobStore;

/// Opens an anchor block that is never split internally
pub const BLOCK_START: &str = "<!-- memory:block-start -->";
/// Closes an anchor block
pub const BLOCK_END: &str = "<!-- memory:block-end -->";

/// Result of a byte range read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    /// Bytes read
    pub bytes: Vec<u8>,
    /// Whether the range ran past the end of the document
    pub truncated: bool,
}

/// What a write did on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Keys holding the content: the document key itself, or its parts
    pub parts: Vec<String>,
    /// Manifest record, when the document was split
    pub manifest: Option<SplitManifest>,
}

impl SplitOutcome {
    /// Whether the content was split into parts
    pub fn is_split(&self) -> bool {
        self.manifest.is_some()
    }
}

// ============================================================================
// Planning (pure)
// ============================================================================

/// Cut text into blocks whose concatenation is the original text
///
/// A block ends after a run of blank lines. Anchor blocks span from
/// [`BLOCK_START`] to the end of the line holding [`BLOCK_END`]; an anchor
/// without an end marker runs to the end of the text.
pub fn semantic_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if text[i..].starts_with(BLOCK_START) {
            if i > start {
                blocks.push(&text[start..i]);
                start = i;
            }
            let end = match text[i + BLOCK_START.len()..].find(BLOCK_END) {
                Some(rel) => {
                    let after = i + BLOCK_START.len() + rel + BLOCK_END.len();
                    match text[after..].find('\n') {
                        Some(nl) => after + nl + 1,
                        None => bytes.len(),
                    }
                }
                None => bytes.len(),
            };
            blocks.push(&text[start..end]);
            start = end;
            i = end;
            continue;
        }

        if bytes[i] == b'\n' && bytes.get(i + 1) == Some(&b'\n') {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
            }
            blocks.push(&text[start..j]);
            start = j;
            i = j;
            continue;
        }

        i += 1;
    }

    if start < bytes.len() {
        blocks.push(&text[start..]);
    }
    blocks
}

/// Greedily group items into runs whose total size stays within `max`
///
/// An item larger than `max` gets a run of its own.
pub fn pack_greedy<T>(items: Vec<T>, max: usize, size_of: impl Fn(&T) -> usize) -> Vec<Vec<T>> {
    let mut runs: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut current_size = 0;

    for item in items {
        let size = size_of(&item);
        if !current.is_empty() && current_size + size > max {
            runs.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += size;
        current.push(item);
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Cut bytes at fixed offsets
pub fn split_raw(content: &[u8], max: usize) -> Vec<Vec<u8>> {
    content.chunks(max.max(1)).map(<[u8]>::to_vec).collect()
}

/// Cut text at offsets of at most `max` bytes, backing off to char boundaries
fn split_text_raw(text: &str, max: usize) -> Vec<Vec<u8>> {
    let max = max.max(1);
    let mut parts = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single char wider than `max`; fall back to raw bytes.
            end = (start + max).min(text.len());
        }
        parts.push(text.as_bytes()[start..end].to_vec());
        start = end;
    }
    parts
}

/// Compute the parts for content of any size
///
/// Returns a single part when the content fits.
pub fn plan_parts(content: &[u8], max: usize, semantic: bool) -> Vec<Vec<u8>> {
    if content.len() <= max {
        return vec![content.to_vec()];
    }
    let text = match std::str::from_utf8(content) {
        Ok(text) => text,
        Err(_) => return split_raw(content, max),
    };
    if !semantic {
        return split_text_raw(text, max);
    }

    let runs = pack_greedy(semantic_blocks(text), max, |b| b.len());
    let mut parts = Vec::new();
    for run in runs {
        let joined: String = run.concat();
        if joined.len() > max {
            parts.extend(split_text_raw(&joined, max));
        } else {
            parts.push(joined.into_bytes());
        }
    }
    parts
}

/// Part file name for `name`: `doc.md` → `doc.part3.md`
pub fn part_file_name(name: &str, n: usize) -> String {
    let (stem, ext) = split_extension(name);
    format!("{}.part{}{}", stem, n, ext)
}

// ============================================================================
// Manifest IO
// ============================================================================

fn manifest_key(dir: &str) -> String {
    join(dir, SPLIT_MANIFEST_FILE)
}

/// Load a directory's manifest file; empty if there is none
pub async fn load_manifests(store: &dyn BlobStore, dir: &str) -> Result<SplitManifestFile> {
    match store.read(&manifest_key(dir)).await {
        Ok(bytes) => Ok(SplitManifestFile::parse(&bytes)?),
        Err(e) if e.is_not_found() => Ok(SplitManifestFile::default()),
        Err(e) => Err(e),
    }
}

/// Persist a directory's manifest file, removing it when empty
pub async fn save_manifests(store: &dyn BlobStore, dir: &str, file: &SplitManifestFile) -> Result<()> {
    let key = manifest_key(dir);
    if file.is_empty() {
        store.delete(&key).await?;
    } else {
        store.write(&key, &file.to_bytes()?).await?;
    }
    Ok(())
}

/// Read a byte range of a split document
///
/// The starting part is found by division for uniform parts, or by a
/// cumulative scan when part sizes are recorded. Reading continues into
/// following parts until `len` bytes are collected or the document ends.
pub async fn reconstruct(
    store: &dyn BlobStore,
    dir: &str,
    manifest: &SplitManifest,
    offset: u64,
    len: u64,
) -> Result<RangeRead> {
    if offset >= manifest.size {
        return Err(Error::Range {
            offset,
            size: manifest.size,
        });
    }

    let offsets = manifest.part_offsets();
    let first = if manifest.is_uniform() && manifest.part_size > 0 {
        ((offset / manifest.part_size) as usize).min(manifest.parts.len().saturating_sub(1))
    } else {
        offsets.iter().rposition(|&o| o <= offset).unwrap_or(0)
    };

    let end = offset.saturating_add(len).min(manifest.size);
    let mut bytes = Vec::with_capacity((end - offset) as usize);
    for (idx, part) in manifest.parts.iter().enumerate().skip(first) {
        let part_start = offsets[idx];
        if part_start >= end {
            break;
        }
        let data = store.read(&join(dir, part)).await.map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("part '{}' of '{}'", part, manifest.original_file))
            } else {
                e
            }
        })?;
        let from = offset.saturating_sub(part_start) as usize;
        let to = ((end - part_start) as usize).min(data.len());
        if from < to {
            bytes.extend_from_slice(&data[from..to]);
        }
    }

    Ok(RangeRead {
        bytes,
        truncated: offset.saturating_add(len) > manifest.size,
    })
}

// ============================================================================
// ContentSplitter
// ============================================================================

/// Writes, reads and deletes documents that may be split into parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSplitter {
    limits: StorageLimits,
    semantic: bool,
}

impl Default for ContentSplitter {
    fn default() -> Self {
        ContentSplitter::new(StorageLimits::default(), true)
    }
}

impl ContentSplitter {
    /// Create a splitter
    pub fn new(limits: StorageLimits, semantic: bool) -> Self {
        ContentSplitter { limits, semantic }
    }

    /// Limits in force
    pub fn limits(&self) -> &StorageLimits {
        &self.limits
    }

    /// Compute parts for `content` and check limits, without writing
    pub fn plan(&self, content: &[u8]) -> Result<Vec<Vec<u8>>> {
        let size = content.len() as u64;
        if !self.limits.needs_split(size) {
            self.limits.check_single_file(size)?;
            return Ok(vec![content.to_vec()]);
        }
        let parts = plan_parts(content, self.limits.max_part_bytes as usize, self.semantic);
        self.limits.check_parts(parts.len())?;
        Ok(parts)
    }

    /// Write a document, splitting it if needed
    ///
    /// Fails closed: on a limit violation nothing is written.
    pub async fn write(
        &self,
        store: &dyn BlobStore,
        key: &str,
        content: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SplitOutcome> {
        let parts = self.plan(content)?;
        let dir = parent_dir(key);
        let name = file_name(key);

        let mut manifests = load_manifests(store, dir).await?;
        let previous = manifests.get(name).cloned();

        let projected = self.dir_bytes_excluding(store, dir, key, previous.as_ref()).await?
            + content.len() as u64;
        self.limits.check_dir_total(dir, projected)?;

        if parts.len() == 1 {
            store.write(key, content).await?;
            if let Some(old) = previous {
                manifests.remove(name);
                save_manifests(store, dir, &manifests).await?;
                for part in &old.parts {
                    store.delete(&join(dir, part)).await?;
                }
                info!(key, "Document no longer split; removed old parts");
            }
            return Ok(SplitOutcome {
                parts: vec![key.to_string()],
                manifest: None,
            });
        }

        let names: Vec<String> = (1..=parts.len()).map(|n| part_file_name(name, n)).collect();
        let mut keys = Vec::with_capacity(parts.len());
        for (part_name, bytes) in names.iter().zip(&parts) {
            let part_key = join(dir, part_name);
            store.write(&part_key, bytes).await?;
            keys.push(part_key);
        }

        let part_size = self.limits.max_part_bytes;
        let sizes: Vec<u64> = parts.iter().map(|p| p.len() as u64).collect();
        let uniform = sizes[..sizes.len() - 1].iter().all(|&s| s == part_size);
        let manifest = SplitManifest {
            original_file: name.to_string(),
            parts: names.clone(),
            size: content.len() as u64,
            part_size,
            created: now,
            part_sizes: if uniform { Vec::new() } else { sizes },
        };
        manifests.upsert(manifest.clone());
        save_manifests(store, dir, &manifests).await?;

        let mut stub = FrontMatter::new();
        stub.set_list(PARTS_KEY, &names);
        store.write(key, stub.render().as_bytes()).await?;

        if let Some(old) = previous {
            for stale in old.parts.iter().filter(|p| !names.contains(p)) {
                store.delete(&join(dir, stale)).await?;
                debug!(key, part = %stale, "Deleted stale part");
            }
        }

        info!(key, parts = names.len(), size = content.len(), "Split document");
        Ok(SplitOutcome {
            parts: keys,
            manifest: Some(manifest),
        })
    }

    /// Run every limit check [`write`](Self::write) would, without writing
    pub async fn check(&self, store: &dyn BlobStore, key: &str, content: &[u8]) -> Result<()> {
        self.plan(content)?;
        let dir = parent_dir(key);
        let manifests = load_manifests(store, dir).await?;
        let previous = manifests.get(file_name(key));
        let projected =
            self.dir_bytes_excluding(store, dir, key, previous).await? + content.len() as u64;
        self.limits.check_dir_total(dir, projected)?;
        Ok(())
    }

    /// Manifest record for `key`, if the document is split
    pub async fn manifest(&self, store: &dyn BlobStore, key: &str) -> Result<Option<SplitManifest>> {
        let manifests = load_manifests(store, parent_dir(key)).await?;
        Ok(manifests.get(file_name(key)).cloned())
    }

    /// Read a whole document, reassembling parts
    ///
    /// A stub whose front matter lists parts is reassembled even when the
    /// manifest record is missing.
    pub async fn read(&self, store: &dyn BlobStore, key: &str) -> Result<Vec<u8>> {
        let dir = parent_dir(key);
        if let Some(manifest) = self.manifest(store, key).await? {
            if manifest.size == 0 {
                return Ok(Vec::new());
            }
            return Ok(reconstruct(store, dir, &manifest, 0, manifest.size).await?.bytes);
        }

        let bytes = store.read(key).await?;
        let listed = match std::str::from_utf8(&bytes) {
            Ok(text) => match split_front_matter(text) {
                (Some(front), body) if body.trim().is_empty() => front.parts(),
                _ => Vec::new(),
            },
            Err(_) => Vec::new(),
        };
        if listed.is_empty() {
            return Ok(bytes);
        }

        let mut out = Vec::new();
        for part in &listed {
            out.extend(store.read(&join(dir, part)).await?);
        }
        Ok(out)
    }

    /// Read `len` bytes starting at `offset`
    pub async fn read_range(
        &self,
        store: &dyn BlobStore,
        key: &str,
        offset: u64,
        len: u64,
    ) -> Result<RangeRead> {
        if let Some(manifest) = self.manifest(store, key).await? {
            return reconstruct(store, parent_dir(key), &manifest, offset, len).await;
        }
        let bytes = self.read(store, key).await?;
        let size = bytes.len() as u64;
        if offset >= size {
            return Err(Error::Range { offset, size });
        }
        let end = offset.saturating_add(len).min(size);
        Ok(RangeRead {
            bytes: bytes[offset as usize..end as usize].to_vec(),
            truncated: offset.saturating_add(len) > size,
        })
    }

    /// Logical size of a document
    pub async fn size(&self, store: &dyn BlobStore, key: &str) -> Result<Option<u64>> {
        match self.manifest(store, key).await? {
            Some(manifest) => Ok(Some(manifest.size)),
            None => store.size(key).await,
        }
    }

    /// Delete a document with its parts and manifest record
    ///
    /// Returns whether anything existed.
    pub async fn delete(&self, store: &dyn BlobStore, key: &str) -> Result<bool> {
        let dir = parent_dir(key);
        let name = file_name(key);
        let mut manifests = load_manifests(store, dir).await?;
        let mut existed = false;
        if let Some(old) = manifests.remove(name) {
            save_manifests(store, dir, &manifests).await?;
            for part in &old.parts {
                store.delete(&join(dir, part)).await?;
            }
            existed = true;
        }
        existed |= store.delete(key).await?;
        Ok(existed)
    }

    /// Bytes stored directly in `dir`, minus `key` and its parts
    async fn dir_bytes_excluding(
        &self,
        store: &dyn BlobStore,
        dir: &str,
        key: &str,
        previous: Option<&SplitManifest>,
    ) -> Result<u64> {
        let own: Vec<String> = previous
            .map(|m| m.parts.iter().map(|p| join(dir, p)).collect())
            .unwrap_or_default();
        let mut total = 0u64;
        for other in store.list(dir).await? {
            if parent_dir(&other) != dir || other == key || own.contains(&other) {
                continue;
            }
            total += store.size(&other).await?.unwrap_or(0);
        }
        Ok(total)
    }
}
