//! Local filesystem storage for one harvested document.
//!
//! ## Storage Layout
//!
//! ```text
//! {dump_dir}/{title}/
//! ├── 0meta.txt             # Title resolution response
//! ├── 0ids.json             # Revision index (array of RevisionMeta)
//! ├── 0users.json           # Author cache (map of author id → AuthorData)
//! ├── 0config.txt           # Continuation marker "{revid}-{parentid}"
//! ├── 0analysis.json        # Consolidated RevisionAnalysis array
//! ├── compress.txt          # Concatenated cleaned text
//! ├── revs/                 # Raw content, {unixTimestamp}-{revid}.json
//! └── clean/                # Plain-text counterparts, same naming
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{AppError, Result};
use crate::models::{
    AuthorData, CleanRevision, ContinuationMarker, ResolveResponse, RevisionAnalysis,
    RevisionContent, RevisionMeta, parse_storage_name,
};

pub const META_FILE: &str = "0meta.txt";
pub const INDEX_FILE: &str = "0ids.json";
pub const USERS_FILE: &str = "0users.json";
pub const MARKER_FILE: &str = "0config.txt";
pub const ANALYSIS_FILE: &str = "0analysis.json";
pub const COMPRESS_FILE: &str = "compress.txt";
pub const RAW_DIR: &str = "revs";
pub const CLEAN_DIR: &str = "clean";

/// Storage rooted at one document directory.
#[derive(Debug, Clone)]
pub struct DumpStorage {
    root_dir: PathBuf,
}

impl DumpStorage {
    /// Create a DumpStorage rooted at the given document directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    pub fn index_path(&self) -> PathBuf {
        self.path(INDEX_FILE)
    }

    pub fn raw_path(&self, name: &str) -> PathBuf {
        self.root_dir.join(RAW_DIR).join(name)
    }

    pub fn clean_path(&self, name: &str) -> PathBuf {
        self.root_dir.join(CLEAN_DIR).join(name)
    }

    /// Create the document directory and its revision subdirectories.
    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.root_dir.join(RAW_DIR)).await?;
        tokio::fs::create_dir_all(self.root_dir.join(CLEAN_DIR)).await?;
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match self.read_bytes(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // --- Page metadata ---

    pub async fn save_page_meta(&self, response: &ResolveResponse) -> Result<()> {
        self.write_json(&self.path(META_FILE), response).await
    }

    // --- Raw and cleaned revisions ---

    /// Whether the raw content of a revision is already stored.
    pub async fn has_raw(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.raw_path(name)).await?)
    }

    pub async fn write_raw(&self, content: &RevisionContent) -> Result<()> {
        self.write_json(&self.raw_path(&content.storage_name()), content)
            .await
    }

    /// Read the stored raw content of a revision.
    pub async fn read_raw(&self, meta: &RevisionMeta) -> Result<RevisionContent> {
        let name = meta.storage_name();
        self.read_json(&self.raw_path(&name))
            .await?
            .ok_or_else(|| AppError::validation(format!("raw revision {name} is not stored")))
    }

    pub async fn write_clean(&self, clean: &CleanRevision) -> Result<()> {
        self.write_json(&self.clean_path(&clean.storage_name()), clean)
            .await
    }

    pub async fn read_clean(&self, name: &str) -> Result<Option<CleanRevision>> {
        self.read_json(&self.clean_path(name)).await
    }

    /// Cleaned revision file names ordered by (timestamp, revision id).
    pub async fn list_clean(&self) -> Result<Vec<String>> {
        let dir = self.root_dir.join(CLEAN_DIR);
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::config(format!("no cleaned revisions at {}", dir.display()))
            } else {
                AppError::Io(e)
            }
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_storage_name(&name) {
                Some(key) => names.push((key, name)),
                None => log::debug!("Skipping {name} in {}", dir.display()),
            }
        }
        names.sort();
        Ok(names.into_iter().map(|(_, name)| name).collect())
    }

    pub async fn write_compressed(&self, text: &str) -> Result<()> {
        self.write_bytes(&self.path(COMPRESS_FILE), text.as_bytes())
            .await
    }

    // --- Continuation marker ---

    pub async fn write_marker(&self, marker: ContinuationMarker) -> Result<()> {
        self.write_bytes(&self.path(MARKER_FILE), marker.to_string().as_bytes())
            .await
    }

    pub async fn read_marker(&self) -> Result<Option<ContinuationMarker>> {
        let bytes = self.read_bytes(&self.path(MARKER_FILE)).await?;
        Ok(bytes.and_then(|b| ContinuationMarker::parse(&String::from_utf8_lossy(&b))))
    }

    // --- Revision index ---

    /// Start streaming a fresh revision index.
    pub async fn index_writer(&self) -> Result<IndexWriter> {
        IndexWriter::create(self.index_path()).await
    }

    /// Load a revision index file.
    pub async fn load_index_file(path: &Path) -> Result<Vec<RevisionMeta>> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::config(format!("index file {} not found", path.display()))
            } else {
                AppError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // --- Author cache ---

    /// Load the author cache; a missing or empty file yields an empty cache.
    pub async fn load_users(&self) -> Result<BTreeMap<u64, AuthorData>> {
        match self.read_bytes(&self.path(USERS_FILE)).await? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(serde_json::from_slice(&bytes)?)
            }
            _ => Ok(BTreeMap::new()),
        }
    }

    pub async fn save_users(&self, users: &BTreeMap<u64, AuthorData>) -> Result<()> {
        self.write_json(&self.path(USERS_FILE), users).await
    }

    // --- Analysis ---

    pub async fn write_analysis(&self, records: &[RevisionAnalysis]) -> Result<()> {
        self.write_json(&self.path(ANALYSIS_FILE), records).await
    }

    pub async fn read_analysis(&self) -> Result<Option<Vec<RevisionAnalysis>>> {
        self.read_json(&self.path(ANALYSIS_FILE)).await
    }
}

/// Streaming writer for the revision index JSON array.
///
/// Items land in a temporary file that replaces the index on [`finish`](Self::finish).
pub struct IndexWriter {
    path: PathBuf,
    tmp: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    count: usize,
}

impl IndexWriter {
    async fn create(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        let mut writer = BufWriter::new(tokio::fs::File::create(&tmp).await?);
        writer.write_all(b"[").await?;
        Ok(Self {
            path,
            tmp,
            writer,
            count: 0,
        })
    }

    pub async fn append(&mut self, meta: &RevisionMeta) -> Result<()> {
        if self.count > 0 {
            self.writer.write_all(b",\n").await?;
        }
        let bytes = serde_json::to_vec(meta)?;
        self.writer.write_all(&bytes).await?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Drop the partial array, leaving any existing index untouched.
    pub async fn discard(self) -> Result<usize> {
        drop(self.writer);
        match tokio::fs::remove_file(&self.tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AppError::Io(e)),
        }
        Ok(self.count)
    }

    /// Close the array and move it into place.
    pub async fn finish(mut self) -> Result<usize> {
        self.writer.write_all(b"]").await?;
        self.writer.flush().await?;
        drop(self.writer);
        tokio::fs::rename(&self.tmp, &self.path).await?;
        Ok(self.count)
    }
}
