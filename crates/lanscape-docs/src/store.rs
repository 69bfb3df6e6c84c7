//! Document storage trait and its file-backed implementation.
//!
//! Port documents are stored as one JSON file per address under a
//! configurable directory:
//! ```text
//! {root}/
//!   ports/
//!     192.168.1.10.json
//!     192.168.1.23.json
//! ```

use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::PortDocument;

/// Errors that can occur during document storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Trait for port-document persistence backends.
pub trait DocumentStore {
    /// Insert or replace the document for `doc.ip_address`.
    fn upsert(&self, doc: &PortDocument) -> Result<(), StoreError>;

    /// Fetch the document for an address, if one exists.
    fn get(&self, ip: Ipv4Addr) -> Result<Option<PortDocument>, StoreError>;

    /// Delete the document for an address. Returns whether one existed.
    fn remove(&self, ip: Ipv4Addr) -> Result<bool, StoreError>;

    /// All documents, ordered by address.
    fn list(&self) -> Result<Vec<PortDocument>, StoreError>;
}

/// File-system backed document store.
///
/// Writes go to a uniquely named temporary file in the same directory and
/// are renamed into place, so readers and concurrent writers only ever see
/// complete documents.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    ports: PathBuf,
}

impl FileDocumentStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let ports = root.as_ref().join("ports");
        fs::create_dir_all(&ports).map_err(|e| io_err(&ports, e))?;
        Ok(Self { ports })
    }

    fn document_path(&self, ip: Ipv4Addr) -> PathBuf {
        self.ports.join(format!("{ip}.json"))
    }
}

impl DocumentStore for FileDocumentStore {
    fn upsert(&self, doc: &PortDocument) -> Result<(), StoreError> {
        let path = self.document_path(doc.ip_address);
        let json = serde_json::to_string_pretty(doc)?;

        let mut tmp = NamedTempFile::new_in(&self.ports).map_err(|e| io_err(&self.ports, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| io_err(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;

        tracing::debug!(
            ip = %doc.ip_address,
            open_ports = doc.open_ports.len(),
            path = %path.display(),
            "Port document saved"
        );

        Ok(())
    }

    fn get(&self, ip: Ipv4Addr) -> Result<Option<PortDocument>, StoreError> {
        let path = self.document_path(ip);
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn remove(&self, ip: Ipv4Addr) -> Result<bool, StoreError> {
        let path = self.document_path(ip);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn list(&self) -> Result<Vec<PortDocument>, StoreError> {
        let entries = fs::read_dir(&self.ports).map_err(|e| io_err(&self.ports, e))?;

        let mut results = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let doc: PortDocument = serde_json::from_str(&json)?;
            results.push(doc);
        }

        results.sort_by_key(|d| d.ip_address);
        Ok(results)
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}
