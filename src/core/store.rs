//! Purpose: Persistence for documents.
//! Exports: `DocumentStore`, `MemoryStore`, `FileStore`.
//! Role: Backing store for the HTTP service and the CLI.
//! Invariants: Ids are assigned by the store, start at 1, and are never reused while a higher id exists.
//! Invariants: `FileStore` mutations hold an exclusive `fs2` lock on `<dir>/.lock`; reads hold a shared lock.
//! Invariants: `FileStore` writes go to a temp file first and are renamed into place.
//! Invariants: `FileStore` keeps its id high-water mark in `<dir>/.next_id`, so deleted ids stay retired.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use fs2::FileExt;

use crate::core::document::{Document, DocumentId};
use crate::core::error::{Error, ErrorKind};

pub trait DocumentStore: Send + Sync {
    /// Stores a new document and returns it with its assigned id.
    fn add(&self, doc: Document) -> Result<Document, Error>;
    /// Replaces an existing document; the id must already be present.
    fn update(&self, doc: &Document) -> Result<(), Error>;
    fn fetch(&self, id: DocumentId) -> Result<Document, Error>;
    fn delete(&self, id: DocumentId) -> Result<(), Error>;
    /// All documents, ordered by id.
    fn list(&self) -> Result<Vec<Document>, Error>;
}

fn not_found(id: DocumentId) -> Error {
    Error::new(ErrorKind::NotFound)
        .with_message(format!("document {id} does not exist"))
}

fn require_id(doc: &Document) -> Result<DocumentId, Error> {
    doc.id.ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message("document has no id")
            .with_hint("Create the document first, then update it by id.")
    })
}

#[derive(Default)]
struct MemoryInner {
    documents: BTreeMap<DocumentId, Document>,
    last_id: DocumentId,
}

/// Process-local store; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryInner>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("document store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryInner>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("document store lock poisoned"))
    }
}

impl DocumentStore for MemoryStore {
    fn add(&self, mut doc: Document) -> Result<Document, Error> {
        let mut inner = self.write()?;
        inner.last_id += 1;
        let id = inner.last_id;
        doc.id = Some(id);
        inner.documents.insert(id, doc.clone());
        Ok(doc)
    }

    fn update(&self, doc: &Document) -> Result<(), Error> {
        let id = require_id(doc)?;
        let mut inner = self.write()?;
        match inner.documents.get_mut(&id) {
            Some(slot) => {
                *slot = doc.clone();
                Ok(())
            }
            None => Err(not_found(id)),
        }
    }

    fn fetch(&self, id: DocumentId) -> Result<Document, Error> {
        self.read()?
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    fn delete(&self, id: DocumentId) -> Result<(), Error> {
        self.write()?
            .documents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    fn list(&self) -> Result<Vec<Document>, Error> {
        Ok(self.read()?.documents.values().cloned().collect())
    }
}

/// One JSON file per document in a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| io_error("failed to create store directory", &dir, err))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: DocumentId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock(&self, exclusive: bool) -> Result<File, Error> {
        let path = self.dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| io_error("failed to open store lock", &path, err))?;
        let locked = if exclusive {
            file.lock_exclusive()
        } else {
            file.lock_shared()
        };
        locked.map_err(|err| io_error("failed to lock store", &path, err))?;
        Ok(file)
    }

    fn ids(&self) -> Result<Vec<DocumentId>, Error> {
        let entries =
            fs::read_dir(&self.dir).map_err(|err| io_error("failed to list store", &self.dir, err))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| io_error("failed to list store", &self.dir, err))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(id) = name
                .strip_suffix(".json")
                .and_then(|stem| stem.parse::<DocumentId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn read_document(&self, id: DocumentId) -> Result<Document, Error> {
        let path = self.document_path(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(not_found(id)),
            Err(err) => return Err(io_error("failed to read document", &path, err)),
        };
        let mut doc: Document = serde_json::from_slice(&bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("stored document is not valid json")
                .with_path(&path)
                .with_source(err)
        })?;
        doc.id = Some(id);
        Ok(doc)
    }

    fn write_document(&self, id: DocumentId, doc: &Document) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(doc).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize document")
                .with_source(err)
        })?;
        self.write_atomic(&self.document_path(id), &format!(".{id}.json.tmp"), &bytes)
    }

    fn next_id_path(&self) -> PathBuf {
        self.dir.join(".next_id")
    }

    /// Next unused id; never below one past the highest id on disk.
    fn next_id(&self) -> Result<DocumentId, Error> {
        let on_disk = self.ids()?.last().copied().unwrap_or(0) + 1;
        let path = self.next_id_path();
        let stored = match fs::read_to_string(&path) {
            Ok(text) => text.trim().parse::<DocumentId>().map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("store id counter is not a number")
                    .with_path(&path)
                    .with_source(err)
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => 1,
            Err(err) => return Err(io_error("failed to read store id counter", &path, err)),
        };
        Ok(stored.max(on_disk))
    }

    fn write_atomic(&self, path: &Path, tmp_name: &str, bytes: &[u8]) -> Result<(), Error> {
        let tmp = self.dir.join(tmp_name);
        let mut file = File::create(&tmp).map_err(|err| io_error("failed to write store file", &tmp, err))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| io_error("failed to write store file", &tmp, err))?;
        fs::rename(&tmp, path).map_err(|err| io_error("failed to replace store file", path, err))
    }
}

fn io_error(message: &str, path: &Path, err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

impl DocumentStore for FileStore {
    fn add(&self, mut doc: Document) -> Result<Document, Error> {
        let _lock = self.lock(true)?;
        let id = self.next_id()?;
        doc.id = Some(id);
        self.write_atomic(
            &self.next_id_path(),
            ".next_id.tmp",
            (id + 1).to_string().as_bytes(),
        )?;
        self.write_document(id, &doc)?;
        tracing::debug!(id, dir = %self.dir.display(), "stored new document");
        Ok(doc)
    }

    fn update(&self, doc: &Document) -> Result<(), Error> {
        let id = require_id(doc)?;
        let _lock = self.lock(true)?;
        if !self.document_path(id).exists() {
            return Err(not_found(id));
        }
        self.write_document(id, doc)
    }

    fn fetch(&self, id: DocumentId) -> Result<Document, Error> {
        let _lock = self.lock(false)?;
        self.read_document(id)
    }

    fn delete(&self, id: DocumentId) -> Result<(), Error> {
        let _lock = self.lock(true)?;
        let path = self.document_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found(id)),
            Err(err) => Err(io_error("failed to delete document", &path, err)),
        }
    }

    fn list(&self) -> Result<Vec<Document>, Error> {
        let _lock = self.lock(false)?;
        self.ids()?
            .into_iter()
            .map(|id| self.read_document(id))
            .collect()
    }
}
