//! Corpus stores
//!
//! A store holds sentences by sequential id, each with its raw text and, once the dependency
//! parser has seen it, its annotation. Workers never share a store handle: each one asks a
//! `StoreConnector` for its own.
//!
//! The file store is a directory with two files:
//!
//! - `text`: one raw sentence per line. The row id is the line number, starting at 1.
//! - `annotations`: an append-only log of `#<id> <length>\n<annotation>\n` records. A later
//!   record for the same id replaces an earlier one.
//!
//! Both files hold UTF-8. A row that doesn't decode is reported as a store error.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use memmap::Mmap;

use crate::errors::*;
use crate::farm::{new_plain, PlainMap};

pub const TEXT_FILE: &str = "text";
pub const ANNOTATIONS_FILE: &str = "annotations";

/// Which rows a query sees
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    /// Only rows that have been annotated
    Annotated,
    /// Every row
    Present,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub text: String,
    pub annotated: Option<String>,
}

impl Row {
    pub fn is_eligible(&self, rows: Eligibility) -> bool {
        match rows {
            Eligibility::Annotated => self.annotated.is_some(),
            Eligibility::Present => true,
        }
    }
}

/// One connection to a corpus
pub trait CorpusStore {
    /// How many rows a query would see
    fn count(&mut self, rows: Eligibility) -> Result<u64>;

    /// Up to `limit` rows, skipping the first `offset`, in id order
    fn fetch_batch(&mut self, rows: Eligibility, offset: u64, limit: usize) -> Result<Vec<Row>>;

    /// Stage an annotation for a row. Nothing is written until `commit`.
    fn update_parsed(&mut self, id: u64, annotated: &str) -> Result<()>;

    /// Write every staged annotation as one group
    fn commit(&mut self) -> Result<()>;
}

/// Opens independent connections to the same corpus
pub trait StoreConnector: Sync {
    type Store: CorpusStore;

    fn connect(&self) -> Result<Self::Store>;
}

//
// File store
//

/// A corpus kept in a directory
#[derive(Clone, Debug)]
pub struct FileCorpus {
    dir: PathBuf,
}

impl FileCorpus {
    /// Open an existing store directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<FileCorpus> {
        let dir = dir.as_ref().to_path_buf();
        if let Err(err) = File::open(dir.join(TEXT_FILE)) {
            return Err(Error::MissingFile("corpus store text file", Some(err)));
        }
        Ok(FileCorpus { dir })
    }

    /// Make an empty store, replacing any text already there
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<FileCorpus> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        File::create(dir.join(TEXT_FILE))?;
        File::create(dir.join(ANNOTATIONS_FILE))?;
        Ok(FileCorpus { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StoreConnector for FileCorpus {
    type Store = FileStore;

    fn connect(&self) -> Result<FileStore> {
        FileStore::open(&self.dir)
    }
}

/// Copy a file of sentences, one per line, into a new store
pub fn import_text<P: AsRef<Path>, Q: AsRef<Path>>(text: P, dir: Q) -> Result<FileCorpus> {
    let corpus = FileCorpus::create(dir)?;
    let bytes = fs::copy(text.as_ref(), corpus.dir.join(TEXT_FILE))
        .map_err(|err| Error::MissingFile("sentence file to import", Some(err)))?;
    info!("Imported {} bytes of sentences into {}", bytes, corpus.dir.display());
    Ok(corpus)
}

/// A handle on a file store, with the files mapped as they were when it was opened.
///
/// Annotations committed through any handle are visible to handles opened afterwards.
pub struct FileStore {
    text: Option<Mmap>,
    lines: Vec<(usize, usize)>,
    annotations: Option<Mmap>,
    parsed: PlainMap<u64, (usize, usize)>,
    parsed_ids: Vec<u64>,
    log_path: PathBuf,
    pending: Vec<(u64, String)>,
}

impl FileStore {
    fn open(dir: &Path) -> Result<FileStore> {
        let text = map_file(&dir.join(TEXT_FILE))
            .map_err(|err| Error::Store(format!("cannot map {}: {}", dir.display(), err)))?;
        let lines = text.as_ref().map(|m| index_lines(&m[..])).unwrap_or_default();

        let log_path = dir.join(ANNOTATIONS_FILE);
        let annotations = match map_file(&log_path) {
            Ok(map) => map,
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(Error::Store(format!("cannot map {}: {}", log_path.display(), err))),
        };
        let parsed = match annotations {
            Some(ref m) => index_annotations(&m[..])?,
            None => new_plain(),
        };
        let mut parsed_ids: Vec<u64> = parsed.keys()
            .cloned()
            .filter(|&id| id >= 1 && id <= lines.len() as u64)
            .collect();
        parsed_ids.sort();
        debug!("Opened store {} with {} rows, {} annotated", dir.display(), lines.len(), parsed_ids.len());

        Ok(FileStore {
            text,
            lines,
            annotations,
            parsed,
            parsed_ids,
            log_path,
            pending: vec![],
        })
    }

    fn row(&self, id: u64) -> Result<Row> {
        let (start, end) = self.lines[(id - 1) as usize];
        let text = match self.text {
            Some(ref m) => decode(&m[start..end], id, TEXT_FILE)?,
            None => String::new(),
        };
        let annotated = match (self.parsed.get(&id), self.annotations.as_ref()) {
            (Some(&(start, end)), Some(m)) => Some(decode(&m[start..end], id, ANNOTATIONS_FILE)?),
            _ => None,
        };
        Ok(Row { id, text, annotated })
    }
}

impl CorpusStore for FileStore {
    fn count(&mut self, rows: Eligibility) -> Result<u64> {
        Ok(match rows {
            Eligibility::Annotated => self.parsed_ids.len() as u64,
            Eligibility::Present => self.lines.len() as u64,
        })
    }

    fn fetch_batch(&mut self, rows: Eligibility, offset: u64, limit: usize) -> Result<Vec<Row>> {
        let ids: Vec<u64> = match rows {
            Eligibility::Annotated => self.parsed_ids.iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect(),
            Eligibility::Present => (offset + 1 ..= self.lines.len() as u64)
                .take(limit)
                .collect(),
        };
        ids.into_iter().map(|id| self.row(id)).collect()
    }

    fn update_parsed(&mut self, id: u64, annotated: &str) -> Result<()> {
        if id == 0 || id > self.lines.len() as u64 {
            return Err(Error::Store(format!("there is no row {} to annotate", id)));
        }
        self.pending.push((id, annotated.to_owned()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut group = vec![];
        for (id, annotated) in self.pending.drain(..) {
            write!(group, "#{} {}\n", id, annotated.len())?;
            group.extend_from_slice(annotated.as_bytes());
            group.push(b'\n');
        }
        let mut log = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
        log.write_all(&group)?;
        log.sync_data()?;
        Ok(())
    }
}

/// Map a whole file. Empty files can't be mapped, so they come back as None.
fn map_file(path: &Path) -> io::Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // The store only ever appends, so mapped bytes don't change under us.
    Ok(Some(unsafe { Mmap::map(&file)? }))
}

/// Stored bytes must be UTF-8, anything else means the store is damaged
fn decode(bytes: &[u8], id: u64, file: &str) -> Result<String> {
    ::std::str::from_utf8(bytes)
        .map(String::from)
        .map_err(|err| Error::Store(format!("row {} in {} is not valid UTF-8: {}", id, file, err)))
}

/// Byte ranges of each line, without the line ending
fn index_lines(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut lines = vec![];
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            let end = if i > start && bytes[i - 1] == b'\r' { i - 1 } else { i };
            lines.push((start, end));
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push((start, bytes.len()));
    }
    lines
}

/// Byte ranges of the latest annotation for each row
fn index_annotations(bytes: &[u8]) -> Result<PlainMap<u64, (usize, usize)>> {
    let mut parsed = new_plain();
    let mut pos = 0;
    while pos < bytes.len() {
        let complain = || Error::Store(format!("the annotation log is corrupt at byte {}", pos));
        if bytes[pos] != b'#' {
            return Err(complain());
        }
        let header_end = bytes[pos..].iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .ok_or_else(complain)?;
        let header = ::std::str::from_utf8(&bytes[pos + 1..header_end]).map_err(|_| complain())?;
        let mut fields = header.split(' ');
        let (id, len): (u64, usize) = match (fields.next(), fields.next(), fields.next()) {
            (Some(id), Some(len), None) => (
                id.parse().map_err(|_| complain())?,
                len.parse().map_err(|_| complain())?,
            ),
            _ => return Err(complain()),
        };
        let start = header_end + 1;
        let end = start.checked_add(len).ok_or_else(complain)?;
        if end > bytes.len() {
            return Err(complain());
        }
        parsed.insert(id, (start, end));
        pos = end;
        if pos < bytes.len() && bytes[pos] == b'\n' {
            pos += 1;
        }
    }
    Ok(parsed)
}

//
// Memory store
//

/// A corpus kept in memory, shared by all its connections
#[derive(Clone, Debug, Default)]
pub struct MemoryCorpus {
    rows: Arc<RwLock<Vec<Row>>>,
}

impl MemoryCorpus {
    pub fn new() -> MemoryCorpus {
        Default::default()
    }

    /// A corpus of already annotated sentences, with ids from 1
    pub fn from_annotated<I, S>(annotations: I) -> MemoryCorpus
        where I: IntoIterator<Item=S>, S: Into<String> {
        let corpus = MemoryCorpus::new();
        for annotated in annotations {
            let annotated = annotated.into();
            corpus.push(String::new(), Some(annotated));
        }
        corpus
    }

    /// Append a row and return its id
    pub fn push(&self, text: String, annotated: Option<String>) -> u64 {
        let mut rows = self.rows.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = rows.len() as u64 + 1;
        rows.push(Row { id, text, annotated });
        id
    }

    /// A copy of every row
    pub fn rows(&self) -> Vec<Row> {
        self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

impl StoreConnector for MemoryCorpus {
    type Store = MemoryStore;

    fn connect(&self) -> Result<MemoryStore> {
        Ok(MemoryStore { rows: self.rows.clone(), pending: vec![] })
    }
}

/// A connection to a `MemoryCorpus`
pub struct MemoryStore {
    rows: Arc<RwLock<Vec<Row>>>,
    pending: Vec<(u64, String)>,
}

impl CorpusStore for MemoryStore {
    fn count(&mut self, rows: Eligibility) -> Result<u64> {
        let all = self.rows.read().map_err(|_| Error::Store("poisoned corpus lock".into()))?;
        Ok(all.iter().filter(|r| r.is_eligible(rows)).count() as u64)
    }

    fn fetch_batch(&mut self, rows: Eligibility, offset: u64, limit: usize) -> Result<Vec<Row>> {
        let all = self.rows.read().map_err(|_| Error::Store("poisoned corpus lock".into()))?;
        Ok(all.iter()
            .filter(|r| r.is_eligible(rows))
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update_parsed(&mut self, id: u64, annotated: &str) -> Result<()> {
        self.pending.push((id, annotated.to_owned()));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut all = self.rows.write().map_err(|_| Error::Store("poisoned corpus lock".into()))?;
        for (id, annotated) in self.pending.drain(..) {
            match all.get_mut((id as usize).wrapping_sub(1)) {
                Some(row) => row.annotated = Some(annotated),
                None => return Err(Error::Store(format!("there is no row {} to annotate", id))),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_indexed_without_endings() {
        let bytes = b"um\r\ndois\n\ntres";
        let lines: Vec<&[u8]> = index_lines(bytes).into_iter().map(|(s, e)| &bytes[s..e]).collect();
        assert_eq!(lines, vec![&b"um"[..], &b"dois"[..], &b""[..], &b"tres"[..]]);
    }

    #[test]
    fn later_annotations_win() {
        let log = b"#2 3\nabc\n#1 0\n\n#2 2\nxy\n";
        let parsed = index_annotations(log).unwrap();
        assert_eq!(parsed.len(), 2);
        let (s, e) = parsed[&2];
        assert_eq!(&log[s..e], b"xy");
        let (s, e) = parsed[&1];
        assert_eq!(s, e);
    }

    #[test]
    fn corrupt_logs_are_store_errors() {
        match index_annotations(b"#1 10\nshort") {
            Err(Error::Store(_)) => (),
            other => panic!("expected a store error, got {:?}", other),
        }
        assert!(index_annotations(b"no header").is_err());
        match index_annotations(b"#1 18446744073709551615\nx\n") {
            Err(Error::Store(_)) => (),
            other => panic!("expected a store error, got {:?}", other),
        }
    }

    #[test]
    fn invalid_utf8_is_a_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = FileCorpus::create(tmp.path()).unwrap();
        fs::write(tmp.path().join(TEXT_FILE), b"bom\nm\xe3e\n").unwrap();
        let mut store = corpus.connect().unwrap();
        assert_eq!(store.fetch_batch(Eligibility::Present, 0, 1).unwrap()[0].text, "bom");
        match store.fetch_batch(Eligibility::Present, 0, 2) {
            Err(Error::Store(info)) => assert!(info.contains("row 2")),
            other => panic!("expected a store error, got {:?}", other),
        }

        fs::write(tmp.path().join(ANNOTATIONS_FILE), b"#1 2\n\xff\xfe\n").unwrap();
        let mut store = corpus.connect().unwrap();
        match store.fetch_batch(Eligibility::Annotated, 0, 1) {
            Err(Error::Store(info)) => assert!(info.contains(ANNOTATIONS_FILE)),
            other => panic!("expected a store error, got {:?}", other),
        }
    }

    #[test]
    fn memory_store_filters_and_pages() {
        let corpus = MemoryCorpus::new();
        for i in 1..=5u64 {
            let annotated = if i % 2 == 1 { Some(format!("a{}", i)) } else { None };
            corpus.push(format!("s{}", i), annotated);
        }
        let mut store = corpus.connect().unwrap();
        assert_eq!(store.count(Eligibility::Present).unwrap(), 5);
        assert_eq!(store.count(Eligibility::Annotated).unwrap(), 3);
        let ids: Vec<u64> = store.fetch_batch(Eligibility::Annotated, 1, 10).unwrap()
            .into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[test]
    fn memory_updates_wait_for_commit() {
        let corpus = MemoryCorpus::new();
        let id = corpus.push("ele correu".into(), None);
        let mut store = corpus.connect().unwrap();
        store.update_parsed(id, "parsed").unwrap();
        assert_eq!(corpus.rows()[0].annotated, None);
        store.commit().unwrap();
        assert_eq!(corpus.rows()[0].annotated, Some("parsed".to_owned()));

        store.update_parsed(9, "nope").unwrap();
        assert!(store.commit().is_err());
    }
}
