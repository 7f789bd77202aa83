//! Output files for the pair stream
//!
//! Either one plain file, or a series of files of bounded size spread over directories
//! `AA`, `AB`, ... with a hundred files each, optionally gzipped.
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

const FILES_PER_DIR: usize = 100;

/// Generates the next file name in the series
#[derive(Debug)]
pub struct NextFile {
    root: PathBuf,
    prefix: String,
    dir_index: usize,
    file_index: usize,
    started: bool,
}

impl NextFile {
    pub fn new<P: AsRef<Path>>(root: P, prefix: &str) -> NextFile {
        NextFile {
            root: root.as_ref().to_path_buf(),
            prefix: prefix.to_owned(),
            dir_index: 0,
            file_index: 0,
            started: false,
        }
    }

    /// The next path, creating its directory if needed
    pub fn next_path(&mut self) -> io::Result<PathBuf> {
        if self.started {
            self.file_index = (self.file_index + 1) % FILES_PER_DIR;
            if self.file_index == 0 {
                self.dir_index += 1;
            }
        }
        self.started = true;
        let dir = self.root.join(dir_name(self.dir_index));
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}_{:02}", self.prefix, self.file_index)))
    }
}

/// Two letters, `AA` to `ZZ`, then it wraps around
fn dir_name(index: usize) -> String {
    let first = (b'A' + (index / 26 % 26) as u8) as char;
    let second = (b'A' + (index % 26) as u8) as char;
    format!("{}{}", first, second)
}

enum SplitFile {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl SplitFile {
    fn create(path: PathBuf, compress: bool) -> io::Result<SplitFile> {
        Ok(if compress {
            let mut path = path.into_os_string();
            path.push(".gz");
            SplitFile::Gzip(GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default()))
        } else {
            SplitFile::Plain(BufWriter::new(File::create(path)?))
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match *self {
            SplitFile::Plain(ref mut f) => f.write_all(buf),
            SplitFile::Gzip(ref mut f) => f.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            SplitFile::Plain(ref mut f) => f.flush(),
            SplitFile::Gzip(ref mut f) => f.flush(),
        }
    }

    fn close(self) -> io::Result<()> {
        match self {
            SplitFile::Plain(mut f) => f.flush(),
            SplitFile::Gzip(f) => f.finish()?.flush(),
        }
    }
}

/// Writes to a series of files, starting a new one when the next write would go over
/// `max_file_size` uncompressed bytes. A single write is never split across files.
pub struct SplitWriter {
    names: NextFile,
    max_file_size: u64,
    compress: bool,
    file: Option<SplitFile>,
    written: u64,
}

impl SplitWriter {
    pub fn new(names: NextFile, max_file_size: u64, compress: bool) -> io::Result<SplitWriter> {
        let mut names = names;
        let file = SplitFile::create(names.next_path()?, compress)?;
        Ok(SplitWriter { names, max_file_size, compress, file: Some(file), written: 0 })
    }

    fn reserve(&mut self, size: u64) -> io::Result<()> {
        if self.written > 0 && self.written + size > self.max_file_size {
            if let Some(file) = self.file.take() {
                file.close()?;
            }
            self.file = Some(SplitFile::create(self.names.next_path()?, self.compress)?);
            self.written = 0;
        }
        Ok(())
    }

    pub fn close(mut self) -> io::Result<()> {
        match self.file.take() {
            Some(file) => file.close(),
            None => Ok(()),
        }
    }
}

impl Write for SplitWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reserve(buf.len() as u64)?;
        match self.file {
            Some(ref mut file) => file.write_all(buf)?,
            None => return Err(io::Error::new(io::ErrorKind::Other, "write after close")),
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file {
            Some(ref mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Where extracted pairs go
pub enum PairWriter {
    Single(BufWriter<File>),
    Split(SplitWriter),
}

impl PairWriter {
    /// One file at `path`
    pub fn single<P: AsRef<Path>>(path: P) -> io::Result<PairWriter> {
        Ok(PairWriter::Single(BufWriter::new(File::create(path)?)))
    }

    /// A series of files under `root`
    pub fn split<P: AsRef<Path>>(root: P, prefix: &str, max_file_size: u64, compress: bool)
        -> io::Result<PairWriter> {
        Ok(PairWriter::Split(SplitWriter::new(NextFile::new(root, prefix), max_file_size, compress)?))
    }

    /// Flush everything and finish any compressed stream
    pub fn close(self) -> io::Result<()> {
        match self {
            PairWriter::Single(mut f) => f.flush(),
            PairWriter::Split(w) => w.close(),
        }
    }
}

impl Write for PairWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            PairWriter::Single(ref mut f) => f.write(buf),
            PairWriter::Split(ref mut w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            PairWriter::Single(ref mut f) => f.flush(),
            PairWriter::Split(ref mut w) => w.flush(),
        }
    }
}
