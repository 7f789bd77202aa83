//! Read and write frequency tables as compact binary files
//!
//! The layout is a magic string, the number of entries as a little endian u64, and then for
//! each entry a u32 byte length, the UTF-8 key and a u64 count. Entries are stored most
//! common first.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::counts::FrequencyTable;
use crate::errors::*;

const MAGIC: &[u8] = b"\x93DEPCTX\x01\x00";

/// Write a table to any stream
pub fn write_table<W: Write>(writer: &mut W, table: &FrequencyTable) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_u64::<LittleEndian>(table.len() as u64)?;
    for (key, count) in table.most_common() {
        writer.write_u32::<LittleEndian>(key.len() as u32)?;
        writer.write_all(key.as_bytes())?;
        writer.write_u64::<LittleEndian>(count)?;
    }
    Ok(())
}

/// Read a table from any stream
pub fn read_table<R: Read>(reader: &mut R) -> Result<FrequencyTable> {
    let mut magic = [0u8; 9];
    read_or_complain(reader.read_exact(&mut magic), "header")?;
    if &magic[..] != MAGIC {
        return Err(helpful_complaint(&magic));
    }
    let entries = read_or_complain(reader.read_u64::<LittleEndian>(), "entry count")?;
    let mut table = FrequencyTable::new();
    let mut key = vec![];
    for entry_i in 0..entries {
        let len = read_or_complain(reader.read_u32::<LittleEndian>(), "key length")? as usize;
        key.resize(len, 0);
        read_or_complain(reader.read_exact(&mut key), "key")?;
        let count = read_or_complain(reader.read_u64::<LittleEndian>(), "count")?;
        let key = ::std::str::from_utf8(&key)
            .map_err(|_| Error::BadSnapshot(format!("entry {} is not valid UTF-8", entry_i)))?;
        table.add_count(key, count);
    }
    Ok(table)
}

/// Save a table to a file
pub fn save<P: AsRef<Path>>(path: P, table: &FrequencyTable) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_table(&mut writer, table)?;
    writer.flush()?;
    Ok(())
}

/// Load a table saved with `save`. A missing file is reported as such, since it usually means
/// the vocabulary step hasn't been run.
pub fn load<P: AsRef<Path>>(path: P) -> Result<FrequencyTable> {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(Error::MissingFile("word vocabulary snapshot",
                Some(io::Error::new(err.kind(), format!("{}", path.as_ref().display())))));
        },
        Err(err) => return Err(err.into()),
    };
    read_table(&mut BufReader::new(file))
}

/// Truncation shows up as an early EOF, which is a problem with the file rather than the disk
fn read_or_complain<X>(res: io::Result<X>, what: &str) -> Result<X> {
    res.map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof =>
            Error::BadSnapshot(format!("the file ends in the middle of a {}", what)),
        _ => Error::IOError(err),
    })
}

/// Tell the user more info about the file
fn helpful_complaint(header: &[u8]) -> Error {
    Error::BadSnapshot(format!(
        "expected a vocabulary written by the vocab step, but the header is {:?} ({:?}). \
        It should start with {:?}.",
        String::from_utf8_lossy(header),
        header,
        String::from_utf8_lossy(MAGIC)))
}
