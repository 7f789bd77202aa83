//! Running the external dependency parser
//!
//! The parser reads plain sentences, one per line, and writes each analysed sentence between
//! `<ß>` and `</ß>` lines. It is expensive to start, so sentences are sent in batches and the
//! output is cut back into one block per sentence.
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use crate::dispatch::{Batch, BatchJob};
use crate::errors::*;
use crate::store::{CorpusStore, Eligibility, Row};

pub const SENTENCE_START: &str = "<ß>";
pub const SENTENCE_END: &str = "</ß>";

/// Something that turns raw sentences into annotated text
pub trait Annotator: Sync {
    fn annotate(&self, text: &str) -> Result<String>;
}

/// An external program reading stdin and writing stdout
#[derive(Clone, Debug)]
pub struct CommandAnnotator {
    program: String,
    args: Vec<String>,
    banner: Option<String>,
    strict: bool,
}

impl CommandAnnotator {
    pub fn new<S: Into<String>>(program: S) -> CommandAnnotator {
        CommandAnnotator { program: program.into(), args: vec![], banner: None, strict: false }
    }

    /// Split a command line on whitespace into program and arguments
    pub fn from_command_line(line: &str) -> Result<CommandAnnotator> {
        let mut parts = line.split_whitespace().map(String::from);
        let program = parts.next()
            .ok_or_else(|| Error::Parser("the parser command is empty".into()))?;
        Ok(CommandAnnotator { args: parts.collect(), ..CommandAnnotator::new(program) })
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> CommandAnnotator {
        self.args.push(arg.into());
        self
    }

    /// What the parser prints on stderr when all is well, usually its version line
    pub fn banner<S: Into<String>>(mut self, banner: S) -> CommandAnnotator {
        self.banner = Some(banner.into());
        self
    }

    /// Treat an unexpected banner as a failure instead of a warning
    pub fn strict(mut self, strict: bool) -> CommandAnnotator {
        self.strict = strict;
        self
    }
}

impl Annotator for CommandAnnotator {
    fn annotate(&self, text: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Parser(format!("could not start {}: {}", self.program, err)))?;

        // Feed stdin from another thread, or a full stdout pipe would block both of us
        let mut stdin = child.stdin.take()
            .ok_or_else(|| Error::Parser("the parser has no stdin".into()))?;
        let input = text.as_bytes().to_vec();
        let feeder = thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output()?;
        match feeder.join() {
            Ok(Ok(())) => (),
            Ok(Err(err)) => return Err(Error::Parser(format!("could not write to the parser: {}", err))),
            Err(_) => return Err(Error::Parser("the thread feeding the parser panicked".into())),
        }
        if !output.status.success() {
            return Err(Error::Parser(format!("{} exited with {}: {}",
                self.program, output.status, String::from_utf8_lossy(&output.stderr).trim())));
        }
        if let Some(ref banner) = self.banner {
            let diagnostics = String::from_utf8_lossy(&output.stderr);
            if diagnostics.trim_end() != banner.trim_end() {
                if self.strict {
                    return Err(Error::Parser(format!("unexpected diagnostics: {}", diagnostics.trim())));
                }
                warn!("Unexpected parser diagnostics: {}", diagnostics.trim());
            }
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Cut parser output into sentence blocks, each from a `<ß>` line through its `</ß>` line.
///
/// Anything outside a block is dropped.
pub fn split_documents(output: &str) -> Vec<String> {
    let mut blocks = vec![];
    let mut current = String::new();
    for line in output.lines() {
        if line.starts_with(SENTENCE_START) {
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
        if line.starts_with(SENTENCE_END) {
            blocks.push(::std::mem::replace(&mut current, String::new()));
        }
    }
    blocks
}

/// Annotates the rows of each batch that have no annotation yet, and saves the results
pub struct AnnotateJob<'a, A: Annotator> {
    annotator: &'a A,
}

impl<'a, A: Annotator> AnnotateJob<'a, A> {
    pub fn new(annotator: &'a A) -> AnnotateJob<'a, A> {
        AnnotateJob { annotator }
    }
}

impl<'a, A: Annotator> BatchJob for AnnotateJob<'a, A> {
    /// Rows annotated
    type Output = usize;

    fn eligibility(&self) -> Eligibility {
        Eligibility::Present
    }

    fn run<S: CorpusStore>(&self, store: &mut S, batch: &Batch) -> Result<usize> {
        let rows: Vec<Row> = store.fetch_batch(self.eligibility(), batch.offset, batch.limit)?
            .into_iter()
            .filter(|row| row.annotated.is_none())
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        let mut text = String::new();
        for row in rows.iter() {
            text.push_str(row.text.trim_end());
            text.push('\n');
        }
        let blocks = split_documents(&self.annotator.annotate(&text)?);
        if blocks.len() != rows.len() {
            return Err(Error::BatchMismatch { batch: batch.index, expected: rows.len(), found: blocks.len() });
        }
        for (row, block) in rows.iter().zip(blocks.iter()) {
            store.update_parsed(row.id, block)?;
        }
        store.commit()?;
        Ok(rows.len())
    }
}
