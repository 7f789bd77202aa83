//! Store → dispatcher → aggregator → files
//!
//! A vocabulary run leaves `wordvocabcount` (binary) and `wv` (text) in the output directory.
//! An extraction run reads `wordvocabcount` back and leaves `dep.contexts` (or a series of
//! rotated files) and `cv`.
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aggregate::{Aggregator, BatchCounts, RunMode, Summary};
use crate::context::context_pairs;
use crate::counts::FrequencyTable;
use crate::dispatch::{Batch, BatchJob, Dispatcher};
use crate::errors::*;
use crate::output::PairWriter;
use crate::sentence::SentenceParser;
use crate::snapshot;
use crate::store::{CorpusStore, Eligibility, StoreConnector};

pub const VOCAB_SNAPSHOT: &str = "wordvocabcount";
pub const WORD_LISTING: &str = "wv";
pub const CONTEXT_LISTING: &str = "cv";
pub const CONTEXTS_FILE: &str = "dep.contexts";
pub const CONTEXTS_PREFIX: &str = "contexts";

/// Which run to do, before any files are read
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunModeConfig {
    BuildVocabulary { min_count: u64 },
    /// `vocabulary` is a `word count` listing to filter with instead of the snapshot
    ExtractContexts { min_count: u64, vocabulary: Option<PathBuf> },
}

/// Rotate the pair stream over several files
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rotation {
    pub max_file_size: u64,
    pub compress: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub output_dir: PathBuf,
    pub batch_size: usize,
    /// None for one per logical CPU
    pub workers: Option<usize>,
    pub report_period: usize,
    pub mode: RunModeConfig,
    pub rotation: Option<Rotation>,
}

impl Config {
    pub fn new<P: AsRef<Path>>(output_dir: P, mode: RunModeConfig) -> Config {
        Config {
            output_dir: output_dir.as_ref().to_path_buf(),
            batch_size: 50,
            workers: None,
            report_period: 10,
            mode,
            rotation: None,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.batch_size).report_period(self.report_period);
        match self.workers {
            Some(workers) => dispatcher.workers(workers),
            None => dispatcher,
        }
    }

    /// Load whatever the mode needs. Fails before any batch runs if the vocabulary is missing.
    pub fn resolve_mode(&self) -> Result<RunMode> {
        Ok(match self.mode {
            RunModeConfig::BuildVocabulary { min_count } => RunMode::BuildVocabulary { min_count },
            RunModeConfig::ExtractContexts { min_count, ref vocabulary } => {
                let filter = match *vocabulary {
                    Some(ref listing) => {
                        let file = File::open(listing)
                            .map_err(|err| Error::MissingFile("word vocabulary listing", Some(err)))?;
                        FrequencyTable::read_listing(BufReader::new(file))?
                    },
                    None => snapshot::load(self.output_dir.join(VOCAB_SNAPSHOT))?,
                };
                info!("Filtering with a vocabulary of {} words", filter.len());
                RunMode::ExtractContexts { filter: Arc::new(filter), min_count }
            },
        })
    }
}

/// Parses each row of a batch and counts its pairs
pub struct ContextJob {
    parser: SentenceParser,
    mode: RunMode,
}

impl ContextJob {
    pub fn new(mode: RunMode) -> Result<ContextJob> {
        Ok(ContextJob { parser: SentenceParser::new()?, mode })
    }

    /// Count the sentence one annotated text ends with
    pub fn count_text(&self, annotated: &str, counts: &mut BatchCounts) {
        if let Some(sentence) = self.parser.parse(annotated) {
            counts.sentences += 1;
            for pair in context_pairs(&sentence) {
                counts.record(&self.mode, &pair);
            }
        }
    }
}

impl BatchJob for ContextJob {
    type Output = BatchCounts;

    fn eligibility(&self) -> Eligibility {
        match self.mode {
            RunMode::BuildVocabulary { .. } => Eligibility::Present,
            RunMode::ExtractContexts { .. } => Eligibility::Annotated,
        }
    }

    fn run<S: CorpusStore>(&self, store: &mut S, batch: &Batch) -> Result<BatchCounts> {
        let mut counts = BatchCounts::new();
        for row in store.fetch_batch(self.eligibility(), batch.offset, batch.limit)? {
            if let Some(ref annotated) = row.annotated {
                self.count_text(annotated, &mut counts);
            }
        }
        Ok(counts)
    }
}

fn open_pairs(config: &Config) -> Result<PairWriter> {
    Ok(match config.rotation {
        Some(ref rotation) => PairWriter::split(&config.output_dir, CONTEXTS_PREFIX,
            rotation.max_file_size, rotation.compress)?,
        None => PairWriter::single(config.output_dir.join(CONTEXTS_FILE))?,
    })
}

fn write_listing(path: &Path, table: &FrequencyTable) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    table.write_listing(&mut out)?;
    out.flush()?;
    Ok(())
}

/// Run one pass over the corpus and persist what it produced
pub fn run<C: StoreConnector>(config: &Config, connector: &C) -> Result<Summary> {
    fs::create_dir_all(&config.output_dir)?;
    let mode = config.resolve_mode()?;
    let sink = match mode {
        RunMode::BuildVocabulary { .. } => None,
        RunMode::ExtractContexts { .. } => Some(open_pairs(config)?),
    };
    let job = ContextJob::new(mode.clone())?;
    let mut aggregator = Aggregator::new(mode, sink)?;

    let stats = config.dispatcher()
        .run(connector, &job, |_, counts| aggregator.fold(counts))?;
    info!("Merged {} of {} batches ({} dropped)", stats.completed, stats.batches, stats.dropped);

    let (summary, sink) = aggregator.finish()?;
    if let Some(sink) = sink {
        sink.close()?;
    }
    match job.mode {
        RunMode::BuildVocabulary { .. } => {
            snapshot::save(config.output_dir.join(VOCAB_SNAPSHOT), &summary.table)?;
            write_listing(&config.output_dir.join(WORD_LISTING), &summary.table)?;
        },
        RunMode::ExtractContexts { .. } => {
            write_listing(&config.output_dir.join(CONTEXT_LISTING), &summary.table)?;
        },
    }
    info!("Found {} pairs in {} sentences, kept {} {} entries",
        summary.pairs, summary.sentences, summary.table.len(), job.mode.name());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCorpus;

    const GATO: &str = "<ß>\n\
        O [o] DET M S @>N #1->2\n\
        gato [gato] N M S @SUBJ> #2->3\n\
        dorme [dormir] V PR 3S IND VFIN @FS-STA #3->0\n\
        </ß>\n";

    #[test]
    fn vocabulary_jobs_see_every_row() {
        let job = ContextJob::new(RunMode::BuildVocabulary { min_count: 1 }).unwrap();
        assert_eq!(job.eligibility(), Eligibility::Present);
        let mut counts = BatchCounts::new();
        job.count_text(GATO, &mut counts);
        assert_eq!(counts.sentences, 1);
        assert_eq!(counts.words.get("o"), 1);
        assert_eq!(counts.words.get("gato"), 1);
        assert_eq!(counts.words.get("dorme"), 0);
    }

    #[test]
    fn only_the_last_sentence_of_a_row_is_counted() {
        let job = ContextJob::new(RunMode::BuildVocabulary { min_count: 1 }).unwrap();
        let mut counts = BatchCounts::new();
        let two = format!("{}<ß>\nEle [ele] PERS @SUBJ> #1->2\ncorreu [correr] V @FS-STA #2->0\n</ß>\n", GATO);
        job.count_text(&two, &mut counts);
        assert_eq!(counts.sentences, 1);
        assert_eq!(counts.pairs, 1);
        assert_eq!(counts.words.get("ele"), 1);
        assert_eq!(counts.words.get("gato"), 0);
    }

    #[test]
    fn rows_without_annotations_are_skipped() {
        let corpus = MemoryCorpus::new();
        corpus.push("o gato dorme".into(), Some(GATO.into()));
        corpus.push("ainda não".into(), None);
        let job = ContextJob::new(RunMode::BuildVocabulary { min_count: 1 }).unwrap();
        let mut store = corpus.connect().unwrap();
        let counts = job.run(&mut store, &Batch { index: 0, offset: 0, limit: 2 }).unwrap();
        assert_eq!(counts.pairs, 2);
    }

    #[test]
    fn extraction_without_vocabulary_fails_early() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::new(tmp.path(), RunModeConfig::ExtractContexts { min_count: 1, vocabulary: None });
        match run(&config, &MemoryCorpus::from_annotated(vec![GATO])) {
            Err(Error::MissingFile(..)) => (),
            other => panic!("expected a missing vocabulary, got {:?}", other),
        }
        assert!(!tmp.path().join(CONTEXTS_FILE).exists());
    }
}
