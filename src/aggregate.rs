//! Counting and filtering
//!
//! A run either builds the word vocabulary or, given a vocabulary from an earlier run,
//! extracts contexts. Workers count into a `BatchCounts` per batch; the `Aggregator` on the
//! dispatching thread merges those and, for extraction, streams the pairs out.
use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::sync::Arc;

use crate::context::ContextPair;
use crate::counts::FrequencyTable;
use crate::errors::*;

/// What a run counts, and what it needs to do so
#[derive(Clone, Debug)]
pub enum RunMode {
    /// Count words, keep those seen at least `min_count` times
    BuildVocabulary { min_count: u64 },
    /// Count contexts of words in `filter`, keep contexts seen at least `min_count` times,
    /// and write out every pair that passes the filter
    ExtractContexts { filter: Arc<FrequencyTable>, min_count: u64 },
}

impl RunMode {
    pub fn min_count(&self) -> u64 {
        match *self {
            RunMode::BuildVocabulary { min_count } => min_count,
            RunMode::ExtractContexts { min_count, .. } => min_count,
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            RunMode::BuildVocabulary { .. } => "vocabulary",
            RunMode::ExtractContexts { .. } => "contexts",
        }
    }
}

/// Everything one batch produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchCounts {
    pub words: FrequencyTable,
    pub contexts: FrequencyTable,
    /// `word context` lines, each ending in a newline
    pub lines: String,
    pub sentences: usize,
    pub pairs: u64,
}

impl BatchCounts {
    pub fn new() -> BatchCounts {
        Default::default()
    }

    /// Count a pair the way the mode asks. Returns whether it was kept.
    pub fn record(&mut self, mode: &RunMode, pair: &ContextPair) -> bool {
        match *mode {
            RunMode::BuildVocabulary { .. } => {
                self.words.add(&pair.word);
            },
            RunMode::ExtractContexts { ref filter, .. } => {
                if !filter.contains(&pair.word) {
                    return false;
                }
                self.contexts.add(&pair.context);
                // Writing to a String can't fail
                let _ = writeln!(self.lines, "{}", pair);
            },
        }
        self.pairs += 1;
        true
    }
}

/// What's left after the cutoff
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    /// Words for a vocabulary run, contexts for an extraction run
    pub table: FrequencyTable,
    /// Entries removed by the cutoff
    pub removed: usize,
    pub pairs: u64,
    pub sentences: usize,
    pub batches: usize,
}

/// Owns the run's tables. Lives on one thread and only changes as batch results arrive.
pub struct Aggregator<W: Write> {
    mode: RunMode,
    words: FrequencyTable,
    contexts: FrequencyTable,
    sink: Option<W>,
    pairs: u64,
    sentences: usize,
    batches: usize,
}

impl<W: Write> Aggregator<W> {
    /// Extraction needs somewhere to write pairs. A vocabulary run writes none, so its sink
    /// may be None.
    pub fn new(mode: RunMode, sink: Option<W>) -> Result<Aggregator<W>> {
        if let (&RunMode::ExtractContexts { .. }, None) = (&mode, &sink) {
            return Err(Error::Other("Extracting contexts needs an output for the pairs".into()));
        }
        Ok(Aggregator {
            mode,
            words: FrequencyTable::new(),
            contexts: FrequencyTable::new(),
            sink,
            pairs: 0,
            sentences: 0,
            batches: 0,
        })
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Merge one batch. Its lines are written in one piece so batches never interleave.
    pub fn fold(&mut self, counts: BatchCounts) -> Result<()> {
        match self.mode {
            RunMode::BuildVocabulary { .. } => self.words.merge(counts.words),
            RunMode::ExtractContexts { .. } => {
                self.contexts.merge(counts.contexts);
                if let Some(ref mut sink) = self.sink {
                    sink.write_all(counts.lines.as_bytes())?;
                }
            },
        }
        self.pairs += counts.pairs;
        self.sentences += counts.sentences;
        self.batches += 1;
        Ok(())
    }

    /// Apply the cutoff to the table this mode counts, and hand back the flushed sink
    pub fn finish(self) -> Result<(Summary, Option<W>)> {
        let Aggregator { mode, words, contexts, sink, pairs, sentences, batches } = self;
        let mut sink = sink;
        if let Some(ref mut sink) = sink {
            sink.flush()?;
        }
        let mut table = match mode {
            RunMode::BuildVocabulary { .. } => words,
            RunMode::ExtractContexts { .. } => contexts,
        };
        let before = table.len();
        let removed = table.apply_cutoff(mode.min_count());
        info!("Kept {} of {} {} entries seen at least {} times",
            table.len(), before, mode.name(), mode.min_count());
        Ok((Summary { table, removed, pairs, sentences, batches }, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(word: &str, context: &str) -> ContextPair {
        ContextPair { word: word.into(), context: context.into() }
    }

    fn filter(words: &[&str]) -> Arc<FrequencyTable> {
        Arc::new(words.iter().map(|w| (*w, 1)).collect())
    }

    #[test]
    fn vocabulary_counts_words_only() {
        let mode = RunMode::BuildVocabulary { min_count: 1 };
        let mut counts = BatchCounts::new();
        assert!(counts.record(&mode, &pair("dog", "nsubj_run")));
        assert!(counts.record(&mode, &pair("dog", "obj_see")));
        assert_eq!(counts.words.get("dog"), 2);
        assert!(counts.contexts.is_empty());
        assert!(counts.lines.is_empty());
    }

    #[test]
    fn filter_gates_counting_and_output() {
        let mode = RunMode::ExtractContexts { filter: filter(&["cat"]), min_count: 1 };
        let mut counts = BatchCounts::new();
        assert!(!counts.record(&mode, &pair("dog", "nsubj_run")));
        assert!(counts.record(&mode, &pair("cat", "nsubj_run")));
        assert_eq!(counts.contexts.get("nsubj_run"), 1);
        assert_eq!(counts.lines, "cat nsubj_run\n");
        assert_eq!(counts.pairs, 1);
        assert!(counts.words.is_empty());
    }

    #[test]
    fn extraction_needs_a_sink() {
        let mode = RunMode::ExtractContexts { filter: filter(&["cat"]), min_count: 1 };
        assert!(Aggregator::<Vec<u8>>::new(mode, None).is_err());
        assert!(Aggregator::<Vec<u8>>::new(RunMode::BuildVocabulary { min_count: 1 }, None).is_ok());
    }

    #[test]
    fn folds_merge_and_stream() {
        let mode = RunMode::ExtractContexts { filter: filter(&["cat", "dog"]), min_count: 2 };
        let mut agg = Aggregator::new(mode.clone(), Some(vec![])).unwrap();

        let mut first = BatchCounts::new();
        first.record(&mode, &pair("cat", "nsubj_run"));
        first.record(&mode, &pair("dog", "nsubj_run"));
        let mut second = BatchCounts::new();
        second.record(&mode, &pair("cat", "obj_see"));
        second.record(&mode, &pair("cat", "nsubj_run"));

        agg.fold(second).unwrap();
        agg.fold(first).unwrap();
        let (summary, sink) = agg.finish().unwrap();

        assert_eq!(summary.table, vec![("nsubj_run", 3)].into_iter().collect::<FrequencyTable>());
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.pairs, 4);
        assert_eq!(summary.batches, 2);
        let text = String::from_utf8(sink.unwrap()).unwrap();
        assert_eq!(text, "cat obj_see\ncat nsubj_run\ncat nsubj_run\ndog nsubj_run\n");
    }

    #[test]
    fn vocabulary_cutoff_applies_to_words() {
        let mode = RunMode::BuildVocabulary { min_count: 2 };
        let mut agg: Aggregator<Vec<u8>> = Aggregator::new(mode.clone(), None).unwrap();
        let mut counts = BatchCounts::new();
        for (w, c) in &[("x", "a"), ("x", "b"), ("y", "a")] {
            counts.record(&mode, &pair(w, c));
        }
        agg.fold(counts).unwrap();
        let (summary, sink) = agg.finish().unwrap();
        assert!(sink.is_none());
        assert_eq!(summary.table, vec![("x", 2)].into_iter().collect::<FrequencyTable>());
    }
}
