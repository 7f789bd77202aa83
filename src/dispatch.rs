//! Batch dispatcher
//!
//! The corpus is cut into fixed size batches of eligible rows. A fixed pool of workers claims
//! batches in order from a shared cursor, each worker with its own store connection, and sends
//! results back over a channel as they finish. Results are folded on the calling thread only,
//! in completion order.
//!
//! A fatal error stops workers from claiming new batches. Batches already running are allowed
//! to finish, but their results are thrown away.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use rayon::ThreadPoolBuilder;

use crate::errors::*;
use crate::store::{CorpusStore, Eligibility, StoreConnector};

/// A contiguous run of eligible rows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    /// Eligible rows before this batch
    pub offset: u64,
    pub limit: usize,
}

/// Cut `total` rows into batches of `batch_size`; the last one may be short
pub fn plan_batches(total: u64, batch_size: usize) -> Vec<Batch> {
    assert!(batch_size > 0, "Batches need at least one row");
    let size = batch_size as u64;
    let count = (total + size - 1) / size;
    (0..count)
        .map(|i| Batch {
            index: i as usize,
            offset: i * size,
            limit: ::std::cmp::min(size, total - i * size) as usize,
        })
        .collect()
}

/// Work done on one batch, on a worker thread
pub trait BatchJob: Sync {
    type Output: Send;

    /// Which rows the batches are cut from
    fn eligibility(&self) -> Eligibility;

    fn run<S: CorpusStore>(&self, store: &mut S, batch: &Batch) -> Result<Self::Output>;
}

/// What happened during a run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub batches: usize,
    pub completed: usize,
    pub dropped: usize,
    pub rows: u64,
}

enum Message<T> {
    Done(Batch, Result<T>),
    /// A worker couldn't start at all
    Failed(Error),
}

pub struct Dispatcher {
    batch_size: usize,
    workers: usize,
    report_period: usize,
}

impl Dispatcher {
    /// One worker per logical CPU by default
    pub fn new(batch_size: usize) -> Dispatcher {
        Dispatcher {
            batch_size: ::std::cmp::max(1, batch_size),
            workers: rayon::current_num_threads(),
            report_period: 10,
        }
    }

    pub fn workers(mut self, workers: usize) -> Dispatcher {
        self.workers = ::std::cmp::max(1, workers);
        self
    }

    /// Log progress every this many completed batches
    pub fn report_period(mut self, batches: usize) -> Dispatcher {
        self.report_period = ::std::cmp::max(1, batches);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `job` over the whole corpus, handing each result to `fold` as it arrives.
    ///
    /// Batches whose error `is_droppable` are logged and skipped. Any other error, from a
    /// worker or from `fold`, ends the run once the workers have stopped.
    pub fn run<C, J, F>(&self, connector: &C, job: &J, mut fold: F) -> Result<RunStats>
        where C: StoreConnector,
              J: BatchJob,
              F: FnMut(&Batch, J::Output) -> Result<()> {
        let total = connector.connect()?.count(job.eligibility())?;
        let batches = plan_batches(total, self.batch_size);
        let workers = ::std::cmp::min(self.workers, batches.len());
        info!("Running with {} workers over {} rows in {} batches of {}",
            workers, total, batches.len(), self.batch_size);
        let mut stats = RunStats { batches: batches.len(), ..Default::default() };
        if batches.is_empty() {
            return Ok(stats);
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("depctx-worker{}", i))
            .build()
            .map_err(|err| Error::Other(format!("Could not start the worker pool: {}", err)))?;
        let cursor = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        let (sender, receiver) = mpsc::channel::<Message<J::Output>>();
        let mut progress = Progress::new(self.report_period);
        let mut failure: Option<Error> = None;

        pool.in_place_scope(|scope| {
            for worker in 0..workers {
                let sender = sender.clone();
                let (cursor, cancelled, batches) = (&cursor, &cancelled, &batches);
                scope.spawn(move |_| {
                    let mut store = match connector.connect() {
                        Ok(store) => store,
                        Err(err) => {
                            let _ = sender.send(Message::Failed(err));
                            return;
                        }
                    };
                    loop {
                        if cancelled.load(Ordering::SeqCst) {
                            debug!("Worker {} stopping, the run was cancelled", worker);
                            break;
                        }
                        let batch = match batches.get(cursor.fetch_add(1, Ordering::SeqCst)) {
                            Some(batch) => *batch,
                            None => break,
                        };
                        trace!("Worker {} took batch {}", worker, batch.index);
                        let result = job.run(&mut store, &batch);
                        if sender.send(Message::Done(batch, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            // Only the workers hold senders now, so the loop ends when they all have
            drop(sender);

            for message in receiver {
                let err = match message {
                    Message::Done(batch, Ok(output)) => {
                        if failure.is_some() {
                            continue;
                        }
                        match fold(&batch, output) {
                            Ok(()) => {
                                stats.completed += 1;
                                stats.rows += batch.limit as u64;
                                progress.complete(batch.limit);
                                continue;
                            },
                            Err(err) => err,
                        }
                    },
                    Message::Done(batch, Err(err)) => {
                        if err.is_droppable() {
                            error!("Dropping batch {}: {}", batch.index, err);
                            stats.dropped += 1;
                            continue;
                        }
                        error!("Batch {} failed: {}", batch.index, err);
                        err
                    },
                    Message::Failed(err) => err,
                };
                cancelled.store(true, Ordering::SeqCst);
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        });

        progress.finish();
        match failure {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }
}

/// Periodic throughput logging
pub struct Progress {
    started: Instant,
    rows: u64,
    batches: usize,
    report_period: usize,
}

impl Progress {
    pub fn new(report_period: usize) -> Progress {
        Progress {
            started: Instant::now(),
            rows: 0,
            batches: 0,
            report_period: ::std::cmp::max(1, report_period),
        }
    }

    pub fn complete(&mut self, rows: usize) {
        self.rows += rows as u64;
        self.batches += 1;
        if self.batches % self.report_period == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { self.rows as f64 / elapsed } else { 0.0 };
            info!("Processing jobs... rate: {:8.0}/s, completed: {:10}", rate, self.rows);
        }
    }

    pub fn finish(&self) {
        info!("Elapsed time: {:.3}s for {} rows", self.started.elapsed().as_secs_f64(), self.rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use crate::store::{MemoryCorpus, MemoryStore, Row};

    fn corpus(rows: usize) -> MemoryCorpus {
        MemoryCorpus::from_annotated((1..=rows).map(|i| format!("row {}", i)))
    }

    /// Returns the ids it saw
    struct Ids;

    impl BatchJob for Ids {
        type Output = Vec<u64>;

        fn eligibility(&self) -> Eligibility {
            Eligibility::Annotated
        }

        fn run<S: CorpusStore>(&self, store: &mut S, batch: &Batch) -> Result<Vec<u64>> {
            let rows: Vec<Row> = store.fetch_batch(self.eligibility(), batch.offset, batch.limit)?;
            Ok(rows.into_iter().map(|r| r.id).collect())
        }
    }

    /// Fails on one batch, with a droppable error or not
    struct FailOn {
        index: usize,
        droppable: bool,
        ran: Mutex<Vec<usize>>,
    }

    impl BatchJob for FailOn {
        type Output = usize;

        fn eligibility(&self) -> Eligibility {
            Eligibility::Present
        }

        fn run<S: CorpusStore>(&self, _store: &mut S, batch: &Batch) -> Result<usize> {
            self.ran.lock().unwrap().push(batch.index);
            thread::sleep(Duration::from_millis(5));
            if batch.index != self.index {
                Ok(batch.index)
            } else if self.droppable {
                Err(Error::BatchMismatch { batch: batch.index, expected: 10, found: 9 })
            } else {
                Err(Error::Store("connection reset".into()))
            }
        }
    }

    #[test]
    fn plan_covers_every_row_once() {
        let batches = plan_batches(97, 10);
        assert_eq!(batches.len(), 10);
        assert_eq!(batches[9], Batch { index: 9, offset: 90, limit: 7 });
        assert_eq!(batches.iter().map(|b| b.limit).sum::<usize>(), 97);
        assert!(plan_batches(0, 10).is_empty());
        assert_eq!(plan_batches(10, 10).len(), 1);
    }

    #[test]
    fn batches_are_disjoint_and_complete() {
        let corpus = corpus(97);
        let mut seen = vec![];
        let mut folds = 0;
        let stats = Dispatcher::new(10).workers(4)
            .run(&corpus, &Ids, |_, ids| { folds += 1; seen.extend(ids); Ok(()) })
            .unwrap();
        assert_eq!(folds, 10);
        assert_eq!(stats.batches, 10);
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.rows, 97);
        let unique: HashSet<u64> = seen.iter().cloned().collect();
        assert_eq!(seen.len(), 97);
        assert_eq!(unique, (1..=97).collect::<HashSet<u64>>());
    }

    #[test]
    fn one_worker_is_enough() {
        let corpus = corpus(25);
        let mut seen = vec![];
        Dispatcher::new(7).workers(1)
            .run(&corpus, &Ids, |_, ids| { seen.extend(ids); Ok(()) })
            .unwrap();
        // A single worker takes batches in order
        assert_eq!(seen, (1..=25).collect::<Vec<u64>>());
    }

    #[test]
    fn empty_corpus_runs_nothing() {
        let stats = Dispatcher::new(10)
            .run(&MemoryCorpus::new(), &Ids, |_, _| panic!("nothing to fold"))
            .unwrap();
        assert_eq!(stats, RunStats::default());
    }

    #[test]
    fn mismatched_batches_are_dropped() {
        let job = FailOn { index: 2, droppable: true, ran: Mutex::new(vec![]) };
        let mut folded = vec![];
        let stats = Dispatcher::new(10).workers(3)
            .run(&corpus(50), &job, |_, i| { folded.push(i); Ok(()) })
            .unwrap();
        folded.sort();
        assert_eq!(folded, vec![0, 1, 3, 4]);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.completed, 4);
    }

    #[test]
    fn store_faults_stop_the_run() {
        let job = FailOn { index: 1, droppable: false, ran: Mutex::new(vec![]) };
        let result = Dispatcher::new(1).workers(1)
            .run(&corpus(40), &job, |_, _| Ok(()));
        match result {
            Err(Error::Store(_)) => (),
            other => panic!("expected a store error, got {:?}", other),
        }
        // With one worker, cancellation lands before many more batches are claimed
        assert!(job.ran.lock().unwrap().len() < 40);
    }

    #[test]
    fn fold_errors_stop_the_run() {
        let result = Dispatcher::new(5).workers(2)
            .run(&corpus(30), &Ids, |batch, _| {
                if batch.index == 0 { Err(Error::Other("disk full".into())) } else { Ok(()) }
            });
        assert!(result.is_err());
    }

    struct Unreachable;

    impl StoreConnector for Unreachable {
        type Store = MemoryStore;

        fn connect(&self) -> Result<MemoryStore> {
            Err(Error::Store("no such database".into()))
        }
    }

    #[test]
    fn connection_failures_are_fatal() {
        match Dispatcher::new(5).run(&Unreachable, &Ids, |_, _| Ok(())) {
            Err(Error::Store(info)) => assert!(info.contains("no such database")),
            other => panic!("expected a store error, got {:?}", other),
        }
    }
}
