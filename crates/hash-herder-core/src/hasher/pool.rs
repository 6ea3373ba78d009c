use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use super::xxhash::hash_file;

/// Default capacity of both the task and the result channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// One unit of work for the pool. `seq` is assigned by the producer in walk
/// order so results can be put back in that order.
#[derive(Debug, Clone)]
pub struct HashTask {
    pub seq: u64,
    pub root: usize,
    pub path: PathBuf,
    pub size: u64,
    /// Pass straight through without hashing (already in the ledger).
    pub skip: bool,
}

#[derive(Debug)]
pub enum HashOutcome {
    Skipped,
    Hashed(u64),
    Failed(io::Error),
}

#[derive(Debug)]
pub struct HashResult {
    pub seq: u64,
    pub root: usize,
    pub path: PathBuf,
    pub size: u64,
    pub outcome: HashOutcome,
}

/// Fixed-size pool of hashing threads fed through a bounded task channel and
/// draining into a bounded result channel.
///
/// Workers exit once every task sender is dropped and the queue is drained,
/// or as soon as the result receiver goes away.
pub struct HashPool {
    tasks: Option<Sender<HashTask>>,
    results: Option<Receiver<HashResult>>,
    handles: Vec<JoinHandle<()>>,
}

impl HashPool {
    pub fn start(workers: usize, queue_capacity: usize) -> io::Result<Self> {
        let worker_count = workers.max(1);
        let capacity = queue_capacity.max(1);
        info!("Starting hash pool with {} workers", worker_count);

        let (task_tx, task_rx) = bounded::<HashTask>(capacity);
        let (result_tx, result_rx) = bounded::<HashResult>(capacity);

        let mut handles = Vec::with_capacity(worker_count);
        for worker_idx in 0..worker_count {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("hash-worker-{worker_idx}"))
                .spawn(move || {
                    for task in rx.iter() {
                        let outcome = if task.skip {
                            HashOutcome::Skipped
                        } else {
                            match hash_file(&task.path) {
                                Ok(hash) => HashOutcome::Hashed(hash),
                                Err(e) => HashOutcome::Failed(e),
                            }
                        };
                        let result = HashResult {
                            seq: task.seq,
                            root: task.root,
                            path: task.path,
                            size: task.size,
                            outcome,
                        };
                        if tx.send(result).is_err() {
                            break;
                        }
                    }
                    debug!("Hash worker {} finished", worker_idx);
                })?;
            handles.push(handle);
        }

        // Result disconnection is driven by worker exits only.
        drop(result_tx);

        Ok(Self {
            tasks: Some(task_tx),
            results: Some(result_rx),
            handles,
        })
    }

    /// Hand out the task sender. The pool keeps no copy, so the queue closes
    /// once the caller drops it.
    pub fn take_sender(&mut self) -> Option<Sender<HashTask>> {
        self.tasks.take()
    }

    pub fn take_results(&mut self) -> Option<Receiver<HashResult>> {
        self.results.take()
    }

    pub fn join(mut self) -> io::Result<()> {
        self.tasks.take();
        self.results.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                return Err(io::Error::other("hash worker thread panicked"));
            }
        }
        info!("Hash pool shut down");
        Ok(())
    }
}

/// Re-emits results in `seq` order regardless of completion order.
pub struct Reorder<I> {
    inner: I,
    next: u64,
    pending: std::collections::BTreeMap<u64, HashResult>,
}

impl<I> Reorder<I>
where
    I: Iterator<Item = HashResult>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            next: 0,
            pending: std::collections::BTreeMap::new(),
        }
    }
}

impl<I> Iterator for Reorder<I>
where
    I: Iterator<Item = HashResult>,
{
    type Item = HashResult;

    fn next(&mut self) -> Option<HashResult> {
        loop {
            if let Some(result) = self.pending.remove(&self.next) {
                self.next += 1;
                return Some(result);
            }
            match self.inner.next() {
                Some(result) => {
                    self.pending.insert(result.seq, result);
                }
                None => {
                    // Source exhausted: release whatever is left in order.
                    let (&seq, _) = self.pending.iter().next()?;
                    self.next = seq;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::xxhash::hash_data;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_pool_hashes_every_task_in_order() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..50 {
            let p = dir.path().join(format!("f{i}.txt"));
            fs::write(&p, format!("content {i}")).unwrap();
            paths.push(p);
        }

        let mut pool = HashPool::start(4, 8).unwrap();
        let tx = pool.take_sender().unwrap();
        let rx = pool.take_results().unwrap();

        let feed_paths = paths.clone();
        let feeder = thread::spawn(move || {
            for (i, p) in feed_paths.into_iter().enumerate() {
                tx.send(HashTask {
                    seq: i as u64,
                    root: 0,
                    path: p,
                    size: 0,
                    skip: false,
                })
                .unwrap();
            }
        });

        let results: Vec<HashResult> = Reorder::new(rx.iter()).collect();
        feeder.join().unwrap();
        pool.join().unwrap();

        assert_eq!(results.len(), 50);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.seq, i as u64);
            assert_eq!(r.path, paths[i]);
            match r.outcome {
                HashOutcome::Hashed(h) => {
                    assert_eq!(h, hash_data(format!("content {i}").as_bytes()))
                }
                _ => panic!("expected hashed outcome"),
            }
        }
    }

    #[test]
    fn test_pool_skips_and_reports_failures() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("here.txt");
        fs::write(&present, "here").unwrap();

        let mut pool = HashPool::start(2, 4).unwrap();
        let tx = pool.take_sender().unwrap();
        let rx = pool.take_results().unwrap();

        tx.send(HashTask {
            seq: 0,
            root: 0,
            path: present.clone(),
            size: 4,
            skip: true,
        })
        .unwrap();
        tx.send(HashTask {
            seq: 1,
            root: 0,
            path: dir.path().join("missing.txt"),
            size: 0,
            skip: false,
        })
        .unwrap();
        drop(tx);

        let results: Vec<HashResult> = Reorder::new(rx.iter()).collect();
        pool.join().unwrap();

        assert!(matches!(results[0].outcome, HashOutcome::Skipped));
        assert!(matches!(results[1].outcome, HashOutcome::Failed(_)));
    }

    #[test]
    fn test_reorder_handles_out_of_order_input() {
        let make = |seq| HashResult {
            seq,
            root: 0,
            path: PathBuf::from(format!("/{seq}")),
            size: 0,
            outcome: HashOutcome::Skipped,
        };
        let shuffled = vec![make(2), make(0), make(3), make(1)];
        let seqs: Vec<u64> = Reorder::new(shuffled.into_iter()).map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }
}
