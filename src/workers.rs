// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! A minimal static fork-join pool (spec §5): one backup is one parallel
//! region over disjoint source-state ranges, workers join at the end, no
//! next backup starts until they do. Unlike the teacher's branch-and-bound
//! solver (a long-running pool pulling dynamic work off a shared fringe,
//! parked on a `Condvar` during node starvation), this engine's parallelism
//! is a single static partition recomputed fresh every backup, so there is
//! no fringe, no starvation, and no monitor to park threads on.

use parking_lot::Mutex;
use std::ops::Range;

use crate::error::{Error, Result};

/// Partitions work across a fixed number of threads, defaulting to the
/// number of logical CPUs.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    num_workers: usize,
}

impl WorkerPool {
    /// One worker per logical CPU (`num_cpus::get()`).
    pub fn new() -> Self {
        Self { num_workers: num_cpus::get().max(1) }
    }

    pub fn with_workers(num_workers: usize) -> Self {
        Self { num_workers: num_workers.max(1) }
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Splits `0..len` into contiguous, roughly equal ranges (at most
    /// [`Self::num_workers`] of them) and runs `f` over each range on its
    /// own thread, joining before returning. Falls back to running `f`
    /// inline when there's nothing to parallelize.
    pub fn for_each_range<F>(&self, len: usize, f: F)
    where
        F: Fn(Range<usize>) + Sync,
    {
        if len == 0 {
            return;
        }
        let workers = self.num_workers.min(len).max(1);
        if workers == 1 {
            f(0..len);
            return;
        }
        let chunk = len.div_ceil(workers);
        std::thread::scope(|scope| {
            let mut start = 0;
            while start < len {
                let end = (start + chunk).min(len);
                let f = &f;
                scope.spawn(move || f(start..end));
                start = end;
            }
        });
    }

    /// Splits `0..len` into contiguous ranges like [`Self::for_each_range`]
    /// and collects each range's result, in range order, into one `Vec`
    /// per chunk (the caller concatenates them back into a single `len`
    /// sized sequence). Short-circuits on the first error, after every
    /// spawned worker has joined.
    pub fn try_map_chunks<T, F>(&self, len: usize, f: F) -> Result<Vec<T>>
    where
        F: Fn(Range<usize>) -> Result<T> + Sync,
        T: Send,
    {
        if len == 0 {
            return Ok(Vec::new());
        }
        let workers = self.num_workers.min(len).max(1);
        if workers == 1 {
            return Ok(vec![f(0..len)?]);
        }
        let chunk = len.div_ceil(workers);
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            let mut start = 0;
            while start < len {
                let end = (start + chunk).min(len);
                let f = &f;
                handles.push(scope.spawn(move || f(start..end)));
                start = end;
            }
            handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
        })
    }

    /// Like [`Self::for_each_range`] but for closures that can fail (every
    /// per-source O-max call can, in principle, hit [`Error::Infeasible`]).
    /// The first error observed by any worker is reported to the caller
    /// once every worker has joined; workers that failed still run to
    /// completion over their own range rather than being torn down
    /// mid-flight; there is no cross-worker cancellation, matching spec
    /// §5's "no suspension points inside the parallel region".
    pub fn try_for_each_range<F>(&self, len: usize, f: F) -> Result<()>
    where
        F: Fn(Range<usize>) -> Result<()> + Sync,
    {
        if len == 0 {
            return Ok(());
        }
        let workers = self.num_workers.min(len).max(1);
        if workers == 1 {
            return f(0..len);
        }
        let chunk = len.div_ceil(workers);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        std::thread::scope(|scope| {
            let mut start = 0;
            while start < len {
                let end = (start + chunk).min(len);
                let f = &f;
                let first_error = &first_error;
                scope.spawn(move || {
                    if let Err(e) = f(start..end) {
                        let mut slot = first_error.lock();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                });
                start = end;
            }
        });
        match first_error.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ranges_partition_the_whole_span_without_overlap() {
        let pool = WorkerPool::with_workers(3);
        let covered = Mutex::new(vec![false; 10]);
        pool.for_each_range(10, |range| {
            let mut covered = covered.lock();
            for i in range {
                assert!(!covered[i], "index {i} covered twice");
                covered[i] = true;
            }
        });
        assert!(covered.into_inner().iter().all(|&b| b));
    }

    #[test]
    fn single_worker_runs_inline_without_spawning_threads() {
        let pool = WorkerPool::with_workers(1);
        let calls = AtomicUsize::new(0);
        pool.for_each_range(5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_error_survives_to_the_caller() {
        let pool = WorkerPool::with_workers(4);
        let result = pool.try_for_each_range(8, |range| {
            if range.contains(&5) {
                Err(Error::Infeasible("boom".into()))
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::Infeasible(_))));
    }
}
