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

//! Pre-allocated scratch space for a value-iteration run. Sized once when
//! the driver starts, reused by every backup -- the hot loop never
//! allocates (spec §5, §9).

/// Per-thread scratch needed while running a single-threaded backup: one
/// reusable buffer for the O-max walk's local permutation, sized to the
/// largest target-state count the model will ever sort.
#[derive(Debug, Clone)]
pub struct ScratchSingle {
    perm_buf: Vec<usize>,
}

impl ScratchSingle {
    pub fn new(max_n: usize) -> Self {
        Self { perm_buf: Vec::with_capacity(max_n) }
    }

    /// Borrows the scratch permutation buffer, cleared and ready to fill.
    pub fn perm_buf(&mut self) -> &mut Vec<usize> {
        self.perm_buf.clear();
        &mut self.perm_buf
    }
}

/// One [`ScratchSingle`] per worker thread, for the parallel-across-fibers
/// policy: each worker reduces its own fibers of the factored Bellman
/// tensor contraction and needs its own local sort buffer to avoid false
/// sharing.
#[derive(Debug, Clone)]
pub struct ScratchParallelFibers {
    per_worker: Vec<ScratchSingle>,
}

impl ScratchParallelFibers {
    pub fn new(num_workers: usize, max_n: usize) -> Self {
        Self { per_worker: (0..num_workers).map(|_| ScratchSingle::new(max_n)).collect() }
    }

    pub fn worker_mut(&mut self, worker: usize) -> &mut ScratchSingle {
        &mut self.per_worker[worker]
    }

    pub fn num_workers(&self) -> usize {
        self.per_worker.len()
    }
}

/// One [`ScratchSingle`] per worker thread, for the parallel-across-sources
/// policy used by the flat (non-factored) backup: each worker owns a
/// contiguous range of source states and needs its own sort buffer.
pub type ScratchParallelSources = ScratchParallelFibers;

/// The scratch flavor a backup uses, chosen once at VI entry and reused for
/// every iteration (spec §4.E "Workspaces").
#[derive(Debug, Clone)]
pub enum Workspace {
    Single(ScratchSingle),
    ParallelFibers(ScratchParallelFibers),
    ParallelSources(ScratchParallelSources),
}

impl Workspace {
    /// Picks a policy: single-threaded below `min_parallel_sources`, else
    /// parallel with one scratch buffer per worker.
    pub fn select(num_sources: usize, max_n: usize, num_workers: usize, min_parallel_sources: usize, factored: bool) -> Self {
        if num_workers <= 1 || num_sources < min_parallel_sources {
            Workspace::Single(ScratchSingle::new(max_n))
        } else if factored {
            Workspace::ParallelFibers(ScratchParallelFibers::new(num_workers, max_n))
        } else {
            Workspace::ParallelSources(ScratchParallelSources::new(num_workers, max_n))
        }
    }
}
