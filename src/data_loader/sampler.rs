//! src/data_loader/sampler.rs
//! Index samplers for map-style datasets.
//!
//! * `SequentialSampler` – yields 0..end in order.
//! * `ShuffleSampler`    – yields 0..len in a deterministic shuffled order.
//!
//! Both can be restricted to one rank of a distributed job with [`Sampler::shard`].

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Mix an epoch into a base seed. Epoch 0 leaves the seed unchanged.
pub fn epoch_seed(seed: u64, epoch: u64) -> u64 {
    seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Trait for index producers.
pub trait Sampler {
    /// Return the next index to fetch, or `None` when exhausted.
    fn next_index(&mut self) -> Option<usize>;
    /// (Optional) remaining items hint.
    fn remaining(&self) -> Option<usize> { None }

    /// Keep every `world`-th index starting at position `rank`.
    fn shard(self, rank: usize, world: usize) -> ShardedSampler<Self>
    where
        Self: Sized,
    {
        ShardedSampler { inner: self, rank, world: world.max(1), pos: 0 }
    }
}

/// Yields `0, 1, 2, …, end-1` once.
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    curr: usize,
    end: usize,
}

impl SequentialSampler {
    /// Create a sequential sampler over `[0, end)`.
    pub fn new(end: usize) -> Self {
        Self { curr: 0, end }
    }
}

impl Sampler for SequentialSampler {
    fn next_index(&mut self) -> Option<usize> {
        if self.curr < self.end {
            let i = self.curr;
            self.curr += 1;
            Some(i)
        } else {
            None
        }
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.end.saturating_sub(self.curr))
    }
}

/// Yields all indices `0..len` in a deterministic shuffled order.
#[derive(Debug, Clone)]
pub struct ShuffleSampler {
    indices: Vec<usize>,
    pos: usize,
}

impl ShuffleSampler {
    /// Create a shuffled sampler for `len` items, using `seed`.
    pub fn new(len: usize, seed: u64) -> Self {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);

        // Fisher–Yates
        for i in (1..len).rev() {
            let j = (rng.next_u64() % (i as u64 + 1)) as usize;
            indices.swap(i, j);
        }

        Self { indices, pos: 0 }
    }
}

impl Sampler for ShuffleSampler {
    fn next_index(&mut self) -> Option<usize> {
        let i = *self.indices.get(self.pos)?;
        self.pos += 1;
        Some(i)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.indices.len().saturating_sub(self.pos))
    }
}

/// Position-based rank filter over another sampler.
///
/// Sharding happens after shuffling, so every rank draws from the same
/// permutation and the ranks' index sets are disjoint.
#[derive(Debug, Clone)]
pub struct ShardedSampler<S> {
    inner: S,
    rank: usize,
    world: usize,
    pos: usize,
}

impl<S: Sampler> Sampler for ShardedSampler<S> {
    fn next_index(&mut self) -> Option<usize> {
        loop {
            let i = self.inner.next_index()?;
            let p = self.pos;
            self.pos += 1;
            if p % self.world == self.rank {
                return Some(i);
            }
        }
    }
}
