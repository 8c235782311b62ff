use arbiter_core::config::{CleanupStrategy, SamplingStrategy};
use arbiter_core::rng::{RngRegistry, Stream};
use arbiter_core::types::Transition;
use std::collections::VecDeque;
use std::sync::Arc;

/// One stored transition plus its quality score in `[0, 1]` and the
/// monotonically increasing sequence number it was inserted with (used to
/// break quality ties by age, and to recover insertion order cheaply).
struct Entry {
    transition: Transition,
    quality: f32,
    sequence: u64,
}

/// Bounded, ordered store of transitions with pluggable sampling and
/// cleanup strategies. Reads and writes only ever happen
/// from the orchestrator thread after the self-play barrier, so the store itself does no internal locking.
pub struct ExperienceStore {
    capacity: usize,
    cleanup_ratio: f64,
    cleanup_strategy: CleanupStrategy,
    sampling_strategy: SamplingStrategy,
    entries: VecDeque<Entry>,
    next_sequence: u64,
    rng: Arc<RngRegistry>,
}

impl ExperienceStore {
    pub fn new(
        capacity: usize,
        cleanup_ratio: f64,
        cleanup_strategy: CleanupStrategy,
        sampling_strategy: SamplingStrategy,
        rng: Arc<RngRegistry>,
    ) -> Self {
        Self {
            capacity,
            cleanup_ratio,
            cleanup_strategy,
            sampling_strategy,
            entries: VecDeque::new(),
            next_sequence: 0,
            rng,
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append `transitions`, each starting at a quality score of `1.0`
    /// (reporting-only by default; see the open question
    /// about novelty/quality metrics never driving control flow). If the
    /// new size would exceed capacity, evict `ceil(cleanup_ratio *
    /// capacity)` items per the active cleanup strategy first.
    pub fn add_many(&mut self, transitions: impl IntoIterator<Item = Transition>) {
        self.add_many_scored(transitions.into_iter().map(|t| (t, 1.0)));
    }

    pub fn add_many_scored(&mut self, transitions: impl IntoIterator<Item = (Transition, f32)>) {
        for (transition, quality) in transitions {
            if self.entries.len() >= self.capacity {
                self.cleanup();
            }
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.entries.push_back(Entry {
                transition,
                quality: quality.clamp(0.0, 1.0),
                sequence,
            });
        }
        // A single huge batch can still overshoot capacity; top up cleanup
        // until we're back at or under it.
        while self.entries.len() > self.capacity {
            self.cleanup();
        }
    }

    fn cleanup(&mut self) {
        let evict = ((self.cleanup_ratio * self.capacity as f64).ceil() as usize)
            .max(1)
            .min(self.entries.len());
        match self.cleanup_strategy {
            CleanupStrategy::OldestFirst => {
                for _ in 0..evict {
                    self.entries.pop_front();
                }
            }
            CleanupStrategy::LowestQuality => {
                let mut indices: Vec<usize> = (0..self.entries.len()).collect();
                indices.sort_by(|&a, &b| {
                    let ea = &self.entries[a];
                    let eb = &self.entries[b];
                    ea.quality
                        .partial_cmp(&eb.quality)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| ea.sequence.cmp(&eb.sequence))
                });
                let mut to_remove: Vec<usize> = indices.into_iter().take(evict).collect();
                to_remove.sort_unstable_by(|a, b| b.cmp(a));
                for idx in to_remove {
                    self.entries.remove(idx);
                }
            }
            CleanupStrategy::Random => {
                let mut rng = self.rng.rng(Stream::Replay);
                let len = self.entries.len();
                let chosen = rand::seq::index::sample(&mut rng, len, evict.min(len));
                let mut to_remove: Vec<usize> = chosen.iter().collect();
                to_remove.sort_unstable_by(|a, b| b.cmp(a));
                for idx in to_remove {
                    self.entries.remove(idx);
                }
            }
        }
    }

    /// Sample a batch of up to `k` transitions using the given strategy.
    /// `k = 0` or an empty store both return an empty batch without error.
    /// Uses the registry's `Replay` stream, so two stores with identical
    /// contents and equal master seeds produce identical batches.
    pub fn sample_batch(&self, k: usize, strategy: SamplingStrategy) -> Vec<Transition> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        match strategy {
            SamplingStrategy::Uniform => self.sample_uniform(k),
            SamplingStrategy::Recent => self.sample_recent(k),
            SamplingStrategy::Mixed { p_recent } => self.sample_mixed(k, p_recent),
        }
    }

    /// Convenience overload using the store's configured default strategy.
    pub fn sample(&self, k: usize) -> Vec<Transition> {
        self.sample_batch(k, self.sampling_strategy)
    }

    fn sample_uniform(&self, k: usize) -> Vec<Transition> {
        let n = self.entries.len();
        let take = k.min(n);
        let mut rng = self.rng.rng(Stream::Replay);
        rand::seq::index::sample(&mut rng, n, take)
            .iter()
            .map(|i| self.entries[i].transition.clone())
            .collect()
    }

    fn sample_recent(&self, k: usize) -> Vec<Transition> {
        let n = self.entries.len();
        let take = k.min(n);
        self.entries
            .iter()
            .skip(n - take)
            .map(|e| e.transition.clone())
            .collect()
    }

    /// Recent items first, in insertion order, followed by uniform samples
    /// from the rest of the store. Ordering must stay stable across equal
    /// seeds and identical store state, so the recent portion is built from
    /// the ordered index range directly rather than through a hash-based
    /// collection.
    fn sample_mixed(&self, k: usize, p_recent: f64) -> Vec<Transition> {
        let n = self.entries.len();
        let total = k.min(n);
        let recent_count = ((p_recent * k as f64).floor() as usize).min(total);
        let recent_start = n.saturating_sub(recent_count);
        let mut batch: Vec<Transition> =
            (recent_start..n).map(|i| self.entries[i].transition.clone()).collect();

        let remaining_take = total.saturating_sub(batch.len());
        if remaining_take > 0 {
            let pool: Vec<usize> = (0..recent_start).collect();
            let mut rng = self.rng.rng(Stream::Replay);
            let chosen = rand::seq::index::sample(&mut rng, pool.len(), remaining_take.min(pool.len()));
            batch.extend(chosen.iter().map(|i| self.entries[pool[i]].transition.clone()));
        }
        batch
    }

    /// Mean quality score of `batch`, matching by value since transitions
    /// are plain data. Reporting-only: this must never feed back into
    /// scheduling or rollback decisions.
    pub fn quality_of(&self, batch: &[Transition]) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }
        let mut total = 0.0f32;
        let mut matched = 0usize;
        for t in batch {
            if let Some(entry) = self.entries.iter().find(|e| &e.transition == t) {
                total += entry.quality;
                matched += 1;
            }
        }
        if matched == 0 {
            0.0
        } else {
            total / matched as f32
        }
    }
}
