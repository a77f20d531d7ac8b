use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, OrdexError, Result, Timestamp};

/// Access history of a single tracked frame.
struct AccessHistory {
    /// The last k access timestamps, most recent at the back
    timestamps: VecDeque<Timestamp>,
    /// Whether the frame may be chosen as an eviction victim
    evictable: bool,
}

impl AccessHistory {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
            evictable: false,
        }
    }

    fn record(&mut self, now: Timestamp, k: usize) {
        self.timestamps.push_back(now);
        while self.timestamps.len() > k {
            self.timestamps.pop_front();
        }
    }

    /// The span covered by the last k accesses, or None when fewer than k
    /// accesses were recorded (treated as an infinite distance).
    fn backward_k_distance(&self, k: usize) -> Option<Timestamp> {
        let len = self.timestamps.len();
        if len < k {
            return None;
        }
        Some(self.timestamps[len - 1] - self.timestamps[len - k])
    }

    /// Timestamp of the most recent access. Every tracked frame has at least
    /// one recorded access.
    fn last_access(&self) -> Timestamp {
        *self.timestamps.back().unwrap_or(&0)
    }
}

struct ReplacerInner {
    /// Logical clock; strictly increasing so access order is total
    clock: Timestamp,
    frames: HashMap<FrameId, AccessHistory>,
    /// Count of tracked frames with the evictable flag set
    num_evictable: usize,
}

/// LRU-K replacement policy.
///
/// The replacer evicts the evictable frame whose backward k-distance is
/// largest. A frame with fewer than k recorded accesses has an infinite
/// distance; among frames tied for the maximum (the infinite group included)
/// the victim is the one with the earliest most-recent access. Compared to
/// plain LRU this resists one-shot scans: a page touched once does not
/// displace pages with an established re-use history.
pub struct LruKReplacer {
    k: usize,
    /// Highest frame index the replacer will track, equal to the pool size
    max_frames: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    pub fn new(k: usize, max_frames: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self {
            k,
            max_frames,
            inner: Mutex::new(ReplacerInner {
                clock: 0,
                frames: HashMap::new(),
                num_evictable: 0,
            }),
        }
    }

    /// Records an access to the given frame at the current timestamp.
    /// Out-of-range frame ids are ignored.
    pub fn record_access(&self, frame_id: FrameId) {
        if frame_id.as_usize() >= self.max_frames {
            return;
        }

        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        let k = self.k;
        inner
            .frames
            .entry(frame_id)
            .or_insert_with(AccessHistory::new)
            .record(now, k);
    }

    /// Flips the evictable flag of a tracked frame, adjusting the replacer
    /// size. Re-marking with the same value, or naming an unknown frame, has
    /// no effect.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        let Some(history) = inner.frames.get_mut(&frame_id) else {
            return;
        };
        if history.evictable == evictable {
            return;
        }
        history.evictable = evictable;
        if evictable {
            inner.num_evictable += 1;
        } else {
            inner.num_evictable -= 1;
        }
    }

    /// Selects and removes the eviction victim.
    ///
    /// Fails with `AllPinned` when no tracked frame is evictable. The chosen
    /// frame's history is dropped; the caller re-registers it on next use.
    pub fn evict(&self) -> Result<FrameId> {
        let mut inner = self.inner.lock();

        let mut victim: Option<(FrameId, Option<Timestamp>, Timestamp)> = None;
        for (&frame_id, history) in inner.frames.iter() {
            if !history.evictable {
                continue;
            }
            let distance = history.backward_k_distance(self.k);
            let last = history.last_access();

            let better = match &victim {
                None => true,
                Some((_, best_distance, best_last)) => match (distance, best_distance) {
                    // An infinite distance beats any finite one
                    (None, Some(_)) => true,
                    (Some(_), None) => false,
                    // Ties break toward the earliest most-recent access
                    (None, None) => last < *best_last,
                    (Some(d), Some(b)) => d > *b || (d == *b && last < *best_last),
                },
            };
            if better {
                victim = Some((frame_id, distance, last));
            }
        }

        let (frame_id, _, _) = victim.ok_or(OrdexError::AllPinned)?;
        inner.frames.remove(&frame_id);
        inner.num_evictable -= 1;
        Ok(frame_id)
    }

    /// Drops a frame's history, used when its page is deleted outright.
    ///
    /// Fails with `RemoveOfPinned` if the frame is tracked but not evictable.
    /// An unknown frame is a successful no-op.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(history) = inner.frames.get(&frame_id) else {
            return Ok(());
        };
        if !history.evictable {
            return Err(OrdexError::RemoveOfPinned(frame_id));
        }
        inner.frames.remove(&frame_id);
        inner.num_evictable -= 1;
        Ok(())
    }

    /// Number of evictable frames currently tracked.
    pub fn size(&self) -> usize {
        self.inner.lock().num_evictable
    }

    pub fn k(&self) -> usize {
        self.k
    }
}
