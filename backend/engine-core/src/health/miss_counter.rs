/// Consecutive failed liveness probes.
///
/// A success resets the count. [`miss`](Self::miss) reports when the count has
/// reached the limit, which is the signal to restart the sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissCounter {
    count: u32,
    max_misses: u32,
}

impl MissCounter {
    pub fn new(max_misses: u32) -> Self {
        Self {
            count: 0,
            max_misses: max_misses.max(1),
        }
    }

    pub fn hit(&mut self) {
        self.count = 0;
    }

    /// Record a miss; `true` once `max_misses` consecutive misses are reached.
    pub fn miss(&mut self) -> bool {
        self.miss_with_limit(self.max_misses)
    }

    /// Record a miss against a temporary limit, e.g. while rendering.
    pub fn miss_with_limit(&mut self, limit: u32) -> bool {
        self.count = self.count.saturating_add(1);
        self.count >= limit.max(1)
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max_misses(&self) -> u32 {
        self.max_misses
    }
}
