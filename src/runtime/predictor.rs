use std::time::Duration;

/// Levels for which run times are tracked; deeper levels share the last
/// bucket.
const NUM_LEVELS: usize = 32;

/// Per-worker estimator of task run times by tree depth.
///
/// Each level keeps an exponentially smoothed average of observed run
/// times. Unmeasured levels are extrapolated from the nearest measured
/// one, halving per level of depth (the work of a task is roughly the sum
/// of its two children's). With no measurements at all the estimate is
/// zero, so fresh workers do not over-split; the eager shallow-depth
/// splitting at release covers initial decomposition.
#[derive(Debug)]
pub(crate) struct RuntimePredictor {
    times: [Duration; NUM_LEVELS],
    seen: [bool; NUM_LEVELS],
}

impl RuntimePredictor {
    pub(crate) fn new() -> Self {
        RuntimePredictor {
            times: [Duration::ZERO; NUM_LEVELS],
            seen: [false; NUM_LEVELS],
        }
    }

    fn level(depth: u32) -> usize {
        (depth as usize).min(NUM_LEVELS - 1)
    }

    /// Expected run time of a task at the given depth.
    pub(crate) fn predict(&self, depth: u32) -> Duration {
        let level = Self::level(depth);

        if self.seen[level] {
            return self.times[level];
        }

        // Nearest measured ancestor level, halved per level in between.
        for up in (0..level).rev() {
            if self.seen[up] {
                let shift = (level - up).min(u32::BITS as usize - 1) as u32;
                return self.times[up] / (1u32 << shift);
            }
        }

        // Nearest measured deeper level, doubled per level in between.
        for down in level + 1..NUM_LEVELS {
            if self.seen[down] {
                let shift = (down - level).min(u32::BITS as usize - 1) as u32;
                return self.times[down].saturating_mul(1u32 << shift);
            }
        }

        Duration::ZERO
    }

    /// Folds an observed run time into the estimate for `depth`.
    pub(crate) fn record(&mut self, depth: u32, time: Duration) {
        let level = Self::level(depth);

        if self.seen[level] {
            // Weighted 3:1 towards history to smooth out scheduling noise.
            self.times[level] = (self.times[level] * 3 + time) / 4;
        } else {
            self.times[level] = time;
            self.seen[level] = true;
        }
    }
}
