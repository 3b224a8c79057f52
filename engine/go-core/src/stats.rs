//! Playout statistics.
//!
//! A `MoveStats` is a (playout count, mean value) pair; the mean is a win
//! probability in [0, 1]. Accumulation keeps the mean exact by weighting
//! with playout counts, so merging partial results from many slaves in any
//! order produces the same aggregate.

/// Count and mean value of a set of playouts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveStats {
    pub playouts: u32,
    pub value: f32,
}

impl MoveStats {
    pub fn new(playouts: u32, value: f32) -> Self {
        Self { playouts, value }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.playouts == 0
    }

    /// Total wins represented by this sample.
    #[inline]
    pub fn wins(&self) -> f64 {
        f64::from(self.value) * f64::from(self.playouts)
    }

    /// Fold another sample into this one (weighted mean).
    pub fn add_result(&mut self, value: f32, playouts: u32) {
        if playouts == 0 {
            return;
        }
        let total = self.playouts + playouts;
        let wins = self.wins() + f64::from(value) * f64::from(playouts);
        self.playouts = total;
        self.value = (wins / f64::from(total)) as f32;
    }

    /// Fold in the difference `now - before`, in wins-space.
    ///
    /// Used when a peer reports cumulative statistics and only the portion
    /// since the last snapshot must be counted.
    pub fn add_delta(&mut self, now: MoveStats, before: MoveStats) {
        let dp = now.playouts.saturating_sub(before.playouts);
        if dp == 0 {
            return;
        }
        let dw = now.wins() - before.wins();
        let total = self.playouts + dp;
        let wins = self.wins() + dw;
        self.playouts = total;
        self.value = (wins / f64::from(total)).clamp(0.0, 1.0) as f32;
    }

    /// The sample that, added to `before`, yields `now`.
    ///
    /// Returns an empty sample when `now` has no more playouts than
    /// `before`.
    pub fn diff(now: MoveStats, before: MoveStats) -> MoveStats {
        let dp = now.playouts.saturating_sub(before.playouts);
        if dp == 0 {
            return MoveStats::default();
        }
        let dw = now.wins() - before.wins();
        MoveStats {
            playouts: dp,
            value: (dw / f64::from(dp)).clamp(0.0, 1.0) as f32,
        }
    }
}

/// Direct and AMAF statistics for one move, always carried together on the
/// wire.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats2 {
    pub u: MoveStats,
    pub amaf: MoveStats,
}

impl Stats2 {
    pub fn new(u: MoveStats, amaf: MoveStats) -> Self {
        Self { u, amaf }
    }
}
