//! Tree node representation.

use go_core::{Coord, MoveStats};

/// Index into the node arena. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }
}

/// A node in the search tree.
///
/// `u` and `amaf` accumulate everything known about the move; `pu` and
/// `pamaf` snapshot those statistics as of the last synchronization with
/// remote peers, so `u - pu` is exactly the unsynchronized local
/// contribution. `prior` is the constant domain prior assigned at
/// expansion and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: NodeId,
    pub coord: Coord,

    /// Constant domain prior from expansion-time heuristics.
    pub prior: MoveStats,

    /// Direct playout statistics.
    pub u: MoveStats,
    /// All-moves-as-first statistics.
    pub amaf: MoveStats,

    /// Snapshot of `u` at the last peer synchronization.
    pub pu: MoveStats,
    /// Snapshot of `amaf` at the last peer synchronization.
    pub pamaf: MoveStats,

    /// RAVE-mixed node value, refreshed after every stat change.
    pub value: f32,

    /// Children, sorted by coordinate.
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(parent: NodeId, coord: Coord) -> Self {
        Self {
            parent,
            coord,
            prior: MoveStats::default(),
            u: MoveStats::default(),
            amaf: MoveStats::default(),
            pu: MoveStats::default(),
            pamaf: MoveStats::default(),
            value: 0.0,
            children: Vec::new(),
        }
    }

    /// True when the node carries statistics not yet synchronized.
    #[inline]
    pub fn has_pending_delta(&self) -> bool {
        self.u.playouts != self.pu.playouts || self.amaf.playouts != self.pamaf.playouts
    }

    /// Record the current statistics as synchronized.
    #[inline]
    pub fn snapshot_priors(&mut self) {
        self.pu = self.u;
        self.pamaf = self.amaf;
    }

    /// RAVE mixing of AMAF and direct values.
    ///
    /// With no statistics at all the domain prior's value stands in.
    pub fn rave_value(&self, rave_equiv: f32) -> f32 {
        let un = self.u.playouts as f32;
        let an = self.amaf.playouts as f32;
        if un == 0.0 && an == 0.0 {
            return self.prior.value;
        }
        if an == 0.0 {
            return self.u.value;
        }
        if un == 0.0 {
            return self.amaf.value;
        }
        let beta = an / (an + un + un * an / rave_equiv);
        beta * self.amaf.value + (1.0 - beta) * self.u.value
    }

    /// Recompute `value` from the current statistics.
    #[inline]
    pub fn refresh_value(&mut self, rave_equiv: f32) {
        self.value = self.rave_value(rave_equiv);
    }
}
