//! Lanes - Update priorities as bit flags.
//!
//! Every update carries exactly one lane. A root accumulates the lanes of all
//! unprocessed updates in its pending set and always renders the most urgent one.
//!
//! ```text
//! bit 0  SYNC              discrete input, root.render()
//! bit 1  INPUT_CONTINUOUS  drag, scroll, hover
//! bit 2  DEFAULT           everything else
//! bit 3  TRANSITION        start_transition()
//! bit 4  IDLE              offscreen / background
//! ```
//!
//! Lower bits are more urgent, so the highest priority lane of a set is its
//! lowest set bit.

use crate::scheduler::Priority;

bitflags::bitflags! {
    /// A set of lanes. A single lane is a set with one bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 1;
        const DEFAULT = 1 << 2;
        const TRANSITION = 1 << 3;
        const IDLE = 1 << 4;
    }
}

/// A single lane. Same representation as [`Lanes`].
pub type Lane = Lanes;

/// The empty lane.
pub const NO_LANE: Lane = Lanes::empty();

/// The empty lane set.
pub const NO_LANES: Lanes = Lanes::empty();

impl Lanes {
    /// Isolate the most urgent lane (lowest set bit).
    #[inline]
    pub const fn highest_priority(self) -> Lane {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// True if every lane in `subset` is part of `self`.
    ///
    /// The empty lane is a subset of every set, which is how updates that
    /// must always be replayed are encoded.
    #[inline]
    pub const fn includes(self, subset: Lanes) -> bool {
        self.bits() & subset.bits() == subset.bits()
    }

    /// Short name of a single lane, for logs.
    pub fn name(self) -> &'static str {
        let lane = self.highest_priority();
        if lane == Lanes::SYNC {
            "sync"
        } else if lane == Lanes::INPUT_CONTINUOUS {
            "input-continuous"
        } else if lane == Lanes::DEFAULT {
            "default"
        } else if lane == Lanes::TRANSITION {
            "transition"
        } else if lane == Lanes::IDLE {
            "idle"
        } else {
            "none"
        }
    }
}

/// Union of two lane sets.
#[inline]
pub fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    a | b
}

/// Most urgent lane of a set.
#[inline]
pub fn get_highest_priority_lane(lanes: Lanes) -> Lane {
    lanes.highest_priority()
}

/// True if `lane` is a member of `set`.
#[inline]
pub fn is_subset_of_lanes(set: Lanes, lane: Lane) -> bool {
    set.includes(lane)
}

// =============================================================================
// Scheduler Priority Mapping
// =============================================================================

/// Scheduler priority used to service a lane set (its highest lane).
pub fn lanes_to_scheduler_priority(lanes: Lanes) -> Priority {
    let lane = lanes.highest_priority();
    if lane == Lanes::SYNC {
        Priority::Immediate
    } else if lane == Lanes::INPUT_CONTINUOUS {
        Priority::UserBlocking
    } else if lane == Lanes::DEFAULT {
        Priority::Normal
    } else if lane == Lanes::TRANSITION {
        Priority::Low
    } else {
        Priority::Idle
    }
}

/// Lane assigned to an update requested while running at `priority`.
pub fn scheduler_priority_to_lane(priority: Priority) -> Lane {
    match priority {
        Priority::Immediate => Lanes::SYNC,
        Priority::UserBlocking => Lanes::INPUT_CONTINUOUS,
        Priority::Normal => Lanes::DEFAULT,
        Priority::Low => Lanes::TRANSITION,
        Priority::Idle => Lanes::IDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_priority_is_lowest_bit() {
        let set = Lanes::DEFAULT | Lanes::TRANSITION | Lanes::INPUT_CONTINUOUS;
        assert_eq!(get_highest_priority_lane(set), Lanes::INPUT_CONTINUOUS);
        assert_eq!(get_highest_priority_lane(NO_LANES), NO_LANE);
        assert_eq!(get_highest_priority_lane(Lanes::IDLE), Lanes::IDLE);
    }

    #[test]
    fn test_subset_membership() {
        let render = Lanes::SYNC | Lanes::DEFAULT;
        assert!(is_subset_of_lanes(render, Lanes::SYNC));
        assert!(!is_subset_of_lanes(render, Lanes::TRANSITION));
        // Replayed updates are tagged with no lane and always apply.
        assert!(is_subset_of_lanes(Lanes::TRANSITION, NO_LANE));
    }

    #[test]
    fn test_merge_keeps_every_lane() {
        let merged = merge_lanes(Lanes::SYNC, Lanes::TRANSITION);
        assert!(merged.contains(Lanes::SYNC));
        assert!(merged.contains(Lanes::TRANSITION));
        assert_eq!(merged.bits().count_ones(), 2);
    }

    #[test]
    fn test_priority_table_round_trips_per_lane() {
        for lane in [
            Lanes::SYNC,
            Lanes::INPUT_CONTINUOUS,
            Lanes::DEFAULT,
            Lanes::TRANSITION,
            Lanes::IDLE,
        ] {
            let priority = lanes_to_scheduler_priority(lane);
            assert_eq!(scheduler_priority_to_lane(priority), lane, "{}", lane.name());
        }
    }
}
