//! Effect flags - What the commit phase has to do for a fiber.

bitflags::bitflags! {
    /// Commit actions required by a fiber (own) or its subtree (aggregated).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Insert or move the fiber's host nodes.
        const PLACEMENT = 1 << 1;
        /// Apply new text or props to the host node.
        const UPDATE = 1 << 2;
        /// Has passive effects to run after commit.
        const PASSIVE = 1 << 3;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 4;
        /// Attach or detach a node ref.
        const REF = 1 << 5;
    }
}

impl Flags {
    /// Flags handled by the mutation sweep.
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF);

    /// Flags that can leave passive effects behind.
    pub const PASSIVE_MASK: Flags = Flags::PASSIVE.union(Flags::CHILD_DELETION);
}

bitflags::bitflags! {
    /// Tags of an effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookFlags: u8 {
        /// Runs after commit, from a scheduled task.
        const PASSIVE = 1 << 0;
        /// Dependencies changed: tear down and set up again this commit.
        const HAS_EFFECT = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks() {
        assert!(Flags::MUTATION_MASK.contains(Flags::PLACEMENT | Flags::UPDATE));
        assert!(!Flags::MUTATION_MASK.contains(Flags::PASSIVE));
        assert!(Flags::PASSIVE_MASK.intersects(Flags::CHILD_DELETION));
    }
}
