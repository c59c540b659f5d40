//! Display ordering of sibling nodes.
//!
//! Heavier nodes come first (groups before entries), then display names are
//! compared with the Unicode Collation Algorithm. Empty names go last.

use crate::tree::{Node, NodeId, TreeContainer};
use feruca::Collator;
use std::cmp::Ordering;

/// Comparator for siblings. Holds a collator, so reuse one instance when
/// sorting many lists.
pub struct SiblingOrder {
    collator: Collator,
}

impl Default for SiblingOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl SiblingOrder {
    pub fn new() -> Self {
        Self {
            collator: Collator::default(),
        }
    }

    /// Compare two nodes for display.
    pub fn compare(&mut self, a: &Node, b: &Node) -> Ordering {
        b.sort_weight()
            .cmp(&a.sort_weight())
            .then_with(|| self.compare_names(a.display_name(), b.display_name()))
    }

    /// Compare two display names; an empty name sorts after a present one.
    pub fn compare_names(&mut self, a: &str, b: &str) -> Ordering {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.collator.collate(a, b),
        }
    }

    /// Stable sort of sibling handles. Handles that no longer resolve go
    /// last, keeping their relative order.
    pub fn sort(&mut self, container: &TreeContainer, ids: &mut [NodeId]) {
        ids.sort_by(|&x, &y| match (container.get(x), container.get(y)) {
            (Some(a), Some(b)) => self.compare(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
    }
}
