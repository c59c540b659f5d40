//! Rebuilds the group/entry hierarchy from a flat, depth-tagged record
//! stream.
//!
//! Groups arrive in pre-order. A single pass keeps a stack holding the
//! currently open ancestor at each depth, so nesting depth in the input
//! never turns into recursion depth here.

use crate::record::{EntryRecord, GroupRecord, RecordStream};
use std::collections::HashMap;
use thiserror::Error;

/// Ways a record stream can violate the structure the tree relies on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    #[error("group {group_id} at level {level} has no parent at the level above")]
    DepthGap { group_id: u32, level: u32 },

    #[error("group id {group_id} appears more than once")]
    DuplicateGroupId { group_id: u32 },

    #[error("entry {title:?} references unknown group {group_id}")]
    OrphanEntry { title: String, group_id: u32 },
}

/// A group of the rebuilt forest, still holding its source records.
#[derive(Debug)]
pub struct BuiltGroup {
    pub record: GroupRecord,
    /// Index of the parent group, `None` for top-level groups
    pub parent: Option<usize>,
    /// Indices of direct subgroups, in source order
    pub subgroups: Vec<usize>,
    /// Entries of this group, in source order
    pub entries: Vec<EntryRecord>,
}

/// The validated result of [`build`].
///
/// Groups are stored in source (pre-order) order, so every parent index is
/// smaller than the index of its children.
#[derive(Debug, Default)]
pub struct Forest {
    groups: Vec<BuiltGroup>,
    top_level: Vec<usize>,
    dropped: Vec<Corruption>,
}

impl Forest {
    pub fn groups(&self) -> &[BuiltGroup] {
        &self.groups
    }

    /// Indices of the level-0 groups.
    pub fn top_level(&self) -> &[usize] {
        &self.top_level
    }

    /// Entries that were left out because their group does not exist.
    pub fn dropped(&self) -> &[Corruption] {
        &self.dropped
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    pub fn into_groups(self) -> Vec<BuiltGroup> {
        self.groups
    }
}

/// Build a forest from a record stream.
///
/// Fails on depth gaps and duplicate group ids. Entries that point at an
/// unknown group are dropped and listed in [`Forest::dropped`].
pub fn build(stream: RecordStream) -> Result<Forest, Corruption> {
    let RecordStream { groups, entries } = stream;

    let mut built: Vec<BuiltGroup> = Vec::with_capacity(groups.len());
    let mut by_id: HashMap<u32, usize> = HashMap::with_capacity(groups.len());
    let mut top_level = Vec::new();
    // (level, index) of the open ancestor at each depth
    let mut stack: Vec<(u32, usize)> = Vec::new();

    for record in groups {
        let level = record.level;
        while stack.last().is_some_and(|&(open, _)| open >= level) {
            stack.pop();
        }

        let parent = if level == 0 {
            None
        } else {
            match stack.last() {
                Some(&(open, index)) if open + 1 == level => Some(index),
                _ => {
                    return Err(Corruption::DepthGap {
                        group_id: record.id,
                        level,
                    })
                }
            }
        };

        let index = built.len();
        if by_id.insert(record.id, index).is_some() {
            return Err(Corruption::DuplicateGroupId {
                group_id: record.id,
            });
        }

        match parent {
            Some(p) => built[p].subgroups.push(index),
            None => top_level.push(index),
        }
        built.push(BuiltGroup {
            record,
            parent,
            subgroups: Vec::new(),
            entries: Vec::new(),
        });
        stack.push((level, index));
    }

    let mut dropped = Vec::new();
    for entry in entries {
        match by_id.get(&entry.group_id) {
            Some(&index) => built[index].entries.push(entry),
            None => {
                tracing::warn!(
                    group_id = entry.group_id,
                    "dropping entry that references an unknown group"
                );
                dropped.push(Corruption::OrphanEntry {
                    title: entry.title.clone(),
                    group_id: entry.group_id,
                });
            }
        }
    }

    tracing::debug!(
        groups = built.len(),
        top_level = top_level.len(),
        dropped = dropped.len(),
        "record stream rebuilt"
    );

    Ok(Forest {
        groups: built,
        top_level,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: u32, level: u32, name: &str) -> GroupRecord {
        GroupRecord::new(id, level, name)
    }

    /// Pre-order walk of the forest as (level, name) pairs.
    fn preorder(forest: &Forest) -> Vec<(u32, String)> {
        let mut out = Vec::new();
        let mut stack: Vec<(u32, usize)> =
            forest.top_level().iter().rev().map(|&i| (0, i)).collect();
        while let Some((level, index)) = stack.pop() {
            let g = &forest.groups()[index];
            out.push((level, g.record.name.clone()));
            for &child in g.subgroups.iter().rev() {
                stack.push((level + 1, child));
            }
        }
        out
    }

    #[test]
    fn test_example_tree() {
        let stream = RecordStream::new(
            vec![
                group(1, 0, "Internet"),
                group(2, 1, "Banking"),
                group(3, 0, "Email"),
            ],
            vec![EntryRecord::new(2, "Bank A"), EntryRecord::new(99, "Orphan")],
        );

        let forest = build(stream).unwrap();
        assert_eq!(forest.top_level(), &[0, 2]);
        assert_eq!(forest.groups()[0].subgroups, vec![1]);
        assert_eq!(forest.groups()[1].parent, Some(0));
        assert_eq!(forest.groups()[1].entries.len(), 1);
        assert_eq!(forest.groups()[1].entries[0].title, "Bank A");
        assert!(forest.groups()[2].subgroups.is_empty());

        assert_eq!(
            forest.dropped(),
            &[Corruption::OrphanEntry {
                title: "Orphan".to_string(),
                group_id: 99
            }]
        );
        assert_eq!(forest.entry_count(), 1);
    }

    #[test]
    fn test_preorder_matches_input() {
        let groups = vec![
            group(1, 0, "a"),
            group(2, 1, "a.1"),
            group(3, 2, "a.1.x"),
            group(4, 2, "a.1.y"),
            group(5, 1, "a.2"),
            group(6, 0, "b"),
            group(7, 1, "b.1"),
            group(8, 2, "b.1.x"),
            group(9, 3, "b.1.x.deep"),
            group(10, 0, "c"),
        ];
        let expected: Vec<(u32, String)> =
            groups.iter().map(|g| (g.level, g.name.clone())).collect();

        let forest = build(RecordStream::new(groups, vec![])).unwrap();
        assert_eq!(preorder(&forest), expected);
    }

    #[test]
    fn test_dedent_by_several_levels() {
        let forest = build(RecordStream::new(
            vec![
                group(1, 0, "a"),
                group(2, 1, "b"),
                group(3, 2, "c"),
                group(4, 3, "d"),
                group(5, 1, "e"),
            ],
            vec![],
        ))
        .unwrap();

        assert_eq!(forest.groups()[4].parent, Some(0));
        assert_eq!(forest.groups()[0].subgroups, vec![1, 4]);
    }

    #[test]
    fn test_depth_gap_is_rejected() {
        let err = build(RecordStream::new(
            vec![group(1, 0, "a"), group(2, 2, "too deep")],
            vec![],
        ))
        .unwrap_err();

        assert_eq!(
            err,
            Corruption::DepthGap {
                group_id: 2,
                level: 2
            }
        );
    }

    #[test]
    fn test_first_group_must_be_top_level() {
        let err = build(RecordStream::new(vec![group(1, 1, "floating")], vec![])).unwrap_err();
        assert!(matches!(err, Corruption::DepthGap { group_id: 1, .. }));
    }

    #[test]
    fn test_duplicate_group_id_is_rejected() {
        let err = build(RecordStream::new(
            vec![group(1, 0, "a"), group(1, 0, "b")],
            vec![],
        ))
        .unwrap_err();

        assert_eq!(err, Corruption::DuplicateGroupId { group_id: 1 });
    }

    #[test]
    fn test_entries_keep_source_order() {
        let forest = build(RecordStream::new(
            vec![group(1, 0, "a"), group(2, 0, "b")],
            vec![
                EntryRecord::new(1, "z"),
                EntryRecord::new(2, "other"),
                EntryRecord::new(1, "a"),
                EntryRecord::new(1, "m"),
            ],
        ))
        .unwrap();

        let titles: Vec<&str> = forest.groups()[0]
            .entries
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(titles, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_empty_stream() {
        let forest = build(RecordStream::default()).unwrap();
        assert_eq!(forest.group_count(), 0);
        assert!(forest.top_level().is_empty());
    }

    #[test]
    fn test_entries_without_groups_are_all_dropped() {
        let forest = build(RecordStream::new(
            vec![],
            vec![EntryRecord::new(1, "a"), EntryRecord::new(2, "b")],
        ))
        .unwrap();

        assert_eq!(forest.dropped().len(), 2);
        assert_eq!(forest.entry_count(), 0);
    }
}
