//! Node arena and the container holding one tree per open database.
//!
//! Nodes are addressed by [`NodeId`] handles. A handle carries the
//! generation of its slot, so once a node is released every old handle to
//! it resolves to `None` even after the slot is reused.

use crate::order::SiblingOrder;
use crate::reconstruct::Forest;
use crate::secret::SecretString;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sort weight of entries (normal text).
pub const WEIGHT_ENTRY: u32 = 400;
/// Sort weight of database roots.
pub const WEIGHT_ROOT: u32 = 401;
/// Sort weight of groups (bold text).
pub const WEIGHT_GROUP: u32 = 700;

/// Stable handle to a node in a [`TreeContainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    DatabaseRoot,
    Group,
    Entry,
}

/// Top-level node of one open database.
#[derive(Debug)]
pub struct DatabaseRoot {
    pub session: SessionId,
    /// File base name
    pub name: String,
    pub path: PathBuf,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Group {
    /// Group id from the record stream
    pub source_id: u32,
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
    pub parent: NodeId,
    pub root: NodeId,
    pub children: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Entry {
    pub title: String,
    pub username: String,
    pub password: SecretString,
    pub url: String,
    pub modified: Option<DateTime<Utc>>,
    /// Owning group
    pub group: NodeId,
}

#[derive(Debug)]
pub enum Node {
    Root(DatabaseRoot),
    Group(Group),
    Entry(Entry),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Root(_) => NodeKind::DatabaseRoot,
            Node::Group(_) => NodeKind::Group,
            Node::Entry(_) => NodeKind::Entry,
        }
    }

    /// The name shown for this node: file name, group name or entry title.
    pub fn display_name(&self) -> &str {
        match self {
            Node::Root(r) => &r.name,
            Node::Group(g) => &g.name,
            Node::Entry(e) => &e.title,
        }
    }

    pub fn sort_weight(&self) -> u32 {
        match self {
            Node::Root(_) => WEIGHT_ROOT,
            Node::Group(_) => WEIGHT_GROUP,
            Node::Entry(_) => WEIGHT_ENTRY,
        }
    }

    /// Children in stored (source) order.
    pub fn children(&self) -> &[NodeId] {
        match self {
            Node::Root(r) => &r.children,
            Node::Group(g) => &g.children,
            Node::Entry(_) => &[],
        }
    }

    pub fn as_root(&self) -> Option<&DatabaseRoot> {
        match self {
            Node::Root(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Node::Entry(e) => Some(e),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Node::Root(r) => Some(&mut r.children),
            Node::Group(g) => Some(&mut g.children),
            Node::Entry(_) => None,
        }
    }
}

/// Position of a node in display order: index of the database among the
/// roots, then the child index at each level, e.g. `0:1:2`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Number of levels, 1 for a database root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, index) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(':')
            .map(str::parse)
            .collect::<Result<Vec<usize>, _>>()
            .map(Self)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// All open databases as a forest of node trees.
///
/// Roots are kept in open order. Only the session manager mutates the
/// container; readers get shared references.
#[derive(Debug, Default)]
pub struct TreeContainer {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<NodeId>,
    live: usize,
}

impl TreeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database roots in open order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, roots included.
    pub fn node_count(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Children of a node in stored order; empty for unknown handles.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    /// Children of a node in display order.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.children(id).to_vec();
        SiblingOrder::new().sort(self, &mut children);
        children
    }

    /// The database root a node belongs to.
    pub fn owning_root(&self, id: NodeId) -> Option<NodeId> {
        match self.get(id)? {
            Node::Root(_) => Some(id),
            Node::Group(g) => Some(g.root),
            Node::Entry(e) => self.get(e.group)?.as_group().map(|g| g.root),
        }
    }

    /// Find the root of the database opened from `path`.
    pub fn root_for_path(&self, path: &Path) -> Option<NodeId> {
        self.roots.iter().copied().find(|&root| {
            self.get(root)
                .and_then(Node::as_root)
                .is_some_and(|r| r.path.as_path() == path)
        })
    }

    /// Position of a node in display order.
    pub fn path_of(&self, id: NodeId) -> Option<TreePath> {
        let root = self.owning_root(id)?;
        let mut chain = vec![id];
        let mut current = id;
        while current != root {
            current = match self.get(current)? {
                Node::Group(g) => g.parent,
                Node::Entry(e) => e.group,
                Node::Root(_) => break,
            };
            chain.push(current);
        }

        let mut indices = vec![self.roots.iter().position(|&r| r == root)?];
        let mut order = SiblingOrder::new();
        for pair in chain.windows(2).rev() {
            let (child, parent) = (pair[0], pair[1]);
            let mut siblings = self.children(parent).to_vec();
            order.sort(self, &mut siblings);
            indices.push(siblings.iter().position(|&s| s == child)?);
        }
        Some(TreePath(indices))
    }

    /// Node at a display-order position.
    pub fn node_at(&self, path: &TreePath) -> Option<NodeId> {
        let (first, rest) = path.indices().split_first()?;
        let mut current = *self.roots.get(*first)?;
        let mut order = SiblingOrder::new();
        for &index in rest {
            let mut children = self.children(current).to_vec();
            order.sort(self, &mut children);
            current = *children.get(index)?;
        }
        Some(current)
    }

    /// Follow display names down from a node; the first match in display
    /// order wins at each level.
    pub fn resolve<S: AsRef<str>>(&self, from: NodeId, names: &[S]) -> Option<NodeId> {
        let mut current = from;
        self.get(current)?;
        let mut order = SiblingOrder::new();
        for name in names {
            let mut children = self.children(current).to_vec();
            order.sort(self, &mut children);
            current = children.into_iter().find(|&child| {
                self.get(child)
                    .is_some_and(|node| node.display_name() == name.as_ref())
            })?;
        }
        Some(current)
    }

    /// Depth-first walk below `root` in display order, `root` included.
    pub fn walk(&self, root: NodeId) -> Walk<'_> {
        let stack = match self.roots.iter().position(|&r| r == root) {
            Some(index) => vec![(root, TreePath(vec![index]))],
            None => Vec::new(),
        };
        Walk {
            container: self,
            order: SiblingOrder::new(),
            stack,
        }
    }

    /// Depth-first walk over every open database, in open order.
    pub fn walk_all(&self) -> impl Iterator<Item = (TreePath, NodeId)> + '_ {
        self.roots.iter().flat_map(move |&root| self.walk(root))
    }

    /// Attach a new database root holding `forest`.
    pub(crate) fn insert_root(&mut self, session: SessionId, path: PathBuf, forest: Forest) -> NodeId {
        let name = display_name_for(&path);
        let root = self.alloc(Node::Root(DatabaseRoot {
            session,
            name,
            path,
            children: Vec::new(),
        }));
        self.graft(root, forest);
        self.roots.push(root);
        root
    }

    /// Swap the whole subtree below `root` for `forest`.
    ///
    /// The root handle stays valid; every old descendant is released.
    pub(crate) fn replace_subtree(&mut self, root: NodeId, forest: Forest) -> bool {
        let Some(children) = self
            .get_mut(root)
            .and_then(Node::children_mut)
            .map(std::mem::take)
        else {
            return false;
        };
        self.release_all(children);
        self.graft(root, forest);
        true
    }

    /// Remove a database root and everything below it.
    pub fn remove_root(&mut self, root: NodeId) -> bool {
        let Some(position) = self.roots.iter().position(|&r| r == root) else {
            return false;
        };
        self.roots.remove(position);
        self.release_all(vec![root]);
        true
    }

    fn graft(&mut self, root: NodeId, forest: Forest) {
        let groups = forest.into_groups();
        let mut ids: Vec<NodeId> = Vec::with_capacity(groups.len());
        let mut pending = Vec::with_capacity(groups.len());

        // Parents precede children in pre-order, so ids[parent] is set.
        for built in groups {
            let parent = built.parent.map_or(root, |p| ids[p]);
            let id = self.alloc(Node::Group(Group {
                source_id: built.record.id,
                name: built.record.name,
                modified: built.record.modified,
                parent,
                root,
                children: Vec::with_capacity(built.subgroups.len() + built.entries.len()),
            }));
            self.push_child(parent, id);
            ids.push(id);
            pending.push(built.entries);
        }

        for (group, entries) in ids.iter().copied().zip(pending) {
            for record in entries {
                let id = self.alloc(Node::Entry(Entry {
                    title: record.title,
                    username: record.username,
                    password: record.password,
                    url: record.url,
                    modified: record.modified,
                    group,
                }));
                self.push_child(group, id);
            }
        }
    }

    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(children) = self.get_mut(parent).and_then(Node::children_mut) {
            children.push(child);
        }
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Release the given nodes and all their descendants. Dropping a node
    /// scrubs its secrets.
    fn release_all(&mut self, mut stack: Vec<NodeId>) {
        while let Some(id) = stack.pop() {
            if let Some(node) = self.release(id) {
                stack.extend_from_slice(node.children());
            }
        }
    }
}

fn display_name_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Depth-first iterator in display order, yielding each node with its
/// [`TreePath`].
pub struct Walk<'a> {
    container: &'a TreeContainer,
    order: SiblingOrder,
    stack: Vec<(NodeId, TreePath)>,
}

impl Iterator for Walk<'_> {
    type Item = (TreePath, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, path) = self.stack.pop()?;
        let mut children = self.container.children(id).to_vec();
        self.order.sort(self.container, &mut children);
        for (index, child) in children.into_iter().enumerate().rev() {
            self.stack.push((child, path.child(index)));
        }
        Some((path, id))
    }
}
