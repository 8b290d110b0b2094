// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The node reference cache.
//!
//! Query processing and chain maintenance repeatedly need three
//! relations of a node: the node before it in canonical order (with
//! wrap-around), its parent in the DNS tree, and its NSEC3 counterpart.
//! Each [`Node`] memoizes these in a slot per [`RefKind`]. A slot holds
//! a shared [`NodeRef`], which in turn holds a [`Weak`] pointer to the
//! target (or nothing, for an empty result), the generation of the
//! [`ZoneContents`] it was resolved against, and a validity flag.
//!
//! Slots are [`ArcSwapOption`]s, so readers never block. A new
//! [`NodeRef`] is installed with a compare-and-swap against the entry
//! the reader looked at; the displaced entry is then invalidated. An
//! invalidated [`NodeRef`] is never made valid again, and a
//! [`NodeRef`] must be invalidated before it is dropped. Since the
//! target is held weakly, references never keep nodes alive, and there
//! are no reference cycles between nodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use log::warn;

use super::{Node, NodeTree, ZoneContents, ZoneRead};

/// The relations that the node reference cache memoizes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RefKind {
    /// The greatest node before this one in canonical order, in the
    /// same tree, wrapping around to the last node.
    Previous,

    /// The parent node. The apex has none; for the nodes of the NSEC3
    /// tree, it is the apex.
    Parent,

    /// The NSEC3 node whose owner is the hash of this node's name.
    Nsec3,
}

impl RefKind {
    const ALL: [RefKind; 3] = [Self::Previous, Self::Parent, Self::Nsec3];

    fn index(self) -> usize {
        match self {
            Self::Previous => 0,
            Self::Parent => 1,
            Self::Nsec3 => 2,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// REFERENCE OBJECTS                                                  //
////////////////////////////////////////////////////////////////////////

/// A memoized result of a node reference resolution.
#[derive(Debug)]
pub struct NodeRef {
    target: Option<Weak<Node>>,
    generation: u64,
    valid: AtomicBool,
}

impl NodeRef {
    fn new(target: Option<&Arc<Node>>, generation: u64) -> Self {
        Self {
            target: target.map(Arc::downgrade),
            generation,
            valid: AtomicBool::new(true),
        }
    }

    /// Returns the target node. This is `None` both for an empty result
    /// and for a target that no longer exists; use
    /// [`NodeRef::is_empty`] to tell the two apart.
    pub fn target(&self) -> Option<Arc<Node>> {
        self.target.as_ref().and_then(Weak::upgrade)
    }

    /// Returns whether this is a memoized empty result.
    pub fn is_empty(&self) -> bool {
        self.target.is_none()
    }

    /// Returns the generation of the zone contents this reference was
    /// resolved against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Marks the reference as invalid. Returns whether it was valid
    /// before.
    pub fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        debug_assert!(
            !*self.valid.get_mut(),
            "node reference dropped while still valid"
        );
    }
}

/// Marks `node_ref` as invalid, so that it is no longer returned as a
/// cache hit. Returns whether it was valid before.
pub fn invalidate_ref(node_ref: &NodeRef) -> bool {
    node_ref.invalidate()
}

/// Releases a reference obtained through [`Node::reference`].
pub fn release_ref(node_ref: Arc<NodeRef>) {
    drop(node_ref);
}

////////////////////////////////////////////////////////////////////////
// SLOTS                                                              //
////////////////////////////////////////////////////////////////////////

/// The cache slot for one [`RefKind`].
#[derive(Default)]
pub struct RefSlot(ArcSwapOption<NodeRef>);

impl RefSlot {
    /// Invalidates the current entry, if any. The entry stays in place
    /// until a reader replaces it.
    fn invalidate(&self) {
        if let Some(entry) = &*self.0.load() {
            entry.invalidate();
        }
    }
}

impl Drop for RefSlot {
    fn drop(&mut self) {
        if let Some(entry) = self.0.swap(None) {
            entry.invalidate();
        }
    }
}

/// The cache slots of a node.
#[derive(Default)]
pub struct RefSlots([RefSlot; 3]);

fn same_entry(a: &Option<Arc<NodeRef>>, b: &Option<Arc<NodeRef>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

////////////////////////////////////////////////////////////////////////
// RESOLUTION                                                         //
////////////////////////////////////////////////////////////////////////

impl Node {
    /// Resolves the `kind` relation of this node in `zone`, consulting
    /// and populating the cache.
    ///
    /// A cached entry is used if it is valid, was resolved against the
    /// same generation of zone contents, and its target still exists.
    /// Otherwise the relation is computed afresh and a new entry is
    /// installed. If the slot already holds an entry from a newer
    /// generation (because this reader works from an older snapshot),
    /// the result is computed but not cached.
    ///
    /// "No such node" is an ordinary result: it is returned as `None`
    /// and cached like any other.
    pub fn resolve(&self, kind: RefKind, zone: &ZoneContents) -> Option<Arc<Node>> {
        let slot = &self.refs.0[kind.index()].0;
        let current = slot.load();
        if let Some(entry) = &*current {
            if entry.generation > zone.generation() {
                return resolve_target(self, kind, zone);
            } else if entry.generation == zone.generation() && entry.is_valid() {
                match &entry.target {
                    None => return None,
                    Some(weak) => {
                        if let Some(target) = weak.upgrade() {
                            return Some(target);
                        }
                        warn!(
                            "cached {:?} reference of {} points at a node that no longer exists",
                            kind, self.owner()
                        );
                    }
                }
            }
        }

        let target = resolve_target(self, kind, zone);
        let fresh = Arc::new(NodeRef::new(target.as_ref(), zone.generation()));
        let previous = slot.compare_and_swap(&current, Some(fresh.clone()));
        if same_entry(&previous, &current) {
            if let Some(displaced) = &*previous {
                displaced.invalidate();
            }
        } else {
            // Another reader installed an entry first; ours was never
            // published.
            fresh.invalidate();
        }
        target
    }

    /// Returns the entry currently cached for `kind`, if any, without
    /// resolving anything.
    pub fn reference(&self, kind: RefKind) -> Option<Arc<NodeRef>> {
        self.refs.0[kind.index()].0.load_full()
    }

    /// Invalidates every cached reference of this node. This is done
    /// to nodes that an update removes or replaces.
    pub fn retire(&self) {
        for kind in RefKind::ALL {
            self.refs.0[kind.index()].invalidate();
        }
    }
}

/// Resolves a node in `zone`, through the cache of `node`.
pub fn resolve_ref(node: &Node, kind: RefKind, zone: &ZoneContents) -> Option<Arc<Node>> {
    node.resolve(kind, zone)
}

/// Computes the `kind` relation of `node` in `zone` without touching
/// the cache.
pub fn resolve_target<Z: ZoneRead + ?Sized>(
    node: &Node,
    kind: RefKind,
    zone: &Z,
) -> Option<Arc<Node>> {
    match kind {
        RefKind::Previous => previous_node(node, zone),
        RefKind::Parent => parent_node(node, zone),
        RefKind::Nsec3 => nsec3_node(node, zone),
    }
}

fn previous_node<Z: ZoneRead + ?Sized>(node: &Node, zone: &Z) -> Option<Arc<Node>> {
    let tree = node.tree();
    zone.before(tree, node.owner())
        .next()
        .or_else(|| zone.iter_rev(tree).next())
}

fn parent_node<Z: ZoneRead + ?Sized>(node: &Node, zone: &Z) -> Option<Arc<Node>> {
    match node.tree() {
        NodeTree::Nsec3 => zone.get(NodeTree::Main, zone.apex()),
        NodeTree::Main if node.owner() == zone.apex() => None,
        NodeTree::Main => {
            let parent = node.owner().parent()?;
            zone.get(NodeTree::Main, &parent)
        }
    }
}

fn nsec3_node<Z: ZoneRead + ?Sized>(node: &Node, zone: &Z) -> Option<Arc<Node>> {
    if node.tree() == NodeTree::Nsec3 {
        return None;
    }
    let params = zone.nsec3_param()?;
    let owner = params.owner_for(node.owner(), zone.apex()).ok()?;
    zone.get(NodeTree::Nsec3, &owner)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::name::Name;
    use crate::rr::Type;
    use crate::update::tests::{name, zone_with};
    use crate::update::{UpdateFlags, ZoneUpdate};

    #[test]
    fn previous_wraps_around() {
        let zone = zone_with("example.", &["a.example.", "b.example."], false);
        let contents = zone.snapshot();
        let apex = contents.node(&name("example.")).unwrap();
        let a = contents.node(&name("a.example.")).unwrap();
        let b = contents.node(&name("b.example.")).unwrap();
        assert!(Arc::ptr_eq(&apex.resolve(RefKind::Previous, &contents).unwrap(), &b));
        assert!(Arc::ptr_eq(&b.resolve(RefKind::Previous, &contents).unwrap(), &a));
        assert!(Arc::ptr_eq(&a.resolve(RefKind::Previous, &contents).unwrap(), &apex));
    }

    #[test]
    fn parent_of_apex_is_empty_and_cached() {
        let zone = zone_with("example.", &["a.example."], false);
        let contents = zone.snapshot();
        let apex = contents.node(&name("example.")).unwrap();
        let a = contents.node(&name("a.example.")).unwrap();
        assert!(apex.resolve(RefKind::Parent, &contents).is_none());
        let entry = apex.reference(RefKind::Parent).unwrap();
        assert!(entry.is_valid());
        assert!(entry.is_empty());
        assert!(Arc::ptr_eq(&a.resolve(RefKind::Parent, &contents).unwrap(), &apex));
    }

    #[test]
    fn apex_only_zone_without_nsec3param_has_no_nsec3_node() {
        let zone = zone_with("example.", &[], false);
        let contents = zone.snapshot();
        let apex = contents.node(&name("example.")).unwrap();
        assert!(resolve_ref(&apex, RefKind::Nsec3, &contents).is_none());
        assert!(apex.reference(RefKind::Nsec3).unwrap().is_empty());
    }

    #[test]
    fn nsec3_relations_resolve() {
        let zone = zone_with("example.", &["a.example."], true);
        let contents = zone.snapshot();
        let a = contents.node(&name("a.example.")).unwrap();
        let hashed = a.resolve(RefKind::Nsec3, &contents).unwrap();
        assert_eq!(hashed.tree(), NodeTree::Nsec3);
        assert!(hashed.lookup(Type::NSEC3).is_some());
        assert!(hashed.resolve(RefKind::Nsec3, &contents).is_none());
        let apex = hashed.resolve(RefKind::Parent, &contents).unwrap();
        assert_eq!(apex.owner(), &name("example."));
        let previous = hashed.resolve(RefKind::Previous, &contents).unwrap();
        assert_eq!(previous.tree(), NodeTree::Nsec3);
    }

    #[test]
    fn cache_hit_returns_same_entry() {
        let zone = zone_with("example.", &["a.example."], false);
        let contents = zone.snapshot();
        let a = contents.node(&name("a.example.")).unwrap();
        a.resolve(RefKind::Previous, &contents);
        let first = a.reference(RefKind::Previous).unwrap();
        a.resolve(RefKind::Previous, &contents);
        let second = a.reference(RefKind::Previous).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn invalidated_reference_is_replaced_not_revalidated() {
        let zone = zone_with("example.", &["a.example."], false);
        let contents = zone.snapshot();
        let a = contents.node(&name("a.example.")).unwrap();
        a.resolve(RefKind::Previous, &contents);
        let old = a.reference(RefKind::Previous).unwrap();
        assert!(invalidate_ref(&old));
        assert!(!invalidate_ref(&old));
        let target = a.resolve(RefKind::Previous, &contents).unwrap();
        assert_eq!(target.owner(), &name("example."));
        let new = a.reference(RefKind::Previous).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!old.is_valid());
        assert!(new.is_valid());
        release_ref(old);
    }

    #[test]
    fn references_follow_content_swap() {
        let zone = zone_with("example.", &["c.example."], false);
        let before = zone.snapshot();
        let c = before.node(&name("c.example.")).unwrap();
        let held = c.resolve(RefKind::Previous, &before).unwrap();
        assert_eq!(held.owner(), &name("example."));

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        update.commit().unwrap();

        // The reference resolved before the swap still points at
        // intact old content.
        assert_eq!(held.owner(), &name("example."));
        assert!(held.lookup(Type::SOA).is_some());

        // Resolving against the new content sees the new node, even
        // through a node shared by both generations.
        let after = zone.snapshot();
        let shared = after.node(&name("c.example.")).unwrap();
        let previous = shared.resolve(RefKind::Previous, &after).unwrap();
        assert_eq!(previous.owner(), &name("b.example."));

        // A reader still working from the old snapshot is not handed
        // the newer entry, and does not overwrite it.
        let stale = c.resolve(RefKind::Previous, &before).unwrap();
        assert_eq!(stale.owner(), &name("example."));
        assert_eq!(
            shared.reference(RefKind::Previous).unwrap().generation(),
            after.generation()
        );
    }

    #[test]
    fn concurrent_resolution_and_invalidation() {
        let names: Vec<String> = (0..32).map(|i| format!("n{i:02}.example.")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let zone = zone_with("example.", &names, false);
        let contents = zone.snapshot();
        let nodes: Vec<Arc<Node>> = contents.iter(NodeTree::Main).collect();
        let expected: Vec<Name> = (0..nodes.len())
            .map(|i| nodes[(i + nodes.len() - 1) % nodes.len()].owner().clone())
            .collect();
        let nodes = Arc::new(nodes);
        let expected = Arc::new(expected);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let contents = contents.clone();
                let nodes = nodes.clone();
                let expected = expected.clone();
                thread::spawn(move || {
                    for round in 0..200 {
                        for (i, node) in nodes.iter().enumerate() {
                            if (i + round + t) % 5 == 0 {
                                if let Some(entry) = node.reference(RefKind::Previous) {
                                    invalidate_ref(&entry);
                                }
                            }
                            let previous = node.resolve(RefKind::Previous, &contents).unwrap();
                            assert_eq!(previous.owner(), &expected[i]);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
