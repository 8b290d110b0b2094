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

//! Implementation of DNS zone data structures, for keeping DNS zones
//! loaded in memory.
//!
//! A [`Zone`] owns a pointer to its current [`ZoneContents`], which
//! can be atomically replaced. The contents are a snapshot: two trees
//! of [`Node`]s sorted in canonical order. The main tree holds every
//! name of the zone (including empty non-terminals), and the NSEC3 tree
//! holds the nodes owning NSEC3 records, whose names are hashes.
//! Readers take a snapshot with [`Zone::snapshot`] and keep using it
//! for as long as they like; updates (see the
//! [`update`](crate::update) module) build new contents and swap them
//! in.
//!
//! The [`ZoneRead`] trait abstracts read access to zone data, so that
//! the chain maintenance code can run both over a snapshot and over
//! the merged view of an update in progress.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::name::Name;
use crate::rr::{Nsec3Param, Ttl, Type};

mod error;
mod node;
mod reference;
pub use error::Error;
pub use node::Node;
pub use reference::{
    invalidate_ref, release_ref, resolve_ref, resolve_target, NodeRef, RefKind,
};

////////////////////////////////////////////////////////////////////////
// READ ACCESS                                                        //
////////////////////////////////////////////////////////////////////////

/// Identifies one of the two node trees of a zone.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeTree {
    /// The tree of ordinary names.
    Main,

    /// The tree of NSEC3 hashed owner names.
    Nsec3,
}

/// An iterator over nodes of a zone.
pub type NodeIter<'a> = Box<dyn Iterator<Item = Arc<Node>> + 'a>;

/// Read access to the nodes of a zone, in canonical order.
pub trait ZoneRead {
    /// Returns the name of the zone apex.
    fn apex(&self) -> &Name;

    /// Looks up the node with the given owner in the given tree.
    fn get(&self, tree: NodeTree, name: &Name) -> Option<Arc<Node>>;

    /// Returns an iterator over all nodes of a tree in canonical order.
    fn iter(&self, tree: NodeTree) -> NodeIter<'_>;

    /// Returns an iterator over all nodes of a tree in reverse
    /// canonical order.
    fn iter_rev(&self, tree: NodeTree) -> NodeIter<'_>;

    /// Returns an iterator over the nodes of a tree that come after
    /// `name`, in canonical order.
    fn after(&self, tree: NodeTree, name: &Name) -> NodeIter<'_>;

    /// Returns an iterator over the nodes of a tree that come before
    /// `name`, in reverse canonical order.
    fn before(&self, tree: NodeTree, name: &Name) -> NodeIter<'_>;

    fn node(&self, name: &Name) -> Option<Arc<Node>> {
        self.get(NodeTree::Main, name)
    }

    fn nsec3_node(&self, name: &Name) -> Option<Arc<Node>> {
        self.get(NodeTree::Nsec3, name)
    }

    fn apex_node(&self) -> Option<Arc<Node>> {
        self.get(NodeTree::Main, self.apex())
    }

    /// Returns whether `name` has nodes below it in the main tree.
    /// Subdomains sort immediately after their ancestors, so only the
    /// next node needs to be checked.
    fn has_children(&self, name: &Name) -> bool {
        self.after(NodeTree::Main, name)
            .next()
            .map_or(false, |next| next.owner().is_subdomain_of(name))
    }

    /// Returns the node before `node` in its tree, wrapping around to
    /// the last node.
    fn previous(&self, node: &Node) -> Option<Arc<Node>> {
        resolve_target(node, RefKind::Previous, self)
    }

    /// Returns the parent node of `node`. See [`RefKind::Parent`].
    fn parent(&self, node: &Node) -> Option<Arc<Node>> {
        resolve_target(node, RefKind::Parent, self)
    }

    /// Returns whether `name` is authoritative data of the zone: it is
    /// within the zone, and no node strictly between it and the apex
    /// is a delegation point. A delegation point itself is
    /// authoritative (for its NS records, the data below it is not).
    fn is_authoritative(&self, name: &Name) -> bool {
        let apex = self.apex();
        if !name.eq_or_subdomain_of(apex) {
            return false;
        }
        let mut owner = name.clone();
        let mut node = self.node(name);
        while owner.len() > apex.len() + 1 {
            let parent_owner = match owner.parent() {
                Some(parent_owner) => parent_owner,
                None => break,
            };
            node = match node.as_deref() {
                Some(child) => self.parent(child),
                None => self.node(&parent_owner),
            };
            if node.as_ref().map_or(false, |parent| parent.is_delegation(apex)) {
                return false;
            }
            owner = parent_owner;
        }
        true
    }

    /// Returns the zone's NSEC3 parameters, taken from the first
    /// NSEC3PARAM record at the apex with its flags set to zero
    /// ([RFC 5155 § 4.1.2]). Returns `None` if there is no such record.
    ///
    /// [RFC 5155 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc5155#section-4.1.2
    fn nsec3_param(&self) -> Option<Nsec3Param> {
        let apex = self.apex_node()?;
        let rrset = apex.lookup(Type::NSEC3PARAM)?;
        rrset
            .rdatas
            .iter()
            .filter_map(|rdata| Nsec3Param::from_rdata(rdata).ok())
            .find(|params| params.flags == 0)
    }

    /// Returns the TTL for denial-of-existence records: the lesser of
    /// the SOA record's TTL and its MINIMUM field ([RFC 9077 § 3.3]).
    ///
    /// [RFC 9077 § 3.3]: https://datatracker.ietf.org/doc/html/rfc9077#section-3.3
    fn denial_ttl(&self) -> Result<Ttl, Error> {
        let apex = self.apex_node().ok_or(Error::InvalidInput)?;
        let soa = apex.lookup(Type::SOA).ok_or(Error::InvalidInput)?;
        let rdata = soa.rdatas.first().ok_or(Error::InvalidInput)?;
        let minimum = Ttl::from_soa_minimum(rdata).ok_or(Error::InvalidRdata)?;
        Ok(soa.ttl.min(minimum))
    }
}

////////////////////////////////////////////////////////////////////////
// ZONE CONTENTS                                                      //
////////////////////////////////////////////////////////////////////////

/// An immutable snapshot of the data of a zone.
///
/// Every snapshot has a generation number. Each commit produces
/// contents with a higher generation than the contents it replaces;
/// the node reference cache uses this to recognize entries computed
/// against other contents.
#[derive(Debug)]
pub struct ZoneContents {
    apex: Name,
    nodes: BTreeMap<Name, Arc<Node>>,
    nsec3_nodes: BTreeMap<Name, Arc<Node>>,
    generation: u64,
}

impl ZoneContents {
    /// Creates contents holding only an empty apex node.
    pub fn new(apex: Name) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            apex.clone(),
            Arc::new(Node::empty(apex.clone(), NodeTree::Main)),
        );
        Self {
            apex,
            nodes,
            nsec3_nodes: BTreeMap::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of nodes in a tree.
    pub fn len(&self, tree: NodeTree) -> usize {
        self.tree(tree).len()
    }

    /// Checks the denial chain of these contents. See
    /// [`dnssec::verify_chain`](crate::dnssec::verify_chain).
    pub fn verify_chain(&self) -> Result<usize, Error> {
        crate::dnssec::verify_chain(self)
    }

    fn tree(&self, tree: NodeTree) -> &BTreeMap<Name, Arc<Node>> {
        match tree {
            NodeTree::Main => &self.nodes,
            NodeTree::Nsec3 => &self.nsec3_nodes,
        }
    }

    /// Builds the successor of these contents. `changes` maps the owner
    /// of each changed node to its replacement, or to `None` if the
    /// node is removed. The nodes that are replaced or removed are
    /// returned as well, so that they can be retired once the new
    /// contents are published.
    pub(crate) fn successor<I>(&self, changes: I) -> (ZoneContents, Vec<Arc<Node>>)
    where
        I: IntoIterator<Item = (NodeTree, Name, Option<Arc<Node>>)>,
    {
        let mut nodes = self.nodes.clone();
        let mut nsec3_nodes = self.nsec3_nodes.clone();
        let mut retired = Vec::new();
        for (tree, owner, replacement) in changes {
            let map = match tree {
                NodeTree::Main => &mut nodes,
                NodeTree::Nsec3 => &mut nsec3_nodes,
            };
            let old = match replacement {
                Some(node) => map.insert(owner, node),
                None => map.remove(&owner),
            };
            retired.extend(old);
        }
        let contents = ZoneContents {
            apex: self.apex.clone(),
            nodes,
            nsec3_nodes,
            generation: self.generation + 1,
        };
        (contents, retired)
    }
}

impl ZoneRead for ZoneContents {
    fn apex(&self) -> &Name {
        &self.apex
    }

    fn get(&self, tree: NodeTree, name: &Name) -> Option<Arc<Node>> {
        self.tree(tree).get(name).cloned()
    }

    fn iter(&self, tree: NodeTree) -> NodeIter<'_> {
        Box::new(self.tree(tree).values().cloned())
    }

    fn iter_rev(&self, tree: NodeTree) -> NodeIter<'_> {
        Box::new(self.tree(tree).values().rev().cloned())
    }

    fn after(&self, tree: NodeTree, name: &Name) -> NodeIter<'_> {
        Box::new(
            self.tree(tree)
                .range::<Name, _>((Excluded(name), Unbounded))
                .map(|(_, node)| node.clone()),
        )
    }

    fn before(&self, tree: NodeTree, name: &Name) -> NodeIter<'_> {
        Box::new(
            self.tree(tree)
                .range::<Name, _>((Unbounded, Excluded(name)))
                .rev()
                .map(|(_, node)| node.clone()),
        )
    }

    fn previous(&self, node: &Node) -> Option<Arc<Node>> {
        node.resolve(RefKind::Previous, self)
    }

    fn parent(&self, node: &Node) -> Option<Arc<Node>> {
        node.resolve(RefKind::Parent, self)
    }
}

////////////////////////////////////////////////////////////////////////
// ZONES                                                              //
////////////////////////////////////////////////////////////////////////

/// A DNS zone whose contents can be swapped atomically.
///
/// Readers call [`Zone::snapshot`] and are never blocked. A single
/// writer at a time (serializing writers is up to the caller) prepares
/// new contents through a [`ZoneUpdate`](crate::update::ZoneUpdate)
/// and publishes them with a compare-and-swap of the content pointer.
/// A reader that took a snapshot before the swap keeps seeing the old,
/// internally consistent, contents.
pub struct Zone {
    name: Name,
    contents: ArcSwap<ZoneContents>,
}

impl Zone {
    /// Creates a new zone whose contents are only an empty apex node.
    pub fn new(name: Name) -> Self {
        let contents = ArcSwap::from_pointee(ZoneContents::new(name.clone()));
        Self { name, contents }
    }

    /// Returns the zone's name.
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Returns the current contents of the zone.
    pub fn snapshot(&self) -> Arc<ZoneContents> {
        self.contents.load_full()
    }

    /// Replaces the contents with `new`, provided that they are still
    /// `expected`. Otherwise nothing is changed and
    /// [`Error::ConcurrentUpdate`] is returned.
    pub(crate) fn swap_contents(
        &self,
        expected: &Arc<ZoneContents>,
        new: Arc<ZoneContents>,
    ) -> Result<(), Error> {
        let previous = self.contents.compare_and_swap(expected, new);
        if Arc::ptr_eq(&previous, expected) {
            Ok(())
        } else {
            Err(Error::ConcurrentUpdate)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::tests::{name, zone_with};
    use crate::update::{UpdateFlags, ZoneUpdate};

    #[test]
    fn chain_checks_resolve_through_reference_cache() {
        let zone = zone_with("example.", &["a.example.", "www.sub.example."], false);
        let contents = zone.snapshot();
        // sub.example. is an empty non-terminal and has no NSEC record.
        assert_eq!(contents.verify_chain(), Ok(3));

        // The backward walk cached previous-node references.
        let www = contents.node(&name("www.sub.example.")).unwrap();
        let previous = www.reference(RefKind::Previous).unwrap();
        assert!(previous.is_valid());
        assert_eq!(previous.generation(), contents.generation());
        assert_eq!(previous.target().unwrap().owner(), &name("sub.example."));

        // The authority check cached the parent reference.
        let parent = www.reference(RefKind::Parent).unwrap();
        assert!(parent.is_valid());
        assert_eq!(parent.target().unwrap().owner(), &name("sub.example."));
    }

    #[test]
    fn authority_walk_stops_at_delegations() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let ns = name("ns.sub.example.");
        update
            .add_record(&name("sub.example."), Type::NS, 3600.into(), ns.wire_repr())
            .unwrap();
        update
            .add_record(&name("a.ns.sub.example."), Type::A, 3600.into(), &[192, 0, 2, 3])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        let contents = update.commit().unwrap();
        assert!(contents.is_authoritative(&name("sub.example.")));
        assert!(!contents.is_authoritative(&name("a.ns.sub.example.")));
        assert!(!contents.is_authoritative(&name("missing.sub.example.")));
        assert!(contents.is_authoritative(&name("a.example.")));
        assert!(!contents.is_authoritative(&name("example.com.")));
    }

    #[test]
    fn new_zone_has_only_apex() {
        let zone = Zone::new(name("example."));
        let contents = zone.snapshot();
        assert_eq!(contents.len(NodeTree::Main), 1);
        assert_eq!(contents.len(NodeTree::Nsec3), 0);
        assert!(contents.apex_node().unwrap().is_empty());
        assert_eq!(contents.denial_ttl(), Err(Error::InvalidInput));
    }

    #[test]
    fn iteration_is_canonical() {
        let zone = zone_with("example.", &["b.example.", "a.example.", "z.a.example."], false);
        let contents = zone.snapshot();
        let owners: Vec<Name> = contents
            .iter(NodeTree::Main)
            .map(|node| node.owner().clone())
            .collect();
        assert_eq!(
            owners,
            [name("example."), name("a.example."), name("z.a.example."), name("b.example.")]
        );
        let before: Vec<Name> = contents
            .before(NodeTree::Main, &name("b.example."))
            .map(|node| node.owner().clone())
            .collect();
        assert_eq!(before, [name("z.a.example."), name("a.example."), name("example.")]);
        assert!(contents.has_children(&name("a.example.")));
        assert!(!contents.has_children(&name("z.a.example.")));
    }

    #[test]
    fn glue_is_not_authoritative() {
        let zone = zone_with("example.", &["ns.sub.example."], false);
        let mut update = crate::update::ZoneUpdate::begin(&zone, crate::update::UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("sub.example."), Type::NS, 3600.into(), b"\x02ns\x03sub\x07example\x00")
            .unwrap();
        assert!(update.is_authoritative(&name("sub.example.")));
        assert!(!update.is_authoritative(&name("ns.sub.example.")));
        assert!(!update.is_authoritative(&name("other.")));
        assert!(update.is_authoritative(&name("example.")));
    }

    #[test]
    fn denial_ttl_is_lesser_of_soa_ttl_and_minimum() {
        let zone = zone_with("example.", &[], false);
        // The test zone's SOA has a TTL of 3600 and a MINIMUM of 300.
        assert_eq!(zone.snapshot().denial_ttl(), Ok(Ttl::from(300)));
    }
}
