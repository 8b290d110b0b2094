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

//! Implementation of the [`Node`] structure.

use std::fmt;

use super::reference::RefSlots;
use super::NodeTree;
use crate::name::Name;
use crate::rr::{rrsig_type_covered, Rdata, Rrset, RrsetList, Type, TypeBitmap};

/// A node of a zone: one distinct owner name and the RRsets it holds.
///
/// Nodes are immutable once they are shared through a
/// [`ZoneContents`](super::ZoneContents). An update builds a new node
/// with the changed RRsets, and the new node replaces the old one when
/// the update commits. The type summary returned by [`Node::types`] is
/// therefore computed once, at construction.
///
/// Each node also carries the slots of the node reference cache (see
/// [`Node::resolve`]).
pub struct Node {
    owner: Name,
    rrsets: RrsetList,
    types: TypeBitmap,
    tree: NodeTree,
    pub(super) refs: RefSlots,
}

impl Node {
    /// Creates a new node in the given tree.
    pub fn new(owner: Name, rrsets: RrsetList, tree: NodeTree) -> Self {
        let types = rrsets
            .types()
            .filter(|t| !t.is_denial_or_signature())
            .collect();
        Self {
            owner,
            rrsets,
            types,
            tree,
            refs: RefSlots::default(),
        }
    }

    /// Creates a node with no RRsets, such as an empty non-terminal.
    pub fn empty(owner: Name, tree: NodeTree) -> Self {
        Self::new(owner, RrsetList::new(), tree)
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    pub fn rrsets(&self) -> &RrsetList {
        &self.rrsets
    }

    /// Returns the types present at this node, leaving out NSEC, NSEC3,
    /// and RRSIG.
    pub fn types(&self) -> &TypeBitmap {
        &self.types
    }

    /// Returns which tree of the zone this node belongs to.
    pub fn tree(&self) -> NodeTree {
        self.tree
    }

    pub fn lookup(&self, rr_type: Type) -> Option<&Rrset> {
        self.rrsets.lookup(rr_type)
    }

    /// Returns whether the node holds no RRsets at all.
    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    /// Returns the RRSIG RDATA at this node that covers `covered`.
    pub fn signatures_covering(&self, covered: Type) -> Vec<Rdata> {
        self.lookup(Type::RRSIG)
            .map(|rrsigs| {
                rrsigs
                    .rdatas
                    .iter()
                    .filter(|rdata| rrsig_type_covered(rdata) == Some(covered))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns whether this node is a delegation point, i.e., holds NS
    /// records while not being the apex of the zone.
    pub fn is_delegation(&self, apex: &Name) -> bool {
        self.rrsets.contains(Type::NS) && self.owner != *apex
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Node")
            .field("owner", &self.owner)
            .field("types", &self.types)
            .field("tree", &self.tree)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::Ttl;

    fn rdata(octets: &[u8]) -> Rdata {
        Rdata::try_from(octets).unwrap()
    }

    #[test]
    fn types_exclude_denial_and_signatures() {
        let mut rrsets = RrsetList::new();
        let ttl = Ttl::from(3600);
        rrsets.add(Type::A, ttl, rdata(&[192, 0, 2, 1])).unwrap();
        rrsets.add(Type::NSEC, ttl, rdata(b"\x00")).unwrap();
        rrsets.add(Type::RRSIG, ttl, rdata(&[0, 1])).unwrap();
        rrsets.add(Type::RRSIG, ttl, rdata(&[0, 47])).unwrap();
        let node = Node::new("www.example.".parse().unwrap(), rrsets, NodeTree::Main);
        assert_eq!(node.types().iter().collect::<Vec<_>>(), [Type::A]);
        assert_eq!(node.signatures_covering(Type::NSEC), [rdata(&[0, 47])]);
        assert!(node.signatures_covering(Type::NSEC3).is_empty());
    }

    #[test]
    fn delegation_excludes_apex() {
        let apex: Name = "example.".parse().unwrap();
        let mut rrsets = RrsetList::new();
        rrsets
            .add(Type::NS, Ttl::from(3600), rdata(b"\x02ns\x07example\x00"))
            .unwrap();
        let at_apex = Node::new(apex.clone(), rrsets.clone(), NodeTree::Main);
        let below = Node::new("sub.example.".parse().unwrap(), rrsets, NodeTree::Main);
        assert!(!at_apex.is_delegation(&apex));
        assert!(below.is_delegation(&apex));
        assert!(!Node::empty(apex.clone(), NodeTree::Main).is_delegation(&apex));
    }
}
