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

//! Zone update transactions.
//!
//! A [`ZoneUpdate`] stages record additions and removals against a
//! snapshot of a [`Zone`]'s contents, without touching the contents
//! themselves. Through its [`ZoneRead`] implementation, it presents the
//! zone as it will be once the staged changes are applied; this is the
//! view that the denial-of-existence chain code works on. When the
//! update is committed, new [`ZoneContents`] are built and atomically
//! swapped in. Dropping or aborting the update discards everything.
//!
//! Nodes touched by the update are kept in an arena. They are
//! materialized as [`Node`]s only when somebody looks at them, and
//! rematerialized after each change.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::ops::BitOr;
use std::sync::Arc;

use log::{debug, info, log_enabled, trace, Level};
use slab::Slab;

use crate::dnssec::{self, ChainFixState};
use crate::name::Name;
use crate::rr::{rrsig_type_covered, Rdata, RrsetList, Ttl, Type};
use crate::util::{MergeSorted, Merged};
use crate::zone::{Error, Node, NodeIter, NodeTree, Zone, ZoneContents, ZoneRead};

mod changeset;
pub use changeset::{Changeset, OwnedRrset};

////////////////////////////////////////////////////////////////////////
// FLAGS AND CHANGE DESCRIPTORS                                       //
////////////////////////////////////////////////////////////////////////

/// Flags controlling a [`ZoneUpdate`]. Combine them with `|`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    /// Rebuild the denial-of-existence chain from scratch.
    pub const FULL: Self = Self(1 << 0);

    /// Repair the denial-of-existence chain around the changes only.
    /// This is the default when neither `FULL` nor `INCREMENTAL` is
    /// given.
    pub const INCREMENTAL: Self = Self(1 << 1);

    /// Keep track of the denial-of-existence records that need new
    /// signatures (see [`ZoneUpdate::unsigned`]).
    pub const SIGN: Self = Self(1 << 2);

    /// Record every staged change in a [`Changeset`] (see
    /// [`ZoneUpdate::diff`]).
    pub const DIFF: Self = Self(1 << 3);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for UpdateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// How a name of the main tree is affected by an update.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChangeKind {
    /// The name did not exist before the update and does after.
    Added,

    /// The name existed before the update and does not after.
    Removed,

    /// The name exists both before and after the update, and the update
    /// touched it (perhaps only indirectly).
    Modified,
}

/// The names touched by an update, in canonical order.
pub type SortedChanges = BTreeMap<Name, ChangeKind>;

////////////////////////////////////////////////////////////////////////
// ZONE UPDATES                                                       //
////////////////////////////////////////////////////////////////////////

/// The staged state of a node touched by an update.
struct StagedNode {
    owner: Name,
    tree: NodeTree,
    rrsets: RrsetList,
    removed: bool,
    node: OnceCell<Arc<Node>>,
}

impl StagedNode {
    fn touch(&mut self) {
        self.node.take();
    }
}

/// An update transaction on a [`Zone`].
///
/// Only one update may be open on a zone at a time; serializing updates
/// is up to the caller. If the zone's contents are nevertheless
/// replaced while an update is open, [`ZoneUpdate::commit`] fails with
/// [`Error::ConcurrentUpdate`].
///
/// Empty non-terminals are maintained automatically: adding a record
/// creates any missing ancestors of its owner, and removing the last
/// record of a node removes the node and any ancestors left empty
/// without children. The apex is never removed.
pub struct ZoneUpdate<'z> {
    zone: &'z Zone,
    snapshot: Arc<ZoneContents>,
    flags: UpdateFlags,
    arena: Slab<StagedNode>,
    index: BTreeMap<Name, usize>,
    nsec3_index: BTreeMap<Name, usize>,
    diff: Changeset,
    unsigned: Vec<OwnedRrset>,
}

impl<'z> ZoneUpdate<'z> {
    /// Begins an update of `zone`. Fails with [`Error::InvalidInput`]
    /// if both [`UpdateFlags::FULL`] and [`UpdateFlags::INCREMENTAL`]
    /// are given.
    pub fn begin(zone: &'z Zone, flags: UpdateFlags) -> Result<Self, Error> {
        if flags.contains(UpdateFlags::FULL) && flags.contains(UpdateFlags::INCREMENTAL) {
            return Err(Error::InvalidInput);
        }
        let snapshot = zone.snapshot();
        debug!(
            "Zone {}: beginning update of generation {}",
            zone.name(),
            snapshot.generation(),
        );
        Ok(Self {
            zone,
            snapshot,
            flags,
            arena: Slab::new(),
            index: BTreeMap::new(),
            nsec3_index: BTreeMap::new(),
            diff: Changeset::new(),
            unsigned: Vec::new(),
        })
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    /// Returns the zone contents that the update is based on.
    pub fn snapshot(&self) -> &Arc<ZoneContents> {
        &self.snapshot
    }

    /// Stages the addition of the records of `rrset`.
    pub fn add(&mut self, rrset: &OwnedRrset) -> Result<(), Error> {
        for rdata in rrset.rdatas() {
            let tree = tree_for(rrset.rr_type(), rdata);
            self.add_rr(tree, &rrset.owner, rrset.rr_type(), rrset.ttl(), rdata.clone())?;
        }
        Ok(())
    }

    /// Stages the removal of the records of `rrset`. Records that are
    /// not present are ignored. TTLs are not compared.
    pub fn remove(&mut self, rrset: &OwnedRrset) -> Result<(), Error> {
        for rdata in rrset.rdatas() {
            let tree = tree_for(rrset.rr_type(), rdata);
            self.remove_rr(tree, &rrset.owner, rrset.rr_type(), rdata)?;
        }
        Ok(())
    }

    /// Stages the addition of a single record. Returns whether the
    /// record was new.
    pub fn add_record(
        &mut self,
        owner: &Name,
        rr_type: Type,
        ttl: Ttl,
        rdata: &[u8],
    ) -> Result<bool, Error> {
        let rdata = Rdata::try_from(rdata)?;
        self.add_rr(tree_for(rr_type, &rdata), owner, rr_type, ttl, rdata)
    }

    /// Stages the removal of a single record. Returns whether the
    /// record was present.
    pub fn remove_record(&mut self, owner: &Name, rr_type: Type, rdata: &[u8]) -> Result<bool, Error> {
        let rdata = Rdata::try_from(rdata)?;
        self.remove_rr(tree_for(rr_type, &rdata), owner, rr_type, &rdata)
    }

    /// Stages a whole [`Changeset`]: the starting SOA and the removals
    /// first, then the additions and the final SOA. NSEC3 records and
    /// the RRSIGs covering them go to the NSEC3 tree.
    pub fn apply_changeset(&mut self, changeset: &Changeset) -> Result<(), Error> {
        if let Some(soa) = &changeset.soa_from {
            self.remove(soa)?;
        }
        for rrset in &changeset.remove {
            self.remove(rrset)?;
        }
        for rrset in &changeset.add {
            self.add(rrset)?;
        }
        if let Some(soa) = &changeset.soa_to {
            self.add(soa)?;
        }
        Ok(())
    }

    /// Returns an iterator over the names of the main tree touched by
    /// the update, in canonical order, with their nodes as they will be
    /// after the update (`None` if removed).
    pub fn iterate(&self) -> impl Iterator<Item = (&Name, Option<Arc<Node>>)> + '_ {
        self.index
            .iter()
            .map(move |(owner, &key)| (owner, self.staged_node(key)))
    }

    /// Like [`ZoneUpdate::iterate`], but for the NSEC3 tree.
    pub fn iterate_nsec3(&self) -> impl Iterator<Item = (&Name, Option<Arc<Node>>)> + '_ {
        self.nsec3_index
            .iter()
            .map(move |(owner, &key)| (owner, self.staged_node(key)))
    }

    /// Returns the names of the main tree touched by the update, with
    /// how they are affected. Names that neither existed before nor
    /// exist after the update are left out.
    pub fn sorted_changes(&self) -> SortedChanges {
        self.index
            .iter()
            .filter_map(|(owner, &key)| {
                let before = self.snapshot.get(NodeTree::Main, owner).is_some();
                let after = !self.arena[key].removed;
                let kind = match (before, after) {
                    (false, true) => ChangeKind::Added,
                    (true, false) => ChangeKind::Removed,
                    (true, true) => ChangeKind::Modified,
                    (false, false) => return None,
                };
                Some((owner.clone(), kind))
            })
            .collect()
    }

    /// Returns every change staged so far, if the update was begun with
    /// [`UpdateFlags::DIFF`]. The SOA record of the apex is not listed
    /// among the changes, but is reported through
    /// [`Changeset::soa_from`] and [`Changeset::soa_to`].
    pub fn diff(&self) -> Option<Changeset> {
        if !self.flags.contains(UpdateFlags::DIFF) {
            return None;
        }
        let mut diff = self.diff.clone();
        diff.soa_from = apex_soa(&*self.snapshot);
        diff.soa_to = apex_soa(self);
        Some(diff)
    }

    /// Returns the denial-of-existence records added by
    /// [`ZoneUpdate::fix_denial_chain`], which must be signed, if the
    /// update was begun with [`UpdateFlags::SIGN`].
    pub fn unsigned(&self) -> &[OwnedRrset] {
        &self.unsigned
    }

    /// Brings the denial-of-existence chain in line with the staged
    /// changes, stages the necessary changes, and returns them.
    ///
    /// The chain type is chosen from the apex as it will be after the
    /// update: NSEC3 if there is a usable NSEC3PARAM record, and NSEC
    /// otherwise. The chain is rebuilt from scratch if the update was
    /// begun with [`UpdateFlags::FULL`], or if the NSEC3 parameters
    /// change (including a switch between NSEC and NSEC3), in which
    /// case the records of the abandoned chain are withdrawn as well.
    /// Otherwise it is repaired around the touched names only.
    ///
    /// `ttl` defaults to the lesser of the SOA TTL and the SOA MINIMUM
    /// field. `opt_out` applies only to NSEC3.
    ///
    /// On failure, nothing is staged, but the update should be aborted.
    pub fn fix_denial_chain(&mut self, ttl: Option<Ttl>, opt_out: bool) -> Result<Changeset, Error> {
        let ttl = match ttl {
            Some(ttl) => ttl,
            None => self.denial_ttl()?,
        };
        let rebuild = self.flags.contains(UpdateFlags::FULL)
            || self.nsec3_param() != self.snapshot.nsec3_param();
        let changeset = if rebuild {
            dnssec::build_chain(&*self, ttl, opt_out)?
        } else {
            let changes = self.sorted_changes();
            let mut state = ChainFixState::new(ttl);
            dnssec::fix_chain(&*self, &changes, &mut state, opt_out)?;
            state.into_changeset()
        };
        self.apply_changeset(&changeset)?;
        if self.flags.contains(UpdateFlags::SIGN) {
            // Records added by an earlier call may have been withdrawn.
            changeset::cancel_records(&mut self.unsigned, &changeset.remove, false)?;
            self.unsigned.try_reserve(changeset.add.len())?;
            self.unsigned.extend(changeset.add.iter().cloned());
        }
        Ok(changeset)
    }

    /// Commits the update: new zone contents are built and swapped in,
    /// and the nodes they replace are retired. Returns the new
    /// contents.
    ///
    /// If the zone's contents changed since the update began, nothing
    /// is swapped and [`Error::ConcurrentUpdate`] is returned.
    pub fn commit(self) -> Result<Arc<ZoneContents>, Error> {
        let mut changes = Vec::new();
        for tree in [NodeTree::Main, NodeTree::Nsec3] {
            for (owner, &key) in self.staged_index(tree) {
                let staged = &self.arena[key];
                let original = self.snapshot.get(tree, owner);
                if staged.removed {
                    if original.is_some() {
                        changes.push((tree, owner.clone(), None));
                    }
                } else if original.map_or(true, |node| *node.rrsets() != staged.rrsets) {
                    changes.push((tree, owner.clone(), self.staged_node(key)));
                }
            }
        }

        if log_enabled!(Level::Debug) {
            let mut owners = String::new();
            for (_, owner, node) in &changes {
                let sign = if node.is_some() { '+' } else { '-' };
                owners.push_str(&format!(" {sign}{owner}"));
            }
            debug!("Zone {}: committing changes to:{}", self.zone.name(), owners);
        }

        let n_changes = changes.len();
        let (contents, retired) = self.snapshot.successor(changes);
        let contents = Arc::new(contents);
        self.zone.swap_contents(&self.snapshot, contents.clone())?;
        for node in &retired {
            node.retire();
        }
        info!(
            "Zone {}: committed generation {} ({} nodes changed)",
            self.zone.name(),
            contents.generation(),
            n_changes,
        );
        Ok(contents)
    }

    /// Discards all staged changes, but keeps the update open.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
        self.nsec3_index.clear();
        self.diff = Changeset::new();
        self.unsigned.clear();
    }

    /// Aborts the update, leaving the zone untouched. This is the same
    /// as dropping it.
    pub fn abort(self) {
        debug!(
            "Zone {}: update of generation {} aborted",
            self.zone.name(),
            self.snapshot.generation(),
        );
    }

    ////////////////////////////////////////////////////////////////////
    // STAGING                                                        //
    ////////////////////////////////////////////////////////////////////

    fn add_rr(
        &mut self,
        tree: NodeTree,
        owner: &Name,
        rr_type: Type,
        ttl: Ttl,
        rdata: Rdata,
    ) -> Result<bool, Error> {
        self.check_owner(tree, owner)?;
        let had_ns = self
            .affects_delegation(tree, owner, rr_type)
            .then(|| self.holds(owner, Type::NS));
        let key = self.stage(tree, owner);
        let staged = &mut self.arena[key];
        if !staged.rrsets.add(rr_type, ttl, rdata.clone())? {
            return Ok(false);
        }
        staged.removed = false;
        staged.touch();
        trace!("Staged addition: {} {} {} {}", owner, ttl, rr_type, rdata);

        if tree == NodeTree::Main {
            self.add_ancestors(owner);
            if had_ns == Some(false) {
                self.touch_descendants(owner);
            }
        }
        if self.flags.contains(UpdateFlags::DIFF) && !self.is_apex_soa(owner, rr_type) {
            self.diff.add_record(owner, rr_type, ttl, rdata)?;
        }
        Ok(true)
    }

    fn remove_rr(
        &mut self,
        tree: NodeTree,
        owner: &Name,
        rr_type: Type,
        rdata: &Rdata,
    ) -> Result<bool, Error> {
        self.check_owner(tree, owner)?;
        if self.get(tree, owner).is_none() {
            return Ok(false);
        }
        let had_ns = self
            .affects_delegation(tree, owner, rr_type)
            .then(|| self.holds(owner, Type::NS));
        let key = self.stage(tree, owner);
        let staged = &mut self.arena[key];
        let ttl = match staged.rrsets.lookup(rr_type) {
            Some(rrset) => rrset.ttl,
            None => return Ok(false),
        };
        if !staged.rrsets.remove(rr_type, rdata) {
            return Ok(false);
        }
        staged.touch();
        trace!("Staged removal: {} {} {} {}", owner, ttl, rr_type, rdata);

        if had_ns == Some(true) && !self.holds(owner, Type::NS) {
            self.touch_descendants(owner);
        }
        self.prune(tree, owner);
        if self.flags.contains(UpdateFlags::DIFF) && !self.is_apex_soa(owner, rr_type) {
            self.diff.remove_record(owner, rr_type, ttl, rdata.clone())?;
        }
        Ok(true)
    }

    fn check_owner(&self, tree: NodeTree, owner: &Name) -> Result<(), Error> {
        let apex = self.snapshot.apex();
        let inside = match tree {
            NodeTree::Main => owner.eq_or_subdomain_of(apex),
            NodeTree::Nsec3 => owner.is_subdomain_of(apex),
        };
        if inside {
            Ok(())
        } else {
            Err(Error::NotInZone)
        }
    }

    /// Returns the key of the staged node for `owner`, staging it first
    /// if necessary. A name that does not exist yet is staged as
    /// removed.
    fn stage(&mut self, tree: NodeTree, owner: &Name) -> usize {
        if let Some(&key) = self.staged_index(tree).get(owner) {
            return key;
        }
        let (rrsets, removed) = match self.snapshot.get(tree, owner) {
            Some(node) => (node.rrsets().clone(), false),
            None => (RrsetList::new(), true),
        };
        let key = self.arena.insert(StagedNode {
            owner: owner.clone(),
            tree,
            rrsets,
            removed,
            node: OnceCell::new(),
        });
        let index = match tree {
            NodeTree::Main => &mut self.index,
            NodeTree::Nsec3 => &mut self.nsec3_index,
        };
        index.insert(owner.clone(), key);
        key
    }

    /// Creates empty non-terminals for the missing ancestors of
    /// `owner`.
    fn add_ancestors(&mut self, owner: &Name) {
        let mut next = owner.parent();
        while let Some(ancestor) = next {
            if !ancestor.eq_or_subdomain_of(self.snapshot.apex()) || self.node(&ancestor).is_some() {
                break;
            }
            let key = self.stage(NodeTree::Main, &ancestor);
            let staged = &mut self.arena[key];
            staged.removed = false;
            staged.touch();
            next = ancestor.parent();
        }
    }

    /// Removes `owner` if it is left empty without children, and then
    /// its ancestors likewise.
    fn prune(&mut self, tree: NodeTree, owner: &Name) {
        let mut next = Some(owner.clone());
        while let Some(name) = next {
            if name == *self.snapshot.apex() {
                break;
            }
            match self.get(tree, &name) {
                Some(node) if node.is_empty() => (),
                _ => break,
            }
            if tree == NodeTree::Main && self.has_children(&name) {
                break;
            }
            let key = self.stage(tree, &name);
            let staged = &mut self.arena[key];
            staged.removed = true;
            staged.touch();
            trace!("Pruned empty node {}", name);
            next = match tree {
                NodeTree::Main => name.parent(),
                NodeTree::Nsec3 => None,
            };
        }
    }

    /// Stages every descendant of `owner`. This is done when a
    /// delegation appears or disappears at `owner`, since the data
    /// below it changes between authoritative and glue.
    fn touch_descendants(&mut self, owner: &Name) {
        let descendants: Vec<Name> = self
            .after(NodeTree::Main, owner)
            .map(|node| node.owner().clone())
            .take_while(|name| name.is_subdomain_of(owner))
            .collect();
        for name in &descendants {
            self.stage(NodeTree::Main, name);
        }
    }

    fn affects_delegation(&self, tree: NodeTree, owner: &Name, rr_type: Type) -> bool {
        tree == NodeTree::Main && rr_type == Type::NS && owner != self.snapshot.apex()
    }

    fn holds(&self, owner: &Name, rr_type: Type) -> bool {
        self.node(owner)
            .map_or(false, |node| node.rrsets().contains(rr_type))
    }

    fn is_apex_soa(&self, owner: &Name, rr_type: Type) -> bool {
        rr_type == Type::SOA && owner == self.snapshot.apex()
    }

    ////////////////////////////////////////////////////////////////////
    // MERGED VIEW                                                    //
    ////////////////////////////////////////////////////////////////////

    fn staged_index(&self, tree: NodeTree) -> &BTreeMap<Name, usize> {
        match tree {
            NodeTree::Main => &self.index,
            NodeTree::Nsec3 => &self.nsec3_index,
        }
    }

    fn staged_node(&self, key: usize) -> Option<Arc<Node>> {
        let staged = &self.arena[key];
        if staged.removed {
            return None;
        }
        let node = staged.node.get_or_init(|| {
            Arc::new(Node::new(
                staged.owner.clone(),
                staged.rrsets.clone(),
                staged.tree,
            ))
        });
        Some(node.clone())
    }

    /// Merges an iterator over original nodes with one over staged
    /// entries, both in the same order. Staged entries take precedence,
    /// and removed ones are skipped.
    fn merged<'a, I>(&'a self, original: NodeIter<'a>, staged: I, reverse: bool) -> NodeIter<'a>
    where
        I: Iterator<Item = (&'a Name, &'a usize)> + 'a,
    {
        let merged = MergeSorted::new(
            original,
            staged,
            move |node: &Arc<Node>, entry: &(&Name, &usize)| {
                let ordering = node.owner().cmp(entry.0);
                if reverse {
                    ordering.reverse()
                } else {
                    ordering
                }
            },
        );
        Box::new(merged.filter_map(move |item| match item {
            Merged::Left(node) => Some(node),
            Merged::Right((_, &key)) | Merged::Both(_, (_, &key)) => self.staged_node(key),
        }))
    }
}

impl ZoneRead for ZoneUpdate<'_> {
    fn apex(&self) -> &Name {
        self.snapshot.apex()
    }

    fn get(&self, tree: NodeTree, name: &Name) -> Option<Arc<Node>> {
        match self.staged_index(tree).get(name) {
            Some(&key) => self.staged_node(key),
            None => self.snapshot.get(tree, name),
        }
    }

    fn iter(&self, tree: NodeTree) -> NodeIter<'_> {
        self.merged(self.snapshot.iter(tree), self.staged_index(tree).iter(), false)
    }

    fn iter_rev(&self, tree: NodeTree) -> NodeIter<'_> {
        self.merged(
            self.snapshot.iter_rev(tree),
            self.staged_index(tree).iter().rev(),
            true,
        )
    }

    fn after(&self, tree: NodeTree, name: &Name) -> NodeIter<'_> {
        let staged = self
            .staged_index(tree)
            .range::<Name, _>((Excluded(name), Unbounded));
        self.merged(self.snapshot.after(tree, name), staged, false)
    }

    fn before(&self, tree: NodeTree, name: &Name) -> NodeIter<'_> {
        let staged = self
            .staged_index(tree)
            .range::<Name, _>((Unbounded, Excluded(name)))
            .rev();
        self.merged(self.snapshot.before(tree, name), staged, true)
    }
}

/// Returns the tree that a record belongs in.
fn tree_for(rr_type: Type, rdata: &Rdata) -> NodeTree {
    if rr_type == Type::NSEC3
        || (rr_type == Type::RRSIG && rrsig_type_covered(rdata) == Some(Type::NSEC3))
    {
        NodeTree::Nsec3
    } else {
        NodeTree::Main
    }
}

fn apex_soa<Z: ZoneRead + ?Sized>(zone: &Z) -> Option<OwnedRrset> {
    let rrset = zone.apex_node()?.lookup(Type::SOA)?.clone();
    Some(OwnedRrset {
        owner: zone.apex().clone(),
        rrset,
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
pub(crate) mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::rr::{Nsec3Param, NSEC3_HASH_SHA1};

    lazy_static! {
        /// The NSEC3 parameters of RFC 5155 Appendix A.
        pub static ref TEST_NSEC3_PARAM: Nsec3Param = Nsec3Param {
            algorithm: NSEC3_HASH_SHA1,
            flags: 0,
            iterations: 12,
            salt: vec![0xaa, 0xbb, 0xcc, 0xdd],
        };
    }

    pub fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    /// Builds SOA RDATA for `apex` with a MINIMUM of 300.
    pub fn soa_rdata(apex: &Name, serial: u32) -> Vec<u8> {
        let mut octets = apex.prepend_label(b"ns").unwrap().wire_repr().to_vec();
        octets.extend_from_slice(apex.prepend_label(b"hostmaster").unwrap().wire_repr());
        for field in [serial, 7200, 3600, 1_209_600, 300] {
            octets.extend_from_slice(&field.to_be_bytes());
        }
        octets
    }

    /// Stages the apex records of a test zone: SOA (TTL 3600), NS, and,
    /// if `nsec3` is set, an NSEC3PARAM record.
    pub fn add_apex_records(update: &mut ZoneUpdate, nsec3: bool) {
        let apex = update.apex().clone();
        let ns = apex.prepend_label(b"ns").unwrap();
        update
            .add_record(&apex, Type::SOA, 3600.into(), &soa_rdata(&apex, 1))
            .unwrap();
        update
            .add_record(&apex, Type::NS, 3600.into(), ns.wire_repr())
            .unwrap();
        if nsec3 {
            let rdata = TEST_NSEC3_PARAM.to_rdata().unwrap();
            update
                .add_record(&apex, Type::NSEC3PARAM, 0.into(), rdata.octets())
                .unwrap();
        }
    }

    /// Creates a zone with an A record at each of `names` and a
    /// complete NSEC chain (or NSEC3 chain, if `nsec3` is set).
    pub fn zone_with(apex: &str, names: &[&str], nsec3: bool) -> Zone {
        let zone = Zone::new(name(apex));
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::FULL).unwrap();
        add_apex_records(&mut update, nsec3);
        for owner in names {
            update
                .add_record(&name(owner), Type::A, 3600.into(), &[192, 0, 2, 1])
                .unwrap();
        }
        update.fix_denial_chain(None, false).unwrap();
        update.commit().unwrap();
        zone
    }

    fn owners<'a>(nodes: impl Iterator<Item = Arc<Node>> + 'a) -> Vec<Name> {
        nodes.map(|node| node.owner().clone()).collect()
    }

    #[test]
    fn merged_view_overrides_snapshot() {
        let zone = zone_with("example.", &["a.example.", "c.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        update
            .remove_record(&name("c.example."), Type::A, &[192, 0, 2, 1])
            .unwrap();

        // c.example. still holds its NSEC record, so it is not removed.
        let c = update.node(&name("c.example.")).unwrap();
        assert!(!c.rrsets().contains(Type::A));
        assert!(c.rrsets().contains(Type::NSEC));
        assert_eq!(
            owners(update.iter(NodeTree::Main)),
            [name("example."), name("a.example."), name("b.example."), name("c.example.")]
        );
        assert_eq!(
            owners(update.iter_rev(NodeTree::Main)),
            [name("c.example."), name("b.example."), name("a.example."), name("example.")]
        );
        assert_eq!(
            owners(update.before(NodeTree::Main, &name("c.example."))),
            [name("b.example."), name("a.example."), name("example.")]
        );
        assert_eq!(
            owners(update.after(NodeTree::Main, &name("a.example."))),
            [name("b.example."), name("c.example.")]
        );

        // The zone itself is untouched.
        let contents = zone.snapshot();
        assert!(contents.node(&name("b.example.")).is_none());
        assert!(contents
            .node(&name("c.example."))
            .unwrap()
            .rrsets()
            .contains(Type::A));
    }

    #[test]
    fn staged_nodes_are_rebuilt_after_changes() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let owner = name("a.example.");
        update.add_record(&owner, Type::TXT, 3600.into(), b"\x02hi").unwrap();
        let first = update.node(&owner).unwrap();
        assert!(Arc::ptr_eq(&first, &update.node(&owner).unwrap()));
        update.add_record(&owner, Type::AAAA, 3600.into(), &[0; 16]).unwrap();
        let second = update.node(&owner).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.types().contains(Type::AAAA));
        assert!(second.types().contains(Type::TXT));
    }

    #[test]
    fn empty_non_terminals_are_created_and_pruned() {
        let zone = zone_with("example.", &[], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let deep = name("x.y.z.example.");
        update.add_record(&deep, Type::A, 3600.into(), &[192, 0, 2, 1]).unwrap();
        for ent in ["y.z.example.", "z.example."] {
            let node = update.node(&name(ent)).unwrap();
            assert!(node.is_empty());
        }
        let changes = update.sorted_changes();
        assert_eq!(changes.len(), 3);
        assert!(changes.values().all(|&kind| kind == ChangeKind::Added));

        update.remove_record(&deep, Type::A, &[192, 0, 2, 1]).unwrap();
        for gone in ["x.y.z.example.", "y.z.example.", "z.example."] {
            assert!(update.node(&name(gone)).is_none());
        }
        assert!(update.sorted_changes().is_empty());
        assert_eq!(update.iterate().count(), 3);
        assert!(update.iterate().all(|(_, node)| node.is_none()));
    }

    #[test]
    fn apex_is_never_pruned() {
        let zone = zone_with("example.", &[], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let apex = name("example.");
        let node = update.apex_node().unwrap();
        for rrset in node.rrsets().iter() {
            for rdata in &rrset.rdatas {
                update.remove_record(&apex, rrset.rr_type, rdata.octets()).unwrap();
            }
        }
        let apex_node = update.apex_node().unwrap();
        assert!(apex_node.is_empty());
    }

    #[test]
    fn delegation_change_touches_descendants() {
        let zone = zone_with(
            "example.",
            &["a.example.", "ns.sub.example.", "www.x.sub.example.", "z.example."],
            false,
        );
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let sub = name("sub.example.");
        update
            .add_record(&sub, Type::NS, 3600.into(), name("ns.sub.example.").wire_repr())
            .unwrap();
        let changes: Vec<Name> = update.sorted_changes().into_keys().collect();
        assert_eq!(
            changes,
            [
                name("sub.example."),
                name("ns.sub.example."),
                name("x.sub.example."),
                name("www.x.sub.example."),
            ]
        );
        assert_eq!(
            update.sorted_changes()[&name("sub.example.")],
            ChangeKind::Modified
        );
    }

    #[test]
    fn records_outside_the_zone_are_rejected() {
        let zone = zone_with("example.", &[], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        assert_eq!(
            update.add_record(&name("example.org."), Type::A, 3600.into(), &[192, 0, 2, 1]),
            Err(Error::NotInZone)
        );
        assert_eq!(
            update.add_record(&name("example."), Type::SOA, 60.into(), &soa_rdata(&name("example."), 2)),
            Err(Error::TtlMismatch)
        );
    }

    #[test]
    fn nsec3_records_go_to_the_nsec3_tree() {
        let zone = zone_with("example.", &["a.example."], true);
        let contents = zone.snapshot();
        let hashed = TEST_NSEC3_PARAM
            .owner_for(&name("a.example."), &name("example."))
            .unwrap();
        assert!(contents.node(&hashed).is_none());
        let node = contents.nsec3_node(&hashed).unwrap();
        assert!(node.lookup(Type::NSEC3).is_some());
        assert!(contents
            .iter(NodeTree::Main)
            .all(|node| !node.rrsets().contains(Type::NSEC3)));
    }

    #[test]
    fn diff_records_changes() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL | UpdateFlags::DIFF).unwrap();
        let apex = name("example.");
        update
            .remove_record(&apex, Type::SOA, &soa_rdata(&apex, 1))
            .unwrap();
        update
            .add_record(&apex, Type::SOA, 3600.into(), &soa_rdata(&apex, 2))
            .unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        let diff = update.diff().unwrap();
        assert_eq!(diff.soa_from.as_ref().unwrap().rrset.rdatas[0].octets(), &soa_rdata(&apex, 1)[..]);
        assert_eq!(diff.soa_to.as_ref().unwrap().rrset.rdatas[0].octets(), &soa_rdata(&apex, 2)[..]);
        assert_eq!(diff.removed().count(), 0);
        assert_eq!(diff.added().count(), 1);

        let plain = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        assert!(plain.diff().is_none());
    }

    #[test]
    fn sign_flag_tracks_new_denial_records() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::SIGN).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(update.unsigned(), &changeset.add[..]);
        assert!(update
            .unsigned()
            .iter()
            .all(|rrset| rrset.rr_type() == Type::NSEC));
    }

    #[test]
    fn withdrawn_denial_records_leave_the_unsigned_list() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::SIGN).unwrap();
        let z = name("z.example.");
        update.add_record(&z, Type::A, 3600.into(), &[192, 0, 2, 26]).unwrap();
        update.fix_denial_chain(None, false).unwrap();
        assert!(update.unsigned().iter().any(|rrset| rrset.owner == z));

        update.remove_record(&z, Type::A, &[192, 0, 2, 26]).unwrap();
        update.fix_denial_chain(None, false).unwrap();

        // Every listed record must still be present in the update.
        for rrset in update.unsigned() {
            let node = update.node(&rrset.owner).unwrap();
            let present = node.lookup(rrset.rr_type()).unwrap();
            assert!(rrset.rdatas().all(|rdata| present.rdatas.contains(rdata)));
        }
        assert!(update.unsigned().iter().all(|rrset| rrset.owner != z));
    }

    #[test]
    fn merged_changeset_applies_in_order() {
        let zone = zone_with("example.", &["a.example."], false);
        let b = name("b.example.");
        let mut first = Changeset::new();
        first
            .add_record(&b, Type::A, 3600.into(), Rdata::try_from(&[192, 0, 2, 2][..]).unwrap())
            .unwrap();
        let mut second = Changeset::new();
        second
            .remove_record(&b, Type::A, 3600.into(), Rdata::try_from(&[192, 0, 2, 2][..]).unwrap())
            .unwrap();
        first.merge(second).unwrap();

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update.apply_changeset(&first).unwrap();
        assert!(update.node(&b).is_none());
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let zone = zone_with("example.", &[], false);
        assert!(matches!(
            ZoneUpdate::begin(&zone, UpdateFlags::FULL | UpdateFlags::INCREMENTAL),
            Err(Error::InvalidInput)
        ));
    }

    #[test]
    fn abort_leaves_zone_untouched() {
        let zone = zone_with("example.", &["a.example."], false);
        let before = zone.snapshot();

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        update.abort();
        assert!(Arc::ptr_eq(&zone.snapshot(), &before));

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .remove_record(&name("a.example."), Type::A, &[192, 0, 2, 1])
            .unwrap();
        drop(update);
        let after = zone.snapshot();
        assert!(Arc::ptr_eq(&after, &before));
        assert_eq!(after.generation(), before.generation());
        assert!(after.node(&name("a.example.")).is_some());
    }

    #[test]
    fn clear_discards_staged_changes() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        update.clear();
        assert!(update.node(&name("b.example.")).is_none());
        assert_eq!(update.iterate().count(), 0);
        let contents = update.commit().unwrap();
        assert_eq!(contents.len(NodeTree::Main), 2);
    }

    #[test]
    fn racing_commit_is_rejected() {
        let zone = zone_with("example.", &["a.example."], false);
        let mut first = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let mut second = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        first
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        first.fix_denial_chain(None, false).unwrap();
        let committed = first.commit().unwrap();
        second
            .add_record(&name("c.example."), Type::A, 3600.into(), &[192, 0, 2, 3])
            .unwrap();
        second.fix_denial_chain(None, false).unwrap();
        assert_eq!(second.commit().unwrap_err(), Error::ConcurrentUpdate);

        let contents = zone.snapshot();
        assert!(Arc::ptr_eq(&contents, &committed));
        assert!(contents.node(&name("b.example.")).is_some());
        assert!(contents.node(&name("c.example.")).is_none());
    }

    #[test]
    fn commit_retires_replaced_nodes() {
        use crate::zone::RefKind;

        let zone = zone_with("example.", &["a.example.", "c.example."], false);
        let before = zone.snapshot();
        let a = before.node(&name("a.example.")).unwrap();
        let c = before.node(&name("c.example.")).unwrap();
        a.resolve(RefKind::Previous, &before);
        c.resolve(RefKind::Previous, &before);

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        let after = update.commit().unwrap();
        assert_eq!(after.generation(), before.generation() + 1);

        // a.example.'s NSEC record changed, so its node was replaced.
        assert!(!a.reference(RefKind::Previous).unwrap().is_valid());
        // c.example. is shared between the generations.
        assert!(Arc::ptr_eq(&c, &after.node(&name("c.example.")).unwrap()));
        assert!(c.reference(RefKind::Previous).unwrap().is_valid());
    }
}
