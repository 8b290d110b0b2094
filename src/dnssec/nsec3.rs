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

//! NSEC3 chains ([RFC 5155]).
//!
//! The chain links the hashed owner names of the zone's authoritative
//! names, including empty non-terminals, in canonical order of the
//! hashes. The records live in the zone's NSEC3 tree. With Opt-Out,
//! insecure delegations (delegations without a DS RRset) are left out
//! of the chain and every record carries the Opt-Out flag.
//!
//! [RFC 5155]: https://datatracker.ietf.org/doc/html/rfc5155

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};

use log::{debug, warn};

use super::chain::{self, signature_rrset, ChainFixState, DenialChain, Keys};
use crate::name::Name;
use crate::rr::nsec3::{hash_of_owner, hashed_owner};
use crate::rr::{Nsec3, Nsec3Param, Rdata, Rrset, Ttl, Type, TypeBitmap, NSEC3_FLAG_OPT_OUT};
use crate::update::{Changeset, SortedChanges};
use crate::util::{MergeSorted, Merged};
use crate::zone::{Error, NodeIter, NodeTree, ZoneRead};

/// The NSEC3 chain of a zone, for a given set of parameters.
///
/// Hashing is expensive, so the chain hashes only the names it is told
/// about: every name of the zone ([`Nsec3Chain::for_zone`]) or just
/// the changed ones ([`Nsec3Chain::for_changes`]). In the latter case,
/// a hashed owner that was not evaluated is taken to be a member if,
/// and only if, it already holds an NSEC3 record.
pub struct Nsec3Chain<'a, Z: ?Sized> {
    zone: &'a Z,
    params: &'a Nsec3Param,
    opt_out: bool,

    /// Maps the hashed owners of evaluated member names to the names.
    members: BTreeMap<Name, Name>,

    /// The hashed owners of all evaluated names.
    evaluated: BTreeSet<Name>,

    /// Whether every name of the zone was evaluated.
    complete: bool,
}

impl<'a, Z: ZoneRead + ?Sized> Nsec3Chain<'a, Z> {
    /// Evaluates every name of the zone.
    pub fn for_zone(zone: &'a Z, params: &'a Nsec3Param, opt_out: bool) -> Result<Self, Error> {
        let mut chain = Self::empty(zone, params, opt_out);
        for node in zone.iter(NodeTree::Main) {
            chain.evaluate(node.owner())?;
        }
        chain.complete = true;
        Ok(chain)
    }

    /// Evaluates only the names in `changes`.
    pub fn for_changes(
        zone: &'a Z,
        params: &'a Nsec3Param,
        opt_out: bool,
        changes: &SortedChanges,
    ) -> Result<Self, Error> {
        let mut chain = Self::empty(zone, params, opt_out);
        for name in changes.keys() {
            chain.evaluate(name)?;
        }
        Ok(chain)
    }

    fn empty(zone: &'a Z, params: &'a Nsec3Param, opt_out: bool) -> Self {
        Self {
            zone,
            params,
            opt_out,
            members: BTreeMap::new(),
            evaluated: BTreeSet::new(),
            complete: false,
        }
    }

    /// Returns the hashed owners of the evaluated names, in canonical
    /// order.
    pub fn evaluated(&self) -> impl Iterator<Item = &Name> + '_ {
        self.evaluated.iter()
    }

    fn evaluate(&mut self, name: &Name) -> Result<(), Error> {
        let owner = self.params.owner_for(name, self.zone.apex())?;
        if self.covered_types(name).is_some() {
            if let Some(other) = self.members.insert(owner.clone(), name.clone()) {
                if other != *name {
                    warn!(
                        "Zone {}: NSEC3 hash collision between {} and {}",
                        self.zone.apex(),
                        other,
                        name,
                    );
                    return Err(Error::InconsistentChain);
                }
            }
        }
        self.evaluated.insert(owner);
        Ok(())
    }

    /// Returns the types for the bitmap of the NSEC3 record of `name`,
    /// or `None` if `name` gets no NSEC3 record.
    fn covered_types(&self, name: &Name) -> Option<TypeBitmap> {
        let node = self.zone.node(name)?;
        if !self.zone.is_authoritative(name) {
            return None;
        }
        if node.types().is_empty() {
            return self.zone.has_children(name).then(TypeBitmap::new);
        }
        let insecure =
            node.is_delegation(self.zone.apex()) && !node.rrsets().contains(Type::DS);
        if insecure {
            if self.opt_out {
                None
            } else {
                Some(node.types().clone())
            }
        } else {
            Some(node.types().with(&[Type::RRSIG]))
        }
    }

    fn flags(&self) -> u8 {
        if self.opt_out {
            NSEC3_FLAG_OPT_OUT
        } else {
            0
        }
    }
}

/// Merges the owners of NSEC3 nodes with the hashed owners of
/// evaluated members, both sorted in the same direction.
fn merge_keys<'b, M>(tree: NodeIter<'b>, members: M, reverse: bool) -> Keys<'b>
where
    M: Iterator<Item = &'b Name> + 'b,
{
    let merged = MergeSorted::new(
        tree.map(|node| node.owner().clone()),
        members,
        move |a: &Name, b: &&Name| {
            let ordering = a.cmp(*b);
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        },
    );
    Box::new(merged.map(|item| match item {
        Merged::Left(owner) | Merged::Both(owner, _) => owner,
        Merged::Right(owner) => owner.clone(),
    }))
}

impl<'a, Z: ZoneRead + ?Sized> DenialChain for Nsec3Chain<'a, Z> {
    fn rr_type(&self) -> Type {
        Type::NSEC3
    }

    fn is_member(&self, key: &Name) -> Result<bool, Error> {
        if self.members.contains_key(key) {
            Ok(true)
        } else if self.complete || self.evaluated.contains(key) {
            Ok(false)
        } else {
            Ok(self.current(key).is_some())
        }
    }

    fn current(&self, key: &Name) -> Option<Rrset> {
        self.zone.nsec3_node(key)?.lookup(Type::NSEC3).cloned()
    }

    fn signatures(&self, key: &Name) -> Option<Rrset> {
        signature_rrset(&*self.zone.nsec3_node(key)?, Type::NSEC3)
    }

    fn current_next(&self, key: &Name) -> Option<Name> {
        let rrset = self.current(key)?;
        let nsec3 = Nsec3::from_rdata(rrset.rdatas.first()?).ok()?;
        hashed_owner(&nsec3.next_hashed, self.zone.apex()).ok()
    }

    fn desired(&self, key: &Name, next: &Name) -> Result<Rdata, Error> {
        let types = match self.members.get(key) {
            Some(name) => self.covered_types(name).ok_or(Error::InconsistentChain)?,
            None => {
                // An unchanged member keeps its bitmap.
                let rrset = self.current(key).ok_or(Error::InconsistentChain)?;
                let rdata = rrset.rdatas.first().ok_or(Error::InconsistentChain)?;
                Nsec3::from_rdata(rdata)?.types
            }
        };
        let nsec3 = Nsec3 {
            algorithm: self.params.algorithm,
            flags: self.flags(),
            iterations: self.params.iterations,
            salt: self.params.salt.clone(),
            next_hashed: hash_of_owner(next).ok_or(Error::InconsistentChain)?,
            types,
        };
        Ok(nsec3.to_rdata()?)
    }

    fn candidates(&self) -> Keys<'_> {
        merge_keys(self.zone.iter(NodeTree::Nsec3), self.members.keys(), false)
    }

    fn candidates_rev(&self) -> Keys<'_> {
        merge_keys(
            self.zone.iter_rev(NodeTree::Nsec3),
            self.members.keys().rev(),
            true,
        )
    }

    fn candidates_after(&self, key: &Name) -> Keys<'_> {
        merge_keys(
            self.zone.after(NodeTree::Nsec3, key),
            self.members
                .range::<Name, _>((Excluded(key), Unbounded))
                .map(|(owner, _)| owner),
            false,
        )
    }

    fn candidates_before(&self, key: &Name) -> Keys<'_> {
        merge_keys(
            self.zone.before(NodeTree::Nsec3, key),
            self.members
                .range::<Name, _>((Unbounded, Excluded(key)))
                .rev()
                .map(|(owner, _)| owner),
            true,
        )
    }
}

/// Builds the NSEC3 chain of `zone` for `params` from scratch. NSEC3
/// records that are already correct are left alone. Stale NSEC3
/// records, as well as any NSEC records, are withdrawn along with their
/// signatures.
pub fn build_nsec3_chain<Z: ZoneRead + ?Sized>(
    zone: &Z,
    params: &Nsec3Param,
    ttl: Ttl,
    opt_out: bool,
) -> Result<Changeset, Error> {
    debug!(
        "Zone {}: building NSEC3 chain ({}, opt-out {})",
        zone.apex(),
        params,
        opt_out,
    );
    let mut state = ChainFixState::new(ttl);
    for node in zone.iter(NodeTree::Main) {
        chain::withdraw_node_records(&mut state.changeset, &node, Type::NSEC)?;
    }
    let nsec3_chain = Nsec3Chain::for_zone(zone, params, opt_out)?;
    chain::build(&nsec3_chain, &mut state)?;
    debug!(
        "Zone {}: NSEC3 chain built ({} records removed, {} added)",
        zone.apex(),
        state.changeset.removed().count(),
        state.changeset.added().count(),
    );
    Ok(state.into_changeset())
}

/// Repairs the NSEC3 chain of `zone` around the `changes`. Only the
/// changed names are hashed.
pub fn fix_nsec3_chain<Z: ZoneRead + ?Sized>(
    zone: &Z,
    params: &Nsec3Param,
    changes: &SortedChanges,
    state: &mut ChainFixState,
    opt_out: bool,
) -> Result<(), Error> {
    debug!(
        "Zone {}: fixing NSEC3 chain around {} changed names",
        zone.apex(),
        changes.len(),
    );
    let nsec3_chain = Nsec3Chain::for_changes(zone, params, opt_out, changes)?;
    let keys: Vec<Name> = nsec3_chain.evaluated().cloned().collect();
    chain::fix(&nsec3_chain, keys, state)?;
    debug!(
        "Zone {}: NSEC3 chain fixed ({} records removed, {} added)",
        zone.apex(),
        state.changeset.removed().count(),
        state.changeset.added().count(),
    );
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
