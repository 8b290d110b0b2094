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

//! NSEC chains ([RFC 4034 § 4]).
//!
//! Every authoritative name owning records of some type other than
//! NSEC and RRSIG gets an NSEC record, linking it to the next such
//! name in canonical order. Empty non-terminals and glue get none.
//!
//! [RFC 4034 § 4]: https://datatracker.ietf.org/doc/html/rfc4034#section-4

use std::iter;

use log::debug;

use super::chain::{self, signature_rrset, ChainFixState, DenialChain, Keys};
use crate::name::Name;
use crate::rr::{Nsec, Rdata, Rrset, Ttl, Type};
use crate::update::{Changeset, SortedChanges};
use crate::zone::{Error, NodeTree, ZoneRead};

/// The NSEC chain of a zone.
pub struct NsecChain<'a, Z: ?Sized> {
    zone: &'a Z,
}

impl<'a, Z: ZoneRead + ?Sized> NsecChain<'a, Z> {
    pub fn new(zone: &'a Z) -> Self {
        Self { zone }
    }
}

impl<Z: ZoneRead + ?Sized> DenialChain for NsecChain<'_, Z> {
    fn rr_type(&self) -> Type {
        Type::NSEC
    }

    fn is_member(&self, key: &Name) -> Result<bool, Error> {
        Ok(self.zone.node(key).map_or(false, |node| {
            !node.types().is_empty() && self.zone.is_authoritative(key)
        }))
    }

    fn current(&self, key: &Name) -> Option<Rrset> {
        self.zone.node(key)?.lookup(Type::NSEC).cloned()
    }

    fn signatures(&self, key: &Name) -> Option<Rrset> {
        signature_rrset(&*self.zone.node(key)?, Type::NSEC)
    }

    fn current_next(&self, key: &Name) -> Option<Name> {
        let rrset = self.current(key)?;
        Nsec::from_rdata(rrset.rdatas.first()?).ok().map(|nsec| nsec.next)
    }

    fn desired(&self, key: &Name, next: &Name) -> Result<Rdata, Error> {
        let node = self.zone.node(key).ok_or(Error::InconsistentChain)?;
        let nsec = Nsec {
            next: next.clone(),
            types: node.types().with(&[Type::NSEC, Type::RRSIG]),
        };
        Ok(nsec.to_rdata()?)
    }

    fn candidates(&self) -> Keys<'_> {
        Box::new(self.zone.iter(NodeTree::Main).map(|node| node.owner().clone()))
    }

    fn candidates_rev(&self) -> Keys<'_> {
        Box::new(self.zone.iter_rev(NodeTree::Main).map(|node| node.owner().clone()))
    }

    fn candidates_after(&self, key: &Name) -> Keys<'_> {
        Box::new(
            self.zone
                .after(NodeTree::Main, key)
                .map(|node| node.owner().clone()),
        )
    }

    fn candidates_before(&self, key: &Name) -> Keys<'_> {
        // Existing nodes are walked through their previous-node
        // references, which wrap around; stop at the wrap.
        match self.zone.node(key) {
            Some(node) => {
                let key = key.clone();
                Box::new(
                    iter::successors(self.zone.previous(&node), move |node| {
                        self.zone.previous(node)
                    })
                    .map(|node| node.owner().clone())
                    .take_while(move |owner| *owner < key),
                )
            }
            None => Box::new(
                self.zone
                    .before(NodeTree::Main, key)
                    .map(|node| node.owner().clone()),
            ),
        }
    }
}

/// Builds the NSEC chain of `zone` from scratch. Records that are
/// already correct are left alone. Stale NSEC records, as well as any
/// NSEC3 records, are withdrawn along with their signatures.
pub fn build_nsec_chain<Z: ZoneRead + ?Sized>(zone: &Z, ttl: Ttl) -> Result<Changeset, Error> {
    debug!("Zone {}: building NSEC chain", zone.apex());
    let mut state = ChainFixState::new(ttl);
    for node in zone.iter(NodeTree::Nsec3) {
        chain::withdraw_node_records(&mut state.changeset, &node, Type::NSEC3)?;
    }
    chain::build(&NsecChain::new(zone), &mut state)?;
    debug!(
        "Zone {}: NSEC chain built ({} records removed, {} added)",
        zone.apex(),
        state.changeset.removed().count(),
        state.changeset.added().count(),
    );
    Ok(state.into_changeset())
}

/// Repairs the NSEC chain of `zone` around the `changes`.
pub fn fix_nsec_chain<Z: ZoneRead + ?Sized>(
    zone: &Z,
    changes: &SortedChanges,
    state: &mut ChainFixState,
) -> Result<(), Error> {
    debug!(
        "Zone {}: fixing NSEC chain around {} changed names",
        zone.apex(),
        changes.len(),
    );
    chain::fix(&NsecChain::new(zone), changes.keys().cloned(), state)?;
    debug!(
        "Zone {}: NSEC chain fixed ({} records removed, {} added)",
        zone.apex(),
        state.changeset.removed().count(),
        state.changeset.added().count(),
    );
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::rr::TypeBitmap;
    use crate::update::tests::{name, zone_with};
    use crate::update::{UpdateFlags, ZoneUpdate};

    /// Summarizes NSEC records as `owner -> next` strings.
    fn links<'a>(records: impl Iterator<Item = (&'a Name, Type, &'a Rdata)>) -> BTreeSet<String> {
        records
            .filter(|(_, rr_type, _)| *rr_type == Type::NSEC)
            .map(|(owner, _, rdata)| {
                let nsec = Nsec::from_rdata(rdata).unwrap();
                format!("{owner} -> {}", nsec.next)
            })
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn nsec_at<Z: ZoneRead + ?Sized>(zone: &Z, owner: &str) -> Option<Nsec> {
        let node = zone.node(&name(owner))?;
        let rrset = node.lookup(Type::NSEC)?;
        assert_eq!(rrset.rdatas.len(), 1);
        Some(Nsec::from_rdata(&rrset.rdatas[0]).unwrap())
    }

    #[test]
    fn build_links_every_name() {
        let zone = zone_with("example.", &["b.example.", "c.example."], false);
        let contents = zone.snapshot();
        assert_eq!(nsec_at(&*contents, "example.").unwrap().next, name("b.example."));
        assert_eq!(nsec_at(&*contents, "b.example.").unwrap().next, name("c.example."));
        assert_eq!(nsec_at(&*contents, "c.example.").unwrap().next, name("example."));
        assert_eq!(contents.verify_chain(), Ok(3));
    }

    #[test]
    fn bitmap_matches_node_types() {
        let zone = zone_with("example.", &["b.example."], false);
        let contents = zone.snapshot();
        let apex: TypeBitmap = [Type::NS, Type::SOA, Type::RRSIG, Type::NSEC].into_iter().collect();
        let b: TypeBitmap = [Type::A, Type::RRSIG, Type::NSEC].into_iter().collect();
        assert_eq!(nsec_at(&*contents, "example.").unwrap().types, apex);
        assert_eq!(nsec_at(&*contents, "b.example.").unwrap().types, b);
    }

    #[test]
    fn build_over_correct_chain_changes_nothing() {
        let zone = zone_with("example.", &["b.example.", "c.example."], false);
        let contents = zone.snapshot();
        let changeset = build_nsec_chain(&*contents, Ttl::from(300)).unwrap();
        assert!(changeset.is_empty());
    }

    #[test]
    fn single_name_zone_covers_itself() {
        let zone = zone_with("example.", &[], false);
        let contents = zone.snapshot();
        assert_eq!(nsec_at(&*contents, "example.").unwrap().next, name("example."));
        assert_eq!(contents.verify_chain(), Ok(1));
    }

    #[test]
    fn fix_single_addition() {
        let zone = zone_with("example.", &["b.example.", "c.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("bb.example."), Type::A, 3600.into(), &[192, 0, 2, 9])
            .unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(links(changeset.removed()), set(&["b.example. -> c.example."]));
        assert_eq!(
            links(changeset.added()),
            set(&["b.example. -> bb.example.", "bb.example. -> c.example."])
        );
        let contents = update.commit().unwrap();
        assert_eq!(contents.verify_chain(), Ok(4));
    }

    #[test]
    fn fix_collapses_consecutive_removals() {
        let zone = zone_with(
            "example.",
            &["b.example.", "c.example.", "d.example."],
            false,
        );
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        for owner in ["b.example.", "c.example."] {
            update
                .remove_record(&name(owner), Type::A, &[192, 0, 2, 1])
                .unwrap();
        }
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(
            links(changeset.removed()),
            set(&[
                "example. -> b.example.",
                "b.example. -> c.example.",
                "c.example. -> d.example.",
            ])
        );
        assert_eq!(links(changeset.added()), set(&["example. -> d.example."]));
        let contents = update.commit().unwrap();
        assert!(contents.node(&name("b.example.")).is_none());
        assert!(contents.node(&name("c.example.")).is_none());
        assert_eq!(contents.verify_chain(), Ok(2));
    }

    #[test]
    fn fix_with_no_changes_is_a_no_op() {
        let zone = zone_with("example.", &["b.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert!(changeset.is_empty());

        // Touching a name without changing its types needs no change
        // either.
        update
            .add_record(&name("b.example."), Type::A, 3600.into(), &[192, 0, 2, 2])
            .unwrap();
        assert!(update.fix_denial_chain(None, false).unwrap().is_empty());
    }

    #[test]
    fn fix_wraps_around_at_the_end() {
        let zone = zone_with("example.", &["b.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("z.example."), Type::A, 3600.into(), &[192, 0, 2, 26])
            .unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(links(changeset.removed()), set(&["b.example. -> example."]));
        assert_eq!(
            links(changeset.added()),
            set(&["b.example. -> z.example.", "z.example. -> example."])
        );

        update
            .remove_record(&name("z.example."), Type::A, &[192, 0, 2, 26])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        let contents = update.commit().unwrap();
        assert_eq!(nsec_at(&*contents, "b.example.").unwrap().next, name("example."));
        assert_eq!(contents.verify_chain(), Ok(2));
    }

    #[test]
    fn fix_down_to_apex_only() {
        let zone = zone_with("example.", &["b.example.", "c.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        for owner in ["b.example.", "c.example."] {
            update
                .remove_record(&name(owner), Type::A, &[192, 0, 2, 1])
                .unwrap();
        }
        update.fix_denial_chain(None, false).unwrap();
        let contents = update.commit().unwrap();
        assert_eq!(nsec_at(&*contents, "example.").unwrap().next, name("example."));
        assert_eq!(contents.verify_chain(), Ok(1));
    }

    #[test]
    fn type_change_rewrites_bitmap() {
        let zone = zone_with("example.", &["b.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("b.example."), Type::TXT, 3600.into(), b"\x04text")
            .unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(links(changeset.removed()), set(&["b.example. -> example."]));
        assert_eq!(links(changeset.added()), set(&["b.example. -> example."]));
        assert!(nsec_at(&update, "b.example.").unwrap().types.contains(Type::TXT));
    }

    #[test]
    fn empty_non_terminals_get_no_nsec() {
        let zone = zone_with("example.", &["a.b.example."], false);
        let contents = zone.snapshot();
        assert!(contents.node(&name("b.example.")).unwrap().is_empty());
        assert_eq!(nsec_at(&*contents, "example.").unwrap().next, name("a.b.example."));
        assert_eq!(contents.verify_chain(), Ok(2));
    }

    #[test]
    fn delegation_removes_glue_from_chain() {
        let zone = zone_with(
            "example.",
            &["a.example.", "ns.sub.example.", "z.example."],
            false,
        );
        assert!(nsec_at(&*zone.snapshot(), "ns.sub.example.").is_some());

        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .add_record(&name("sub.example."), Type::NS, 3600.into(), name("ns.sub.example.").wire_repr())
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        let contents = update.commit().unwrap();
        assert!(nsec_at(&*contents, "ns.sub.example.").is_none());
        assert_eq!(nsec_at(&*contents, "a.example.").unwrap().next, name("sub.example."));
        let delegation = nsec_at(&*contents, "sub.example.").unwrap();
        assert_eq!(delegation.next, name("z.example."));
        assert!(delegation.types.contains(Type::NS));
        assert_eq!(contents.verify_chain(), Ok(4));
    }

    #[test]
    fn fix_matches_full_build() {
        let zone = zone_with(
            "example.",
            &["a.example.", "c.example.", "x.y.example.", "m.example."],
            false,
        );
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        update
            .remove_record(&name("c.example."), Type::A, &[192, 0, 2, 1])
            .unwrap();
        update
            .add_record(&name("d.example."), Type::A, 3600.into(), &[192, 0, 2, 4])
            .unwrap();
        update
            .add_record(&name("k.y.example."), Type::MX, 3600.into(), b"\x00\x0a\x00")
            .unwrap();
        update
            .add_record(&name("m.example."), Type::AAAA, 3600.into(), &[0; 16])
            .unwrap();
        update.fix_denial_chain(None, false).unwrap();
        assert!(build_nsec_chain(&update, Ttl::from(300)).unwrap().is_empty());
        let contents = update.commit().unwrap();
        assert_eq!(contents.verify_chain(), Ok(6));
    }

    #[test]
    fn switching_to_nsec3_withdraws_nsec() {
        use crate::update::tests::TEST_NSEC3_PARAM;

        let zone = zone_with("example.", &["a.example."], false);
        let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL).unwrap();
        let rdata = TEST_NSEC3_PARAM.to_rdata().unwrap();
        update
            .add_record(&name("example."), Type::NSEC3PARAM, 0.into(), rdata.octets())
            .unwrap();
        let changeset = update.fix_denial_chain(None, false).unwrap();
        assert_eq!(links(changeset.removed()).len(), 2);
        assert!(links(changeset.added()).is_empty());
        let contents = update.commit().unwrap();
        assert!(contents
            .iter(NodeTree::Main)
            .all(|node| !node.rrsets().contains(Type::NSEC)));
        assert_eq!(contents.len(NodeTree::Nsec3), 2);
        assert_eq!(contents.verify_chain(), Ok(2));
    }
}
