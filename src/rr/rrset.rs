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

//! Implementation of RRset-related data structures.

use std::fmt;

use super::{Rdata, Ttl, Type};

////////////////////////////////////////////////////////////////////////
// RRSETS                                                             //
////////////////////////////////////////////////////////////////////////

/// A data structure for resource record sets.
///
/// [RFC 2181 § 5] defined an RRset as a group of records with the same
/// label, class, and type, and also stipulated that all records in an
/// RRset have the same TTL. The owner of the `Rrset` is not stored in
/// the structure itself; it is kept track of by the zone node that
/// holds the `Rrset` (or by an
/// [`OwnedRrset`](crate::update::OwnedRrset) in a changeset). Since
/// this crate only handles class IN data, the class is not stored
/// either.
///
/// [RFC 2181 § 5]: https://datatracker.ietf.org/doc/html/rfc2181#section-5
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rrset {
    pub rr_type: Type,
    pub ttl: Ttl,
    pub rdatas: Vec<Rdata>,
}

impl Rrset {
    /// Creates a new [`Rrset`] with the given RR type and TTL. It will
    /// initially contain no record data.
    pub fn new(rr_type: Type, ttl: Ttl) -> Self {
        Self {
            rr_type,
            ttl,
            rdatas: Vec::new(),
        }
    }

    /// Adds an [`Rdata`] to this [`Rrset`]. Following the behavior of
    /// other nameservers, we silently discard [`Rdata`] that is already
    /// present in the [`Rrset`]. Returns whether the [`Rdata`] was
    /// added.
    pub fn push_rdata(&mut self, rdata: Rdata) -> bool {
        if self.rdatas.contains(&rdata) {
            false
        } else {
            self.rdatas.push(rdata);
            true
        }
    }

    /// Returns whether the `Rrset` contains no record data.
    pub fn is_empty(&self) -> bool {
        self.rdatas.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////
// RRSET LISTS                                                        //
////////////////////////////////////////////////////////////////////////

/// A data structure to contain all of the [`Rrset`]s of various
/// [`Type`]s at a node in the DNS tree. The [`Rrset`]s are kept sorted
/// by type.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RrsetList {
    rrsets: Vec<Rrset>,
}

impl RrsetList {
    /// Returns a new, empty [`RrsetList`].
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a resource record to the [`RrsetList`]. Returns whether the
    /// record was new.
    ///
    /// This will fail if the [`Ttl`] of the new record does not match
    /// the rest of the records in its [`Rrset`]. RRSIG records are the
    /// exception, since signatures covering different types may carry
    /// different TTLs ([RFC 2181 § 5.2]); an RRSIG [`Rrset`] keeps the
    /// TTL it was created with.
    ///
    /// [RFC 2181 § 5.2]: https://datatracker.ietf.org/doc/html/rfc2181#section-5.2
    pub fn add(&mut self, rr_type: Type, ttl: Ttl, rdata: Rdata) -> Result<bool, RrsetListAddError> {
        match self.rrsets.binary_search_by_key(&rr_type, |r| r.rr_type) {
            Ok(index) => {
                let rrset = &mut self.rrsets[index];
                if rrset.ttl != ttl && rr_type != Type::RRSIG {
                    Err(RrsetListAddError::TtlMismatch)
                } else {
                    Ok(rrset.push_rdata(rdata))
                }
            }
            Err(index) => {
                let mut rrset = Rrset::new(rr_type, ttl);
                rrset.push_rdata(rdata);
                self.rrsets.insert(index, rrset);
                Ok(true)
            }
        }
    }

    /// Removes a resource record from the [`RrsetList`]. If this
    /// empties its [`Rrset`], the [`Rrset`] is removed as well. Returns
    /// whether the record was present.
    pub fn remove(&mut self, rr_type: Type, rdata: &Rdata) -> bool {
        if let Ok(index) = self.rrsets.binary_search_by_key(&rr_type, |r| r.rr_type) {
            let rrset = &mut self.rrsets[index];
            let before = rrset.rdatas.len();
            rrset.rdatas.retain(|r| r != rdata);
            let removed = rrset.rdatas.len() != before;
            if rrset.is_empty() {
                self.rrsets.remove(index);
            }
            removed
        } else {
            false
        }
    }

    /// Looks up the [`Rrset`] of type `rr_type` in the [`RrsetList`].
    pub fn lookup(&self, rr_type: Type) -> Option<&Rrset> {
        self.rrsets
            .binary_search_by_key(&rr_type, |r| r.rr_type)
            .map(|index| &self.rrsets[index])
            .ok()
    }

    /// Returns whether the [`RrsetList`] holds an [`Rrset`] of type
    /// `rr_type`.
    pub fn contains(&self, rr_type: Type) -> bool {
        self.lookup(rr_type).is_some()
    }

    /// Returns an iterator over the [`Rrset`]s of the `RrsetList`.
    pub fn iter(&self) -> std::slice::Iter<Rrset> {
        self.rrsets.iter()
    }

    /// Returns an iterator over the [`Type`]s present in the
    /// `RrsetList`, in ascending order.
    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.rrsets.iter().map(|r| r.rr_type)
    }

    /// Returns the number of [`Rrset`]s in the `RrsetList`.
    pub fn len(&self) -> usize {
        self.rrsets.len()
    }

    /// Returns whether the `RrsetList` is empty.
    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }
}

/// An error signaling that a record cannot be added to an [`RrsetList`]
/// since its [`Ttl`] differs from the rest of the records in its
/// [`Rrset`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RrsetListAddError {
    TtlMismatch,
}

impl fmt::Display for RrsetListAddError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TtlMismatch => f.write_str("TTL does not match the rest of the RRset"),
        }
    }
}

impl std::error::Error for RrsetListAddError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn rdata(octets: &[u8]) -> Rdata {
        Rdata::try_from(octets).unwrap()
    }

    #[test]
    fn rrsetlist_works() {
        let loopback1 = rdata(&[127, 0, 0, 1]);
        let loopback2 = rdata(&[127, 0, 0, 2]);
        let domain = rdata(b"\x04test\x00");
        let mut rrsets = RrsetList::new();
        assert_eq!(rrsets.add(Type::CNAME, Ttl::from(7200), domain.clone()), Ok(true));
        assert_eq!(rrsets.add(Type::A, Ttl::from(3600), loopback1.clone()), Ok(true));
        assert_eq!(rrsets.add(Type::A, Ttl::from(3600), loopback2.clone()), Ok(true));
        assert_eq!(rrsets.add(Type::A, Ttl::from(3600), loopback1.clone()), Ok(false));

        let a_rrset = rrsets.lookup(Type::A).unwrap();
        assert_eq!(a_rrset.rdatas, [loopback1, loopback2]);
        assert_eq!(rrsets.lookup(Type::CNAME).unwrap().rdatas, [domain]);
        assert!(rrsets.lookup(Type::AAAA).is_none());
        assert_eq!(rrsets.types().collect::<Vec<_>>(), [Type::A, Type::CNAME]);
    }

    #[test]
    fn rrsetlist_rejects_ttl_mismatch() {
        let mut rrsets = RrsetList::new();
        rrsets.add(Type::NS, Ttl::from(3600), rdata(b"\x04test\x00")).unwrap();
        assert_eq!(
            rrsets.add(Type::NS, Ttl::from(7200), rdata(b"\x07invalid\x00")),
            Err(RrsetListAddError::TtlMismatch),
        );
        rrsets.add(Type::RRSIG, Ttl::from(3600), rdata(&[0, 2])).unwrap();
        assert_eq!(rrsets.add(Type::RRSIG, Ttl::from(300), rdata(&[0, 47])), Ok(true));
    }

    #[test]
    fn removing_last_record_removes_rrset() {
        let loopback = rdata(&[127, 0, 0, 1]);
        let mut rrsets = RrsetList::new();
        rrsets.add(Type::A, Ttl::from(3600), loopback.clone()).unwrap();
        assert!(!rrsets.remove(Type::A, &rdata(&[127, 0, 0, 2])));
        assert!(rrsets.contains(Type::A));
        assert!(rrsets.remove(Type::A, &loopback));
        assert!(rrsets.is_empty());
        assert!(!rrsets.remove(Type::A, &loopback));
    }
}
