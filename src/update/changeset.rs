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

//! Implementation of the [`Changeset`] and [`OwnedRrset`] structures.

use std::fmt;

use crate::name::Name;
use crate::rr::{Nsec, Nsec3, Rdata, Rrset, Ttl, Type};
use crate::zone::Error;

/// An [`Rrset`] together with its owner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnedRrset {
    pub owner: Name,
    pub rrset: Rrset,
}

impl OwnedRrset {
    /// Creates a new, empty `OwnedRrset`.
    pub fn new(owner: Name, rr_type: Type, ttl: Ttl) -> Self {
        Self {
            owner,
            rrset: Rrset::new(rr_type, ttl),
        }
    }

    pub fn rr_type(&self) -> Type {
        self.rrset.rr_type
    }

    pub fn ttl(&self) -> Ttl {
        self.rrset.ttl
    }

    /// Returns an iterator over the RDATA of the records.
    pub fn rdatas(&self) -> std::slice::Iter<Rdata> {
        self.rrset.rdatas.iter()
    }
}

/// Prints the records in presentation format, one per line. NSEC and
/// NSEC3 RDATA is decoded; all other RDATA uses the generic format of
/// [RFC 3597 § 5].
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
impl fmt::Display for OwnedRrset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, rdata) in self.rdatas().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{} {} IN {} ", self.owner, self.ttl(), self.rr_type())?;
            match self.rr_type() {
                Type::NSEC => match Nsec::from_rdata(rdata) {
                    Ok(nsec) => write!(f, "{nsec}")?,
                    Err(_) => write!(f, "{rdata}")?,
                },
                Type::NSEC3 => match Nsec3::from_rdata(rdata) {
                    Ok(nsec3) => write!(f, "{nsec3}")?,
                    Err(_) => write!(f, "{rdata}")?,
                },
                _ => write!(f, "{rdata}")?,
            }
        }
        Ok(())
    }
}

/// A set of record removals and additions that together make up one
/// atomic change to a zone, along with the zone's SOA record before
/// and after the change. Applying a changeset means first removing
/// the records of [`Changeset::remove`] and then adding those of
/// [`Changeset::add`].
///
/// Records are appended with [`Changeset::add_record`] and
/// [`Changeset::remove_record`]. Consecutive records with the same
/// owner, type, and TTL share one [`OwnedRrset`]. Memory is reserved
/// fallibly, and exhaustion is reported as
/// [`Error::AllocationFailure`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Changeset {
    pub soa_from: Option<OwnedRrset>,
    pub soa_to: Option<OwnedRrset>,
    pub remove: Vec<OwnedRrset>,
    pub add: Vec<OwnedRrset>,
}

impl Changeset {
    /// Creates a new, empty `Changeset`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns whether the changeset changes nothing.
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
            && self.add.is_empty()
            && self.soa_from.is_none()
            && self.soa_to.is_none()
    }

    /// Returns the total number of records (not RRsets) removed and
    /// added, SOA records excluded.
    pub fn len(&self) -> usize {
        count_records(&self.remove) + count_records(&self.add)
    }

    /// Appends a record addition.
    pub fn add_record(
        &mut self,
        owner: &Name,
        rr_type: Type,
        ttl: Ttl,
        rdata: Rdata,
    ) -> Result<(), Error> {
        push_record(&mut self.add, owner, rr_type, ttl, rdata)
    }

    /// Appends a record removal.
    pub fn remove_record(
        &mut self,
        owner: &Name,
        rr_type: Type,
        ttl: Ttl,
        rdata: Rdata,
    ) -> Result<(), Error> {
        push_record(&mut self.remove, owner, rr_type, ttl, rdata)
    }

    /// Merges `other` into this changeset, as if `other` were applied
    /// after this one. A record this changeset adds and `other` removes
    /// drops out of both, as does a record this changeset removes and
    /// `other` adds back with the same TTL. The starting SOA of this
    /// changeset is kept, and the final SOA is taken from `other` if it
    /// has one.
    pub fn merge(&mut self, other: Changeset) -> Result<(), Error> {
        let remove = cancel_records(&mut self.add, &other.remove, false)?;
        let add = cancel_records(&mut self.remove, &other.add, true)?;
        self.remove.try_reserve(remove.len())?;
        self.add.try_reserve(add.len())?;
        self.remove.extend(remove);
        self.add.extend(add);
        if self.soa_from.is_none() {
            self.soa_from = other.soa_from;
        }
        if other.soa_to.is_some() {
            self.soa_to = other.soa_to;
        }
        Ok(())
    }

    /// Returns an iterator over the records added, as `(owner, type,
    /// RDATA)` triples.
    pub fn added(&self) -> impl Iterator<Item = (&Name, Type, &Rdata)> {
        flatten(&self.add)
    }

    /// Returns an iterator over the records removed, as `(owner, type,
    /// RDATA)` triples.
    pub fn removed(&self) -> impl Iterator<Item = (&Name, Type, &Rdata)> {
        flatten(&self.remove)
    }
}

fn push_record(
    list: &mut Vec<OwnedRrset>,
    owner: &Name,
    rr_type: Type,
    ttl: Ttl,
    rdata: Rdata,
) -> Result<(), Error> {
    if let Some(last) = list.last_mut() {
        if last.owner == *owner && last.rrset.rr_type == rr_type && last.rrset.ttl == ttl {
            last.rrset.rdatas.try_reserve(1)?;
            last.rrset.push_rdata(rdata);
            return Ok(());
        }
    }
    list.try_reserve(1)?;
    let mut owned = OwnedRrset::new(owner.clone(), rr_type, ttl);
    owned.rrset.push_rdata(rdata);
    list.push(owned);
    Ok(())
}

/// Takes each record of `records` out of `list`, matching on owner,
/// type, and RDATA (and on TTL if `match_ttl` is set). RRsets of `list`
/// left empty are dropped. Returns the records that were not found.
pub(crate) fn cancel_records(
    list: &mut Vec<OwnedRrset>,
    records: &[OwnedRrset],
    match_ttl: bool,
) -> Result<Vec<OwnedRrset>, Error> {
    let mut rest = Vec::new();
    for owned in records {
        for rdata in owned.rdatas() {
            let taken = list.iter_mut().any(|candidate| {
                if candidate.owner != owned.owner
                    || candidate.rr_type() != owned.rr_type()
                    || (match_ttl && candidate.ttl() != owned.ttl())
                {
                    return false;
                }
                match candidate.rrset.rdatas.iter().position(|r| r == rdata) {
                    Some(index) => {
                        candidate.rrset.rdatas.remove(index);
                        true
                    }
                    None => false,
                }
            });
            if !taken {
                push_record(&mut rest, &owned.owner, owned.rr_type(), owned.ttl(), rdata.clone())?;
            }
        }
    }
    list.retain(|owned| !owned.rrset.is_empty());
    Ok(rest)
}

fn count_records(list: &[OwnedRrset]) -> usize {
    list.iter().map(|owned| owned.rrset.rdatas.len()).sum()
}

fn flatten(list: &[OwnedRrset]) -> impl Iterator<Item = (&Name, Type, &Rdata)> {
    list.iter().flat_map(|owned| {
        owned
            .rdatas()
            .map(move |rdata| (&owned.owner, owned.rr_type(), rdata))
    })
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for owned in &self.remove {
            for line in owned.to_string().lines() {
                writeln!(f, "-{line}")?;
            }
        }
        for owned in &self.add {
            for line in owned.to_string().lines() {
                writeln!(f, "+{line}")?;
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
