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

//! Construction and repair of authenticated denial of existence
//! chains.
//!
//! A zone signed with NSEC carries one NSEC record per authoritative
//! name; a zone with an NSEC3PARAM record at its apex carries one NSEC3
//! record per hashed authoritative name instead. Either way, the
//! records form a single cycle in canonical order. This module can
//!
//! * build the chain of a zone from scratch ([`build_chain`]);
//! * repair it after an update, touching only the records adjacent to
//!   changed names ([`fix_chain`]); and
//! * check that a chain is complete and correct ([`verify_chain`]).
//!
//! The results are [`Changeset`]s. They are usually applied through
//! [`ZoneUpdate::fix_denial_chain`](crate::update::ZoneUpdate::fix_denial_chain),
//! which runs over the merged view of the update so that the chain
//! reflects the zone as it will be once the update is committed.
//!
//! The algorithms are written once, against the [`DenialChain`] trait,
//! and [`NsecChain`] and [`Nsec3Chain`] supply the NSEC and NSEC3
//! specifics.

use crate::rr::Ttl;
use crate::update::{Changeset, SortedChanges};
use crate::zone::{Error, ZoneRead};

mod chain;
mod nsec;
mod nsec3;
mod verify;
pub use chain::{
    iterate_create, iterate_fix, signature_rrset, ChainFixState, DenialChain, FixStep, Keys,
    StepInput,
};
pub use nsec::{build_nsec_chain, fix_nsec_chain, NsecChain};
pub use nsec3::{build_nsec3_chain, fix_nsec3_chain, Nsec3Chain};
pub use verify::verify_chain;

/// Builds the denial chain of `zone` from scratch, using NSEC3 if the
/// zone has NSEC3 parameters and NSEC otherwise. Records of the other
/// chain type are withdrawn. `opt_out` only matters for NSEC3.
pub fn build_chain<Z: ZoneRead + ?Sized>(
    zone: &Z,
    ttl: Ttl,
    opt_out: bool,
) -> Result<Changeset, Error> {
    match zone.nsec3_param() {
        Some(params) => build_nsec3_chain(zone, &params, ttl, opt_out),
        None => build_nsec_chain(zone, ttl),
    }
}

/// Repairs the denial chain of `zone` around `changes`, appending the
/// needed record changes to `state`. The chain type must not have
/// changed; switching between NSEC and NSEC3 takes [`build_chain`].
///
/// If an error is returned, the contents of `state` are unusable.
pub fn fix_chain<Z: ZoneRead + ?Sized>(
    zone: &Z,
    changes: &SortedChanges,
    state: &mut ChainFixState,
    opt_out: bool,
) -> Result<(), Error> {
    if changes.is_empty() {
        return Ok(());
    }
    match zone.nsec3_param() {
        Some(params) => fix_nsec3_chain(zone, &params, changes, state, opt_out),
        None => fix_nsec_chain(zone, changes, state),
    }
}
