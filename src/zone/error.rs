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

//! Implementation of the [`Error`] type for zone-related errors.

use std::collections::TryReserveError;
use std::fmt;

use crate::name;
use crate::rr::rrset::RrsetListAddError;
use crate::rr::{RdataError, ReadRdataError};

/// Errors that arise during operations on a [`Zone`](super::Zone), its
/// update transactions, and the denial-of-existence chains built over
/// it.
///
/// All operations either succeed completely or fail with one of these;
/// there is no partial success. A failed chain build or fix leaves the
/// changeset it was producing unusable, and the enclosing
/// [`ZoneUpdate`](crate::update::ZoneUpdate) should be aborted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// Memory for a changeset could not be reserved.
    AllocationFailure,

    /// A name was malformed, or required apex data (such as the SOA
    /// record) is missing.
    InvalidInput,

    /// The chain has a shape that cannot be repaired, e.g. a name that
    /// should be in the post-update chain could not be found, or two
    /// names have the same NSEC3 hash.
    InconsistentChain,

    /// NSEC3 was requested, but there are no usable NSEC3 parameters.
    HashingUnavailable,

    /// A lookup found nothing. Reference resolution treats this as an
    /// ordinary empty result rather than an error.
    NotFound,

    /// The record's owner is not within the zone.
    NotInZone,

    /// The record's TTL does not match the TTL of the other records in
    /// its RRset.
    TtlMismatch,

    /// RDATA was longer than 65,535 octets.
    RdataTooLong,

    /// The operation required RDATA parsing, and invalid RDATA was
    /// found.
    InvalidRdata,

    /// The zone's content was replaced after the update transaction
    /// began, so the transaction cannot be committed.
    ConcurrentUpdate,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::AllocationFailure => f.write_str("memory allocation failed"),
            Self::InvalidInput => f.write_str("invalid name or missing apex data"),
            Self::InconsistentChain => {
                f.write_str("the denial-of-existence chain is inconsistent and cannot be repaired")
            }
            Self::HashingUnavailable => f.write_str("no usable NSEC3 parameters are available"),
            Self::NotFound => f.write_str("not found"),
            Self::NotInZone => f.write_str("the record's owner is not within the zone"),
            Self::TtlMismatch => f.write_str(
                "the record's TTL does not match the TTL of existing records in the same RRset",
            ),
            Self::RdataTooLong => f.write_str("RDATA was longer than 65,535 octets"),
            Self::InvalidRdata => {
                f.write_str("the operation required RDATA parsing, and invalid RDATA was found")
            }
            Self::ConcurrentUpdate => {
                f.write_str("the zone was changed by another update after this one began")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<RrsetListAddError> for Error {
    fn from(error: RrsetListAddError) -> Self {
        match error {
            RrsetListAddError::TtlMismatch => Self::TtlMismatch,
        }
    }
}

impl From<RdataError> for Error {
    fn from(error: RdataError) -> Self {
        match error {
            RdataError::TooLong => Self::RdataTooLong,
            _ => Self::InvalidRdata,
        }
    }
}

impl From<ReadRdataError> for Error {
    fn from(_: ReadRdataError) -> Self {
        Self::InvalidRdata
    }
}

impl From<name::Error> for Error {
    fn from(_: name::Error) -> Self {
        Self::InvalidInput
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::AllocationFailure
    }
}
