// Copyright 2021 Matthew Ingwersen.
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

//! Data structures and routines for handling DNS resource record data.
//!
//! Besides the basic record types ([`Type`], [`Ttl`], [`Rdata`], and
//! the [`Rrset`] containers), this module knows how to build and parse
//! the RDATA of the record types that make up authenticated denial of
//! existence: NSEC ([`Nsec`]), NSEC3 ([`Nsec3`]), and NSEC3PARAM
//! ([`Nsec3Param`]), along with the NSEC3 hash.

mod bitmap;
pub mod nsec;
pub mod nsec3;
mod rdata;
pub mod rrset;
mod rr_type;
mod ttl;
pub use bitmap::{BitmapError, TypeBitmap};
pub use nsec::{rrsig_type_covered, Nsec, Nsec3, ReadRdataError, NSEC3_FLAG_OPT_OUT};
pub use nsec3::{Nsec3Param, NSEC3_HASH_SHA1};
pub use rdata::{Rdata, RdataError};
pub use rr_type::Type;
pub use rrset::{Rrset, RrsetList};
pub use ttl::Ttl;
