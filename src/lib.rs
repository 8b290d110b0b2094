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

//! Maintenance of DNSSEC authenticated denial of existence for
//! in-memory DNS zones.
//!
//! The crate keeps zones in memory as atomically swappable snapshots
//! ([`zone`]), stages changes to them in transactions
//! ([`update`]), and builds and repairs their NSEC and NSEC3 chains
//! ([`dnssec`]). The [`name`] and [`rr`] modules provide the
//! underlying DNS data types.
//!
//! A typical update looks like this:
//!
//! ```
//! use quandary_nsec::name::Name;
//! use quandary_nsec::rr::{Ttl, Type};
//! use quandary_nsec::update::{UpdateFlags, ZoneUpdate};
//! use quandary_nsec::zone::Zone;
//!
//! let apex: Name = "example.".parse().unwrap();
//! let zone = Zone::new(apex.clone());
//! let mut update = ZoneUpdate::begin(&zone, UpdateFlags::FULL).unwrap();
//! let ns: Name = "ns.example.".parse().unwrap();
//! update
//!     .add_record(&apex, Type::NS, Ttl::from(3600), ns.wire_repr())
//!     .unwrap();
//! update
//!     .add_record(&ns, Type::A, Ttl::from(3600), &[192, 0, 2, 1])
//!     .unwrap();
//! update.fix_denial_chain(Some(Ttl::from(300)), false).unwrap();
//! let contents = update.commit().unwrap();
//! assert_eq!(contents.verify_chain(), Ok(2));
//! ```

pub mod dnssec;
pub mod name;
pub mod rr;
pub mod update;
mod util;
pub mod zone;
