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

//! Implementation of the [`Rdata`] type.

use std::fmt;
use std::str::FromStr;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};

////////////////////////////////////////////////////////////////////////
// RDATA TYPE                                                         //
////////////////////////////////////////////////////////////////////////

/// The maximum length of the RDATA of a record.
const MAX_RDATA_LEN: usize = u16::MAX as usize;

/// A type for record RDATA.
///
/// The RDATA of a record is limited to 65,535 octets. The `Rdata` type
/// owns its octets and can only be constructed if they have a valid
/// length.
///
/// [RFC 3597 § 6] specifies that RRs of unknown type are equal when
/// their RDATA is bitwise equal, and the DNSSEC types handled by this
/// crate follow the same rule. `Rdata` therefore derives its
/// comparison traits from the octets.
///
/// The textual form is the generic RDATA encoding of [RFC 3597 § 5],
/// e.g. `\# 4 7f000001`.
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
/// [RFC 3597 § 6]: https://datatracker.ietf.org/doc/html/rfc3597#section-6
#[derive(Clone, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Rdata {
    octets: Box<[u8]>,
}

impl Rdata {
    /// Returns the RDATA octets.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the length of the RDATA in octets.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns whether the RDATA is empty.
    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }
}

impl TryFrom<&[u8]> for Rdata {
    type Error = RdataError;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > MAX_RDATA_LEN {
            Err(RdataError::TooLong)
        } else {
            Ok(Self {
                octets: octets.into(),
            })
        }
    }
}

impl TryFrom<Vec<u8>> for Rdata {
    type Error = RdataError;

    fn try_from(octets: Vec<u8>) -> Result<Self, Self::Error> {
        if octets.len() > MAX_RDATA_LEN {
            Err(RdataError::TooLong)
        } else {
            Ok(Self {
                octets: octets.into_boxed_slice(),
            })
        }
    }
}

impl fmt::Display for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            f.write_str("\\# 0")
        } else {
            write!(f, "\\# {} {}", self.len(), HEXLOWER.encode(&self.octets))
        }
    }
}

impl fmt::Debug for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Parses the [RFC 3597 § 5] generic RDATA encoding: the token `\#`,
/// the RDATA length in decimal, and then the RDATA in hexadecimal
/// (which may be split into multiple whitespace-separated words).
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
impl FromStr for Rdata {
    type Err = RdataError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut words = text.split_ascii_whitespace();
        if words.next() != Some("\\#") {
            return Err(RdataError::NotGeneric);
        }
        let len: usize = words
            .next()
            .and_then(|word| word.parse().ok())
            .ok_or(RdataError::InvalidLength)?;
        let hex: String = words.collect();
        let octets = HEXLOWER_PERMISSIVE
            .decode(hex.as_bytes())
            .map_err(|_| RdataError::InvalidHex)?;
        if octets.len() != len {
            Err(RdataError::InvalidLength)
        } else {
            Self::try_from(octets)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that [`Rdata`] could not be constructed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RdataError {
    /// The RDATA would be longer than 65,535 octets.
    TooLong,

    /// The text does not begin with the `\#` token of the generic RDATA
    /// encoding.
    NotGeneric,

    /// The length given in the generic encoding is missing, malformed,
    /// or does not match the data.
    InvalidLength,

    /// The data of the generic encoding is not valid hexadecimal.
    InvalidHex,
}

impl fmt::Display for RdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::TooLong => f.write_str("RDATA is longer than 65,535 octets"),
            Self::NotGeneric => f.write_str("RDATA is not in the RFC 3597 generic encoding"),
            Self::InvalidLength => f.write_str("RDATA length is invalid"),
            Self::InvalidHex => f.write_str("RDATA is not valid hexadecimal"),
        }
    }
}

impl std::error::Error for RdataError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
