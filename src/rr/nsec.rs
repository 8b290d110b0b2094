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

//! RDATA of the denial-of-existence record types (NSEC and NSEC3) and
//! the RRSIG fields this crate needs to read.

use std::fmt;

use data_encoding::{BASE32_DNSSEC, HEXLOWER};

use super::bitmap::{BitmapError, TypeBitmap};
use super::{Rdata, RdataError, Type};
use crate::name::{self, Name};

/// The NSEC3 flag signaling that the record may cover unsigned
/// delegations ([RFC 5155 § 3.1.2.1]).
///
/// [RFC 5155 § 3.1.2.1]: https://datatracker.ietf.org/doc/html/rfc5155#section-3.1.2.1
pub const NSEC3_FLAG_OPT_OUT: u8 = 0x01;

////////////////////////////////////////////////////////////////////////
// NSEC                                                               //
////////////////////////////////////////////////////////////////////////

/// The RDATA of an NSEC record ([RFC 4034 § 4]).
///
/// [RFC 4034 § 4]: https://datatracker.ietf.org/doc/html/rfc4034#section-4
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec {
    pub next: Name,
    pub types: TypeBitmap,
}

impl Nsec {
    /// Builds the RDATA. Per [RFC 6840 § 5.1], the next domain name is
    /// written as is, without conversion to lowercase.
    ///
    /// [RFC 6840 § 5.1]: https://datatracker.ietf.org/doc/html/rfc6840#section-5.1
    pub fn to_rdata(&self) -> Result<Rdata, RdataError> {
        let mut octets = self.next.wire_repr().to_vec();
        self.types.write_wire(&mut octets);
        Rdata::try_from(octets)
    }

    /// Parses NSEC RDATA.
    pub fn from_rdata(rdata: &Rdata) -> Result<Self, ReadRdataError> {
        let (next, len) = Name::try_from_uncompressed(rdata.octets())?;
        let types = TypeBitmap::from_wire(&rdata.octets()[len..])?;
        Ok(Self { next, types })
    }
}

impl fmt::Display for Nsec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.next, self.types)
    }
}

////////////////////////////////////////////////////////////////////////
// NSEC3                                                              //
////////////////////////////////////////////////////////////////////////

/// The RDATA of an NSEC3 record ([RFC 5155 § 3]).
///
/// [RFC 5155 § 3]: https://datatracker.ietf.org/doc/html/rfc5155#section-3
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec3 {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub types: TypeBitmap,
}

impl Nsec3 {
    /// Returns whether the Opt-Out flag is set.
    pub fn opt_out(&self) -> bool {
        self.flags & NSEC3_FLAG_OPT_OUT != 0
    }

    pub fn to_rdata(&self) -> Result<Rdata, RdataError> {
        let salt_len = u8::try_from(self.salt.len()).map_err(|_| RdataError::TooLong)?;
        let hash_len = u8::try_from(self.next_hashed.len()).map_err(|_| RdataError::TooLong)?;
        let mut octets = Vec::with_capacity(6 + self.salt.len() + self.next_hashed.len());
        octets.push(self.algorithm);
        octets.push(self.flags);
        octets.extend_from_slice(&self.iterations.to_be_bytes());
        octets.push(salt_len);
        octets.extend_from_slice(&self.salt);
        octets.push(hash_len);
        octets.extend_from_slice(&self.next_hashed);
        self.types.write_wire(&mut octets);
        Rdata::try_from(octets)
    }

    pub fn from_rdata(rdata: &Rdata) -> Result<Self, ReadRdataError> {
        let mut reader = Reader(rdata.octets());
        let algorithm = reader.u8()?;
        let flags = reader.u8()?;
        let iterations = reader.u16()?;
        let salt_len = reader.u8()? as usize;
        let salt = reader.take(salt_len)?.to_vec();
        let hash_len = reader.u8()? as usize;
        if hash_len == 0 {
            return Err(ReadRdataError::EmptyHash);
        }
        let next_hashed = reader.take(hash_len)?.to_vec();
        let types = TypeBitmap::from_wire(reader.0)?;
        Ok(Self {
            algorithm,
            flags,
            iterations,
            salt,
            next_hashed,
            types,
        })
    }
}

impl fmt::Display for Nsec3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} ", self.algorithm, self.flags, self.iterations)?;
        write_salt(f, &self.salt)?;
        write!(f, " {}", BASE32_DNSSEC.encode(&self.next_hashed))?;
        if !self.types.is_empty() {
            write!(f, " {}", self.types)?;
        }
        Ok(())
    }
}

/// Writes a salt in hexadecimal, or `-` if it is empty.
pub(super) fn write_salt(f: &mut fmt::Formatter, salt: &[u8]) -> fmt::Result {
    if salt.is_empty() {
        f.write_str("-")
    } else {
        f.write_str(&HEXLOWER.encode(salt))
    }
}

////////////////////////////////////////////////////////////////////////
// RRSIG                                                              //
////////////////////////////////////////////////////////////////////////

/// Reads the Type Covered field of RRSIG RDATA ([RFC 4034 § 3.1.1]).
/// This is all the chain maintenance code needs to know about a
/// signature: when a denial record is withdrawn, the signatures
/// covering its type go with it.
///
/// [RFC 4034 § 3.1.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.1.1
pub fn rrsig_type_covered(rdata: &Rdata) -> Option<Type> {
    match rdata.octets() {
        [high, low, ..] => Some(Type::from(u16::from_be_bytes([*high, *low]))),
        _ => None,
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING HELPERS AND ERRORS                                         //
////////////////////////////////////////////////////////////////////////

/// A cursor over RDATA octets.
pub(super) struct Reader<'a>(pub &'a [u8]);

impl<'a> Reader<'a> {
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], ReadRdataError> {
        if self.0.len() < len {
            Err(ReadRdataError::Truncated)
        } else {
            let (taken, rest) = self.0.split_at(len);
            self.0 = rest;
            Ok(taken)
        }
    }

    pub fn u8(&mut self) -> Result<u8, ReadRdataError> {
        self.take(1).map(|octets| octets[0])
    }

    pub fn u16(&mut self) -> Result<u16, ReadRdataError> {
        self.take(2).map(|octets| u16::from_be_bytes([octets[0], octets[1]]))
    }
}

/// An error signaling that DNSSEC RDATA could not be parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadRdataError {
    /// The RDATA ended early.
    Truncated,

    /// There was data after the end of a fixed-length structure.
    ExtraData,

    /// An NSEC3 record has a zero-length next hashed owner name.
    EmptyHash,

    /// An embedded domain name is invalid.
    InvalidName(name::Error),

    /// The type bitmap is invalid.
    InvalidBitmap(BitmapError),
}

impl fmt::Display for ReadRdataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("RDATA is truncated"),
            Self::ExtraData => f.write_str("RDATA has extra data"),
            Self::EmptyHash => f.write_str("next hashed owner name is empty"),
            Self::InvalidName(err) => write!(f, "invalid name in RDATA: {err}"),
            Self::InvalidBitmap(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ReadRdataError {}

impl From<name::Error> for ReadRdataError {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl From<BitmapError> for ReadRdataError {
    fn from(err: BitmapError) -> Self {
        Self::InvalidBitmap(err)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsec_rdata_matches_rfc4034_example() {
        // RFC 4034 § 4.3: host.example.com. A MX RRSIG NSEC TYPE1234.
        let nsec = Nsec {
            next: "host.example.com.".parse().unwrap(),
            types: [Type::A, Type::MX, Type::RRSIG, Type::NSEC, Type::from(1234)]
                .into_iter()
                .collect(),
        };
        let rdata = nsec.to_rdata().unwrap();
        assert_eq!(&rdata.octets()[..18], b"\x04host\x07example\x03com\x00");
        assert_eq!(rdata.len(), 18 + 37);
        assert_eq!(Nsec::from_rdata(&rdata), Ok(nsec.clone()));
        assert_eq!(nsec.to_string(), "host.example.com. A MX RRSIG NSEC TYPE1234");
    }

    #[test]
    fn nsec3_rdata_parses() {
        let nsec3 = Nsec3 {
            algorithm: 1,
            flags: NSEC3_FLAG_OPT_OUT,
            iterations: 12,
            salt: vec![0xaa, 0xbb, 0xcc, 0xdd],
            next_hashed: vec![0x11; 20],
            types: [Type::NS, Type::DS, Type::RRSIG].into_iter().collect(),
        };
        let rdata = nsec3.to_rdata().unwrap();
        assert_eq!(&rdata.octets()[..10], &[1, 1, 0, 12, 4, 0xaa, 0xbb, 0xcc, 0xdd, 20]);
        let parsed = Nsec3::from_rdata(&rdata).unwrap();
        assert!(parsed.opt_out());
        assert_eq!(parsed, nsec3);
    }

    #[test]
    fn nsec3_display_uses_base32hex() {
        let nsec3 = Nsec3 {
            algorithm: 1,
            flags: 0,
            iterations: 0,
            salt: Vec::new(),
            next_hashed: vec![0; 5],
            types: TypeBitmap::new(),
        };
        assert_eq!(nsec3.to_string(), "1 0 0 - 00000000");
    }

    #[test]
    fn truncated_nsec3_is_rejected() {
        let rdata = Rdata::try_from(&[1, 0, 0, 0, 4, 0xaa][..]).unwrap();
        assert_eq!(Nsec3::from_rdata(&rdata), Err(ReadRdataError::Truncated));
        let rdata = Rdata::try_from(&[1, 0, 0, 0, 0, 0][..]).unwrap();
        assert_eq!(Nsec3::from_rdata(&rdata), Err(ReadRdataError::EmptyHash));
    }

    #[test]
    fn rrsig_type_covered_is_read() {
        let rdata = Rdata::try_from(&[0, 47, 8, 2][..]).unwrap();
        assert_eq!(rrsig_type_covered(&rdata), Some(Type::NSEC));
        let rdata = Rdata::try_from(&[0][..]).unwrap();
        assert_eq!(rrsig_type_covered(&rdata), None);
    }
}
