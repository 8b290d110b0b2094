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

//! NSEC3 parameters and the NSEC3 hash.

use std::fmt;

use data_encoding::BASE32_DNSSEC;
use rand::RngCore;
use sha1::{Digest, Sha1};

use super::nsec::{write_salt, Reader, ReadRdataError};
use super::{Rdata, RdataError};
use crate::name::Name;
use crate::zone::Error;

/// The only NSEC3 hash algorithm defined so far, SHA-1
/// ([RFC 5155 § 11]).
///
/// [RFC 5155 § 11]: https://datatracker.ietf.org/doc/html/rfc5155#section-11
pub const NSEC3_HASH_SHA1: u8 = 1;

/// The parameters of a zone's NSEC3 chain, as published in the
/// NSEC3PARAM record at the zone apex ([RFC 5155 § 4]).
///
/// [RFC 5155 § 4]: https://datatracker.ietf.org/doc/html/rfc5155#section-4
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nsec3Param {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

impl Nsec3Param {
    /// Creates SHA-1 parameters with a freshly generated random salt of
    /// `salt_len` octets.
    pub fn with_random_salt(iterations: u16, salt_len: u8) -> Self {
        let mut salt = vec![0; salt_len as usize];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            algorithm: NSEC3_HASH_SHA1,
            flags: 0,
            iterations,
            salt,
        }
    }

    pub fn to_rdata(&self) -> Result<Rdata, RdataError> {
        let salt_len = u8::try_from(self.salt.len()).map_err(|_| RdataError::TooLong)?;
        let mut octets = Vec::with_capacity(5 + self.salt.len());
        octets.push(self.algorithm);
        octets.push(self.flags);
        octets.extend_from_slice(&self.iterations.to_be_bytes());
        octets.push(salt_len);
        octets.extend_from_slice(&self.salt);
        Rdata::try_from(octets)
    }

    pub fn from_rdata(rdata: &Rdata) -> Result<Self, ReadRdataError> {
        let mut reader = Reader(rdata.octets());
        let algorithm = reader.u8()?;
        let flags = reader.u8()?;
        let iterations = reader.u16()?;
        let salt_len = reader.u8()? as usize;
        let salt = reader.take(salt_len)?.to_vec();
        if !reader.0.is_empty() {
            return Err(ReadRdataError::ExtraData);
        }
        Ok(Self {
            algorithm,
            flags,
            iterations,
            salt,
        })
    }

    /// Computes the NSEC3 hash of `name` ([RFC 5155 § 5]):
    ///
    /// ```text
    /// IH(salt, x, 0) = H(x || salt)
    /// IH(salt, x, k) = H(IH(salt, x, k-1) || salt), if k > 0
    /// ```
    ///
    /// where `x` is the canonical wire form of the name. Only SHA-1 is
    /// supported; any other algorithm fails with
    /// [`Error::HashingUnavailable`].
    ///
    /// [RFC 5155 § 5]: https://datatracker.ietf.org/doc/html/rfc5155#section-5
    pub fn hash_name(&self, name: &Name) -> Result<Vec<u8>, Error> {
        if self.algorithm != NSEC3_HASH_SHA1 {
            return Err(Error::HashingUnavailable);
        }
        let mut digest = Sha1::new()
            .chain_update(name.canonical_wire_repr())
            .chain_update(&self.salt)
            .finalize();
        for _ in 0..self.iterations {
            digest = Sha1::new()
                .chain_update(digest)
                .chain_update(&self.salt)
                .finalize();
        }
        Ok(digest.to_vec())
    }

    /// Returns the owner name of the NSEC3 record for `name` in the
    /// zone with apex `apex`: the base32hex encoding of the hash,
    /// prepended as a label to the apex.
    pub fn owner_for(&self, name: &Name, apex: &Name) -> Result<Name, Error> {
        let hash = self.hash_name(name)?;
        hashed_owner(&hash, apex)
    }
}

/// Builds the owner name `base32hex(hash).apex`.
pub fn hashed_owner(hash: &[u8], apex: &Name) -> Result<Name, Error> {
    apex.prepend_label(BASE32_DNSSEC.encode(hash).as_bytes())
        .map_err(Error::from)
}

/// Recovers the raw hash from a hashed owner name produced by
/// [`hashed_owner`]. Returns `None` if the first label is not valid
/// base32hex.
pub fn hash_of_owner(owner: &Name) -> Option<Vec<u8>> {
    let label = owner.label(0).to_ascii_lowercase();
    BASE32_DNSSEC.decode(&label).ok()
}

impl fmt::Display for Nsec3Param {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} ", self.algorithm, self.flags, self.iterations)?;
        write_salt(f, &self.salt)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
