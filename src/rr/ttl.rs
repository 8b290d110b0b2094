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

//! Provides the [`Ttl`] structure for DNS RR TTLs.

use std::fmt;

use super::Rdata;
use crate::name::Name;

////////////////////////////////////////////////////////////////////////
// TTLS                                                               //
////////////////////////////////////////////////////////////////////////

/// The time to live (TTL) of a DNS record.
///
/// There are contradictory definitions of the TTL field in [RFC 1035]
/// (see [erratum 2130]), so [RFC 2181 § 8] clarified that TTL values
/// are unsigned integers between 0 and 2³¹ - 1, inclusive. Because the
/// TTL field is 32 bits wide, the most significant bit is zero. A TTL
/// value received with the most significant bit set is interpreted as
/// zero.
///
/// This type wraps `u32` to implement [RFC 2181 § 8]. The public API
/// will only instantiate `Ttl` objects whose underlying `u32` values
/// have the most significant bit set to zero, and `Ttl::from(u32)`
/// treats TTL wire values with the most significant bit set as zero.
///
/// [Erratum 2130]: https://www.rfc-editor.org/errata/eid2130
/// [RFC 1035]: https://datatracker.ietf.org/doc/html/rfc1035
/// [RFC 2181 § 8]: https://datatracker.ietf.org/doc/html/rfc2181#section-8
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Ttl(u32);

impl Ttl {
    /// Reads the MINIMUM field of SOA RDATA. [RFC 4034 § 4] has NSEC
    /// records take their TTL from this field (and [RFC 5155 § 3] does
    /// the same for NSEC3). Returns `None` if the RDATA is not valid
    /// SOA RDATA.
    ///
    /// [RFC 4034 § 4]: https://datatracker.ietf.org/doc/html/rfc4034#section-4
    /// [RFC 5155 § 3]: https://datatracker.ietf.org/doc/html/rfc5155#section-3
    pub fn from_soa_minimum(soa: &Rdata) -> Option<Self> {
        let octets = soa.octets();
        let (_, mname_len) = Name::try_from_uncompressed(octets).ok()?;
        let (_, rname_len) = Name::try_from_uncompressed(&octets[mname_len..]).ok()?;
        let fields = &octets[mname_len + rname_len..];
        if fields.len() != 20 {
            return None;
        }
        let minimum: [u8; 4] = fields[16..20].try_into().ok()?;
        Some(Self::from(u32::from_be_bytes(minimum)))
    }
}

impl From<u32> for Ttl {
    fn from(raw: u32) -> Self {
        if raw > i32::MAX as u32 {
            Self(0)
        } else {
            Self(raw)
        }
    }
}

impl From<Ttl> for u32 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Debug for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ttls_are_not_modified() {
        let i32_max = i32::MAX as u32;
        assert_eq!(u32::from(Ttl::from(0)), 0);
        assert_eq!(u32::from(Ttl::from(23)), 23);
        assert_eq!(u32::from(Ttl::from(i32_max)), i32_max);
    }

    #[test]
    fn large_ttls_become_zero() {
        assert_eq!(u32::from(Ttl::from(i32::MAX as u32 + 1)), 0);
    }

    #[test]
    fn soa_minimum_is_extracted() {
        let mut octets = b"\x02ns\x07example\x00\x05admin\x07example\x00".to_vec();
        for field in [2022010101u32, 7200, 3600, 1209600, 300] {
            octets.extend_from_slice(&field.to_be_bytes());
        }
        let soa = Rdata::try_from(octets.as_slice()).unwrap();
        assert_eq!(Ttl::from_soa_minimum(&soa), Some(Ttl::from(300)));
    }

    #[test]
    fn truncated_soa_has_no_minimum() {
        let soa = Rdata::try_from(&b"\x02ns\x07example\x00\x00\x00\x00"[..]).unwrap();
        assert_eq!(Ttl::from_soa_minimum(&soa), None);
    }
}
