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

//! Provides the [`Type`] structure for DNS RR types.

use std::fmt;
use std::str::FromStr;

////////////////////////////////////////////////////////////////////////
// RR TYPES                                                           //
////////////////////////////////////////////////////////////////////////

/// Represents the RR type of a DNS record.
///
/// An RR type is represented on the wire as an unsigned 16-bit integer.
/// Hence this is basically a wrapper around `u16` with nice
/// [`Debug`](fmt::Debug), [`Display`](fmt::Display), and [`FromStr`]
/// implementations for working with the common textual representations
/// of RR types. In addition, constants for common RR types (e.g.
/// [`Type::A`] are provided.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct Type(u16);

impl Type {
    pub const A: Type = Type(1);
    pub const NS: Type = Type(2);
    pub const CNAME: Type = Type(5);
    pub const SOA: Type = Type(6);
    pub const PTR: Type = Type(12);
    pub const HINFO: Type = Type(13);
    pub const MX: Type = Type(15);
    pub const TXT: Type = Type(16);
    pub const AAAA: Type = Type(28);
    pub const SRV: Type = Type(33);
    pub const DS: Type = Type(43);
    pub const RRSIG: Type = Type(46);
    pub const NSEC: Type = Type(47);
    pub const DNSKEY: Type = Type(48);
    pub const NSEC3: Type = Type(50);
    pub const NSEC3PARAM: Type = Type(51);

    /// Returns whether this type belongs to the authenticated denial of
    /// existence machinery itself (NSEC, NSEC3, and RRSIG). These are
    /// left out of the type summary that a zone node keeps.
    pub fn is_denial_or_signature(self) -> bool {
        matches!(self, Self::NSEC | Self::NSEC3 | Self::RRSIG)
    }
}

impl From<u16> for Type {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Type> for u16 {
    fn from(rr_type: Type) -> Self {
        rr_type.0
    }
}

/// The mnemonics recognized by [`Type`]'s [`FromStr`] implementation,
/// besides the generic `TYPEnnn` form.
const MNEMONICS: [(&str, Type); 16] = [
    ("A", Type::A),
    ("NS", Type::NS),
    ("CNAME", Type::CNAME),
    ("SOA", Type::SOA),
    ("PTR", Type::PTR),
    ("HINFO", Type::HINFO),
    ("MX", Type::MX),
    ("TXT", Type::TXT),
    ("AAAA", Type::AAAA),
    ("SRV", Type::SRV),
    ("DS", Type::DS),
    ("RRSIG", Type::RRSIG),
    ("NSEC", Type::NSEC),
    ("DNSKEY", Type::DNSKEY),
    ("NSEC3", Type::NSEC3),
    ("NSEC3PARAM", Type::NSEC3PARAM),
];

impl FromStr for Type {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Some((_, rr_type)) = MNEMONICS
            .iter()
            .find(|(mnemonic, _)| mnemonic.eq_ignore_ascii_case(text))
        {
            Ok(*rr_type)
        } else if text
            .get(0..4)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case("TYPE"))
        {
            text[4..]
                .parse::<u16>()
                .map(Self::from)
                .or(Err("type value is not a valid unsigned 16-bit integer"))
        } else {
            Err("unknown type")
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::CNAME => f.write_str("CNAME"),
            Self::SOA => f.write_str("SOA"),
            Self::PTR => f.write_str("PTR"),
            Self::HINFO => f.write_str("HINFO"),
            Self::MX => f.write_str("MX"),
            Self::TXT => f.write_str("TXT"),
            Self::AAAA => f.write_str("AAAA"),
            Self::SRV => f.write_str("SRV"),
            Self::DS => f.write_str("DS"),
            Self::RRSIG => f.write_str("RRSIG"),
            Self::NSEC => f.write_str("NSEC"),
            Self::DNSKEY => f.write_str("DNSKEY"),
            Self::NSEC3 => f.write_str("NSEC3"),
            Self::NSEC3PARAM => f.write_str("NSEC3PARAM"),
            Self(value) => write!(f, "TYPE{value}"), // RFC 3597 § 5
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_displays_according_to_rfc3597() {
        // TYPE65280 is from the private use range, so it should always
        // be unknown.
        let class = Type::from(0xff00);
        assert_eq!(class.to_string(), "TYPE65280");
    }

    #[test]
    fn type_parses_according_to_rfc3597() {
        // Again, TYPE65280 is from the private use range.
        let type_a: Type = "TYPE1".parse().unwrap();
        let type_65280: Type = "TYPE65280".parse().unwrap();
        assert_eq!(type_a, Type::A);
        assert_eq!(u16::from(type_65280), 65280);
    }

    #[test]
    fn dnssec_types_round_trip_through_text() {
        for rr_type in [Type::RRSIG, Type::NSEC, Type::NSEC3, Type::NSEC3PARAM] {
            assert_eq!(rr_type.to_string().parse::<Type>(), Ok(rr_type));
        }
        assert_eq!("nsec3param".parse::<Type>(), Ok(Type::NSEC3PARAM));
        assert!("BOGUS".parse::<Type>().is_err());
    }

    #[test]
    fn mnemonics_parse_case_insensitively() {
        assert_eq!("a".parse::<Type>(), Ok(Type::A));
        assert_eq!("Ns".parse::<Type>(), Ok(Type::NS));
        assert_eq!("rrSig".parse::<Type>(), Ok(Type::RRSIG));
        assert_eq!("type65280".parse::<Type>().map(u16::from), Ok(65280));
        assert!("NSEC4".parse::<Type>().is_err());
        assert!("TYPE65536".parse::<Type>().is_err());
    }

    #[test]
    fn denial_and_signature_types_are_recognized() {
        assert!(Type::NSEC.is_denial_or_signature());
        assert!(Type::NSEC3.is_denial_or_signature());
        assert!(Type::RRSIG.is_denial_or_signature());
        assert!(!Type::NSEC3PARAM.is_denial_or_signature());
        assert!(!Type::DS.is_denial_or_signature());
    }
}
