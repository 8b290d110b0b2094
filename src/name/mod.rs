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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::str::FromStr;

mod builder;
mod error;
pub use builder::NameBuilder;
pub use error::Error;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// An owned domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation of the
/// name (as defined in [RFC 1035 § 3.1]) together with the offset of
/// each label within it, so that labels can be accessed from either end
/// without rescanning. This is the representation used by the [NSD]
/// authoritative nameserver.
///
/// `Name`s are constructed
///
/// * through the [`FromStr`] implementation;
/// * through a [`NameBuilder`]; or
/// * from uncompressed on-the-wire names through
///   [`Name::try_from_uncompressed`].
///
/// Comparisons are ASCII-case-insensitive, and the [`Ord`]
/// implementation is DNSSEC's canonical ordering. Thus `Name` can be
/// used directly as the key of a [`BTreeMap`](std::collections::BTreeMap)
/// that must be iterated in canonical order, which is what the zone
/// data structures in this crate do.
///
/// [NSD]: https://www.nlnetlabs.nl/projects/nsd/about/
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    wire: Box<[u8]>,
    offsets: Box<[u8]>,
}

#[allow(clippy::len_without_is_empty)] // A domain name is never empty!
impl Name {
    /// Creates a `Name` from parts produced by a [`NameBuilder`]. The
    /// caller vouches for their validity.
    fn from_parts(wire: &[u8], offsets: &[u8]) -> Self {
        Self {
            wire: wire.into(),
            offsets: offsets.into(),
        }
    }

    /// Returns a `Name` representing the DNS root, `.`.
    pub fn root() -> Self {
        Self::from_parts(&[0], &[0])
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.offsets.len() == 1
    }

    /// Returns whether the `Name` is a wildcard domain name (i.e.,
    /// whether its first label is `*`).
    pub fn is_wildcard(&self) -> bool {
        self.label(0) == b"*"
    }

    /// Returns the number of labels in this `Name`, including the
    /// terminal null label.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns the octets of label `n`. This panics if `n` is out of
    /// range.
    pub fn label(&self, n: usize) -> &[u8] {
        let offset = self.offsets[n] as usize;
        let len = self.wire[offset] as usize;
        &self.wire[offset + 1..offset + 1 + len]
    }

    /// Returns an iterator over the labels of this `Name`, from left to
    /// right. The last label produced is the null label.
    pub fn labels(&self) -> Labels {
        Labels {
            name: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the on-the-wire representation of the `Name` with all
    /// ASCII letters made lowercase. This is the canonical form of
    /// [RFC 4034 § 6.2], which is the input to NSEC3 hashing.
    ///
    /// [RFC 4034 § 6.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.2
    pub fn canonical_wire_repr(&self) -> Vec<u8> {
        let mut octets = self.wire.to_vec();
        for offset in self.offsets.iter().map(|o| *o as usize) {
            let len = octets[offset] as usize;
            octets[offset + 1..offset + 1 + len].make_ascii_lowercase();
        }
        octets
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns whether this `Name` is a proper subdomain of `other`.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        self.len() > other.len() && self.eq_or_subdomain_of(other)
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Name> {
        if skip < self.len() {
            let start = self.offsets[skip];
            let offsets: Vec<u8> = self.offsets[skip..].iter().map(|o| o - start).collect();
            Some(Self::from_parts(&self.wire[start as usize..], &offsets))
        } else {
            None
        }
    }

    /// Returns the immediate parent of this `Name`, or `None` for the
    /// root.
    pub fn parent(&self) -> Option<Name> {
        self.superdomain(1)
    }

    /// Returns a new `Name` made by prepending `label` to this one.
    pub fn prepend_label(&self, label: &[u8]) -> Result<Name, Error> {
        let mut builder = NameBuilder::new();
        builder.try_push_slice(label)?;
        builder.finish_with_suffix(self)
    }

    /// Tries to parse an uncompressed name present at the start of the
    /// provided buffer. The name need not occupy the entire buffer;
    /// extra data is ignored. If the name is valid, it is returned
    /// along with its length in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Name, usize), Error> {
        let mut builder = NameBuilder::new();
        let mut cursor = 0;
        loop {
            let len = *octets.get(cursor).ok_or(Error::UnexpectedEom)? as usize;
            if len > MAX_LABEL_LEN {
                // Pointers and extended label types are not allowed in
                // uncompressed names.
                return Err(Error::InvalidPointer);
            }
            cursor += 1;
            if len == 0 {
                return builder.finish().map(|name| (name, cursor));
            }
            let label = octets
                .get(cursor..cursor + len)
                .ok_or(Error::UnexpectedEom)?;
            builder.try_push_slice(label)?;
            builder.next_label()?;
            cursor += len;
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels().take(self.len() - 1) {
            write_label(f, label)?;
            f.write_str(".")?;
        }
        Ok(())
    }
}

/// Writes a label with periods, backslashes, and octets that are not
/// ASCII graphic characters escaped in accordance with RFC 1035 § 5.1
/// and RFC 4343 § 2.1.
fn write_label(f: &mut fmt::Formatter, label: &[u8]) -> fmt::Result {
    for octet in label {
        if *octet == b'.' {
            f.write_str("\\.")?;
        } else if *octet == b'\\' {
            f.write_str("\\\\")?;
        } else if octet.is_ascii_graphic() {
            write!(f, "{}", *octet as char)?;
        } else {
            write!(f, "\\{:03}", *octet)?;
        }
    }
    Ok(())
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .labels()
                .zip(other.labels())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The [`Ord`] implementation for `Name` employs DNSSEC's canonical
/// ordering of domain names. Per [RFC 4034 § 6.1], `Name`s are ordered
/// as strings of labels read from right to left, where each label is
/// ordered as an unsigned left-justified octet string with uppercase
/// ASCII letters treated as lowercase.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .map(|(a, b)| cmp_labels(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

/// Compares two labels in canonical order.
fn cmp_labels(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // We have to hash in a case-insensitive manner to match our
        // implementations of PartialEq and Eq.
        for label in self.labels() {
            state.write_u8(label.len() as u8);
            for octet in label {
                state.write_u8(octet.to_ascii_lowercase());
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the labels in a [`Name`].
///
/// To use this iterator, construct one from a [`Name`] using
/// [`Name::labels`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.front += 1;
            Some(self.name.label(self.front - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(self.name.label(self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII and fully qualified. Escape sequences
/// as defined by [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut builder = NameBuilder::new();

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                builder.try_push(value)?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                builder.next_label()?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                builder.try_push(octet)?;
                remaining_octets = &remaining_octets[1..];
            }
        }
        builder.finish()
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
            let value = [a, b, c]
                .iter()
                .fold(0usize, |acc, digit| 10 * acc + (**digit - b'0') as usize);
            u8::try_from(value)
                .map(|value| (value, 3))
                .map_err(|_| Error::InvalidEscape)
        }
        [a, ..] if a.is_ascii_digit() => Err(Error::InvalidEscape),
        [other, ..] => Ok((*other, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
