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

//! Provides the [`TypeBitmap`] structure.

use std::collections::BTreeSet;
use std::fmt;

use super::Type;

/// A set of RR types, as carried in the Type Bit Maps field of NSEC and
/// NSEC3 records.
///
/// On the wire, the set is encoded as a series of window blocks
/// ([RFC 4034 § 4.1.2]). Each block covers 256 types and consists of
/// the window number, the length of the bitmap in octets (1 to 32),
/// and the bitmap itself, in which the most significant bit of the
/// first octet is type 0 of the window. Blocks appear in increasing
/// window order, and trailing zero octets are omitted.
///
/// [RFC 4034 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1.2
#[derive(Clone, Default, Eq, Hash, PartialEq)]
pub struct TypeBitmap {
    types: BTreeSet<Type>,
}

impl TypeBitmap {
    /// Returns a new, empty `TypeBitmap`.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a type to the set. Returns whether it was newly added.
    pub fn insert(&mut self, rr_type: Type) -> bool {
        self.types.insert(rr_type)
    }

    /// Removes a type from the set. Returns whether it was present.
    pub fn remove(&mut self, rr_type: Type) -> bool {
        self.types.remove(&rr_type)
    }

    pub fn contains(&self, rr_type: Type) -> bool {
        self.types.contains(&rr_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns an iterator over the types in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Type> + '_ {
        self.types.iter().copied()
    }

    /// Returns a copy of this set with `extra` types added.
    pub fn with(&self, extra: &[Type]) -> Self {
        let mut bitmap = self.clone();
        bitmap.types.extend(extra.iter().copied());
        bitmap
    }

    /// Appends the wire encoding of the set to `out`.
    pub fn write_wire(&self, out: &mut Vec<u8>) {
        let mut window: Option<u8> = None;
        let mut bitmap = [0u8; 32];
        for rr_type in self.iter() {
            let value = u16::from(rr_type);
            let this_window = (value >> 8) as u8;
            if window != Some(this_window) {
                if let Some(window) = window {
                    write_block(out, window, &bitmap);
                }
                window = Some(this_window);
                bitmap = [0; 32];
            }
            let bit = (value & 0xff) as usize;
            bitmap[bit / 8] |= 0x80 >> (bit % 8);
        }
        if let Some(window) = window {
            write_block(out, window, &bitmap);
        }
    }

    /// Returns the wire encoding of the set.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_wire(&mut out);
        out
    }

    /// Decodes a Type Bit Maps field that occupies all of `octets`.
    pub fn from_wire(mut octets: &[u8]) -> Result<Self, BitmapError> {
        let mut bitmap = Self::new();
        let mut last_window: Option<u8> = None;
        while !octets.is_empty() {
            let &[window, len, ref rest @ ..] = octets else {
                return Err(BitmapError::Truncated);
            };
            if last_window.map_or(false, |last| window <= last) {
                return Err(BitmapError::WindowOrder);
            }
            if len == 0 || len > 32 {
                return Err(BitmapError::BlockLength);
            }
            let block = rest.get(..len as usize).ok_or(BitmapError::Truncated)?;
            for (i, octet) in block.iter().enumerate() {
                for bit in 0..8 {
                    if octet & (0x80 >> bit) != 0 {
                        let value = (window as u16) << 8 | (i * 8 + bit) as u16;
                        bitmap.insert(Type::from(value));
                    }
                }
            }
            last_window = Some(window);
            octets = &rest[len as usize..];
        }
        Ok(bitmap)
    }
}

/// Writes one window block, leaving off trailing zero octets.
fn write_block(out: &mut Vec<u8>, window: u8, bitmap: &[u8; 32]) {
    let len = bitmap.iter().rposition(|octet| *octet != 0).map_or(0, |i| i + 1);
    if len > 0 {
        out.push(window);
        out.push(len as u8);
        out.extend_from_slice(&bitmap[..len]);
    }
}

impl FromIterator<Type> for TypeBitmap {
    fn from_iter<I: IntoIterator<Item = Type>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TypeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for rr_type in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{rr_type}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for TypeBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{self}]")
    }
}

/// An error signaling that a Type Bit Maps field is malformed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitmapError {
    Truncated,
    WindowOrder,
    BlockLength,
}

impl fmt::Display for BitmapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Truncated => f.write_str("type bitmap is truncated"),
            Self::WindowOrder => f.write_str("type bitmap windows are out of order"),
            Self::BlockLength => f.write_str("type bitmap block has an invalid length"),
        }
    }
}

impl std::error::Error for BitmapError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_rfc4034_example() {
        // The example from RFC 4034 § 4.3: A MX RRSIG NSEC TYPE1234.
        let bitmap: TypeBitmap = [Type::A, Type::MX, Type::RRSIG, Type::NSEC, Type::from(1234)]
            .into_iter()
            .collect();
        let expected: &[u8] = &[
            0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03, 0x04, 0x1b, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20,
        ];
        assert_eq!(bitmap.to_wire(), expected);
        assert_eq!(TypeBitmap::from_wire(expected), Ok(bitmap));
    }

    #[test]
    fn empty_bitmap_has_empty_encoding() {
        assert!(TypeBitmap::new().to_wire().is_empty());
        assert_eq!(TypeBitmap::from_wire(&[]), Ok(TypeBitmap::new()));
    }

    #[test]
    fn malformed_bitmaps_are_rejected() {
        assert_eq!(TypeBitmap::from_wire(&[0]), Err(BitmapError::Truncated));
        assert_eq!(TypeBitmap::from_wire(&[0, 2, 0x40]), Err(BitmapError::Truncated));
        assert_eq!(TypeBitmap::from_wire(&[0, 0]), Err(BitmapError::BlockLength));
        assert_eq!(
            TypeBitmap::from_wire(&[1, 1, 0x40, 0, 1, 0x40]),
            Err(BitmapError::WindowOrder)
        );
    }

    #[test]
    fn displays_types_in_order() {
        let bitmap: TypeBitmap = [Type::NSEC, Type::NS, Type::SOA].into_iter().collect();
        assert_eq!(bitmap.to_string(), "NS SOA NSEC");
    }
}
