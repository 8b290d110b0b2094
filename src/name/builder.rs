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

//! Implementation of the [`NameBuilder`] structure.

use arrayvec::ArrayVec;

use super::{Error, Name, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

/// A facility to build [`Name`]s label by label.
///
/// The `NameBuilder` accumulates the on-the-wire representation and
/// label offsets of a name in fixed-size buffers that can hold any
/// valid name, so that the only heap allocation happens when the
/// [`Name`] is finished.
///
/// A new `NameBuilder` starts with a single null label. Octets are
/// added to the current label with [`NameBuilder::try_push`] and
/// [`NameBuilder::try_push_slice`], and [`NameBuilder::next_label`]
/// starts a new one. The name is completed with
/// [`NameBuilder::finish`], or with [`NameBuilder::finish_with_suffix`]
/// to make it a subdomain of another name.
///
/// ```
/// use quandary_nsec::name::NameBuilder;
/// let mut builder = NameBuilder::new();
/// builder.try_push_slice(b"example").unwrap();
/// builder.next_label().unwrap();
/// assert_eq!(builder.finish().unwrap(), "example.".parse().unwrap());
/// ```
pub struct NameBuilder {
    wire_repr: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
    label_start: usize,
    label_len: u8,
}

impl NameBuilder {
    /// Constructs a new `NameBuilder`, which initially contains a
    /// single null label.
    pub fn new() -> Self {
        let mut wire_repr = ArrayVec::new();
        wire_repr.push(0);
        let mut label_offsets = ArrayVec::new();
        label_offsets.push(0);
        Self {
            wire_repr,
            label_offsets,
            label_start: 0,
            label_len: 0,
        }
    }

    /// Determines whether the name currently stored in the
    /// `NameBuilder` ends with the null label.
    pub fn is_fully_qualified(&self) -> bool {
        self.label_len == 0
    }

    /// Tries to add the given octet to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push(&mut self, octet: u8) -> Result<(), Error> {
        if self.label_len >= (MAX_LABEL_LEN as u8) {
            Err(Error::LabelTooLong)
        } else if self.wire_repr.try_push(octet).is_ok() {
            self.label_len += 1;
            Ok(())
        } else {
            Err(Error::NameTooLong)
        }
    }

    /// Tries to add the given slice to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push_slice(&mut self, octets: &[u8]) -> Result<(), Error> {
        if (self.label_len as usize) + octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else if self.wire_repr.try_extend_from_slice(octets).is_ok() {
            self.label_len += octets.len() as u8;
            Ok(())
        } else {
            Err(Error::NameTooLong)
        }
    }

    fn update_label_len(&mut self) {
        self.wire_repr[self.label_start] = self.label_len;
    }

    /// Finishes the current label and starts a new one. This fails if
    /// the current label is null or if the name would become too long.
    pub fn next_label(&mut self) -> Result<(), Error> {
        if self.is_fully_qualified() {
            Err(Error::NullNonTerminal)
        } else if self.wire_repr.is_full() {
            Err(Error::NameTooLong)
        } else {
            self.update_label_len();
            self.label_start = self.wire_repr.len();
            self.label_len = 0;

            // Neither push can fail: wire_repr is not full, and every
            // label so far is non-null, so there are fewer than
            // MAX_N_LABELS of them.
            self.wire_repr.push(0);
            self.label_offsets.push(self.label_start as u8);
            Ok(())
        }
    }

    /// Finishes the construction of the domain name. Since the last
    /// label of a domain name must be null, this fails if that is not
    /// the case.
    pub fn finish(self) -> Result<Name, Error> {
        if !self.is_fully_qualified() {
            Err(Error::NonNullTerminal)
        } else {
            Ok(Name::from_parts(&self.wire_repr, &self.label_offsets))
        }
    }

    /// Finishes the current label and then appends the labels of
    /// `suffix`. This fails if the current label is null or if the
    /// result would be too long.
    pub fn finish_with_suffix(mut self, suffix: &Name) -> Result<Name, Error> {
        if self.is_fully_qualified() {
            return Err(Error::NullNonTerminal);
        }
        self.update_label_len();
        let base = self.wire_repr.len();
        self.wire_repr
            .try_extend_from_slice(suffix.wire_repr())
            .map_err(|_| Error::NameTooLong)?;
        for offset in suffix.offsets.iter() {
            self.label_offsets
                .try_push((*offset as usize + base) as u8)
                .map_err(|_| Error::NameTooLong)?;
        }
        Ok(Name::from_parts(&self.wire_repr, &self.label_offsets))
    }
}

impl Default for NameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
