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

//! Crate-private utilities.

use std::cmp::Ordering;
use std::iter::Peekable;

////////////////////////////////////////////////////////////////////////
// MERGING OF SORTED SEQUENCES                                        //
////////////////////////////////////////////////////////////////////////

/// An item produced by [`MergeSorted`].
#[derive(Debug)]
pub enum Merged<A, B> {
    Left(A),
    Right(B),
    Both(A, B),
}

/// Merges two iterators that are each sorted with respect to the same
/// ordering. When the two iterators produce equal items, they are
/// yielded together as [`Merged::Both`].
///
/// The ordering is supplied by the caller, so a reversed comparison
/// merges two descending sequences.
pub struct MergeSorted<A: Iterator, B: Iterator, F> {
    left: Peekable<A>,
    right: Peekable<B>,
    compare: F,
}

impl<A, B, F> MergeSorted<A, B, F>
where
    A: Iterator,
    B: Iterator,
    F: FnMut(&A::Item, &B::Item) -> Ordering,
{
    pub fn new(left: A, right: B, compare: F) -> Self {
        Self {
            left: left.peekable(),
            right: right.peekable(),
            compare,
        }
    }
}

impl<A, B, F> Iterator for MergeSorted<A, B, F>
where
    A: Iterator,
    B: Iterator,
    F: FnMut(&A::Item, &B::Item) -> Ordering,
{
    type Item = Merged<A::Item, B::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let ordering = match (self.left.peek(), self.right.peek()) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(l), Some(r)) => (self.compare)(l, r),
        };
        match ordering {
            Ordering::Less => self.left.next().map(Merged::Left),
            Ordering::Greater => self.right.next().map(Merged::Right),
            Ordering::Equal => self.left.next().zip(self.right.next()).map(|(l, r)| Merged::Both(l, r)),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
