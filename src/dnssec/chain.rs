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

//! The chain driver shared by the NSEC and NSEC3 chains.
//!
//! A chain is described by a [`DenialChain`] view over a zone. Chain
//! positions are identified by *keys*: owner names for NSEC, and hashed
//! owner names for NSEC3. In both cases a key is also the owner of the
//! denial record at that position.

use std::collections::BTreeSet;

use log::trace;

use crate::name::Name;
use crate::rr::{Rdata, Rrset, Ttl, Type};
use crate::update::Changeset;
use crate::zone::{Error, Node};

/// An iterator over chain keys.
pub type Keys<'a> = Box<dyn Iterator<Item = Name> + 'a>;

////////////////////////////////////////////////////////////////////////
// CHAIN VIEWS                                                        //
////////////////////////////////////////////////////////////////////////

/// A view of a denial-of-existence chain over (the merged view of) a
/// zone.
pub trait DenialChain {
    /// The type of the chain's records.
    fn rr_type(&self) -> Type;

    /// Returns whether `key` belongs in the chain after the update.
    fn is_member(&self, key: &Name) -> Result<bool, Error>;

    /// Returns the denial records present at `key`.
    fn current(&self, key: &Name) -> Option<Rrset>;

    /// Returns the signatures covering the denial records at `key`.
    fn signatures(&self, key: &Name) -> Option<Rrset>;

    /// Returns the "next" key that the record at `key` currently points
    /// to.
    fn current_next(&self, key: &Name) -> Option<Name>;

    /// Builds the record that `key` should hold when followed by
    /// `next`.
    fn desired(&self, key: &Name, next: &Name) -> Result<Rdata, Error>;

    /// Returns all keys that may be in the chain, in canonical order.
    /// Not all of them need to be members.
    fn candidates(&self) -> Keys<'_>;

    /// Like [`DenialChain::candidates`], but in reverse order.
    fn candidates_rev(&self) -> Keys<'_>;

    /// Returns the candidates strictly after `key`, in order.
    fn candidates_after(&self, key: &Name) -> Keys<'_>;

    /// Returns the candidates strictly before `key`, in reverse order.
    fn candidates_before(&self, key: &Name) -> Keys<'_>;

    fn first_member(&self) -> Result<Option<Name>, Error> {
        first_member_of(self, self.candidates())
    }

    fn last_member(&self) -> Result<Option<Name>, Error> {
        first_member_of(self, self.candidates_rev())
    }

    /// Returns the member following `key`, wrapping around. If `key` is
    /// the only member, this is `key` itself.
    fn next_member(&self, key: &Name) -> Result<Option<Name>, Error> {
        match first_member_of(self, self.candidates_after(key))? {
            Some(next) => Ok(Some(next)),
            None => self.first_member(),
        }
    }

    /// Returns the member preceding `key`, wrapping around.
    fn prev_member(&self, key: &Name) -> Result<Option<Name>, Error> {
        match first_member_of(self, self.candidates_before(key))? {
            Some(prev) => Ok(Some(prev)),
            None => self.last_member(),
        }
    }
}

fn first_member_of<C: DenialChain + ?Sized>(chain: &C, keys: Keys) -> Result<Option<Name>, Error> {
    for key in keys {
        if chain.is_member(&key)? {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

/// Returns the signatures at `node` covering `covered`, as an RRset.
pub fn signature_rrset(node: &Node, covered: Type) -> Option<Rrset> {
    let ttl = node.lookup(Type::RRSIG)?.ttl;
    let rdatas = node.signatures_covering(covered);
    if rdatas.is_empty() {
        None
    } else {
        Some(Rrset {
            rr_type: Type::RRSIG,
            ttl,
            rdatas,
        })
    }
}

////////////////////////////////////////////////////////////////////////
// FIX STATE                                                          //
////////////////////////////////////////////////////////////////////////

/// What the chain driver should do after a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FixStep {
    /// The step settled links; the current key becomes the last one
    /// used.
    Continue,

    /// The current key needed no change.
    Skip,

    /// A link was deferred, because its true successor may still be
    /// changed by a later key. The deferred link source has been stored
    /// in [`ChainFixState::next_name`].
    ResetPending,
}

/// The input of a step of the chain driver.
#[derive(Clone, Debug)]
pub struct StepInput {
    /// The previous changed key, if any.
    pub previous: Option<Name>,

    /// The changed key being visited.
    pub current: Name,

    /// The source of a deferred link, if any.
    pub pending_next: Option<Name>,

    /// The next changed key, if any.
    pub upcoming: Option<Name>,
}

/// The state carried through a chain fix.
#[derive(Debug)]
pub struct ChainFixState {
    /// The outgoing changes.
    pub changeset: Changeset,

    /// The first member of the chain after the update, once known.
    pub chain_start: Option<Name>,

    /// Whether the last member of the chain is known to point back to
    /// `chain_start`.
    pub old_connected: bool,

    /// The last key whose step settled links.
    pub last_used: Option<Name>,

    /// The source of a deferred link.
    pub next_name: Option<Name>,

    /// The TTL for new denial records.
    pub ttl: Ttl,

    withdrawn: BTreeSet<Name>,
    linked: BTreeSet<Name>,
}

impl ChainFixState {
    pub fn new(ttl: Ttl) -> Self {
        Self {
            changeset: Changeset::new(),
            chain_start: None,
            old_connected: false,
            last_used: None,
            next_name: None,
            ttl,
            withdrawn: BTreeSet::new(),
            linked: BTreeSet::new(),
        }
    }

    pub fn into_changeset(self) -> Changeset {
        self.changeset
    }
}

////////////////////////////////////////////////////////////////////////
// RECORD OPERATIONS                                                  //
////////////////////////////////////////////////////////////////////////

/// Withdraws the denial records at `key`, with their signatures. This
/// happens at most once per key.
pub fn withdraw<C: DenialChain + ?Sized>(
    chain: &C,
    state: &mut ChainFixState,
    key: &Name,
) -> Result<(), Error> {
    if !state.withdrawn.insert(key.clone()) {
        return Ok(());
    }
    if let Some(rrset) = chain.current(key) {
        withdraw_rrset(&mut state.changeset, key, &rrset)?;
    }
    if let Some(rrset) = chain.signatures(key) {
        withdraw_rrset(&mut state.changeset, key, &rrset)?;
    }
    Ok(())
}

/// Withdraws the records of `rr_type` at `node`, along with the
/// signatures covering them.
pub fn withdraw_node_records(
    changeset: &mut Changeset,
    node: &Node,
    rr_type: Type,
) -> Result<(), Error> {
    if let Some(rrset) = node.lookup(rr_type) {
        withdraw_rrset(changeset, node.owner(), rrset)?;
    }
    if let Some(rrset) = signature_rrset(node, rr_type) {
        withdraw_rrset(changeset, node.owner(), &rrset)?;
    }
    Ok(())
}

fn withdraw_rrset(changeset: &mut Changeset, owner: &Name, rrset: &Rrset) -> Result<(), Error> {
    for rdata in &rrset.rdatas {
        trace!("Withdrawing {} {} {}", owner, rrset.rr_type, rdata);
        changeset.remove_record(owner, rrset.rr_type, rrset.ttl, rdata.clone())?;
    }
    Ok(())
}

/// Makes the record at `key` point to `next`. Nothing is changed if the
/// right record is already there. Returns whether anything changed.
pub fn put_link<C: DenialChain + ?Sized>(
    chain: &C,
    state: &mut ChainFixState,
    key: &Name,
    next: &Name,
) -> Result<bool, Error> {
    let desired = chain.desired(key, next)?;
    if let Some(current) = chain.current(key) {
        if current.ttl == state.ttl && current.rdatas == [desired.clone()] {
            return Ok(false);
        }
        withdraw(chain, state, key)?;
    }
    trace!("Linking {} to {}", key, next);
    state
        .changeset
        .add_record(key, chain.rr_type(), state.ttl, desired)?;
    Ok(true)
}

/// Links `key` to the member following it. Each key is linked at most
/// once per fix. Returns whether anything changed.
pub fn link<C: DenialChain + ?Sized>(
    chain: &C,
    state: &mut ChainFixState,
    key: &Name,
) -> Result<bool, Error> {
    if !state.linked.insert(key.clone()) {
        return Ok(false);
    }
    let next = chain.next_member(key)?.ok_or(Error::InconsistentChain)?;
    put_link(chain, state, key, &next)
}

/// Links the deferred link source, if there is one.
fn flush_pending<C: DenialChain + ?Sized>(chain: &C, state: &mut ChainFixState) -> Result<(), Error> {
    match state.next_name.take() {
        Some(pending) => link(chain, state, &pending).map(|_| ()),
        None => Ok(()),
    }
}

////////////////////////////////////////////////////////////////////////
// DRIVERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Calls `callback` for each pair of consecutive `members`, and finally
/// for the last and first members. A single member is paired with
/// itself. Stops at the first error.
pub fn iterate_create<I, F>(members: I, mut callback: F) -> Result<(), Error>
where
    I: IntoIterator<Item = Name>,
    F: FnMut(&Name, &Name) -> Result<(), Error>,
{
    let mut members = members.into_iter();
    let first = match members.next() {
        Some(first) => first,
        None => return Ok(()),
    };
    let mut previous = first.clone();
    for member in members {
        callback(&previous, &member)?;
        previous = member;
    }
    callback(&previous, &first)
}

/// Walks the changed `keys` in order, calling `step` for each, and then
/// `finalize` once. Stops at the first error. If there are no keys at
/// all, neither callback is called.
pub fn iterate_fix<I, F, G>(
    keys: I,
    state: &mut ChainFixState,
    mut step: F,
    finalize: G,
) -> Result<(), Error>
where
    I: IntoIterator<Item = Name>,
    F: FnMut(&StepInput, &mut ChainFixState) -> Result<FixStep, Error>,
    G: FnOnce(&mut ChainFixState) -> Result<(), Error>,
{
    let mut keys = keys.into_iter().peekable();
    if keys.peek().is_none() {
        return Ok(());
    }
    let mut previous = None;
    while let Some(current) = keys.next() {
        let input = StepInput {
            previous: previous.take(),
            current,
            pending_next: state.next_name.clone(),
            upcoming: keys.peek().cloned(),
        };
        match step(&input, state)? {
            FixStep::Continue => state.last_used = Some(input.current.clone()),
            FixStep::Skip => (),
            FixStep::ResetPending => trace!("Deferring the link of {:?}", state.next_name),
        }
        previous = Some(input.current);
    }
    finalize(state)
}

/// The step of an incremental chain fix.
pub fn fix_step<C: DenialChain + ?Sized>(
    chain: &C,
    input: &StepInput,
    state: &mut ChainFixState,
) -> Result<FixStep, Error> {
    let key = &input.current;
    if chain.is_member(key)? {
        flush_pending(chain, state)?;
        let changed = link(chain, state, key)?;
        let prev = chain.prev_member(key)?.ok_or(Error::InconsistentChain)?;
        let prev_changed = link(chain, state, &prev)?;
        return Ok(if changed || prev_changed {
            FixStep::Continue
        } else {
            FixStep::Skip
        });
    }

    if chain.current(key).is_none() {
        return Ok(FixStep::Skip);
    }
    withdraw(chain, state, key)?;
    let prev = match chain.prev_member(key)? {
        Some(prev) => prev,
        None => return Ok(FixStep::Continue),
    };
    let succ = chain.next_member(&prev)?.ok_or(Error::InconsistentChain)?;

    // If the next changed key comes before the new successor of prev,
    // it may still change what prev should point to.
    let defer = match &input.upcoming {
        Some(upcoming) => *upcoming < succ || succ <= prev,
        None => false,
    };
    if state.next_name.as_ref().map_or(false, |pending| *pending != prev) {
        flush_pending(chain, state)?;
    }
    if defer {
        state.next_name = Some(prev);
        Ok(FixStep::ResetPending)
    } else {
        state.next_name = None;
        link(chain, state, &prev)?;
        Ok(FixStep::Continue)
    }
}

/// Closes the cycle after an incremental chain fix.
pub fn fix_finalize<C: DenialChain + ?Sized>(chain: &C, state: &mut ChainFixState) -> Result<(), Error> {
    flush_pending(chain, state)?;
    let start = match chain.first_member()? {
        Some(start) => start,
        None => return Ok(()),
    };
    let last = chain.last_member()?.ok_or(Error::InconsistentChain)?;
    state.old_connected =
        state.linked.contains(&last) || chain.current_next(&last).as_ref() == Some(&start);
    state.chain_start = Some(start);
    if !state.old_connected {
        link(chain, state, &last)?;
    }
    Ok(())
}

/// Repairs `chain` around the changed `keys`.
pub fn fix<C, I>(chain: &C, keys: I, state: &mut ChainFixState) -> Result<(), Error>
where
    C: DenialChain + ?Sized,
    I: IntoIterator<Item = Name>,
{
    iterate_fix(
        keys,
        state,
        |input, state| fix_step(chain, input, state),
        |state| fix_finalize(chain, state),
    )
}

/// Builds `chain` over all of its members, withdrawing the records of
/// candidates that are not members.
pub fn build<C: DenialChain + ?Sized>(chain: &C, state: &mut ChainFixState) -> Result<(), Error> {
    let mut members = Vec::new();
    for key in chain.candidates() {
        if chain.is_member(&key)? {
            members.try_reserve(1)?;
            members.push(key);
        } else if chain.current(&key).is_some() {
            withdraw(chain, state, &key)?;
        }
    }
    iterate_create(members, |key, next| {
        put_link(chain, state, key, next).map(|_| ())
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
