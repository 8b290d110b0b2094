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

//! Checking of complete denial chains.

use log::{debug, warn};

use super::chain::DenialChain;
use super::nsec::NsecChain;
use super::nsec3::Nsec3Chain;
use crate::rr::{Nsec3, Type};
use crate::zone::{Error, NodeTree, ZoneRead};

/// Checks that the denial chain of `zone` is complete and correct:
/// every member holds exactly the record that a full rebuild would
/// produce, no other name holds one, and no records of the other chain
/// type are left. Each link is also walked backwards, which for a
/// snapshot goes through the node reference cache. With NSEC3, Opt-Out
/// is assumed if any NSEC3 record has the flag set. Returns the number
/// of records in the chain.
pub fn verify_chain<Z: ZoneRead + ?Sized>(zone: &Z) -> Result<usize, Error> {
    let count = match zone.nsec3_param() {
        Some(params) => {
            if let Some(node) = zone
                .iter(NodeTree::Main)
                .find(|node| node.rrsets().contains(Type::NSEC))
            {
                warn!("Zone {}: NSEC record at {} in an NSEC3 zone", zone.apex(), node.owner());
                return Err(Error::InconsistentChain);
            }
            let opt_out = zone.iter(NodeTree::Nsec3).any(|node| {
                node.lookup(Type::NSEC3).map_or(false, |rrset| {
                    rrset
                        .rdatas
                        .iter()
                        .filter_map(|rdata| Nsec3::from_rdata(rdata).ok())
                        .any(|nsec3| nsec3.opt_out())
                })
            });
            verify(&Nsec3Chain::for_zone(zone, &params, opt_out)?, zone.apex())?
        }
        None => {
            if let Some(node) = zone
                .iter(NodeTree::Nsec3)
                .find(|node| node.rrsets().contains(Type::NSEC3))
            {
                warn!("Zone {}: NSEC3 record at {} in an NSEC zone", zone.apex(), node.owner());
                return Err(Error::InconsistentChain);
            }
            verify(&NsecChain::new(zone), zone.apex())?
        }
    };
    debug!("Zone {}: denial chain of {} records verified", zone.apex(), count);
    Ok(count)
}

fn verify<C, D>(chain: &C, apex: D) -> Result<usize, Error>
where
    C: DenialChain + ?Sized,
    D: std::fmt::Display,
{
    let mut count = 0;
    for key in chain.candidates() {
        let current = chain.current(&key);
        if !chain.is_member(&key)? {
            if current.is_some() {
                warn!("Zone {}: stray {} record at {}", apex, chain.rr_type(), key);
                return Err(Error::InconsistentChain);
            }
            continue;
        }
        let next = chain.next_member(&key)?.ok_or(Error::InconsistentChain)?;
        if chain.prev_member(&next)?.as_ref() != Some(&key) {
            warn!(
                "Zone {}: {} chain does not lead back from {} to {}",
                apex,
                chain.rr_type(),
                next,
                key
            );
            return Err(Error::InconsistentChain);
        }
        let desired = chain.desired(&key, &next)?;
        match current {
            Some(rrset) if rrset.rdatas == [desired] => count += 1,
            _ => {
                warn!("Zone {}: wrong or missing {} record at {}", apex, chain.rr_type(), key);
                return Err(Error::InconsistentChain);
            }
        }
    }
    Ok(count)
}
