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

//! Implements the `build` and `fix` commands.

use std::fmt::Write;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{error, info};

use quandary_nsec::rr::{Ttl, Type};
use quandary_nsec::update::{UpdateFlags, ZoneUpdate};
use quandary_nsec::zone::Zone;

use crate::config::{self, Config, RecordConfig};

/// Runs a command. With `fix`, the configured update is applied after
/// the chain is first built, and the chain is then repaired
/// incrementally.
pub fn run(config_path: PathBuf, fix: bool) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(config_path, fix) {
        let mut message = String::from("Failed to run:");
        for (i, cause) in e.chain().enumerate() {
            write!(message, "\n[{}] {}", i + 1, cause).unwrap();
        }
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(config_path: PathBuf, fix: bool) -> Result<()> {
    info!("Loading the configuration from {}.", config_path.display());
    let config =
        config::load_from_path(&config_path).context("failed to load the configuration")?;
    let ttl = config.zone.ttl.map(Ttl::from);
    let opt_out = config.zone.nsec3.as_ref().map_or(false, |nsec3| nsec3.opt_out);

    let zone = Zone::new(config.zone.name.0.clone());
    load_zone(&zone, &config, ttl, opt_out).context("failed to load the zone")?;
    let contents = zone.snapshot();
    let count = contents
        .verify_chain()
        .context("the built chain failed verification")?;
    info!("Zone {}: chain of {} records built.", zone.name(), count);

    if !fix {
        return Ok(());
    }
    let update_config = match config.update {
        Some(ref update_config) => update_config,
        None => {
            info!("No update is configured; nothing to fix.");
            return Ok(());
        }
    };

    let mut update = ZoneUpdate::begin(&zone, UpdateFlags::INCREMENTAL | UpdateFlags::DIFF)
        .context("failed to begin the update")?;
    for record in &update_config.remove {
        let removed = update
            .remove_record(&record.owner.0, record.rr_type.0, record.rdata.0.octets())
            .with_context(|| format!("failed to remove a record at {}", record.owner.0))?;
        if !removed {
            info!("No {} record at {} to remove.", record.rr_type.0, record.owner.0);
        }
    }
    add_records(&mut update, &update_config.add)?;
    update
        .fix_denial_chain(ttl, opt_out)
        .context("failed to fix the chain")?;
    if let Some(diff) = update.diff() {
        print!("{}", diff);
    }
    let contents = update.commit().context("failed to commit the update")?;
    let count = contents
        .verify_chain()
        .context("the fixed chain failed verification")?;
    info!("Zone {}: chain of {} records fixed.", zone.name(), count);
    Ok(())
}

/// Loads the configured records into `zone` and builds its chain. The
/// chain changes are printed.
fn load_zone(zone: &Zone, config: &Config, ttl: Option<Ttl>, opt_out: bool) -> Result<()> {
    let mut update = ZoneUpdate::begin(zone, UpdateFlags::FULL)?;
    add_records(&mut update, &config.zone.records)?;
    if let Some(ref nsec3) = config.zone.nsec3 {
        let params = nsec3.params()?;
        info!("Zone {}: NSEC3 parameters are {}.", zone.name(), params);
        let rdata = params.to_rdata()?;
        let param_ttl = ttl.unwrap_or_else(|| Ttl::from(0));
        update.add_record(zone.name(), Type::NSEC3PARAM, param_ttl, rdata.octets())?;
    }
    let changeset = update
        .fix_denial_chain(ttl, opt_out)
        .context("failed to build the chain")?;
    print!("{}", changeset);
    update.commit()?;
    Ok(())
}

fn add_records(update: &mut ZoneUpdate, records: &[RecordConfig]) -> Result<()> {
    for record in records {
        update
            .add_record(
                &record.owner.0,
                record.rr_type.0,
                Ttl::from(record.ttl),
                record.rdata.0.octets(),
            )
            .with_context(|| format!("failed to add a record at {}", record.owner.0))?;
    }
    Ok(())
}
