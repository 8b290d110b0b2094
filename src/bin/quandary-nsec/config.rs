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

//! Implements the zone configuration file.
//!
//! A configuration file describes one zone and, optionally, an update
//! to it:
//!
//! ```toml
//! [zone]
//! name = "example."
//! ttl = 300
//!
//! [zone.nsec3]
//! iterations = 0
//! salt = "aabbccdd"
//! opt_out = false
//!
//! [[zone.records]]
//! owner = "www.example."
//! type = "A"
//! ttl = 3600
//! rdata = '\# 4 c0000201'
//!
//! [update]
//! add = [{ owner = "mail.example.", type = "A", ttl = 3600, rdata = '\# 4 c0000202' }]
//! remove = []
//! ```
//!
//! RDATA is given in the generic encoding of RFC 3597.

use std::fmt::{self, Write};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use data_encoding::HEXLOWER_PERMISSIVE;
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use quandary_nsec::name::Name;
use quandary_nsec::rr::{Nsec3Param, Rdata, Type, NSEC3_HASH_SHA1};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;
    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Zone:    {}\n\
         Records: {}\n\
         Chain:   ",
        config.zone.name.0,
        config.zone.records.len(),
    );
    match config.zone.nsec3 {
        Some(ref nsec3) => write!(
            message,
            "NSEC3 ({} iterations, opt-out {})",
            nsec3.iterations, nsec3.opt_out,
        )
        .unwrap(),
        None => message.push_str("NSEC"),
    }
    if let Some(ref update) = config.update {
        write!(
            message,
            "\nUpdate:  {} to add, {} to remove",
            update.add.len(),
            update.remove.len(),
        )
        .unwrap();
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub zone: ZoneConfig,
    pub update: Option<UpdateConfig>,
}

/// The configuration of the zone.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: ConfigName,

    /// The TTL of denial records. If unset, it is derived from the SOA
    /// record.
    pub ttl: Option<u32>,
    pub nsec3: Option<Nsec3Config>,
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

/// The NSEC3 parameters. Either `salt` (in hexadecimal) or
/// `salt_length` (for a random salt) may be given, but not both.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Nsec3Config {
    #[serde(default)]
    pub iterations: u16,
    pub salt: Option<String>,
    pub salt_length: Option<u8>,
    #[serde(default)]
    pub opt_out: bool,
}

impl Nsec3Config {
    /// Produces the NSEC3 parameters.
    pub fn params(&self) -> Result<Nsec3Param> {
        match (&self.salt, self.salt_length) {
            (Some(_), Some(_)) => Err(anyhow!("only one of salt and salt_length may be given")),
            (Some(salt), None) => {
                let salt = if salt == "-" {
                    Vec::new()
                } else {
                    HEXLOWER_PERMISSIVE
                        .decode(salt.as_bytes())
                        .context("the NSEC3 salt is not valid hexadecimal")?
                };
                Ok(Nsec3Param {
                    algorithm: NSEC3_HASH_SHA1,
                    flags: 0,
                    iterations: self.iterations,
                    salt,
                })
            }
            (None, length) => Ok(Nsec3Param::with_random_salt(
                self.iterations,
                length.unwrap_or(0),
            )),
        }
    }
}

/// A single record.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordConfig {
    pub owner: ConfigName,
    #[serde(rename = "type")]
    pub rr_type: ConfigType,
    pub ttl: u32,
    pub rdata: ConfigRdata,
}

/// An update to apply to the zone after its chain is first built.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConfig {
    #[serde(default)]
    pub add: Vec<RecordConfig>,
    #[serde(default)]
    pub remove: Vec<RecordConfig>,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER QUANDARY-NSEC TYPES FOR SERDE                        //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`quandary_nsec`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over a
        /// [`quandary_nsec`] type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigType, Type, "record type");
make_serde_wrapper!(ConfigRdata, Rdata, "RDATA");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
