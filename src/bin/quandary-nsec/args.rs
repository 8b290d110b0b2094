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

//! Implements command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Builds and repairs NSEC and NSEC3 chains of DNS zones
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the denial chain of a zone from scratch
    Build(ConfigArgs),

    /// Build the denial chain of a zone, then apply the configured
    /// update and repair the chain incrementally
    Fix(ConfigArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    /// Set the configuration file describing the zone
    #[clap(long, value_name = "FILE")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_subcommand_takes_config_path() {
        let args = Args::try_parse_from(["quandary-nsec", "fix", "--config", "zone.toml"]).unwrap();
        match args.command {
            Command::Fix(fix_args) => assert_eq!(fix_args.config, PathBuf::from("zone.toml")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn config_is_required() {
        assert!(Args::try_parse_from(["quandary-nsec", "build"]).is_err());
    }
}
