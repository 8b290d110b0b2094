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

//! A command-line tool that builds and repairs the NSEC or NSEC3 chain
//! of a zone described in a configuration file, printing the resulting
//! record changes.

mod args;
mod config;
mod run;

use args::Command;

fn main() {
    let args = args::parse();
    match args.command {
        Command::Build(build_args) => run::run(build_args.config, false),
        Command::Fix(fix_args) => run::run(fix_args.config, true),
    }
}
