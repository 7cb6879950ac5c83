// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! marl - command line driver for the Marl scripting runtime
//!
//! ## Modes
//!
//! - `marl NAME` imports module `NAME` from the search path
//! - `marl -e SOURCE` runs source text in the `__main__` module
//! - `marl` or `marl -i` starts the interactive REPL

mod loader;
mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use marl_vm::{Configuration, VERSION};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::loader::FsLoader;

/// Module receiving `-e` source and REPL input
pub const MAIN_MODULE: &str = "__main__";

#[derive(Parser, Debug)]
#[command(
    name = "marl",
    about = "Run Marl modules",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Module to import and run, e.g. `app.main`
    module: Option<String>,

    /// Add a directory to the module search path
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Run source text in the __main__ module
    #[arg(short = 'e', long = "eval", value_name = "SOURCE")]
    eval: Option<String>,

    /// Start the REPL after running
    #[arg(short = 'i', long = "interactive", alias = "repl")]
    interactive: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Collect garbage before every allocation
    #[arg(long)]
    stress_gc: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}: {:#}", "Error".red().bold(), error);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "marl=debug,marl_vm=debug"
    } else {
        "marl=warn,marl_vm=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let search_path = loader::search_path(&cli.include, std::env::var_os("MARL_PATH").as_deref());
    debug!("Module search path: {:?}", search_path);

    let config = Configuration::new().with_stress_gc(cli.stress_gc);
    let mut vm = FsLoader::new(search_path).into_vm(config);

    if let Some(name) = &cli.module {
        vm.import(name)
            .with_context(|| format!("failed to run module '{}'", name))?;
    }

    if let Some(source) = &cli.eval {
        let value = vm.interpret(MAIN_MODULE, source)?;
        if !value.is_null() {
            println!("{}", vm.stringify(&value));
        }
    }

    if cli.interactive || (cli.module.is_none() && cli.eval.is_none()) {
        repl::Repl::new(vm)
            .context("failed to initialize REPL")?
            .run()?;
    }

    Ok(())
}
