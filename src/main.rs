// This file is part of asmforge, an assembler.
// Copyright (C) 2020 Jeff Sharp
//
// asmforge is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published
// by the Free Software Foundation, either version 3 of the License,
// or (at your option) any later version.
//
// asmforge is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with asmforge.  If not, see <http://www.gnu.org/licenses/>.

#![allow(dead_code)]

mod arch;
mod codegen;
mod diagnostic;
mod lang;
mod mem;
mod semantic;
mod session;
mod text;
mod util;

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use session::assemble_file;

/// The name of the assembler.
pub const PROGRAM_NAME: &str = "asmforge";

/// A two-pass assembler for the 15-bit educational instruction set.
///
/// Each `FILE` argument is a base name: source is read from `FILE.as` and,
/// on success, `FILE.ob` (always) plus `FILE.ent`/`FILE.ext` (when those
/// sections are non-empty) are written alongside it.
#[derive(Parser, Debug)]
#[command(name = PROGRAM_NAME, version, about)]
struct Cli {
    #[arg(required = true)]
    files: Vec<String>,
}

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .expect("logger is initialized exactly once, at startup");

    let cli = Cli::parse();
    let mut any_failed = false;

    for base in &cli.files {
        if !run_one(base) {
            any_failed = true;
        }
    }

    if any_failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// Assembles one base name, logging its outcome. Returns `false` if the
/// file failed to assemble for any reason — a filesystem error or any
/// stage reporting a diagnostic.
fn run_one(base: &str) -> bool {
    info!("assembling {base}.as");

    match assemble_file(base) {
        Ok(session) if session.succeeded() => {
            info!("{base}: wrote {base}.ob");
            true
        }
        Ok(session) => {
            let path = format!("{base}.as");
            eprint!("{}", session.diagnostics.render_all(&path, &session.source));
            error!("{base}: {} error(s)", session.diagnostics.len());
            false
        }
        Err(err) => {
            error!("{err}");
            false
        }
    }
}
