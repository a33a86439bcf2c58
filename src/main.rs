// blerg: a bytecode-compiled interpreter for a small dynamically typed
// scripting language.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use blerg::value::Thing;
use blerg::vm::Runtime;

/// blerg: run a `.blg` script, or exercise the bundled test fixtures.
#[derive(Parser, Debug)]
#[command(name = "blerg", about = "A bytecode-compiled interpreter for blerg scripts")]
struct Cli {
    /// Run the bundled `tests/fixtures/*.blg` scripts and report pass/fail.
    #[arg(long)]
    test: bool,

    /// Increase logging verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to a `.blg` script to run.
    path: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.test {
        return if run_fixtures() { ExitCode::SUCCESS } else { ExitCode::FAILURE };
    }

    let Some(path) = cli.path else {
        eprintln!("error: no script path given");
        return ExitCode::FAILURE;
    };

    match run_script(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Mirrors `execFunc`: compile, run `$init`, then look up and call the
/// module's `main` export with `none`. Errors are rendered with a full
/// traceback; the two "no main" cases are plain messages with none.
fn run_script(path: &Path) -> Result<(), String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    let module = blerg::compile::compile(&source, Some(path.display().to_string())).map_err(|e| e.to_string())?;

    let mut rt = Runtime::new(executable_dir());
    let global = rt.execute_module(module).map_err(|e| e.render_trace())?;

    let fields = match global {
        Thing::Module(fields) => fields,
        _ => return Err("global scope is not an object".to_string()),
    };

    let main = fields.get("main").cloned().ok_or_else(|| "function not found".to_string())?;
    rt.call_function(&main, &[Thing::None]).map(|_| ()).map_err(|e| e.render_trace())
}

/// Runs every `tests/fixtures/*.blg` script through `run_script`,
/// printing a PASS/FAIL line per file. Mirrors the `blg_tests/` scan in
/// the original test driver.
fn run_fixtures() -> bool {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(read_dir) => read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "blg").unwrap_or(false))
            .collect(),
        Err(e) => {
            eprintln!("error: could not read '{}': {}", dir.display(), e);
            return false;
        }
    };
    entries.sort();

    let mut all_passed = true;
    for path in entries {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        match run_script(&path) {
            Ok(()) => println!("PASS {}", name),
            Err(message) => {
                println!("FAIL {}: {}", name, message);
                all_passed = false;
            }
        }
    }
    all_passed
}
