extern crate rustyline;

use anyhow::{bail, Context, Result};
use relpatch::cli::{self, to_u32, Width};
use relpatch::{open_store, ByteStore, RelError, RelModule};
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::env;
use std::path::Path;

const HISTORY: &str = ".relshell_history";

const HELP: &str = "\
info                                   header, sections and imports
find <section> <offset> [tolerance]    relocations pointing at or just before an offset
write8|write16|write32 <section> <offset> <values...>
move <section>                         copy a section to the end of the file
resize <section> <size>
expand <section> <amount> [rounded]
help
quit";

fn numbers(args: &[&str]) -> Result<Vec<u32>> {
    args.iter()
        .map(|arg| to_u32(arg).with_context(|| format!("not a number: {:?}", arg)))
        .collect()
}

fn skipped(section: u32) -> String {
    format!("{}, nothing written", RelError::InvalidSectionId(section))
}

/// Runs one command line. Returns `false` when the session should end.
fn execute<S: ByteStore>(module: &mut RelModule<S>, line: &str) -> Result<bool> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (command, args) = match parts.split_first() {
        Some((command, args)) => (*command, args),
        None => return Ok(true),
    };

    match command {
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "info" => print!("{}", cli::describe(module)),
        "find" => {
            let n = numbers(args)?;
            let (section, offset, tolerance) = match n.as_slice() {
                [section, offset] => (*section, *offset, 0),
                [section, offset, tolerance] => (*section, *offset, *tolerance),
                _ => bail!("usage: find <section> <offset> [tolerance]"),
            };
            if let Some(problem) = cli::query_problem(module, section, offset) {
                bail!(problem);
            }
            let matches = module.find_pointers(section, offset, tolerance)?;
            println!("Results: {}", matches.len());
            for found in &matches {
                println!();
                print!("{}", cli::describe_match(found, offset));
            }
        }
        "write8" | "write16" | "write32" => {
            let bits = to_u32(&command[5..])?;
            let width = Width::from_bits(bits).context("unknown width")?;
            let n = numbers(args)?;
            if n.len() < 3 {
                bail!("usage: {} <section> <offset> <values...>", command);
            }
            match cli::write_values(module, n[0], n[1], width, &n[2..])? {
                Some(address) => println!("Wrote {} value(s) at {:#x}", n.len() - 2, address),
                None => println!("{}", skipped(n[0])),
            }
        }
        "move" => {
            let n = numbers(args)?;
            let section = match n.as_slice() {
                [section] => *section,
                _ => bail!("usage: move <section>"),
            };
            match module.move_section_to_end(section)? {
                Some(offset) => println!("Section {} now starts at {:#x}", section, offset),
                None => println!("{}", skipped(section)),
            }
        }
        "resize" => {
            let n = numbers(args)?;
            let (section, size) = match n.as_slice() {
                [section, size] => (*section, *size),
                _ => bail!("usage: resize <section> <size>"),
            };
            match module.resize_section_unsafe(section, size)? {
                Some(size) => println!("Section {} is now {:#x} bytes", section, size),
                None => println!("{}", skipped(section)),
            }
        }
        "expand" => {
            let rounded = args.last() == Some(&"rounded");
            let args = if rounded { &args[..args.len() - 1] } else { args };
            let n = numbers(args)?;
            let (section, amount) = match n.as_slice() {
                [section, amount] => (*section, *amount),
                _ => bail!("usage: expand <section> <amount> [rounded]"),
            };
            let resized = if rounded {
                module.expand_section_unsafe_rounded(section, amount)?
            } else {
                module.expand_section_unsafe(section, amount)?
            };
            match resized {
                Some(size) => println!("Section {} is now {:#x} bytes", section, size),
                None => println!("{}", skipped(section)),
            }
        }
        _ => bail!("unknown command {:?}, try help", command),
    }
    Ok(true)
}

fn main() -> Result<()> {
    relpatch::logging::init_tracing();

    let path = match env::args().nth(1) {
        Some(path) => path,
        None => bail!("usage: relshell <file.rel>"),
    };
    let path = Path::new(&path);
    if !cli::is_rel_path(path) {
        bail!("{} is not a .rel file", path.display());
    }
    let store = open_store(path)?;
    let mut module = RelModule::open(store)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut rl = Editor::<()>::new();
    if rl.load_history(HISTORY).is_err() {
        println!("No previous history.");
    }
    loop {
        let readline = rl.readline("rel> ");
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str());
                match execute(&mut module, &line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => println!("Error: {:#}", err),
                }
            }
            Err(ReadlineError::Interrupted) => {
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(HISTORY)?;

    Ok(())
}
