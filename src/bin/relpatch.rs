use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relpatch::cli::{self, to_u32, Width};
use relpatch::{link_to_file, open_store, ModuleOptions, RelError, RelModule};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser)]
#[command(name = "relpatch", about = "Inspect and patch GameCube/Wii REL modules")]
struct Args {
    /// Staging buffer size used when section bytes are copied
    #[arg(long, global = true, value_parser = to_u32)]
    copy_buffer: Option<u32>,

    /// Log as JSON objects instead of plain text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header, section table and imports
    Info { file: PathBuf },
    /// Find relocations pointing at, or up to TOLERANCE bytes before, a section offset
    Find {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        section: u32,
        #[arg(value_parser = to_u32)]
        offset: u32,
        #[arg(short, long, default_value = "0", value_parser = to_u32)]
        tolerance: u32,
    },
    /// Write values into a section
    Write {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        section: u32,
        #[arg(value_parser = to_u32)]
        offset: u32,
        /// 8, 16 or 32
        #[arg(value_parser = to_u32)]
        width: u32,
        #[arg(required = true, value_parser = to_u32)]
        values: Vec<u32>,
    },
    /// Write values relative to the start of the relocation table
    WriteRelocations {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        offset: u32,
        #[arg(value_parser = to_u32)]
        width: u32,
        #[arg(required = true, value_parser = to_u32)]
        values: Vec<u32>,
    },
    /// Copy a section to the end of the file and point the section table at the copy
    Move {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        section: u32,
    },
    /// Set the size of a section
    Resize {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        section: u32,
        #[arg(value_parser = to_u32)]
        size: u32,
    },
    /// Grow a section
    Expand {
        file: PathBuf,
        #[arg(value_parser = to_u32)]
        section: u32,
        #[arg(value_parser = to_u32)]
        amount: u32,
        /// Pad the current size to a multiple of 4 first
        #[arg(long)]
        rounded: bool,
    },
    /// Apply the module's relocations against itself into a new file
    Link { input: PathBuf, output: PathBuf },
}

fn open(path: &Path, options: &ModuleOptions) -> Result<RelModule<File>> {
    if !cli::is_rel_path(path) {
        bail!("{} is not a .rel file", path.display());
    }
    let store = open_store(path)?;
    RelModule::open_with(store, options.clone())
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn report_skip(section: u32) {
    warn!("{}, nothing written", RelError::InvalidSectionId(section));
}

fn width(bits: u32) -> Result<Width> {
    match Width::from_bits(bits) {
        Some(width) => Ok(width),
        None => bail!("width must be 8, 16 or 32, not {}", bits),
    }
}

fn run(args: Args) -> Result<()> {
    let mut options = ModuleOptions::default();
    if let Some(size) = args.copy_buffer {
        options.copy_buffer_size = size as usize;
    }

    match args.command {
        Command::Info { file } => {
            let module = open(&file, &options)?;
            print!("{}", cli::describe(&module));
        }
        Command::Find {
            file,
            section,
            offset,
            tolerance,
        } => {
            let mut module = open(&file, &options)?;
            if let Some(problem) = cli::query_problem(&module, section, offset) {
                bail!(problem);
            }
            let matches = module.find_pointers(section, offset, tolerance)?;
            println!("Results: {}", matches.len());
            for found in &matches {
                println!();
                print!("{}", cli::describe_match(found, offset));
            }
        }
        Command::Write {
            file,
            section,
            offset,
            width: bits,
            values,
        } => {
            let mut module = open(&file, &options)?;
            match cli::write_values(&mut module, section, offset, width(bits)?, &values)? {
                Some(address) => println!("Wrote {} value(s) at {:#x}", values.len(), address),
                None => report_skip(section),
            }
        }
        Command::WriteRelocations {
            file,
            offset,
            width: bits,
            values,
        } => {
            let mut module = open(&file, &options)?;
            let address =
                cli::write_relocation_values(&mut module, offset, width(bits)?, &values)?;
            println!("Wrote {} value(s) at {:#x}", values.len(), address);
        }
        Command::Move { file, section } => {
            let mut module = open(&file, &options)?;
            match module.move_section_to_end(section)? {
                Some(offset) => println!("Section {} now starts at {:#x}", section, offset),
                None => report_skip(section),
            }
        }
        Command::Resize {
            file,
            section,
            size,
        } => {
            let mut module = open(&file, &options)?;
            match module.resize_section_unsafe(section, size)? {
                Some(size) => println!("Section {} is now {:#x} bytes", section, size),
                None => report_skip(section),
            }
        }
        Command::Expand {
            file,
            section,
            amount,
            rounded,
        } => {
            let mut module = open(&file, &options)?;
            let resized = if rounded {
                module.expand_section_unsafe_rounded(section, amount)?
            } else {
                module.expand_section_unsafe(section, amount)?
            };
            match resized {
                Some(size) => println!("Section {} is now {:#x} bytes", section, size),
                None => report_skip(section),
            }
        }
        Command::Link { input, output } => {
            if !cli::is_rel_path(&input) {
                bail!("{} is not a .rel file", input.display());
            }
            let stats = link_to_file(&input, &output, options)
                .with_context(|| format!("Failed to link {}", input.display()))?;
            println!(
                "Applied {} relocation(s) from {} import(s), skipped {}; wrote {}",
                stats.applied,
                stats.imports,
                stats.skipped,
                output.display()
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.json_logs {
        relpatch::logging::init_tracing_json();
    } else {
        relpatch::logging::init_tracing();
    }
    run(args)
}
