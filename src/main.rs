//! Cinnabar CLI
//!
//! Loads serialized program images, runs them, and renders disassembly.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cinnabar::bytecode::Program;
use cinnabar::{Interpreter, InterpreterConfig, VERSION};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cinnabar")]
#[command(author, version, about = "A register-based JavaScript bytecode interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program image
    Run {
        /// The program image to execute
        file: PathBuf,

        /// Register-arena size in tagged words
        #[arg(long)]
        stack_slots: Option<usize>,

        /// Hotness budget before inline caches are allocated
        #[arg(long)]
        hotness: Option<i32>,
    },

    /// Disassemble a program image
    Dis {
        /// The program image to disassemble
        file: PathBuf,
    },

    /// Dump a program image as JSON
    Json {
        /// The program image to dump
        file: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_program(path: &Path) -> Result<Program> {
    let bytes =
        fs::read(path).with_context(|| format!("reading program image {}", path.display()))?;
    Program::from_bytes(&bytes)
        .with_context(|| format!("decoding program image {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(version = VERSION, "cinnabar starting");

    match cli.command {
        Commands::Run {
            file,
            stack_slots,
            hotness,
        } => {
            let program = load_program(&file)?;
            let mut config = InterpreterConfig::new();
            if let Some(slots) = stack_slots {
                config = config.with_stack_slots(slots);
            }
            if let Some(threshold) = hotness {
                config = config.with_hotness_threshold(threshold);
            }
            let mut interpreter = Interpreter::with_config(program, config)?;
            let result = interpreter.run()?;
            println!("{}", interpreter.describe(result));
        }
        Commands::Dis { file } => {
            let program = load_program(&file)?;
            print!("{}", program.disassemble());
        }
        Commands::Json { file } => {
            let program = load_program(&file)?;
            let json = serde_json::to_string_pretty(&program)
                .context("serializing program image to JSON")?;
            println!("{}", json);
        }
    }

    Ok(())
}
