use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use z80asm::{
    assembler::{assemble, AssemblerConfig, DEFAULT_MAX_LINES},
    disassembler::{self, listing::Listing},
    hexdump::{hexdump, hexdump_words},
    instrumentation,
    linker::{
        self, LinkerConfig, DEFAULT_ENTRY, DEFAULT_MAX_FILES, DEFAULT_MAX_GLOBALS,
        DEFAULT_MAX_LABELS, DEFAULT_START_ADDRESS,
    },
    object,
};

#[derive(Parser)]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[clap(long)]
    #[clap(help = "Enable chrome tracing")]
    #[clap(long_help = "Enable chrome tracing which on program exit will generate
a json file to be opened with a chrome tracing compatible
viewer.")]
    trace: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    #[clap(help = "Log more, repeat for more detail")]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[clap(about = "Assemble a source file into an object file")]
    #[clap(aliases = &["a", "asm"])]
    Assemble(AssembleArgs),
    #[clap(about = "Print the source or a listing of an object file")]
    #[clap(aliases = &["d", "dis"])]
    Disassemble(DisassembleArgs),
    #[clap(about = "Link object files into a binary image")]
    #[clap(aliases = &["l", "ld"])]
    Link(LinkArgs),
    #[clap(about = "Hexdump a binary image")]
    Dump(DumpArgs),
}

#[derive(Args)]
struct AssembleArgs {
    #[clap(help = "Source file")]
    input: PathBuf,
    #[clap(short, long)]
    #[clap(help = "Object file, defaults to the input with an .x extension")]
    output: Option<PathBuf>,
    #[clap(long, default_value_t = DEFAULT_MAX_LINES)]
    #[clap(help = "Maximum number of lines in a module")]
    max_lines: usize,
    #[clap(long)]
    #[clap(help = "Check that every line disassembles back to the same record")]
    verify: bool,
}

#[derive(Args)]
struct DisassembleArgs {
    #[clap(help = "Object file")]
    input: PathBuf,
    #[clap(short, long)]
    #[clap(help = "Print addresses, bytes and cycle counts")]
    listing: bool,
    #[clap(long, value_parser = parse_address, default_value = "0x8000")]
    #[clap(help = "Address of the first line in the listing")]
    start: u16,
}

#[derive(Args)]
struct LinkArgs {
    #[clap(required = true)]
    #[clap(help = "Object files or directories of object files")]
    inputs: Vec<PathBuf>,
    #[clap(short, long)]
    #[clap(help = "Image file, defaults to the entry module without extension")]
    output: Option<PathBuf>,
    #[clap(short, long)]
    #[clap(help = "Write a map file")]
    map: bool,
    #[clap(long, value_parser = parse_address, default_value_t = DEFAULT_START_ADDRESS)]
    #[clap(help = "Load address unless a module has an org")]
    start: u16,
    #[clap(long, default_value = DEFAULT_ENTRY)]
    #[clap(help = "Global label of the entry point")]
    entry: String,
    #[clap(long, default_value = "lib")]
    #[clap(help = "Directory searched by +name includes")]
    system_dir: PathBuf,
    #[clap(long, default_value_t = DEFAULT_MAX_LABELS)]
    max_labels: usize,
    #[clap(long, default_value_t = DEFAULT_MAX_GLOBALS)]
    max_globals: usize,
    #[clap(long, default_value_t = DEFAULT_MAX_FILES)]
    max_files: usize,
}

#[derive(Args)]
struct DumpArgs {
    #[clap(help = "Binary image")]
    input: PathBuf,
    #[clap(long, value_parser = parse_address, default_value = "0x8000")]
    #[clap(help = "Load address of the image")]
    start: u16,
    #[clap(short, long)]
    #[clap(help = "Dump little-endian words like hexdump(1)")]
    words: bool,
}

/// Accepts `32768`, `0x8000` or `$8000`.
fn parse_address(text: &str) -> Result<u16, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix('$')) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("bad address {}: {}", text, e))
}

fn assemble_file(args: &AssembleArgs) -> Result<()> {
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Unable to read {}", args.input.display()))?;
    let config = AssemblerConfig {
        max_lines: args.max_lines,
        ..AssemblerConfig::default()
    };
    let program = assemble(&source, &config)
        .with_context(|| format!("Assembly of {} failed", args.input.display()))?;
    if args.verify {
        disassembler::verify(&program, &config).with_context(|| "Verification failed")?;
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("x"));
    object::save(&program, &output)
        .with_context(|| format!("Unable to write {}", output.display()))?;
    eprintln!("Wrote {}", output.display());

    Ok(())
}

fn read_object(path: &Path) -> Result<z80asm::assembler::Program> {
    object::read(path).with_context(|| format!("Unable to load {}", path.display()))
}

fn disassemble_file(args: &DisassembleArgs) -> Result<()> {
    let program = read_object(&args.input)?;
    if args.listing {
        let mut listing = Listing::new(&program, args.start);
        print!("{}", listing.generate()?);
    } else {
        for line in disassembler::disassemble(&program)? {
            println!("{}", line);
        }
    }

    Ok(())
}

fn link_files(args: &LinkArgs) -> Result<()> {
    let config = LinkerConfig {
        start_address: args.start,
        entry: args.entry.clone(),
        max_labels: args.max_labels,
        max_globals: args.max_globals,
        max_files: args.max_files,
        system_dir: args.system_dir.clone(),
        output: args.output.clone(),
        map: args.map,
    };
    let output = linker::link(&args.inputs, config).with_context(|| "Link failed")?;

    eprintln!(
        "Wrote {} ({} bytes at ${:04x} from {} modules)",
        output.image.display(),
        output.size,
        output.start_address,
        output.modules
    );
    if let Some(map) = output.map {
        eprintln!("Wrote {}", map.display());
    }

    Ok(())
}

fn dump_file(args: &DumpArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Unable to read {}", args.input.display()))?;
    if args.words {
        println!("{}", hexdump_words(&bytes, 7, 16));
    } else {
        print!("{}", hexdump(&bytes, args.start, 16));
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _trace_guard = instrumentation::init(cli.verbose, cli.trace);

    match &cli.command {
        Command::Assemble(args) => assemble_file(args),
        Command::Disassemble(args) => disassemble_file(args),
        Command::Link(args) => link_files(args),
        Command::Dump(args) => dump_file(args),
    }
}
