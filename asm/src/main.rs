use std::fs;
use std::path::PathBuf;

use clap::Parser;
use color_print::ceprintln;

use ironasm::error::Error;
use ironasm::{assemble, disasm, link, parse, translate};

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(version, about, help_template = HELP_TEMPLATE)]
struct Args {
    /// Input file
    input: PathBuf,

    /// Output file (defaults to the input with an .iexe or .iasm extension)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Input is already canonical direct assembly; skip translation
    #[clap(long)]
    skip_translation: bool,

    /// Emit canonical direct assembly instead of a binary image
    #[clap(long)]
    direct_assembly: bool,

    /// Disassemble a binary image back into text
    #[clap(short, long)]
    disassemble: bool,

    /// Write a YAML map of block and string addresses next to the output
    #[clap(long)]
    map: bool,

    /// Add address and raw-byte columns to disassembly output
    #[clap(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        ceprintln!("<r,s>error</>: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Error> {
    println!("IronArc Assembler");

    if args.disassemble {
        println!("1. Read Image");
        println!("  < {}", args.input.display());
        let image = fs::read(&args.input)?;

        println!("2. Disassemble");
        let text = disasm::disassemble_program(&image, args.verbose, args.verbose)?;

        let output = output_path(args, "iasm");
        println!("  > {}", output.display());
        fs::write(&output, text)?;
        return Ok(());
    }

    println!("1. Read and Translate");
    println!("  < {}", args.input.display());
    let source = fs::read_to_string(&args.input)?;
    let lines: Vec<String> = source.lines().map(|l| l.trim().to_string()).collect();
    let canonical = if args.skip_translation {
        lines
    } else {
        translate::translate(&lines)?
    };

    if args.direct_assembly {
        // direct assembly always carries the .iasm extension
        let output = output_path(args, "iasm").with_extension("iasm");
        println!("  > {}", output.display());
        fs::write(&output, canonical.join("\n") + "\n")?;
        return Ok(());
    }

    println!("2. Parse");
    let parsed = parse::parse_file(&canonical)?;

    println!("3. Assemble");
    let assembled = assemble::assemble_file(&parsed)?;

    println!("4. Link");
    let image = link::link_file(&assembled, &parsed.string_table)?;

    let output = output_path(args, "iexe");
    println!("  > {}", output.display());
    fs::write(&output, &image)?;

    if args.map {
        let layout = link::compute_layout(&assembled, &parsed.string_table);
        let map_path = output.with_extension("map.yml");
        println!("  > {}", map_path.display());
        fs::write(&map_path, serde_yaml::to_string(&layout)?)?;
    }
    Ok(())
}

fn output_path(args: &Args, extension: &str) -> PathBuf {
    match &args.output {
        Some(path) => path.clone(),
        None => args.input.with_extension(extension),
    }
}
