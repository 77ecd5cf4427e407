//! Command line driver for the lifter.
//!
//! `rtl-lift lift` prints the RTL of an AArch32 listing or of raw x86-64
//! machine code; `rtl-lift plt` resolves the PLT entries of an x86-64 ELF
//! image. Both finish with the scan session report. `rtl-lift intrinsics`
//! lists the intrinsic catalog.

use bumpalo::Bump;
use clap::{Parser, Subcommand};
use rtl_lift::core::{IntrinsicCatalog, IntrinsicKind, LiftOptions, ScanSession};
use rtl_lift::{Arm32Lifter, Architecture, RtlCluster, StubLifter};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Do not keep samples of unimplemented instructions.
    #[arg(long, global = true)]
    no_samples: bool,

    /// Maximum number of unimplemented-instruction samples to keep.
    #[arg(long, default_value_t = 100, global = true)]
    max_samples: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lift instructions and print their RTL.
    Lift {
        /// Input file, or `-` for stdin. A listing for arm32, raw code for x86-64.
        input: PathBuf,

        #[arg(short, long, default_value = "arm32")]
        arch: Architecture,

        /// Address of the first byte of raw code.
        #[arg(long, default_value = "0", value_parser = parse_address)]
        base: u64,
    },
    /// Resolve the PLT entries of an x86-64 ELF image.
    Plt {
        image: PathBuf,
    },
    /// List the intrinsics the lifter can emit.
    Intrinsics {
        /// Show only the intrinsic with this base name (`vbic`, `sqrtf`...).
        base: Option<String>,
    },
}

fn parse_address(s: &str) -> Result<u64, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid address {s}: {e}"))
}

fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read(path)
    }
}

fn print_intrinsics(base: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = IntrinsicCatalog::global();
    let mut kinds: Vec<IntrinsicKind> = match base {
        Some(base) => vec![catalog
            .lookup(base)
            .ok_or_else(|| format!("unknown intrinsic {base}"))?],
        None => catalog.kinds().collect(),
    };
    kinds.sort_by_key(|kind| kind.info().base);
    for kind in kinds {
        let info = kind.info();
        let arity = info.arity.map_or_else(|| "*".to_string(), |n| n.to_string());
        let effects = if info.pure { "pure" } else { "memory" };
        println!("{:<12} args={arity:<2} {effects}", info.base);
    }
    Ok(())
}

fn print_clusters(clusters: &[RtlCluster]) {
    for cluster in clusters {
        print!("{cluster}");
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Command::Intrinsics { base } = &args.command {
        return print_intrinsics(base.as_deref());
    }

    let arena = Bump::new();
    let options = LiftOptions {
        keep_samples: !args.no_samples,
        max_samples: args.max_samples,
    };
    let session = ScanSession::with_options(&arena, options);

    match args.command {
        Command::Lift { input, arch, base } => {
            let data = read_input(&input)?;
            match arch {
                Architecture::Arm32 => {
                    let lifter = Arm32Lifter::new()?;
                    let text = String::from_utf8(data)?;
                    let instrs = lifter.parse_listing(&text)?;
                    print_clusters(&lifter.lift_all(&session, &instrs));
                }
                Architecture::X86_64 => {
                    let lifter = StubLifter::new()?;
                    print_clusters(&lifter.lift_all(&session, &data, base));
                }
                other => return Err(format!("no instruction lifter for {other}").into()),
            }
        }
        Command::Plt { image } => {
            let data = read_input(&image)?;
            for entry in rtl_lift::walk_plt(&data, Some(&session))? {
                println!("{entry}");
            }
        }
        Command::Intrinsics { .. } => {}
    }

    print!("{}", session.report());
    if session.stats().faults > 0 {
        return Err("rewriter contract violations occurred".into());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
