use clap::Parser;
use rpm_pack::{Result, RpmFile, RpmInfo};
use std::path::PathBuf;
use std::process::exit;

#[derive(Debug, Parser)]
#[command(name = "rpm-info")]
struct Args {
    /// Path to rpm file
    #[arg(name = "path")]
    path: PathBuf,

    /// Show internal debug information
    #[arg(long = "debug", short = 'd')]
    debug: bool,

    /// Recompute and check the stored digests
    #[arg(long = "verify")]
    verify: bool,
}

fn run(args: Args) -> Result<()> {
    let mut file = RpmFile::open(args.path)?;
    let info: RpmInfo = (&file).into();

    if args.verify {
        file.verify_digests()?;
        println!("digests OK");
    }

    if args.debug {
        println!("{:#?}", file.signature_tags);
        println!("{:#?}", file.header_tags);
        println!("{:#?}", info);
    } else {
        println!("{}", info);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(err) = run(args) {
        eprintln!("{}", err);
        exit(1);
    }
}
