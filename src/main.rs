use clap::Parser;
use launchpad::{init_logging, run_cli, Cli};

fn main() {
    init_logging();

    match run_cli(Cli::parse()) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(err) => {
            eprintln!("💥 {} failed", env!("CARGO_PKG_NAME"));
            for cause in err.chain() {
                eprintln!("  Caused by: {cause}");
            }
            std::process::exit(1);
        }
    }
}
