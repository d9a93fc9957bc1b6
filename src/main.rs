use std::process::ExitCode;

use clap::Parser;
use ton_vanity_gen::error::SearchError;
use ton_vanity_gen::{RawArgs, SearchConfig};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = RawArgs::parse();

    let config = match SearchConfig::try_from(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };

    match ton_vanity_gen::run_search(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err @ SearchError::Config(_)) => {
            eprintln!("invalid configuration: {err}");
            ExitCode::from(2)
        }
        Err(err @ SearchError::Setup(_) | err @ SearchError::Ocl(_)) => {
            eprintln!("setup error: {err}");
            ExitCode::from(3)
        }
        Err(err @ SearchError::Io(_)) => {
            eprintln!("result sink error: {err}");
            ExitCode::from(4)
        }
        Err(err @ SearchError::Validation { .. }) => {
            eprintln!("fatal: {err}");
            ExitCode::from(5)
        }
    }
}
