use clap::Parser;

use lading::args::{Command, Step};
use lading::error;

fn main() {
    let res = run();
    error::exit(res)
}

fn run() -> Result<(), error::CliError> {
    let Command::Lading(ref opt) = Command::parse();

    let mut builder = get_logging(opt.logging.log_level());
    builder.init();

    match &opt.step {
        Step::Bump(args) => args.run(),
        Step::Publish(args) => args.run(),
    }
}

pub fn get_logging(level: log::Level) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter(None, level.to_level_filter());
    builder.format_timestamp_secs().format_module_path(false);
    builder
}
