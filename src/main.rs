use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use c2hat_server::{config, server, signals};

#[derive(Parser, Debug)]
#[clap(version, author, about = "c2hat-server runs a TLS-secured group chat daemon")]
struct Args {
    #[clap(short, long, action, help = "a toml file containing server configuration")]
    config_file: String,
    #[clap(short, long, action, help = "the file to write logs to")]
    log_file: Option<String>,
    #[clap(short, long, action = clap::ArgAction::Count,
           help = "show more in logs, may be provided multiple times")]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter_level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                message,
            ));
        })
        .level(log::LevelFilter::Warn)
        .level_for("c2hat_server", filter_level);

    match args.log_file {
        Some(log_file) => dispatch
            .chain(fern::log_file(log_file).context("prepping log file")?)
            .apply()?,
        None => dispatch.chain(std::io::stderr()).apply()?,
    }

    let raw_config = fs::read_to_string(&args.config_file)
        .with_context(|| format!("reading config file {}", args.config_file))?;
    let parsed_config: config::Config =
        toml::from_str(&raw_config).context("parsing config file")?;

    let term = Arc::new(AtomicBool::new(false));
    signals::install(Arc::clone(&term)).context("installing signal handlers")?;

    server::run(parsed_config, term)
}
