use anyhow::{Context, Result};
use clap::Parser;

use pdf_batcher::cli::{Args, Command};
use pdf_batcher::compress;
use pdf_batcher::config::Settings;
use pdf_batcher::{run_all, run_compress, run_merge, RunLog};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG still wins when set
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    let settings = Settings::from_command(&args.command).context("Invalid arguments")?;
    let compressor = compress::from_settings(&settings.engine);
    log::info!("Using {} compressor", compressor.name());

    let compressor = compressor.as_ref();
    let mut run_log = RunLog::open(&settings.log_path, args.command.name());

    match args.command {
        Command::Compress(_) => {
            run_compress(&settings, compressor, &mut run_log)?;
        }
        Command::Merge(_) => {
            let summary = run_merge(&settings, compressor, &mut run_log)?;
            if summary.artifacts.is_empty() {
                println!("No merged files were produced");
            }
        }
        Command::Run(_) => {
            let summary = run_all(&settings, compressor, &mut run_log)?;
            println!(
                "Compressed {} files ({} failed), wrote {} merged files",
                summary.compress.compressed,
                summary.compress.failed,
                summary.merge.artifacts.len()
            );
        }
    }
    Ok(())
}
