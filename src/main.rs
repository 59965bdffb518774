use std::process;

use anyhow::{ensure, Context, Result};
use clap::Parser;

use bgrems::config::Cli;
use bgrems::pipeline::{process_batch, process_one};
use bgrems::session::SegmentationSession;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help/version go to stdout and exit 0; usage errors exit 1
            let _ = err.print();
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(err) = run(&cli) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let policy = cli.resize_policy();
    let options = cli.removal_options();

    // One session for the whole run; model load dominates per-image cost.
    let session = SegmentationSession::new(&cli.session_config())
        .context("failed to initialize the segmentation session")?;

    if cli.batch {
        let reports = process_batch(
            &cli.input,
            &cli.output,
            &session,
            policy,
            &options,
            &cli.batch_options(),
        )?;
        if reports.is_empty() {
            println!("no supported images found in {}", cli.input.display());
            return Ok(());
        }
        let failed = reports.iter().filter(|report| !report.is_ok()).count();
        println!("{} processed, {} failed", reports.len() - failed, failed);
        ensure!(failed == 0, "{failed} of {} files failed", reports.len());
    } else {
        process_one(&cli.input, &cli.output, &session, policy, &options)
            .with_context(|| format!("failed to process {}", cli.input.display()))?;
        println!("saved {}", cli.output.display());
    }
    Ok(())
}
