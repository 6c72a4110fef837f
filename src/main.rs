use anyhow::Context;
use clap::Parser;
use colored::*;
use enacom_etl::cli::{Args, setup_logging};
use enacom_etl::{EtlError, PipelineRunner, PipelineStats};
use std::process;

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    match runtime.block_on(run(args)) {
        Ok(stats) => {
            print_summary(&stats);
            process::exit(0);
        }
        Err(error) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), error);
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<PipelineStats> {
    let config = args
        .build_config()
        .context("Failed to load configuration")?;
    let runner = PipelineRunner::new(config)?.with_progress(!args.no_progress);

    // Interrupting drops the run at its next await point; every table is
    // written atomically so no partial output is left behind.
    tokio::select! {
        result = runner.run(args.stage) => {
            result.with_context(|| format!("Stage `{}` failed", args.stage.name()))
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nReceived CTRL+C, stopping...");
            Err(EtlError::ProcessingInterrupted {
                reason: "interrupted by user".to_string(),
            }
            .into())
        }
    }
}

fn print_summary(stats: &PipelineStats) {
    println!("\n{}", "Run Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        stats.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files generated:".bright_cyan(),
        stats.files_generated().to_string().bright_white().bold()
    );
    if stats.files_failed() > 0 {
        println!(
            "  {} {}",
            "Files failed:".bright_red(),
            stats.files_failed().to_string().bright_red().bold()
        );
    }
    if let Some(path) = &stats.report_path {
        println!("  {} {}", "Report:".bright_cyan(), path.display());
    }
}
