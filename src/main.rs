use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipforge::jobs::ProgressEvent;
use clipforge::output;
use clipforge::utils;
use clipforge::{
    Cli, Commands, Config, ExtractionRequest, ExtractionService, Job, JobId, JobStatus,
    ReportFormat,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        Commands::Extract {
            url,
            start,
            end,
            format,
            output: output_dir,
        } => {
            let service = build_service(output_dir).await?;
            let request = ExtractionRequest::new(url, start.as_str(), end.as_str(), format);

            let submission = service.submit(request).await;
            tracing::info!("Submitted job {}", submission.job_id);

            let job = follow_job(&service, submission.job_id, cli.report).await?;
            output::print_report(&job, cli.report)?;

            if job.status() == JobStatus::Error {
                std::process::exit(1);
            }
        }
        Commands::Batch {
            file,
            output: output_dir,
        } => {
            let content = fs_err::read_to_string(&file)?;
            let requests: Vec<ExtractionRequest> = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse batch file {}", file.display()))?;

            let service = build_service(output_dir).await?;
            let submissions = service.submit_batch(requests).await;
            println!("Submitted {} job(s)", submissions.len());

            let mut failed = 0;
            for submission in submissions {
                let job = service.wait(submission.job_id).await?;
                if job.status() == JobStatus::Error {
                    failed += 1;
                }
                output::print_report(&job, cli.report)?;
            }

            if failed > 0 {
                eprintln!("{} {} job(s) failed", style("✗").red(), failed);
                std::process::exit(1);
            }
        }
        Commands::Config { show, init } => {
            let config = Config::load().await?;
            if init {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            }
            if show || !init {
                config.display();
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "clipforge=debug"
    } else {
        "clipforge=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

async fn build_service(output_dir: Option<PathBuf>) -> Result<ExtractionService> {
    let mut config = Config::load().await?;
    if let Some(dir) = output_dir {
        config.app.output_dir = dir;
    }
    config.validate()?;

    // Missing tools only fail the jobs that need them
    let missing = utils::check_dependencies(&config).await;
    if !missing.is_empty() {
        eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
        for dep in missing {
            eprintln!("   • {}", dep);
        }
    }

    ExtractionService::new(&config)
}

/// Show a progress bar until the job is terminal, then return its final state
async fn follow_job(
    service: &ExtractionService,
    job_id: JobId,
    report: ReportFormat,
) -> Result<Job> {
    let progress = if report == ReportFormat::Text {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?,
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut events = service.subscribe(job_id);
    while let Some(event) = events.recv().await {
        if let ProgressEvent::Update { status, progress: percent, .. } = event {
            progress.set_position(u64::from(percent));
            progress.set_message(status.to_string());
        }
    }
    progress.finish_and_clear();

    Ok(service.status(job_id).await?)
}
