use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jobgate::client::JobClient;
use jobgate::extraction::{ExtractionMode, FileExtractor, OnlineExtractor};
use jobgate::jobs::{Admission, CorrelationId, JobStatus, Outcome};
use serde_json::{Value, json};

#[derive(Parser)]
#[command(name = "jobctl", about = "Submit and poll extraction jobs on a jobgate server")]
struct Cli {
    /// Gateway base URL.
    #[arg(long, env = "JOBGATE_URL", default_value = "http://localhost:4100")]
    url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit an online source.
    SubmitOnline {
        path: String,
        #[arg(long, value_enum, default_value_t = OnlineExtractor::Web)]
        extractor: OnlineExtractor,
        #[arg(long, value_enum, default_value_t = ExtractionMode::Single)]
        mode: ExtractionMode,
        #[arg(long)]
        from_date: Option<String>,
    },
    /// Upload a local file.
    SubmitFile {
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = FileExtractor::Docx)]
        extractor: FileExtractor,
    },
    /// Print the current state of a job.
    Status { id: String },
    /// Poll until a job finishes.
    Wait {
        id: String,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = JobClient::new(&cli.url).context("invalid gateway URL")?;
    match cli.command {
        Command::SubmitOnline {
            path,
            extractor,
            mode,
            from_date,
        } => {
            let admission = client
                .submit_online(extractor, &path, mode, from_date.as_deref())
                .await
                .with_context(|| format!("failed to submit {path}"))?;
            print_json(&admission_json(&admission))
        }
        Command::SubmitFile {
            file,
            name,
            extractor,
        } => {
            let admission = client
                .submit_file(extractor, &name, &file)
                .await
                .with_context(|| format!("failed to upload {}", file.display()))?;
            print_json(&admission_json(&admission))
        }
        Command::Status { id } => {
            let status = client
                .status(&CorrelationId::new(id))
                .await
                .context("failed to fetch job status")?;
            print_json(&status_json(&status))
        }
        Command::Wait {
            id,
            timeout_secs,
            interval_ms,
        } => {
            let id = CorrelationId::new(id);
            let outcome = client
                .wait_for_completion(
                    &id,
                    Duration::from_secs(timeout_secs),
                    Duration::from_millis(interval_ms),
                )
                .await?;
            print_json(&status_json(&JobStatus::Done(outcome.clone())))?;
            if let Outcome::Failure(message) = outcome {
                bail!("job {id} failed: {message}");
            }
            Ok(())
        }
    }
}

fn admission_json(admission: &Admission) -> Value {
    let status = if admission.is_new() { "created" } else { "accepted" };
    json!({ "status": status, "correlation_id": admission.id().as_str() })
}

fn status_json(status: &JobStatus) -> Value {
    match status {
        JobStatus::Done(Outcome::Success(data)) => json!({ "status": "success", "data": data }),
        JobStatus::Done(Outcome::Failure(error)) => json!({ "status": "failure", "error": error }),
        JobStatus::Pending => json!({ "status": "pending" }),
        JobStatus::NotFound => json!({ "status": "not_found" }),
    }
}

fn print_json(value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extractor_kinds_parse_from_library_names() {
        let cli = Cli::try_parse_from([
            "jobctl",
            "submit-file",
            "report.pdf",
            "--name",
            "doc1",
            "--extractor",
            "pdf",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::SubmitFile { extractor: FileExtractor::Pdf, .. }
        ));

        let cli = Cli::try_parse_from([
            "jobctl",
            "submit-online",
            "https://x",
            "--extractor",
            "sharepoint",
            "--mode",
            "consolidated",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::SubmitOnline {
                extractor: OnlineExtractor::Sharepoint,
                mode: ExtractionMode::Consolidated,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["jobctl", "submit-online", "https://x", "--extractor", "ftp"]).is_err());
    }
}
