use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use extractor_client::{ClientSettings, HttpBackend};
use extractor_core::{
    DocumentUpload, InvoiceRecord, Orchestrator, OrchestratorConfig, Phase, PollSettings,
    ProgressSnapshot, ProgressStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};

/// Invoice Extractor - submit a document and follow the extraction live
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the document to extract (PDF, PNG, JPG, or JPEG)
    file: PathBuf,

    /// Base URL of the extraction service
    #[arg(long)]
    api_url: Option<String>,

    /// Seconds between status polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Maximum number of status polls before giving up
    #[arg(long)]
    max_poll_attempts: Option<u32>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let args = Args::parse();

    if !args.file.exists() {
        anyhow::bail!("file not found: {}", args.file.display());
    }

    // Resolve config from CLI flags > env vars > defaults
    let base_url = args
        .api_url
        .or_else(|| std::env::var("EXTRACTOR_API_URL").ok())
        .unwrap_or_else(|| ClientSettings::default().base_url);

    let mut poll = PollSettings::default();
    if let Some(secs) = args.poll_interval_secs {
        poll.interval = Duration::from_secs(secs);
    }
    if let Some(attempts) = args.max_poll_attempts {
        poll.max_attempts = attempts;
    }

    let upload = read_upload(&args.file)?;

    let backend = HttpBackend::new(ClientSettings {
        base_url,
        ..ClientSettings::default()
    })?;
    let store = Arc::new(ProgressStore::new());
    let orchestrator = Orchestrator::new(Arc::new(backend), Arc::clone(&store))
        .with_config(OrchestratorConfig {
            poll,
            ..OrchestratorConfig::default()
        });

    // Ctrl+C supersedes the job; the run below then reports it cancelled.
    let store_for_signal = Arc::clone(&store);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            store_for_signal.reset();
        }
    });

    // Render task: drain the snapshot stream into the bar.
    let bar = progress_bar(args.no_color);
    let render_bar = bar.clone();
    let mut snapshots = store.subscribe();
    let render = tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            render_snapshot(&render_bar, &snapshot);
            if snapshot.phase.is_terminal() {
                break;
            }
        }
    });

    let outcome = orchestrator.run(upload).await;
    render.abort();
    bar.finish_and_clear();

    match outcome {
        Ok(record) => {
            let style = outcome_style(args.no_color, Style::new().green().bold());
            println!("{}", Phase::Complete.message().style(style));
            print_record(&record);
            Ok(())
        }
        Err(err) => {
            let style = outcome_style(args.no_color, Style::new().red().bold());
            eprintln!("{} {}", "Extraction failed:".style(style), err);
            std::process::exit(1);
        }
    }
}

/// Loads the file and derives the multipart content type from its extension.
/// Unknown extensions are sent as octet-stream; the service owns validation.
fn read_upload(path: &Path) -> anyhow::Result<DocumentUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(DocumentUpload {
        file_name,
        content_type: content_type_for(path).to_string(),
        bytes,
    })
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn progress_bar(no_color: bool) -> ProgressBar {
    let template = if no_color {
        "{bar:40} {pos:>3}% {msg}"
    } else {
        "{bar:40.cyan/blue} {pos:>3}% {msg}"
    };
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(template).expect("valid progress template"));
    bar
}

fn render_snapshot(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    bar.set_position(u64::from(snapshot.percentage));
    if snapshot.phase.is_terminal() || snapshot.phase == Phase::Idle {
        bar.set_message(snapshot.message.clone());
    } else {
        bar.set_message(format!(
            "{} (about {} left)",
            snapshot.message,
            format_eta(snapshot.estimated_secs_remaining)
        ));
    }
}

fn format_eta(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    format!("{}m {}s", seconds / 60, seconds % 60)
}

fn outcome_style(no_color: bool, styled: Style) -> Style {
    if no_color { Style::new() } else { styled }
}

fn print_record(record: &InvoiceRecord) {
    println!("  Invoice number: {}", record.invoice_number);
    println!("  Client:         {}", record.client_name);
    println!("  Address:        {}", record.client_address);
    println!(
        "  Amount:         {:.2} {}",
        record.invoice_amount, record.currency
    );
    println!("  Issued:         {}", record.issue_date);
    println!("  Due:            {}", record.due_date);
    if let Some(notes) = &record.notes {
        println!("  Notes:          {notes}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_formats_like_a_clock() {
        assert_eq!(format_eta(0), "0s");
        assert_eq!(format_eta(45), "45s");
        assert_eq!(format_eta(60), "1m 0s");
        assert_eq!(format_eta(150), "2m 30s");
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for(Path::new("a.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(
            content_type_for(Path::new("archive.zip")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("no_extension")),
            "application/octet-stream"
        );
    }
}
