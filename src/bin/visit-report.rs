//! CLI binary for visit-report.
//!
//! A thin shim over the library crate: loads a manifest, maps CLI flags to
//! `ReportConfig`, wires up the storage and email collaborators from the
//! environment, and prints the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use visit_report::{
    generate_and_deliver, load_request, DeliveryLeg, EmailPayload, PhotoSlot, ProgressCallback, RecipientRouter,
    ReportConfig, ReportProgressCallback, ResendConfig, ResendMailer, SupabaseConfig, SupabaseStorage,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a bar over photo normalisation, then one line per
/// delivery leg. Photos finish out of order, so lines name the slot.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Loading photos…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl ReportProgressCallback for CliProgressCallback {
    fn on_compose_start(&self, total_photos: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} photos  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_photos as u64);
        self.bar.set_prefix("Composing");
    }

    fn on_photo_complete(&self, _slot: PhotoSlot, _done: usize, _total: usize) {
        self.bar.inc(1);
    }

    fn on_photo_error(&self, slot: PhotoSlot, error: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<22} {}", red("✗"), slot.to_string(), red(&msg)));
        self.bar.inc(1);
    }

    fn on_compose_complete(&self, pages: usize, pdf_bytes: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        eprintln!(
            "{} {} pages composed  {}{}",
            if skipped == 0 { green("✔") } else { cyan("⚠") },
            bold(&pages.to_string()),
            dim(&format!("{} KiB", pdf_bytes / 1024)),
            if skipped == 0 {
                String::new()
            } else {
                format!("  ({} photo(s) skipped)", red(&skipped.to_string()))
            },
        );
    }

    fn on_delivery(&self, leg: DeliveryLeg, ok: bool) {
        eprintln!("  {} {}", if ok { green("✓") } else { red("✗") }, leg);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compose, upload, email and keep a local copy
  visit-report visit.json -o ./reports

  # Link to the uploaded copy instead of attaching the PDF
  visit-report --email-link visit.json

  # Compose only, no network
  visit-report --no-upload --no-email visit.json -o .

  # Custom routing table
  visit-report --routing routes.json visit.json

MANIFEST FORMAT:
  {
    "visit": { "date": "2024-05-01", "address": "3 rue Victor Hugo",
               "author": "Elodie BONNAY", "arrivalTime": "09:00",
               "departureTime": "10:30", "buildingCode": "A1234",
               "peoplePresent": "Gardien" },
    "observations": [
      { "type": "✅ Positive", "description": "Hall propre",
        "action": "", "photos": ["hall.jpg"] }
    ],
    "signature": "signature.png",
    "leadPhoto": "https://example.com/facade.jpg"
  }
  Image references are local paths (relative to the manifest) or URLs.

ROUTING FILE:
  { "default": "skita@orpi.com",
    "routes": { "Elodie BONNAY": "ebonnay@orpi.com" } }

ENVIRONMENT VARIABLES:
  SUPABASE_URL               Supabase project URL
  SUPABASE_SERVICE_ROLE_KEY  Supabase service-role key
  VISIT_REPORT_BUCKET        Storage bucket (default: rapports-visite)
  RESEND_API_KEY             Resend API key
  VISIT_REPORT_FROM          Sender address (default: onboarding@resend.dev)
  RUST_LOG                   Override log filter
"#;

/// Compose a property-visit report as PDF and deliver it.
#[derive(Parser, Debug)]
#[command(
    name = "visit-report",
    version,
    about = "Compose a property-visit report as PDF, upload it and email it",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Report manifest (JSON).
    manifest: PathBuf,

    /// Directory for the local copy (rapport-visite.pdf).
    #[arg(short, long, env = "VISIT_REPORT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// JSON routing table mapping authors to recipients.
    #[arg(long, env = "VISIT_REPORT_ROUTING")]
    routing: Option<PathBuf>,

    /// Email a link to the uploaded copy instead of attaching the PDF.
    #[arg(long)]
    email_link: bool,

    /// Number of photos normalised concurrently.
    #[arg(short, long, env = "VISIT_REPORT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// JPEG quality for re-encoded photos (1–100).
    #[arg(long, env = "VISIT_REPORT_QUALITY", default_value_t = 70,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Maximum photo width in pixels after downscaling.
    #[arg(long, env = "VISIT_REPORT_MAX_WIDTH", default_value_t = 1000)]
    max_width: u32,

    /// Fail instead of skipping photos that cannot be decoded.
    #[arg(long)]
    strict: bool,

    /// Network timeout in seconds, per request.
    #[arg(long, env = "VISIT_REPORT_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Retries for transient upload/email failures.
    #[arg(long, env = "VISIT_REPORT_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Skip the storage upload.
    #[arg(long)]
    no_upload: bool,

    /// Skip the email.
    #[arg(long)]
    no_email: bool,

    #[arg(long, env = "SUPABASE_URL", hide_env_values = true)]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    #[arg(long, env = "VISIT_REPORT_BUCKET", default_value = visit_report::deliver::DEFAULT_BUCKET)]
    bucket: String,

    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    resend_key: Option<String>,

    #[arg(long, env = "VISIT_REPORT_FROM", default_value = visit_report::deliver::DEFAULT_FROM_ADDRESS)]
    from: String,

    /// Output the outcome as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "VISIT_REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VISIT_REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "VISIT_REPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose output is requested.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Load input ───────────────────────────────────────────────────────
    let request = load_request(&cli.manifest, cli.timeout)
        .await
        .with_context(|| format!("Failed to load {}", cli.manifest.display()))?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ReportProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Collaborators ────────────────────────────────────────────────────
    let storage = match (&cli.supabase_url, &cli.supabase_key) {
        (Some(url), Some(key)) if !cli.no_upload => Some(
            SupabaseStorage::new(
                SupabaseConfig::new(url, key).with_bucket(&cli.bucket),
                cli.timeout,
            )
            .context("Failed to set up storage client")?,
        ),
        _ => None,
    };
    let mailer = match &cli.resend_key {
        Some(key) if !cli.no_email => Some(
            ResendMailer::new(ResendConfig::new(key).with_from_address(&cli.from), cli.timeout)
                .context("Failed to set up email client")?,
        ),
        _ => None,
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let outcome = generate_and_deliver(&request, &config, &storage, &mailer)
        .await
        .context("Report generation failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else if !cli.quiet {
        eprintln!("{}", outcome.user_message());
        if let Err(ref e) = outcome.storage {
            eprintln!("   {}", dim(&e.to_string()));
        }
        if let Err(ref e) = outcome.email {
            eprintln!("   {}", dim(&e.to_string()));
        }
    }

    // Skipping a leg on purpose is not a failure.
    let storage_ok = outcome.storage.is_ok() || cli.no_upload;
    let email_ok = outcome.email.is_ok() || cli.no_email;
    Ok(if storage_ok && email_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Map CLI args to `ReportConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReportConfig> {
    let router = match cli.routing {
        Some(ref path) => RecipientRouter::load(path)
            .await
            .with_context(|| format!("Failed to read routing table from {}", path.display()))?,
        None => RecipientRouter::default(),
    };

    let mut builder = ReportConfig::builder()
        .max_width_px(cli.max_width)
        .jpeg_quality(cli.quality)
        .concurrency(cli.concurrency)
        .strict_images(cli.strict)
        .router(router)
        .email_payload(if cli.email_link {
            EmailPayload::Link
        } else {
            EmailPayload::Attachment
        })
        .network_timeout_secs(cli.timeout)
        .max_retries(cli.max_retries);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.download_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
