mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use threat_analyzer_core::{
    build_client, build_store, AnalysisPipeline, ReportRenderer, SessionController, SessionView,
    Severity, Upload, REPORT_FILE_NAME, REPORT_MIME_TYPE,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const IDLE_PROMPT: &str = "Please upload a file to begin analysis.";

#[derive(Parser, Debug)]
#[command(
    name = "threat-analyzer",
    author,
    version,
    about = "Security threat analyzer for Dockerfiles, logs and scan reports"
)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one file and write the PDF report
    Analyze {
        /// Dockerfile, .log, .json or .txt file to analyze
        path: PathBuf,
        /// Directory the PDF report is written to
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
    /// Read one file path per line from stdin; an empty line clears the upload
    Session {
        /// Directory the PDF report is written to
        #[arg(long, value_name = "DIR", default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let app = AppConfig::load(cli.config.as_deref())?;
    app.validate()?;
    let mut controller = build_controller(&app)?;

    let outcome = match cli.command {
        Commands::Analyze { path, out } => analyze(&mut controller, &path, &out).await,
        Commands::Session { out } => session(&mut controller, &out).await,
    };
    controller.shutdown().await?;
    outcome
}

fn build_controller(app: &AppConfig) -> Result<SessionController> {
    let client = build_client(&app.model)?;
    let store = build_store(&app.store, &app.model)?;
    info!(
        provider = %app.model.provider,
        backend = %app.store.backend,
        "threat analyzer ready"
    );
    Ok(SessionController::new(AnalysisPipeline::new(
        client,
        store,
        ReportRenderer::default(),
    )))
}

async fn analyze(controller: &mut SessionController, path: &Path, out: &Path) -> Result<()> {
    let upload = read_upload(path).await?;
    let view = controller
        .observe(Some(upload))
        .await
        .with_context(|| format!("failed to analyze {}", path.display()))?;
    show(view, out).await
}

async fn session(controller: &mut SessionController, out: &Path) -> Result<()> {
    println!("{IDLE_PROMPT}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        let upload = if trimmed.is_empty() {
            None
        } else {
            match read_upload(Path::new(trimmed)).await {
                Ok(upload) => Some(upload),
                Err(err) => {
                    eprintln!("{} {err:#}", "error:".red().bold());
                    continue;
                }
            }
        };
        match controller.observe(upload).await {
            Ok(view) => show(view, out).await?,
            Err(err) => eprintln!("{} {:#}", "error:".red().bold(), anyhow::Error::from(err)),
        }
    }
    Ok(())
}

async fn read_upload(path: &Path) -> Result<Upload> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} does not name a file", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Upload::new(name, bytes))
}

async fn show(view: SessionView<'_>, out: &Path) -> Result<()> {
    let SessionView::Displaying {
        artifact,
        result,
        fresh,
    } = view
    else {
        println!("{IDLE_PROMPT}");
        return Ok(());
    };

    println!("{}", "Threat Report".bold());
    println!("File: {}", artifact.name());
    println!("Type: {}", artifact.category());
    println!("Threat Score: {}", paint(result.severity));
    if !fresh {
        println!("{}", "(cached result)".dimmed());
    }
    println!();
    println!("{}", result.analysis_text);
    println!();

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    let report_path = out.join(REPORT_FILE_NAME);
    tokio::fs::write(&report_path, &result.report_pdf)
        .await
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    println!("Report: {} ({REPORT_MIME_TYPE})", report_path.display());
    if fresh {
        println!("{}", "✅ Analysis complete and saved.".green());
    }
    Ok(())
}

fn paint(severity: Severity) -> ColoredString {
    let label = severity.decorated_label();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.bright_red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.green(),
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
