use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tilt_bridge::{BridgeConfig, FailureMode, RenderBridge, TemplateContext};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Render templates through an external adapter process
#[derive(Parser)]
#[command(name = "tilt-bridge", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one template and write the output to stdout or a file
    Render(RenderArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Directory holding the templates and the adapter executable
    views_dir: PathBuf,

    /// Template path relative to the views directory
    template: String,

    /// Context as an inline JSON object
    #[arg(long, conflicts_with = "context_file")]
    context: Option<String>,

    /// Read the context from a JSON file ("-" for stdin)
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Bridge configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render deadline in milliseconds (0 disables it)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Return the fatal template payload instead of failing when no output is produced
    #[arg(long)]
    lenient: bool,

    /// Write the rendered output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// -v count to filter directive; RUST_LOG applies when no -v is given
fn log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive(0))),
        n => EnvFilter::new(log_directive(n)),
    };
    // try_init also routes the library's `log` records through tracing-log.
    // Stdout carries rendered output, so logs go to stderr.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn read_context(args: &RenderArgs) -> Result<TemplateContext> {
    let raw = match (&args.context, &args.context_file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("reading context from stdin")?;
            buf
        }
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading context file {}", path.display()))?,
        (None, None) => return Ok(TemplateContext::new()),
    };
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing context JSON")?;
    Ok(tilt_bridge::context_from_value(value)?)
}

fn render(args: RenderArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(ms) = args.timeout_ms {
        config.timeout_ms = ms;
    }
    if args.lenient {
        config.failure_mode = FailureMode::Lenient;
    }

    let context = read_context(&args)?;
    let bridge = RenderBridge::new(&args.views_dir, config)?;
    let output = bridge
        .render(&args.template, &context)
        .with_context(|| format!("rendering {}", args.template))?;

    match &args.output {
        Some(path) => std::fs::write(path, &output)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&output)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let res = match cli.command {
        Commands::Render(args) => render(args),
    };
    if let Err(e) = res {
        eprintln!("tilt-bridge: {:#}", e);
        std::process::exit(1);
    }
}
