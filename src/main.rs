use anyhow::Result;
use ave::encoder::{Encoder, FfmpegEncoder};
use ave::pipeline::{self, CancelFlag, RunOptions, RunSummary};
use ave::{AveContext, output};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ave",
    version = ave::VERSION,
    about = "Incremental audio/video transcoding",
    long_about = "Transcodes project media through ffmpeg, re-encoding only outputs whose \
                  source content, encode settings, or on-disk artifacts actually changed"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the project configuration file
    #[arg(short, long, global = true, default_value = ave::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Show per-file detail
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode the audio section
    Audio {
        /// Report stale outputs without encoding or touching the cache
        #[arg(long)]
        dry_run: bool,
    },

    /// Encode the video section
    Video {
        /// Report stale outputs without encoding or touching the cache
        #[arg(long)]
        dry_run: bool,
    },

    /// Encode both sections
    All {
        /// Report stale outputs without encoding or touching the cache
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red().bold());
        process::exit(1);
    }
}

fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("AVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.verbose {
        output::set_verbosity(output::Verbosity::Verbose);
    } else if cli.quiet {
        output::set_verbosity(output::Verbosity::Quiet);
    }

    let dry_run = match cli.command {
        Commands::Completion { shell } => {
            print_completions(shell, &mut Cli::command());
            return Ok(());
        }
        Commands::Audio { dry_run } | Commands::Video { dry_run } | Commands::All { dry_run } => {
            dry_run
        }
    };

    let ctx = AveContext::load(&cli.config)?;
    let opts = RunOptions { dry_run };

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.cancel()) {
        tracing::warn!(%err, "could not install ctrl-c handler");
    }

    // Dry runs never touch ffmpeg, so they work without it installed.
    let encoder: Box<dyn Encoder> = if dry_run {
        Box::new(NullEncoder)
    } else {
        Box::new(FfmpegEncoder::discover()?)
    };

    match cli.command {
        Commands::Audio { .. } => {
            let cfg = ctx
                .config
                .audio
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no [audio] section in {}", ctx.config_path.display()))?;
            let summary = pipeline::run_audio(cfg, &ctx.cwd, encoder.as_ref(), &cancel, opts)?;
            report("audio", &summary, dry_run);
        }
        Commands::Video { .. } => {
            let cfg = ctx
                .config
                .video
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no [video] section in {}", ctx.config_path.display()))?;
            let summary = pipeline::run_video(cfg, &ctx.cwd, encoder.as_ref(), &cancel, opts)?;
            report("video", &summary, dry_run);
        }
        Commands::All { .. } => {
            if let Some(cfg) = &ctx.config.audio {
                let summary = pipeline::run_audio(cfg, &ctx.cwd, encoder.as_ref(), &cancel, opts)?;
                report("audio", &summary, dry_run);
            }
            if let Some(cfg) = &ctx.config.video
                && !cancel.is_cancelled()
            {
                let summary = pipeline::run_video(cfg, &ctx.cwd, encoder.as_ref(), &cancel, opts)?;
                report("video", &summary, dry_run);
            }
        }
        Commands::Completion { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn report(section: &str, summary: &RunSummary, dry_run: bool) {
    if dry_run {
        output::success(&format!(
            "{section}: {} stale output(s), {} file(s) up to date",
            summary.stale, summary.up_to_date
        ));
        return;
    }
    let mut line = format!(
        "{section}: {} encoded, {} up to date, {} purged",
        summary.encoded, summary.up_to_date, summary.purged
    );
    if summary.failed > 0 {
        line.push_str(&format!(", {} failed", summary.failed));
    }
    if summary.cancelled {
        line.push_str(", cancelled");
    }
    output::success(&line);
}

/// Stand-in encoder for dry runs; never invoked.
struct NullEncoder;

impl Encoder for NullEncoder {
    fn encode(&self, job: &ave::encoder::EncodeJob) -> Result<()> {
        anyhow::bail!("dry run should not encode {}", job.output.display())
    }
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
