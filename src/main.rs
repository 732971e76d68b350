use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use asciifilm::config::PlayerConfig;
use asciifilm::display::TerminalDisplay;
use asciifilm::error_codes::operator_report;
use asciifilm::player::{PlaybackSession, SessionOptions};

#[derive(Debug, Parser)]
#[command(name = "asciifilm")]
#[command(about = "Play a video in the terminal as ASCII or truecolor text")]
#[command(version)]
struct Cli {
    /// Video file to play.
    #[arg(required_unless_present = "list_charsets")]
    video: Option<PathBuf>,
    /// Render 24-bit color glyphs instead of grayscale.
    #[arg(long, default_value_t = false)]
    color: bool,
    /// Skip the ffplay audio track.
    #[arg(long = "no-audio", default_value_t = false)]
    no_audio: bool,
    /// Palette name from the built-in or configured charsets.
    #[arg(long)]
    charset: Option<String>,
    /// Settings file; defaults to setting.json next to the binary or in the
    /// working directory.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    verbose: bool,
    /// Print the available charsets and exit.
    #[arg(long = "list-charsets", default_value_t = false)]
    list_charsets: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::debug!(
        "asciifilm {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("ASCIIFILM_GIT_HASH").unwrap_or("unknown")
    );

    match run(&cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", operator_report(&error));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = PlayerConfig::load(cli.config.as_deref())?;

    if cli.list_charsets {
        for name in config.charset_names() {
            let marker = if name == config.default_charset { " (default)" } else { "" };
            let palette = config.palette(&name).unwrap_or_default();
            println!("{name}{marker}: \"{palette}\"");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let video = cli
        .video
        .as_deref()
        .context("a video path is required")?;
    let options = SessionOptions {
        color: cli.color,
        audio: !cli.no_audio,
        charset: cli.charset.clone(),
    };
    let mut session = PlaybackSession::new(&config, &options)?;

    let mut display = TerminalDisplay::stdout();
    display.begin()?;
    let report = session.play_file(video, &mut display);
    let restored = display.restore();
    drop(session);

    let report = report.into_result(restored)?;
    eprintln!("[asciifilm] {}", report.summary());
    Ok(ExitCode::SUCCESS)
}
