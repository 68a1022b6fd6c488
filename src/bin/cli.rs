//! tickplay CLI: play a MOD file or export it to WAV.
//!
//! Usage:
//!   tp-cli path/to/file.mod
//!   tp-cli path/to/file.mod --rate 44100 --stereo --wav output.wav

use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use thiserror::Error;
use tp_master::{
    Controller, ControllerError, Layout, PlayerConfig, Song, DEFAULT_BLOCK_SIZE, DEFAULT_RATE,
    MAX_RATE, MIN_RATE,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Exit status for a bad command line.
const BAD_ARGS: i32 = 4;

#[derive(Parser, Debug)]
#[command(name = "tp-cli", version, about = "Play ProTracker modules")]
struct Args {
    /// Module file; the name must start with `mod.` or end with `.mod`
    module: PathBuf,

    /// Output rate in Hz; asked for interactively when omitted
    #[arg(long, value_parser = clap::value_parser!(u32).range(MIN_RATE as i64..=MAX_RATE as i64))]
    rate: Option<u32>,

    /// Amiga stereo (channels 1 and 4 left, 2 and 3 right)
    #[arg(long)]
    stereo: bool,

    /// Render to a WAV file instead of the audio device
    #[arg(long, value_name = "PATH")]
    wav: Option<PathBuf>,

    /// Stop after this many seconds of output
    #[arg(long, value_name = "SECONDS")]
    max_seconds: Option<u32>,

    /// Mixer block size in samples
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

impl CliError {
    fn code(&self) -> i32 {
        match self {
            CliError::Usage(_) => BAD_ARGS,
            CliError::Read { .. } => 1,
            CliError::Controller(e) => e.code(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(BAD_ARGS);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(e.code());
    }
}

fn run(args: Args) -> Result<(), CliError> {
    if !has_mod_extension(&args.module) {
        return Err(CliError::Usage(format!(
            "{} is not a .mod file",
            args.module.display()
        )));
    }

    let data = fs::read(&args.module).map_err(|source| CliError::Read {
        path: args.module.display().to_string(),
        source,
    })?;

    let mut ctrl = Controller::new();
    ctrl.load_mod(&data).map_err(ControllerError::from)?;
    print_info(ctrl.song());

    let rate = match args.rate {
        Some(rate) => rate,
        None => prompt_rate(&mut io::stdin().lock()),
    };
    let layout = if args.stereo { Layout::AmigaStereo } else { Layout::Mono };
    let config = PlayerConfig::new(rate)
        .with_layout(layout)
        .with_block_size(args.block_size)
        .with_max_frames(args.max_seconds.map(|s| s as u64 * rate as u64));
    debug!(?config, "player configured");

    match &args.wav {
        Some(path) => render_to_wav(&ctrl, path, config),
        None => play_audio(&mut ctrl, config),
    }
}

/// The file name must start with `mod.` or end with `.mod`, in any case.
fn has_mod_extension(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.starts_with("mod.") || name.ends_with(".mod")
}

/// Ask for the output rate; empty, unparsable or out-of-range input keeps
/// the default.
fn prompt_rate(input: &mut impl BufRead) -> u32 {
    print!("Enter Frequency[{}]: ", DEFAULT_RATE);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if input.read_line(&mut line).is_err() {
        return DEFAULT_RATE;
    }
    parse_rate(&line)
}

fn parse_rate(line: &str) -> u32 {
    line.split_whitespace()
        .next()
        .and_then(|word| word.parse().ok())
        .filter(|rate| (MIN_RATE..=MAX_RATE).contains(rate))
        .unwrap_or(DEFAULT_RATE)
}

fn print_info(song: &Song) {
    println!("Title:    {}", song.title);
    println!("-----------------------------------------------------------------------------");
    println!("| SAMP# |      INSTR NAME        |  LEN  | FTUNE | DVOL | REP_PNT | REP_LEN |");
    println!("-----------------------------------------------------------------------------");
    for (number, sample) in song.used_samples() {
        println!(
            "| {:2}    | {:22.22} | {:5} |  {:2}   | {:3}  |  {:5}  |  {:5}  |",
            number,
            sample.name.as_str(),
            sample.length,
            sample.finetune,
            sample.volume,
            sample.repeat_point,
            sample.repeat_length
        );
    }
    println!("-----------------------------------------------------------------------------");
    println!("SONG LENGTH: {}  IGNORE: {}  DESCRIP: {}", song.length, song.ignored, song.tag.as_str());
    println!("CHANS: {}", song.channels());
    println!();
}

fn play_audio(ctrl: &mut Controller, config: PlayerConfig) -> Result<(), CliError> {
    ctrl.play(config);

    let mut announced = false;
    while ctrl.is_playing() {
        if !announced {
            if let Some(rate) = ctrl.device_rate() {
                println!("Using Rate: {}", rate);
                announced = true;
            }
        }
        if let Some((position, division)) = ctrl.position() {
            print!("\rPos: {:03} | Div: {:02}", position, division);
            let _ = io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let summary = ctrl
        .wait()
        .transpose()
        .map_err(ControllerError::from)?
        .unwrap_or_default();
    println!("\rDone. {} divisions, {} frames.", summary.divisions, summary.frames);
    Ok(())
}

fn render_to_wav(ctrl: &Controller, path: &Path, config: PlayerConfig) -> Result<(), CliError> {
    println!("Rendering to {} at {} Hz...", path.display(), config.rate);

    let file = File::create(path).map_err(ControllerError::from)?;
    let (writer, summary) = ctrl.render_wav(BufWriter::new(file), config)?;
    drop(writer);

    println!(
        "Rendered {} frames ({} divisions, {} effect faults)",
        summary.frames, summary.divisions, summary.effect_faults
    );
    Ok(())
}
