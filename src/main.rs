//! syncrec - synchronized screen and microphone recorder
//!
//! Subcommands:
//! - `syncrec devices` - List audio input devices
//! - `syncrec test-audio --device N` - Show the microphone level for a few seconds
//! - `syncrec record --output FILE` - Record the screen (and microphone) to FILE

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncrec::recording::audio::{AudioInput, AudioSelfTest, CpalInput, list_input_devices};
use syncrec::recording::config::{RecorderConfig, default_config_path, load_config};
use syncrec::recording::encoder::FfmpegEncoder;
use syncrec::{CaptureSources, OutputFormat, Recorder, RecorderError, Rect, SessionRequest};

#[derive(Parser)]
#[command(name = "syncrec")]
#[command(about = "Synchronized screen and microphone recorder")]
#[command(version)]
struct Cli {
    /// Recorder config file (JSON); defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for the recorder
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio input devices
    Devices,

    /// Print the peak level of an input device
    TestAudio {
        /// Device index (see `devices`)
        #[arg(short, long)]
        device: Option<usize>,

        /// How long to listen
        #[arg(short, long, default_value = "5")]
        seconds: u64,
    },

    /// Record the screen, with or without the microphone
    Record {
        /// Output file; the format extension is appended if missing
        #[arg(short, long)]
        output: PathBuf,

        /// Recording length in seconds (pauses excluded)
        #[arg(short, long, default_value = "10", value_parser = parse_seconds)]
        duration: Duration,

        /// Capture framerate
        #[arg(long)]
        fps: Option<u32>,

        /// Container: mp4, avi or mov
        #[arg(long, value_parser = parse_format)]
        format: Option<OutputFormat>,

        /// Audio device index; the default input device when absent
        #[arg(long, conflicts_with = "no_audio")]
        device: Option<usize>,

        /// Record video only
        #[arg(long)]
        no_audio: bool,

        /// Audio gain applied at finalization (0.0 - 2.0)
        #[arg(long)]
        volume: Option<f32>,

        /// Recording area as x,y,width,height
        #[arg(long, value_parser = parse_area)]
        area: Option<Rect>,

        /// Pause after this many seconds of recording
        #[arg(long, requires = "pause_for", value_parser = parse_seconds)]
        pause_at: Option<Duration>,

        /// Length of the pause in seconds
        #[arg(long, requires = "pause_at", value_parser = parse_seconds)]
        pause_for: Option<Duration>,

        /// FFmpeg binary
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(s).ok_or_else(|| format!("unknown format '{}' (mp4, avi, mov)", s))
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.trim().parse().map_err(|_| format!("invalid number of seconds '{}'", s))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("seconds must be finite and non-negative, got '{}'", s))
}

fn parse_area(s: &str) -> Result<Rect, String> {
    Rect::parse(s).ok_or_else(|| format!("invalid area '{}', expected x,y,width,height", s))
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Warn)
        // Set specific levels for modules
        .level_for("syncrec", level)
        .level_for("syncrec::recording", level)
        .chain(std::io::stderr())
        .apply();

    if let Err(e) = result {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

fn load_recorder_config(path: Option<PathBuf>) -> syncrec::Result<RecorderConfig> {
    match path.or_else(default_config_path) {
        Some(path) => load_config(&path),
        None => Ok(RecorderConfig::default()),
    }
}

fn run_devices() -> syncrec::Result<()> {
    let default = CpalInput.default_device();
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for device in devices {
        let marker = if Some(device.index) == default { "*" } else { " " };
        println!("{} {:>2}: {} ({} ch)", marker, device.index, device.name, device.channels);
    }
    Ok(())
}

fn run_test_audio(config: &RecorderConfig, device: Option<usize>, seconds: u64) -> syncrec::Result<()> {
    let input = CpalInput;
    let index = device
        .or_else(|| input.default_device())
        .ok_or_else(|| RecorderError::Device("No input device available".to_string()))?;
    let channels = input
        .devices()?
        .into_iter()
        .find(|d| d.index == index)
        .map(|d| d.channels)
        .ok_or_else(|| RecorderError::Device(format!("Audio device {} not found", index)))?;

    let test = AudioSelfTest::start(&input, index, config.stream_spec(Some(channels)))?;
    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        if let Some(err) = test.error() {
            return Err(RecorderError::Device(err));
        }
        let level = test.level();
        let bar = "#".repeat((level.min(1.0) * 40.0) as usize);
        println!("{:>5.3} |{:<40}|", level, bar);
    }
    test.stop();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_record(
    mut config: RecorderConfig,
    output: PathBuf,
    duration: Duration,
    fps: Option<u32>,
    format: Option<OutputFormat>,
    device: Option<usize>,
    no_audio: bool,
    volume: Option<f32>,
    area: Option<Rect>,
    pause: Option<(Duration, Duration)>,
    ffmpeg: Option<PathBuf>,
) -> syncrec::Result<()> {
    if let Some(fps) = fps {
        config.framerate = fps;
    }
    if let Some(format) = format {
        config.output_format = format;
    }
    if let Some(volume) = volume {
        config.volume = volume;
    }
    if ffmpeg.is_some() {
        config.ffmpeg_path = ffmpeg;
    }
    config.validate()?;

    let encoder = FfmpegEncoder::from_config(&config);
    encoder.check()?;

    let mut recorder = Recorder::new(config, Arc::new(encoder), CaptureSources::system())?;
    recorder.set_recording_area(area)?;

    let mut request = SessionRequest::new(output);
    if no_audio {
        request = request.without_audio();
    } else if let Some(index) = device {
        request = request.with_device(index);
    }

    recorder.start(request)?;

    // A producer failure during the pause is reported by stop() below
    let mut remaining = duration;
    if let Some((pause_at, pause_for)) = pause {
        let before = pause_at.min(remaining);
        if !recorder.wait_for_stop(before) {
            match recorder.pause() {
                Ok(()) => {
                    recorder.wait_for_stop(pause_for);
                    if let Err(e) = recorder.resume() {
                        log::warn!("Resume failed: {}", e);
                    }
                }
                Err(e) => log::warn!("Pause failed: {}", e),
            }
        }
        remaining = remaining.saturating_sub(before);
    }

    let deadline = Instant::now() + remaining;
    while Instant::now() < deadline {
        let step = deadline
            .saturating_duration_since(Instant::now())
            .min(Duration::from_secs(1));
        if recorder.wait_for_stop(step) {
            break;
        }
        let status = recorder.status();
        log::info!(
            "{:.1}s recorded, {} frames, level {:.2}",
            status.elapsed_seconds,
            status.frame_count,
            status.audio_level
        );
    }

    let report = recorder.stop()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_recorder_config(cli.config).and_then(|config| match cli.command {
        Commands::Devices => run_devices(),
        Commands::TestAudio { device, seconds } => run_test_audio(&config, device, seconds),
        Commands::Record {
            output,
            duration,
            fps,
            format,
            device,
            no_audio,
            volume,
            area,
            pause_at,
            pause_for,
            ffmpeg,
        } => run_record(
            config,
            output,
            duration,
            fps,
            format,
            device,
            no_audio,
            volume,
            area,
            pause_at.zip(pause_for),
            ffmpeg,
        ),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("nan").is_err());
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("1e400").is_err());
        assert!(parse_seconds("ten").is_err());
    }

    #[test]
    fn test_record_rejects_non_finite_duration() {
        let args = ["syncrec", "record", "--output", "out.mp4", "--duration", "inf"];
        assert!(Cli::try_parse_from(args).is_err());

        let args = ["syncrec", "record", "-o", "out.mp4", "--pause-at", "NaN", "--pause-for", "1"];
        assert!(Cli::try_parse_from(args).is_err());
    }
}
