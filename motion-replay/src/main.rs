//! Replay raw motion vector recordings through the detection engine.

use anyhow::{anyhow, Result};
use clap::*;
use log::*;
use motion_loader::MvecReader;
use mvdetect::prelude::v1::*;
use std::fs::File;
use std::io::{BufReader, Read};
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

fn cli() -> Command<'static> {
    Command::new("motion-replay")
        .version(crate_version!())
        .author(crate_authors!())
        .about(crate_description!())
        .arg(
            Arg::new("width")
                .long("width")
                .short('w')
                .takes_value(true),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .short('H')
                .takes_value(true),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .short('t')
                .takes_value(true),
        )
        .arg(
            Arg::new("window")
                .long("window")
                .short('n')
                .takes_value(true),
        )
        .arg(
            Arg::new("sensitivity")
                .long("sensitivity")
                .short('s')
                .takes_value(true)
                .conflicts_with("map"),
        )
        .arg(Arg::new("map").long("map").short('m').takes_value(true))
        .arg(Arg::new("dump").long("dump").short('d').takes_value(true))
        .arg(Arg::new("fps").long("fps").short('f').takes_value(true))
        .arg(
            Arg::new("lockstep")
                .long("lockstep")
                .short('l')
                .help("Wait for every frame to be processed before reading the next one"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true),
        )
        .arg(Arg::new("input").takes_value(true).required(true))
}

/// Build engine configuration from an optional JSON file and command line overrides.
fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let mut config: EngineConfig = match matches.value_of("config") {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None => Default::default(),
    };

    if let Some(width) = matches.value_of("width") {
        config.width = width.parse()?;
    }

    if let Some(height) = matches.value_of("height") {
        config.height = height.parse()?;
    }

    if let Some(threshold) = matches.value_of("threshold") {
        config.threshold = threshold.parse()?;
    }

    if let Some(window) = matches.value_of("window") {
        config.window_size = window.parse()?;
    }

    if let Some(sens) = matches.value_of("sensitivity") {
        config.sensitivity = SensitivitySource::Uniform(sens.parse()?);
    }

    if let Some(map) = matches.value_of("map") {
        config.sensitivity = SensitivitySource::Image(map.into());
    }

    if let Some(dump) = matches.value_of("dump") {
        config.debug_dump = Some(dump.into());
    }

    if config.width == 0 || config.height == 0 {
        return Err(anyhow!("Please supply frame width and height!"));
    }

    Ok(config)
}

fn frame_time(matches: &ArgMatches) -> Result<Option<Duration>> {
    Ok(match matches.value_of("fps") {
        Some(fps) => Some(fps.parse::<f64>()?)
            .filter(|f| *f > 0.0)
            .map(|f| Duration::from_secs_f64(1.0 / f)),
        None => None,
    })
}

/// Counters and events gathered over a single replay.
#[derive(Debug, Default)]
struct ReplayStats {
    frames_read: u64,
    received: u64,
    processed: u64,
    skipped: u64,
    dropped: u64,
    /// Frame index and intensity of every event raised.
    events: Vec<(u64, u32)>,
}

fn wait_idle(engine: &MotionEngine) {
    while !engine.is_idle() {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Feed every frame of a recording through a fresh engine.
///
/// # Arguments
///
/// * `config` - engine configuration.
/// * `reader` - source of frames.
/// * `frame_time` - submit one frame per period instead of as fast as possible.
/// * `lockstep` - wait for the worker after every frame, so that nothing gets dropped.
fn replay<T: Read>(
    config: EngineConfig,
    mut reader: MvecReader<T>,
    frame_time: Option<Duration>,
    lockstep: bool,
) -> Result<ReplayStats> {
    let (tx, rx) = channel();

    let engine = mvdetect::init(config, move |intensity, event| {
        let frame = mvdetect::current_frame().unwrap_or_default();
        info!("{:?} at frame {}: intensity {}", event, frame, intensity);
        let _ = tx.send((frame, intensity));
    })?;

    let mut stats = ReplayStats::default();
    let start = Instant::now();

    while let Some(frame) = reader.read_frame()? {
        if let Some(frame_time) = frame_time {
            let due = frame_time.mul_f64(stats.frames_read as f64);
            if let Some(wait) = due.checked_sub(start.elapsed()) {
                std::thread::sleep(wait);
            }
        }

        stats.frames_read += 1;
        engine.submit(frame);

        if lockstep {
            wait_idle(&engine);
        }

        if !engine.is_running() {
            warn!("Detection worker exited after {} frames", stats.frames_read);
            break;
        }
    }

    // Let the worker finish the last frame before tearing down.
    wait_idle(&engine);

    stats.received = engine.received_frames();
    stats.processed = engine.processed_frames();
    stats.skipped = engine.skipped_frames();
    stats.dropped = engine.dropped_frames();

    engine
        .shutdown()
        .map_err(|_| anyhow!("Detection worker panicked"))?;

    stats.events = rx.try_iter().collect();

    Ok(stats)
}

fn main() -> Result<()> {
    env_logger::init();

    let matches = cli().get_matches();

    let config = load_config(&matches)?;
    let frame_time = frame_time(&matches)?;
    let input = matches
        .value_of("input")
        .ok_or_else(|| anyhow!("Please supply a motion vector recording!"))?;

    let reader = motion_loader::create_reader(input, config.width, config.height)?;

    let stats = replay(config, reader, frame_time, matches.is_present("lockstep"))?;

    println!(
        "Frames read: {}, received: {}, processed: {}, skipped: {}, dropped: {}, events: {}",
        stats.frames_read,
        stats.received,
        stats.processed,
        stats.skipped,
        stats.dropped,
        stats.events.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_loader::write_frame;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn config() -> EngineConfig {
        EngineConfig {
            threshold: 1,
            window_size: 12,
            sensitivity: SensitivitySource::Uniform(10),
            ..EngineConfig::new(64, 64)
        }
    }

    /// Encode `quiet` still frames followed by `moving` frames with 5 moving macroblocks.
    fn recording(quiet: usize, moving: usize) -> MvecReader<Cursor<Vec<u8>>> {
        let mut buf = vec![];

        for i in 0..(quiet + moving) {
            let mut frame = MotionVectorFrame::new(4, 5);
            if i >= quiet {
                for b in 0..5 {
                    frame.set_motion(5, b % 4, b / 4, MotionVector::new(20, 0));
                }
            }
            write_frame(&mut buf, &frame).unwrap();
        }

        MvecReader::new(Cursor::new(buf), 64, 64)
    }

    fn matches(args: &[&str]) -> ArgMatches {
        cli()
            .try_get_matches_from(std::iter::once("motion-replay").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn flags_build_config() {
        let m = matches(&[
            "-w", "1280", "-H", "720", "-t", "4", "-n", "30", "-s", "12", "rec.mvec",
        ]);
        let config = load_config(&m).unwrap();

        assert_eq!(config.grid_dims(), (45, 81));
        assert_eq!(config.threshold, 4);
        assert_eq!(config.window_size, 30);
        assert_eq!(config.sensitivity, SensitivitySource::Uniform(12));
        assert_eq!(config.debug_dump, None);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(
            &path,
            r#"{ "width": 640, "height": 480, "threshold": 9, "debug_dump": "/tmp/{seq}.png" }"#,
        )
        .unwrap();

        let m = matches(&["-c", path.to_str().unwrap(), "-t", "3", "-m", "map.png", "x"]);
        let config = load_config(&m).unwrap();

        assert_eq!((config.width, config.height), (640, 480));
        assert_eq!(config.threshold, 3);
        assert_eq!(
            config.sensitivity,
            SensitivitySource::Image(PathBuf::from("map.png"))
        );
        assert_eq!(config.debug_dump.as_deref(), Some("/tmp/{seq}.png"));
    }

    #[test]
    fn requires_resolution() {
        assert!(load_config(&matches(&["-w", "640", "x"])).is_err());
    }

    #[test]
    fn sensitivity_conflicts_with_map() {
        assert!(cli()
            .try_get_matches_from(["motion-replay", "-s", "3", "-m", "map.png", "x"])
            .is_err());
    }

    #[test]
    fn parses_fps() {
        assert_eq!(
            frame_time(&matches(&["-f", "25", "x"])).unwrap(),
            Some(Duration::from_millis(40))
        );
        assert_eq!(frame_time(&matches(&["-f", "0", "x"])).unwrap(), None);
        assert_eq!(frame_time(&matches(&["x"])).unwrap(), None);
    }

    #[test]
    fn events_carry_triggering_frame() {
        // Frames 0..12 are still, the fifth moving frame (index 16) crosses the threshold.
        let stats = replay(config(), recording(12, 5), None, true).unwrap();

        assert_eq!(stats.frames_read, 17);
        assert_eq!(stats.processed, 17);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.events, [(16, 1)]);
    }

    #[test]
    fn paces_frames() {
        let start = Instant::now();
        let frame_time = Some(Duration::from_millis(10));
        let stats = replay(config(), recording(4, 0), frame_time, true).unwrap();

        // The first frame goes out immediately, 3 more periods are waited out.
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(stats.frames_read, 4);
    }

    #[test]
    fn lockstep_flag() {
        assert!(matches(&["-l", "x"]).is_present("lockstep"));
        assert!(!matches(&["x"]).is_present("lockstep"));
    }
}
