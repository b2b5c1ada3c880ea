//! Trill Flight - lip-trill driven flight controller
//!
//! Headless driver: tracks the player's pitch from the microphone (or a
//! remote pitch tracker), listens for trill state, and flies a practice course
//! along its path timeline, logging the controller state every frame.

mod config;
mod output;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use config::Config;
use output::OutputRange;
use trill_analysis::StabilizerConfig;
use trill_audio::{
    run_session_loop, DatagramReceiver, PitchReading, PitchTracker, RemotePitch, SessionEvent,
    SessionSettings, TrillSession, TrillState,
};
use trill_path::{BeatClock, EventKind, HeightMap, LayoutConfig, LevelEvent, LevelLayout, Vec3};

/// Frame rate for the control loop
const FPS: u64 = 30;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load();
    tracing::debug!(?config, "configuration");

    let stabilizer = StabilizerConfig {
        capacity: config.history_size,
        max_deviation: config.max_deviation,
        ..StabilizerConfig::default()
    };

    // Create session channels
    let (cmd_tx, cmd_rx, evt_tx, evt_rx) = TrillSession::create_channels();
    let session = TrillSession::new(cmd_tx, evt_rx);

    // Pitch comes either from the microphone worker or from the network
    let mut remote_pitch = None;
    let worker = match config.pitch_port {
        Some(port) => {
            let receiver = DatagramReceiver::<RemotePitch>::bind(("0.0.0.0", port))
                .context("failed to open remote pitch port")?;
            let tracker =
                PitchTracker::from_stabilizer(trill_analysis::PitchStabilizer::new(stabilizer)?);
            remote_pitch = Some((receiver, tracker));
            None
        }
        None => {
            let settings = SessionSettings {
                device: config.input_device.clone(),
                frame_size: config.buffer_size,
                hop_size: config.hop_size,
                stabilizer,
            };
            let shutdown = session.shutdown_flag();
            Some(
                thread::Builder::new()
                    .name("pitch-session".into())
                    .spawn(move || run_session_loop(settings, cmd_rx, evt_tx, shutdown))?,
            )
        }
    };

    let mut trill = DatagramReceiver::<TrillState>::bind(("0.0.0.0", config.trill_port))
        .context("failed to open trill state port")?;

    let result = run_controller(&config, &session, remote_pitch.as_mut(), &trill);

    // Cleanup
    session.shutdown();
    trill.stop();
    if let Some(worker) = worker {
        let _ = worker.join();
    }

    result
}

/// Practice course: a dog-leg path with a handful of hoops and coin runs
fn practice_course() -> (Vec<Vec3>, Vec<LevelEvent>) {
    let path = vec![
        Vec3::ground(0.0, 0.0),
        Vec3::ground(0.0, 60.0),
        Vec3::ground(30.0, 90.0),
        Vec3::ground(30.0, 160.0),
    ];
    let events = vec![
        LevelEvent::new(EventKind::Rest, 4.0, 60.0, 60.0),
        LevelEvent::new(EventKind::Hoop, 4.0, 60.0, 60.0),
        LevelEvent::new(EventKind::Coins, 8.0, 60.0, 67.0),
        LevelEvent::new(EventKind::Hoop, 4.0, 67.0, 67.0),
        LevelEvent::new(EventKind::Coins, 8.0, 67.0, 60.0),
        LevelEvent::new(EventKind::Hoop, 4.0, 64.0, 64.0),
    ];
    (path, events)
}

fn run_controller(
    config: &Config,
    session: &TrillSession,
    mut remote_pitch: Option<&mut (DatagramReceiver<RemotePitch>, PitchTracker)>,
    trill: &DatagramReceiver<TrillState>,
) -> anyhow::Result<()> {
    let range = OutputRange::new(config.pitch_offset, config.pitch_min, config.pitch_max);
    let heights = HeightMap::default();
    let (path, events) = practice_course();
    let layout = LevelLayout::slide(path, &events, &heights, LayoutConfig::default())
        .context("practice course is invalid")?;
    tracing::info!(
        placements = layout.placements().len(),
        beats = layout.total_time(),
        "practice course ready"
    );

    // Each lap flies a fresh copy so queries stay monotonic
    let course = layout.into_timeline();
    let mut timeline = course.clone();
    let lap_beats = course.total_duration();
    let mut last_lap_beat = 0.0f32;

    let started = Instant::now();
    let clock = BeatClock::new(config.time_ratio)?;
    let frame = Duration::from_millis(1000 / FPS);

    let mut trilling = false;
    let mut pitch: Option<PitchReading> = None;
    let mut others = Vec::new();
    let mut frames: u64 = 0;

    loop {
        let frame_start = Instant::now();

        if let Some(TrillState(state)) = trill.latest() {
            if state != trilling {
                tracing::info!(trilling = state, "trill state changed");
            }
            trilling = state;
        }

        match remote_pitch.as_deref_mut() {
            Some((receiver, tracker)) => {
                while let Some(RemotePitch(raw)) = receiver.try_recv() {
                    pitch = Some(tracker.update(raw));
                }
            }
            None => {
                if let Some(reading) = session.latest_pitch(&mut others) {
                    pitch = Some(reading);
                }
                for event in others.drain(..) {
                    match event {
                        SessionEvent::Started {
                            device,
                            sample_rate,
                        } => tracing::info!(%device, sample_rate, "listening"),
                        SessionEvent::Error(e) => anyhow::bail!("pitch session failed: {}", e),
                        SessionEvent::Pitch(_) => {}
                    }
                }
            }
        }

        let beat = clock.beats(started.elapsed().as_secs_f32());
        let lap_beat = beat % lap_beats;
        if lap_beat < last_lap_beat {
            tracing::info!("lap complete");
            timeline = course.clone();
        }
        last_lap_beat = lap_beat;
        let sample = timeline.sample_at(lap_beat);

        if let Some(reading) = pitch {
            let target = range.apply(reading.midi);
            tracing::debug!(
                beat,
                x = sample.position.x,
                z = sample.position.z,
                target,
                midi = reading.midi,
                trilling,
                "frame"
            );
        }

        frames += 1;
        if frames % FPS == 0 {
            tracing::info!(
                beat = (beat * 10.0).round() / 10.0,
                segment = sample.segment,
                pitch = pitch.map(|p| p.midi),
                trilling,
                "status"
            );
        }

        if config.run_seconds > 0 && started.elapsed().as_secs() >= config.run_seconds {
            return Ok(());
        }

        if let Some(remaining) = frame.checked_sub(frame_start.elapsed()) {
            thread::sleep(remaining);
        }
    }
}
