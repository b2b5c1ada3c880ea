//! Level layout: where each level event lands along the path
//!
//! A level is a path plus a list of musical events laid end to end in beats.
//! The layout walks the events in order, asks the timeline where each one
//! falls and turns its key into a height. Instantiating anything is up to
//! the host engine; this only produces placements.

use crate::height::HeightMap;
use crate::timeline::{ConfigurationError, PathTimeline};
use crate::vec3::Vec3;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Level has no events")]
    NoEvents,
    #[error("Event {0} has a negative or non-finite length")]
    InvalidEventLength(usize),
    #[error("Level has zero total duration")]
    ZeroDuration,
    #[error("Coin interval must be positive and finite, got {0}")]
    InvalidCoinInterval(f32),
    #[error("Invalid path: {0}")]
    Path(#[from] ConfigurationError),
}

/// Kind of a level event, from the level file's integer codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A hoop to fly through (code 1)
    Hoop,
    /// A run of coins gliding between two keys (code 2)
    Coins,
    /// Mode change marker (code 3)
    Marker,
    /// Anything else: time passes, nothing spawns
    Rest,
}

impl EventKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => EventKind::Hoop,
            2 => EventKind::Coins,
            3 => EventKind::Marker,
            _ => EventKind::Rest,
        }
    }
}

/// One musical event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEvent {
    pub kind: EventKind,
    /// Duration in beats
    pub length: f32,
    /// MIDI key at the start of the event
    pub start_key: f32,
    /// MIDI key at the end of the event (coins only)
    pub end_key: f32,
}

impl LevelEvent {
    pub fn new(kind: EventKind, length: f32, start_key: f32, end_key: f32) -> Self {
        Self {
            kind,
            length,
            start_key,
            end_key,
        }
    }
}

/// What sits at a placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementKind {
    Hoop,
    Coin,
    /// Step-mode platform, `length` in world units along the path
    Board { length: f32 },
}

/// A spawned object's time, position and heading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub kind: PlacementKind,
    /// Beat at which the player reaches it
    pub time: f32,
    /// Point on the path, lifted to the key's height
    pub position: Vec3,
    pub forward: Vec3,
}

/// Layout tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    /// Beats between consecutive coins
    pub coin_interval: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { coin_interval: 0.4 }
    }
}

/// Placements for one level, plus a fresh timeline to fly it with
#[derive(Debug, Clone)]
pub struct LevelLayout {
    placements: Vec<Placement>,
    change_time: Option<f32>,
    total_time: f32,
    timeline: PathTimeline,
}

impl LevelLayout {
    /// Hoops and coins along a sliding path
    pub fn slide(
        path: Vec<Vec3>,
        events: &[LevelEvent],
        heights: &HeightMap,
        config: LayoutConfig,
    ) -> Result<Self, LayoutError> {
        let coin_interval = config.coin_interval;
        if !(coin_interval.is_finite() && coin_interval > 0.0) {
            return Err(LayoutError::InvalidCoinInterval(coin_interval));
        }
        let (mut walker, mut layout) = Self::prepare(path, events)?;

        let mut time = 0.0f32;
        for event in events {
            match event.kind {
                EventKind::Hoop => {
                    let sample = walker.sample_at(time);
                    layout.placements.push(Placement {
                        kind: PlacementKind::Hoop,
                        time,
                        position: sample.position.with_y(heights.key_to_height(event.start_key)),
                        forward: sample.forward,
                    });
                }
                EventKind::Coins => {
                    let count = (event.length / coin_interval).floor() as usize;
                    let start_height = heights.key_to_height(event.start_key);
                    let end_height = heights.key_to_height(event.end_key);
                    for i in 0..count {
                        let coin_time = time + i as f32 * coin_interval;
                        let sample = walker.sample_at(coin_time);
                        let height =
                            start_height + (end_height - start_height) * (i as f32 / count as f32);
                        layout.placements.push(Placement {
                            kind: PlacementKind::Coin,
                            time: coin_time,
                            position: sample.position.with_y(height),
                            forward: sample.forward,
                        });
                    }
                }
                EventKind::Marker => layout.change_time = Some(time),
                EventKind::Rest => {}
            }
            time += event.length;
        }

        tracing::info!(
            placements = layout.placements.len(),
            total_time = layout.total_time,
            "slide level laid out"
        );
        Ok(layout)
    }

    /// One board per event along a stepping path
    pub fn step(
        path: Vec<Vec3>,
        events: &[LevelEvent],
        heights: &HeightMap,
    ) -> Result<Self, LayoutError> {
        let (mut walker, mut layout) = Self::prepare(path, events)?;
        let total_length = walker.total_length();

        let mut time = 0.0f32;
        for event in events {
            let sample = walker.sample_at(time);
            layout.placements.push(Placement {
                kind: PlacementKind::Board {
                    length: event.length / layout.total_time * total_length,
                },
                time,
                position: sample.position.with_y(heights.key_to_height(event.start_key)),
                forward: sample.forward,
            });
            time += event.length;
        }

        // Step levels switch mode once the last board is passed
        layout.change_time = Some(layout.total_time);

        tracing::info!(boards = layout.placements.len(), "step level laid out");
        Ok(layout)
    }

    /// Validate events, build the query timeline and an empty layout
    fn prepare(path: Vec<Vec3>, events: &[LevelEvent]) -> Result<(PathTimeline, Self), LayoutError> {
        if events.is_empty() {
            return Err(LayoutError::NoEvents);
        }
        if let Some(idx) = events
            .iter()
            .position(|e| !(e.length.is_finite() && e.length >= 0.0))
        {
            return Err(LayoutError::InvalidEventLength(idx));
        }

        let total_time: f32 = events.iter().map(|e| e.length).sum();
        if total_time <= 0.0 {
            return Err(LayoutError::ZeroDuration);
        }

        let timeline = PathTimeline::new(path, total_time)?;
        let layout = Self {
            placements: Vec::new(),
            change_time: None,
            total_time,
            timeline: timeline.clone(),
        };
        Ok((timeline, layout))
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Beat of the mode change marker, if the level has one
    pub fn change_time(&self) -> Option<f32> {
        self.change_time
    }

    /// Sum of all event lengths, in beats
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Timeline for flying the level, cursor at the start
    pub fn timeline(&self) -> &PathTimeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> PathTimeline {
        self.timeline
    }
}
