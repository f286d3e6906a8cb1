use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    controller::{FrameReport, ParticleController},
    effects::VisualEffects,
    particle::WAVEFORM_CENTER,
    render::{Canvas, CanvasBounds},
    tracker::{BassDropEvent, BeatTier},
    Result,
};

/// Supplies one spectrum and one waveform frame per tick.
pub trait FrameSource {
    /// Moves the underlying stream forward by one frame. Called once per tick
    /// before either frame is read.
    fn advance(&mut self) -> Result<()> {
        Ok(())
    }

    fn spectrum_frame(&mut self, out: &mut [u8]) -> Result<()>;

    fn waveform_frame(&mut self, out: &mut [u8]) -> Result<()>;

    /// Drops any history carried between frames. Called when playback pauses.
    fn reset(&mut self) {}
}

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f32,
}

impl PlaybackClock {
    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Aggregate statistics over every tick the scheduler has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: u64,
    pub elapsed_seconds: f32,
    pub beats: u64,
    pub loud_beats: u64,
    pub very_loud_beats: u64,
    pub bass_drops: u64,
    pub particles_spawned: u64,
    pub peak_particles: usize,
    pub final_bpm: Option<f32>,
}

impl RunSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        if report.tracker.beat {
            self.beats += 1;
        }
        match report.tracker.tier {
            Some(BeatTier::Loud) => self.loud_beats += 1,
            Some(BeatTier::VeryLoud) => self.very_loud_beats += 1,
            None => {}
        }
        if report.tracker.bass_drop == Some(BassDropEvent::Start) {
            self.bass_drops += 1;
        }
        self.particles_spawned += report.spawned as u64;
        self.peak_particles = self.peak_particles.max(report.live);
        self.final_bpm = report.bpm;
    }
}

/// Drives the whole pipeline once per animation frame.
///
/// Each tick runs to completion: acquire frames, update the controller, draw.
/// Pausing keeps the loop running but feeds silence, and sends the live
/// particles into their scatter animation.
pub struct FrameScheduler<S, E: VisualEffects> {
    source: S,
    controller: ParticleController<E>,
    bounds: CanvasBounds,
    clock: PlaybackClock,
    interval: Duration,
    state: PlaybackState,
    realtime: bool,
    spectrum: Vec<u8>,
    waveform: Vec<u8>,
    summary: RunSummary,
}

impl<S: FrameSource, E: VisualEffects> FrameScheduler<S, E> {
    pub fn new(
        source: S,
        controller: ParticleController<E>,
        bounds: CanvasBounds,
        frame_rate: u32,
    ) -> Self {
        let bin_count = controller.bin_count();
        Self {
            source,
            controller,
            bounds,
            clock: PlaybackClock::default(),
            interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            state: PlaybackState::Playing,
            realtime: false,
            spectrum: vec![0; bin_count],
            waveform: vec![WAVEFORM_CENTER as u8; bin_count],
            summary: RunSummary::default(),
        }
    }

    /// Sleeps out the remainder of each frame interval in [`FrameScheduler::run`].
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn controller(&self) -> &ParticleController<E> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ParticleController<E> {
        &mut self.controller
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn set_bounds(&mut self, bounds: CanvasBounds) {
        self.bounds = bounds;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Paused {
            return;
        }
        tracing::info!(time = self.clock.time_seconds, "playback paused");
        self.state = PlaybackState::Paused;
        self.source.reset();
        self.controller.clear_particles();
        self.controller.stop_stars();
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        tracing::info!(time = self.clock.time_seconds, "playback resumed");
        self.state = PlaybackState::Playing;
    }

    /// Runs a single frame of the pipeline.
    pub fn tick(&mut self, canvas: &mut dyn Canvas) -> Result<FrameReport> {
        self.source.advance()?;
        self.source.spectrum_frame(&mut self.spectrum)?;
        self.source.waveform_frame(&mut self.waveform)?;

        if self.state == PlaybackState::Paused {
            self.spectrum.fill(0);
            self.waveform.fill(WAVEFORM_CENTER as u8);
        }

        canvas.begin_frame(self.bounds);
        let report =
            self.controller
                .update_and_render(&self.spectrum, &self.waveform, self.bounds, canvas)?;

        self.clock.advance(self.interval.as_secs_f32());
        self.summary.record(&report);
        self.summary.elapsed_seconds = self.clock.time_seconds;
        Ok(report)
    }

    /// Runs `frames` ticks back to back, pacing them to the frame rate when
    /// real-time mode is on.
    pub fn run(&mut self, frames: u64, canvas: &mut dyn Canvas) -> Result<RunSummary> {
        for _ in 0..frames {
            let started = Instant::now();
            self.tick(canvas)?;
            if self.realtime {
                std::thread::sleep(self.interval.saturating_sub(started.elapsed()));
            }
        }
        Ok(self.summary.clone())
    }
}

impl<S, E: VisualEffects> std::fmt::Debug for FrameScheduler<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("interval", &self.interval)
            .field("frames", &self.summary.frames)
            .finish()
    }
}
