use std::f32::consts::TAU;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{analysis::Analyser, config::AudioConfig, timeline::FrameSource, Result};

/// Produces mono samples in `[-1, 1]`.
pub trait SignalSource {
    fn fill(&mut self, out: &mut [f32]);
}

/// Shape of the generated demo track.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackSettings {
    pub bpm: f32,
    /// Beats after which the sustained bass line swells.
    pub drop_after_beats: Option<u32>,
    pub bass_hz: f32,
    pub seed: u64,
}

impl Default for TrackSettings {
    fn default() -> Self {
        Self {
            bpm: 128.0,
            drop_after_beats: Some(32),
            bass_hz: 55.0,
            seed: 0,
        }
    }
}

const KICK_DECAY_SECONDS: f32 = 0.12;
const HAT_DECAY_SECONDS: f32 = 0.03;

/// Deterministic four-on-the-floor pattern: a pitched-down kick on every
/// beat, noise hats on the off-beats and a sine bass line.
#[derive(Debug)]
pub struct SyntheticTrack {
    settings: TrackSettings,
    sample_rate: f32,
    position: u64,
    kick_phase: f32,
    bass_phase: f32,
    rng: StdRng,
}

impl SyntheticTrack {
    pub fn new(settings: TrackSettings, sample_rate: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            sample_rate: sample_rate as f32,
            position: 0,
            kick_phase: 0.0,
            bass_phase: 0.0,
        }
    }

    pub fn seconds(&self) -> f32 {
        self.position as f32 / self.sample_rate
    }

    fn beat_seconds(&self) -> f32 {
        60.0 / self.settings.bpm.max(1.0)
    }

    fn next_sample(&mut self) -> f32 {
        let time = self.seconds();
        let beat_length = self.beat_seconds();
        let beat = (time / beat_length) as u32;
        let since_beat = time - beat as f32 * beat_length;

        if since_beat < 1.0 / self.sample_rate {
            self.kick_phase = 0.0;
        }
        let kick_hz = 50.0 + 100.0 * (-since_beat / 0.03).exp();
        self.kick_phase = (self.kick_phase + TAU * kick_hz / self.sample_rate) % TAU;
        let kick = self.kick_phase.sin() * (-since_beat / KICK_DECAY_SECONDS).exp();

        let since_off_beat = (since_beat - beat_length / 2.0).max(0.0);
        let hat = if since_beat >= beat_length / 2.0 {
            (self.rng.random::<f32>() * 2.0 - 1.0) * (-since_off_beat / HAT_DECAY_SECONDS).exp()
        } else {
            0.0
        };

        let dropped = self
            .settings
            .drop_after_beats
            .is_some_and(|after| beat >= after);
        let bass_level = if dropped { 0.6 } else { 0.15 };
        self.bass_phase = (self.bass_phase + TAU * self.settings.bass_hz / self.sample_rate) % TAU;
        let bass = self.bass_phase.sin() * bass_level;

        self.position += 1;
        (0.7 * kick + 0.2 * hat + bass).clamp(-1.0, 1.0)
    }
}

impl SignalSource for SyntheticTrack {
    fn fill(&mut self, out: &mut [f32]) {
        for sample in out {
            *sample = self.next_sample();
        }
    }
}

/// Frame source that pulls one animation frame's worth of samples from a
/// signal per tick and analyses them.
#[derive(Debug)]
pub struct AnalyserSource<S> {
    signal: S,
    analyser: Analyser,
    block: Vec<f32>,
}

impl<S: SignalSource> AnalyserSource<S> {
    pub fn new(signal: S, config: &AudioConfig) -> Result<Self> {
        Ok(Self {
            signal,
            analyser: Analyser::new(config)?,
            block: vec![0.0; config.samples_per_frame().max(1)],
        })
    }

    pub fn signal(&self) -> &S {
        &self.signal
    }

}

impl<S: SignalSource> FrameSource for AnalyserSource<S> {
    fn advance(&mut self) -> Result<()> {
        self.signal.fill(&mut self.block);
        self.analyser.push_samples(&self.block)
    }

    fn spectrum_frame(&mut self, out: &mut [u8]) -> Result<()> {
        self.analyser.byte_frequency_data(out)
    }

    fn waveform_frame(&mut self, out: &mut [u8]) -> Result<()> {
        self.analyser.byte_time_domain_data(out)
    }

    fn reset(&mut self) {
        self.analyser.reset();
    }
}
