use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{particle::ParticleControls, Result, VisualiserError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub tracker: TrackerConfig,
    pub spawn: SpawnConfig,
    pub stars: StarConfig,
    /// Default snapshot of the particle control surface.
    pub particles: ParticleControls,
    /// Seed for every random choice made by the pipeline. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Parses a JSON document. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every invariant the tracker and controller rely on. Bin ranges
    /// are rejected here so per-frame code can index without further checks.
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.tracker.validate(self.audio.bin_count())?;
        self.particles.validate()
    }
}

fn check_bin_range(name: &str, end: usize, bins: usize) -> Result<()> {
    if end == 0 || end > bins {
        return Err(VisualiserError::config(format!(
            "{name} must lie in 1..={bins}, got {end}"
        )));
    }
    Ok(())
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Transform size. Spectrum and waveform frames hold `fft_size / 2` entries.
    pub fft_size: usize,
    /// Exponential smoothing applied between consecutive spectra, in [0, 1).
    pub smoothing_time_constant: f32,
    pub min_db: f32,
    pub max_db: f32,
    /// Display refresh rate the scheduler ticks at.
    pub frame_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            fft_size: 512,
            smoothing_time_constant: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            frame_rate: 60,
        }
    }
}

impl AudioConfig {
    /// Number of bins in a spectrum frame.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Centre frequency of `bin`.
    pub fn frequency_hz(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Audio samples consumed per animation frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate / self.frame_rate.max(1)) as usize
    }

    fn validate(&self) -> Result<()> {
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(VisualiserError::config(format!(
                "fft_size must be a power of two of at least 2, got {}",
                self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(VisualiserError::config("sample_rate must be positive"));
        }
        if self.frame_rate == 0 {
            return Err(VisualiserError::config("frame_rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(VisualiserError::config(
                "smoothing_time_constant must lie in [0, 1)",
            ));
        }
        if self.min_db >= self.max_db {
            return Err(VisualiserError::config("min_db must be below max_db"));
        }
        Ok(())
    }
}

/// Constants of the adaptive beat detector and the bass drop hysteresis band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Bins `[0, beat_track_bin_end)` feed the beat average.
    pub beat_track_bin_end: usize,
    /// Bins `[0, bass_end_bin)` feed the bass average.
    pub bass_end_bin: usize,
    /// Neighbour radius of the moving average applied to the bass bins.
    pub bass_smoothing_window: usize,
    /// Frames the cutoff is held after a beat before it starts decaying.
    pub beat_hold_time: f32,
    pub beat_decay_rate: f32,
    pub beat_min: f32,
    /// Shaped per-bin energy needed to spawn; twice this average is a loud beat.
    pub audible_threshold: f32,
    /// Bass average counted as a rhythmic hit by the BPM estimator.
    pub very_loud_beat: f32,
    /// Single-bin energy that marks a very loud beat.
    pub very_loud_bin: f32,
    pub let_the_bass_drop: f32,
    pub bass_end_volume: f32,
    pub bpm_window_frames: u32,
    /// Number of BPM measurements averaged into the estimate.
    pub bpm_smoothing: usize,
    /// A drop needs at least this BPM estimate.
    pub min_drop_bpm: f32,
    pub drop_base_speed: f32,
    pub drop_base_radius: f32,
    pub drop_responsiveness_factor: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            beat_track_bin_end: 20,
            bass_end_bin: 4,
            bass_smoothing_window: 5,
            beat_hold_time: 2.5,
            beat_decay_rate: 0.9,
            beat_min: 0.15,
            audible_threshold: 110.0,
            very_loud_beat: 220.0,
            very_loud_bin: 250.0,
            let_the_bass_drop: 254.9,
            bass_end_volume: 195.0,
            bpm_window_frames: 60,
            bpm_smoothing: 3,
            min_drop_bpm: 2.0,
            drop_base_speed: 5.0,
            drop_base_radius: 15.0,
            drop_responsiveness_factor: 2.0,
        }
    }
}

impl TrackerConfig {
    /// Checks the bin ranges against a spectrum of `bin_count` entries and the
    /// hysteresis band ordering.
    pub fn validate(&self, bin_count: usize) -> Result<()> {
        check_bin_range("beat_track_bin_end", self.beat_track_bin_end, bin_count)?;
        check_bin_range("bass_end_bin", self.bass_end_bin, bin_count)?;

        if self.bass_end_volume >= self.let_the_bass_drop {
            return Err(VisualiserError::config(format!(
                "bass_end_volume ({}) must be below let_the_bass_drop ({})",
                self.bass_end_volume, self.let_the_bass_drop
            )));
        }
        if self.bpm_window_frames == 0 {
            return Err(VisualiserError::config("bpm_window_frames must be positive"));
        }
        if self.bpm_smoothing == 0 {
            return Err(VisualiserError::config("bpm_smoothing must be positive"));
        }
        if !(self.beat_decay_rate > 0.0 && self.beat_decay_rate <= 1.0) {
            return Err(VisualiserError::config("beat_decay_rate must lie in (0, 1]"));
        }
        if self.beat_min < 0.0 {
            return Err(VisualiserError::config("beat_min must not be negative"));
        }
        if self.drop_responsiveness_factor <= 0.0 {
            return Err(VisualiserError::config(
                "drop_responsiveness_factor must be positive",
            ));
        }
        Ok(())
    }
}

/// Frequency shaping and placement of newly spawned particles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Distance from the canvas centre at which particles appear.
    pub spawn_radius: f32,
    /// Linear tilt across the bin range, as a fraction.
    pub frequency_scale_factor: f32,
    pub treble_boost: f32,
    /// Bin position, as a fraction of the frame, above which the treble boost applies.
    pub treble_threshold: f32,
    /// Beat average at which responsiveness is left unadjusted.
    pub responsiveness_pivot: f32,
    /// Velocity magnitude of scattering particles, relative to their speed.
    pub scatter_speed: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            spawn_radius: 50.0,
            frequency_scale_factor: 0.55,
            treble_boost: 1.4,
            treble_threshold: 0.4,
            responsiveness_pivot: 230.0,
            scatter_speed: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StarConfig {
    pub enabled: bool,
    pub count: usize,
    /// Upper bound of each velocity component after a direction change.
    pub speed: f32,
    pub friction: f32,
    pub max_size: f32,
}

impl Default for StarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            count: 2000,
            speed: 1.0,
            friction: 0.9999,
            max_size: 5.0,
        }
    }
}
