//! Adaptive beat detection, bass drop hysteresis and BPM estimation.
//!
//! The beat cutoff jumps to `average * 1.5` on every hit and then decays
//! geometrically towards `beat_min` once the hold time has passed, so a
//! sustained loud passage does not retrigger while a quiet one stays sensitive.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{config::TrackerConfig, smoothing, Result};

/// Factor applied to the beat average to form the cutoff after a hit.
pub const CUTOFF_HEADROOM: f32 = 1.5;

/// Strength of a beat raised inside an open beat window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeatTier {
    /// Beat average above twice the audible threshold.
    Loud,
    /// A single bin above the very loud threshold.
    VeryLoud,
}

/// Transition of the bass drop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BassDropEvent {
    Start,
    /// Bass re-entered the upper band while already dropped.
    Sustain,
    End,
}

/// Everything the tracker derived from one spectrum frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerFrame {
    pub average: f32,
    pub bass_average: f32,
    /// Loudest bin inside the beat tracking range.
    pub peak_energy: f32,
    /// The beat window is open: spawning and tier events are allowed.
    pub beat: bool,
    pub tier: Option<BeatTier>,
    pub bass_drop: Option<BassDropEvent>,
    /// Raw BPM of the window that closed on this frame, if any.
    pub bpm_measurement: Option<f32>,
}

/// Counts loud bass frames per fixed window and smooths the result over the
/// last few windows.
#[derive(Debug, Clone)]
pub struct BpmEstimator {
    window_frames: u32,
    frames: u32,
    hits: u32,
    history: VecDeque<f32>,
    capacity: usize,
}

impl BpmEstimator {
    pub fn new(window_frames: u32, capacity: usize) -> Self {
        Self {
            window_frames,
            frames: 0,
            hits: 0,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records one frame. Returns the raw measurement when a window closes.
    pub fn observe(&mut self, bass_average: f32, threshold: f32) -> Option<f32> {
        self.frames += 1;
        if bass_average > threshold {
            self.hits += 1;
        }

        if self.frames < self.window_frames {
            return None;
        }

        let raw = self.hits as f32 * 60.0 / self.frames as f32;
        self.history.push_back(raw);
        if self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.frames = 0;
        self.hits = 0;
        Some(raw)
    }

    /// Mean of the retained measurements, `None` before the first window closes.
    pub fn estimate(&self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f32>() / self.history.len() as f32)
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }
}

/// Session-long beat and bass tracking state.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    config: TrackerConfig,
    beat_cut_off: f32,
    beat_time: u32,
    bass_dropped: bool,
    bpm: BpmEstimator,
    bass_bins: Vec<f32>,
}

impl BeatTracker {
    /// Validates `config` against spectra of `bin_count` bins.
    pub fn new(config: TrackerConfig, bin_count: usize) -> Result<Self> {
        config.validate(bin_count)?;
        Ok(Self {
            beat_cut_off: config.beat_min,
            beat_time: 0,
            bass_dropped: false,
            bpm: BpmEstimator::new(config.bpm_window_frames, config.bpm_smoothing),
            bass_bins: Vec::with_capacity(config.bass_end_bin),
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn beat_cut_off(&self) -> f32 {
        self.beat_cut_off
    }

    /// Frames since the cutoff was last raised.
    pub fn beat_time(&self) -> u32 {
        self.beat_time
    }

    pub fn bass_dropped(&self) -> bool {
        self.bass_dropped
    }

    pub fn bpm(&self) -> Option<f32> {
        self.bpm.estimate()
    }

    pub fn bpm_estimator(&self) -> &BpmEstimator {
        &self.bpm
    }

    /// Processes one spectrum frame. `drops_enabled` gates new bass drops only;
    /// an active drop can still end.
    pub fn update(&mut self, spectrum: &[u8], drops_enabled: bool) -> TrackerFrame {
        let config = &self.config;
        assert!(
            spectrum.len() >= config.beat_track_bin_end && spectrum.len() >= config.bass_end_bin,
            "spectrum frame of {} bins is shorter than the configured tracking ranges",
            spectrum.len()
        );

        self.bass_bins.clear();
        self.bass_bins
            .extend(spectrum[..config.bass_end_bin].iter().map(|&bin| bin as f32));
        let bass_average = smoothing::mean(&smoothing::apply_smoothing(
            &self.bass_bins,
            config.bass_smoothing_window,
        ));

        let beat_range = &spectrum[..config.beat_track_bin_end];
        let average = beat_range.iter().map(|&bin| bin as f32).sum::<f32>()
            / config.beat_track_bin_end as f32;
        let peak_energy = beat_range.iter().copied().max().unwrap_or(0) as f32;

        let bpm_measurement = self.bpm.observe(bass_average, config.very_loud_beat);
        if let Some(raw) = bpm_measurement {
            tracing::debug!(raw, smoothed = ?self.bpm.estimate(), "bpm window closed");
        }

        let bass_drop = self.update_bass_drop(bass_average, drops_enabled);

        let mut frame = TrackerFrame {
            average,
            bass_average,
            peak_energy,
            bass_drop,
            bpm_measurement,
            ..Default::default()
        };

        let config = &self.config;
        if average > self.beat_cut_off && average > config.beat_min {
            frame.beat = true;
            frame.tier = if peak_energy > config.very_loud_bin {
                Some(BeatTier::VeryLoud)
            } else if average > config.audible_threshold * 2.0 {
                Some(BeatTier::Loud)
            } else {
                None
            };
            self.beat_cut_off = average * CUTOFF_HEADROOM;
            self.beat_time = 0;
        } else if self.beat_time as f32 <= config.beat_hold_time {
            self.beat_time += 1;
        } else {
            self.beat_cut_off = (self.beat_cut_off * config.beat_decay_rate).max(config.beat_min);
        }

        frame
    }

    fn update_bass_drop(&mut self, bass_average: f32, drops_enabled: bool) -> Option<BassDropEvent> {
        let config = &self.config;
        if !self.bass_dropped {
            if bass_average <= config.let_the_bass_drop || !drops_enabled {
                return None;
            }
            // A single isolated hit must not start a drop.
            let rhythmic = self
                .bpm
                .estimate()
                .is_some_and(|bpm| bpm >= config.min_drop_bpm);
            if !rhythmic {
                return None;
            }
            self.bass_dropped = true;
            Some(BassDropEvent::Start)
        } else if bass_average > config.let_the_bass_drop {
            Some(BassDropEvent::Sustain)
        } else if bass_average < config.bass_end_volume {
            self.bass_dropped = false;
            Some(BassDropEvent::End)
        } else {
            None
        }
    }

    /// Leaves the dropped state without waiting for the bass to fall. Returns
    /// whether a drop was active.
    pub fn force_end_drop(&mut self) -> bool {
        std::mem::replace(&mut self.bass_dropped, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BINS: usize = 32;

    fn new_tracker(config: TrackerConfig) -> BeatTracker {
        BeatTracker::new(config, BINS).unwrap()
    }

    fn frame(value: u8) -> Vec<u8> {
        vec![value; BINS]
    }

    fn bass_frame(bass: u8) -> Vec<u8> {
        let mut spectrum = vec![0; BINS];
        spectrum[..4].fill(bass);
        spectrum
    }

    /// Tracker whose BPM estimate already clears the drop gate.
    fn rhythmic_tracker() -> BeatTracker {
        let mut tracker = new_tracker(TrackerConfig {
            bpm_window_frames: 4,
            ..Default::default()
        });
        for _ in 0..4 {
            tracker.update(&bass_frame(230), true);
        }
        assert!(tracker.bpm().unwrap() >= 2.0);
        tracker
    }

    #[test]
    fn silence_never_opens_a_beat_window() {
        let mut tracker = new_tracker(TrackerConfig::default());
        for _ in 0..100 {
            let result = tracker.update(&frame(0), true);
            assert!(!result.beat);
            assert!(result.tier.is_none());
            assert!(result.bass_drop.is_none());
        }
        assert!(!tracker.bass_dropped());
        assert_eq!(tracker.beat_cut_off(), tracker.config().beat_min);
    }

    #[test]
    fn beat_raises_cutoff_to_headroom_exactly() {
        let mut tracker = new_tracker(TrackerConfig::default());
        let result = tracker.update(&frame(100), true);
        assert!(result.beat);
        assert_eq!(result.average, 100.0);
        assert_eq!(tracker.beat_cut_off(), 100.0 * CUTOFF_HEADROOM);
        assert_eq!(tracker.beat_time(), 0);

        let result = tracker.update(&frame(120), true);
        assert!(!result.beat);
        assert_eq!(tracker.beat_time(), 1);
    }

    #[test]
    fn cutoff_holds_then_decays() {
        let mut tracker = new_tracker(TrackerConfig::default());
        tracker.update(&frame(100), true);

        // beat_time counts 1, 2, 3 while within the 2.5 frame hold.
        for _ in 0..3 {
            tracker.update(&frame(0), true);
            assert_eq!(tracker.beat_cut_off(), 150.0);
        }
        tracker.update(&frame(0), true);
        assert!((tracker.beat_cut_off() - 135.0).abs() < 1e-4);
    }

    #[test]
    fn classifies_beat_tiers() {
        let mut tracker = new_tracker(TrackerConfig::default());
        let result = tracker.update(&frame(230), true);
        assert_eq!(result.tier, Some(BeatTier::Loud));

        let mut tracker = new_tracker(TrackerConfig::default());
        let mut spectrum = frame(10);
        spectrum[3] = 255;
        let result = tracker.update(&spectrum, true);
        assert!(result.beat);
        assert_eq!(result.tier, Some(BeatTier::VeryLoud));

        let mut tracker = new_tracker(TrackerConfig::default());
        let result = tracker.update(&frame(150), true);
        assert!(result.beat);
        assert_eq!(result.tier, None);
    }

    #[test]
    fn single_bass_hit_stays_below_drop_threshold() {
        let mut tracker = new_tracker(TrackerConfig {
            bass_end_bin: 5,
            ..Default::default()
        });
        let mut spectrum = frame(0);
        spectrum[0] = 255;
        let result = tracker.update(&spectrum, true);
        assert!((result.bass_average - 51.0).abs() < 1e-4);
        assert!(result.bass_drop.is_none());
        assert!(!tracker.bass_dropped());
    }

    #[test]
    fn drop_requires_an_established_rhythm() {
        let mut tracker = new_tracker(TrackerConfig::default());
        let result = tracker.update(&bass_frame(255), true);
        assert!(result.bass_drop.is_none());
        assert!(!tracker.bass_dropped());
    }

    #[test]
    fn drop_respects_the_enable_flag() {
        let mut tracker = rhythmic_tracker();
        assert!(tracker.update(&bass_frame(255), false).bass_drop.is_none());
        assert_eq!(
            tracker.update(&bass_frame(255), true).bass_drop,
            Some(BassDropEvent::Start)
        );
    }

    #[test]
    fn hysteresis_band_keeps_drop_until_bass_falls_below_end_volume() {
        let mut tracker = rhythmic_tracker();
        assert_eq!(
            tracker.update(&bass_frame(255), true).bass_drop,
            Some(BassDropEvent::Start)
        );
        assert_eq!(
            tracker.update(&bass_frame(255), true).bass_drop,
            Some(BassDropEvent::Sustain)
        );

        for level in [250, 220, 196] {
            assert!(tracker.update(&bass_frame(level), true).bass_drop.is_none());
            assert!(tracker.bass_dropped());
        }

        assert_eq!(
            tracker.update(&bass_frame(194), true).bass_drop,
            Some(BassDropEvent::End)
        );
        assert!(!tracker.bass_dropped());
    }

    #[test]
    fn forced_end_reports_whether_a_drop_was_active() {
        let mut tracker = rhythmic_tracker();
        assert!(!tracker.force_end_drop());
        tracker.update(&bass_frame(255), true);
        assert!(tracker.force_end_drop());
        assert!(!tracker.bass_dropped());
    }

    #[test]
    fn bpm_window_converts_hits_per_window() {
        let mut bpm = BpmEstimator::new(60, 3);
        let mut measurement = None;
        for frame in 0..60 {
            let bass = if frame == 10 || frame == 40 { 230.0 } else { 0.0 };
            measurement = bpm.observe(bass, 220.0);
        }
        assert_eq!(measurement, Some(2.0));
        assert_eq!(bpm.estimate(), Some(2.0));
    }

    #[test]
    fn bpm_history_keeps_the_latest_measurements() {
        let mut bpm = BpmEstimator::new(1, 3);
        for bass in [230.0, 0.0, 230.0, 230.0] {
            bpm.observe(bass, 220.0);
        }
        assert_eq!(bpm.history().collect::<Vec<_>>(), vec![0.0, 60.0, 60.0]);
        assert_eq!(bpm.estimate(), Some(40.0));
    }

    #[test]
    fn rejects_empty_bin_ranges() {
        let config = TrackerConfig {
            beat_track_bin_end: 0,
            ..Default::default()
        };
        assert!(BeatTracker::new(config, BINS).is_err());
    }

    #[test]
    #[should_panic]
    fn short_spectrum_is_a_contract_violation() {
        let mut tracker = new_tracker(TrackerConfig::default());
        tracker.update(&[0; 8], true);
    }

    proptest! {
        #[test]
        fn cutoff_never_drops_below_beat_min(levels in proptest::collection::vec(0u8..=255, 1..200)) {
            let mut tracker = new_tracker(TrackerConfig::default());
            for level in levels {
                tracker.update(&frame(level), true);
                prop_assert!(tracker.beat_cut_off() >= tracker.config().beat_min);
            }
        }
    }
}
