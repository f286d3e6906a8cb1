use serde::{Deserialize, Serialize};

use crate::render::CanvasBounds;

/// Receiver for the events raised by the particle controller.
///
/// Every hook defaults to doing nothing. A sustained bass drop re-fires the
/// start effect unless [`VisualEffects::on_bass_drop_sustain`] is overridden.
pub trait VisualEffects {
    fn on_beat(&mut self, _intensity: f32) {}

    fn on_very_loud_beat(&mut self, _intensity: f32) {}

    fn on_bass_drop_start(&mut self) {}

    fn on_bass_drop_sustain(&mut self) {
        self.on_bass_drop_start();
    }

    fn on_bass_drop_end(&mut self) {}

    /// Called once at the end of every tick, after all other hooks.
    fn on_frame_end(&mut self) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl VisualEffects for NoEffects {}

const VIGNETTE_FADE_SPEED: f32 = 0.025;

/// Darkened border that opens up on beats and closes again between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vignette {
    intensity: f32,
    fade_speed: f32,
    beat_this_frame: bool,
}

impl Default for Vignette {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            fade_speed: VIGNETTE_FADE_SPEED,
            beat_this_frame: false,
        }
    }
}

impl Vignette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Radius of the fully transparent centre.
    pub fn inner_radius(&self, bounds: CanvasBounds) -> f32 {
        bounds.width / 4.0 + self.intensity * 40.0
    }

    pub fn outer_radius(&self, bounds: CanvasBounds) -> f32 {
        bounds.width.max(bounds.height) / 2.0
    }

    /// Opacity of the border; stronger beats leave it lighter.
    pub fn opacity(&self) -> f32 {
        (0.9 - self.intensity * 0.2).max(0.0)
    }

    fn pulse(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.beat_this_frame = true;
    }
}

impl VisualEffects for Vignette {
    fn on_beat(&mut self, intensity: f32) {
        self.pulse(intensity);
    }

    fn on_very_loud_beat(&mut self, intensity: f32) {
        self.pulse(intensity);
    }

    fn on_frame_end(&mut self) {
        if !self.beat_this_frame {
            self.intensity = (self.intensity - self.fade_speed).max(0.0);
        }
        self.beat_this_frame = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectEvent {
    Beat(f32),
    VeryLoudBeat(f32),
    BassDropStart,
    BassDropSustain,
    BassDropEnd,
}

/// Records events in the order they were raised.
#[derive(Debug, Default, Clone)]
pub struct EffectLog {
    events: Vec<EffectEvent>,
}

impl EffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[EffectEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl VisualEffects for EffectLog {
    fn on_beat(&mut self, intensity: f32) {
        self.events.push(EffectEvent::Beat(intensity));
    }

    fn on_very_loud_beat(&mut self, intensity: f32) {
        self.events.push(EffectEvent::VeryLoudBeat(intensity));
    }

    fn on_bass_drop_start(&mut self) {
        self.events.push(EffectEvent::BassDropStart);
    }

    fn on_bass_drop_sustain(&mut self) {
        self.events.push(EffectEvent::BassDropSustain);
    }

    fn on_bass_drop_end(&mut self) {
        self.events.push(EffectEvent::BassDropEnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vignette_fades_only_on_frames_without_beats() {
        let mut vignette = Vignette::new();
        vignette.on_frame_end();
        assert!((vignette.intensity() - 0.975).abs() < 1e-6);

        vignette.on_beat(0.8);
        vignette.on_frame_end();
        assert_eq!(vignette.intensity(), 0.8);

        for _ in 0..100 {
            vignette.on_frame_end();
        }
        assert_eq!(vignette.intensity(), 0.0);
        assert!((vignette.opacity() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn vignette_geometry_tracks_intensity() {
        let mut vignette = Vignette::new();
        let bounds = CanvasBounds::new(800.0, 600.0);
        vignette.on_very_loud_beat(1.0);
        assert_eq!(vignette.inner_radius(bounds), 240.0);
        assert_eq!(vignette.outer_radius(bounds), 400.0);
        assert!((vignette.opacity() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn sustain_defaults_to_start() {
        #[derive(Default)]
        struct Starts(usize);
        impl VisualEffects for Starts {
            fn on_bass_drop_start(&mut self) {
                self.0 += 1;
            }
        }

        let mut starts = Starts::default();
        starts.on_bass_drop_sustain();
        assert_eq!(starts.0, 1);
    }
}
