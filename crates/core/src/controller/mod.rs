//! Per-frame orchestration: beat tracking, particle spawning, ageing and
//! pruning, star motion, and forwarding of tracker events to the visual
//! effects collaborator.

use std::f32::consts::TAU;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, SpawnConfig, TrackerConfig},
    effects::{NoEffects, VisualEffects},
    particle::{waveform_deviation, Particle, ParticleControls, SharedControls},
    render::{Canvas, CanvasBounds},
    stars::StarField,
    tracker::{BassDropEvent, BeatTier, BeatTracker, TrackerFrame},
    Result,
};

/// Largest value a spectrum bin can hold.
const MAX_ENERGY: f32 = 255.0;

/// Outcome of one [`ParticleController::update_and_render`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub tracker: TrackerFrame,
    pub spawned: usize,
    pub pruned: usize,
    pub live: usize,
    /// Waveform deviation shared with the star field this frame.
    pub deviation: f32,
    pub bpm: Option<f32>,
    pub bass_dropped: bool,
}

/// Index of the waveform sample driving the `particle_index`-th live particle.
///
/// The live set and the waveform differ in length, so particles are spread
/// proportionally over the waveform. Recomputed every frame as the count changes.
pub fn waveform_index(particle_index: usize, waveform_len: usize, particle_count: usize) -> usize {
    particle_index * waveform_len / particle_count
}

/// Applies the linear tilt and treble boost to a bin's energy.
pub fn shaped_energy(bin: usize, bin_count: usize, energy: u8, spawn: &SpawnConfig) -> f32 {
    let scaled_index = if bin_count > 1 {
        bin as f32 / (bin_count - 1) as f32
    } else {
        0.0
    };
    let percent = scaled_index * 2.0 - 1.0;
    let tilt = 1.0 + spawn.frequency_scale_factor * percent;
    let treble = if bin as f32 > bin_count as f32 * spawn.treble_threshold {
        spawn.treble_boost
    } else {
        1.0
    };
    energy as f32 * tilt * treble
}

/// Owns the live particle set, the star field and the beat tracker.
pub struct ParticleController<E: VisualEffects = NoEffects> {
    spawn: SpawnConfig,
    fft_size: usize,
    controls: SharedControls,
    tracker: BeatTracker,
    particles: Vec<Particle>,
    stars: Option<StarField>,
    bounds: CanvasBounds,
    /// Responsiveness after the per-beat loudness adjustment.
    responsiveness: f32,
    effects: E,
    rng: StdRng,
}

impl<E: VisualEffects> ParticleController<E> {
    /// Validates `config` and creates the star field for `bounds`.
    pub fn new(
        config: &AppConfig,
        controls: SharedControls,
        bounds: CanvasBounds,
        effects: E,
    ) -> Result<Self> {
        config.validate()?;
        controls.snapshot()?.validate()?;

        let tracker = BeatTracker::new(config.tracker.clone(), config.audio.bin_count())?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let stars = config
            .stars
            .enabled
            .then(|| StarField::create(&config.stars, bounds, &mut rng));
        let responsiveness = controls.snapshot()?.frequency_responsiveness;

        Ok(Self {
            spawn: config.spawn.clone(),
            fft_size: config.audio.fft_size,
            controls,
            tracker,
            particles: Vec::new(),
            stars,
            bounds,
            responsiveness,
            effects,
            rng,
        })
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn stars(&self) -> Option<&StarField> {
        self.stars.as_ref()
    }

    pub fn tracker(&self) -> &BeatTracker {
        &self.tracker
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    pub fn effects(&self) -> &E {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut E {
        &mut self.effects
    }

    pub fn responsiveness(&self) -> f32 {
        self.responsiveness
    }

    /// Number of spectrum bins each frame must carry.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Runs one full tick and draws stars, then particles, into `canvas`.
    ///
    /// # Panics
    ///
    /// Panics if the frames are empty, differ in length, or do not match the
    /// configured bin count.
    pub fn update_and_render(
        &mut self,
        spectrum: &[u8],
        waveform: &[u8],
        bounds: CanvasBounds,
        canvas: &mut dyn Canvas,
    ) -> Result<FrameReport> {
        assert!(!spectrum.is_empty(), "spectrum frame must not be empty");
        assert_eq!(
            spectrum.len(),
            waveform.len(),
            "spectrum and waveform frames must have equal length"
        );
        assert_eq!(
            spectrum.len(),
            self.bin_count(),
            "spectrum frame does not match the configured transform size"
        );

        if bounds != self.bounds {
            self.bounds = bounds;
            if let Some(stars) = self.stars.as_mut() {
                stars.set_bounds(bounds);
            }
        }

        let controls = self.controls.snapshot()?;
        let tracked = self.tracker.update(spectrum, controls.bass_drop_enabled);

        match tracked.bass_drop {
            Some(BassDropEvent::Start) => self.start_bass_drop()?,
            Some(BassDropEvent::Sustain) => {
                if let Some(stars) = self.stars.as_mut() {
                    stars.rainbow();
                }
                self.effects.on_bass_drop_sustain();
            }
            Some(BassDropEvent::End) => self.finish_bass_drop()?,
            None => {}
        }

        // The drop transitions above may have changed the controls.
        let controls = self.controls.snapshot()?;

        let mut spawned = 0;
        if tracked.beat {
            self.responsiveness = controls.frequency_responsiveness
                + (tracked.average - self.spawn.responsiveness_pivot) / 100.0;
            self.raise_tier(&tracked);
            spawned = self.spawn_particles(spectrum, &controls);
        }

        let waveform_len = waveform.len();
        let count = self.particles.len();
        for (index, particle) in self.particles.iter_mut().enumerate() {
            let sample = waveform[waveform_index(index, waveform_len, count)];
            let deviation = waveform_deviation(sample as f32, self.responsiveness);
            particle.update(deviation, &controls, self.spawn.scatter_speed, &mut self.rng);
        }

        let before = self.particles.len();
        self.particles.retain(|particle| !particle.is_spent());
        let pruned = before - self.particles.len();

        let mean_sample =
            waveform.iter().map(|&sample| sample as f32).sum::<f32>() / waveform_len as f32;
        let deviation = waveform_deviation(mean_sample, self.responsiveness);
        if let Some(stars) = self.stars.as_mut() {
            stars.update(deviation);
            stars.draw(canvas);
        }
        for particle in &self.particles {
            particle.draw(canvas);
        }

        self.effects.on_frame_end();

        tracing::trace!(
            spawned,
            pruned,
            live = self.particles.len(),
            average = tracked.average,
            "frame processed"
        );

        Ok(FrameReport {
            spawned,
            pruned,
            live: self.particles.len(),
            deviation,
            bpm: self.tracker.bpm(),
            bass_dropped: self.tracker.bass_dropped(),
            tracker: tracked,
        })
    }

    fn raise_tier(&mut self, tracked: &TrackerFrame) {
        let intensity = (tracked.average / MAX_ENERGY).clamp(0.0, 1.0);
        match tracked.tier {
            Some(BeatTier::VeryLoud) => {
                tracing::debug!(peak = tracked.peak_energy, "very loud beat");
                if let Some(stars) = self.stars.as_mut() {
                    stars.randomize_direction(&mut self.rng);
                    stars.randomize_colors(&mut self.rng);
                }
                self.effects.on_very_loud_beat(intensity);
            }
            Some(BeatTier::Loud) => {
                tracing::debug!(average = tracked.average, "loud beat");
                if let Some(stars) = self.stars.as_mut() {
                    stars.randomize_direction(&mut self.rng);
                }
                self.effects.on_beat(intensity);
            }
            None => {}
        }
    }

    fn spawn_particles(&mut self, spectrum: &[u8], controls: &ParticleControls) -> usize {
        let bin_count = spectrum.len();
        let angle_increment = TAU / (self.fft_size as f32 / controls.circularization_factor);
        let (center_x, center_y) = self.bounds.center();
        let threshold = self.tracker.config().audible_threshold;
        let before = self.particles.len();

        for (bin, &energy) in spectrum.iter().enumerate() {
            if shaped_energy(bin, bin_count, energy, &self.spawn) <= threshold {
                continue;
            }

            let angle = bin as f32 * angle_increment;
            let x = center_x + angle.cos() * self.spawn.spawn_radius;
            let y = center_y + angle.sin() * self.spawn.spawn_radius;
            let fraction = energy as f32 / MAX_ENERGY;
            self.particles.push(Particle::spawn(
                x,
                y,
                angle,
                bin,
                controls.base_speed * fraction,
                controls.base_radius * fraction,
                controls,
            ));
        }

        self.particles.len() - before
    }

    fn start_bass_drop(&mut self) -> Result<()> {
        let boost = self.tracker.config().clone();
        self.controls.update(|controls| apply_drop_boost(controls, &boost))?;
        tracing::info!(bpm = ?self.tracker.bpm(), "bass dropped");
        if let Some(stars) = self.stars.as_mut() {
            stars.rainbow();
        }
        self.effects.on_bass_drop_start();
        Ok(())
    }

    fn finish_bass_drop(&mut self) -> Result<()> {
        let defaults = *self.controls.defaults();
        self.controls.update(|controls| {
            controls.base_speed = defaults.base_speed;
            controls.base_radius = defaults.base_radius;
            controls.frequency_responsiveness = defaults.frequency_responsiveness;
        })?;
        tracing::info!("bass drop ended");
        if let Some(stars) = self.stars.as_mut() {
            stars.reset_white();
        }
        self.effects.on_bass_drop_end();
        Ok(())
    }

    /// Marks every live particle as runaway. They scatter and fade over the
    /// next frames and prune themselves.
    pub fn clear_particles(&mut self) {
        for particle in &mut self.particles {
            particle.runaway = true;
        }
    }

    /// Zeroes every star's velocity.
    pub fn stop_stars(&mut self) {
        if let Some(stars) = self.stars.as_mut() {
            stars.stop();
        }
    }

    /// Ends an active bass drop immediately. Returns whether one was active.
    pub fn end_bass_drop(&mut self) -> Result<bool> {
        if !self.tracker.force_end_drop() {
            return Ok(false);
        }
        self.finish_bass_drop()?;
        Ok(true)
    }

    /// Flips whether bass drops may start, ending any active drop when they
    /// become disabled. Returns the new state.
    pub fn toggle_bass_drop_end(&mut self) -> Result<bool> {
        let enabled = self.controls.update(|controls| {
            controls.bass_drop_enabled = !controls.bass_drop_enabled;
            controls.bass_drop_enabled
        })?;
        if !enabled {
            self.end_bass_drop()?;
        }
        tracing::info!(enabled, "bass drops toggled");
        Ok(enabled)
    }
}

fn apply_drop_boost(controls: &mut ParticleControls, tracker: &TrackerConfig) {
    controls.base_speed = tracker.drop_base_speed;
    controls.base_radius = tracker.drop_base_radius;
    controls.frequency_responsiveness *= tracker.drop_responsiveness_factor;
}

impl<E: VisualEffects> std::fmt::Debug for ParticleController<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleController")
            .field("particles", &self.particles.len())
            .field("stars", &self.stars.as_ref().map(StarField::len))
            .field("bounds", &self.bounds)
            .field("responsiveness", &self.responsiveness)
            .field("bass_dropped", &self.tracker.bass_dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effects::{EffectEvent, EffectLog},
        render::DrawList,
        stars::StarColorMode,
    };

    const BINS: usize = 256;
    const FLAT: [u8; BINS] = [128; BINS];

    fn bounds() -> CanvasBounds {
        CanvasBounds::new(800.0, 600.0)
    }

    fn config(stars: usize) -> AppConfig {
        let mut config = AppConfig {
            seed: Some(42),
            ..Default::default()
        };
        config.stars.count = stars;
        config
    }

    fn controller(config: &AppConfig) -> ParticleController<EffectLog> {
        ParticleController::new(
            config,
            SharedControls::new(config.particles),
            bounds(),
            EffectLog::new(),
        )
        .unwrap()
    }

    fn tick(controller: &mut ParticleController<EffectLog>, spectrum: &[u8]) -> FrameReport {
        let mut canvas = DrawList::new();
        controller
            .update_and_render(spectrum, &FLAT, bounds(), &mut canvas)
            .unwrap()
    }

    fn bass(level: u8) -> Vec<u8> {
        let mut spectrum = vec![0; BINS];
        spectrum[..4].fill(level);
        spectrum
    }

    #[test]
    fn silence_spawns_nothing_and_raises_nothing() {
        let mut controller = controller(&config(0));
        for _ in 0..100 {
            let report = tick(&mut controller, &[0; BINS]);
            assert_eq!(report.spawned, 0);
            assert!(!report.tracker.beat);
        }
        assert!(controller.particles().is_empty());
        assert!(controller.effects().events().is_empty());
        assert!(!controller.tracker().bass_dropped());
    }

    #[test]
    fn spawns_shaped_bins_on_a_circle_around_the_centre() {
        let config = config(0);
        let mut controller = controller(&config);
        let spectrum = [200; BINS];

        let expected = (0..BINS)
            .filter(|&bin| shaped_energy(bin, BINS, 200, &config.spawn) > 110.0)
            .count();
        let report = tick(&mut controller, &spectrum);

        assert!(report.tracker.beat);
        assert_eq!(report.spawned, expected);
        assert_eq!(controller.particles().len(), expected);
        assert!(controller.particles().iter().all(|p| p.bin > 0));

        let increment = TAU / (512.0 / 2.35);
        for particle in controller.particles() {
            assert!((particle.angle - particle.bin as f32 * increment).abs() < 0.02);
            assert!((particle.radius - 8.0 * 200.0 / 255.0).abs() < 0.1);
            assert!((particle.speed - 2.0 * 200.0 / 255.0).abs() < 1e-5);
        }
    }

    #[test]
    fn shaping_tilts_towards_treble() {
        let spawn = SpawnConfig::default();
        assert!((shaped_energy(0, BINS, 200, &spawn) - 90.0).abs() < 1e-3);
        assert!((shaped_energy(BINS - 1, BINS, 200, &spawn) - 200.0 * 1.55 * 1.4).abs() < 1e-2);
        assert!((shaped_energy(0, 1, 100, &spawn) - 45.0).abs() < 1e-4);
    }

    #[test]
    fn remaps_particles_proportionally_onto_the_waveform() {
        assert_eq!(waveform_index(0, 256, 10), 0);
        assert_eq!(waveform_index(5, 256, 10), 128);
        assert_eq!(waveform_index(9, 256, 10), 230);
        assert_eq!(waveform_index(999, 256, 1000), 255);
    }

    #[test]
    fn prunes_particles_once_the_next_fade_would_hide_them() {
        let mut config = config(0);
        config.particles.alpha_fade_per_frame = 0.3;
        let mut controller = controller(&config);

        let report = tick(&mut controller, &[200; BINS]);
        let spawned = report.spawned;
        assert_eq!(report.live, spawned);

        // alpha: 0.7 after the spawn frame, then 0.4, then 0.1 <= 0.3.
        assert_eq!(tick(&mut controller, &[0; BINS]).live, spawned);
        let report = tick(&mut controller, &[0; BINS]);
        assert_eq!(report.pruned, spawned);
        assert_eq!(report.live, 0);
    }

    #[test]
    fn clearing_scatters_particles_until_they_prune_themselves() {
        let mut controller = controller(&config(0));
        tick(&mut controller, &[200; BINS]);
        let live = controller.particles().len();
        assert!(live > 0);

        controller.clear_particles();
        assert_eq!(controller.particles().len(), live);
        assert!(controller.particles().iter().all(|p| p.runaway));

        tick(&mut controller, &[0; BINS]);
        assert!(controller.particles().iter().all(|p| p.is_scattering()));

        for _ in 0..200 {
            tick(&mut controller, &[0; BINS]);
        }
        assert!(controller.particles().is_empty());
    }

    #[test]
    fn control_edits_reach_live_particles() {
        let mut controller = controller(&config(0));
        tick(&mut controller, &[200; BINS]);
        assert!(!controller.particles().is_empty());

        controller
            .controls()
            .update(|c| c.alpha_fade_per_frame = 1.0)
            .unwrap();
        let report = tick(&mut controller, &[0; BINS]);
        assert_eq!(report.live, 0);
    }

    #[test]
    fn loud_beats_reach_effects_and_move_stars() {
        let mut controller = controller(&config(20));
        let mut canvas = DrawList::new();
        let report = controller
            .update_and_render(&[230; BINS], &FLAT, bounds(), &mut canvas)
            .unwrap();

        assert_eq!(report.tracker.tier, Some(BeatTier::Loud));
        assert!(matches!(
            controller.effects().events(),
            [EffectEvent::Beat(_)]
        ));
        let stars = controller.stars().unwrap();
        assert!(stars.stars().iter().any(|s| s.vx != 0.0));
        assert_eq!(canvas.len(), 20 + report.live);

        controller.stop_stars();
        assert!(controller
            .stars()
            .unwrap()
            .stars()
            .iter()
            .all(|s| s.vx == 0.0 && s.vy == 0.0));
    }

    #[test]
    fn very_loud_beats_recolour_stars() {
        let mut controller = controller(&config(5));
        let mut spectrum = [10; BINS];
        spectrum[2] = 255;
        let report = tick(&mut controller, &spectrum);

        assert_eq!(report.tracker.tier, Some(BeatTier::VeryLoud));
        assert!(matches!(
            controller.effects().events(),
            [EffectEvent::VeryLoudBeat(_)]
        ));
        assert_eq!(
            controller.stars().unwrap().color_mode(),
            StarColorMode::Random
        );
    }

    fn rhythmic_controller() -> ParticleController<EffectLog> {
        let mut config = config(5);
        config.tracker.bpm_window_frames = 4;
        let mut controller = controller(&config);
        for _ in 0..4 {
            tick(&mut controller, &bass(230));
        }
        controller.effects_mut().clear();
        controller
    }

    #[test]
    fn bass_drop_boosts_and_restores_controls() {
        let mut controller = rhythmic_controller();

        let report = tick(&mut controller, &bass(255));
        assert!(report.bass_dropped);
        let boosted = controller.controls().snapshot().unwrap();
        assert_eq!(boosted.base_speed, 5.0);
        assert_eq!(boosted.base_radius, 15.0);
        assert_eq!(boosted.frequency_responsiveness, 2.0);
        assert_eq!(
            controller.stars().unwrap().color_mode(),
            StarColorMode::Rainbow
        );

        tick(&mut controller, &bass(255));
        tick(&mut controller, &bass(100));
        assert!(!controller.tracker().bass_dropped());

        let drop_events: Vec<_> = controller
            .effects()
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    EffectEvent::BassDropStart | EffectEvent::BassDropSustain | EffectEvent::BassDropEnd
                )
            })
            .copied()
            .collect();
        assert_eq!(
            drop_events,
            vec![
                EffectEvent::BassDropStart,
                EffectEvent::BassDropSustain,
                EffectEvent::BassDropEnd
            ]
        );
        assert_eq!(
            controller.controls().snapshot().unwrap(),
            ParticleControls::default()
        );
        assert_eq!(
            controller.stars().unwrap().color_mode(),
            StarColorMode::White
        );
    }

    #[test]
    fn ending_a_drop_restores_defaults_after_control_edits() {
        let mut controller = rhythmic_controller();
        tick(&mut controller, &bass(255));
        assert!(controller.tracker().bass_dropped());

        controller.controls().reset().unwrap();
        assert!(controller.end_bass_drop().unwrap());
        let restored = controller.controls().snapshot().unwrap();
        assert_eq!(restored.frequency_responsiveness, 1.0);

        tick(&mut controller, &bass(255));
        assert!(controller.tracker().bass_dropped());
        controller
            .controls()
            .update(|c| c.frequency_responsiveness = 3.0)
            .unwrap();
        assert!(controller.end_bass_drop().unwrap());
        assert_eq!(
            controller.controls().snapshot().unwrap(),
            ParticleControls::default()
        );
    }

    #[test]
    fn forced_end_and_toggle() {
        let mut controller = rhythmic_controller();
        assert!(!controller.end_bass_drop().unwrap());

        tick(&mut controller, &bass(255));
        assert!(controller.end_bass_drop().unwrap());
        assert!(!controller.tracker().bass_dropped());
        assert_eq!(
            controller.effects().events().last(),
            Some(&EffectEvent::BassDropEnd)
        );

        tick(&mut controller, &bass(255));
        assert!(controller.tracker().bass_dropped());
        assert!(!controller.toggle_bass_drop_end().unwrap());
        assert!(!controller.tracker().bass_dropped());

        tick(&mut controller, &bass(255));
        assert!(!controller.tracker().bass_dropped());

        assert!(controller.toggle_bass_drop_end().unwrap());
        tick(&mut controller, &bass(255));
        assert!(controller.tracker().bass_dropped());
    }

    #[test]
    fn beats_adjust_responsiveness_around_the_pivot() {
        let mut controller = controller(&config(0));
        tick(&mut controller, &[250; BINS]);
        assert!((controller.responsiveness() - 1.2).abs() < 1e-5);
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let mut config = config(0);
        config.tracker.bass_end_bin = 300;
        let result = ParticleController::new(
            &config,
            SharedControls::default(),
            bounds(),
            NoEffects,
        );
        assert!(result.is_err());
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn mismatched_frames_fail_fast() {
        let mut controller = controller(&config(0));
        let mut canvas = DrawList::new();
        let _ = controller.update_and_render(&[0; BINS], &[128; 8], bounds(), &mut canvas);
    }
}
