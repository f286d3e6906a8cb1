use std::{
    f32::consts::TAU,
    sync::{Arc, Mutex, MutexGuard},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    render::{Canvas, Color},
    Result, VisualiserError,
};

/// Waveform samples are unsigned bytes centred on this value.
pub const WAVEFORM_CENTER: f32 = 128.0;

/// Tunable physics constants shared by every live particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleControls {
    /// Radians added to a particle's heading per frame.
    pub angular_velocity: f32,
    pub friction: f32,
    pub alpha_fade_per_frame: f32,
    pub radius_growth_per_frame: f32,
    pub speed_multiplier: f32,
    /// Scales how strongly the waveform deviation bends particle motion.
    pub frequency_responsiveness: f32,
    pub base_radius: f32,
    pub base_speed: f32,
    pub min_hue: f32,
    pub max_hue: f32,
    pub bass_drop_enabled: bool,
    /// Larger values wrap the spectrum around a smaller arc.
    pub circularization_factor: f32,
}

impl Default for ParticleControls {
    fn default() -> Self {
        Self {
            angular_velocity: 0.01,
            friction: 0.993,
            alpha_fade_per_frame: 0.006,
            radius_growth_per_frame: 0.05,
            speed_multiplier: 1.0,
            frequency_responsiveness: 1.0,
            base_radius: 8.0,
            base_speed: 2.0,
            min_hue: 0.0,
            max_hue: 360.0,
            bass_drop_enabled: true,
            circularization_factor: 2.35,
        }
    }
}

impl ParticleControls {
    pub fn validate(&self) -> Result<()> {
        if self.circularization_factor <= 0.0 {
            return Err(VisualiserError::config(
                "circularization_factor must be positive",
            ));
        }
        if self.min_hue > self.max_hue {
            return Err(VisualiserError::config("min_hue must not exceed max_hue"));
        }
        if self.alpha_fade_per_frame < 0.0 {
            return Err(VisualiserError::config(
                "alpha_fade_per_frame must not be negative",
            ));
        }
        Ok(())
    }

    /// Hue for a particle spawned at `angle`, spread across the configured range.
    pub fn hue_for_angle(&self, angle: f32) -> f32 {
        let turn = angle.rem_euclid(TAU) / TAU;
        self.min_hue + turn * (self.max_hue - self.min_hue)
    }
}

/// Cloneable handle to the particle control surface.
///
/// Edits made through any clone affect every live and future particle from the
/// next frame on. [`SharedControls::reset`] restores the snapshot the handle
/// was created with.
#[derive(Clone)]
pub struct SharedControls {
    shared: Arc<Mutex<ParticleControls>>,
    defaults: ParticleControls,
}

impl SharedControls {
    pub fn new(defaults: ParticleControls) -> Self {
        Self {
            shared: Arc::new(Mutex::new(defaults)),
            defaults,
        }
    }

    pub fn defaults(&self) -> &ParticleControls {
        &self.defaults
    }

    /// Copies the current values.
    pub fn snapshot(&self) -> Result<ParticleControls> {
        Ok(*self.lock()?)
    }

    pub fn update<R>(&self, edit: impl FnOnce(&mut ParticleControls) -> R) -> Result<R> {
        let mut controls = self.lock()?;
        Ok(edit(&mut controls))
    }

    pub fn reset(&self) -> Result<()> {
        let mut controls = self.lock()?;
        *controls = self.defaults;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ParticleControls>> {
        self.shared
            .lock()
            .map_err(|_| VisualiserError::msg("particle controls have been poisoned"))
    }
}

impl Default for SharedControls {
    fn default() -> Self {
        Self::new(ParticleControls::default())
    }
}

impl std::fmt::Debug for SharedControls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedControls")
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Converts a waveform level into the signed motion modulation applied to
/// particles and stars. Negative responsiveness inverts the modulation and
/// zero switches it off.
pub fn waveform_deviation(sample: f32, responsiveness: f32) -> f32 {
    if responsiveness == 0.0 {
        return 0.0;
    }
    (sample - WAVEFORM_CENTER) / (32.0 / responsiveness)
}

/// A single animated point spawned from one spectrum bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub angle: f32,
    pub angular_velocity: f32,
    pub friction: f32,
    pub speed: f32,
    pub radius: f32,
    pub radius_growth_per_frame: f32,
    pub alpha: f32,
    pub alpha_fade_per_frame: f32,
    /// Fixed at spawn from the hue range in effect at that moment.
    pub color: Color,
    /// Spectrum bin the particle was spawned from.
    pub bin: usize,
    /// Set to request the scatter exit animation.
    pub runaway: bool,
    ran: bool,
}

impl Particle {
    pub fn spawn(
        x: f32,
        y: f32,
        angle: f32,
        bin: usize,
        speed: f32,
        radius: f32,
        controls: &ParticleControls,
    ) -> Self {
        Self {
            x,
            y,
            vx: angle.cos() * speed,
            vy: angle.sin() * speed,
            angle,
            angular_velocity: controls.angular_velocity,
            friction: controls.friction,
            speed,
            radius,
            radius_growth_per_frame: controls.radius_growth_per_frame,
            alpha: 1.0,
            alpha_fade_per_frame: controls.alpha_fade_per_frame,
            color: Color::hsl(controls.hue_for_angle(angle), 1.0, 0.5),
            bin,
            runaway: false,
            ran: false,
        }
    }

    /// Whether the scatter velocity has already been assigned.
    pub fn is_scattering(&self) -> bool {
        self.ran
    }

    /// Advances the particle by one frame.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        deviation: f32,
        controls: &ParticleControls,
        scatter_speed: f32,
        rng: &mut R,
    ) {
        self.angular_velocity = controls.angular_velocity;
        self.friction = controls.friction;
        self.radius_growth_per_frame = controls.radius_growth_per_frame;
        self.alpha_fade_per_frame = controls.alpha_fade_per_frame;

        if self.runaway {
            self.scatter(scatter_speed, rng);
            return;
        }

        let swing = 1.0 + deviation.abs();

        self.x += self.vx * (1.0 + deviation);
        self.y += self.vy * (1.0 + deviation);

        self.angle += self.angular_velocity * swing;

        let speed = self.speed * controls.speed_multiplier;
        self.vx = self.angle.cos() * speed * self.friction;
        self.vy = self.angle.sin() * speed * self.friction;

        self.radius += self.radius_growth_per_frame * swing;
        self.alpha = (self.alpha - self.alpha_fade_per_frame * swing).max(0.0);
    }

    fn scatter<R: Rng + ?Sized>(&mut self, scatter_speed: f32, rng: &mut R) {
        if !self.ran {
            let heading = rng.random::<f32>() * TAU;
            let magnitude = self.speed * scatter_speed * (0.5 + rng.random::<f32>());
            self.vx = heading.cos() * magnitude;
            self.vy = heading.sin() * magnitude;
            self.ran = true;
        }

        self.x += self.vx;
        self.y += self.vy;
        self.alpha = (self.alpha - self.alpha_fade_per_frame * 2.0).max(0.0);
    }

    /// True once the next frame would take the particle out of sight.
    pub fn is_spent(&self) -> bool {
        self.alpha <= self.alpha_fade_per_frame || self.radius <= -self.radius_growth_per_frame
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        canvas.fill_circle(self.x, self.y, self.radius.max(0.0), self.color, self.alpha);
    }
}
