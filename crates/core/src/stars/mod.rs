use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::StarConfig,
    render::{Canvas, CanvasBounds, Color},
};

/// Hue step between consecutive rainbow transitions, in degrees.
const RAINBOW_STEP: f32 = 30.0;
/// Keeps random star colours away from the extremes.
const COLOR_FLOOR: u8 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StarColorMode {
    White,
    Random,
    Rainbow,
}

/// Decorative point that drifts across a field twice the canvas size.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub size: f32,
    pub color: Color,
    pub bounds: CanvasBounds,
}

impl Star {
    pub fn new(x: f32, y: f32, size: f32, bounds: CanvasBounds) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            size,
            color: Color::WHITE,
            bounds,
        }
    }

    /// Moves the star, wrapping across `[-extent, 2 * extent]` on both axes,
    /// then applies friction to its velocity.
    pub fn advance(&mut self, deviation: f32, friction: f32) {
        self.x += self.vx * (1.0 + deviation);
        self.y += self.vy * (1.0 + deviation);

        self.x = wrap(self.x, self.bounds.width);
        self.y = wrap(self.y, self.bounds.height);

        self.vx *= friction;
        self.vy *= friction;
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        canvas.fill_circle(self.x, self.y, self.size, self.color, 1.0);
    }
}

fn wrap(position: f32, extent: f32) -> f32 {
    if position > extent * 2.0 {
        -extent
    } else if position < -extent {
        extent * 2.0
    } else {
        position
    }
}

/// The session's fixed population of stars.
#[derive(Debug, Clone)]
pub struct StarField {
    stars: Vec<Star>,
    speed: f32,
    friction: f32,
    color_mode: StarColorMode,
    rainbow_offset: f32,
}

impl StarField {
    /// Creates `config.count` motionless white stars scattered over the
    /// doubled field.
    pub fn create<R: Rng + ?Sized>(config: &StarConfig, bounds: CanvasBounds, rng: &mut R) -> Self {
        let stars = (0..config.count)
            .map(|_| {
                let x = rng.random::<f32>() * bounds.width * 2.0 - bounds.width;
                let y = rng.random::<f32>() * bounds.height * 2.0 - bounds.height;
                let size = rng.random::<f32>() * config.max_size;
                Star::new(x, y, size, bounds)
            })
            .collect();

        Self {
            stars,
            speed: config.speed,
            friction: config.friction,
            color_mode: StarColorMode::White,
            rainbow_offset: 0.0,
        }
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn color_mode(&self) -> StarColorMode {
        self.color_mode
    }

    /// Updates the wrapping extent of every star.
    pub fn set_bounds(&mut self, bounds: CanvasBounds) {
        for star in &mut self.stars {
            star.bounds = bounds;
        }
    }

    pub fn update(&mut self, deviation: f32) {
        for star in &mut self.stars {
            star.advance(deviation, self.friction);
        }
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) {
        for star in &self.stars {
            star.draw(canvas);
        }
    }

    /// Gives every star a fresh random velocity in `[-speed, speed)` per axis.
    pub fn randomize_direction<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let speed = self.speed;
        for star in &mut self.stars {
            star.vx = rng.random::<f32>() * speed * 2.0 - speed;
            star.vy = rng.random::<f32>() * speed * 2.0 - speed;
        }
    }

    pub fn stop(&mut self) {
        for star in &mut self.stars {
            star.vx = 0.0;
            star.vy = 0.0;
        }
    }

    pub fn randomize_colors<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for star in &mut self.stars {
            star.color = Color::rgb(
                rng.random_range(COLOR_FLOOR..=u8::MAX - COLOR_FLOOR),
                rng.random_range(COLOR_FLOOR..=u8::MAX - COLOR_FLOOR),
                rng.random_range(COLOR_FLOOR..=u8::MAX - COLOR_FLOOR),
            );
        }
        self.color_mode = StarColorMode::Random;
    }

    /// Spreads the hue wheel across the field. Each call rotates the wheel so
    /// repeated calls during a sustained drop keep alternating.
    pub fn rainbow(&mut self) {
        let count = self.stars.len().max(1) as f32;
        for (index, star) in self.stars.iter_mut().enumerate() {
            let hue = index as f32 / count * 360.0 + self.rainbow_offset;
            star.color = Color::hsl(hue, 1.0, 0.6);
        }
        self.rainbow_offset = (self.rainbow_offset + RAINBOW_STEP) % 360.0;
        self.color_mode = StarColorMode::Rainbow;
    }

    pub fn reset_white(&mut self) {
        for star in &mut self.stars {
            star.color = Color::WHITE;
        }
        self.color_mode = StarColorMode::White;
    }
}
