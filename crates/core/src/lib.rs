//! Core library for the particle visualiser.
//!
//! Each animation frame flows one way through the crate: a [`FrameSource`]
//! supplies spectrum and waveform bytes, the [`BeatTracker`] classifies the
//! spectrum into beats and bass drop transitions, and the
//! [`ParticleController`] spawns, ages and prunes particles, moves the star
//! field and renders everything into a [`Canvas`]. The [`FrameScheduler`]
//! runs that pipeline once per tick.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod controller;
pub mod effects;
pub mod error;
pub mod particle;
pub mod render;
pub mod smoothing;
pub mod stars;
pub mod timeline;
pub mod tracker;

pub use analysis::Analyser;
pub use audio::{AnalyserSource, SignalSource, SyntheticTrack, TrackSettings};
pub use config::{AppConfig, AudioConfig, SpawnConfig, StarConfig, TrackerConfig};
pub use controller::{FrameReport, ParticleController};
pub use effects::{EffectEvent, EffectLog, NoEffects, Vignette, VisualEffects};
pub use error::{Result, VisualiserError};
pub use particle::{Particle, ParticleControls, SharedControls};
pub use render::{Canvas, CanvasBounds, Color, DrawList};
pub use smoothing::apply_smoothing;
pub use stars::{Star, StarColorMode, StarField};
pub use timeline::{FrameScheduler, FrameSource, PlaybackClock, PlaybackState, RunSummary};
pub use tracker::{BassDropEvent, BeatTier, BeatTracker, TrackerFrame};
