//! Online constant-Q spectrogram engine.
//!
//! Streams mono `f32` PCM through a block accumulator, correlates analysis
//! windows against a precomputed constant-Q kernel bank on a data-parallel
//! (bin x frame) grid, and distributes the resulting magnitude columns across
//! a ring of RGBA8 tiles ready for display. Columns live on an absolute time
//! grid derived from the accumulator's sample clock, so output stays
//! gap-free no matter how the input stream is chunked.
//!
//! ```
//! use cqtgram::{CqtEngine, EngineConfig};
//!
//! let mut engine = CqtEngine::new(EngineConfig::default()).unwrap();
//! let silence = vec![0.0f32; 48_000];
//! let columns = engine.push_samples(&silence);
//! assert_eq!(engine.columns_emitted(), columns as u64);
//! ```

pub mod config;
pub mod dsp;
pub mod dump;
pub mod engine;
pub mod render;
pub mod util;

pub use config::{ConfigError, CqtConfig, EngineConfig, TileConfig};
pub use dsp::MagnitudeRing;
pub use dsp::accumulator::SampleAccumulator;
pub use dsp::kernel::KernelBank;
pub use dsp::ring::Ring;
pub use dsp::transform::TransformExecutor;
pub use engine::CqtEngine;
pub use render::colormap::Colormap;
pub use render::tiles::{SpectrogramTile, TileRing};
