//! DSP layer: signal primitives the engine is assembled from.
//!
//! Everything here is plain Rust with no platform audio API underneath:
//! the same graph renders offline to WAV and block by block for a host
//! audio callback.

pub mod ambience;
pub mod buffer;
pub mod convolver;
pub mod graph;
pub mod mixer;
pub mod param;
pub mod player;
pub mod renderer;
pub mod reverb;
