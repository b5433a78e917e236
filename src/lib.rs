pub mod audio;
pub mod engine;
pub mod files;
pub mod host;
pub mod pattern;
pub mod resolver;
pub mod sampler;
pub mod state;
pub mod synth;

// Keep https://github.com/RustAudio/cpal/issues/508 in mind
// when changing the sample rate.
pub const SAMPLE_RATE: f64 = 44100.0;
pub const FRAMES_PER_BUFFER: usize = 128;

// Allocate a larger buffer size, because sometimes cpal requests more than the
// configured buffer size when switching the output device.
pub const INTERNAL_BUFFER_SIZE: usize = 4 * FRAMES_PER_BUFFER;
