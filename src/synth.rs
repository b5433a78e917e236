use std::f32::consts::TAU;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::audio::Stereo;
use crate::pattern::Instrument;
use crate::SAMPLE_RATE;

/// Multiplicative envelopes can't reach zero, so every decay ramps to this
/// floor instead.
pub const ENV_FLOOR: f32 = 0.001;

/// No voice is allowed to collapse below this, whatever its decay setting.
pub const MIN_DURATION: f32 = 0.1;

pub fn pitch_ratio(tune: i8) -> f32 {
    f32::powf(2.0, tune as f32 / 12.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wave {
    Sine,
    Triangle,
    Square,
    Saw,
}

/// Exponential glide from the layer's start frequency to `target`.
#[derive(Clone, Copy, Debug)]
pub struct Sweep {
    pub target: f32,
    pub time: f32,
}

#[derive(Clone, Copy, Debug)]
pub enum Source {
    Osc {
        wave: Wave,
        freq: f32,
        sweep: Option<Sweep>,
    },
    Noise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
    BandPass,
}

#[derive(Clone, Copy, Debug)]
pub struct FilterSpec {
    pub mode: FilterMode,
    pub freq: f32,
    pub q: f32,
}

/// One source -> filter -> envelope chain of a voice.
#[derive(Clone, Copy, Debug)]
pub struct LayerSpec {
    pub source: Source,
    pub filter: Option<FilterSpec>,
    pub gain: f32,
    /// Seconds after the trigger before this layer starts (clap bursts).
    pub onset: f32,
    pub duration: f32,
}

/// A complete drum hit as data. Rendering happens in [`SynthVoice`]; the
/// description itself stays a pure function of the trigger parameters so the
/// synthesis math is testable without an audio backend.
#[derive(Clone, Debug)]
pub struct VoiceSpec {
    pub layers: Vec<LayerSpec>,
}

impl VoiceSpec {
    /// Seconds until the last layer reaches its floor.
    pub fn total_duration(&self) -> f32 {
        self.layers
            .iter()
            .map(|l| l.onset + l.duration)
            .fold(0.0, f32::max)
    }
}

/// Build the description of one drum hit.
///
/// `velocity` is the 0..=1 track level, `tune` shifts every oscillator by
/// semitones, `decay` (1..=100) scales each voice's characteristic maximum
/// duration.
pub fn voice(instrument: Instrument, velocity: f32, tune: i8, decay: u8) -> VoiceSpec {
    let ratio = pitch_ratio(tune);
    let span = |ceiling: f32| f32::max(MIN_DURATION, decay as f32 / 100.0 * ceiling);

    let layers = match instrument {
        Instrument::Kick => {
            // Two detuned oscillators with a fast downward sweep into a
            // low-pass give the punch; the second runs an octave below.
            let base = 60.0 * ratio;
            let duration = span(1.5);
            let lowpass = Some(FilterSpec {
                mode: FilterMode::LowPass,
                freq: 200.0,
                q: 1.0,
            });
            vec![
                LayerSpec {
                    source: Source::Osc {
                        wave: Wave::Sine,
                        freq: base,
                        sweep: Some(Sweep {
                            target: base * 0.1,
                            time: 0.1,
                        }),
                    },
                    filter: lowpass,
                    gain: velocity,
                    onset: 0.0,
                    duration,
                },
                LayerSpec {
                    source: Source::Osc {
                        wave: Wave::Triangle,
                        freq: base * 0.5,
                        sweep: Some(Sweep {
                            target: base * 0.05,
                            time: 0.1,
                        }),
                    },
                    filter: lowpass,
                    gain: velocity,
                    onset: 0.0,
                    duration,
                },
            ]
        }
        Instrument::Snare => {
            // High-passed noise for the rattle, a band-passed triangle for
            // the body; the tone rings twice as long as the noise.
            let duration = span(0.3);
            vec![
                LayerSpec {
                    source: Source::Noise,
                    filter: Some(FilterSpec {
                        mode: FilterMode::HighPass,
                        freq: 1000.0,
                        q: 0.707,
                    }),
                    gain: velocity * 0.8,
                    onset: 0.0,
                    duration,
                },
                LayerSpec {
                    source: Source::Osc {
                        wave: Wave::Triangle,
                        freq: 200.0 * ratio,
                        sweep: None,
                    },
                    filter: Some(FilterSpec {
                        mode: FilterMode::BandPass,
                        freq: 200.0,
                        q: 5.0,
                    }),
                    gain: velocity * 0.4,
                    onset: 0.0,
                    duration: duration * 2.0,
                },
            ]
        }
        Instrument::OpenHat => {
            metallic_stack(&[8372.0, 9956.0, 11850.0, 14134.0], ratio, |i| {
                (Wave::Square, velocity * 0.1 * (1.0 - i as f32 * 0.1), span(0.8))
            })
        }
        Instrument::ClosedHat => {
            metallic_stack(&[10000.0, 12000.0, 14000.0, 16000.0], ratio, |i| {
                (Wave::Square, velocity * 0.05 * (1.0 - i as f32 * 0.1), span(0.1))
            })
        }
        Instrument::Clap => {
            // Four staggered noise bursts read as one pair of hands.
            [0.0, 0.01, 0.02, 0.04]
                .iter()
                .map(|&onset| LayerSpec {
                    source: Source::Noise,
                    filter: Some(FilterSpec {
                        mode: FilterMode::BandPass,
                        freq: 1000.0 * ratio,
                        q: 3.0,
                    }),
                    gain: velocity * 0.6,
                    onset,
                    duration: span(0.2),
                })
                .collect()
        }
        Instrument::Crash => {
            metallic_stack(&[4186.0, 5274.0, 6645.0, 8372.0, 10548.0], ratio, |i| {
                (Wave::Saw, velocity * 0.08 * (1.0 - i as f32 * 0.15), span(2.0))
            })
        }
        Instrument::Cowbell => {
            let duration = span(0.4);
            [562.0, 845.0]
                .iter()
                .map(|&freq| LayerSpec {
                    source: Source::Osc {
                        wave: Wave::Triangle,
                        freq: freq * ratio,
                        sweep: None,
                    },
                    filter: None,
                    gain: velocity * 0.6,
                    onset: 0.0,
                    duration,
                })
                .collect()
        }
        Instrument::Clave => vec![LayerSpec {
            source: Source::Osc {
                wave: Wave::Triangle,
                freq: 2500.0 * ratio,
                sweep: None,
            },
            filter: Some(FilterSpec {
                mode: FilterMode::BandPass,
                freq: 2500.0,
                q: 10.0,
            }),
            gain: velocity * 0.8,
            onset: 0.0,
            duration: span(0.15),
        }],
    };

    VoiceSpec { layers }
}

/// Inharmonic oscillator bank with per-partial gain falloff, the shared
/// skeleton of the hats and the crash.
fn metallic_stack<F>(freqs: &[f32], ratio: f32, mut layer: F) -> Vec<LayerSpec>
where
    F: FnMut(usize) -> (Wave, f32, f32),
{
    freqs
        .iter()
        .enumerate()
        .map(|(i, &freq)| {
            let (wave, gain, duration) = layer(i);
            LayerSpec {
                source: Source::Osc {
                    wave,
                    freq: freq * ratio,
                    sweep: None,
                },
                filter: None,
                gain,
                onset: 0.0,
                duration,
            }
        })
        .collect()
}

// RBJ biquad, direct form 1.
#[derive(Clone, Copy, Debug)]
struct Biquad {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    fn new(spec: FilterSpec) -> Self {
        let w0 = TAU * f32::min(spec.freq / SAMPLE_RATE as f32, 0.49);
        let alpha = w0.sin() / (2.0 * spec.q);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match spec.mode {
            FilterMode::LowPass => {
                let b1 = (1.0 - cos_w0) / a0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterMode::HighPass => {
                let b0 = ((1.0 + cos_w0) / 2.0) / a0;
                (b0, -2.0 * b0, b0)
            }
            FilterMode::BandPass => (alpha / a0, 0.0, -alpha / a0),
        };

        Self {
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            b0,
            b1,
            b2,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

enum LayerSource {
    Osc {
        phase: f32,
        phase_inc: f32,
        wave: Wave,
        sweep_mult: f32,
        sweep_frames: usize,
    },
    Noise(SmallRng),
}

impl LayerSource {
    fn next(&mut self) -> f32 {
        match self {
            LayerSource::Osc {
                phase,
                phase_inc,
                wave,
                sweep_mult,
                sweep_frames,
            } => {
                let sample = match wave {
                    Wave::Sine => (TAU * *phase).sin(),
                    Wave::Triangle => 4.0 * (*phase - 0.5).abs() - 1.0,
                    Wave::Square => {
                        if *phase < 0.5 {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                    Wave::Saw => 2.0 * *phase - 1.0,
                };
                *phase += *phase_inc;
                if *phase >= 1.0 {
                    *phase -= 1.0;
                }
                if *sweep_frames > 0 {
                    *phase_inc *= *sweep_mult;
                    *sweep_frames -= 1;
                }
                sample
            }
            LayerSource::Noise(rng) => rng.gen_range(-1.0..1.0),
        }
    }
}

struct Layer {
    source: LayerSource,
    filter: Option<Biquad>,
    amp: f32,
    amp_mult: f32,
    wait: usize,
    remaining: usize,
}

impl Layer {
    fn new(spec: &LayerSpec) -> Self {
        let frames = to_frames(spec.duration);
        let source = match spec.source {
            Source::Osc { wave, freq, sweep } => {
                let (sweep_mult, sweep_frames) = match sweep {
                    Some(sweep) => {
                        let n = to_frames(sweep.time).max(1);
                        ((sweep.target / freq).powf(1.0 / n as f32), n)
                    }
                    None => (1.0, 0),
                };
                LayerSource::Osc {
                    phase: 0.0,
                    phase_inc: freq / SAMPLE_RATE as f32,
                    wave,
                    sweep_mult,
                    sweep_frames,
                }
            }
            Source::Noise => LayerSource::Noise(SmallRng::from_entropy()),
        };
        // Ramp the gain down to the floor over the layer's lifetime. A
        // zero-level trigger has nothing to ramp and is born silent.
        let (amp, amp_mult, remaining) = if spec.gain > ENV_FLOOR {
            let mult = (ENV_FLOOR / spec.gain).powf(1.0 / frames as f32);
            (spec.gain, mult, frames)
        } else {
            (0.0, 1.0, 0)
        };
        Self {
            source,
            filter: spec.filter.map(Biquad::new),
            amp,
            amp_mult,
            wait: to_frames(spec.onset),
            remaining,
        }
    }
}

/// A sounding drum hit. Holds no state between triggers: every hit compiles
/// its spec into a fresh set of layers and dies when they all reach silence.
pub struct SynthVoice {
    layers: Vec<Layer>,
}

impl SynthVoice {
    pub fn new(spec: &VoiceSpec) -> Self {
        Self {
            layers: spec.layers.iter().map(Layer::new).collect(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.layers.iter().all(|l| l.remaining == 0)
    }

    /// Mix this voice into `buf`. Returns false once the voice has finished.
    pub fn render(&mut self, buf: &mut [Stereo]) -> bool {
        for frame in buf.iter_mut() {
            let mut sum = 0.0;
            for layer in &mut self.layers {
                if layer.wait > 0 {
                    layer.wait -= 1;
                    continue;
                }
                if layer.remaining == 0 {
                    continue;
                }
                let mut sample = layer.source.next();
                if let Some(filter) = &mut layer.filter {
                    sample = filter.process(sample);
                }
                sum += sample * layer.amp;
                layer.amp *= layer.amp_mult;
                layer.remaining -= 1;
            }
            *frame += Stereo::splat(sum);
        }
        !self.is_finished()
    }
}

fn to_frames(seconds: f32) -> usize {
    (seconds * SAMPLE_RATE as f32).round() as usize
}
