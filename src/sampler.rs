use std::io::Cursor;
use std::sync::Arc;

use anyhow::Result;
use hound::{SampleFormat, WavReader};
use log::{debug, warn};

use crate::audio::{Buffer, Frame, Stereo};
use crate::synth::{pitch_ratio, ENV_FLOOR};
use crate::SAMPLE_RATE;

/// Playback duration bounds in seconds: decay 1 maps to the lower bound,
/// decay 100 to the upper.
const MIN_PLAY_SECONDS: f32 = 0.1;
const MAX_PLAY_SECONDS: f32 = 3.0;

/// Headroom so overlapping tracks don't clip the sum.
const SAMPLE_HEADROOM: f32 = 0.8;

/// Where a source came from. Pattern-local sources shadow library sources
/// with the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Pattern,
    Library,
}

/// A raw sample source handed to the core: either WAV bytes still to be
/// decoded, or frames an external decoder already produced. Nothing
/// in-between exists; the resolver only ever sees fully decoded entries.
#[derive(Clone)]
pub enum SampleSource {
    Wav { id: String, bytes: Arc<[u8]> },
    Decoded { id: String, sample_rate: u32, frames: Arc<Buffer> },
}

impl SampleSource {
    pub fn id(&self) -> &str {
        match self {
            SampleSource::Wav { id, .. } => id,
            SampleSource::Decoded { id, .. } => id,
        }
    }
}

#[derive(Clone)]
pub struct Sample {
    pub frames: Arc<Buffer>,
    pub sample_rate: u32,
}

pub fn decode(source: &SampleSource) -> Result<Sample> {
    match source {
        SampleSource::Decoded {
            sample_rate,
            frames,
            ..
        } => Ok(Sample {
            frames: frames.clone(),
            sample_rate: *sample_rate,
        }),
        SampleSource::Wav { bytes, .. } => decode_wav(bytes),
    }
}

fn decode_wav(bytes: &[u8]) -> Result<Sample> {
    let mut wav = WavReader::new(Cursor::new(bytes))?;
    let spec = wav.spec();
    let bit_depth = spec.bits_per_sample as f32;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => wav
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / f32::powf(2.0, bit_depth - 1.0)))
            .collect::<Result<_, _>>()?,
        SampleFormat::Float => wav.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let frames: Buffer = samples
        .chunks(spec.channels as usize)
        .map(|f| {
            let left = *f.first().unwrap_or(&0.0);
            let right = *f.get(1).unwrap_or(&left);
            Frame::new([left, right])
        })
        .collect();

    Ok(Sample {
        frames: Arc::new(frames),
        sample_rate: spec.sample_rate,
    })
}

pub struct BankEntry {
    pub id: String,
    pub origin: Origin,
    pub sample: Sample,
}

/// The decoded-buffer cache. Always rebuilt wholesale from the current
/// source sets; a failed decode is simply absent, never an empty buffer.
#[derive(Default)]
pub struct SampleBank {
    entries: Vec<BankEntry>,
}

impl SampleBank {
    pub fn build(pattern: &[SampleSource], library: &[SampleSource]) -> SampleBank {
        let mut bank = SampleBank::default();
        for (origin, sources) in [(Origin::Pattern, pattern), (Origin::Library, library)] {
            for source in sources {
                if bank.get(source.id()).is_some() {
                    debug!("sample {:?} shadowed by an earlier source", source.id());
                    continue;
                }
                match decode(source) {
                    Ok(sample) => bank.entries.push(BankEntry {
                        id: source.id().to_owned(),
                        origin,
                        sample,
                    }),
                    Err(err) => warn!("failed to decode sample {:?}: {err}", source.id()),
                }
            }
        }
        bank
    }

    pub fn get(&self, id: &str) -> Option<&Sample> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.sample)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BankEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn play_seconds(decay: u8) -> f32 {
    (decay as f32 / 100.0 * MAX_PLAY_SECONDS).clamp(MIN_PLAY_SECONDS, MAX_PLAY_SECONDS)
}

/// One sounding sample hit, interchangeable with a synth voice from the
/// sequencer's point of view: same velocity/tune/decay semantics.
pub struct SampleVoice {
    frames: Arc<Buffer>,
    position: f32,
    rate: f32,
    amp: f32,
    amp_mult: f32,
    remaining: usize,
}

impl SampleVoice {
    pub fn new(sample: &Sample, velocity: f32, tune: i8, decay: u8) -> Self {
        // Rate covers both the semitone shift and the source/output sample
        // rate mismatch.
        let rate = pitch_ratio(tune) * sample.sample_rate as f32 / SAMPLE_RATE as f32;
        let frames = (play_seconds(decay) * SAMPLE_RATE as f32).round() as usize;
        let gain = velocity * SAMPLE_HEADROOM;
        let (amp, amp_mult, remaining) = if gain > ENV_FLOOR {
            (gain, (ENV_FLOOR / gain).powf(1.0 / frames as f32), frames)
        } else {
            (0.0, 1.0, 0)
        };
        Self {
            frames: sample.frames.clone(),
            position: 0.0,
            rate,
            amp,
            amp_mult,
            remaining,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0 || self.position as usize >= self.frames.len()
    }

    /// Mix into `buf`. The voice is cut hard once its decay window has
    /// elapsed, even if the buffer has audio left.
    pub fn render(&mut self, buf: &mut [Stereo]) -> bool {
        for dst_frame in buf.iter_mut() {
            if self.remaining == 0 {
                return false;
            }
            let pos = self.position as usize;
            if pos >= self.frames.len() {
                self.remaining = 0;
                return false;
            }
            let weight = self.position - pos as f32;
            let mut frame = self.frames[pos] * (1.0 - weight);
            if pos + 1 < self.frames.len() {
                frame += self.frames[pos + 1] * weight;
            }
            *dst_frame += frame * self.amp;
            self.amp *= self.amp_mult;
            self.position += self.rate;
            self.remaining -= 1;
        }
        !self.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(frames: &[f32], sample_rate: u32) -> Arc<[u8]> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for &frame in frames {
            writer.write_sample(frame).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner().into()
    }

    fn constant_sample(len: usize, value: f32) -> Sample {
        Sample {
            frames: Arc::new(vec![Stereo::splat(value); len]),
            sample_rate: 44100,
        }
    }

    #[test]
    fn play_seconds_clamps() {
        assert_eq!(play_seconds(1), 0.1);
        assert_eq!(play_seconds(50), 1.5);
        assert_eq!(play_seconds(100), 3.0);
    }

    #[test]
    fn decode_wav_round_trip() {
        let bytes = wav_bytes(&[0.5, -0.5, 0.25], 22050);
        let sample = decode(&SampleSource::Wav {
            id: String::from("test.wav"),
            bytes,
        })
        .unwrap();
        assert_eq!(sample.sample_rate, 22050);
        assert_eq!(sample.frames.len(), 3);
        assert_eq!(sample.frames[0].channel(0), 0.5);
        assert_eq!(sample.frames[0].channel(1), 0.5);
    }

    #[test]
    fn decode_int_wav_normalizes() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(i16::MIN).unwrap();
        }
        writer.finalize().unwrap();
        let bytes: Arc<[u8]> = cursor.into_inner().into();

        let sample = decode(&SampleSource::Wav {
            id: String::from("int.wav"),
            bytes,
        })
        .unwrap();
        assert!(sample.frames[0].channel(0) <= 1.0);
        assert!((sample.frames[0].channel(1) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn bank_excludes_failed_decodes() {
        let good = SampleSource::Wav {
            id: String::from("kick.wav"),
            bytes: wav_bytes(&[0.1; 8], 44100),
        };
        let bad = SampleSource::Wav {
            id: String::from("snare.wav"),
            bytes: Arc::from(&b"not a wav file"[..]),
        };
        let bank = SampleBank::build(&[], &[good, bad]);
        assert_eq!(bank.len(), 1);
        assert!(bank.get("kick.wav").is_some());
        assert!(bank.get("snare.wav").is_none());
    }

    #[test]
    fn pattern_sources_shadow_library() {
        let pattern = SampleSource::Decoded {
            id: String::from("kick.wav"),
            sample_rate: 44100,
            frames: Arc::new(vec![Stereo::splat(1.0); 4]),
        };
        let library = SampleSource::Decoded {
            id: String::from("kick.wav"),
            sample_rate: 44100,
            frames: Arc::new(vec![Stereo::splat(-1.0); 4]),
        };
        let bank = SampleBank::build(&[pattern], &[library]);
        assert_eq!(bank.len(), 1);
        let entry = bank.iter().next().unwrap();
        assert_eq!(entry.origin, Origin::Pattern);
        assert_eq!(entry.sample.frames[0].channel(0), 1.0);
    }

    #[test]
    fn voice_truncates_at_decay_window() {
        // Two seconds of audio but a decay of 1: exactly 0.1s survives.
        let sample = constant_sample(2 * 44100, 0.5);
        let mut voice = SampleVoice::new(&sample, 1.0, 0, 1);
        let window = (0.1 * 44100.0f32).round() as usize;

        let mut buf = vec![Stereo::ZERO; window];
        assert!(!voice.render(&mut buf));
        assert!(voice.is_finished());
        assert!(buf.iter().all(|f| f.channel(0) != 0.0));

        buf.fill(Stereo::ZERO);
        assert!(!voice.render(&mut buf));
        assert!(buf.iter().all(|f| f.channel(0) == 0.0));
    }

    #[test]
    fn voice_stops_at_buffer_end() {
        let sample = constant_sample(100, 0.5);
        let mut voice = SampleVoice::new(&sample, 1.0, 0, 100);
        let mut buf = vec![Stereo::ZERO; 256];
        assert!(!voice.render(&mut buf));
        assert!(voice.is_finished());
        assert!(buf[99].channel(0) != 0.0);
        assert!(buf[100].channel(0) == 0.0);
    }

    #[test]
    fn tune_doubles_playback_rate() {
        let sample = constant_sample(1000, 0.5);
        let flat = SampleVoice::new(&sample, 1.0, 0, 100);
        let up = SampleVoice::new(&sample, 1.0, 12, 100);
        assert!((up.rate / flat.rate - 2.0).abs() < 1e-5);
    }

    #[test]
    fn velocity_is_attenuated_for_headroom() {
        let sample = constant_sample(1000, 1.0);
        let voice = SampleVoice::new(&sample, 1.0, 0, 100);
        assert!((voice.amp - 0.8).abs() < 1e-6);
    }
}
