use log::warn;

use crate::audio::Stereo;
use crate::pattern::{Instrument, Pattern, NUM_STEPS};
use crate::resolver::Bindings;
use crate::sampler::{SampleBank, SampleVoice};
use crate::state::EngineControl;
use crate::synth::{self, SynthVoice};
use crate::SAMPLE_RATE;

/// Cursor value while stopped, so the first tick after start lands on 0.
pub const NO_STEP: i32 = -1;

const MAX_VOICES: usize = 64;

pub enum EngineCommand {
    Start,
    Stop,
    Preview(Instrument),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineState {
    pub playing: bool,
    pub current_step: i32,
    /// Frames rendered since the engine was created.
    pub position: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        EngineState {
            playing: false,
            current_step: NO_STEP,
            position: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    Sample,
    Synth,
}

/// Emitted for every sound the engine fires, sequenced or previewed.
/// `time` is the frame position of the hit; previews report `NO_STEP`.
#[derive(Clone, Copy, Debug)]
pub struct TriggerEvent {
    pub instrument: Instrument,
    pub step: i32,
    pub time: u64,
    pub source: TriggerSource,
}

/// Frames between two steps at the given tempo. Each step is a sixteenth
/// note, so a quarter note spans four of them.
pub fn step_interval(bpm: u16) -> usize {
    (SAMPLE_RATE * 60.0 / (bpm as f64 * 4.0)).round() as usize
}

pub struct Engine {
    control: EngineControl,
    synth_voices: Vec<SynthVoice>,
    sample_voices: Vec<SampleVoice>,
    playing: bool,
    current_step: i32,
    step_interval: usize,
    samples_to_tick: usize,
    position: u64,
}

impl Engine {
    pub fn new(control: EngineControl) -> Engine {
        Engine {
            control,
            synth_voices: Vec::with_capacity(MAX_VOICES),
            sample_voices: Vec::with_capacity(MAX_VOICES),
            playing: false,
            current_step: NO_STEP,
            step_interval: 0,
            samples_to_tick: 0,
            position: 0,
        }
    }

    /// Render one callback's worth of output. The shared state is
    /// snapshotted once up front, so edits landing mid-callback apply from
    /// the next one.
    pub fn render(&mut self, buffer: &mut [Stereo]) {
        let pattern = self.control.pattern();
        let bindings = self.control.bindings();
        let bank = self.control.bank();

        self.run_commands(&pattern, &bindings, &bank);
        self.apply_tempo(pattern.tempo());

        let mut offset = 0;
        while offset < buffer.len() {
            let frames = self.next_block(buffer.len() - offset, &pattern, &bindings, &bank);
            let block = &mut buffer[offset..offset + frames];
            self.synth_voices.retain_mut(|voice| voice.render(block));
            self.sample_voices.retain_mut(|voice| voice.render(block));
            self.position += frames as u64;
            offset += frames;
        }

        self.control.publish_state(EngineState {
            playing: self.playing,
            current_step: self.current_step,
            position: self.position,
        });
    }

    /// Advance the step clock and return how many frames can be rendered
    /// before the next tick is due. Ticks always land on a block boundary,
    /// so steps are sample accurate regardless of callback size.
    fn next_block(
        &mut self,
        frames: usize,
        pattern: &Pattern,
        bindings: &Bindings,
        bank: &SampleBank,
    ) -> usize {
        if !self.playing {
            return frames;
        }
        if self.samples_to_tick == 0 {
            self.tick(pattern, bindings, bank);
            self.samples_to_tick = self.step_interval;
        }
        let frames = frames.min(self.samples_to_tick);
        self.samples_to_tick -= frames;
        frames
    }

    fn tick(&mut self, pattern: &Pattern, bindings: &Bindings, bank: &SampleBank) {
        self.current_step = (self.current_step + 1).rem_euclid(NUM_STEPS as i32);
        let step = self.current_step as usize;
        for instrument in Instrument::ALL {
            if pattern.steps(instrument)[step] {
                self.trigger(instrument, self.current_step, pattern, bindings, bank);
            }
        }
    }

    /// A tempo edit reschedules the pending tick proportionally instead of
    /// resetting it, keeping the cursor where it is.
    fn apply_tempo(&mut self, bpm: u16) {
        let interval = step_interval(bpm);
        if interval == self.step_interval {
            return;
        }
        if self.step_interval > 0 && self.samples_to_tick > 0 {
            self.samples_to_tick =
                (self.samples_to_tick as u64 * interval as u64 / self.step_interval as u64) as usize;
        }
        self.step_interval = interval;
    }

    fn run_commands(&mut self, pattern: &Pattern, bindings: &Bindings, bank: &SampleBank) {
        while let Some(command) = self.control.command() {
            match command {
                EngineCommand::Start => {
                    if !self.playing {
                        self.playing = true;
                        self.current_step = NO_STEP;
                        // Step 0 fires at the head of this very callback.
                        self.samples_to_tick = 0;
                        self.control.set_playing(true);
                    }
                }
                EngineCommand::Stop => {
                    if self.playing {
                        self.playing = false;
                        self.current_step = NO_STEP;
                        self.samples_to_tick = 0;
                        // Sounding voices keep ringing.
                        self.control.set_playing(false);
                    }
                }
                EngineCommand::Preview(instrument) => {
                    self.trigger(instrument, NO_STEP, pattern, bindings, bank);
                }
            }
        }
    }

    fn trigger(
        &mut self,
        instrument: Instrument,
        step: i32,
        pattern: &Pattern,
        bindings: &Bindings,
        bank: &SampleBank,
    ) {
        let params = pattern.params(instrument);
        let velocity = params.level as f32 / 100.0;

        let sample = bindings.get(instrument).and_then(|id| bank.get(id));
        let source = match sample {
            Some(sample) => {
                if self.sample_voices.len() >= MAX_VOICES {
                    warn!("voice limit reached, dropping {instrument} hit");
                    return;
                }
                self.sample_voices
                    .push(SampleVoice::new(sample, velocity, params.tune, params.decay));
                TriggerSource::Sample
            }
            None => {
                if self.synth_voices.len() >= MAX_VOICES {
                    warn!("voice limit reached, dropping {instrument} hit");
                    return;
                }
                let spec = synth::voice(instrument, velocity, params.tune, params.decay);
                self.synth_voices.push(SynthVoice::new(&spec));
                TriggerSource::Synth
            }
        };

        self.control.push_trigger(TriggerEvent {
            instrument,
            step,
            time: self.position,
            source,
        });
    }
}
