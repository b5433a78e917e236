use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use basedrop::{Collector, Shared, SharedCell};
use ringbuf::{Consumer, Producer, RingBuffer};
use triple_buffer::{Input, Output, TripleBuffer};

use crate::engine::{EngineCommand, EngineState, TriggerEvent};
use crate::pattern::{Instrument, ParamError, Pattern, PatternDoc};
use crate::resolver::{self, Bindings};
use crate::sampler::{SampleBank, SampleSource};

const COMMAND_QUEUE_SIZE: usize = 16;
const TRIGGER_QUEUE_SIZE: usize = 256;

/// State shared between the control side and the audio thread. The pattern,
/// the decoded bank and the bindings are whole values swapped through
/// `SharedCell`s: the engine snapshots them per render and never observes a
/// half-updated edit.
struct Store {
    pattern: SharedCell<Pattern>,
    bank: SharedCell<SampleBank>,
    bindings: SharedCell<Bindings>,
    is_playing: AtomicBool,
}

/// Build the connected control/engine handle pair.
pub fn controls() -> (Controls, EngineControl) {
    let collector = Collector::new();
    let handle = collector.handle();
    let store = Arc::new(Store {
        pattern: SharedCell::new(Shared::new(&handle, Pattern::default())),
        bank: SharedCell::new(Shared::new(&handle, SampleBank::default())),
        bindings: SharedCell::new(Shared::new(&handle, Bindings::default())),
        is_playing: AtomicBool::new(false),
    });

    let (command_tx, command_rx) = RingBuffer::<EngineCommand>::new(COMMAND_QUEUE_SIZE).split();
    let (trigger_tx, trigger_rx) = RingBuffer::<TriggerEvent>::new(TRIGGER_QUEUE_SIZE).split();
    let (state_in, state_out) = TripleBuffer::new(&EngineState::default()).split();

    let controls = Controls {
        store: store.clone(),
        collector,
        commands: command_tx,
        triggers: trigger_rx,
        engine_state: state_out,
        pattern_sources: Vec::new(),
        library_sources: Vec::new(),
    };
    let engine_control = EngineControl {
        store,
        commands: command_rx,
        triggers: trigger_tx,
        engine_state: state_in,
    };
    (controls, engine_control)
}

/// The control-thread handle: every mutation of the shared state goes
/// through here, so the audio thread only ever reads.
pub struct Controls {
    store: Arc<Store>,
    collector: Collector,
    commands: Producer<EngineCommand>,
    triggers: Consumer<TriggerEvent>,
    engine_state: Output<EngineState>,
    pattern_sources: Vec<SampleSource>,
    library_sources: Vec<SampleSource>,
}

impl Controls {
    pub fn pattern(&self) -> Shared<Pattern> {
        self.store.pattern.get()
    }

    pub fn bindings(&self) -> Shared<Bindings> {
        self.store.bindings.get()
    }

    pub fn is_playing(&self) -> bool {
        self.store.is_playing.load(Ordering::Relaxed)
    }

    /// Latest state the engine published: step cursor and frame position.
    pub fn engine_state(&mut self) -> EngineState {
        *self.engine_state.read()
    }

    /// Drain one "sound triggered" event, if any. Consumers poll this for
    /// step highlighting.
    pub fn poll_trigger(&mut self) -> Option<TriggerEvent> {
        self.triggers.pop()
    }

    fn update_pattern<F>(&mut self, f: F) -> Result<(), ParamError>
    where
        F: FnOnce(&mut Pattern) -> Result<(), ParamError>,
    {
        let mut pattern = (*self.store.pattern.get()).clone();
        f(&mut pattern)?;
        self.store
            .pattern
            .set(Shared::new(&self.collector.handle(), pattern));
        self.refresh_bindings();
        self.collector.collect();
        Ok(())
    }

    pub fn set_step(
        &mut self,
        instrument: Instrument,
        index: usize,
        active: bool,
    ) -> Result<(), ParamError> {
        self.update_pattern(|p| p.set_step(instrument, index, active))
    }

    pub fn set_level(&mut self, instrument: Instrument, level: u8) -> Result<(), ParamError> {
        self.update_pattern(|p| p.set_level(instrument, level))
    }

    pub fn set_tune(&mut self, instrument: Instrument, tune: i8) -> Result<(), ParamError> {
        self.update_pattern(|p| p.set_tune(instrument, tune))
    }

    pub fn set_decay(&mut self, instrument: Instrument, decay: u8) -> Result<(), ParamError> {
        self.update_pattern(|p| p.set_decay(instrument, decay))
    }

    /// Takes effect on the very next step boundary; a running pattern keeps
    /// its cursor.
    pub fn set_tempo(&mut self, bpm: u16) -> Result<(), ParamError> {
        self.update_pattern(|p| p.set_tempo(bpm))
    }

    pub fn set_track_sample(&mut self, instrument: Instrument, sample: Option<String>) {
        // Infallible mutation, the closure can't reject.
        let _ = self.update_pattern(|p| {
            p.set_sample(instrument, sample);
            Ok(())
        });
    }

    /// Replace the pattern wholesale.
    pub fn load_pattern(&mut self, pattern: Pattern) {
        self.store
            .pattern
            .set(Shared::new(&self.collector.handle(), pattern));
        self.refresh_bindings();
        self.collector.collect();
    }

    pub fn load_doc(&mut self, doc: PatternDoc) {
        self.load_pattern(Pattern::from_doc(doc));
    }

    pub fn new_pattern(&mut self) {
        self.load_pattern(Pattern::default());
    }

    /// Entry point for external pattern generators: any valid 8x16 boolean
    /// map becomes the current pattern.
    pub fn load_generated(&mut self, name: &str, grids: &BTreeMap<String, Vec<bool>>) {
        self.load_pattern(Pattern::with_grids(name, grids));
    }

    /// The raw sample sources changed: rebuild the decoded bank from
    /// scratch and re-resolve every binding. Decoding failures are logged
    /// and excluded; the swap happens only once the bank is complete.
    pub fn set_sample_sources(
        &mut self,
        pattern: Vec<SampleSource>,
        library: Vec<SampleSource>,
    ) {
        self.pattern_sources = pattern;
        self.library_sources = library;
        let bank = SampleBank::build(&self.pattern_sources, &self.library_sources);
        self.store
            .bank
            .set(Shared::new(&self.collector.handle(), bank));
        self.refresh_bindings();
        self.collector.collect();
    }

    fn refresh_bindings(&mut self) {
        let pattern = self.store.pattern.get();
        let bank = self.store.bank.get();
        let bindings = resolver::resolve(&pattern, &bank);
        self.store
            .bindings
            .set(Shared::new(&self.collector.handle(), bindings));
    }

    pub fn start(&mut self) -> Result<()> {
        self.send(EngineCommand::Start)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.send(EngineCommand::Stop)
    }

    /// Fire a single immediate hit for one track, resolved the same way a
    /// sequenced step would be.
    pub fn preview(&mut self, instrument: Instrument) -> Result<()> {
        self.send(EngineCommand::Preview(instrument))
    }

    fn send(&mut self, command: EngineCommand) -> Result<()> {
        self.commands
            .push(command)
            .map_err(|_| anyhow!("unable to send command to engine"))
    }
}

/// The audio-thread handle: read-only snapshots of the shared state plus
/// the engine's outbound channels.
pub struct EngineControl {
    store: Arc<Store>,
    commands: Consumer<EngineCommand>,
    triggers: Producer<TriggerEvent>,
    engine_state: Input<EngineState>,
}

impl EngineControl {
    pub fn command(&mut self) -> Option<EngineCommand> {
        self.commands.pop()
    }

    pub fn pattern(&self) -> Shared<Pattern> {
        self.store.pattern.get()
    }

    pub fn bank(&self) -> Shared<SampleBank> {
        self.store.bank.get()
    }

    pub fn bindings(&self) -> Shared<Bindings> {
        self.store.bindings.get()
    }

    pub fn set_playing(&self, playing: bool) {
        self.store.is_playing.store(playing, Ordering::Relaxed);
    }

    pub fn publish_state(&mut self, state: EngineState) {
        self.engine_state.write(state);
    }

    /// Best effort: a full queue drops the event rather than stalling the
    /// audio thread.
    pub fn push_trigger(&mut self, event: TriggerEvent) {
        let _ = self.triggers.push(event);
    }
}
