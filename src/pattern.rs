use std::collections::BTreeMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NUM_STEPS: usize = 16;
pub const NUM_TRACKS: usize = 8;

pub const MIN_TEMPO: u16 = 60;
pub const MAX_TEMPO: u16 = 200;
pub const MAX_LEVEL: u8 = 100;
pub const MIN_TUNE: i8 = -12;
pub const MAX_TUNE: i8 = 12;
pub const MIN_DECAY: u8 = 1;
pub const MAX_DECAY: u8 = 100;

const DEFAULT_TEMPO: u16 = 120;
const DEFAULT_NAME: &str = "New Pattern";

/// The eight fixed drum tracks. The canonical lowercase names double as the
/// keys of the persisted document and as the substrings the sample resolver
/// matches filenames against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Instrument {
    Kick,
    Snare,
    OpenHat,
    ClosedHat,
    Clap,
    Crash,
    Cowbell,
    Clave,
}

impl Instrument {
    pub const ALL: [Instrument; NUM_TRACKS] = [
        Instrument::Kick,
        Instrument::Snare,
        Instrument::OpenHat,
        Instrument::ClosedHat,
        Instrument::Clap,
        Instrument::Crash,
        Instrument::Cowbell,
        Instrument::Clave,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Kick => "kick",
            Instrument::Snare => "snare",
            Instrument::OpenHat => "openhat",
            Instrument::ClosedHat => "closedhat",
            Instrument::Clap => "clap",
            Instrument::Crash => "crash",
            Instrument::Cowbell => "cowbell",
            Instrument::Clave => "clave",
        }
    }

    pub fn from_name(name: &str) -> Option<Instrument> {
        Instrument::ALL.into_iter().find(|i| i.name() == name)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected mutations. State is left untouched when one of these comes back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("tempo {0} outside {MIN_TEMPO}..={MAX_TEMPO}")]
    Tempo(u16),
    #[error("level {0} outside 0..={MAX_LEVEL}")]
    Level(u8),
    #[error("tune {0} outside {MIN_TUNE}..={MAX_TUNE}")]
    Tune(i8),
    #[error("decay {0} outside {MIN_DECAY}..={MAX_DECAY}")]
    Decay(u8),
    #[error("step index {0} outside 0..{NUM_STEPS}")]
    Step(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackParams {
    pub level: u8,
    pub tune: i8,
    pub decay: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub steps: [bool; NUM_STEPS],
    pub params: TrackParams,
    /// Sample id explicitly assigned to this track, if any.
    pub sample: Option<String>,
}

impl Track {
    fn new(level: u8, decay: u8) -> Self {
        Self {
            steps: [false; NUM_STEPS],
            params: TrackParams {
                level,
                tune: 0,
                decay,
            },
            sample: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    pub name: String,
    tempo: u16,
    tracks: [Track; NUM_TRACKS],
}

impl Default for Pattern {
    fn default() -> Self {
        let mk = Track::new;
        Self {
            name: String::from(DEFAULT_NAME),
            tempo: DEFAULT_TEMPO,
            // Level and decay defaults per instrument, kick through clave.
            tracks: [
                mk(80, 50),
                mk(70, 30),
                mk(60, 70),
                mk(55, 20),
                mk(65, 40),
                mk(70, 80),
                mk(50, 30),
                mk(45, 15),
            ],
        }
    }
}

impl Pattern {
    pub fn tempo(&self) -> u16 {
        self.tempo
    }

    pub fn set_tempo(&mut self, bpm: u16) -> Result<(), ParamError> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            return Err(ParamError::Tempo(bpm));
        }
        self.tempo = bpm;
        Ok(())
    }

    pub fn track(&self, instrument: Instrument) -> &Track {
        &self.tracks[instrument.index()]
    }

    pub fn steps(&self, instrument: Instrument) -> &[bool; NUM_STEPS] {
        &self.tracks[instrument.index()].steps
    }

    pub fn set_step(
        &mut self,
        instrument: Instrument,
        index: usize,
        active: bool,
    ) -> Result<(), ParamError> {
        if index >= NUM_STEPS {
            return Err(ParamError::Step(index));
        }
        self.tracks[instrument.index()].steps[index] = active;
        Ok(())
    }

    pub fn params(&self, instrument: Instrument) -> TrackParams {
        self.tracks[instrument.index()].params
    }

    pub fn set_level(&mut self, instrument: Instrument, level: u8) -> Result<(), ParamError> {
        if level > MAX_LEVEL {
            return Err(ParamError::Level(level));
        }
        self.tracks[instrument.index()].params.level = level;
        Ok(())
    }

    pub fn set_tune(&mut self, instrument: Instrument, tune: i8) -> Result<(), ParamError> {
        if !(MIN_TUNE..=MAX_TUNE).contains(&tune) {
            return Err(ParamError::Tune(tune));
        }
        self.tracks[instrument.index()].params.tune = tune;
        Ok(())
    }

    pub fn set_decay(&mut self, instrument: Instrument, decay: u8) -> Result<(), ParamError> {
        if !(MIN_DECAY..=MAX_DECAY).contains(&decay) {
            return Err(ParamError::Decay(decay));
        }
        self.tracks[instrument.index()].params.decay = decay;
        Ok(())
    }

    pub fn sample(&self, instrument: Instrument) -> Option<&str> {
        self.tracks[instrument.index()].sample.as_deref()
    }

    pub fn set_sample(&mut self, instrument: Instrument, sample: Option<String>) {
        self.tracks[instrument.index()].sample = sample;
    }

    /// Replace all step grids at once, keeping the current parameters. This is
    /// the entry point for external pattern generators: anything that can
    /// produce an 8x16 boolean map becomes a playable pattern.
    pub fn with_grids<S: AsRef<str>>(name: S, grids: &BTreeMap<String, Vec<bool>>) -> Pattern {
        let mut pattern = Pattern {
            name: name.as_ref().to_owned(),
            ..Pattern::default()
        };
        for (key, steps) in grids {
            match Instrument::from_name(key) {
                Some(instrument) => {
                    pattern.tracks[instrument.index()].steps = normalize_grid(steps);
                }
                None => warn!("skipping unknown track {:?} in generated pattern", key),
            }
        }
        pattern
    }

    pub fn from_doc(doc: PatternDoc) -> Pattern {
        let mut pattern = Pattern {
            name: doc.name,
            ..Pattern::default()
        };
        if (MIN_TEMPO..=MAX_TEMPO).contains(&doc.tempo) {
            pattern.tempo = doc.tempo;
        } else {
            warn!("tempo {} out of range, using {}", doc.tempo, DEFAULT_TEMPO);
        }
        for (key, steps) in &doc.tracks {
            match Instrument::from_name(key) {
                Some(instrument) => {
                    pattern.tracks[instrument.index()].steps = normalize_grid(steps)
                }
                None => warn!("skipping unknown track {:?} in pattern document", key),
            }
        }
        for instrument in Instrument::ALL {
            let params = &mut pattern.tracks[instrument.index()].params;
            if let Some(&level) = doc.levels.get(instrument.name()) {
                match u8::try_from(level).ok().filter(|l| *l <= MAX_LEVEL) {
                    Some(level) => params.level = level,
                    None => warn!("level {} for {} out of range", level, instrument),
                }
            }
            if let Some(&tune) = doc.tune.get(instrument.name()) {
                match i8::try_from(tune)
                    .ok()
                    .filter(|t| (MIN_TUNE..=MAX_TUNE).contains(t))
                {
                    Some(tune) => params.tune = tune,
                    None => warn!("tune {} for {} out of range", tune, instrument),
                }
            }
            if let Some(&decay) = doc.decay.get(instrument.name()) {
                match u8::try_from(decay)
                    .ok()
                    .filter(|d| (MIN_DECAY..=MAX_DECAY).contains(d))
                {
                    Some(decay) => params.decay = decay,
                    None => warn!("decay {} for {} out of range", decay, instrument),
                }
            }
            if let Some(sample) = doc.samples.get(instrument.name()) {
                pattern.tracks[instrument.index()].sample = Some(sample.clone());
            }
        }
        pattern
    }

    pub fn to_doc(&self) -> PatternDoc {
        let mut doc = PatternDoc {
            name: self.name.clone(),
            tempo: self.tempo,
            ..PatternDoc::default()
        };
        for instrument in Instrument::ALL {
            let track = self.track(instrument);
            let key = instrument.name().to_owned();
            doc.tracks.insert(key.clone(), track.steps.to_vec());
            doc.levels.insert(key.clone(), track.params.level as i32);
            doc.tune.insert(key.clone(), track.params.tune as i32);
            doc.decay.insert(key.clone(), track.params.decay as i32);
            if let Some(sample) = &track.sample {
                doc.samples.insert(key, sample.clone());
            }
        }
        doc
    }
}

/// Short or over-long grids are tolerated: steps past the stored length are
/// false, extra entries are dropped.
fn normalize_grid(steps: &[bool]) -> [bool; NUM_STEPS] {
    let mut grid = [false; NUM_STEPS];
    for (slot, &step) in grid.iter_mut().zip(steps) {
        *slot = step;
    }
    grid
}

/// The persisted shape of a pattern. External stores round-trip this
/// document; the core never talks to storage itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PatternDoc {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tempo: u16,
    #[serde(default)]
    pub tracks: BTreeMap<String, Vec<bool>>,
    #[serde(default)]
    pub levels: BTreeMap<String, i32>,
    #[serde(default)]
    pub tune: BTreeMap<String, i32>,
    #[serde(default)]
    pub decay: BTreeMap<String, i32>,
    #[serde(default)]
    pub samples: BTreeMap<String, String>,
}

/// The factory patterns the original machine shipped with.
pub fn demo_patterns() -> Vec<Pattern> {
    use Instrument::*;

    let mut hiphop = Pattern {
        name: String::from("Classic Hip-Hop"),
        ..Pattern::default()
    };
    hiphop.tempo = 90;
    set_grid(&mut hiphop, Kick, &[0, 6, 9]);
    set_grid(&mut hiphop, Snare, &[4, 12]);
    set_grid(&mut hiphop, OpenHat, &[2, 10]);
    set_grid(&mut hiphop, ClosedHat, &[1, 3, 5, 7, 9, 11, 13, 15]);
    set_grid(&mut hiphop, Crash, &[0]);

    let mut funk = Pattern {
        name: String::from("Electro Funk"),
        ..Pattern::default()
    };
    funk.tempo = 120;
    set_grid(&mut funk, Kick, &[0, 3, 6, 8]);
    set_grid(&mut funk, Snare, &[4, 7, 12]);
    set_grid(&mut funk, OpenHat, &[14]);
    set_grid(&mut funk, ClosedHat, &[1, 2, 5, 9, 10, 13, 15]);

    vec![hiphop, funk]
}

fn set_grid(pattern: &mut Pattern, instrument: Instrument, active: &[usize]) {
    for &step in active {
        pattern.tracks[instrument.index()].steps[step] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern() {
        let p = Pattern::default();
        assert_eq!(p.tempo(), 120);
        assert_eq!(p.params(Instrument::Kick).level, 80);
        assert_eq!(p.params(Instrument::Clave).decay, 15);
        for instrument in Instrument::ALL {
            assert!(p.steps(instrument).iter().all(|s| !s));
            assert_eq!(p.sample(instrument), None);
        }
    }

    #[test]
    fn rejected_mutation_leaves_state_unchanged() {
        let mut p = Pattern::default();
        assert_eq!(p.set_tempo(59), Err(ParamError::Tempo(59)));
        assert_eq!(p.set_tempo(201), Err(ParamError::Tempo(201)));
        assert_eq!(p.tempo(), 120);

        assert_eq!(
            p.set_level(Instrument::Kick, 101),
            Err(ParamError::Level(101))
        );
        assert_eq!(p.params(Instrument::Kick).level, 80);

        assert_eq!(
            p.set_tune(Instrument::Snare, 13),
            Err(ParamError::Tune(13))
        );
        assert_eq!(p.set_tune(Instrument::Snare, -13), Err(ParamError::Tune(-13)));
        assert_eq!(p.params(Instrument::Snare).tune, 0);

        assert_eq!(p.set_decay(Instrument::Clap, 0), Err(ParamError::Decay(0)));
        assert_eq!(p.set_step(Instrument::Kick, 16, true), Err(ParamError::Step(16)));
    }

    #[test]
    fn accepted_mutations() {
        let mut p = Pattern::default();
        p.set_tempo(200).unwrap();
        p.set_step(Instrument::Kick, 15, true).unwrap();
        p.set_tune(Instrument::Kick, -12).unwrap();
        p.set_decay(Instrument::Kick, 100).unwrap();
        p.set_level(Instrument::Kick, 0).unwrap();
        assert_eq!(p.tempo(), 200);
        assert!(p.steps(Instrument::Kick)[15]);
        assert_eq!(
            p.params(Instrument::Kick),
            TrackParams {
                level: 0,
                tune: -12,
                decay: 100
            }
        );
    }

    #[test]
    fn doc_round_trip() {
        let mut p = Pattern::default();
        p.name = String::from("Test");
        p.set_tempo(90).unwrap();
        p.set_step(Instrument::Kick, 0, true).unwrap();
        p.set_step(Instrument::Snare, 4, true).unwrap();
        p.set_tune(Instrument::Kick, -3).unwrap();
        p.set_sample(Instrument::Clap, Some(String::from("clap_tight.wav")));

        let json = serde_json::to_string(&p.to_doc()).unwrap();
        let doc: PatternDoc = serde_json::from_str(&json).unwrap();
        assert_eq!(Pattern::from_doc(doc), p);
    }

    #[test]
    fn short_grid_pads_with_false() {
        let mut doc = PatternDoc {
            tempo: 120,
            ..PatternDoc::default()
        };
        doc.tracks
            .insert(String::from("kick"), vec![true, false, true]);
        let p = Pattern::from_doc(doc);
        let expected = {
            let mut grid = [false; NUM_STEPS];
            grid[0] = true;
            grid[2] = true;
            grid
        };
        assert_eq!(p.steps(Instrument::Kick), &expected);
    }

    #[test]
    fn unknown_track_and_bad_params_fall_back() {
        let mut doc = PatternDoc {
            tempo: 0,
            ..PatternDoc::default()
        };
        doc.tracks.insert(String::from("bongo"), vec![true; 16]);
        doc.levels.insert(String::from("kick"), 400);
        doc.decay.insert(String::from("kick"), 0);
        let p = Pattern::from_doc(doc);
        assert_eq!(p.tempo(), 120);
        assert_eq!(p.params(Instrument::Kick).level, 80);
        assert_eq!(p.params(Instrument::Kick).decay, 50);
    }

    #[test]
    fn demo_patterns_are_valid() {
        let demos = demo_patterns();
        assert_eq!(demos.len(), 2);
        for demo in &demos {
            assert!((MIN_TEMPO..=MAX_TEMPO).contains(&demo.tempo()));
        }
        assert_eq!(demos[0].tempo(), 90);
        let kick = demos[0].steps(Instrument::Kick);
        assert!(kick[0] && kick[6] && kick[9]);
        assert_eq!(kick.iter().filter(|s| **s).count(), 3);
    }
}
