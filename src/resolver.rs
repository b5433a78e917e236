use log::debug;

use crate::pattern::{Instrument, Pattern, NUM_TRACKS};
use crate::sampler::{Origin, SampleBank};

/// The derived instrument -> sample id map. Not authoritative state: a pure
/// function of the pattern's assignments and the decoded bank, recomputed
/// wholesale whenever either changes. An unbound instrument plays its
/// synthesized voice.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bindings {
    bound: [Option<String>; NUM_TRACKS],
}

impl Bindings {
    pub fn get(&self, instrument: Instrument) -> Option<&str> {
        self.bound[instrument.index()].as_deref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Instrument, &str)> {
        Instrument::ALL
            .into_iter()
            .filter_map(|i| self.get(i).map(|id| (i, id)))
    }
}

/// Resolution order per instrument, first match wins:
/// explicit assignment with a decoded buffer, then a case-insensitive
/// substring match over pattern-local ids in their defined order, then the
/// same scan over the library. Sources that failed to decode are never
/// candidates.
pub fn resolve(pattern: &Pattern, bank: &SampleBank) -> Bindings {
    let mut bindings = Bindings::default();
    for instrument in Instrument::ALL {
        let bound = resolve_track(pattern, bank, instrument);
        match &bound {
            Some(id) => debug!("{instrument} -> sample {id:?}"),
            None => debug!("{instrument} -> synth"),
        }
        bindings.bound[instrument.index()] = bound;
    }
    bindings
}

fn resolve_track(pattern: &Pattern, bank: &SampleBank, instrument: Instrument) -> Option<String> {
    if let Some(id) = pattern.sample(instrument) {
        if bank.get(id).is_some() {
            return Some(id.to_owned());
        }
        debug!("assigned sample {id:?} for {instrument} has no decoded buffer");
    }
    for origin in [Origin::Pattern, Origin::Library] {
        for entry in bank.iter().filter(|e| e.origin == origin) {
            if entry.id.to_lowercase().contains(instrument.name()) {
                return Some(entry.id.clone());
            }
        }
    }
    None
}
