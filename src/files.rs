use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::sampler::SampleSource;

/// Collect the wav files of a directory as raw sample sources, sorted by
/// file name so substring resolution is deterministic. Decoding happens
/// later, when the bank is built.
pub fn wav_sources(dir: &Utf8Path) -> Result<Vec<SampleSource>> {
    let mut paths: Vec<Utf8PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = Utf8PathBuf::from_path_buf(entry?.path())
            .map_err(|path| anyhow!("non-utf8 path {}", path.display()))?;
        if path.extension() == Some("wav") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let id = match path.file_name() {
            Some(name) => name.to_owned(),
            None => continue,
        };
        debug!("reading {path}");
        let bytes = fs::read(&path)?;
        sources.push(SampleSource::Wav {
            id,
            bytes: Arc::from(bytes),
        });
    }
    Ok(sources)
}
