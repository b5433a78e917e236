use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use camino::Utf8PathBuf;
use log::{info, warn};

use drumbox::engine::{Engine, TriggerSource};
use drumbox::host::Host;
use drumbox::{files, pattern, state};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let (mut controls, engine_control) = state::controls();

    // Optional sample directory; without one every track synthesizes.
    if let Some(dir) = std::env::args().nth(1).map(Utf8PathBuf::from) {
        match files::wav_sources(&dir) {
            Ok(sources) => {
                info!("loaded {} samples from {dir}", sources.len());
                controls.set_sample_sources(Vec::new(), sources);
            }
            Err(err) => warn!("unable to read {dir}: {err}"),
        }
    }

    let mut demos = pattern::demo_patterns();
    let demo = demos.remove(0);
    info!("pattern: {} at {} bpm", demo.name, demo.tempo());
    controls.load_pattern(demo);

    let host = Host::run(Engine::new(engine_control))?;

    // Sound check: one kick through the same path a sequenced hit takes.
    controls.preview(pattern::Instrument::Kick)?;
    thread::sleep(Duration::from_millis(500));

    controls.start()?;
    println!("playing, press enter to stop");

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = done_tx.send(());
    });

    while done_rx.try_recv().is_err() {
        while let Some(event) = controls.poll_trigger() {
            let source = match event.source {
                TriggerSource::Sample => "sample",
                TriggerSource::Synth => "synth",
            };
            println!("step {:2} {:9} ({source})", event.step, event.instrument.name());
        }
        thread::sleep(Duration::from_millis(16));
    }

    controls.stop()?;
    host.shutdown()?;
    Ok(())
}
