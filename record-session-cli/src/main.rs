mod args;

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use record_session_core::storage::metadata;
use record_session_core::{
    CaptureBackend, Event, RecognitionRequest, RecordConfig, RecordSession, RecordState,
    RecordingStore, SessionOptions, ToneBackend,
};
use record_session_cpal::CpalBackend;

use args::{Args, Command, RecordArgs};

/// What the user asked for from the keyboard.
enum Intent {
    Finish,
    Cancel,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    match args.command {
        Some(Command::Devices) => {
            for name in record_session_cpal::list_input_devices() {
                println!("{name}");
            }
            Ok(())
        }
        None => record(args.record),
    }
}

fn record(args: RecordArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RecordConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RecordConfig::default(),
    };
    if let Some(channels) = args.channels {
        config.channels = channels;
    }

    let store = match &args.dir {
        Some(dir) => RecordingStore::new(dir.clone()),
        None => RecordingStore::default_location(),
    };
    store.purge_stale_files();
    let options = SessionOptions::with_storage_dir(store.dir());

    if args.tone {
        let session = RecordSession::new(ToneBackend::default(), config, options);
        run(session, &args)
    } else {
        let backend = match &args.device {
            Some(name) => CpalBackend::with_device(name.clone()),
            None => CpalBackend::default_device(),
        };
        run(RecordSession::new(backend, config, options), &args)
    }
}

fn run<B: CaptureBackend>(session: RecordSession<B>, args: &RecordArgs) -> Result<()> {
    let events = session.subscribe();
    let deadline = match args.duration {
        Some(secs) => Some(Instant::now() + recording_length(secs)?),
        None => None,
    };
    let intents = match deadline {
        Some(_) => None,
        None => Some(spawn_keyboard_reader()?),
    };

    eprintln!("recording to {}", session.url().display());
    session.start();

    let outcome = loop {
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(Event::Next(RecordState::Recording { meters })) => {
                let peak = meters.peak().unwrap_or(f32::NEG_INFINITY);
                eprint!("\r{:>7.1} dBFS ", peak);
                let _ = io::stderr().flush();
            }
            Ok(Event::Next(RecordState::Preparing)) => {
                match deadline {
                    Some(_) => eprintln!("preparing..."),
                    None => eprintln!("preparing... Enter finishes, 'c' + Enter cancels"),
                }
            }
            Ok(Event::Next(state)) => eprintln!("\n{state}"),
            Ok(Event::Error(error)) => break Err(error),
            Ok(Event::Completed) => break Ok(session.state()),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break Ok(session.state()),
        }

        if deadline.is_some_and(|at| Instant::now() >= at) {
            session.finish();
        }
        if let Some(intents) = &intents {
            match intents.try_recv() {
                Ok(Intent::Finish) => session.finish(),
                Ok(Intent::Cancel) => session.cancel(),
                Err(_) => {}
            }
        }
    };

    match outcome {
        Ok(RecordState::Recorded) => {
            let info = session
                .recording_info()
                .context("recording finished but its file is unreadable")?;
            println!("{}", metadata::to_json(&info)?);

            if let Some(token) = &args.recognize_token {
                let request = RecognitionRequest::for_recording(session.url());
                for (name, value) in request.query_items(token) {
                    match value {
                        Some(value) => println!("{name}={value}"),
                        None => println!("{name}"),
                    }
                }
            }
            Ok(())
        }
        Ok(state) => {
            log::info!("session ended as {}", state);
            Ok(())
        }
        Err(error) => bail!("recording failed: {error}"),
    }
}

/// `--duration` as a `Duration`; negative values record nothing.
fn recording_length(secs: f64) -> Result<Duration> {
    let clamped = if secs < 0.0 { 0.0 } else { secs };
    let length = Duration::try_from_secs_f64(clamped)
        .with_context(|| format!("invalid duration: {secs} seconds"))?;
    if Instant::now().checked_add(length).is_none() {
        bail!("invalid duration: {secs} seconds");
    }
    Ok(length)
}

/// Forward keyboard lines as intents: an empty line finishes, `c` cancels.
fn spawn_keyboard_reader() -> Result<mpsc::Receiver<Intent>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("keyboard".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let intent = match line.trim() {
                    "c" | "cancel" => Intent::Cancel,
                    _ => Intent::Finish,
                };
                if tx.send(intent).is_err() {
                    break;
                }
            }
        })
        .context("spawning keyboard reader")?;
    Ok(rx)
}
