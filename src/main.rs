use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
    },
    time::Duration,
};

use clap::{Parser, Subcommand, arg};
use log::{error, warn};
use pacetrack::{
    PacetrackError, RecoveryOutcome, RunRecord, SessionEvent, StartConfig, Store,
    TrackingSession,
    config::AppConfig,
    export::{Exporter, GpxExporter, suggested_file_name, validate_run},
    positioning::{ReplayPace, ScriptedPositioningSource, SourceProbe},
    recovery::{check_for_recovery, decline_recovery},
    store::FileStore,
    track::now_ms,
    units::{UnitSystem, convert_pace, format_distance, format_pace, format_speed, format_time},
};

const EVENT_WAIT_MS: u64 = 250;
const PROGRESS_EVERY_SAMPLES: usize = 10;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a run from a JSON Lines file of location fixes
    Record {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Save very short runs without asking
        #[arg(short, long)]
        force: bool,

        /// Replay fixes following their timestamps, sped up by this factor
        #[arg(long)]
        speedup: Option<u32>,
    },
    /// Check for, resume or discard an interrupted session
    Recover {
        /// Continue the interrupted session with fixes from this file
        #[arg(long, requires = "input", conflicts_with = "discard")]
        resume: bool,

        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long)]
        discard: bool,
    },
    /// List saved runs, newest first
    List,
    Show {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Export a saved run as GPX
    Export {
        id: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show or change user settings
    Settings {
        #[arg(short, long)]
        units: Option<UnitSystem>,

        #[arg(long)]
        high_accuracy: Option<bool>,
    },
}

struct RecordOptions {
    name: Option<String>,
    notes: Option<String>,
    force: bool,
}

fn replay_source(input: &Path, speedup: Option<u32>) -> Result<ScriptedPositioningSource, PacetrackError> {
    let pace = match speedup {
        Some(speedup) => ReplayPace::Realtime { speedup },
        None => ReplayPace::Immediate,
    };
    Ok(ScriptedPositioningSource::from_file(input)?.with_pace(pace))
}

fn print_progress(session: &TrackingSession, units: UnitSystem) {
    let stats = session.live_stats();
    println!(
        "  {} {}  {}  pace {}/{}",
        format_distance(stats.total_distance_km, units),
        units.label(),
        format_time(stats.duration_seconds),
        format_pace(convert_pace(stats.avg_pace_sec_per_km, units)),
        units.label()
    );
}

/// Follow session events until the input runs out, the source fails or Ctrl-C
fn follow_session(
    session: &TrackingSession,
    events: &Receiver<SessionEvent>,
    probe: &SourceProbe,
    running: &AtomicBool,
    units: UnitSystem,
) {
    let mut samples_seen = 0;
    let mut last_quality = None;
    let mut handle = |event: SessionEvent| -> bool {
        match event {
            SessionEvent::Sample(_) => {
                samples_seen += 1;
                if samples_seen % PROGRESS_EVERY_SAMPLES == 0 {
                    print_progress(session, units);
                }
            }
            SessionEvent::Status(quality) => {
                if last_quality != Some(quality) {
                    println!("Signal: {:?}", quality);
                    last_quality = Some(quality);
                }
            }
            SessionEvent::SourceError(e) => warn!("Positioning hiccup: {}", e),
            SessionEvent::Aborted(e) => {
                error!("Recording stopped: {}", PacetrackError::from(e));
                return false;
            }
        }
        true
    };

    while running.load(Ordering::SeqCst) && !probe.is_exhausted() {
        match events.recv_timeout(Duration::from_millis(EVENT_WAIT_MS)) {
            Ok(event) => {
                if !handle(event) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
    for event in events.try_iter() {
        if !handle(event) {
            return;
        }
    }
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn print_run(run: &RunRecord, units: UnitSystem) {
    println!(
        "{}  {}",
        run.id.as_deref().unwrap_or("(unsaved)"),
        run.name.as_deref().unwrap_or("Run")
    );
    println!(
        "  distance {} {}  time {}  pace {}/{}  max {} {}",
        format_distance(run.distance_km, units),
        units.label(),
        format_time(run.duration_seconds),
        format_pace(convert_pace(run.avg_pace_sec_per_km, units)),
        units.label(),
        format_speed(run.max_speed_kmh, units),
        units.speed_label()
    );
    if let Some(elevation) = &run.elevation {
        println!(
            "  ascent {:.1} m  descent {:.1} m",
            elevation.ascent_m, elevation.descent_m
        );
    }
    if let Some(notes) = &run.notes {
        println!("  {}", notes);
    }
}

/// Record until done, then stop, confirm and save
fn record_with(
    mut session: TrackingSession,
    probe: SourceProbe,
    store: &dyn Store,
    options: RecordOptions,
    running: &AtomicBool,
) -> Result<(), PacetrackError> {
    let units = store.units()?;
    let (events_tx, events_rx) = mpsc::channel();
    session.start(StartConfig {
        high_accuracy: store.high_accuracy()?,
        unit_system: units,
        events: Some(events_tx),
    })?;
    println!("Recording, press Ctrl-C to stop");

    follow_session(&session, &events_rx, &probe, running, units);
    let route = session.stop();
    if route.is_empty() {
        println!("No location fixes were recorded");
        return Ok(());
    }

    let mut run = session.to_run_record();
    run.set_name(options.name)?;
    run.set_notes(options.notes)?;
    print_run(&run, units);

    if session.is_too_short() && !options.force && !confirm("This run is very short. Save anyway?")
    {
        println!("Run discarded");
        session.reset();
        return Ok(());
    }

    let id = store.save_completed_run(&mut run)?;
    println!("Saved run {}", id);
    session.reset();
    Ok(())
}

fn run_command(command: Commands, config: &AppConfig, running: Arc<AtomicBool>) -> Result<(), PacetrackError> {
    let store: Arc<dyn Store> = Arc::new(match &config.data_dir {
        Some(data_dir) => FileStore::new(data_dir.clone())?,
        None => FileStore::new_default()?,
    });

    match command {
        Commands::Record {
            input,
            name,
            notes,
            force,
            speedup,
        } => {
            if let RecoveryOutcome::Resumable(snapshot) = check_for_recovery(store.as_ref(), now_ms())? {
                println!(
                    "An interrupted session with {} fixes is waiting, see `pacetrack recover`",
                    snapshot.samples.len()
                );
            }
            let source = replay_source(&input, speedup)?;
            let probe = source.probe();
            let session =
                TrackingSession::new(Box::new(source), store.clone(), config.session_options());
            record_with(
                session,
                probe,
                store.as_ref(),
                RecordOptions { name, notes, force },
                &running,
            )
        }
        Commands::Recover {
            resume,
            input,
            discard,
        } => match check_for_recovery(store.as_ref(), now_ms())? {
            RecoveryOutcome::NoSession => {
                println!("No interrupted session to recover");
                Ok(())
            }
            RecoveryOutcome::Expired => {
                println!("The interrupted session was more than a day old and has been discarded");
                Ok(())
            }
            RecoveryOutcome::Resumable(snapshot) => {
                if discard {
                    decline_recovery(store.as_ref())?;
                    println!("Interrupted session discarded");
                    return Ok(());
                }
                let Some(input) = input.filter(|_| resume) else {
                    println!(
                        "Interrupted session with {} fixes, started {} s before its last snapshot",
                        snapshot.samples.len(),
                        (snapshot.last_snapshot_ms - snapshot.session_start_ms) / 1000
                    );
                    println!("Use --resume --input <fixes> to continue it or --discard to drop it");
                    return Ok(());
                };
                let source = replay_source(&input, None)?;
                let probe = source.probe();
                let mut session =
                    TrackingSession::new(Box::new(source), store.clone(), config.session_options());
                session.resume_from(snapshot);
                record_with(
                    session,
                    probe,
                    store.as_ref(),
                    RecordOptions {
                        name: None,
                        notes: None,
                        force: false,
                    },
                    &running,
                )
            }
        },
        Commands::List => {
            let units = store.units()?;
            let runs = store.load_all_runs()?;
            if runs.is_empty() {
                println!("No runs saved yet");
                return Ok(());
            }
            for run in &runs {
                print_run(run, units);
            }
            let summary = store.history_summary()?;
            println!(
                "{} runs, {} {}, {} total, average pace {}/{}",
                summary.total_runs,
                format_distance(summary.total_distance_km, units),
                units.label(),
                format_time(summary.total_duration_seconds),
                format_pace(convert_pace(summary.avg_pace_sec_per_km, units)),
                units.label()
            );
            Ok(())
        }
        Commands::Show { id } => {
            let run = store
                .load_run(&id)?
                .ok_or(PacetrackError::RunNotFound { id })?;
            print_run(&run, run.unit_system_at_save);
            for split in &run.splits {
                println!(
                    "  {:>3}{} {:.2} km  {}  {}/km",
                    split.number,
                    if split.is_partial { "*" } else { " " },
                    split.distance,
                    format_time(split.duration_seconds),
                    format_pace(split.pace_sec_per_km)
                );
            }
            Ok(())
        }
        Commands::Delete { id } => {
            store.delete_run(&id)?;
            println!("Deleted run {}", id);
            Ok(())
        }
        Commands::Export { id, output } => {
            let run = store
                .load_run(&id)?
                .ok_or(PacetrackError::RunNotFound { id })?;
            for problem in validate_run(&run) {
                warn!("{}", problem);
            }
            let output = output.unwrap_or_else(|| PathBuf::from(suggested_file_name(&run)));
            GpxExporter.export_to_file(&run, &output)?;
            println!("Exported to {}", output.display());
            Ok(())
        }
        Commands::Settings {
            units,
            high_accuracy,
        } => {
            if let Some(units) = units {
                store.set_units(units)?;
            }
            if let Some(high_accuracy) = high_accuracy {
                store.set_high_accuracy(high_accuracy)?;
            }
            println!("units: {}", store.units()?);
            println!("high accuracy: {}", store.high_accuracy()?);
            Ok(())
        }
    }
}

fn main() {
    colog::init();

    let cli = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Stopping...");
        handler_flag.store(false, Ordering::SeqCst);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let config = match AppConfig::from_local_file() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            AppConfig::default()
        }
    };

    if let Err(e) = run_command(cli.command, &config, running) {
        error!("{}", e);
        std::process::exit(1);
    }
}
