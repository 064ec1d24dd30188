//! knobd - GPIO rotary encoders and switches to ALSA, MIDI, OSC and console
//!
//! One process per box: describe the attached controls on the command line
//! (or in a YAML file), then let the event loop translate detents and
//! presses into target updates.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use knobd::cli::ControlOptions;
use knobd::config::ControlsFile;
use knobd::control::{Binding, Control, MixerHandle};
use knobd::engine::Engine;
use knobd::error::ConfigError;
use knobd::gpio::chip::EdgeSource;
use knobd::gpio::Dispatcher;
use knobd::router::Router;
use knobd::targets::console::{validate_template, Console};
use knobd::targets::midi::{self, MidiOut, MidiQueue};
use knobd::targets::mixer::AlsaMixer;
use knobd::targets::osc::{OscListener, OscSender, SlaveRoute};

/// knobd - turn GPIO rotary encoders and switches into control messages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GPIO character device (name or full path)
    #[arg(short, long, env = "KNOBD_DEVICE", default_value = "gpiochip0")]
    device: String,

    /// ALSA card for mixer-bound controls
    #[arg(long, default_value = "default")]
    mixer_card: String,

    /// MIDI output port to connect to (substring match); without it a
    /// virtual output port is created
    #[arg(long)]
    midi_port: Option<String>,

    /// Console output template, must contain %gpi% and %val%
    #[arg(long)]
    console_format: Option<String>,

    /// YAML file with control descriptors (CLI descriptors are appended)
    #[arg(short, long)]
    controls: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(flatten)]
    inputs: ControlOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting knobd...");

    let mut options = args.inputs.clone();
    if let Some(path) = &args.controls {
        match ControlsFile::load(path) {
            Ok(file) => options.prepend(file.into_options()),
            Err(e) => exit_usage(&format!("{e:#}")),
        }
    }
    if let Some(template) = &args.console_format {
        if let Err(e) = validate_template(template) {
            exit_usage(&e.to_string());
        }
    }

    let controls = match options.build() {
        Ok(controls) if controls.is_empty() => {
            exit_usage("no controls configured, nothing to do")
        }
        Ok(controls) => controls,
        Err(e) => exit_usage(&e.to_string()),
    };

    let mut dispatcher = Dispatcher::new();
    if let Err(e) = dispatcher.register_controls(&controls) {
        exit_usage(&e.to_string());
    }

    run_app(args, options.osc_url, controls, dispatcher).await?;

    info!("knobd shutdown complete");
    Ok(())
}

/// Configuration errors are fatal before the dispatch loop starts.
fn exit_usage(message: &str) -> ! {
    eprintln!("error: {message}");
    eprintln!("Run 'knobd --help' for the descriptor formats.");
    std::process::exit(2);
}

async fn run_app(
    args: Args,
    osc_url: Option<String>,
    controls: Vec<Control>,
    dispatcher: Dispatcher,
) -> Result<()> {
    let needs_mixer = controls
        .iter()
        .any(|c| c.binding.mixer_element().is_some());
    let needs_midi = controls
        .iter()
        .any(|c| matches!(c.binding, Binding::Midi { .. }));
    let needs_osc = controls
        .iter()
        .any(|c| matches!(c.binding, Binding::Osc { .. } | Binding::Master { .. }));

    let mut router = Router::new(Box::new(Console::new(args.console_format.clone())));
    if needs_mixer {
        router = router.with_mixer(Box::new(AlsaMixer::open(&args.mixer_card)?));
        info!(card = %args.mixer_card, "mixer target ready");
    }
    if needs_osc {
        router = router.with_osc(Box::new(OscSender::new()?));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if needs_midi {
        let conn = midi::connect(args.midi_port.as_deref())?;
        let queue = Arc::new(MidiQueue::new());
        router = router.with_midi(Box::new(MidiOut::new(queue.clone())));
        tasks.push(tokio::spawn(midi::pump(conn, queue, shutdown_rx.clone())));
    }

    let mut engine = Engine::new(controls);

    // Hand each mixer-bound control its element handle. A missing element
    // is logged and retried per update, like every other adapter failure.
    if let Some(mixer) = router.mixer_mut() {
        for control in engine.controls_mut() {
            let Some(element) = control.binding.mixer_element() else {
                continue;
            };
            match mixer.acquire(element) {
                Ok(handle) => control.handle = Some(handle),
                Err(e) => {
                    warn!(control = %control.name, error = %e, "mixer element not present yet");
                    control.handle = Some(MixerHandle {
                        element: element.to_string(),
                        index: 0,
                    });
                }
            }
        }
    }

    let (events_tx, mut events_rx) = mpsc::channel(256);

    let slave_routes: Vec<SlaveRoute> = engine
        .controls()
        .iter()
        .filter_map(|c| match &c.binding {
            Binding::Slave { path, .. } => Some(SlaveRoute {
                path: path.clone(),
                line: c.line,
                kind: c.kind,
            }),
            _ => None,
        })
        .collect();
    if !slave_routes.is_empty() {
        let url = osc_url.ok_or(ConfigError::Missing(
            "--osc-url is required when slave controls are configured",
        ))?;
        let listener = OscListener::bind(&url, slave_routes).await?;
        let events = events_tx.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = listener.run(events, shutdown).await {
                error!(error = %e, "OSC listener failed");
            }
        }));
    }

    if !dispatcher.is_empty() {
        let source = EdgeSource::open(&args.device, &dispatcher.lines()).await?;
        let events = events_tx.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = source.run(dispatcher, events, shutdown).await {
                error!(error = %e, "GPIO event loop failed");
            }
        }));
    }
    drop(events_tx);

    let shutdown_signal = shutdown_signal();
    tokio::pin!(shutdown_signal);

    info!("Ready to process input events");

    loop {
        tokio::select! {
            maybe_event = events_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        if let Some(update) = engine.apply(event, |c| router.read_live(c)) {
                            router.deliver(engine.control(update.index), update.outcome);
                        }
                    }
                    None => {
                        warn!("all input sources ended, stopping");
                        break;
                    }
                }
            }
            _ = &mut shutdown_signal => {
                info!("shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    shutdown_tx.send(true).ok();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    }
}
