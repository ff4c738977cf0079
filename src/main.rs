use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use zilnova_lib::commands::{default_table, Resources};
use zilnova_lib::config::AppConfig;
use zilnova_lib::controller::{Assistant, Collaborators, STARTUP_GREETING};
use zilnova_lib::launcher::SystemLauncher;
use zilnova_lib::listen::{AudioInput, ConsoleInput, InputMode, ListenConfig};
use zilnova_lib::paths::AppPaths;
use zilnova_lib::preflight;
use zilnova_lib::shell::{self, ConsoleTranscript};
use zilnova_lib::speech::{SilentVoice, SpeechQueue, SpeechSynthesizer, SystemVoice};
use zilnova_lib::transcript::TranscriptSink;
use zilnova_lib::weather::OpenWeatherMap;

/// Delay between the startup greeting and listening
const AUTOSTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "zilnova", version, about = "Keyword-driven desktop voice assistant")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ZILNOVA_CONFIG")]
    config: Option<PathBuf>,

    /// Type commands instead of speaking them
    #[arg(long)]
    text: bool,

    /// Print replies without playing audio
    #[arg(long)]
    silent: bool,

    /// Run startup checks, print the report as JSON, and exit
    #[arg(long)]
    preflight: bool,

    /// Wait for `start` instead of listening right away
    #[arg(long)]
    no_autostart: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("ZILNOVA v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(Cli::parse()) {
        log::error!("ZILNOVA failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new()?;
    paths
        .ensure_directories()
        .context("Failed to create application directories")?;

    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = AppConfig::load_or_create(&config_path)?;
    config.apply_env();
    if cli.text {
        config.listen.mode = InputMode::Console;
    }
    if cli.silent {
        config.speech.enabled = false;
    }
    if cli.no_autostart {
        config.assistant.autostart = false;
    }
    config.validate().context("Invalid configuration")?;
    log::info!("Configuration loaded");

    let report = preflight::run_preflight(&config);
    if cli.preflight {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if !report.can_proceed {
        log::warn!("Preflight reported failures, continuing anyway");
    }

    // Components that own blocking HTTP clients are built and dropped
    // outside the async runtime
    let transcript: Arc<dyn TranscriptSink> = Arc::new(ConsoleTranscript);
    let synth: Box<dyn SpeechSynthesizer> = if config.speech.enabled {
        Box::new(SystemVoice::new(config.speech.clone()))
    } else {
        Box::new(SilentVoice)
    };
    let speech = SpeechQueue::start(synth, Arc::clone(&transcript))?;
    let (input, typed) = build_input(&config.listen)?;
    let weather = OpenWeatherMap::new(config.weather.clone())
        .context("Failed to create weather client")?;
    let resources = Resources::resolve(&config.resources, config.weather.default_city.clone());

    let assistant = Arc::new(Assistant::new(
        config.assistant.clone(),
        config.listen.window(),
        speech,
        default_table(),
        resources,
        Collaborators {
            input,
            launcher: Arc::new(SystemLauncher),
            weather: Arc::new(weather),
            transcript,
        },
    ));

    let (term_tx, term_rx) = tokio::sync::mpsc::unbounded_channel();
    assistant.on_terminate(move || {
        let _ = term_tx.send(());
    });

    assistant.speech().enqueue(STARTUP_GREETING);
    log::info!("✓ ZILNOVA ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let autostart = config.assistant.autostart;
    let shell_assistant = Arc::clone(&assistant);
    let reason = runtime.block_on(async move {
        if autostart {
            let assistant = Arc::clone(&shell_assistant);
            tokio::spawn(async move {
                tokio::time::sleep(AUTOSTART_DELAY).await;
                assistant.start_listening();
            });
        }
        shell::run(shell_assistant, typed, term_rx).await
    })?;

    drop(runtime);
    drop(assistant);
    log::info!("ZILNOVA exited ({:?})", reason);
    Ok(())
}

type TypedLines = crossbeam_channel::Sender<String>;

fn build_input(listen: &ListenConfig) -> Result<(Arc<dyn AudioInput>, Option<TypedLines>)> {
    match listen.mode {
        InputMode::Console => {
            let (input, typed) = ConsoleInput::new();
            log::info!("Text mode: typed lines stand in for speech");
            let input: Arc<dyn AudioInput> = Arc::new(input);
            Ok((input, Some(typed)))
        }
        InputMode::Microphone => Ok((microphone_input(listen)?, None)),
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "mic")] {
        fn microphone_input(listen: &ListenConfig) -> Result<Arc<dyn AudioInput>> {
            let mic = zilnova_lib::listen::capture::MicInput::new(listen.clone())
                .context("Microphone unavailable (run with --text to type commands)")?;
            let input: Arc<dyn AudioInput> = Arc::new(mic);
            Ok(input)
        }
    } else {
        fn microphone_input(_listen: &ListenConfig) -> Result<Arc<dyn AudioInput>> {
            anyhow::bail!("Built without microphone support (run with --text to type commands)")
        }
    }
}
