use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use hello_oboe::audio::option_tables;
use hello_oboe::engine::{create_platform_backend, DesktopStubBackend, PlaybackBackend};
use hello_oboe::telemetry::SystemTimeSource;
use hello_oboe::telephony::simulated::SimulatedTelephony;
use hello_oboe::telephony::{BindingState, ConnectionState, PermissionState, StaticPermissions};
use hello_oboe::{
    AppConfig, BroadcastPresenter, Coordinator, CoordinatorHandle, CoordinatorParts,
    CoordinatorSnapshot,
};

#[derive(Parser, Debug)]
#[command(
    name = "hello_oboe_cli",
    about = "Desktop harness for the Hello Oboe coordinator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the selector tables as JSON
    Options,
    /// Drive a scripted session and stream UI events as JSON lines
    Scenario {
        #[arg(value_enum)]
        name: ScenarioName,
        #[arg(long, value_enum, default_value_t = BackendKind::Stub)]
        backend: BackendKind,
        /// JSON config file (assets/hello_oboe.json when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the latency polling interval
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Print the final coordinator snapshot to stderr
        #[arg(long)]
        snapshot: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ScenarioName {
    IncomingCall,
    OutgoingCall,
    StopDuringCall,
    Latency,
    MissingPermissions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// In-memory backend, no audio device needed
    Stub,
    /// The real platform backend
    Cpal,
}

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    hello_oboe::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Options => {
            println!("{}", serde_json::to_string_pretty(&option_tables())?);
            Ok(ExitCode::from(0))
        }
        Commands::Scenario {
            name,
            backend,
            config,
            interval_ms,
            snapshot,
        } => {
            let mut config = match config {
                Some(path) => AppConfig::load_from_file(path),
                None => AppConfig::load(),
            };
            if let Some(interval_ms) = interval_ms {
                config.latency.interval_ms = interval_ms;
            }

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("building tokio runtime")?;
            runtime.block_on(run_scenario(name, backend, config, snapshot))?;
            Ok(ExitCode::from(0))
        }
    }
}

async fn run_scenario(
    name: ScenarioName,
    backend: BackendKind,
    config: AppConfig,
    print_snapshot: bool,
) -> Result<()> {
    let backend: Arc<dyn PlaybackBackend> = match backend {
        BackendKind::Stub => Arc::new(DesktopStubBackend::new()),
        BackendKind::Cpal => create_platform_backend(),
    };
    let permissions: Arc<dyn PermissionState> = match name {
        ScenarioName::MissingPermissions => Arc::new(StaticPermissions::none_granted()),
        _ => Arc::new(StaticPermissions::all_granted()),
    };
    let telephony = SimulatedTelephony::new();
    let presenter = BroadcastPresenter::new(1024);
    let interval = config.latency.interval();

    let mut events = presenter.stream().boxed();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => log::warn!("[Cli] Unprintable event: {}", err),
            }
        }
    });

    let handle = Coordinator::spawn(CoordinatorParts {
        config,
        backend,
        connector: telephony.connector(),
        permissions,
        presenter: Arc::new(presenter),
        time_source: Arc::new(SystemTimeSource::default()),
    });

    match name {
        ScenarioName::IncomingCall => {
            bind(&handle).await?;
            handle.request_incoming();
            wait_for(&handle, "ringing", |s| {
                connection_state(s) == Some(ConnectionState::Ringing)
            })
            .await?;
            handle.answer();
            handle.drop_call();
        }
        ScenarioName::OutgoingCall => {
            bind(&handle).await?;
            handle.request_outgoing();
            let snapshot = wait_for(&handle, "dialing", |s| {
                connection_state(s) == Some(ConnectionState::Dialing)
            })
            .await?;
            if let Some(connection) = snapshot.connection {
                telephony.remote_accept(connection.id);
            }
            wait_for(&handle, "active", |s| {
                connection_state(s) == Some(ConnectionState::Active)
            })
            .await?;
            handle.drop_call();
        }
        ScenarioName::StopDuringCall => {
            bind(&handle).await?;
            handle.request_incoming();
            wait_for(&handle, "ringing", |s| s.connection.is_some()).await?;
            handle.answer();
            handle.stop();
        }
        ScenarioName::Latency => {
            handle.foreground();
            tokio::time::sleep(interval * 3 + interval / 2).await;
            handle.background();
        }
        ScenarioName::MissingPermissions => {
            bind(&handle).await?;
            handle.request_outgoing();
        }
    }

    let snapshot = handle
        .snapshot()
        .await
        .context("coordinator stopped early")?;
    let telemetry = handle.telemetry();
    handle.shutdown().await;
    drop(handle);

    // The stream ends once the coordinator drops its presenter.
    if tokio::time::timeout(Duration::from_secs(2), printer).await.is_err() {
        log::warn!("[Cli] Event stream did not close");
    }

    if print_snapshot {
        eprintln!("{}", serde_json::to_string(&snapshot)?);
    }
    let telemetry = telemetry.snapshot();
    log::info!(
        "[Cli] Finished {:?}: {} telemetry events, latency {}",
        name,
        telemetry.total_events,
        serde_json::to_string(&telemetry.latency)?
    );
    Ok(())
}

async fn bind(handle: &CoordinatorHandle) -> Result<()> {
    handle.start();
    wait_for(handle, "bound", |s| s.binding == BindingState::Bound).await?;
    Ok(())
}

fn connection_state(snapshot: &CoordinatorSnapshot) -> Option<ConnectionState> {
    snapshot.connection.map(|connection| connection.state)
}

async fn wait_for<F>(
    handle: &CoordinatorHandle,
    what: &str,
    mut pred: F,
) -> Result<CoordinatorSnapshot>
where
    F: FnMut(&CoordinatorSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    loop {
        let Some(snapshot) = handle.snapshot().await else {
            bail!("coordinator stopped while waiting for {what}");
        };
        if pred(&snapshot) {
            return Ok(snapshot);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
