//! Owner thread for non-`Send` native output streams.
//!
//! The stream is created, reconfigured and dropped on one dedicated thread.
//! Everything else talks to that thread through a command channel, and a
//! single mutex guards only the channel handle.

use std::marker::PhantomData;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use super::PlaybackBackend;
use crate::audio::{StreamConfig, ToneState};
use crate::error::AudioError;

/// A started native output stream. Lives on the owner thread only.
pub trait OutputStream {
    fn latency_supported(&self) -> bool;

    fn latency_millis(&mut self) -> Option<f64>;
}

/// Opens native streams for a [`StreamThreadBackend`].
pub trait OutputStreamDriver: 'static {
    type Stream: OutputStream;

    /// Name used in log lines.
    const NAME: &'static str;

    fn open(config: &StreamConfig, tone: Arc<ToneState>) -> Result<Self::Stream, AudioError>;
}

enum StreamCommand {
    Reconfigure {
        config: StreamConfig,
        reply: mpsc::Sender<Result<bool, AudioError>>,
    },
    Latency {
        reply: mpsc::Sender<Option<f64>>,
    },
    Close,
}

struct StreamWorker {
    commands: mpsc::Sender<StreamCommand>,
    thread: Option<JoinHandle<()>>,
    latency_supported: bool,
}

/// [`PlaybackBackend`] that confines the native stream to an owner thread.
pub struct StreamThreadBackend<D: OutputStreamDriver> {
    worker: Mutex<Option<StreamWorker>>,
    _driver: PhantomData<fn() -> D>,
}

impl<D: OutputStreamDriver> Default for StreamThreadBackend<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: OutputStreamDriver> StreamThreadBackend<D> {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
            _driver: PhantomData,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<StreamWorker>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn stream_gone(name: &str) -> AudioError {
    AudioError::StreamFailure {
        reason: format!("{} stream thread exited", name),
    }
}

fn run_stream_thread<D: OutputStreamDriver>(
    config: StreamConfig,
    tone: Arc<ToneState>,
    ready: mpsc::Sender<Result<bool, AudioError>>,
    commands: mpsc::Receiver<StreamCommand>,
) {
    let mut current = config;
    let mut stream = match D::open(&current, Arc::clone(&tone)) {
        Ok(stream) => {
            let _ = ready.send(Ok(stream.latency_supported()));
            Some(stream)
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    drop(ready);

    // A closed channel means the backend went away; treat it as Close.
    while let Ok(command) = commands.recv() {
        match command {
            StreamCommand::Reconfigure { config, reply } => {
                // The device is exclusive, release it before reopening.
                drop(stream.take());
                let result = match D::open(&config, Arc::clone(&tone)) {
                    Ok(next) => {
                        current = config;
                        let supported = next.latency_supported();
                        stream = Some(next);
                        Ok(supported)
                    }
                    Err(err) => {
                        warn!(
                            "[{}] Reconfigure failed, restoring previous stream: {}",
                            D::NAME,
                            err
                        );
                        stream = D::open(&current, Arc::clone(&tone)).ok();
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            StreamCommand::Latency { reply } => {
                let latency = stream.as_mut().and_then(|s| s.latency_millis());
                let _ = reply.send(latency);
            }
            StreamCommand::Close => break,
        }
    }

    drop(stream);
    debug!("[{}] Stream thread exiting", D::NAME);
}

impl<D: OutputStreamDriver> PlaybackBackend for StreamThreadBackend<D> {
    fn open(&self, config: &StreamConfig, tone: Arc<ToneState>) -> Result<(), AudioError> {
        let mut worker = self.lock();
        if worker.is_some() {
            return Err(AudioError::EngineUnavailable {
                reason: format!("{} stream already open", D::NAME),
            });
        }

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let config = *config;
        let thread = std::thread::Builder::new()
            .name(format!("{}-stream", D::NAME.to_lowercase()))
            .spawn(move || run_stream_thread::<D>(config, tone, ready_tx, command_rx))
            .map_err(|e| AudioError::EngineUnavailable {
                reason: format!("failed to spawn stream thread: {}", e),
            })?;

        let latency_supported = match ready_rx.recv() {
            Ok(Ok(supported)) => supported,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(stream_gone(D::NAME));
            }
        };

        info!(
            "[{}] Stream open: {} ch, {} bursts, api {}",
            D::NAME,
            config.channel_count.get(),
            config.buffer_size.bursts(),
            config.audio_api.label()
        );
        *worker = Some(StreamWorker {
            commands: command_tx,
            thread: Some(thread),
            latency_supported,
        });
        Ok(())
    }

    fn reconfigure(&self, config: &StreamConfig) -> Result<(), AudioError> {
        let mut guard = self.lock();
        let worker = guard.as_mut().ok_or(AudioError::EngineInactive)?;

        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .commands
            .send(StreamCommand::Reconfigure {
                config: *config,
                reply: reply_tx,
            })
            .map_err(|_| stream_gone(D::NAME))?;
        let supported = reply_rx.recv().map_err(|_| stream_gone(D::NAME))??;
        worker.latency_supported = supported;
        Ok(())
    }

    fn close(&self) {
        let worker = self.lock().take();
        let Some(mut worker) = worker else {
            return;
        };
        let _ = worker.commands.send(StreamCommand::Close);
        if let Some(thread) = worker.thread.take() {
            if thread.join().is_err() {
                error!("[{}] Stream thread panicked during close", D::NAME);
            }
        }
        info!("[{}] Stream closed", D::NAME);
    }

    fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn is_latency_detection_supported(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|worker| worker.latency_supported)
            .unwrap_or(false)
    }

    fn current_output_latency_millis(&self) -> Option<f64> {
        let guard = self.lock();
        let worker = guard.as_ref()?;
        let (reply_tx, reply_rx) = mpsc::channel();
        worker
            .commands
            .send(StreamCommand::Latency { reply: reply_tx })
            .ok()?;
        reply_rx.recv().ok().flatten()
    }
}

impl<D: OutputStreamDriver> Drop for StreamThreadBackend<D> {
    fn drop(&mut self) {
        self.close();
    }
}
