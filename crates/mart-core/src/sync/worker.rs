//! Background task serializing timer ticks and on-demand runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{SyncEngine, SyncError, SyncReport, SyncResult, WorkerState};

type Reply = oneshot::Sender<SyncResult<SyncReport>>;

enum Command {
    Run {
        cancel: CancellationToken,
        reply: Reply,
    },
}

/// Owner of the sync loop for one replica.
pub struct SyncWorker;

impl SyncWorker {
    /// Start the loop. With an interval and a configured upstream, a cycle
    /// also runs on every tick. The loop exits when `shutdown` is cancelled.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        interval: Option<Duration>,
        shutdown: CancellationToken,
    ) -> (SyncHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(8);
        let ticker = interval.filter(|_| engine.is_configured()).map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        if ticker.is_none() {
            tracing::info!("No upstream configured, periodic sync disabled");
        }

        let task = tokio::spawn(run_loop(Arc::clone(&engine), receiver, ticker, shutdown));
        (SyncHandle { commands, engine }, task)
    }
}

/// Cheap handle for triggering cycles and reading worker state.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    engine: Arc<SyncEngine>,
}

impl SyncHandle {
    /// Run one cycle now. Fails fast with [`SyncError::AlreadyRunning`] when a
    /// cycle is in flight.
    pub async fn run(&self, cancel: CancellationToken) -> SyncResult<SyncReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Run { cancel, reply })
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        response.await.map_err(|_| SyncError::WorkerStopped)?
    }

    pub async fn state(&self) -> WorkerState {
        self.engine.snapshot().await
    }

    pub const fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    mut commands: mpsc::Receiver<Command>,
    mut ticker: Option<Interval>,
    shutdown: CancellationToken,
) {
    let mut running: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = next_tick(ticker.as_mut()) => {
                if in_flight(running.as_ref()) {
                    tracing::debug!("Sync cycle in flight, skipping tick");
                } else {
                    running = Some(start_cycle(&engine, shutdown.child_token(), None));
                }
            }
            command = commands.recv() => match command {
                Some(Command::Run { cancel, reply }) => {
                    if in_flight(running.as_ref()) {
                        let _ = reply.send(Err(SyncError::AlreadyRunning));
                    } else {
                        running = Some(start_cycle(&engine, cancel, Some(reply)));
                    }
                }
                None => break,
            },
            () = wait_cycle(&mut running) => {}
        }
    }

    if let Some(cycle) = running {
        if let Err(err) = cycle.await {
            tracing::error!("Sync cycle task failed: {err}");
        }
    }
    tracing::info!("Sync worker stopped");
}

fn start_cycle(
    engine: &Arc<SyncEngine>,
    cancel: CancellationToken,
    reply: Option<Reply>,
) -> JoinHandle<()> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        let result = engine.run_once(&cancel).await;
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    })
}

fn in_flight(running: Option<&JoinHandle<()>>) -> bool {
    running.is_some_and(|cycle| !cycle.is_finished())
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_cycle(running: &mut Option<JoinHandle<()>>) {
    match running {
        Some(cycle) => {
            if let Err(err) = cycle.await {
                tracing::error!("Sync cycle task failed: {err}");
            }
            *running = None;
        }
        None => std::future::pending().await,
    }
}
