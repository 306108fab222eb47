//! Listening source lifecycle.
//!
//! `LineSource` owns the TCP listener, the accept task, and the set of
//! per-connection session tasks:
//!
//!  - `start` binds the listener and spawns the accept loop
//!  - the accept loop spawns one session task per connection and reaps
//!    finished ones
//!  - `stop` cancels everything, waits a bounded amount of time, and
//!    aborts whatever is still running
//!
//! The listener socket is owned by the accept task and closes when that
//! task exits, so by the time `stop` has joined it the port is released.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::*;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelSink;
use crate::common::{ShutdownError, SourceError};
use crate::config::{Config, Listen};
use crate::counters::CounterGroup;
use crate::lifecycle::LifecycleState;

use super::worker::{run_session, ConnectionWorker};

const BACKLOG: u32 = 1024;

/// How long `stop` waits for the accept task per attempt, and how often.
const ACCEPT_JOIN_WAIT: Duration = Duration::from_millis(500);
const ACCEPT_JOIN_RETRIES: u32 = 3;

/// Grace period for in-flight sessions before they are aborted.
const SESSION_GRACE: Duration = Duration::from_millis(500);

struct Inner {
    state: LifecycleState,
    accept: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

pub struct LineSource {
    cfg: Arc<Config>,
    counters: Arc<CounterGroup>,
    sink: Arc<dyn ChannelSink>,
    token: CancellationToken,
    workers: Arc<AsyncMutex<JoinSet<()>>>,
    inner: Mutex<Inner>,
    started_at: AtomicU64,
}

impl LineSource {
    pub fn new(cfg: Config, sink: Arc<dyn ChannelSink>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            counters: Arc::new(CounterGroup::new()),
            sink,
            token: CancellationToken::new(),
            workers: Arc::new(AsyncMutex::new(JoinSet::new())),
            inner: Mutex::new(Inner {
                state: LifecycleState::New,
                accept: None,
                local_addr: None,
            }),
            started_at: AtomicU64::new(0),
        }
    }

    /// Bind the configured address and begin accepting connections.
    ///
    /// On a bind failure the source stays in `New` and `open.errors` is
    /// bumped; a later `start` may retry. Starting from any other state is
    /// an error.
    pub async fn start(&self) -> Result<(), SourceError> {
        {
            let inner = self.lock_inner();
            if inner.state != LifecycleState::New {
                return Err(SourceError::InvalidState {
                    op: "start",
                    state: inner.state,
                });
            }
        }

        self.counters.increment_and_get("open.attempts");
        info!("Source starting");

        let listener = match bind_listener(&self.cfg.listen).await {
            Ok(l) => l,
            Err(e) => {
                self.counters.increment_and_get("open.errors");
                return Err(SourceError::Bind {
                    addr: format!("{}:{}", self.cfg.listen.host, self.cfg.listen.port),
                    source: e,
                });
            }
        };

        let local_addr = listener.local_addr().ok();
        let handle = tokio::spawn(accept_loop(
            listener,
            self.cfg.clone(),
            self.counters.clone(),
            self.sink.clone(),
            self.token.clone(),
            self.workers.clone(),
        ));

        {
            let mut inner = self.lock_inner();
            if inner.state != LifecycleState::New {
                // lost a race with a concurrent start or stop
                handle.abort();
                return Err(SourceError::InvalidState {
                    op: "start",
                    state: inner.state,
                });
            }
            inner.state = LifecycleState::Started;
            inner.accept = Some(handle);
            inner.local_addr = local_addr;
        }
        self.started_at.store(now_epoch_secs(), Ordering::Relaxed);

        if let Some(addr) = local_addr {
            info!("Created server socket: {}", addr);
        }
        debug!("Source started");
        Ok(())
    }

    /// Shut the source down.
    ///
    /// Every step runs even if an earlier one fails; failures are collected
    /// and returned together. Stopping an already stopped source is a no-op,
    /// and stopping one that never started just marks it stopped.
    pub async fn stop(&self) -> Result<(), SourceError> {
        let accept = {
            let mut inner = self.lock_inner();
            match inner.state {
                LifecycleState::Stopped => return Ok(()),
                LifecycleState::New => {
                    inner.state = LifecycleState::Stopped;
                    return Ok(());
                }
                LifecycleState::Started | LifecycleState::Stopping => {}
            }
            inner.state = LifecycleState::Stopping;
            inner.accept.take()
        };

        info!("Source stopping");
        let mut errors: Vec<ShutdownError> = Vec::new();

        self.token.cancel();

        // The accept task should notice the cancellation almost immediately;
        // re-assert it between bounded waits, then give up and abort.
        if let Some(mut handle) = accept {
            let mut joined = false;
            for _ in 0..ACCEPT_JOIN_RETRIES {
                match time::timeout(ACCEPT_JOIN_WAIT, &mut handle).await {
                    Ok(Ok(())) => {
                        joined = true;
                        break;
                    }
                    Ok(Err(e)) => {
                        errors.push(ShutdownError::Accept(e.to_string()));
                        joined = true;
                        break;
                    }
                    Err(_) => {
                        warn!(
                            "Waited {} ms for accept handler to finish; retrying",
                            ACCEPT_JOIN_WAIT.as_millis()
                        );
                        self.token.cancel();
                    }
                }
            }
            if !joined {
                errors.push(ShutdownError::Accept(
                    "did not finish in time; aborted".to_string(),
                ));
                handle.abort();
                let _ = (&mut handle).await;
            }
        }

        // Let in-flight sessions drain for a grace period, then abort the
        // rest. An aborted session never reached its own accounting, so it
        // is recorded as broken here.
        {
            let mut workers = self.workers.lock().await;
            let deadline = time::Instant::now() + SESSION_GRACE;
            loop {
                match time::timeout_at(deadline, workers.join_next()).await {
                    Ok(Some(Ok(()))) => {}
                    Ok(Some(Err(e))) => {
                        if e.is_panic() {
                            self.counters.increment_and_get("sessions.broken");
                            errors.push(ShutdownError::Worker(e.to_string()));
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let remaining = workers.len();
                        if remaining > 0 {
                            warn!(
                                "Aborting {} session(s) still running after {} ms",
                                remaining,
                                SESSION_GRACE.as_millis()
                            );
                            workers.abort_all();
                            while let Some(res) = workers.join_next().await {
                                if let Err(e) = res {
                                    if e.is_cancelled() {
                                        self.counters.increment_and_get("sessions.broken");
                                    } else if e.is_panic() {
                                        self.counters.increment_and_get("sessions.broken");
                                        errors.push(ShutdownError::Worker(e.to_string()));
                                    }
                                }
                            }
                        }
                        break;
                    }
                }
            }
        }

        {
            let mut inner = self.lock_inner();
            inner.state = LifecycleState::Stopped;
            inner.local_addr = None;
        }

        debug!("Source stopped. Event metrics: {}", self.counters);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SourceError::Shutdown(errors))
        }
    }

    pub fn counters(&self) -> &Arc<CounterGroup> {
        &self.counters
    }

    pub fn state(&self) -> LifecycleState {
        self.lock_inner().state
    }

    /// Address the listener actually bound, once started. Useful when the
    /// configured port is 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_inner().local_addr
    }

    pub fn uptime_secs(&self) -> u64 {
        let started = self.started_at.load(Ordering::Relaxed);
        if started == 0 {
            return 0;
        }
        now_epoch_secs().saturating_sub(started)
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Bind with SO_REUSEADDR, trying every resolved address in order.
async fn bind_listener(listen: &Listen) -> io::Result<TcpListener> {
    let mut last_err = None;

    for addr in lookup_host((listen.host.as_str(), listen.port)).await? {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }?;
        socket.set_reuseaddr(true)?;
        if let Err(e) = socket.bind(addr) {
            last_err = Some(e);
            continue;
        }
        match socket.listen(BACKLOG) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "listen address did not resolve",
        )
    }))
}

async fn accept_loop(
    listener: TcpListener,
    cfg: Arc<Config>,
    counters: Arc<CounterGroup>,
    sink: Arc<dyn ChannelSink>,
    token: CancellationToken,
    workers: Arc<AsyncMutex<JoinSet<()>>>,
) {
    debug!("Starting accept handler");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            res = listener.accept() => match res {
                Ok((socket, addr)) => {
                    counters.increment_and_get("accept.succeeded");
                    debug!("New connection from {}", addr);
                    let worker =
                        ConnectionWorker::new(socket, &cfg, counters.clone(), sink.clone());
                    workers
                        .lock()
                        .await
                        .spawn(run_session(worker, counters.clone()));
                }
                Err(e) => {
                    counters.increment_and_get("accept.failed");
                    error!("Unable to accept connection: {}", e);
                }
            },
            // reap finished sessions so the set does not grow with every
            // connection ever accepted
            Some(res) = async { workers.lock().await.join_next().await } => {
                if let Err(e) = res {
                    if !e.is_cancelled() {
                        counters.increment_and_get("sessions.broken");
                        error!("session task failed: {}", e);
                    }
                }
            }
        }
    }

    debug!("Accept handler exiting");
    // listener drops here, closing the server socket
}
