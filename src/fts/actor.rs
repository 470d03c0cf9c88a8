//! Actor wrapper around [`FtsStateMachine`].
//!
//! The state machine is owned by a single task. Callers hold an [`FtsHandle`]
//! and send [`FtsRequest`]s over an mpsc channel; each request carries a
//! oneshot sender the actor answers on, so commands are serialized without a
//! shared lock.
//!
//! ```text
//! Caller                         Actor task
//! ------                         ----------
//! 1. Build request + oneshot
//! 2. Send via mpsc        ------>
//!                                3. Check state, run command
//!                                4. Send result
//! 5. Await oneshot        <------
//! ```
//!
//! `stop` is the one command that does not simply wait its turn. The handle
//! raises the shared abort flag before queueing it, so a scan that is running
//! returns `ScanAborted` at its next hardware call and the stop is processed
//! right after.

use crate::data::SavedArtifacts;
use crate::error::{FtsError, FtsResult};
use crate::fts::machine::{FtsStateMachine, PointingPosition, StatusReport};
use crate::fts::state::OperatingState;
use crate::motion::{AbortFlag, ScanRequest, ScanResult};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Request queue depth.
pub const DEFAULT_CAPACITY: usize = 32;

/// Commands accepted by the actor.
#[derive(Debug)]
pub enum FtsRequest {
    /// Connect and bring every group to ready-from-homing.
    Initialize {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Position the pointing mirror.
    Configure {
        /// Pointing target
        position: PointingPosition,
        /// Move relative to the current setpoint
        relative: bool,
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Run a scan.
    Scan {
        /// Scan parameters
        request: ScanRequest,
        /// Result channel
        response: oneshot::Sender<FtsResult<ScanResult>>,
    },
    /// Persist the last scan.
    Save {
        /// Result channel
        response: oneshot::Sender<FtsResult<SavedArtifacts>>,
    },
    /// Query state and group status.
    Status {
        /// Result channel
        response: oneshot::Sender<FtsResult<StatusReport>>,
    },
    /// Abort all motion.
    Stop {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Disable motion.
    Pause {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Re-enable motion.
    Resume {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Reconnect.
    Reboot {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
    /// Release hardware.
    Close {
        /// Result channel
        response: oneshot::Sender<FtsResult<()>>,
    },
}

/// Task that owns the state machine.
pub struct FtsActor {
    machine: FtsStateMachine,
}

impl FtsActor {
    /// Wrap a state machine.
    pub fn new(machine: FtsStateMachine) -> Self {
        Self { machine }
    }

    /// Process requests until every handle is dropped.
    ///
    /// Requests are handled strictly in arrival order. The loop keeps running
    /// after `close` so late callers get a `Closed` error instead of a dead
    /// channel.
    pub async fn run(mut self, mut request_rx: mpsc::Receiver<FtsRequest>) {
        info!(state = %self.machine.state(), "FTS actor started");

        while let Some(request) = request_rx.recv().await {
            match request {
                FtsRequest::Initialize { response } => {
                    let result = self.machine.initialize().await;
                    let _ = response.send(result);
                }
                FtsRequest::Configure {
                    position,
                    relative,
                    response,
                } => {
                    let result = self.machine.configure(position, relative).await;
                    let _ = response.send(result);
                }
                FtsRequest::Scan { request, response } => {
                    let result = self.machine.scan(request).await;
                    let _ = response.send(result);
                }
                FtsRequest::Save { response } => {
                    let result = self.machine.save().await;
                    let _ = response.send(result);
                }
                FtsRequest::Status { response } => {
                    let result = self.machine.status().await;
                    let _ = response.send(result);
                }
                FtsRequest::Stop { response } => {
                    let result = self.machine.stop().await;
                    let _ = response.send(result);
                }
                FtsRequest::Pause { response } => {
                    let result = self.machine.pause().await;
                    let _ = response.send(result);
                }
                FtsRequest::Resume { response } => {
                    let result = self.machine.resume().await;
                    let _ = response.send(result);
                }
                FtsRequest::Reboot { response } => {
                    let result = self.machine.reboot().await;
                    let _ = response.send(result);
                }
                FtsRequest::Close { response } => {
                    let result = self.machine.close().await;
                    let _ = response.send(result);
                }
            }
        }

        if !self.machine.is_closed() {
            debug!("all handles dropped, closing controller");
            let _ = self.machine.close().await;
        }
        info!("FTS actor stopped");
    }
}

/// Cloneable client of a running [`FtsActor`].
#[derive(Clone)]
pub struct FtsHandle {
    request_tx: mpsc::Sender<FtsRequest>,
    state_rx: watch::Receiver<OperatingState>,
    abort: AbortFlag,
}

/// Start the actor on the current runtime.
pub fn spawn(machine: FtsStateMachine) -> (FtsHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::channel(DEFAULT_CAPACITY);
    let handle = FtsHandle {
        request_tx,
        state_rx: machine.subscribe(),
        abort: machine.abort_flag(),
    };
    let task = tokio::spawn(FtsActor::new(machine).run(request_rx));
    (handle, task)
}

impl FtsHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<FtsResult<T>>) -> FtsRequest,
    ) -> FtsResult<T> {
        let (response, rx) = oneshot::channel();
        self.request_tx
            .send(build(response))
            .await
            .map_err(|_| FtsError::ActorUnavailable("request channel closed".into()))?;
        rx.await
            .map_err(|_| FtsError::ActorUnavailable("response dropped".into()))?
    }

    /// Last published operating state.
    pub fn state(&self) -> OperatingState {
        *self.state_rx.borrow()
    }

    /// Receiver following every state change.
    pub fn watch_state(&self) -> watch::Receiver<OperatingState> {
        self.state_rx.clone()
    }

    /// Bring the instrument up.
    pub async fn initialize(&self) -> FtsResult<()> {
        self.request(|response| FtsRequest::Initialize { response })
            .await
    }

    /// Point the mirror.
    pub async fn configure(&self, position: PointingPosition, relative: bool) -> FtsResult<()> {
        self.request(|response| FtsRequest::Configure {
            position,
            relative,
            response,
        })
        .await
    }

    /// Run a scan and wait for its result.
    pub async fn scan(&self, request: ScanRequest) -> FtsResult<ScanResult> {
        self.request(|response| FtsRequest::Scan { request, response })
            .await
    }

    /// Write the last scan to disk.
    pub async fn save(&self) -> FtsResult<SavedArtifacts> {
        self.request(|response| FtsRequest::Save { response }).await
    }

    /// Snapshot of state and group status codes.
    pub async fn status(&self) -> FtsResult<StatusReport> {
        self.request(|response| FtsRequest::Status { response })
            .await
    }

    /// Abort a running scan, then stop all motion.
    pub async fn stop(&self) -> FtsResult<()> {
        self.abort.trigger("stop requested");
        self.request(|response| FtsRequest::Stop { response }).await
    }

    /// Hold the scan stage.
    pub async fn pause(&self) -> FtsResult<()> {
        self.request(|response| FtsRequest::Pause { response }).await
    }

    /// Release a paused stage.
    pub async fn resume(&self) -> FtsResult<()> {
        self.request(|response| FtsRequest::Resume { response })
            .await
    }

    /// Tear down and reconnect.
    pub async fn reboot(&self) -> FtsResult<()> {
        self.request(|response| FtsRequest::Reboot { response })
            .await
    }

    /// Release the controller for good.
    pub async fn close(&self) -> FtsResult<()> {
        self.request(|response| FtsRequest::Close { response }).await
    }
}
