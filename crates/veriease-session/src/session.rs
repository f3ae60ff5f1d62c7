use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;
use veriease_core::{FaceObservation, LivenessConfig, LivenessStatus, LivenessTracker};

/// Frames buffered ahead of the session task before `try_on_frame` reports busy.
const QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("liveness session has shut down")]
    Closed,
    #[error("liveness session queue is full; frame dropped")]
    Busy,
}

/// Messages sent from frame producers and the UI to the session task.
enum SessionRequest {
    Frame(Option<FaceObservation>),
    Reset,
    Status {
        reply: oneshot::Sender<LivenessStatus>,
    },
    Shutdown,
}

/// Clone-safe handle to one liveness session.
///
/// The session task is the only writer of its tracker. Frames, resets and
/// the window expiry are handled one at a time on that task, so a movement
/// never races with the expiry reset. Dropping every handle ends the session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    tx: mpsc::Sender<SessionRequest>,
    status_rx: watch::Receiver<LivenessStatus>,
    required_movements: u32,
    movement_interval: Duration,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Movements the subject must perform; for instructional copy.
    pub fn required_movements(&self) -> u32 {
        self.required_movements
    }

    /// Window in which the movements must happen; for instructional copy.
    pub fn movement_interval(&self) -> Duration {
        self.movement_interval
    }

    /// Queue one frame. `None` means the detector found no face.
    pub async fn on_frame(&self, observation: Option<FaceObservation>) -> Result<(), SessionError> {
        self.send(SessionRequest::Frame(observation)).await
    }

    /// Queue one frame without waiting, for synchronous camera callbacks.
    pub fn try_on_frame(&self, observation: Option<FaceObservation>) -> Result<(), SessionError> {
        self.tx
            .try_send(SessionRequest::Frame(observation))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SessionError::Busy,
                mpsc::error::TrySendError::Closed(_) => SessionError::Closed,
            })
    }

    /// Return the session to idle, e.g. when a new capture flow starts.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::Reset).await
    }

    /// Status after every request queued before this call has been handled.
    pub async fn status(&self) -> Result<LivenessStatus, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionRequest::Status { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Latest published liveness flag.
    pub fn is_detected(&self) -> bool {
        self.status_rx.borrow().is_detected
    }

    /// Receiver that observes every published status change.
    pub fn subscribe(&self) -> watch::Receiver<LivenessStatus> {
        self.status_rx.clone()
    }

    /// Stop the session task. A pending window expiry is dropped with it.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::Shutdown).await
    }

    async fn send(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.tx.send(request).await.map_err(|_| SessionError::Closed)
    }
}

/// Spawn a liveness session on the current tokio runtime.
///
/// # Panics
///
/// Panics if called outside a tokio runtime.
pub fn spawn_session(config: LivenessConfig) -> SessionHandle {
    let id = Uuid::new_v4();
    let required_movements = config.required_movements;
    let movement_interval = config.movement_interval();
    let (tx, rx) = mpsc::channel::<SessionRequest>(QUEUE_DEPTH);
    let (status_tx, status_rx) = watch::channel(LivenessStatus::default());

    let span = tracing::info_span!("liveness_session", session = %id);
    tokio::spawn(run_session(LivenessTracker::new(config), rx, status_tx).instrument(span));

    SessionHandle {
        id,
        tx,
        status_rx,
        required_movements,
        movement_interval,
    }
}

async fn run_session(
    mut tracker: LivenessTracker,
    mut rx: mpsc::Receiver<SessionRequest>,
    status_tx: watch::Sender<LivenessStatus>,
) {
    tracing::info!(
        required = tracker.required_movements(),
        interval_ms = tracker.movement_interval().as_millis() as u64,
        "session started"
    );

    loop {
        // Recomputed after every mutation: opening a window arms the timer,
        // reaching the threshold or resetting disarms it.
        let deadline = tracker.deadline().map(Instant::from_std);

        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else {
                    break;
                };
                match request {
                    SessionRequest::Frame(observation) => {
                        let outcome = tracker.on_frame(observation.as_ref(), Instant::now().into_std());
                        if let Some(transition) = outcome.transition {
                            tracing::trace!(?transition, count = outcome.status.movement_count, "frame handled");
                        }
                    }
                    SessionRequest::Reset => {
                        tracing::debug!("session reset requested");
                        tracker.reset();
                    }
                    SessionRequest::Status { reply } => {
                        let _ = reply.send(tracker.status());
                    }
                    SessionRequest::Shutdown => break,
                }
            }
            () = wait_until(deadline) => {
                tracker.expire(Instant::now().into_std());
            }
        }

        publish(&status_tx, tracker.status());
    }

    tracing::info!("session ended");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn publish(status_tx: &watch::Sender<LivenessStatus>, status: LivenessStatus) {
    status_tx.send_if_modified(|current| {
        if *current == status {
            return false;
        }
        if current.is_detected != status.is_detected {
            tracing::info!(is_detected = status.is_detected, "liveness changed");
        }
        *current = status;
        true
    });
}
