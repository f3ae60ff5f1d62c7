//! Liveness session runtime.
//!
//! Wraps a [`veriease_core::LivenessTracker`] in a tokio task so that frame
//! handling and the movement-window expiry share one writer. The window
//! countdown runs on the task's timer, independent of frame arrival, and the
//! liveness status is published on a `watch` channel that UI code can
//! observe from any context.
//!
//! ```no_run
//! use veriease_core::LivenessConfig;
//! use veriease_session::spawn_session;
//!
//! # async fn run(frames: Vec<Option<veriease_core::FaceObservation>>) {
//! let session = spawn_session(LivenessConfig::default());
//! let mut status = session.subscribe();
//!
//! for frame in frames {
//!     session.on_frame(frame).await.ok();
//! }
//! if status.borrow_and_update().is_detected {
//!     println!("capture enabled");
//! }
//! session.shutdown().await.ok();
//! # }
//! ```

mod session;

pub use session::{spawn_session, SessionError, SessionHandle};
