//! # tacgrid-collab — Serverless replication layer for tacgrid
//!
//! Keeps a shared frame timeline consistent across a mesh of peers with
//! no central server. Every participant runs one [`ReplicationSession`];
//! sessions dial each other directly over WebSocket links and exchange
//! bincode-encoded [`ReplicationMessage`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐    WebSocket     ┌──────────────────┐
//! │ ReplicationSession│ ◄──────────────► │ ReplicationSession│
//! │  (participant A) │   Binary Proto   │  (participant B) │
//! └────────┬─────────┘                  └────────┬─────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────┐                  ┌──────────────────┐
//! │ FrameStore       │                  │ FrameStore       │
//! │ (full replica)   │                  │ (full replica)   │
//! └────────┬─────────┘                  └────────┬─────────┘
//!          │                                     │
//!          ▼                                     ▼
//! ┌──────────────────┐                  ┌──────────────────┐
//! │ Presenter        │                  │ Presenter        │
//! │ (view adapter)   │                  │ (view adapter)   │
//! └──────────────────┘                  └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded ReplicationMessage)
//! - [`session`] — Mesh session: link lifecycle, bootstrap, fan-out, merge
//! - [`playback`] — Timeline playback scheduler
//! - [`view`] — Presenter seam to the rendering layer

pub mod playback;
pub mod protocol;
pub mod session;
pub mod view;

// Re-exports for convenience
pub use playback::{frame_delay, PlaybackScheduler, BASE_FPS, MAX_SPEED, MIN_SPEED};
pub use protocol::{ProtocolError, ReplicationMessage, ShapeKind, StrokeTool};
pub use session::{
    LinkState, PeerLink, ReplicationSession, SessionConfig, SessionEvent,
};
pub use view::{NullPresenter, Presenter};
