//! Binary wire protocol for frame replication.
//!
//! Every message travels as one bincode-encoded binary frame on an
//! ordered-reliable peer link. The message set is a closed enum so that
//! adding a message kind is a compile-time-checked change; receivers
//! dispatch exhaustively and apply exactly one store mutation (or none,
//! for the visual-only kinds).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tacgrid_core::{Element, FrameNumber, FrameSnapshot, Point};
use uuid::Uuid;

/// Drawing tool for a live stroke segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeTool {
    Draw,
    Erase,
}

/// Committed two-point vector shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    Line,
    Arrow,
}

/// A replication message exchanged over one peer link.
///
/// `StrokeSegment` and `VectorShape` are visual-only: they give remote
/// viewers low-latency feedback while a gesture is in flight and are never
/// merged into the authoritative snapshot by themselves. The settled frame
/// always follows as a `FrameUpdate`, which receivers apply with
/// last-write-wins at whole-frame granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// Link handshake: each side announces its peer id immediately after
    /// the transport opens. Ignored once the link is open.
    Hello { peer_id: Uuid },

    /// One-time full frame-table transfer to a newly opened link.
    Bootstrap {
        frames: HashMap<FrameNumber, FrameSnapshot>,
    },

    /// Authoritative whole-frame replacement.
    FrameUpdate {
        frame_num: FrameNumber,
        snapshot: FrameSnapshot,
    },

    /// Advisory: where the sending participant is currently looking.
    FramePosition {
        peer_id: Uuid,
        frame_num: FrameNumber,
    },

    /// Live stroke segment (visual only).
    StrokeSegment {
        frame_num: FrameNumber,
        tool: StrokeTool,
        start: Point,
        end: Point,
        color: String,
    },

    /// Committed line/arrow (visual only).
    VectorShape {
        frame_num: FrameNumber,
        kind: ShapeKind,
        p1: Point,
        p2: Point,
        color: String,
    },

    /// Incremental element placement.
    ElementAdd {
        frame_num: FrameNumber,
        element: Element,
    },

    /// Incremental element reposition.
    ElementMove {
        frame_num: FrameNumber,
        element_id: String,
        position: Point,
    },

    /// Incremental element deletion.
    ElementRemove {
        frame_num: FrameNumber,
        element_id: String,
    },

    /// Whole-note replacement for one frame.
    NoteUpdate { frame_num: FrameNumber, text: String },
}

impl ReplicationMessage {
    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }

    /// The frame this message concerns, when it concerns one.
    pub fn frame_num(&self) -> Option<FrameNumber> {
        match self {
            Self::Hello { .. } | Self::Bootstrap { .. } => None,
            Self::FrameUpdate { frame_num, .. }
            | Self::FramePosition { frame_num, .. }
            | Self::StrokeSegment { frame_num, .. }
            | Self::VectorShape { frame_num, .. }
            | Self::ElementAdd { frame_num, .. }
            | Self::ElementMove { frame_num, .. }
            | Self::ElementRemove { frame_num, .. }
            | Self::NoteUpdate { frame_num, .. } => Some(*frame_num),
        }
    }
}

/// Protocol and link-lifecycle errors.
///
/// None of these are fatal to the process; the worst outcome of any of
/// them is transient divergence between peers' frame stores, which heals
/// on the next authoritative frame update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Serialization(String),
    Deserialization(String),
    Bind(String),
    ConnectionFailed(String),
    ConnectionClosed,
    Timeout,
    SelfConnect,
    DuplicateLink,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(e) => write!(f, "Serialization error: {e}"),
            Self::Deserialization(e) => write!(f, "Deserialization error: {e}"),
            Self::Bind(e) => write!(f, "Bind error: {e}"),
            Self::ConnectionFailed(e) => write!(f, "Connection failed: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Timeout => write!(f, "Connection timeout"),
            Self::SelfConnect => write!(f, "Cannot connect to self"),
            Self::DuplicateLink => write!(f, "Already connected to this peer"),
        }
    }
}

impl std::error::Error for ProtocolError {}
