//! Mesh replication session.
//!
//! One session per participant. Each session owns the frame store, a
//! registry of peer links, and the local participant's identity; together
//! the sessions form a fully-connected mesh with no central server.
//!
//! ## Data flow
//!
//! ```text
//!  local edit (canvas/element adapter)
//!        │
//!        ▼
//!  ReplicationSession::{add_element, commit_frame, …}
//!        │  mutate FrameStore, then fan out
//!        ▼
//!  broadcast ── per-link writer tasks ── WebSocket ── remote sessions
//!                                                         │
//!                                                         ▼
//!                                         apply_remote() → FrameStore
//!                                                         │
//!                                                         ▼
//!                                         Presenter::render if current
//! ```
//!
//! Link lifecycle: `Connecting → Open → Closed`, with `Connecting → Failed`
//! on handshake error or timeout. A link only enters the registry once it
//! is `Open`; rejected links (self-connect, duplicate, timeout) are never
//! registered, so a later connect attempt to the same peer is permitted.
//! On `Open` the session immediately sends its entire frame table and its
//! current frame position, which is what makes a late joiner converge.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use tacgrid_core::{
    frame_in_range, Element, FrameNumber, FrameSnapshot, FrameStore, Point, MAX_FRAMES,
};

use crate::protocol::{ProtocolError, ReplicationMessage, ShapeKind, StrokeTool};
use crate::view::Presenter;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Address to listen on for inbound peer links.
    pub bind_addr: String,
    /// Bound on connection establishment, transport plus handshake.
    pub connect_timeout: Duration,
    /// Outgoing message buffer per peer link.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
        }
    }
}

/// Peer-link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// One open link to another participant.
///
/// Owned by the session's registry; discarded on close or error, taking
/// its advisory frame-position bookkeeping with it.
#[derive(Debug)]
pub struct PeerLink {
    pub peer_id: Uuid,
    pub state: LinkState,
    /// Last frame the peer reported looking at. Advisory only.
    pub last_known_frame: Option<FrameNumber>,
    outgoing: mpsc::Sender<Vec<u8>>,
}

/// Events emitted to the embedding application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A peer link reached `Open`.
    LinkOpened(Uuid),
    /// A peer link closed or dropped mid-session.
    LinkClosed(Uuid),
    /// Connection establishment failed; no link was registered.
    LinkFailed { addr: String, reason: String },
    /// A peer reported a new frame position.
    PeerFrameChanged {
        peer_id: Uuid,
        frame_num: FrameNumber,
    },
}

/// The replication session.
pub struct ReplicationSession {
    local_id: Uuid,
    config: SessionConfig,
    store: RwLock<FrameStore>,
    links: RwLock<HashMap<Uuid, PeerLink>>,
    presenter: Arc<dyn Presenter>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
}

impl ReplicationSession {
    /// Create a session with a freshly minted peer id.
    pub fn new(config: SessionConfig, presenter: Arc<dyn Presenter>) -> Arc<Self> {
        let (event_tx, event_rx) = mpsc::channel(256);
        Arc::new(Self {
            local_id: Uuid::new_v4(),
            config,
            store: RwLock::new(FrameStore::new()),
            links: RwLock::new(HashMap::new()),
            presenter,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        })
    }

    /// Our peer id.
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    /// Take the event receiver (can only be taken once).
    pub async fn take_event_rx(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.lock().await.take()
    }

    // ── Link establishment ───────────────────────────────────────────

    /// Start accepting inbound peer links. Returns the bound address.
    pub async fn listen(self: &Arc<Self>, addr: &str) -> Result<SocketAddr, ProtocolError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProtocolError::Bind(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ProtocolError::Bind(e.to_string()))?;
        log::info!("Session {} listening on {local_addr}", self.local_id);

        let session = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let session = session.clone();
                        tokio::spawn(async move {
                            if let Err(e) = session.accept_inbound(stream).await {
                                log::warn!("Inbound link from {remote} failed: {e}");
                                let _ = session.event_tx.try_send(SessionEvent::LinkFailed {
                                    addr: remote.to_string(),
                                    reason: e.to_string(),
                                });
                            }
                        });
                    }
                    Err(e) => {
                        log::warn!("Accept error, stopping listener: {e}");
                        break;
                    }
                }
            }
        });
        Ok(local_addr)
    }

    /// Dial an outbound peer link. Returns the remote peer id on success.
    ///
    /// Failures (unreachable peer, handshake timeout, self-connect,
    /// duplicate) are reported both as the returned error and as a
    /// [`SessionEvent::LinkFailed`]; no retry is attempted.
    pub async fn connect(self: &Arc<Self>, addr: &str) -> Result<Uuid, ProtocolError> {
        let result = self.connect_inner(addr).await;
        if let Err(ref e) = result {
            log::warn!("Connect to {addr} failed: {e}");
            let _ = self.event_tx.try_send(SessionEvent::LinkFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            });
        }
        result
    }

    async fn connect_inner(self: &Arc<Self>, addr: &str) -> Result<Uuid, ProtocolError> {
        let url = format!("ws://{addr}");
        let (mut ws, _) = timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(&url),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)?
        .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

        let peer_id = timeout(self.config.connect_timeout, self.handshake(&mut ws))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        self.open_link(peer_id, ws).await?;
        Ok(peer_id)
    }

    async fn accept_inbound(self: &Arc<Self>, stream: TcpStream) -> Result<(), ProtocolError> {
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;
        let peer_id = timeout(self.config.connect_timeout, self.handshake(&mut ws))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        self.open_link(peer_id, ws).await
    }

    /// Exchange `Hello` messages: announce our id, wait for the peer's.
    async fn handshake<S>(&self, ws: &mut WebSocketStream<S>) -> Result<Uuid, ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let hello = ReplicationMessage::Hello {
            peer_id: self.local_id,
        }
        .encode()?;
        ws.send(Message::Binary(hello.into()))
            .await
            .map_err(|e| ProtocolError::ConnectionFailed(e.to_string()))?;

        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    let bytes: Vec<u8> = data.into();
                    match ReplicationMessage::decode(&bytes)? {
                        ReplicationMessage::Hello { peer_id } => return Ok(peer_id),
                        other => {
                            log::debug!("Ignoring pre-handshake message: {other:?}");
                        }
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return Err(ProtocolError::ConnectionClosed),
                _ => {}
            }
        }
        Err(ProtocolError::ConnectionClosed)
    }

    /// Register a handshaken link and bring it to `Open`.
    async fn open_link<S>(
        self: &Arc<Self>,
        peer_id: Uuid,
        ws: WebSocketStream<S>,
    ) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if peer_id == self.local_id {
            return Err(ProtocolError::SelfConnect);
        }

        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(self.config.channel_capacity);
        {
            let mut links = self.links.write().await;
            if links.contains_key(&peer_id) {
                return Err(ProtocolError::DuplicateLink);
            }
            links.insert(
                peer_id,
                PeerLink {
                    peer_id,
                    state: LinkState::Open,
                    last_known_frame: None,
                    outgoing: out_tx.clone(),
                },
            );
        }
        log::info!("Link open: {peer_id}");
        let _ = self.event_tx.try_send(SessionEvent::LinkOpened(peer_id));

        let (mut ws_writer, mut ws_reader) = ws.split();

        // Writer task: drain the outgoing channel onto the wire. When the
        // channel closes (link dropped locally) a Close frame tells the
        // peer to clean up too.
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        // Bootstrap the new peer: full frame table, then our position.
        let (bootstrap, position) = {
            let store = self.store.read().await;
            (
                ReplicationMessage::Bootstrap {
                    frames: store.export(),
                },
                ReplicationMessage::FramePosition {
                    peer_id: self.local_id,
                    frame_num: store.current_frame(),
                },
            )
        };
        for msg in [bootstrap, position] {
            let encoded = msg.encode()?;
            let _ = out_tx.send(encoded).await;
        }

        // Reader task: apply every inbound message, then tear down.
        let session = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match ReplicationMessage::decode(&bytes) {
                            Ok(m) => session.apply_remote(peer_id, m).await,
                            Err(e) => log::warn!("Undecodable message from {peer_id}: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            session.drop_link(peer_id).await;
        });

        Ok(())
    }

    /// Close a link locally. Safe to call for unknown ids.
    pub async fn close_link(&self, peer_id: Uuid) {
        self.drop_link(peer_id).await;
    }

    async fn drop_link(&self, peer_id: Uuid) {
        let removed = self.links.write().await.remove(&peer_id);
        if let Some(mut link) = removed {
            link.state = LinkState::Closed;
            log::info!("Link closed: {peer_id}");
            let _ = self.event_tx.try_send(SessionEvent::LinkClosed(peer_id));
        }
    }

    // ── Fan-out ──────────────────────────────────────────────────────

    /// Best-effort broadcast: encode once, try every open link, skip and
    /// log any link that cannot take the message. One link's failure
    /// never aborts delivery to the rest.
    async fn broadcast(&self, msg: &ReplicationMessage) {
        let encoded = match msg.encode() {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Broadcast encode failed: {e}");
                return;
            }
        };
        let links = self.links.read().await;
        for link in links.values() {
            if link.state != LinkState::Open {
                continue;
            }
            if let Err(e) = link.outgoing.try_send(encoded.clone()) {
                log::warn!("Send to {} skipped: {e}", link.peer_id);
            }
        }
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    /// Apply one remote message to the local state.
    ///
    /// Exhaustive over the message set; each arm performs exactly one
    /// kind of mutation. All arms are idempotent, so racing incremental
    /// messages against an authoritative frame update is replay-safe.
    pub async fn apply_remote(&self, from: Uuid, msg: ReplicationMessage) {
        log::trace!("Message from {from}: {msg:?}");
        match msg {
            ReplicationMessage::Hello { peer_id } => {
                log::debug!("Stray hello from {peer_id} on an open link");
            }

            ReplicationMessage::Bootstrap { frames } => {
                let (current, snapshot) = {
                    let mut store = self.store.write().await;
                    store.merge_missing(frames);
                    let current = store.current_frame();
                    (current, store.get(current).clone())
                };
                // The merge may have filled in the frame we are viewing.
                self.presenter.render(current, &snapshot);
            }

            ReplicationMessage::FrameUpdate {
                frame_num,
                snapshot,
            } => {
                self.mutate_and_render(frame_num, |store| {
                    store.replace_snapshot(frame_num, snapshot);
                })
                .await;
            }

            ReplicationMessage::FramePosition { peer_id, frame_num } => {
                {
                    let mut links = self.links.write().await;
                    if let Some(link) = links.get_mut(&peer_id) {
                        link.last_known_frame = Some(frame_num);
                    }
                }
                let _ = self
                    .event_tx
                    .try_send(SessionEvent::PeerFrameChanged { peer_id, frame_num });
            }

            ReplicationMessage::StrokeSegment {
                frame_num,
                tool,
                start,
                end,
                color,
            } => {
                if self.store.read().await.current_frame() == frame_num {
                    self.presenter.draw_segment(tool, start, end, &color);
                }
            }

            ReplicationMessage::VectorShape {
                frame_num,
                kind,
                p1,
                p2,
                color,
            } => {
                if self.store.read().await.current_frame() == frame_num {
                    self.presenter.draw_shape(kind, p1, p2, &color);
                }
            }

            ReplicationMessage::ElementAdd { frame_num, element } => {
                self.mutate_and_render(frame_num, |store| {
                    store.upsert_element(frame_num, element);
                })
                .await;
            }

            ReplicationMessage::ElementMove {
                frame_num,
                element_id,
                position,
            } => {
                self.mutate_and_render(frame_num, |store| {
                    store.update_element_position(frame_num, &element_id, position);
                })
                .await;
            }

            ReplicationMessage::ElementRemove {
                frame_num,
                element_id,
            } => {
                self.mutate_and_render(frame_num, |store| {
                    store.remove_element(frame_num, &element_id);
                })
                .await;
            }

            ReplicationMessage::NoteUpdate { frame_num, text } => {
                self.mutate_and_render(frame_num, |store| {
                    store.set_note(frame_num, text);
                })
                .await;
            }
        }
    }

    /// Run `mutate` under the store's write lock, then re-render the
    /// affected frame if it is the one currently displayed.
    async fn mutate_and_render<F>(&self, frame_num: FrameNumber, mutate: F)
    where
        F: FnOnce(&mut FrameStore),
    {
        let rendered = {
            let mut store = self.store.write().await;
            mutate(&mut store);
            if store.current_frame() == frame_num {
                Some(store.get(frame_num).clone())
            } else {
                None
            }
        };
        if let Some(snapshot) = rendered {
            self.presenter.render(frame_num, &snapshot);
        }
    }

    // ── Local mutation surface (canvas/element adapter) ──────────────

    /// Broadcast an in-flight stroke segment on the current frame.
    /// Visual only; the settled frame follows via [`commit_frame`].
    ///
    /// [`commit_frame`]: Self::commit_frame
    pub async fn send_stroke_segment(
        &self,
        tool: StrokeTool,
        start: Point,
        end: Point,
        color: impl Into<String>,
    ) {
        let frame_num = self.store.read().await.current_frame();
        self.broadcast(&ReplicationMessage::StrokeSegment {
            frame_num,
            tool,
            start,
            end,
            color: color.into(),
        })
        .await;
    }

    /// Broadcast a committed line/arrow on the current frame (visual only).
    pub async fn send_vector_shape(
        &self,
        kind: ShapeKind,
        p1: Point,
        p2: Point,
        color: impl Into<String>,
    ) {
        let frame_num = self.store.read().await.current_frame();
        self.broadcast(&ReplicationMessage::VectorShape {
            frame_num,
            kind,
            p1,
            p2,
            color: color.into(),
        })
        .await;
    }

    /// Place an element on the current frame and replicate it.
    pub async fn add_element(&self, element: Element) {
        let frame_num = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            store.upsert_element(n, element.clone());
            n
        };
        self.broadcast(&ReplicationMessage::ElementAdd { frame_num, element })
            .await;
    }

    /// Move an element on the current frame and replicate the move.
    pub async fn move_element(&self, element_id: &str, position: Point) {
        let frame_num = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            store.update_element_position(n, element_id, position);
            n
        };
        self.broadcast(&ReplicationMessage::ElementMove {
            frame_num,
            element_id: element_id.to_string(),
            position,
        })
        .await;
    }

    /// Delete an element from the current frame and replicate the delete.
    pub async fn remove_element(&self, element_id: &str) {
        let frame_num = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            store.remove_element(n, element_id);
            n
        };
        self.broadcast(&ReplicationMessage::ElementRemove {
            frame_num,
            element_id: element_id.to_string(),
        })
        .await;
    }

    /// Replace the current frame's note and replicate it.
    pub async fn set_note(&self, text: impl Into<String>) {
        let text = text.into();
        let frame_num = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            store.set_note(n, text.clone());
            n
        };
        self.broadcast(&ReplicationMessage::NoteUpdate { frame_num, text })
            .await;
    }

    /// Wipe the current frame and broadcast the cleared snapshot as an
    /// authoritative update.
    pub async fn clear_frame(&self) {
        let frame_num = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            store.clear_frame(n);
            n
        };
        self.broadcast(&ReplicationMessage::FrameUpdate {
            frame_num,
            snapshot: FrameSnapshot::default(),
        })
        .await;
    }

    /// Capture the view into the store and broadcast the current frame as
    /// an authoritative update. Called when a gesture settles (e.g. the
    /// pointer is released after a stroke).
    pub async fn commit_frame(&self) {
        let (frame_num, snapshot) = {
            let mut store = self.store.write().await;
            let n = store.current_frame();
            if let Some(captured) = self.presenter.capture() {
                store.replace_snapshot(n, captured);
            }
            (n, store.get(n).clone())
        };
        self.broadcast(&ReplicationMessage::FrameUpdate {
            frame_num,
            snapshot,
        })
        .await;
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// Navigate to frame `n`. Silently ignored outside `[1, MAX_FRAMES]`.
    ///
    /// Order matters: the outgoing frame is captured from the view and
    /// broadcast as authoritative before the pointer moves, so peers see
    /// local authorship; then the target is materialized, rendered, and
    /// the new position is announced.
    pub async fn go_to_frame(&self, n: FrameNumber) {
        if !frame_in_range(n) {
            return;
        }

        let (old, old_snapshot) = {
            let mut store = self.store.write().await;
            let old = store.current_frame();
            if let Some(captured) = self.presenter.capture() {
                store.replace_snapshot(old, captured);
            }
            (old, store.get(old).clone())
        };
        self.broadcast(&ReplicationMessage::FrameUpdate {
            frame_num: old,
            snapshot: old_snapshot,
        })
        .await;

        let new_snapshot = {
            let mut store = self.store.write().await;
            store.set_current(n);
            store.get(n).clone()
        };
        self.presenter.render(n, &new_snapshot);

        self.broadcast(&ReplicationMessage::FramePosition {
            peer_id: self.local_id,
            frame_num: n,
        })
        .await;
    }

    /// Step forward one frame, if not at the end.
    pub async fn next_frame(&self) {
        let current = self.current_frame().await;
        if current < MAX_FRAMES {
            self.go_to_frame(current + 1).await;
        }
    }

    /// Step back one frame, if not at the start.
    pub async fn previous_frame(&self) {
        let current = self.current_frame().await;
        if current > 1 {
            self.go_to_frame(current - 1).await;
        }
    }

    /// Playback path: advance one frame through the same navigation used
    /// by manual stepping. Returns false at the end of the timeline.
    pub async fn try_advance(&self) -> bool {
        let current = self.current_frame().await;
        if current < MAX_FRAMES {
            self.go_to_frame(current + 1).await;
            true
        } else {
            false
        }
    }

    // ── Read surface ─────────────────────────────────────────────────

    pub async fn current_frame(&self) -> FrameNumber {
        self.store.read().await.current_frame()
    }

    /// Snapshot clone of frame `n`, if materialized.
    pub async fn frame(&self, n: FrameNumber) -> Option<FrameSnapshot> {
        self.store.read().await.peek(n).cloned()
    }

    /// Number of materialized frames.
    pub async fn frame_count(&self) -> usize {
        self.store.read().await.frame_count()
    }

    /// Number of open peer links.
    pub async fn open_peer_count(&self) -> usize {
        self.links.read().await.len()
    }

    /// Advisory table: where each connected peer was last looking.
    pub async fn peer_frames(&self) -> HashMap<Uuid, Option<FrameNumber>> {
        self.links
            .read()
            .await
            .values()
            .map(|link| (link.peer_id, link.last_known_frame))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tacgrid_core::ElementKind;

    /// Presenter that records every call, for asserting render behavior.
    #[derive(Default)]
    struct RecordingPresenter {
        /// What capture() hands back (None = headless).
        captured: Option<FrameSnapshot>,
        renders: StdMutex<Vec<FrameNumber>>,
        segments: StdMutex<Vec<(StrokeTool, String)>>,
        shapes: StdMutex<Vec<ShapeKind>>,
    }

    impl RecordingPresenter {
        fn rendered_frames(&self) -> Vec<FrameNumber> {
            self.renders.lock().unwrap().clone()
        }
    }

    impl Presenter for RecordingPresenter {
        fn capture(&self) -> Option<FrameSnapshot> {
            self.captured.clone()
        }

        fn render(&self, frame_num: FrameNumber, _snapshot: &FrameSnapshot) {
            self.renders.lock().unwrap().push(frame_num);
        }

        fn draw_segment(&self, tool: StrokeTool, _start: Point, _end: Point, color: &str) {
            self.segments.lock().unwrap().push((tool, color.to_string()));
        }

        fn draw_shape(&self, kind: ShapeKind, _p1: Point, _p2: Point, _color: &str) {
            self.shapes.lock().unwrap().push(kind);
        }
    }

    fn session_with(
        presenter: Arc<RecordingPresenter>,
    ) -> Arc<ReplicationSession> {
        ReplicationSession::new(SessionConfig::default(), presenter)
    }

    #[tokio::test]
    async fn test_session_initial_state() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        assert_eq!(session.current_frame().await, 1);
        assert_eq!(session.open_peer_count().await, 0);
        assert!(session.take_event_rx().await.is_some());
        assert!(session.take_event_rx().await.is_none());
    }

    #[tokio::test]
    async fn test_remote_element_add_on_other_frame_does_not_render() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());
        let marker = Element::marker(Point::new(10.0, 20.0));
        let id = marker.element_id.clone();

        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::ElementAdd {
                    frame_num: 5,
                    element: marker,
                },
            )
            .await;

        // Frame 5 holds the marker; the view (frame 1) was left alone.
        let frame5 = session.frame(5).await.unwrap();
        assert_eq!(frame5.elements.len(), 1);
        assert_eq!(frame5.elements[0].element_id, id);
        assert_eq!(session.current_frame().await, 1);
        assert!(presenter.rendered_frames().is_empty());
    }

    #[tokio::test]
    async fn test_remote_element_add_on_current_frame_renders() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());

        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::ElementAdd {
                    frame_num: 1,
                    element: Element::marker(Point::default()),
                },
            )
            .await;

        assert_eq!(presenter.rendered_frames(), vec![1]);
    }

    #[tokio::test]
    async fn test_remote_frame_update_replaces_unconditionally() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());
        session.set_note("local work").await;

        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::FrameUpdate {
                    frame_num: 1,
                    snapshot: FrameSnapshot {
                        raster: Some(vec![7]),
                        elements: vec![],
                        note: "remote wins".into(),
                    },
                },
            )
            .await;

        let frame1 = session.frame(1).await.unwrap();
        assert_eq!(frame1.note, "remote wins");
        assert_eq!(presenter.rendered_frames(), vec![1]);
    }

    #[tokio::test]
    async fn test_remote_bootstrap_keeps_local_raster_and_rerenders() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());
        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::FrameUpdate {
                    frame_num: 2,
                    snapshot: FrameSnapshot {
                        raster: Some(vec![0xAA]),
                        elements: vec![],
                        note: "mine".into(),
                    },
                },
            )
            .await;

        let mut frames = HashMap::new();
        frames.insert(
            2,
            FrameSnapshot {
                raster: Some(vec![0xBB]),
                elements: vec![],
                note: "theirs".into(),
            },
        );
        frames.insert(9, FrameSnapshot::default());
        session
            .apply_remote(Uuid::new_v4(), ReplicationMessage::Bootstrap { frames })
            .await;

        assert_eq!(session.frame(2).await.unwrap().note, "mine");
        assert!(session.frame(9).await.is_some());
        // Bootstrap always re-renders the current frame.
        assert!(presenter.rendered_frames().contains(&1));
    }

    #[tokio::test]
    async fn test_remote_stroke_only_drawn_on_current_frame() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());
        let from = Uuid::new_v4();

        session
            .apply_remote(
                from,
                ReplicationMessage::StrokeSegment {
                    frame_num: 3,
                    tool: StrokeTool::Draw,
                    start: Point::default(),
                    end: Point::new(5.0, 5.0),
                    color: "#fff".into(),
                },
            )
            .await;
        assert!(presenter.segments.lock().unwrap().is_empty());

        session
            .apply_remote(
                from,
                ReplicationMessage::StrokeSegment {
                    frame_num: 1,
                    tool: StrokeTool::Erase,
                    start: Point::default(),
                    end: Point::new(5.0, 5.0),
                    color: "#fff".into(),
                },
            )
            .await;
        let segments = presenter.segments.lock().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0, StrokeTool::Erase);
    }

    #[tokio::test]
    async fn test_remote_shape_on_current_frame() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());

        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::VectorShape {
                    frame_num: 1,
                    kind: ShapeKind::Arrow,
                    p1: Point::default(),
                    p2: Point::new(50.0, 50.0),
                    color: "#f00".into(),
                },
            )
            .await;

        assert_eq!(*presenter.shapes.lock().unwrap(), vec![ShapeKind::Arrow]);
    }

    #[tokio::test]
    async fn test_remote_note_update() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());

        session
            .apply_remote(
                Uuid::new_v4(),
                ReplicationMessage::NoteUpdate {
                    frame_num: 8,
                    text: "phase two".into(),
                },
            )
            .await;

        assert_eq!(session.frame(8).await.unwrap().note, "phase two");
        assert!(presenter.rendered_frames().is_empty()); // not current
    }

    #[tokio::test]
    async fn test_remote_move_and_remove_are_noop_safe() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        let from = Uuid::new_v4();

        session
            .apply_remote(
                from,
                ReplicationMessage::ElementMove {
                    frame_num: 4,
                    element_id: "ghost".into(),
                    position: Point::new(1.0, 1.0),
                },
            )
            .await;
        session
            .apply_remote(
                from,
                ReplicationMessage::ElementRemove {
                    frame_num: 4,
                    element_id: "ghost".into(),
                },
            )
            .await;
        // Nothing placed; nothing to assert beyond "no panic".
        assert_eq!(session.current_frame().await, 1);
    }

    #[tokio::test]
    async fn test_go_to_frame_out_of_range_is_silent_noop() {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = session_with(presenter.clone());
        session.set_note("untouched").await;

        session.go_to_frame(0).await;
        session.go_to_frame(MAX_FRAMES + 1).await;

        assert_eq!(session.current_frame().await, 1);
        assert_eq!(session.frame(1).await.unwrap().note, "untouched");
        assert!(presenter.rendered_frames().is_empty());
    }

    #[tokio::test]
    async fn test_go_to_frame_captures_view_and_renders_target() {
        let presenter = Arc::new(RecordingPresenter {
            captured: Some(FrameSnapshot {
                raster: Some(vec![1, 2, 3]),
                elements: vec![],
                note: "drawn on screen".into(),
            }),
            ..Default::default()
        });
        let session = session_with(presenter.clone());

        session.go_to_frame(2).await;

        // The view's content was written back into the departed frame.
        let frame1 = session.frame(1).await.unwrap();
        assert_eq!(frame1.raster, Some(vec![1, 2, 3]));
        assert_eq!(frame1.note, "drawn on screen");
        assert_eq!(session.current_frame().await, 2);
        assert_eq!(presenter.rendered_frames(), vec![2]);
    }

    #[tokio::test]
    async fn test_headless_navigation_keeps_store_content() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        session.set_note("frame one note").await;

        session.go_to_frame(3).await;
        session.go_to_frame(1).await;

        // No view to capture, so navigation must not wipe stored frames.
        assert_eq!(session.frame(1).await.unwrap().note, "frame one note");
    }

    #[tokio::test]
    async fn test_local_element_lifecycle() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        let unit = Element::unit("tank.png", Point::new(0.0, 0.0), 48.0);
        let id = unit.element_id.clone();

        session.add_element(unit).await;
        session.move_element(&id, Point::new(40.0, 60.0)).await;

        let frame1 = session.frame(1).await.unwrap();
        assert_eq!(frame1.elements[0].position, Point::new(40.0, 60.0));
        assert!(matches!(frame1.elements[0].kind, ElementKind::Unit { .. }));

        session.remove_element(&id).await;
        assert!(session.frame(1).await.unwrap().elements.is_empty());
    }

    #[tokio::test]
    async fn test_clear_frame_empties_current() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        session.add_element(Element::marker(Point::default())).await;
        session.set_note("x").await;

        session.clear_frame().await;
        assert!(session.frame(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_next_previous_frame_bounds() {
        let session = session_with(Arc::new(RecordingPresenter::default()));

        session.previous_frame().await; // already at 1
        assert_eq!(session.current_frame().await, 1);

        session.next_frame().await;
        assert_eq!(session.current_frame().await, 2);

        session.go_to_frame(MAX_FRAMES).await;
        session.next_frame().await; // at the end
        assert_eq!(session.current_frame().await, MAX_FRAMES);
    }

    #[tokio::test]
    async fn test_try_advance_stops_at_last_frame() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        session.go_to_frame(MAX_FRAMES - 1).await;

        assert!(session.try_advance().await);
        assert_eq!(session.current_frame().await, MAX_FRAMES);
        assert!(!session.try_advance().await);
        assert_eq!(session.current_frame().await, MAX_FRAMES);
    }

    #[tokio::test]
    async fn test_frame_position_for_unknown_peer_still_emits_event() {
        let session = session_with(Arc::new(RecordingPresenter::default()));
        let mut events = session.take_event_rx().await.unwrap();
        let peer = Uuid::new_v4();

        session
            .apply_remote(
                peer,
                ReplicationMessage::FramePosition {
                    peer_id: peer,
                    frame_num: 17,
                },
            )
            .await;

        match events.try_recv() {
            Ok(SessionEvent::PeerFrameChanged { peer_id, frame_num }) => {
                assert_eq!(peer_id, peer);
                assert_eq!(frame_num, 17);
            }
            other => panic!("Expected PeerFrameChanged, got {other:?}"),
        }
    }
}
