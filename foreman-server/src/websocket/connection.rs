use foreman_model::ServerFrame;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Outbound buffer depth per client.
pub const SEND_BUFFER: usize = 64;

/// Why a frame could not be handed to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The session's receive loop is gone; drop the session.
    Closed,
}

/// One connected client session.
///
/// The session is a handle around a bounded outbound queue; the socket
/// pump on the other end drains it in order, which is what gives each
/// session its per-client ordering guarantee.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Unique session ID
    pub id: Uuid,
    sender: mpsc::Sender<ServerFrame>,
}

impl ClientSession {
    pub fn new() -> (Self, mpsc::Receiver<ServerFrame>) {
        let (sender, receiver) = mpsc::channel(SEND_BUFFER);
        (
            Self {
                id: Uuid::new_v4(),
                sender,
            },
            receiver,
        )
    }

    /// Queue a frame for this session.
    ///
    /// Back-pressure policy: a full buffer drops non-init frames for
    /// this client only, with a warning; `init` frames wait, because a
    /// session that never got its snapshot is useless.
    pub async fn send(&self, frame: ServerFrame) -> Result<(), SendError> {
        if frame.is_init() {
            return self
                .sender
                .send(frame)
                .await
                .map_err(|_| SendError::Closed);
        }

        match self.sender.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                warn!(
                    session = %self.id,
                    dropped = frame_label(&frame),
                    "send buffer full, dropping frame"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SendError::Closed)
            }
        }
    }
}

fn frame_label(frame: &ServerFrame) -> &'static str {
    match frame {
        ServerFrame::Init { .. } => "init",
        ServerFrame::Update { .. } => "update",
        ServerFrame::RepoChange { .. } => "repo_change",
        ServerFrame::Error { .. } => "error",
        ServerFrame::HotReload { .. } => "hot_reload",
    }
}
