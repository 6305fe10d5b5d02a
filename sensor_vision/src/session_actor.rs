// THEORY:
// The `session_actor` module serves a `CalibrationSession` from its own tokio task.
// The task is the only owner of the session; callers hold a cheap, cloneable
// `SessionHandle` and talk to it over a bounded channel, each request carrying a
// oneshot reply. Frames and commands are handled strictly in arrival order, so the
// frame-synchronous model of the session is preserved.
//
// Several users means several actors. No state is ever shared between two of them.

use crate::core_modules::intensity_frame::IntensityFrame;
use crate::error::{Result, SensorError};
use crate::session::{CalibrationSession, Command, FrameReport, Mode, SessionConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

const SESSION_QUEUE_DEPTH: usize = 8;

/// Message type for session actors
enum SessionMessage {
    Frame(IntensityFrame, oneshot::Sender<Result<FrameReport>>),
    Command(Command, oneshot::Sender<Result<Mode>>),
    Shutdown,
}

/// A handle to one running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
}

/// Validates `config` and spawns an actor task that owns a fresh session.
///
/// Must be called from within a tokio runtime.
pub fn spawn_session(config: SessionConfig) -> Result<(SessionHandle, JoinHandle<()>)> {
    let mut session = CalibrationSession::new(config)?;
    let (sender, mut receiver) = mpsc::channel::<SessionMessage>(SESSION_QUEUE_DEPTH);

    let task = tokio::spawn(async move {
        while let Some(msg) = receiver.recv().await {
            match msg {
                SessionMessage::Frame(frame, reply) => {
                    let _ = reply.send(session.process_frame(&frame));
                }
                SessionMessage::Command(command, reply) => {
                    let _ = reply.send(session.apply(command));
                }
                SessionMessage::Shutdown => break,
            }
        }
        debug!("Session actor stopped");
    });

    Ok((SessionHandle { sender }, task))
}

impl SessionHandle {
    pub async fn process_frame(&self, frame: IntensityFrame) -> Result<FrameReport> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SessionMessage::Frame(frame, reply))
            .await
            .map_err(|_| SensorError::SessionClosed)?;
        response.await.map_err(|_| SensorError::SessionClosed)?
    }

    pub async fn apply(&self, command: Command) -> Result<Mode> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(SessionMessage::Command(command, reply))
            .await
            .map_err(|_| SensorError::SessionClosed)?;
        response.await.map_err(|_| SensorError::SessionClosed)?
    }

    /// Asks the actor to stop after the messages already queued.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SessionMessage::Shutdown).await;
    }
}
