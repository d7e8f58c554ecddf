use std::sync::Arc;

use shared::domain::{DisplayHandle, ImageFile, RESULT_MEDIA_TYPE};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    encoder::{Base64Encoder, Encoder},
    error::RunError,
    session::{Resolution, Session},
    RemoteEditor, REMOVE_BACKGROUND_INSTRUCTION, RUN_FAILURE_MESSAGE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSource,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed,
    /// The session moved on before the remote call returned; the outcome was
    /// discarded.
    Superseded,
    Skipped(SkipReason),
}

/// Proof that a run was started; carries the source it was started against.
#[derive(Debug)]
pub struct RunTicket {
    generation: u64,
    source: ImageFile,
}

impl RunTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Owns one session and mediates every transition on it.
///
/// `upload` and `clear` are synchronous. `run` is the only operation that
/// suspends; its outcome is applied only if the session still belongs to it.
pub struct SessionController {
    encoder: Arc<dyn Encoder>,
    editor: Arc<dyn RemoteEditor>,
    state: watch::Sender<Session>,
}

impl SessionController {
    pub fn new(encoder: Arc<dyn Encoder>, editor: Arc<dyn RemoteEditor>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            encoder,
            editor,
            state,
        }
    }

    pub fn with_editor(editor: Arc<dyn RemoteEditor>) -> Self {
        Self::new(Arc::new(Base64Encoder), editor)
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receives every new session value; the presentation side re-renders on change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn upload(&self, file: ImageFile) {
        debug!(
            media_type = %file.media_type,
            size_bytes = file.len(),
            "source image uploaded"
        );
        self.state.send_modify(|session| *session = session.uploaded(file));
    }

    /// Hard reset. An outstanding run is not aborted; its outcome is dropped
    /// when it arrives.
    pub fn clear(&self) {
        self.state.send_modify(|session| *session = session.cleared());
    }

    pub async fn run(&self) -> RunOutcome {
        match self.start_run() {
            Ok(ticket) => self.complete_run(ticket).await,
            Err(reason) => {
                debug!(?reason, "run skipped");
                RunOutcome::Skipped(reason)
            }
        }
    }

    /// Marks the session busy and hands back the ticket for the remote call.
    pub fn start_run(&self) -> Result<RunTicket, SkipReason> {
        let mut started = Err(SkipReason::NoSource);
        self.state.send_if_modified(|session| {
            let Some(source) = session.source().cloned() else {
                return false;
            };
            if session.has_run_in_flight_for_current_source() {
                started = Err(SkipReason::AlreadyRunning);
                return false;
            }

            let next = session.run_started();
            started = Ok(RunTicket {
                generation: next.generation(),
                source,
            });
            *session = next;
            true
        });
        started
    }

    /// Encodes the ticket's source, calls the editor and applies the outcome.
    pub async fn complete_run(&self, ticket: RunTicket) -> RunOutcome {
        let generation = ticket.generation;
        match self.remove_background(&ticket.source).await {
            Ok(payload) => {
                let handle = DisplayHandle::from_base64(RESULT_MEDIA_TYPE, &payload);
                let outcome = self.apply(generation, |session| session.run_succeeded(handle));
                if outcome == RunOutcome::Superseded {
                    warn!(generation, "discarding result of superseded run");
                } else {
                    info!(generation, "background removed");
                }
                outcome
            }
            Err(err) => {
                error!(generation, error = %err, "background removal failed");
                let outcome = self.apply(generation, |session| {
                    session.run_failed(RUN_FAILURE_MESSAGE)
                });
                match outcome {
                    RunOutcome::Completed => RunOutcome::Failed,
                    other => other,
                }
            }
        }
    }

    async fn remove_background(&self, source: &ImageFile) -> Result<String, RunError> {
        let encoded = self.encoder.encode(source).await?;
        let payload = self
            .editor
            .edit(&encoded, REMOVE_BACKGROUND_INSTRUCTION)
            .await?;
        Ok(payload)
    }

    fn apply(&self, generation: u64, finish: impl FnOnce(&Session) -> Session) -> RunOutcome {
        let mut outcome = RunOutcome::Superseded;
        self.state.send_if_modified(|session| match session.resolve(generation) {
            Resolution::Current => {
                *session = finish(session);
                outcome = RunOutcome::Completed;
                true
            }
            Resolution::Abandoned => {
                *session = session.run_abandoned();
                true
            }
            Resolution::Stale => false,
        });
        outcome
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
