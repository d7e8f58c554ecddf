//! The session aggregate as an immutable value.
//!
//! Every user intent produces a new `Session` from the previous one. The
//! `generation` counter identifies which state a run belongs to so late
//! outcomes can be recognised and dropped.

use shared::domain::{DisplayHandle, ImageFile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    source: Option<ImageFile>,
    source_url: Option<DisplayHandle>,
    result_url: Option<DisplayHandle>,
    error: Option<String>,
    generation: u64,
    pending_run: Option<u64>,
}

/// How a finished run relates to the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// The run still belongs to the current state; apply its outcome.
    Current,
    /// The source changed under the run but nothing replaced it as the
    /// outstanding run; only the busy flag is released.
    Abandoned,
    /// A newer run or a clear owns the session; drop the outcome.
    Stale,
}

impl Session {
    pub fn source(&self) -> Option<&ImageFile> {
        self.source.as_ref()
    }

    pub fn source_url(&self) -> Option<&DisplayHandle> {
        self.source_url.as_ref()
    }

    pub fn result_url(&self) -> Option<&DisplayHandle> {
        self.result_url.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True while a remote call is outstanding.
    pub fn busy(&self) -> bool {
        self.pending_run.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Nothing loaded, nothing running, nothing to report.
    pub fn is_at_rest(&self) -> bool {
        self.source.is_none()
            && self.source_url.is_none()
            && self.result_url.is_none()
            && self.error.is_none()
            && self.pending_run.is_none()
    }

    pub(crate) fn has_run_in_flight_for_current_source(&self) -> bool {
        self.pending_run == Some(self.generation)
    }

    pub(crate) fn uploaded(&self, file: ImageFile) -> Self {
        let source_url = DisplayHandle::from_bytes(&file.media_type, &file.bytes);
        Self {
            source: Some(file),
            source_url: Some(source_url),
            result_url: None,
            error: None,
            generation: self.generation + 1,
            pending_run: self.pending_run,
        }
    }

    pub(crate) fn run_started(&self) -> Self {
        let generation = self.generation + 1;
        Self {
            source: self.source.clone(),
            source_url: self.source_url.clone(),
            result_url: None,
            error: None,
            generation,
            pending_run: Some(generation),
        }
    }

    pub(crate) fn run_succeeded(&self, result: DisplayHandle) -> Self {
        Self {
            result_url: Some(result),
            error: None,
            pending_run: None,
            ..self.clone()
        }
    }

    pub(crate) fn run_failed(&self, message: impl Into<String>) -> Self {
        Self {
            result_url: None,
            error: Some(message.into()),
            pending_run: None,
            ..self.clone()
        }
    }

    pub(crate) fn run_abandoned(&self) -> Self {
        Self {
            pending_run: None,
            ..self.clone()
        }
    }

    /// Back to rest. The generation keeps counting so runs started before the
    /// reset can never match a later state.
    pub(crate) fn cleared(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..Self::default()
        }
    }

    pub(crate) fn resolve(&self, run_generation: u64) -> Resolution {
        if self.pending_run != Some(run_generation) {
            Resolution::Stale
        } else if self.generation == run_generation {
            Resolution::Current
        } else {
            Resolution::Abandoned
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
