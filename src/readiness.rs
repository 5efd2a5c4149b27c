//! Readiness state machine.
//!
//! Two independent axes gate chat: core components (tokenizer, embedder,
//! store handle, model client) and indexed documents. The combined status
//! only moves forward:
//!
//! ```text
//! not_started ──start──▶ initializing ──both axes──▶ ready
//!                             │
//!                             └──mark_failed──▶ failed
//! ```
//!
//! `ready` and `failed` are absorbing. Markers arriving after `failed` are
//! ignored, so a failure reason is never overwritten by a later success.

use serde::Serialize;
use std::sync::Mutex;

use crate::error::NotReady;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotStarted,
    Initializing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessState {
    pub status: Status,
    pub core_ready: bool,
    pub documents_ready: bool,
    pub error_message: Option<String>,
}

impl ReadinessState {
    fn initial() -> Self {
        Self {
            status: Status::NotStarted,
            core_ready: false,
            documents_ready: false,
            error_message: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == Status::Ready
    }

    /// Why chat cannot be served, or `None` when ready.
    pub fn not_ready_reason(&self) -> Option<NotReady> {
        match self.status {
            Status::Ready => None,
            Status::NotStarted => Some(NotReady::NotStarted),
            Status::Failed => Some(NotReady::Failed(
                self.error_message
                    .clone()
                    .unwrap_or_else(|| "Initialization failed".to_string()),
            )),
            Status::Initializing if !self.core_ready => Some(NotReady::CoreUnavailable),
            Status::Initializing => Some(NotReady::Initializing),
        }
    }
}

#[derive(Debug)]
pub struct Readiness {
    state: Mutex<ReadinessState>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReadinessState::initial()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ReadinessState)) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state);
    }

    /// Idempotent; only moves `not_started` to `initializing`.
    pub fn start(&self) {
        self.update(|s| {
            if s.status == Status::NotStarted {
                s.status = Status::Initializing;
                tracing::info!("initialization started");
            }
        });
    }

    pub fn mark_core_ready(&self) {
        self.update(|s| {
            if s.status == Status::Failed {
                return;
            }
            s.core_ready = true;
            recompute(s);
        });
    }

    pub fn mark_documents_ready(&self) {
        self.update(|s| {
            if s.status == Status::Failed {
                return;
            }
            s.documents_ready = true;
            recompute(s);
        });
    }

    /// Sticky. Has no effect once `ready` or `failed`.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.update(|s| {
            if matches!(s.status, Status::Failed | Status::Ready) {
                return;
            }
            tracing::warn!(reason = %reason, "initialization failed");
            s.status = Status::Failed;
            s.error_message = Some(reason);
        });
    }

    pub fn snapshot(&self) -> ReadinessState {
        match self.state.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn recompute(s: &mut ReadinessState) {
    if s.core_ready && s.documents_ready && s.status != Status::Ready {
        s.status = Status::Ready;
        tracing::info!("engine ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_started() {
        let r = Readiness::new();
        let s = r.snapshot();
        assert_eq!(s.status, Status::NotStarted);
        assert_eq!(s.not_ready_reason(), Some(NotReady::NotStarted));
    }

    #[test]
    fn start_is_idempotent() {
        let r = Readiness::new();
        r.start();
        r.start();
        assert_eq!(r.snapshot().status, Status::Initializing);
    }

    #[test]
    fn ready_needs_both_axes_in_any_order() {
        let r = Readiness::new();
        r.start();
        r.mark_documents_ready();
        assert_eq!(r.snapshot().status, Status::Initializing);
        r.mark_core_ready();
        assert!(r.snapshot().is_ready());

        let r = Readiness::new();
        r.start();
        r.mark_core_ready();
        assert_eq!(
            r.snapshot().not_ready_reason(),
            Some(NotReady::Initializing)
        );
        r.mark_documents_ready();
        assert!(r.snapshot().is_ready());
    }

    #[test]
    fn failed_is_sticky() {
        let r = Readiness::new();
        r.start();
        r.mark_core_ready();
        r.mark_failed("No documents found");
        r.mark_documents_ready();
        let s = r.snapshot();
        assert_eq!(s.status, Status::Failed);
        assert!(!s.documents_ready);
        assert_eq!(
            s.not_ready_reason(),
            Some(NotReady::Failed("No documents found".to_string()))
        );

        r.mark_failed("second reason");
        assert_eq!(
            r.snapshot().error_message.as_deref(),
            Some("No documents found")
        );
    }

    #[test]
    fn ready_ignores_late_failure() {
        let r = Readiness::new();
        r.start();
        r.mark_core_ready();
        r.mark_documents_ready();
        r.mark_failed("late");
        assert!(r.snapshot().is_ready());
    }

    #[test]
    fn every_marker_order_respects_invariant() {
        // 0 = core, 1 = documents, 2 = failed
        let orders: [[u8; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for order in orders {
            let r = Readiness::new();
            r.start();
            let mut failed_first = false;
            let mut core = false;
            let mut docs = false;
            for step in order {
                match step {
                    0 => {
                        r.mark_core_ready();
                        core = true;
                    }
                    1 => {
                        r.mark_documents_ready();
                        docs = true;
                    }
                    _ => {
                        r.mark_failed("boom");
                        if !(core && docs) {
                            failed_first = true;
                        }
                    }
                }
                let s = r.snapshot();
                assert_eq!(
                    s.is_ready(),
                    s.core_ready && s.documents_ready && !failed_first,
                    "order {:?}",
                    order
                );
            }
        }
    }
}
