//! Per-instance commit scheduler
//!
//! A single-slot state machine: at most one commit in flight and at most one
//! pending behind it. A new request replaces the pending one (its waiters
//! move over) so a burst of renders collapses into at most two external
//! operations. The scheduler itself is synchronous; the instance's commit
//! driver executes in-flight operations and reports back via `complete`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::{HostResult, RenderError, RenderResult};
use super::message::MessageRepresentation;
use super::node::Snapshot;
use super::translate::HandlerTable;

type Waiter = oneshot::Sender<RenderResult<()>>;

/// External operation a commit performs
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CommitKind {
    /// Replace the message with a new representation
    Edit(MessageRepresentation),
    /// Disable every control on the last committed representation
    DisableAll,
    /// Delete the message
    Delete,
}

impl CommitKind {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            CommitKind::Edit(_) => "edit",
            CommitKind::DisableAll => "disable",
            CommitKind::Delete => "delete",
        }
    }
}

/// Snapshot and handler table that go live when an edit lands
#[derive(Debug)]
pub(crate) struct Install {
    pub snapshot: Snapshot,
    pub handlers: HandlerTable,
}

/// A commit request plus everyone waiting on it
#[derive(Debug)]
pub(crate) struct Commit {
    kind: CommitKind,
    install: Option<Install>,
    waiters: Vec<Waiter>,
}

impl Commit {
    /// New commit with a single waiter
    pub(crate) fn new(kind: CommitKind, install: Option<Install>) -> (Self, PendingRender) {
        let (tx, rx) = oneshot::channel();
        let commit = Self {
            kind,
            install,
            waiters: vec![tx],
        };
        (commit, PendingRender::waiting(rx))
    }

    pub(crate) fn take_install(&mut self) -> Option<Install> {
        self.install.take()
    }

    /// Deliver an outcome to every waiter
    pub(crate) fn resolve(self, result: RenderResult<()>) {
        resolve_all(self.waiters, result);
    }
}

fn resolve_all(waiters: Vec<Waiter>, result: RenderResult<()>) {
    for waiter in waiters {
        // Receiver dropped: nobody is waiting on this render any more.
        let _ = waiter.send(result.clone());
    }
}

fn same_target(a: &CommitKind, b: &CommitKind) -> bool {
    match (a, b) {
        (CommitKind::Edit(a), CommitKind::Edit(b)) => a == b,
        (CommitKind::Delete, CommitKind::Delete) => true,
        _ => false,
    }
}

/// What `submit` did with a request
#[derive(Debug)]
pub(crate) enum Submission {
    /// Identical to the committed message, or a delete of a deleted one
    Elided(Commit),
    /// Became the in-flight commit; a driver must be started
    Started,
    /// Same target as the in-flight commit; waits on it
    Joined,
    /// Stored as the pending commit
    Queued,
}

/// Result of finishing the in-flight commit
#[derive(Debug)]
pub(crate) struct Completion {
    /// Snapshot to install, present only for a successful edit
    pub install: Option<Install>,
    /// A pending commit was promoted and must be executed next
    pub more: bool,
}

/// Single-slot commit state for one instance
#[derive(Debug)]
pub(crate) struct CommitScheduler {
    in_flight: Option<Commit>,
    pending: Option<Commit>,
    committed: Option<MessageRepresentation>,
}

impl CommitScheduler {
    /// Scheduler for a message that already shows `committed`
    pub(crate) fn new(committed: MessageRepresentation) -> Self {
        Self {
            in_flight: None,
            pending: None,
            committed: Some(committed),
        }
    }

    /// Representation the external message currently reflects
    pub(crate) fn committed(&self) -> Option<&MessageRepresentation> {
        self.committed.as_ref()
    }

    /// No commit in flight and none pending
    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_none()
    }

    /// Snapshot waiting behind the in-flight commit, if any
    pub(crate) fn pending_snapshot(&self) -> Option<&Snapshot> {
        self.pending
            .as_ref()
            .and_then(|commit| commit.install.as_ref())
            .map(|install| &install.snapshot)
    }

    /// Record a new request
    pub(crate) fn submit(&mut self, mut commit: Commit) -> Submission {
        if self.in_flight.is_none() {
            let unchanged = match &commit.kind {
                CommitKind::Edit(message) => self.committed.as_ref() == Some(message),
                CommitKind::Delete => self.committed.is_none(),
                CommitKind::DisableAll => false,
            };
            if unchanged {
                return Submission::Elided(commit);
            }
            self.in_flight = Some(commit);
            return Submission::Started;
        }

        if let Some(superseded) = self.pending.take() {
            commit.waiters.extend(superseded.waiters);
        }

        match self.in_flight.as_mut() {
            Some(current) if same_target(&current.kind, &commit.kind) => {
                current.waiters.append(&mut commit.waiters);
                current.install = commit.install;
                Submission::Joined
            }
            _ => {
                self.pending = Some(commit);
                Submission::Queued
            }
        }
    }

    /// Drop the pending commit, returning it so its waiters can be answered
    pub(crate) fn discard_pending(&mut self) -> Option<Commit> {
        self.pending.take()
    }

    /// Operation the driver should execute next
    pub(crate) fn in_flight_kind(&self) -> Option<CommitKind> {
        self.in_flight.as_ref().map(|commit| commit.kind.clone())
    }

    /// Finish the in-flight commit and promote the pending one
    pub(crate) fn complete(&mut self, result: HostResult<()>) -> Completion {
        let Some(mut commit) = self.in_flight.take() else {
            return Completion {
                install: None,
                more: false,
            };
        };

        let mut install = None;
        let outcome = match result {
            Ok(()) => {
                self.committed = match &commit.kind {
                    CommitKind::Edit(message) => Some(message.clone()),
                    CommitKind::DisableAll => {
                        self.committed.as_ref().map(|m| m.with_all_disabled())
                    }
                    CommitKind::Delete => None,
                };
                install = commit.take_install();
                Ok(())
            }
            Err(err) => Err(RenderError::HostOperationFailed(err)),
        };
        commit.resolve(outcome);

        self.in_flight = self.pending.take();
        Completion {
            install,
            more: self.in_flight.is_some(),
        }
    }
}

enum PendingState {
    Ready(Option<RenderResult<()>>),
    Waiting(oneshot::Receiver<RenderResult<()>>),
}

/// Future returned by render, deactivate and destroy
///
/// Resolves once the requested state, or a later one that superseded it,
/// has been committed. Dropping it does not cancel the commit.
#[must_use = "dropping a PendingRender ignores the commit outcome"]
pub struct PendingRender {
    state: PendingState,
}

impl PendingRender {
    pub(crate) fn ready(result: RenderResult<()>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    fn waiting(rx: oneshot::Receiver<RenderResult<()>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }
}

impl Future for PendingRender {
    type Output = RenderResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(RenderError::Abandoned))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::HostError;
    use futures::FutureExt;

    fn edit(content: &str) -> (Commit, PendingRender) {
        Commit::new(CommitKind::Edit(MessageRepresentation::text(content)), None)
    }

    #[test]
    fn test_identical_render_is_elided() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text("a"));
        let (commit, _pending) = edit("a");
        assert!(matches!(scheduler.submit(commit), Submission::Elided(_)));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_burst_coalesces_into_one_pending() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text(""));
        let (first, first_rx) = edit("1");
        let (second, second_rx) = edit("2");
        let (third, third_rx) = edit("3");

        assert!(matches!(scheduler.submit(first), Submission::Started));
        assert!(matches!(scheduler.submit(second), Submission::Queued));
        assert!(matches!(scheduler.submit(third), Submission::Queued));

        let done = scheduler.complete(Ok(()));
        assert!(done.more);
        assert_eq!(
            scheduler.in_flight_kind(),
            Some(CommitKind::Edit(MessageRepresentation::text("3")))
        );
        assert_eq!(first_rx.now_or_never(), Some(Ok(())));

        let done = scheduler.complete(Ok(()));
        assert!(!done.more);
        assert_eq!(scheduler.committed(), Some(&MessageRepresentation::text("3")));
        // The superseded request resolves with the commit that replaced it.
        assert_eq!(second_rx.now_or_never(), Some(Ok(())));
        assert_eq!(third_rx.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_request_matching_in_flight_drops_pending() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text(""));
        let (a, _) = edit("a");
        let (b, _) = edit("b");
        let (a_again, a_again_rx) = edit("a");

        scheduler.submit(a);
        scheduler.submit(b);
        assert!(matches!(scheduler.submit(a_again), Submission::Joined));

        let done = scheduler.complete(Ok(()));
        assert!(!done.more);
        assert_eq!(scheduler.committed(), Some(&MessageRepresentation::text("a")));
        assert_eq!(a_again_rx.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_failure_reaches_waiter_and_keeps_committed() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text("old"));
        let (commit, rx) = edit("new");
        scheduler.submit(commit);

        let failure = HostError::OperationFailed {
            operation: "edit",
            detail: "boom".to_string(),
        };
        scheduler.complete(Err(failure.clone()));

        assert_eq!(
            rx.now_or_never(),
            Some(Err(RenderError::HostOperationFailed(failure)))
        );
        assert_eq!(scheduler.committed(), Some(&MessageRepresentation::text("old")));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn test_disable_all_applies_override_on_success() {
        let mut committed = MessageRepresentation::text("x");
        committed.action_rows.push(crate::runtime::message::ActionRow {
            components: vec![crate::runtime::message::Component::Button {
                custom_id: "b".to_string(),
                label: None,
                style: Default::default(),
                disabled: false,
                emoji: None,
            }],
        });
        let mut scheduler = CommitScheduler::new(committed.clone());
        let (commit, _) = Commit::new(CommitKind::DisableAll, None);
        scheduler.submit(commit);
        scheduler.complete(Ok(()));

        assert_eq!(scheduler.committed(), Some(&committed.with_all_disabled()));
    }

    #[test]
    fn test_dropped_driver_reports_abandoned() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text(""));
        let (commit, rx) = edit("a");
        scheduler.submit(commit);
        drop(scheduler);
        assert_eq!(rx.now_or_never(), Some(Err(RenderError::Abandoned)));
    }

    #[test]
    fn test_repeated_delete_joins_then_elides() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text("x"));
        let (first, first_rx) = Commit::new(CommitKind::Delete, None);
        let (second, second_rx) = Commit::new(CommitKind::Delete, None);

        assert!(matches!(scheduler.submit(first), Submission::Started));
        assert!(matches!(scheduler.submit(second), Submission::Joined));
        let done = scheduler.complete(Ok(()));
        assert!(!done.more);
        assert_eq!(first_rx.now_or_never(), Some(Ok(())));
        assert_eq!(second_rx.now_or_never(), Some(Ok(())));
        assert_eq!(scheduler.committed(), None);

        let (third, _) = Commit::new(CommitKind::Delete, None);
        assert!(matches!(scheduler.submit(third), Submission::Elided(_)));
    }

    #[test]
    fn test_failed_delete_can_be_retried() {
        let mut scheduler = CommitScheduler::new(MessageRepresentation::text("x"));
        let (first, _) = Commit::new(CommitKind::Delete, None);
        scheduler.submit(first);
        scheduler.complete(Err(HostError::Timeout { operation: "delete" }));
        assert!(scheduler.committed().is_some());

        let (retry, _) = Commit::new(CommitKind::Delete, None);
        assert!(matches!(scheduler.submit(retry), Submission::Started));
    }
}
