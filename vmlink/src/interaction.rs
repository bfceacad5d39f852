//! User interaction surface.
//!
//! Both state machines occasionally need a yes/no answer ("start the VM?",
//! "give up locking down?") or want to show a sticky warning. They never talk
//! to a concrete UI - they go through [`InteractionHandler`], which an
//! interactive frontend implements with dialogs and a headless embedding
//! implements with [`AutomatedInteraction`].
//!
//! Questions are asked asynchronously: `ask` shows the question and returns;
//! once an answer exists the handler calls the provided [`QuestionNotifier`],
//! which wakes the state machines, and the machines read the answer back via
//! `status`. A question dismissed on state exit resets to `NotAsked`.

use std::collections::HashMap;
use std::sync::Arc;

/// Yes/no questions the state machines may ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Question {
    /// Start the VM to establish the connection?
    StartVm,
    /// Reset (close and later restart) the VM to apply changes?
    ResetVm,
    /// Close a VM that this controller did not start?
    CloseVm,
    /// Give up the connection attempt?
    CancelConnecting,
    /// Give up locking down (instead of retrying the forced power-off)?
    CancelLockingDown,
}

/// Sticky warnings shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// A connect request is already in progress.
    AlreadyConnecting,
    /// A disconnect request is already in progress.
    AlreadyDisconnecting,
    /// The VM could not be closed, not even forcefully.
    UnableToCloseVm,
    /// The VM is not registered with the backend.
    VmNotRegistered,
}

/// Lifecycle of an asked question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionStatus {
    NotAsked,
    Asked,
    Yes,
    No,
}

/// Wakes the state machines after a question was answered.
#[derive(Clone)]
pub struct QuestionNotifier {
    notify: Arc<dyn Fn(Question) + Send + Sync>,
}

impl QuestionNotifier {
    pub(crate) fn new(notify: impl Fn(Question) + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    /// Signal that `question` now has an answer readable via `status`.
    pub fn answered(&self, question: Question) {
        (self.notify)(question);
    }
}

impl std::fmt::Debug for QuestionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionNotifier").finish()
    }
}

/// Question/warning surface consumed by the connection controller.
///
/// The controller never branches on what kind of UI sits behind this trait.
pub trait InteractionHandler: Send {
    /// Whether `question` should be asked at all ("do not ask again").
    fn should_ask(&self, question: Question) -> bool;

    /// Present `question`; call the notifier once an answer exists.
    ///
    /// Must not block. Asking an already-asked question is a no-op.
    fn ask(&mut self, question: Question, notifier: QuestionNotifier);

    /// Withdraw `question` and reset its status to `NotAsked`.
    fn dismiss_question(&mut self, question: Question);

    /// Current status of `question`.
    fn status(&self, question: Question) -> QuestionStatus;

    /// Show a sticky warning.
    fn warn(&mut self, warning: Warning);

    /// Withdraw a sticky warning.
    fn dismiss_warning(&mut self, warning: Warning);
}

/// Headless interaction handler answering from static defaults.
///
/// Every question resolves immediately to its configured answer and nothing
/// is ever really "asked", which makes the controller fully usable in
/// non-interactive contexts (CI, command-line tooling). Warnings are logged.
#[derive(Debug)]
pub struct AutomatedInteraction {
    answers: HashMap<Question, bool>,
    statuses: HashMap<Question, QuestionStatus>,
}

impl AutomatedInteraction {
    /// Defaults chosen so that unattended runs make progress: start and close
    /// VMs without asking, and give up rather than retry forever.
    pub fn new() -> Self {
        let answers = HashMap::from([
            (Question::StartVm, true),
            (Question::ResetVm, true),
            (Question::CloseVm, true),
            (Question::CancelConnecting, true),
            (Question::CancelLockingDown, true),
        ]);
        Self {
            answers,
            statuses: HashMap::new(),
        }
    }

    /// Override the canned answer for one question.
    pub fn with_answer(mut self, question: Question, yes: bool) -> Self {
        self.answers.insert(question, yes);
        self
    }
}

impl Default for AutomatedInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionHandler for AutomatedInteraction {
    fn should_ask(&self, _question: Question) -> bool {
        false
    }

    fn ask(&mut self, question: Question, notifier: QuestionNotifier) {
        let yes = self.answers.get(&question).copied().unwrap_or(true);
        let status = if yes {
            QuestionStatus::Yes
        } else {
            QuestionStatus::No
        };
        tracing::debug!(?question, answer = yes, "answering question automatically");
        self.statuses.insert(question, status);
        notifier.answered(question);
    }

    fn dismiss_question(&mut self, question: Question) {
        self.statuses.remove(&question);
    }

    fn status(&self, question: Question) -> QuestionStatus {
        self.statuses
            .get(&question)
            .copied()
            .unwrap_or(QuestionStatus::NotAsked)
    }

    fn warn(&mut self, warning: Warning) {
        tracing::warn!(?warning, "interaction warning");
    }

    fn dismiss_warning(&mut self, _warning: Warning) {}
}
