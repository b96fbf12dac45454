//! Transition table for [`ControllableTask`](super::ControllableTask).
//!
//! [`transition`] is pure: it maps `(state, action)` to the next state plus the
//! side effect the runtime has to perform. Control calls never happen here.

use std::fmt;

use super::{PauseTrigger, TaskCapabilities, TaskResult, TaskState};
use crate::{Error, Result};

/// Internal state of a controllable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Idle,
    Running,
    Pausing(PauseTrigger),
    Paused(PauseTrigger),
    /// Carries the trigger to fall back to if the resume control fails.
    Resuming(PauseTrigger),
    Cancelling,
    Cancelled,
    Failed,
    Success,
    PreparingToRetry,
    AwaitingRetry,
}

impl FsmState {
    /// Coarse state exposed through the [`Task`](super::Task) contract.
    pub fn public(&self) -> TaskState {
        match self {
            Self::Idle => TaskState::Idle,
            Self::Running => TaskState::Running,
            Self::Pausing(_) => TaskState::Pausing,
            Self::Paused(_) => TaskState::Paused,
            Self::Resuming(_) => TaskState::Resuming,
            Self::Cancelling => TaskState::Cancelling,
            Self::Cancelled => TaskState::Cancelled,
            Self::Failed => TaskState::Failed,
            Self::Success => TaskState::Success,
            Self::PreparingToRetry | Self::AwaitingRetry => TaskState::AwaitingRetry,
        }
    }

    pub fn pause_trigger(&self) -> Option<PauseTrigger> {
        match self {
            Self::Pausing(trigger) | Self::Paused(trigger) => Some(*trigger),
            _ => None,
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Success)
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreparingToRetry => f.write_str("preparing_to_retry"),
            Self::Pausing(PauseTrigger::Requeue) => f.write_str("pausing (requeue)"),
            Self::Paused(PauseTrigger::Requeue) => f.write_str("paused (requeue)"),
            other => f.write_str(other.public().as_str()),
        }
    }
}

/// Inputs to the state machine.
///
/// External dispatches come from callers. The `*Settled`, `Complete` and
/// `CleanedUp` actions report that a control call resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Start,
    Pause(PauseTrigger),
    Resume,
    Cancel,
    Retry,
    PauseSettled { ok: bool },
    ResumeSettled { ok: bool },
    CancelSettled,
    Complete(TaskResult),
    CleanedUp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Pause(PauseTrigger::User) => f.write_str("pause"),
            Self::Pause(PauseTrigger::Requeue) => f.write_str("requeue"),
            Self::Resume => f.write_str("resume"),
            Self::Cancel => f.write_str("cancel"),
            Self::Retry => f.write_str("retry"),
            Self::PauseSettled { .. } => f.write_str("pause_settled"),
            Self::ResumeSettled { .. } => f.write_str("resume_settled"),
            Self::CancelSettled => f.write_str("cancel_settled"),
            Self::Complete(_) => f.write_str("complete"),
            Self::CleanedUp => f.write_str("cleaned_up"),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Spawn the work body.
    RunStart,
    CallPause,
    CallResume,
    /// Fire the cancellation token and call the cancel control.
    CallCancel,
    CallCleanup,
    /// Report the attempt's terminal result.
    Publish(TaskResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: FsmState,
    pub effect: Effect,
    /// Set when the action was dropped because the controls lack a capability.
    pub unsupported: Option<&'static str>,
}

impl Transition {
    fn to(next: FsmState, effect: Effect) -> Self {
        Self {
            next,
            effect,
            unsupported: None,
        }
    }

    fn stay(state: FsmState) -> Self {
        Self::to(state, Effect::None)
    }

    fn unsupported(state: FsmState, operation: &'static str) -> Self {
        Self {
            next: state,
            effect: Effect::None,
            unsupported: Some(operation),
        }
    }

    fn finish(result: TaskResult) -> Self {
        let next = match result.state() {
            TaskState::Success => FsmState::Success,
            TaskState::Cancelled => FsmState::Cancelled,
            _ => FsmState::Failed,
        };
        Self::to(next, Effect::Publish(result))
    }
}

/// Compute the transition for `action` in `state`.
///
/// Control dispatches the task has no capability for are dropped with
/// [`Transition::unsupported`] set. Combinations that make no sense at all are
/// programmer errors and return [`Error::UnhandledAction`].
pub fn transition(
    state: FsmState,
    action: &Action,
    caps: TaskCapabilities,
) -> Result<Transition> {
    use FsmState as S;

    let transition = match (state, action) {
        // start
        (S::Idle | S::AwaitingRetry, Action::Start) => Transition::to(S::Running, Effect::RunStart),
        (S::Paused(trigger), Action::Start) if caps.resume => {
            Transition::to(S::Resuming(trigger), Effect::CallResume)
        }
        (S::Paused(_), Action::Start) => Transition::unsupported(state, "resume"),

        // pause / requeue
        (S::Running, Action::Pause(trigger)) if caps.pause => {
            Transition::to(S::Pausing(*trigger), Effect::CallPause)
        }
        (S::Running, Action::Pause(_)) => Transition::unsupported(state, "pause"),
        // The latest pause reason wins: a user pause pins a requeued task, a
        // requeue hands a user-paused task back to the scheduler.
        (S::Pausing(_), Action::Pause(trigger)) => Transition::stay(S::Pausing(*trigger)),
        (S::Paused(_), Action::Pause(trigger)) => Transition::stay(S::Paused(*trigger)),
        (S::Pausing(trigger), Action::PauseSettled { ok: true }) => {
            Transition::stay(S::Paused(trigger))
        }
        (S::Pausing(_), Action::PauseSettled { ok: false }) => Transition::stay(S::Running),

        // resume
        (S::Paused(trigger), Action::Resume) if caps.resume => {
            Transition::to(S::Resuming(trigger), Effect::CallResume)
        }
        (S::Paused(_), Action::Resume) => Transition::unsupported(state, "resume"),
        (S::Running | S::Resuming(_), Action::Resume) => Transition::stay(state),
        (S::Resuming(_), Action::ResumeSettled { ok: true }) => Transition::stay(S::Running),
        (S::Resuming(trigger), Action::ResumeSettled { ok: false }) => {
            Transition::stay(S::Paused(trigger))
        }

        // retry
        (S::Failed | S::Cancelled, Action::Retry) => {
            Transition::to(S::PreparingToRetry, Effect::CallCleanup)
        }
        (S::PreparingToRetry, Action::CleanedUp) => Transition::stay(S::AwaitingRetry),

        // cancel, shared by every state
        (S::Idle | S::AwaitingRetry | S::PreparingToRetry, Action::Cancel) => {
            Transition::finish(TaskResult::Cancelled)
        }
        (S::Running | S::Pausing(_) | S::Paused(_) | S::Resuming(_), Action::Cancel)
            if caps.cancel =>
        {
            Transition::to(S::Cancelling, Effect::CallCancel)
        }
        (S::Running | S::Pausing(_) | S::Paused(_) | S::Resuming(_), Action::Cancel) => {
            Transition::unsupported(state, "cancel")
        }
        (S::Cancelling, Action::Cancel) => Transition::stay(state),
        (S::Cancelling, Action::CancelSettled | Action::Complete(_)) => {
            Transition::finish(TaskResult::Cancelled)
        }

        // completion of the work body, shared by every in-flight state
        (S::Running | S::Pausing(_) | S::Paused(_) | S::Resuming(_), Action::Complete(result)) => {
            Transition::finish(result.clone())
        }

        // late reports from control calls that lost a race
        (_, Action::Cancel | Action::Complete(_) | Action::CleanedUp) if state.is_terminal() => {
            Transition::stay(state)
        }
        (
            _,
            Action::PauseSettled { .. }
            | Action::ResumeSettled { .. }
            | Action::CancelSettled
            | Action::CleanedUp,
        ) => Transition::stay(state),

        _ => return Err(Error::unhandled(state, action)),
    };

    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL: TaskCapabilities = TaskCapabilities {
        pause: true,
        resume: true,
        cancel: true,
    };
    const NONE: TaskCapabilities = TaskCapabilities {
        pause: false,
        resume: false,
        cancel: false,
    };

    fn next(state: FsmState, action: Action, caps: TaskCapabilities) -> (FsmState, Effect) {
        let t = transition(state, &action, caps).unwrap();
        (t.next, t.effect)
    }

    #[rstest]
    #[case(FsmState::Idle, Action::Start, FsmState::Running, Effect::RunStart)]
    #[case(FsmState::AwaitingRetry, Action::Start, FsmState::Running, Effect::RunStart)]
    #[case(
        FsmState::Running,
        Action::Pause(PauseTrigger::User),
        FsmState::Pausing(PauseTrigger::User),
        Effect::CallPause
    )]
    #[case(
        FsmState::Pausing(PauseTrigger::Requeue),
        Action::PauseSettled { ok: true },
        FsmState::Paused(PauseTrigger::Requeue),
        Effect::None
    )]
    #[case(
        FsmState::Paused(PauseTrigger::User),
        Action::Resume,
        FsmState::Resuming(PauseTrigger::User),
        Effect::CallResume
    )]
    #[case(
        FsmState::Paused(PauseTrigger::Requeue),
        Action::Start,
        FsmState::Resuming(PauseTrigger::Requeue),
        Effect::CallResume
    )]
    #[case(
        FsmState::Resuming(PauseTrigger::User),
        Action::ResumeSettled { ok: true },
        FsmState::Running,
        Effect::None
    )]
    #[case(
        FsmState::Resuming(PauseTrigger::Requeue),
        Action::ResumeSettled { ok: false },
        FsmState::Paused(PauseTrigger::Requeue),
        Effect::None
    )]
    #[case(
        FsmState::Resuming(PauseTrigger::User),
        Action::ResumeSettled { ok: false },
        FsmState::Paused(PauseTrigger::User),
        Effect::None
    )]
    #[case(
        FsmState::Paused(PauseTrigger::Requeue),
        Action::Pause(PauseTrigger::User),
        FsmState::Paused(PauseTrigger::User),
        Effect::None
    )]
    #[case(
        FsmState::Pausing(PauseTrigger::Requeue),
        Action::Pause(PauseTrigger::User),
        FsmState::Pausing(PauseTrigger::User),
        Effect::None
    )]
    #[case(
        FsmState::Paused(PauseTrigger::User),
        Action::Pause(PauseTrigger::Requeue),
        FsmState::Paused(PauseTrigger::Requeue),
        Effect::None
    )]
    #[case(FsmState::Running, Action::Cancel, FsmState::Cancelling, Effect::CallCancel)]
    #[case(
        FsmState::Cancelling,
        Action::CancelSettled,
        FsmState::Cancelled,
        Effect::Publish(TaskResult::Cancelled)
    )]
    #[case(
        FsmState::Running,
        Action::Complete(TaskResult::success(None)),
        FsmState::Success,
        Effect::Publish(TaskResult::success(None))
    )]
    #[case(
        FsmState::Running,
        Action::Complete(TaskResult::failed("boom")),
        FsmState::Failed,
        Effect::Publish(TaskResult::failed("boom"))
    )]
    #[case(FsmState::Failed, Action::Retry, FsmState::PreparingToRetry, Effect::CallCleanup)]
    #[case(FsmState::PreparingToRetry, Action::CleanedUp, FsmState::AwaitingRetry, Effect::None)]
    #[case(
        FsmState::Idle,
        Action::Cancel,
        FsmState::Cancelled,
        Effect::Publish(TaskResult::Cancelled)
    )]
    fn test_transitions(
        #[case] state: FsmState,
        #[case] action: Action,
        #[case] expected_state: FsmState,
        #[case] expected_effect: Effect,
    ) {
        assert_eq!(next(state, action, ALL), (expected_state, expected_effect));
    }

    #[test]
    fn test_completion_while_cancelling_reports_cancelled() {
        let (state, effect) = next(
            FsmState::Cancelling,
            Action::Complete(TaskResult::success(None)),
            ALL,
        );
        assert_eq!(state, FsmState::Cancelled);
        assert_eq!(effect, Effect::Publish(TaskResult::Cancelled));
    }

    #[test]
    fn test_missing_capabilities_are_ignored() {
        for action in [Action::Pause(PauseTrigger::User), Action::Cancel] {
            let t = transition(FsmState::Running, &action, NONE).unwrap();
            assert_eq!(t.next, FsmState::Running);
            assert_eq!(t.effect, Effect::None);
            assert!(t.unsupported.is_some());
        }
    }

    #[test]
    fn test_terminal_states_swallow_late_reports() {
        for state in [FsmState::Success, FsmState::Failed, FsmState::Cancelled] {
            for action in [
                Action::Complete(TaskResult::failed("late")),
                Action::Cancel,
                Action::CancelSettled,
            ] {
                let t = transition(state, &action, ALL).unwrap();
                assert_eq!(t.next, state);
                assert_eq!(t.effect, Effect::None);
            }
        }
    }

    #[test]
    fn test_nonsense_dispatches_are_errors() {
        assert!(matches!(
            transition(FsmState::Running, &Action::Start, ALL),
            Err(Error::UnhandledAction { .. })
        ));
        assert!(matches!(
            transition(FsmState::Idle, &Action::Resume, ALL),
            Err(Error::UnhandledAction { .. })
        ));
        assert!(matches!(
            transition(FsmState::Success, &Action::Retry, ALL),
            Err(Error::UnhandledAction { .. })
        ));
    }

    #[test]
    fn test_public_mapping() {
        assert_eq!(FsmState::PreparingToRetry.public(), TaskState::AwaitingRetry);
        assert_eq!(
            FsmState::Paused(PauseTrigger::Requeue).pause_trigger(),
            Some(PauseTrigger::Requeue)
        );
        assert_eq!(FsmState::Running.pause_trigger(), None);
    }
}
