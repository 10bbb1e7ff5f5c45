//----------------------------------------------------------------------------------------------
// Module errorhandler
// Error-recovery policy engine (C7): maps (command, error) to (pre_actions, action) and drives
// retries via a LIFO handler stack. Grounded in pyxcp/master/errorhandler.py (Handler,
// HandlerStack, Executor, Repeater) and pyxcp/errormatrix.py's ERROR_MATRIX / ERROR_TABLE; see
// spec.md section 4.7.

pub mod table;

use crate::command::XcpCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreAction {
    None,
    WaitT7,
    Synch,
    SetMta,
    SetDaqPtr,
    UnlockSlave,
    ReinitDaq,
    Download,
    Upload,
    Program,
    DisplayError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    None,
    Skip,
    DisplayError,
    RetrySyntax,
    RetryParam,
    Repeat,
    Repeat2Times,
    RepeatInfTimes,
    RestartSession,
    TerminateSession,
    UseAlternative,
    UseA2l,
    NewFlashWare,
}

/// Severity of an ERR response, carried alongside the table entry so a DISPLAY_ERROR surfacing
/// includes it rather than just the bare message (supplemented feature, grounded in
/// errormatrix.py's `Severity` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Information,
    Warning,
    ResolvableError,
    FatalError,
}

/// One normalized table entry. The source mixes bare `PreAction` values and one-element tuples
/// interchangeably (e.g. `(PreAction.WAIT_T7), Action.REPEAT_INF_TIMES` -- not actually a tuple
/// due to the missing trailing comma); spec.md section 9 treats this as a source bug and asks
/// for normalization to explicit `(Vec<PreAction>, Action)` pairs, which this struct is.
#[derive(Debug, Clone)]
pub struct HandlerEntry {
    pub pre_actions: Vec<PreAction>,
    pub action: Action,
}

impl HandlerEntry {
    pub fn new(pre_actions: impl Into<Vec<PreAction>>, action: Action) -> Self {
        HandlerEntry { pre_actions: pre_actions.into(), action }
    }
}

/// How many times a pending handler may still re-execute its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Finite(u32),
    Infinite,
}

impl RetryBudget {
    /// Applies the session-level `max_retries` override (spec.md section 4.7): -1 honors
    /// `RepeatInfTimes` literally, 0 forces a single attempt regardless of the table, and a
    /// positive N caps an otherwise-infinite repeat at N.
    pub fn from_action(action: Action, max_retries: i32) -> RetryBudget {
        let table_budget = match action {
            Action::Repeat => RetryBudget::Finite(1),
            Action::Repeat2Times => RetryBudget::Finite(2),
            Action::RepeatInfTimes => RetryBudget::Infinite,
            Action::RetrySyntax | Action::RetryParam => RetryBudget::Finite(1),
            _ => RetryBudget::Finite(0),
        };
        if max_retries == 0 {
            return RetryBudget::Finite(0);
        }
        match table_budget {
            RetryBudget::Infinite if max_retries > 0 => RetryBudget::Finite(max_retries as u32),
            other => other,
        }
    }
}

/// One entry on the LIFO handler stack: the command that failed, its remaining retry budget,
/// and the pre-actions still to execute before the retry.
#[derive(Debug, Clone)]
pub struct HandlerFrame {
    pub command: XcpCommand,
    pub pending_pre_actions: Vec<PreAction>,
    pub action: Action,
    pub retries_left: RetryBudget,
}

/// Outcome the executor hands back to the session after consulting the table.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Run these pre-actions, then retry the original command.
    Retry { pre_actions: Vec<PreAction> },
    /// Skip silently; the original request is considered void but not an error.
    Skip,
    /// Surface to the caller with severity and a structured description. Terminal.
    Surface { severity: Severity, description: String },
    /// Tear down and rebuild the session from CONNECT.
    RestartSession,
    /// Abort the whole session, no further commands may be issued.
    TerminateSession,
}

/// The LIFO stack of in-flight recovery handlers plus the table and retry-budget policy.
pub struct ErrorHandler {
    stack: Vec<HandlerFrame>,
    max_retries: i32,
}

impl ErrorHandler {
    pub fn new(max_retries: i32) -> Self {
        ErrorHandler { stack: Vec::new(), max_retries }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Consults the table for `(command, error_code)` and either pushes a new handler frame (and
    /// returns `Retry`) or returns a terminal disposition. `error_code` 0xF0 is the synthesized
    /// ERR_TIMEOUT used uniformly for both network timeouts and real slave ERR responses.
    pub fn handle(&mut self, command: XcpCommand, error_code: u8) -> Disposition {
        let entry = table::lookup(command, error_code);
        let severity = table::severity(error_code);

        match entry.action {
            Action::Skip => Disposition::Skip,
            Action::None => {
                Disposition::Surface { severity, description: format!("{command:?}: no recovery defined for error 0x{error_code:02X}") }
            }
            Action::DisplayError => Disposition::Surface {
                severity,
                description: format!(
                    "{command:?}: error 0x{error_code:02X}, handler stack depth={}",
                    self.stack.len()
                ),
            },
            Action::RestartSession => Disposition::RestartSession,
            Action::TerminateSession => Disposition::TerminateSession,
            Action::UseAlternative | Action::UseA2l | Action::NewFlashWare => Disposition::Surface {
                severity,
                description: format!("{command:?}: error 0x{error_code:02X} requires {:?}, not automatable here", entry.action),
            },
            Action::Repeat | Action::Repeat2Times | Action::RepeatInfTimes | Action::RetrySyntax | Action::RetryParam => {
                let budget = RetryBudget::from_action(entry.action, self.max_retries);
                if budget == RetryBudget::Finite(0) {
                    return Disposition::Surface {
                        severity,
                        description: format!("{command:?}: retry budget exhausted (max_retries=0) for error 0x{error_code:02X}"),
                    };
                }
                self.stack.push(HandlerFrame {
                    command,
                    pending_pre_actions: entry.pre_actions.clone(),
                    action: entry.action,
                    retries_left: budget,
                });
                Disposition::Retry { pre_actions: entry.pre_actions }
            }
        }
    }

    /// Called after a retry attempt completes; decrements the top frame's budget and pops it
    /// once exhausted. Returns `true` if the command may be retried again.
    pub fn consume_retry(&mut self) -> bool {
        let Some(frame) = self.stack.last_mut() else { return false };
        match &mut frame.retries_left {
            RetryBudget::Infinite => true,
            RetryBudget::Finite(n) if *n > 0 => {
                *n -= 1;
                if *n == 0 {
                    self.stack.pop();
                    false
                } else {
                    true
                }
            }
            RetryBudget::Finite(_) => {
                self.stack.pop();
                false
            }
        }
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Pending pre-actions of the top-of-stack frame, for a caller re-running them ahead of a
    /// repeated retry attempt. Empty once the stack is empty.
    pub fn top_pre_actions(&self) -> Vec<PreAction> {
        self.stack.last().map(|f| f.pending_pre_actions.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retries_zero_allows_one_attempt_only() {
        let mut handler = ErrorHandler::new(0);
        let disposition = handler.handle(XcpCommand::Connect, crate::command::error_code::TIMEOUT);
        assert!(matches!(disposition, Disposition::Surface { .. }));
        assert_eq!(handler.depth(), 0);
    }

    #[test]
    fn max_retries_negative_one_honors_infinite_literally() {
        let mut handler = ErrorHandler::new(-1);
        let disposition = handler.handle(XcpCommand::Connect, crate::command::error_code::TIMEOUT);
        assert!(matches!(disposition, Disposition::Retry { .. }));
        assert_eq!(handler.stack[0].retries_left, RetryBudget::Infinite);
    }

    #[test]
    fn production_default_caps_infinite_repeat_at_three() {
        let mut handler = ErrorHandler::new(3);
        handler.handle(XcpCommand::Connect, crate::command::error_code::TIMEOUT);
        assert_eq!(handler.stack[0].retries_left, RetryBudget::Finite(3));
    }

    #[test]
    fn skip_action_never_touches_the_stack() {
        let mut handler = ErrorHandler::new(3);
        let disposition = handler.handle(XcpCommand::Synch, crate::command::error_code::CMD_SYNCH);
        assert!(matches!(disposition, Disposition::Skip));
        assert_eq!(handler.depth(), 0);
    }
}
