//----------------------------------------------------------------------------------------------
// Module errorhandler::table
// The (Command, XcpError) -> (PreAction*, Action) table and the per-error (message, Severity)
// table. Grounded in pyxcp/errormatrix.py's ERROR_MATRIX / ERROR_TABLE, normalized: every entry
// in the source that used a bare `PreAction` value where Python's missing-trailing-comma made it
// *not* a tuple (e.g. `(PreAction.WAIT_T7), Action.REPEAT_INF_TIMES`) is represented here as an
// explicit single-element `vec![PreAction::WaitT7]`, per the Open Question resolution in
// spec.md section 9 / DESIGN.md.

use super::{Action, HandlerEntry, PreAction, Severity};
use crate::command::{error_code, XcpCommand};

/// (message, severity) for every ERR_* code the slave may report, mirroring errormatrix.py's
/// ERROR_TABLE. The message isn't surfaced by this crate's API (callers format their own), but
/// severity drives `Disposition::Surface`.
pub fn severity(code: u8) -> Severity {
    use error_code::*;
    match code {
        CMD_SYNCH => Severity::Information,
        CMD_BUSY | DAQ_ACTIVE | PRM_ACTIVE => Severity::ResolvableError,
        CMD_UNKNOWN | CMD_SYNTAX | OUT_OF_RANGE | WRITE_PROTECTED | ACCESS_DENIED | ACCESS_LOCKED | PAGE_NOT_VALID
        | PAGE_MODE_NOT_VALID | SEGMENT_NOT_VALID | SEQUENCE | DAQ_CONFIG | MEMORY_OVERFLOW | GENERIC
        | RESOURCE_TEMPORARY_NOT_ACCESSIBLE => Severity::ResolvableError,
        VERIFY => Severity::FatalError,
        TIMEOUT => Severity::ResolvableError,
        _ => Severity::Warning,
    }
}

/// Looks up the normalized handler entry for `(command, error_code)`. Commands/errors with no
/// specific table row fall back to a conservative default derived from the common shape repeated
/// across almost every row in errormatrix.py: timeout retries twice, CMD_BUSY/PGM_ACTIVE wait and
/// retry indefinitely (bounded by the session's max_retries override), and anything else is
/// surfaced rather than guessed at.
pub fn lookup(command: XcpCommand, code: u8) -> HandlerEntry {
    use XcpCommand::*;

    if let Some(entry) = specific(command, code) {
        return entry;
    }

    match code {
        error_code::TIMEOUT => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        error_code::CMD_BUSY | error_code::PRM_ACTIVE => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        error_code::DAQ_ACTIVE if matches!(command, Program | ProgramStart | ProgramClear) => {
            HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes)
        }
        error_code::CMD_SYNCH => HandlerEntry::new(vec![PreAction::None], Action::Skip),
        error_code::CMD_UNKNOWN => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        error_code::CMD_SYNTAX => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        error_code::OUT_OF_RANGE => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        error_code::ACCESS_LOCKED => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),
        error_code::ACCESS_DENIED => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        error_code::RESOURCE_TEMPORARY_NOT_ACCESSIBLE => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),
        _ => HandlerEntry::new(vec![PreAction::None], Action::None),
    }
}

/// Table rows taken verbatim (normalized) from errormatrix.py's ERROR_MATRIX for the commands the
/// source calls out explicitly; anything not listed here falls through to the default shape in
/// `lookup` above.
fn specific(command: XcpCommand, code: u8) -> Option<HandlerEntry> {
    use error_code::*;
    use XcpCommand::*;

    Some(match (command, code) {
        (Connect, TIMEOUT) => HandlerEntry::new(vec![PreAction::None], Action::RepeatInfTimes),
        (Connect, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (Disconnect, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (Disconnect, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (Disconnect, PRM_ACTIVE) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),

        (GetStatus, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (GetStatus, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (Synch, TIMEOUT) => HandlerEntry::new(vec![PreAction::None], Action::Repeat2Times),
        (Synch, CMD_SYNCH) => HandlerEntry::new(vec![PreAction::None], Action::Skip),
        (Synch, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::RestartSession),
        (Synch, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (GetCommModeInfo, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (GetCommModeInfo, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (GetCommModeInfo, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (GetCommModeInfo, CMD_SYNTAX) => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        (GetCommModeInfo, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::None], Action::Skip),

        (GetId, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (GetId, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (GetId, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (GetId, CMD_SYNTAX) => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        (GetId, OUT_OF_RANGE) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (GetId, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::None], Action::Skip),

        (SetRequest, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (SetRequest, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (SetRequest, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (SetRequest, CMD_SYNTAX) => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        (SetRequest, OUT_OF_RANGE) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (SetRequest, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (GetSeed, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (GetSeed, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (GetSeed, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (GetSeed, CMD_SYNTAX) => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        (GetSeed, OUT_OF_RANGE) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (GetSeed, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (Unlock, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (Unlock, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (Unlock, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (Unlock, CMD_SYNTAX) => HandlerEntry::new(vec![PreAction::None], Action::RetrySyntax),
        (Unlock, OUT_OF_RANGE) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (Unlock, ACCESS_LOCKED) => HandlerEntry::new(vec![PreAction::None], Action::RestartSession),
        (Unlock, SEQUENCE) => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),
        (Unlock, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (SetMta, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (SetMta, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (SetMta, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (Upload, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch, PreAction::SetMta], Action::Repeat2Times),
        (Upload, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (Upload, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (Upload, ACCESS_DENIED) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (Upload, ACCESS_LOCKED) => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),
        (Upload, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),

        (ShortUpload, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch], Action::Repeat2Times),
        (ShortUpload, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::UseAlternative),
        (ShortUpload, ACCESS_LOCKED) => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),

        (BuildChecksum, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch, PreAction::SetMta], Action::Repeat2Times),
        (BuildChecksum, ACCESS_LOCKED) => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),

        (Download, TIMEOUT) => HandlerEntry::new(vec![PreAction::Synch, PreAction::SetMta], Action::Repeat2Times),
        (Download, ACCESS_LOCKED) => HandlerEntry::new(vec![PreAction::UnlockSlave], Action::Repeat2Times),
        (DownloadNext, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::UseAlternative),
        (ShortDownload, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::UseAlternative),

        (SetCalPage, SEGMENT_NOT_VALID) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (SetCalPage, PAGE_NOT_VALID) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (GetCalPage, SEGMENT_NOT_VALID) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),

        (ClearDaqList, DAQ_CONFIG) => HandlerEntry::new(vec![PreAction::ReinitDaq], Action::Repeat),
        (SetDaqPtr, DAQ_CONFIG) => HandlerEntry::new(vec![PreAction::ReinitDaq], Action::Repeat),
        (WriteDaq, OUT_OF_RANGE) => HandlerEntry::new(vec![PreAction::None], Action::RetryParam),
        (WriteDaq, MEMORY_OVERFLOW) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (WriteDaqMultiple, MEMORY_OVERFLOW) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),

        (StartStopDaqList, DAQ_CONFIG) => HandlerEntry::new(vec![PreAction::ReinitDaq], Action::Repeat),
        (StartStopDaqList, RESOURCE_TEMPORARY_NOT_ACCESSIBLE) => HandlerEntry::new(vec![PreAction::DisplayError], Action::Repeat),
        (StartStopSynch, SEQUENCE) => HandlerEntry::new(vec![PreAction::ReinitDaq], Action::Repeat),

        (AllocDaq, MEMORY_OVERFLOW) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (AllocOdt, MEMORY_OVERFLOW) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (AllocOdtEntry, MEMORY_OVERFLOW) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),

        (ProgramStart, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (ProgramClear, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (Program, CMD_BUSY) => HandlerEntry::new(vec![PreAction::WaitT7], Action::RepeatInfTimes),
        (Program, VERIFY) => HandlerEntry::new(vec![PreAction::DisplayError], Action::NewFlashWare),
        (ProgramVerify, VERIFY) => HandlerEntry::new(vec![PreAction::DisplayError], Action::NewFlashWare),

        (TransportLayerCmd, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),
        (UserCmd, CMD_UNKNOWN) => HandlerEntry::new(vec![PreAction::None], Action::DisplayError),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_timeout_repeats_infinitely() {
        let entry = lookup(XcpCommand::Connect, error_code::TIMEOUT);
        assert_eq!(entry.action, Action::RepeatInfTimes);
    }

    #[test]
    fn unlock_sequence_error_drives_seed_and_key_unlock() {
        let entry = lookup(XcpCommand::Unlock, error_code::SEQUENCE);
        assert_eq!(entry.pre_actions, vec![PreAction::UnlockSlave]);
        assert_eq!(entry.action, Action::Repeat2Times);
    }

    #[test]
    fn unknown_command_error_pair_falls_back_to_default_shape() {
        let entry = lookup(XcpCommand::GetPageInfo, error_code::TIMEOUT);
        assert_eq!(entry.action, Action::Repeat2Times);
    }
}
