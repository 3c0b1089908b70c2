//! Outcome and error types shared by the retry group and the request.

use thiserror::Error;

/// Errors returned when awaiting a hedged call.
#[derive(Debug, Error)]
pub enum BackupError<E> {
    /// The winning attempt reported a failure.
    #[error("operation failed: {0}")]
    Operation(E),

    /// The admission controller refused a backup attempt.
    #[error("have no access to retry")]
    NoAccess,

    /// The group was closed by `kill()` before any attempt won.
    #[error("retry group killed before any attempt won")]
    Killed,
}

impl<E> BackupError<E> {
    /// True when the call ended because admission was denied.
    pub fn is_killed(&self) -> bool {
        matches!(self, BackupError::NoAccess)
    }

    /// Return the operation's own failure, if that is what ended the call.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BackupError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Returned by every `kill()` after the group has already closed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("task has done")]
pub struct AlreadyDone;

/// Result type for hedged calls.
pub type BackupResult<T, E> = Result<T, BackupError<E>>;

/// Coarse classification of a hedged call's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// An attempt completed successfully.
    Success,
    /// Admission policy stopped the call.
    Denied,
    /// The winning attempt failed, or the group was killed.
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Success => "success",
            Verdict::Denied => "denied",
            Verdict::Failed => "failed",
        }
    }
}

/// True exactly for the "no access to retry" outcome.
pub fn is_killed<E>(err: &BackupError<E>) -> bool {
    err.is_killed()
}

/// Classify a hedged call's result.
pub fn classify<T, E>(result: &BackupResult<T, E>) -> Verdict {
    match result {
        Ok(_) => Verdict::Success,
        Err(BackupError::NoAccess) => Verdict::Denied,
        Err(_) => Verdict::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: BackupError<String> = BackupError::NoAccess;
        assert_eq!(err.to_string(), "have no access to retry");

        let err: BackupError<String> = BackupError::Operation("boom".into());
        assert_eq!(err.to_string(), "operation failed: boom");

        assert_eq!(AlreadyDone.to_string(), "task has done");
    }

    #[test]
    fn test_classifier() {
        let denied: BackupResult<u32, String> = Err(BackupError::NoAccess);
        assert!(is_killed(denied.as_ref().unwrap_err()));
        assert_eq!(classify(&denied), Verdict::Denied);

        let failed: BackupResult<u32, String> = Err(BackupError::Operation("io".into()));
        assert!(!is_killed(failed.as_ref().unwrap_err()));
        assert_eq!(classify(&failed), Verdict::Failed);

        let killed: BackupResult<u32, String> = Err(BackupError::Killed);
        assert!(!killed.as_ref().unwrap_err().is_killed());
        assert_eq!(classify(&killed), Verdict::Failed);

        let ok: BackupResult<u32, String> = Ok(7);
        assert_eq!(classify(&ok), Verdict::Success);
    }

    #[test]
    fn test_into_operation() {
        let err: BackupError<&str> = BackupError::Operation("timeout");
        assert_eq!(err.into_operation(), Some("timeout"));
        assert_eq!(BackupError::<&str>::NoAccess.into_operation(), None);
    }
}
