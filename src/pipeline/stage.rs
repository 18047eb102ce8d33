//! Explicit three-way stage results.
//!
//! Optional stages never panic or throw their way out: they return a
//! [`StageOutcome`] and the orchestrator maps it to a task status.

use crate::error::Pdf2DocxError;

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The primary path produced the value.
    Succeeded(T),
    /// A fallback produced the value; `reason` says why the primary did not.
    Degraded { value: T, reason: String },
    /// Nothing usable; the task must fail.
    Fatal(Pdf2DocxError),
}

impl<T> StageOutcome<T> {
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        StageOutcome::Degraded {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StageOutcome::Degraded { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal(_))
    }

    /// Transform the carried value, keeping the outcome kind.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            StageOutcome::Succeeded(v) => StageOutcome::Succeeded(f(v)),
            StageOutcome::Degraded { value, reason } => StageOutcome::Degraded {
                value: f(value),
                reason,
            },
            StageOutcome::Fatal(e) => StageOutcome::Fatal(e),
        }
    }

    /// Drop the succeeded/degraded distinction.
    pub fn into_result(self) -> Result<T, Pdf2DocxError> {
        match self {
            StageOutcome::Succeeded(v) | StageOutcome::Degraded { value: v, .. } => Ok(v),
            StageOutcome::Fatal(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_kind() {
        let d = StageOutcome::degraded(2, "fallback").map(|v| v * 10);
        assert!(d.is_degraded());
        assert_eq!(d.into_result().unwrap(), 20);

        let f: StageOutcome<i32> = StageOutcome::Fatal(Pdf2DocxError::Internal("x".into()));
        let f = f.map(|v| v + 1);
        assert!(f.is_fatal());
        assert!(f.into_result().is_err());
    }
}
