// ABOUTME: Diagnostics accumulator for non-fatal warnings during a command.
// ABOUTME: Collects warnings that shouldn't fail a rollout but should be shown to users.

/// Collects non-fatal warnings during CLI operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a command.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create a lock release warning.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockRelease,
            message: message.into(),
        }
    }

    /// Create an edge snapshot save warning.
    pub fn edge_snapshot(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::EdgeSnapshot,
            message: message.into(),
        }
    }

    /// Create an orphaned staging distribution warning.
    pub fn orphans(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Orphans,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to release the run lock (lock file may remain).
    LockRelease,
    /// Failed to persist the local edge state.
    EdgeSnapshot,
    /// Staging distributions left behind by interrupted runs.
    Orphans,
}
