//! Outcome of one sync pass.

use std::fmt;

/// Counters collected while a sync pass runs.
///
/// Remote failures never abort a pass; they show up here instead and
/// are retried on the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Legacy plaintext values sealed into envelopes before pushing.
    pub migrated: usize,
    /// Pending deletes the remote confirmed.
    pub deletes_confirmed: usize,
    /// Pending deletes still queued after this pass.
    pub deletes_pending: usize,
    /// Items upserted successfully.
    pub pushed: usize,
    /// Items whose upsert failed.
    pub push_failed: usize,
    /// Items in the pulled remote view (after filtering pending deletes).
    pub pulled: usize,
    /// Local items kept because the remote doesn't have their latest version yet.
    pub retained: usize,
    /// Whether the remote list call succeeded.
    pub pull_succeeded: bool,
}

impl SyncReport {
    /// `true` when every remote call in the pass succeeded.
    pub fn is_clean(&self) -> bool {
        self.pull_succeeded && self.push_failed == 0 && self.deletes_pending == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed {}, pulled {}, deletes confirmed {}",
            self.pushed, self.pulled, self.deletes_confirmed
        )?;
        if self.push_failed > 0 {
            write!(f, ", {} push failure(s)", self.push_failed)?;
        }
        if self.deletes_pending > 0 {
            write!(f, ", {} delete(s) still queued", self.deletes_pending)?;
        }
        if !self.pull_succeeded {
            f.write_str(", remote unreachable")?;
        }
        Ok(())
    }
}
