//! Conflict classification between a local and a server version node.
//!
//! Only immediate parentage is inspected. A local node more than one hop
//! behind the server (or ahead of it) is reported as diverged even when a
//! longer chain would connect the two; the check sits behind
//! [`ConflictDetector`] so a full ancestry walker can replace it without
//! touching the orchestrator.

use serde::{Deserialize, Serialize};

use crate::models::VersionNode;

/// How a local node relates to the server node for the same log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictOutcome {
    /// Both sides hold the same content, whatever their parents say.
    NoConflictSame,
    /// The server holds the direct successor of the local state; adopt it.
    FastForward,
    /// The local side holds the direct successor of the server state; push it.
    LocalAhead,
    /// No direct link in either direction; a human must choose.
    ConflictDiverged,
}

impl ConflictOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoConflictSame => "NO_CONFLICT_SAME",
            Self::FastForward => "FAST_FORWARD",
            Self::LocalAhead => "LOCAL_AHEAD",
            Self::ConflictDiverged => "CONFLICT_DIVERGED",
        }
    }
}

/// Strategy deciding how two version nodes relate.
pub trait ConflictDetector: Send + Sync {
    fn detect(&self, local: &VersionNode, server: &VersionNode) -> ConflictOutcome;
}

/// Default detector comparing immediate parent pointers only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateParentDetector;

impl ConflictDetector for ImmediateParentDetector {
    fn detect(&self, local: &VersionNode, server: &VersionNode) -> ConflictOutcome {
        detect_conflict(local, server)
    }
}

/// Classify two nodes; the first matching rule wins.
#[must_use]
pub fn detect_conflict(local: &VersionNode, server: &VersionNode) -> ConflictOutcome {
    if local.content_hash == server.content_hash {
        return ConflictOutcome::NoConflictSame;
    }
    if server.parent_hash.as_deref() == Some(local.content_hash.as_str()) {
        return ConflictOutcome::FastForward;
    }
    if local.parent_hash.as_deref() == Some(server.content_hash.as_str()) {
        return ConflictOutcome::LocalAhead;
    }
    ConflictOutcome::ConflictDiverged
}
