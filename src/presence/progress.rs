//! Sync progress as reported by everpad's provider.

/// Phases of an everpad sync run.
///
/// The provider sends these as plain integers. Unknown values are kept as
/// [`SyncState::Other`] and treated as "still syncing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Start,
    NotebooksLocal,
    TagsLocal,
    NotesLocal,
    NotebooksRemote,
    TagsRemote,
    Share,
    StopShare,
    NotesRemote,
    Finish,
    Other(i32),
}

impl From<i32> for SyncState {
    fn from(raw: i32) -> Self {
        match raw {
            0 => SyncState::Start,
            1 => SyncState::NotebooksLocal,
            2 => SyncState::TagsLocal,
            3 => SyncState::NotesLocal,
            4 => SyncState::NotebooksRemote,
            5 => SyncState::TagsRemote,
            6 => SyncState::Share,
            7 => SyncState::StopShare,
            8 => SyncState::NotesRemote,
            9 => SyncState::Finish,
            other => SyncState::Other(other),
        }
    }
}

impl SyncState {
    /// `Finish` ends a sync run; every other state is a step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Finish)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncState::Start => "Sync started",
            SyncState::NotebooksLocal => "Local notebooks",
            SyncState::TagsLocal => "Local tags",
            SyncState::NotesLocal => "Local notes",
            SyncState::NotebooksRemote => "Remote notebooks",
            SyncState::TagsRemote => "Remote tags",
            SyncState::Share => "Sharing notes",
            SyncState::StopShare => "Stop sharing notes",
            SyncState::NotesRemote => "Remote notes",
            SyncState::Finish => "Sync finished",
            SyncState::Other(_) => "Syncing",
        }
    }
}

/// Progress of the current sync run. The default value means "idle".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncProgress {
    pub in_progress: bool,
    pub step_count: u32,
    pub current_state_label: String,
}

impl SyncProgress {
    /// Record one more step of the running sync.
    ///
    /// A terminal state resets the progress instead. Returns whether a sync
    /// is still running afterwards.
    pub fn advance(&mut self, state: SyncState) -> bool {
        if state.is_terminal() {
            self.reset();
            return false;
        }

        self.in_progress = true;
        self.step_count = self.step_count.saturating_add(1);
        self.current_state_label = state.label().to_string();
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }

    /// One-line summary for progress rows, e.g. `"Local notes (step 3)"`.
    pub fn describe(&self) -> String {
        if self.in_progress {
            format!("{} (step {})", self.current_state_label, self.step_count)
        } else {
            "Idle".to_string()
        }
    }
}
