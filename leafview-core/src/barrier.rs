use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::CoordinatorError;
use crate::geometry::Rect;
use crate::host::Screen;
use crate::window::WindowId;

/// Identifies one session restore batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

fn default_accessible() -> bool {
    true
}

/// One window of a saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreEntry {
    pub file_path: String,
    #[serde(default)]
    pub file_key: String,
    #[serde(default)]
    pub current_page: usize,
    pub frame: Rect,
    #[serde(default = "default_accessible")]
    pub accessible: bool,
}

/// How a window's open attempt ended. Every outcome counts as completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedFrame {
    pub window: WindowId,
    pub frame: Rect,
}

/// Emitted once when every window of a batch has reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealEvent {
    pub batch: BatchId,
    pub frames: Vec<RevealedFrame>,
}

/// Receives the validated frame at reveal time. `None` means the window
/// should keep its current frame.
pub type RevealReceiver = oneshot::Receiver<Option<Rect>>;

struct Participant {
    entry: RestoreEntry,
    outcome: Option<LoadOutcome>,
    reveal: Option<oneshot::Sender<Option<Rect>>>,
}

/// What became of one saved-session entry's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Claimed(WindowId),
    Abandoned,
}

struct Batch {
    id: BatchId,
    expected: usize,
    participants: HashMap<WindowId, Participant>,
    completed: HashSet<WindowId>,
    slots: HashMap<usize, SlotState>,
}

impl Batch {
    fn is_complete(&self) -> bool {
        self.completed.len() >= self.expected
    }

    fn join(&mut self, window: WindowId, entry: RestoreEntry) -> RevealReceiver {
        let (tx, rx) = oneshot::channel();
        self.participants.insert(
            window,
            Participant {
                entry,
                outcome: None,
                reveal: Some(tx),
            },
        );
        log::debug!(
            "Window {} joined restore batch {} ({} registered, {} expected)",
            window,
            self.id,
            self.participants.len(),
            self.expected
        );
        rx
    }
}

/// Synchronises the reveal of every window in a session restore.
///
/// At most one batch is in flight. Each operation runs under a single lock,
/// so checking the completed set and firing the reveal cannot interleave with
/// another report.
pub struct RestoreBarrier {
    state: Mutex<Option<Batch>>,
    screen: Arc<dyn Screen>,
    reveal_unsuccessful: bool,
}

impl RestoreBarrier {
    pub fn new(screen: Arc<dyn Screen>, reveal_unsuccessful: bool) -> Self {
        Self {
            state: Mutex::new(None),
            screen,
            reveal_unsuccessful,
        }
    }

    pub fn begin_batch(&self, expected: usize) -> Result<BatchId, CoordinatorError> {
        if expected == 0 {
            return Err(CoordinatorError::EmptyBatch);
        }
        let mut state = self.state.lock();
        if let Some(batch) = state.as_ref() {
            log::warn!(
                "Session restore rejected: batch {} still waiting on {}/{} windows",
                batch.id,
                batch.expected - batch.completed.len(),
                batch.expected
            );
            return Err(CoordinatorError::BatchAlreadyInProgress);
        }
        let id = BatchId::new();
        *state = Some(Batch {
            id,
            expected,
            participants: HashMap::new(),
            completed: HashSet::new(),
            slots: HashMap::new(),
        });
        log::info!("Restore batch {} started for {} window(s)", id, expected);
        Ok(id)
    }

    /// Record `window`'s target state. Registering the same window again
    /// replaces its entry and its reveal receiver.
    pub fn register_window(
        &self,
        batch: BatchId,
        window: WindowId,
        entry: RestoreEntry,
    ) -> Result<RevealReceiver, CoordinatorError> {
        let mut state = self.state.lock();
        let current = state
            .as_mut()
            .filter(|b| b.id == batch)
            .ok_or(CoordinatorError::UnknownBatch(batch))?;

        Ok(current.join(window, entry))
    }

    /// Register `window` as the one that took slot `index` of the saved
    /// session. Fails once the slot has been abandoned, so a slot is counted
    /// either by its window or by `abandon_slot`, never both.
    pub fn claim_slot(
        &self,
        batch: BatchId,
        index: usize,
        window: WindowId,
        entry: RestoreEntry,
    ) -> Result<RevealReceiver, CoordinatorError> {
        let mut state = self.state.lock();
        let current = state
            .as_mut()
            .filter(|b| b.id == batch)
            .ok_or(CoordinatorError::UnknownBatch(batch))?;

        if current.slots.get(&index) == Some(&SlotState::Abandoned) {
            return Err(CoordinatorError::SlotAbandoned(index));
        }
        current.slots.insert(index, SlotState::Claimed(window));
        Ok(current.join(window, entry))
    }

    /// Mark `window` as finished loading, whatever the outcome. Returns the
    /// reveal when this report completes the batch.
    ///
    /// Duplicate reports and reports from windows that never registered are
    /// ignored.
    pub fn report_completion(
        &self,
        batch: BatchId,
        window: WindowId,
        outcome: LoadOutcome,
    ) -> Result<Option<RevealEvent>, CoordinatorError> {
        let mut state = self.state.lock();
        let current = state
            .as_mut()
            .filter(|b| b.id == batch)
            .ok_or(CoordinatorError::UnknownBatch(batch))?;

        let Some(participant) = current.participants.get_mut(&window) else {
            log::debug!(
                "Ignoring completion from {} which is not part of batch {}",
                window,
                batch
            );
            return Ok(None);
        };
        if !current.completed.insert(window) {
            return Ok(None);
        }
        participant.outcome = Some(outcome);
        log::debug!(
            "Window {} finished ({:?}), batch {} at {}/{}",
            window,
            outcome,
            batch,
            current.completed.len(),
            current.expected
        );

        if !current.is_complete() {
            return Ok(None);
        }
        Ok(state.take().map(|finished| self.reveal(finished)))
    }

    /// Give up on slot `index` when its request never reached a window, so
    /// the batch completes with the windows that did. A slot already claimed
    /// by a window is left alone.
    pub fn abandon_slot(
        &self,
        batch: BatchId,
        index: usize,
    ) -> Result<Option<RevealEvent>, CoordinatorError> {
        let mut state = self.state.lock();
        let current = state
            .as_mut()
            .filter(|b| b.id == batch)
            .ok_or(CoordinatorError::UnknownBatch(batch))?;

        if let Some(slot) = current.slots.get(&index) {
            log::debug!("Slot {} of batch {} already {:?}", index, batch, slot);
            return Ok(None);
        }
        current.slots.insert(index, SlotState::Abandoned);
        current.expected = current.expected.saturating_sub(1);
        log::warn!(
            "Restore batch {} abandoned slot {}, now expecting {}",
            batch,
            index,
            current.expected
        );
        if !current.is_complete() {
            return Ok(None);
        }
        Ok(state.take().map(|finished| self.reveal(finished)))
    }

    pub fn current_batch(&self) -> Option<BatchId> {
        self.state.lock().as_ref().map(|b| b.id)
    }

    /// `(completed, expected)` for the batch in flight.
    pub fn progress(&self) -> Option<(usize, usize)> {
        self.state
            .lock()
            .as_ref()
            .map(|b| (b.completed.len(), b.expected))
    }

    fn reveal(&self, batch: Batch) -> RevealEvent {
        let bounds = self.screen.visible_bounds();
        let mut frames = Vec::with_capacity(batch.participants.len());

        for (window, participant) in batch.participants {
            let succeeded = participant.outcome == Some(LoadOutcome::Succeeded);
            let frame = (succeeded || self.reveal_unsuccessful)
                .then(|| participant.entry.frame.fit_within(&bounds));

            if let Some(tx) = participant.reveal {
                // The window may have closed since registering.
                let _ = tx.send(frame);
            }
            if let Some(frame) = frame {
                frames.push(RevealedFrame { window, frame });
            }
        }
        frames.sort_by_key(|f| f.window);

        log::info!(
            "Restore batch {} complete, revealing {} window(s)",
            batch.id,
            frames.len()
        );
        RevealEvent {
            batch: batch.id,
            frames,
        }
    }
}
