use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::barrier::{BatchId, LoadOutcome, RestoreBarrier, RestoreEntry, RevealEvent};
use crate::controller::{OpenAttempt, WindowCommand, WindowController};
use crate::directory::WindowDirectory;
use crate::error::CoordinatorError;
use crate::events::{self, emit, CoordinatorEvent, EventReceiver, EventSender};
use crate::host::Host;
use crate::mailbox::{HandoffMailbox, PendingOpenRequest, RequestId};
use crate::ownership::OwnershipRegistry;
use crate::settings::CoordinatorSettings;
use crate::window::{OsHandle, WindowId};

/// State shared by the coordinator and every window controller.
pub(crate) struct Shared {
    pub(crate) ownership: Arc<OwnershipRegistry>,
    pub(crate) mailbox: HandoffMailbox,
    pub(crate) directory: WindowDirectory,
    pub(crate) barrier: Arc<RestoreBarrier>,
    pub(crate) host: Host,
    pub(crate) settings: CoordinatorSettings,
    pub(crate) events: EventSender,
    /// Waiters for specific requests, told which window received them.
    deliveries: Mutex<HashMap<RequestId, oneshot::Sender<WindowId>>>,
}

/// Decides which window handles each open request and runs session restores.
///
/// Cheap to clone; every clone drives the same windows. Methods that start
/// window controllers must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct OpenCoordinator {
    shared: Arc<Shared>,
}

impl OpenCoordinator {
    pub fn new(host: Host, settings: CoordinatorSettings) -> (Self, EventReceiver) {
        let (events, receiver) = events::channel();
        let ownership = Arc::new(OwnershipRegistry::new());
        let directory = WindowDirectory::new(ownership.clone(), settings.focus_debounce());
        let barrier = Arc::new(RestoreBarrier::new(
            host.screen.clone(),
            settings.reveal_cancelled_windows,
        ));
        let shared = Shared {
            ownership,
            mailbox: HandoffMailbox::new(),
            directory,
            barrier,
            host,
            settings,
            events,
            deliveries: Mutex::new(HashMap::new()),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            receiver,
        )
    }

    pub fn ownership(&self) -> &OwnershipRegistry {
        &self.shared.ownership
    }

    pub fn mailbox(&self) -> &HandoffMailbox {
        &self.shared.mailbox
    }

    pub fn directory(&self) -> &WindowDirectory {
        &self.shared.directory
    }

    pub fn barrier(&self) -> &RestoreBarrier {
        &self.shared.barrier
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    /// Start a per-window open attempt for a frontend that loads files itself.
    pub fn begin_attempt(&self, window: WindowId, batch: Option<BatchId>) -> OpenAttempt {
        OpenAttempt::new(
            self.shared.barrier.clone(),
            self.shared.events.clone(),
            window,
            batch,
        )
    }

    // ── Window lifecycle ─────────────────────────────────────────────────

    /// A window finished constructing. It becomes the owner and receives any
    /// request already waiting in the mailbox.
    pub fn window_constructed(&self, id: WindowId) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.directory.register(id, tx);
        self.shared.ownership.assign(id);
        tokio::spawn(WindowController::new(self.shared.clone(), id, rx).run());
        self.dispatch_pending(id);
    }

    pub fn set_os_handle(&self, id: WindowId, os_handle: OsHandle) -> bool {
        self.shared.directory.set_os_handle(id, os_handle)
    }

    /// A window closed. Releases its ownership claim and, if it was part of a
    /// restore batch, counts it as finished.
    pub fn window_closed(&self, id: WindowId) {
        let Some(commands) = self.shared.directory.deregister(id) else {
            return;
        };
        let _ = commands.send(WindowCommand::Close);

        if let Some(batch) = self.shared.barrier.current_batch() {
            match self
                .shared
                .barrier
                .report_completion(batch, id, LoadOutcome::Failed)
            {
                Ok(Some(reveal)) => self.publish_reveal(reveal),
                Ok(None) => {}
                Err(e) => log::debug!("Closed window {} not counted: {}", id, e),
            }
        }
    }

    /// Focus moved to `os_handle`. Emits a debounced list refresh.
    pub fn window_focused(&self, os_handle: OsHandle, now: Instant) {
        let directory = &self.shared.directory;
        directory.mark_active(os_handle);
        if !directory.should_notify_focus(os_handle, now) {
            return;
        }
        if let Some(window) = directory.active_window() {
            emit(&self.shared.events, CoordinatorEvent::RefreshLists { window });
        }
    }

    // ── Open requests ────────────────────────────────────────────────────

    /// Open `path` without replacing the content of a window that already
    /// shows a file.
    pub async fn request_open(
        &self,
        path: impl Into<String>,
        force_new_window: bool,
    ) -> Option<WindowId> {
        self.post(PendingOpenRequest::open(path, force_new_window));
        self.need_new_window().await
    }

    /// Open `path` in the owning window, replacing what it shows.
    pub async fn request_replace(&self, path: impl Into<String>) -> Option<WindowId> {
        self.post(PendingOpenRequest::open(path, false));
        self.open_pending_file_in_last_window().await
    }

    /// Route the pending request to the owner, claiming for the most relevant
    /// window when nobody owns it. Creates a window when none exist.
    pub async fn open_pending_file_in_last_window(&self) -> Option<WindowId> {
        if let Some(target) = self.resolve_target() {
            return self.dispatch_pending(target);
        }
        let request = self.shared.mailbox.peek()?;
        self.spawn_window_for_pending(request.id).await
    }

    /// Route the pending request to the owner only if the owner is empty and
    /// the request allows reuse; otherwise to a newly created window.
    pub async fn need_new_window(&self) -> Option<WindowId> {
        let request = self.shared.mailbox.peek()?;
        if !request.force_new_window {
            if let Some(target) = self.resolve_target() {
                if self.shared.directory.has_open_file(target) == Some(false) {
                    return self.dispatch_pending(target);
                }
            }
        }
        self.spawn_window_for_pending(request.id).await
    }

    // ── Session restore ──────────────────────────────────────────────────

    /// Reopen a saved session, one new window per entry, revealing all of
    /// them together once every window has finished loading.
    pub async fn request_session_restore(
        &self,
        entries: Vec<RestoreEntry>,
    ) -> Result<BatchId, CoordinatorError> {
        let batch = match self.shared.barrier.begin_batch(entries.len()) {
            Ok(batch) => batch,
            Err(CoordinatorError::EmptyBatch) => {
                log::debug!("Ignoring restore of an empty session");
                return Err(CoordinatorError::EmptyBatch);
            }
            Err(e) => {
                emit(
                    &self.shared.events,
                    CoordinatorEvent::RestoreDropped {
                        batch: self.shared.barrier.current_batch(),
                        reason: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        for (index, entry) in entries.into_iter().enumerate() {
            let path = entry.file_path.clone();
            let request = PendingOpenRequest::restore(batch, index, entry);
            let id = request.id;
            let delivered = self.expect_delivery(id);
            self.post(request);
            self.shared.host.window_system.request_window();
            if self.await_delivery(id, delivered).await.is_some() {
                continue;
            }
            // Either no window took it or a newer request displaced it. If a
            // window claimed the slot meanwhile, abandoning is a no-op.
            log::warn!("No window took restored file {}", path);
            self.shared.mailbox.discard(id);
            self.abandon_slot(batch, index);
        }
        Ok(batch)
    }

    // ── Routing internals ────────────────────────────────────────────────

    fn resolve_target(&self) -> Option<WindowId> {
        let directory = &self.shared.directory;
        self.shared
            .ownership
            .owner()
            .filter(|owner| directory.contains(*owner))
            .or_else(|| directory.active_window())
            .or_else(|| directory.most_recent())
    }

    /// Hand the pending request to `target` if it owns it. Returns the window
    /// that received it.
    fn dispatch_pending(&self, target: WindowId) -> Option<WindowId> {
        let Some(request) = self
            .shared
            .mailbox
            .take_if_owner(target, &self.shared.ownership)
        else {
            log::debug!("Window {} has nothing to drain", target);
            return None;
        };
        let batch = request.batch();
        let id = request.id;

        let reveal = match &request.restore {
            Some(slot) => match self.shared.barrier.claim_slot(
                slot.batch,
                slot.index,
                target,
                slot.entry.clone(),
            ) {
                Ok(reveal) => Some(reveal),
                Err(e) => {
                    log::warn!("Restore slot for {} not registered: {}", target, e);
                    None
                }
            },
            None => None,
        };

        let delivered = self
            .shared
            .directory
            .sender(target)
            .is_some_and(|tx| tx.send(WindowCommand::Open { request, reveal }).is_ok());
        if !delivered {
            self.begin_attempt(target, batch)
                .on_load_failed(&CoordinatorError::WindowClosed);
            return None;
        }
        if let Some(waiter) = self.shared.deliveries.lock().remove(&id) {
            let _ = waiter.send(target);
        }
        Some(target)
    }

    /// Put `request` in the mailbox. A restore request it displaces can no
    /// longer reach a window, so that slot is abandoned here.
    fn post(&self, request: PendingOpenRequest) {
        let Some(displaced) = self.shared.mailbox.put(request) else {
            return;
        };
        // Dropping the waiter wakes it with an error.
        self.shared.deliveries.lock().remove(&displaced.id);
        if let Some(slot) = displaced.restore {
            log::warn!(
                "Restore of {} displaced by a newer open request",
                displaced.file_path
            );
            self.abandon_slot(slot.batch, slot.index);
        }
    }

    fn abandon_slot(&self, batch: BatchId, index: usize) {
        match self.shared.barrier.abandon_slot(batch, index) {
            Ok(Some(reveal)) => self.publish_reveal(reveal),
            Ok(None) => {}
            Err(e) => log::debug!("Slot {} not abandoned: {}", index, e),
        }
    }

    /// Register interest in which window receives request `id`. Must be
    /// called before the request can be delivered.
    fn expect_delivery(&self, id: RequestId) -> oneshot::Receiver<WindowId> {
        let (tx, rx) = oneshot::channel();
        self.shared.deliveries.lock().insert(id, tx);
        rx
    }

    /// Wait up to the settle time for request `id` to reach a window.
    async fn await_delivery(
        &self,
        id: RequestId,
        delivered: oneshot::Receiver<WindowId>,
    ) -> Option<WindowId> {
        let settle = self.shared.settings.new_window_settle();
        let result = tokio::time::timeout(settle, delivered).await;
        self.shared.deliveries.lock().remove(&id);
        match result {
            Ok(Ok(window)) => Some(window),
            Ok(Err(_)) => {
                log::debug!("Request superseded before reaching a window");
                None
            }
            Err(_) => {
                log::warn!("Requested window did not construct within {:?}", settle);
                None
            }
        }
    }

    /// Ask for a new window and wait (up to the settle time) for request
    /// `id` to reach it. Returns the window that received the request.
    async fn spawn_window_for_pending(&self, id: RequestId) -> Option<WindowId> {
        let delivered = self.expect_delivery(id);
        self.shared.host.window_system.request_window();
        if let Some(window) = self.await_delivery(id, delivered).await {
            return Some(window);
        }

        // Still pending: it goes to whoever owns it now.
        let still_pending = self.shared.mailbox.peek().is_some_and(|p| p.id == id);
        match self.resolve_target() {
            Some(target) if still_pending => self.dispatch_pending(target),
            _ => None,
        }
    }

    fn publish_reveal(&self, reveal: RevealEvent) {
        emit(&self.shared.events, CoordinatorEvent::Revealed(reveal));
    }
}
