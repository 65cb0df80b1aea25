use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::barrier::{BatchId, LoadOutcome, RestoreBarrier, RevealReceiver};
use crate::coordinator::Shared;
use crate::error::{CoordinatorError, OpenError};
use crate::events::{emit, CoordinatorEvent, EventSender};
use crate::host::{IdentityChoice, PasswordChoice};
use crate::mailbox::PendingOpenRequest;
use crate::window::WindowId;

/// Messages delivered point-to-point to one window's controller.
#[derive(Debug)]
pub enum WindowCommand {
    Open {
        request: PendingOpenRequest,
        /// Present when the request belongs to a restore batch.
        reveal: Option<RevealReceiver>,
    },
    Close,
}

/// One open attempt by one window.
///
/// Exactly one of the `on_*` callbacks consumes it. If it is dropped without
/// one (an early return, a panic, a cancelled task) it reports a failure, so a
/// restore batch is never left waiting on it.
pub struct OpenAttempt {
    barrier: Arc<RestoreBarrier>,
    events: EventSender,
    window: WindowId,
    batch: Option<BatchId>,
    finished: bool,
}

impl OpenAttempt {
    pub fn new(
        barrier: Arc<RestoreBarrier>,
        events: EventSender,
        window: WindowId,
        batch: Option<BatchId>,
    ) -> Self {
        Self {
            barrier,
            events,
            window,
            batch,
            finished: false,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn on_load_succeeded(mut self) {
        self.finish(LoadOutcome::Succeeded);
    }

    pub fn on_load_failed(mut self, reason: &CoordinatorError) {
        log::info!("Window {} failed to open: {}", self.window, reason);
        self.finish(LoadOutcome::Failed);
    }

    pub fn on_user_cancelled(mut self) {
        log::info!("Window {} open cancelled by user", self.window);
        self.finish(LoadOutcome::Cancelled);
    }

    fn finish(&mut self, outcome: LoadOutcome) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        let Some(batch) = self.batch else {
            return;
        };
        match self.barrier.report_completion(batch, self.window, outcome) {
            Ok(Some(reveal)) => emit(&self.events, CoordinatorEvent::Revealed(reveal)),
            Ok(None) => {}
            Err(e) => log::debug!("Completion from {} not recorded: {}", self.window, e),
        }
    }
}

impl Drop for OpenAttempt {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Open attempt for {} ended without a result, reporting failure",
                self.window
            );
            self.finish(LoadOutcome::Failed);
        }
    }
}

struct OpenedFile {
    page: usize,
    page_count: usize,
}

/// Drives one window: receives commands, opens files, applies the restore
/// frame when the batch reveals.
pub(crate) struct WindowController {
    shared: Arc<Shared>,
    id: WindowId,
    commands: mpsc::UnboundedReceiver<WindowCommand>,
}

impl WindowController {
    pub(crate) fn new(
        shared: Arc<Shared>,
        id: WindowId,
        commands: mpsc::UnboundedReceiver<WindowCommand>,
    ) -> Self {
        Self {
            shared,
            id,
            commands,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                WindowCommand::Open { request, reveal } => self.handle_open(request, reveal).await,
                WindowCommand::Close => break,
            }
        }
        log::debug!("Controller for {} stopped", self.id);
    }

    async fn handle_open(&self, request: PendingOpenRequest, reveal: Option<RevealReceiver>) {
        let attempt = OpenAttempt::new(
            self.shared.barrier.clone(),
            self.shared.events.clone(),
            self.id,
            request.batch(),
        );

        match self.load(&request).await {
            Ok(opened) => {
                self.shared.directory.set_has_open_file(self.id, true);
                emit(
                    &self.shared.events,
                    CoordinatorEvent::FileOpened {
                        window: self.id,
                        file_path: request.file_path.clone(),
                        page: opened.page,
                        page_count: opened.page_count,
                    },
                );
                attempt.on_load_succeeded();
            }
            Err(CoordinatorError::LoadCancelledByUser) => attempt.on_user_cancelled(),
            Err(e) => {
                if let CoordinatorError::FileNotFound(path) = &e {
                    emit(
                        &self.shared.events,
                        CoordinatorEvent::FileNotFound {
                            file_path: path.clone(),
                        },
                    );
                }
                emit(
                    &self.shared.events,
                    CoordinatorEvent::OpenFailed {
                        window: self.id,
                        file_path: request.file_path.clone(),
                        reason: e.to_string(),
                    },
                );
                attempt.on_load_failed(&e);
            }
        }

        if let Some(reveal) = reveal {
            tokio::spawn(apply_on_reveal(self.shared.clone(), self.id, reveal));
        }
    }

    async fn load(&self, request: &PendingOpenRequest) -> Result<OpenedFile, CoordinatorError> {
        let settings = &self.shared.settings;
        let os_handle = self
            .shared
            .directory
            .await_os_handle(
                self.id,
                settings.handle_poll_attempts,
                settings.handle_poll_interval(),
            )
            .await
            .ok_or(CoordinatorError::HandleAcquisitionTimedOut)?;
        if !self.shared.directory.contains(self.id) {
            return Err(CoordinatorError::WindowClosed);
        }
        log::debug!(
            "Window {} ({:?}) opening {}",
            self.id,
            os_handle,
            request.file_path
        );

        let path = request.file_path.as_str();
        let mut page = 0;
        if let Some(slot) = &request.restore {
            if !slot.entry.accessible {
                return Err(CoordinatorError::FileNotFound(path.to_string()));
            }
            page = slot.entry.current_page;
            if !slot.entry.file_key.is_empty() {
                let source = self.shared.host.image_source.clone();
                let key_path = path.to_string();
                let current_key = blocking(move || source.file_key(&key_path)).await?;
                if let Some(current_key) = current_key {
                    if current_key != slot.entry.file_key {
                        let dialogs = self.shared.host.dialogs.clone();
                        let saved_key = slot.entry.file_key.clone();
                        let choice = blocking(move || {
                            dialogs.prompt_file_identity(&saved_key, &current_key)
                        })
                        .await?;
                        match choice {
                            IdentityChoice::Continue => {}
                            IdentityChoice::StartOver => page = 0,
                            IdentityChoice::Cancelled => {
                                return Err(CoordinatorError::LoadCancelledByUser)
                            }
                        }
                    }
                }
            }
        }

        let page_count = self.open_with_password(path).await?;
        Ok(OpenedFile {
            page: page.min(page_count.saturating_sub(1)),
            page_count,
        })
    }

    async fn open_with_password(&self, path: &str) -> Result<usize, CoordinatorError> {
        let max_prompts = self.shared.settings.password_attempts;
        let mut password: Option<String> = None;
        let mut prompts = 0;

        loop {
            let source = self.shared.host.image_source.clone();
            let (open_path, attempt) = (path.to_string(), password.clone());
            let opened = blocking(move || source.open(&open_path, attempt.as_deref())).await?;
            match opened {
                Ok(page_count) => return Ok(page_count),
                Err(OpenError::NotFound) => {
                    return Err(CoordinatorError::FileNotFound(path.to_string()))
                }
                Err(OpenError::PasswordRequired | OpenError::WrongPassword)
                    if prompts < max_prompts =>
                {
                    prompts += 1;
                    let file_name = Path::new(path)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.to_string());
                    let dialogs = self.shared.host.dialogs.clone();
                    match blocking(move || dialogs.prompt_password(&file_name)).await? {
                        PasswordChoice::Password(p) => password = Some(p),
                        PasswordChoice::Cancelled => {
                            return Err(CoordinatorError::LoadCancelledByUser)
                        }
                    }
                }
                Err(e) => return Err(CoordinatorError::Load(e.to_string())),
            }
        }
    }
}

/// Run a host call that may block (archive IO, modal dialogs) on the
/// blocking pool so window tasks and timers keep running.
async fn blocking<T, F>(call: F) -> Result<T, CoordinatorError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| CoordinatorError::Load(format!("host call failed: {}", e)))
}

/// Wait for the batch reveal, then move the window to its validated frame.
async fn apply_on_reveal(shared: Arc<Shared>, id: WindowId, reveal: RevealReceiver) {
    let Ok(Some(frame)) = reveal.await else {
        return;
    };
    match shared.directory.os_handle(id) {
        Some(os_handle) => {
            shared.host.window_system.apply_frame(os_handle, frame);
            shared.directory.set_frame(id, frame);
        }
        None => log::debug!("Window {} gone before reveal, frame not applied", id),
    }
}
