//! Headless stand-in for the windowing layer, the archive loader and the
//! dialogs, backed by the local filesystem.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use leafview_core::host::{
    Dialogs, IdentityChoice, ImageSource, PasswordChoice, Screen, WindowSystem,
};
use leafview_core::{OpenCoordinator, OpenError, OsHandle, Rect, WindowId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub struct SimHost {
    screen: Rect,
    window_requests: mpsc::UnboundedSender<()>,
    applied: Mutex<Vec<(OsHandle, Rect)>>,
}

impl SimHost {
    pub fn new(screen: Rect) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (window_requests, rx) = mpsc::unbounded_channel();
        (
            Self {
                screen,
                window_requests,
                applied: Mutex::new(Vec::new()),
            },
            rx,
        )
    }

    pub fn applied_frames(&self) -> Vec<(OsHandle, Rect)> {
        self.applied.lock().clone()
    }
}

impl WindowSystem for SimHost {
    fn request_window(&self) {
        if self.window_requests.send(()).is_err() {
            log::warn!("Window manager stopped, request ignored");
        }
    }

    fn apply_frame(&self, window: OsHandle, frame: Rect) {
        log::info!("Window {:?} moved to {:?}", window, frame);
        self.applied.lock().push((window, frame));
    }
}

impl Screen for SimHost {
    fn visible_bounds(&self) -> Rect {
        self.screen
    }
}

impl ImageSource for SimHost {
    /// A directory opens with one page per entry, a regular file as one page.
    fn open(&self, path: &str, _password: Option<&str>) -> Result<usize, OpenError> {
        let path = Path::new(path);
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpenError::NotFound)
            }
            Err(e) => return Err(OpenError::Io(e.to_string())),
        };
        if !metadata.is_dir() {
            return Ok(1);
        }
        let entries = std::fs::read_dir(path).map_err(|e| OpenError::Io(e.to_string()))?;
        match entries.filter_map(Result::ok).count() {
            0 => Err(OpenError::Unsupported),
            pages => Ok(pages),
        }
    }

    fn file_key(&self, path: &str) -> Option<String> {
        let metadata = std::fs::metadata(path).ok()?;
        let modified = metadata
            .modified()
            .ok()?
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_secs();
        Some(format!("{}-{}", metadata.len(), modified))
    }
}

impl Dialogs for SimHost {
    fn prompt_password(&self, file_name: &str) -> PasswordChoice {
        log::info!("No one to ask for the password of {}, cancelling", file_name);
        PasswordChoice::Cancelled
    }

    fn prompt_file_identity(&self, existing_key: &str, new_key: &str) -> IdentityChoice {
        log::info!(
            "File changed since it was saved ({} -> {}), continuing",
            existing_key,
            new_key
        );
        IdentityChoice::Continue
    }
}

/// Construct a window for every request, each step after `delay`, the way
/// a real window server hands out windows asynchronously.
pub async fn run_window_manager(
    coordinator: OpenCoordinator,
    mut requests: mpsc::UnboundedReceiver<()>,
    delay: Duration,
) {
    static NEXT_OS_HANDLE: AtomicU64 = AtomicU64::new(1);

    while requests.recv().await.is_some() {
        tokio::time::sleep(delay).await;
        let id = WindowId::next();
        coordinator.window_constructed(id);

        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let os_handle = OsHandle(NEXT_OS_HANDLE.fetch_add(1, Ordering::Relaxed));
            coordinator.set_os_handle(id, os_handle);
        });
    }
}
