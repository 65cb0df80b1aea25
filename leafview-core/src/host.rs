//! Traits the frontend implements so the coordinator can drive real windows,
//! decode archives and ask the user questions.
//!
//! Implementations are called from coordinator tasks and must be cheap to
//! call from any thread; frontends that need the UI thread should hop there
//! themselves.

use std::sync::Arc;

use crate::error::OpenError;
use crate::geometry::Rect;
use crate::window::OsHandle;

/// The platform windowing layer.
pub trait WindowSystem: Send + Sync + 'static {
    /// Ask for a new top-level window. Construction completes later, when the
    /// frontend calls `OpenCoordinator::window_constructed`.
    fn request_window(&self);

    /// Move and resize an existing window.
    fn apply_frame(&self, window: OsHandle, frame: Rect);
}

pub trait Screen: Send + Sync + 'static {
    /// Area usable by windows (excluding menu bar and dock).
    fn visible_bounds(&self) -> Rect;
}

/// Archive and image decoding.
pub trait ImageSource: Send + Sync + 'static {
    /// Open `path`, returning its page count.
    fn open(&self, path: &str, password: Option<&str>) -> Result<usize, OpenError>;

    /// Stable identity of the file currently at `path`, compared against the
    /// key saved with a session. `None` when it cannot be computed.
    fn file_key(&self, path: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordChoice {
    Password(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityChoice {
    /// Open the file and keep the saved page.
    Continue,
    /// Open the file from its first page.
    StartOver,
    Cancelled,
}

/// Modal prompts shown while opening.
pub trait Dialogs: Send + Sync + 'static {
    fn prompt_password(&self, file_name: &str) -> PasswordChoice;

    /// The file at a saved path no longer matches the saved key.
    fn prompt_file_identity(&self, existing_key: &str, new_key: &str) -> IdentityChoice;
}

/// Bundle of collaborators handed to the coordinator.
#[derive(Clone)]
pub struct Host {
    pub window_system: Arc<dyn WindowSystem>,
    pub screen: Arc<dyn Screen>,
    pub image_source: Arc<dyn ImageSource>,
    pub dialogs: Arc<dyn Dialogs>,
}

impl Host {
    /// Use a single value that implements every collaborator trait.
    pub fn from_shared<T>(host: Arc<T>) -> Self
    where
        T: WindowSystem + Screen + ImageSource + Dialogs,
    {
        Self {
            window_system: host.clone(),
            screen: host.clone(),
            image_source: host.clone(),
            dialogs: host,
        }
    }
}
