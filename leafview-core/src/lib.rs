pub mod barrier;
pub mod controller;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod events;
pub mod geometry;
pub mod host;
pub mod mailbox;
pub mod ownership;
pub mod settings;
pub mod window;

pub use barrier::{BatchId, LoadOutcome, RestoreBarrier, RestoreEntry, RevealEvent};
pub use coordinator::OpenCoordinator;
pub use error::{CoordinatorError, OpenError};
pub use events::CoordinatorEvent;
pub use geometry::Rect;
pub use window::{OsHandle, WindowId};
