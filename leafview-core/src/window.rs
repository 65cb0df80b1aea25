use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned when a window is constructed. Never reused within a
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub fn next() -> Self {
        Self(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuild an id that was previously handed across the FFI boundary.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// The windowing layer's own identifier for a window, available some time
/// after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OsHandle(pub u64);

/// Snapshot of a live window as tracked by the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowHandle {
    pub id: WindowId,
    pub os_handle: Option<OsHandle>,
    pub has_open_file: bool,
    pub frame: Rect,
    pub last_focus_notified_at: Option<Instant>,
}

impl WindowHandle {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            os_handle: None,
            has_open_file: false,
            frame: Rect::default(),
            last_focus_notified_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ids_are_unique_and_increasing() {
        let a = WindowId::next();
        let b = WindowId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn window_id_survives_raw_round_trip() {
        let id = WindowId::next();
        assert_eq!(WindowId::from_raw(id.as_u64()), id);
    }
}
