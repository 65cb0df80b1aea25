use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::controller::WindowCommand;
use crate::geometry::Rect;
use crate::ownership::OwnershipRegistry;
use crate::window::{OsHandle, WindowHandle, WindowId};

struct WindowRecord {
    handle: WindowHandle,
    /// Resolved once by `set_os_handle`; dropping it wakes waiters with `None`.
    os_handle_tx: watch::Sender<Option<OsHandle>>,
    commands: mpsc::UnboundedSender<WindowCommand>,
    registered_seq: u64,
}

#[derive(Default)]
struct DirectoryState {
    windows: HashMap<WindowId, WindowRecord>,
    active: Option<OsHandle>,
    next_seq: u64,
}

impl DirectoryState {
    fn find_by_os_handle(&mut self, os_handle: OsHandle) -> Option<&mut WindowRecord> {
        self.windows
            .values_mut()
            .find(|record| record.handle.os_handle == Some(os_handle))
    }
}

/// Registry of live windows.
pub struct WindowDirectory {
    state: Mutex<DirectoryState>,
    ownership: Arc<OwnershipRegistry>,
    focus_debounce: Duration,
}

impl WindowDirectory {
    pub fn new(ownership: Arc<OwnershipRegistry>, focus_debounce: Duration) -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            ownership,
            focus_debounce,
        }
    }

    /// Track a constructed window. `commands` reaches the window's controller.
    pub fn register(&self, id: WindowId, commands: mpsc::UnboundedSender<WindowCommand>) {
        let mut state = self.state.lock();
        let registered_seq = state.next_seq;
        state.next_seq += 1;
        let (os_handle_tx, _) = watch::channel(None);
        state.windows.insert(
            id,
            WindowRecord {
                handle: WindowHandle::new(id),
                os_handle_tx,
                commands,
                registered_seq,
            },
        );
        log::debug!("Window {} registered", id);
    }

    /// Forget a closed window and release its ownership claim. Returns the
    /// command channel so the caller can tell the controller to stop.
    pub fn deregister(&self, id: WindowId) -> Option<mpsc::UnboundedSender<WindowCommand>> {
        let record = {
            let mut state = self.state.lock();
            let record = state.windows.remove(&id)?;
            if record.handle.os_handle.is_some() && state.active == record.handle.os_handle {
                state.active = None;
            }
            record
        };
        self.ownership.release(id);
        log::debug!("Window {} deregistered", id);
        Some(record.commands)
    }

    /// Record the OS handle once the windowing layer has created the window.
    pub fn set_os_handle(&self, id: WindowId, os_handle: OsHandle) -> bool {
        let mut state = self.state.lock();
        match state.windows.get_mut(&id) {
            Some(record) => {
                record.handle.os_handle = Some(os_handle);
                record.os_handle_tx.send_replace(Some(os_handle));
                true
            }
            None => {
                log::warn!("OS handle {:?} arrived for unknown window {}", os_handle, id);
                false
            }
        }
    }

    /// Wait for `id`'s OS handle, for at most `max_attempts * interval`.
    ///
    /// Wakes as soon as the handle is set rather than on a polling tick.
    /// Returns `None` when the budget runs out or the window goes away.
    pub async fn await_os_handle(
        &self,
        id: WindowId,
        max_attempts: u32,
        interval: Duration,
    ) -> Option<OsHandle> {
        let mut rx = {
            let state = self.state.lock();
            state.windows.get(&id)?.os_handle_tx.subscribe()
        };
        let budget = interval.saturating_mul(max_attempts);
        let wait = async {
            match rx.wait_for(Option::is_some).await {
                Ok(handle) => *handle,
                Err(_) => None,
            }
        };
        match tokio::time::timeout(budget, wait).await {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("Window {} has no OS handle after {:?}", id, budget);
                None
            }
        }
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.state.lock().windows.contains_key(&id)
    }

    pub fn handle(&self, id: WindowId) -> Option<WindowHandle> {
        self.state.lock().windows.get(&id).map(|r| r.handle.clone())
    }

    pub fn os_handle(&self, id: WindowId) -> Option<OsHandle> {
        self.state.lock().windows.get(&id)?.handle.os_handle
    }

    pub fn has_open_file(&self, id: WindowId) -> Option<bool> {
        self.state
            .lock()
            .windows
            .get(&id)
            .map(|r| r.handle.has_open_file)
    }

    pub fn set_has_open_file(&self, id: WindowId, has_open_file: bool) {
        if let Some(record) = self.state.lock().windows.get_mut(&id) {
            record.handle.has_open_file = has_open_file;
        }
    }

    pub fn set_frame(&self, id: WindowId, frame: Rect) {
        if let Some(record) = self.state.lock().windows.get_mut(&id) {
            record.handle.frame = frame;
        }
    }

    pub fn sender(&self, id: WindowId) -> Option<mpsc::UnboundedSender<WindowCommand>> {
        self.state.lock().windows.get(&id).map(|r| r.commands.clone())
    }

    pub fn window_ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.state.lock().windows.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.state.lock().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recently registered live window.
    pub fn most_recent(&self) -> Option<WindowId> {
        self.state
            .lock()
            .windows
            .iter()
            .max_by_key(|(_, record)| record.registered_seq)
            .map(|(id, _)| *id)
    }

    // ── Focus ────────────────────────────────────────────────────────────

    pub fn mark_active(&self, os_handle: OsHandle) {
        self.state.lock().active = Some(os_handle);
    }

    pub fn active_window(&self) -> Option<WindowId> {
        let mut state = self.state.lock();
        let active = state.active?;
        state.find_by_os_handle(active).map(|r| r.handle.id)
    }

    /// Whether a focus refresh for `os_handle` should go out at `now`.
    /// Records `now` when it does.
    pub fn should_notify_focus(&self, os_handle: OsHandle, now: Instant) -> bool {
        let debounce = self.focus_debounce;
        let mut state = self.state.lock();
        let Some(record) = state.find_by_os_handle(os_handle) else {
            return false;
        };
        let due = match record.handle.last_focus_notified_at {
            Some(last) => now.saturating_duration_since(last) >= debounce,
            None => true,
        };
        if due {
            record.handle.last_focus_notified_at = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn directory() -> (WindowDirectory, Arc<OwnershipRegistry>) {
        let ownership = Arc::new(OwnershipRegistry::new());
        (WindowDirectory::new(ownership.clone(), DEBOUNCE), ownership)
    }

    fn register(directory: &WindowDirectory) -> WindowId {
        let id = WindowId::next();
        let (tx, _rx) = mpsc::unbounded_channel();
        directory.register(id, tx);
        id
    }

    #[tokio::test(start_paused = true)]
    async fn os_handle_set_later_wakes_waiter() {
        let (directory, _) = directory();
        let directory = Arc::new(directory);
        let id = register(&directory);

        let setter = directory.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.set_os_handle(id, OsHandle(77));
        });

        let handle = directory
            .await_os_handle(id, 10, Duration::from_millis(20))
            .await;
        assert_eq!(handle, Some(OsHandle(77)));
    }

    #[tokio::test(start_paused = true)]
    async fn os_handle_that_never_arrives_times_out() {
        let (directory, _) = directory();
        let id = register(&directory);

        let started = tokio::time::Instant::now();
        let handle = directory
            .await_os_handle(id, 5, Duration::from_millis(20))
            .await;
        assert_eq!(handle, None);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn already_set_handle_returns_immediately_even_with_zero_budget() {
        let (directory, _) = directory();
        let id = register(&directory);
        directory.set_os_handle(id, OsHandle(5));

        assert_eq!(
            directory.await_os_handle(id, 0, Duration::from_millis(20)).await,
            Some(OsHandle(5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn closing_window_wakes_waiter_with_none() {
        let (directory, _) = directory();
        let directory = Arc::new(directory);
        let id = register(&directory);

        let closer = directory.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.deregister(id);
        });

        let started = tokio::time::Instant::now();
        let handle = directory
            .await_os_handle(id, 100, Duration::from_millis(100))
            .await;
        assert_eq!(handle, None);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unknown_window_has_no_handle() {
        let (directory, _) = directory();
        assert_eq!(
            directory
                .await_os_handle(WindowId::next(), 3, Duration::from_millis(1))
                .await,
            None
        );
    }

    #[test]
    fn deregister_releases_only_its_own_ownership() {
        let (directory, ownership) = directory();
        let a = register(&directory);
        let b = register(&directory);

        ownership.assign(b);
        directory.deregister(a);
        assert!(ownership.is_owner(b));

        directory.deregister(b);
        assert_eq!(ownership.owner(), None);
        assert!(directory.is_empty());
    }

    #[test]
    fn focus_notifications_are_debounced_per_window() {
        let (directory, _) = directory();
        let a = register(&directory);
        let b = register(&directory);
        directory.set_os_handle(a, OsHandle(1));
        directory.set_os_handle(b, OsHandle(2));

        let t0 = Instant::now();
        assert!(directory.should_notify_focus(OsHandle(1), t0));
        assert!(!directory.should_notify_focus(OsHandle(1), t0 + Duration::from_millis(100)));
        assert!(directory.should_notify_focus(OsHandle(2), t0 + Duration::from_millis(100)));
        assert!(!directory.should_notify_focus(OsHandle(1), t0 + Duration::from_millis(499)));
        assert!(directory.should_notify_focus(OsHandle(1), t0 + Duration::from_millis(500)));
        assert_eq!(
            directory.handle(a).unwrap().last_focus_notified_at,
            Some(t0 + Duration::from_millis(500))
        );
    }

    #[test]
    fn focus_for_unknown_handle_is_ignored() {
        let (directory, _) = directory();
        assert!(!directory.should_notify_focus(OsHandle(404), Instant::now()));
    }

    #[test]
    fn active_window_follows_focus_and_clears_on_close() {
        let (directory, _) = directory();
        let a = register(&directory);
        directory.set_os_handle(a, OsHandle(9));

        directory.mark_active(OsHandle(9));
        assert_eq!(directory.active_window(), Some(a));

        directory.deregister(a);
        assert_eq!(directory.active_window(), None);
    }

    #[test]
    fn most_recent_tracks_registration_order() {
        let (directory, _) = directory();
        let a = register(&directory);
        let b = register(&directory);
        assert_eq!(directory.most_recent(), Some(b));

        directory.deregister(b);
        assert_eq!(directory.most_recent(), Some(a));
    }
}
