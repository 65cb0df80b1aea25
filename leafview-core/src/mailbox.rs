use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::barrier::{BatchId, RestoreEntry};
use crate::geometry::Rect;
use crate::ownership::OwnershipRegistry;
use crate::window::WindowId;

/// Identifies one posted request, so a waiter can tell whether the request
/// that reached a window is the one it posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Restore batch membership carried by a request opened as part of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSlot {
    pub batch: BatchId,
    /// Position of the entry in the saved session.
    pub index: usize,
    pub entry: RestoreEntry,
}

/// One pending "open this file" intent.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOpenRequest {
    pub id: RequestId,
    pub file_path: String,
    pub target_frame: Option<Rect>,
    pub is_session_restore: bool,
    pub force_new_window: bool,
    pub restore: Option<RestoreSlot>,
}

impl PendingOpenRequest {
    pub fn open(file_path: impl Into<String>, force_new_window: bool) -> Self {
        Self {
            id: RequestId::next(),
            file_path: file_path.into(),
            target_frame: None,
            is_session_restore: false,
            force_new_window,
            restore: None,
        }
    }

    /// Session restore requests always get a window of their own.
    pub fn restore(batch: BatchId, index: usize, entry: RestoreEntry) -> Self {
        Self {
            id: RequestId::next(),
            file_path: entry.file_path.clone(),
            target_frame: Some(entry.frame),
            is_session_restore: true,
            force_new_window: true,
            restore: Some(RestoreSlot {
                batch,
                index,
                entry,
            }),
        }
    }

    pub fn batch(&self) -> Option<BatchId> {
        self.restore.as_ref().map(|slot| slot.batch)
    }
}

/// Single-slot carrier for the pending open request.
#[derive(Debug, Default)]
pub struct HandoffMailbox {
    slot: Mutex<Option<PendingOpenRequest>>,
}

impl HandoffMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `request`, replacing any request nobody drained yet.
    pub fn put(&self, request: PendingOpenRequest) -> Option<PendingOpenRequest> {
        let replaced = self.slot.lock().replace(request);
        if let Some(old) = &replaced {
            log::debug!("Pending open of {} replaced before delivery", old.file_path);
        }
        replaced
    }

    /// Remove the request if `id` owns (or can claim) the ownership token.
    /// Non-owners get `None` and leave the slot for the owner.
    ///
    /// Lock order is always mailbox, then registry.
    pub fn take_if_owner(
        &self,
        id: WindowId,
        registry: &OwnershipRegistry,
    ) -> Option<PendingOpenRequest> {
        let mut slot = self.slot.lock();
        if slot.is_none() || !registry.claim_or_check(id) {
            return None;
        }
        slot.take()
    }

    pub fn peek(&self) -> Option<PendingOpenRequest> {
        self.slot.lock().clone()
    }

    /// Drop the pending request if it is still `id`, regardless of ownership.
    pub fn discard(&self, id: RequestId) -> Option<PendingOpenRequest> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|pending| pending.id == id) {
            slot.take()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_takes_and_non_owner_gets_nothing() {
        let registry = OwnershipRegistry::new();
        let mailbox = HandoffMailbox::new();
        let (w1, w2) = (WindowId::next(), WindowId::next());
        registry.assign(w1);

        let request = PendingOpenRequest::open("/comics/a.cbz", false);
        mailbox.put(request.clone());

        assert_eq!(mailbox.take_if_owner(w2, &registry), None);
        assert!(!mailbox.is_empty());
        assert_eq!(mailbox.take_if_owner(w1, &registry), Some(request));
        assert_eq!(mailbox.take_if_owner(w1, &registry), None);
    }

    #[test]
    fn concurrent_takers_deliver_exactly_once() {
        let registry = OwnershipRegistry::new();
        let mailbox = HandoffMailbox::new();
        let owner = WindowId::next();
        registry.assign(owner);
        mailbox.put(PendingOpenRequest::open("/comics/b.zip", false));

        let mut takers: Vec<WindowId> = (0..8).map(|_| WindowId::next()).collect();
        takers.push(owner);

        let delivered: Vec<(WindowId, PendingOpenRequest)> = std::thread::scope(|scope| {
            let handles: Vec<_> = takers
                .iter()
                .map(|&id| {
                    let (registry, mailbox) = (&registry, &mailbox);
                    scope.spawn(move || mailbox.take_if_owner(id, registry).map(|r| (id, r)))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, owner);
        assert_eq!(delivered[0].1.file_path, "/comics/b.zip");
        for id in takers {
            assert_eq!(mailbox.take_if_owner(id, &registry), None);
        }
    }

    #[test]
    fn unowned_taker_claims_then_drains() {
        let registry = OwnershipRegistry::new();
        let mailbox = HandoffMailbox::new();
        let id = WindowId::next();
        mailbox.put(PendingOpenRequest::open("/comics/c.rar", true));

        let taken = mailbox.take_if_owner(id, &registry);
        assert!(taken.is_some());
        assert!(registry.is_owner(id));
    }

    #[test]
    fn empty_mailbox_does_not_claim_ownership() {
        let registry = OwnershipRegistry::new();
        let mailbox = HandoffMailbox::new();
        let id = WindowId::next();

        assert_eq!(mailbox.take_if_owner(id, &registry), None);
        assert_eq!(registry.owner(), None);
    }

    #[test]
    fn last_writer_wins() {
        let mailbox = HandoffMailbox::new();
        mailbox.put(PendingOpenRequest::open("/first.cbz", false));
        let replaced = mailbox.put(PendingOpenRequest::open("/second.cbz", false));

        assert_eq!(replaced.map(|r| r.file_path), Some("/first.cbz".to_string()));
        assert_eq!(mailbox.peek().map(|r| r.file_path), Some("/second.cbz".to_string()));
    }

    #[test]
    fn restore_requests_force_a_new_window_and_carry_frame() {
        let entry = RestoreEntry {
            file_path: "/manga/vol1.cbz".into(),
            file_key: "abc".into(),
            current_page: 12,
            frame: Rect::new(10.0, 20.0, 300.0, 400.0),
            accessible: true,
        };
        let batch = BatchId::new();
        let request = PendingOpenRequest::restore(batch, 4, entry.clone());

        assert!(request.is_session_restore);
        assert_eq!(request.restore.as_ref().map(|slot| slot.index), Some(4));
        assert!(request.force_new_window);
        assert_eq!(request.target_frame, Some(entry.frame));
        assert_eq!(request.batch(), Some(batch));
    }

    #[test]
    fn discard_leaves_a_newer_request_alone() {
        let mailbox = HandoffMailbox::new();
        let first = PendingOpenRequest::open("/first.cbz", false);
        let first_id = first.id;
        mailbox.put(first);
        let second = PendingOpenRequest::open("/second.cbz", false);
        let second_id = second.id;
        mailbox.put(second);

        assert_eq!(mailbox.discard(first_id), None);
        assert!(!mailbox.is_empty());
        assert_eq!(
            mailbox.discard(second_id).map(|r| r.file_path),
            Some("/second.cbz".to_string())
        );
        assert!(mailbox.is_empty());
    }
}
