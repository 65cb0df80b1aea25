use parking_lot::Mutex;

use crate::window::WindowId;

/// Holds the single "who drains the next open request" token.
///
/// Every operation is one short critical section on the token; nothing here
/// waits on anything but the mutex.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    token: Mutex<Option<WindowId>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the token if nobody holds it. Returns whether `id` claimed it.
    pub fn try_claim(&self, id: WindowId) -> bool {
        let mut token = self.token.lock();
        if token.is_none() {
            *token = Some(id);
            log::debug!("Ownership claimed by {}", id);
            true
        } else {
            false
        }
    }

    pub fn is_owner(&self, id: WindowId) -> bool {
        *self.token.lock() == Some(id)
    }

    /// Clear the token, but only if `id` still holds it. Returns whether the
    /// token was cleared.
    pub fn release(&self, id: WindowId) -> bool {
        let mut token = self.token.lock();
        if *token == Some(id) {
            *token = None;
            log::debug!("Ownership released by {}", id);
            true
        } else {
            false
        }
    }

    /// Hand the token to a freshly constructed window, replacing any owner.
    pub fn assign(&self, id: WindowId) {
        let previous = self.token.lock().replace(id);
        if previous != Some(id) {
            log::debug!("Ownership assigned to {} (was {:?})", id, previous);
        }
    }

    pub fn owner(&self) -> Option<WindowId> {
        *self.token.lock()
    }

    /// Claim when unowned, then report whether `id` is the owner, all under
    /// one lock.
    pub(crate) fn claim_or_check(&self, id: WindowId) -> bool {
        let mut token = self.token.lock();
        match *token {
            Some(owner) => owner == id,
            None => {
                *token = Some(id);
                log::debug!("Ownership claimed by {}", id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let registry = OwnershipRegistry::new();
        let ids: Vec<WindowId> = (0..16).map(|_| WindowId::next()).collect();

        let winners: Vec<WindowId> = std::thread::scope(|scope| {
            let handles: Vec<_> = ids
                .iter()
                .map(|&id| {
                    let registry = &registry;
                    scope.spawn(move || registry.try_claim(id).then_some(id))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(winners.len(), 1);
        assert_eq!(registry.owner(), Some(winners[0]));
    }

    #[test]
    fn release_from_non_owner_keeps_token() {
        let registry = OwnershipRegistry::new();
        let owner = WindowId::next();
        let other = WindowId::next();

        assert!(registry.try_claim(owner));
        assert!(!registry.release(other));
        assert!(registry.is_owner(owner));
    }

    #[test]
    fn release_from_owner_clears_token() {
        let registry = OwnershipRegistry::new();
        let owner = WindowId::next();

        assert!(registry.try_claim(owner));
        assert!(registry.release(owner));
        assert_eq!(registry.owner(), None);
    }

    #[test]
    fn claim_fails_until_owner_releases() {
        let registry = OwnershipRegistry::new();
        let (w1, w2, w3) = (WindowId::next(), WindowId::next(), WindowId::next());

        assert!(registry.try_claim(w1));
        assert!(!registry.try_claim(w2));
        assert!(registry.is_owner(w1));

        registry.release(w1);
        assert!(registry.try_claim(w3));
        assert!(registry.is_owner(w3));
        assert!(!registry.is_owner(w2));
    }

    #[test]
    fn assign_replaces_current_owner() {
        let registry = OwnershipRegistry::new();
        let (old, new) = (WindowId::next(), WindowId::next());

        assert!(registry.try_claim(old));
        registry.assign(new);
        assert!(registry.is_owner(new));
        // A stale close from the old window must not clear the new owner.
        assert!(!registry.release(old));
        assert!(registry.is_owner(new));
    }

    #[test]
    fn claim_or_check_claims_only_when_unowned() {
        let registry = OwnershipRegistry::new();
        let (a, b) = (WindowId::next(), WindowId::next());

        assert!(registry.claim_or_check(a));
        assert!(registry.claim_or_check(a));
        assert!(!registry.claim_or_check(b));
    }
}
