//! Positive-only in-process cache of confirmed-banned user ids.
//!
//! The cache only ever asserts "this id was seen banned"; absence proves
//! nothing and the store must still be consulted. Entries never expire on
//! their own — within one process a cached hit stays a hit until `remove`
//! is called by the unban path.

use std::collections::HashSet;
use std::sync::Mutex;

use bcommon::UserId;

use crate::StoreError;

#[derive(Debug, Default)]
pub struct BanCache {
    ids: Mutex<HashSet<UserId>>,
}

impl BanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.lock()?.contains(&user_id))
    }

    pub fn insert(&self, user_id: UserId) -> Result<(), StoreError> {
        self.lock()?.insert(user_id);
        Ok(())
    }

    pub fn remove(&self, user_id: UserId) -> Result<(), StoreError> {
        self.lock()?.remove(&user_id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashSet<UserId>>, StoreError> {
        self.ids
            .lock()
            .map_err(|_| StoreError::storage("ban cache lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_remove_evicts() {
        let cache = BanCache::new();
        let user = UserId::new(5);

        assert!(!cache.contains(user).expect("contains"));
        cache.insert(user).expect("insert");
        cache.insert(user).expect("insert twice");
        assert!(cache.contains(user).expect("contains"));

        cache.remove(user).expect("remove");
        assert!(!cache.contains(user).expect("contains"));
    }
}
