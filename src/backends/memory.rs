//! In-process stand-in for Redis used by the store tests.
//!
//! TTLs are stored but never count down and keys never expire, so tests see
//! exactly the TTL that was last written.

use super::{RemoteStore, StoreError};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryStore {
    pub reachable:   Cell<bool>,
    pub fail_writes: Cell<bool>,
    /// key -> (value, ttl seconds; None = no expiry)
    entries: RefCell<BTreeMap<String, (String, Option<u64>)>>,
}

impl MemoryStore {
    pub fn up() -> Self {
        let s = Self::default();
        s.reachable.set(true);
        s
    }

    pub fn down() -> Self {
        Self::default()
    }

    /// Insert without expiry, as a key written by some other tool would be.
    pub fn insert_persistent(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(key.into(), (value.into(), None));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn online(&self) -> Result<(), StoreError> {
        if self.reachable.get() {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store is down".into()))
        }
    }

    fn writable(&self) -> Result<(), StoreError> {
        self.online()?;
        if self.fail_writes.get() {
            return Err(StoreError::Command("READONLY You can't write against a read only replica.".into()));
        }
        Ok(())
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None)            => true,
        (Some(b'*'), _)         => glob_match(&pattern[1..], text)
                                   || (!text.is_empty() && glob_match(pattern, &text[1..])),
        (Some(b'?'), Some(_))   => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t))      => p == t && glob_match(&pattern[1..], &text[1..]),
        _                       => false,
    }
}

impl RemoteStore for MemoryStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.online()
    }

    fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.writable()?;
        self.entries.borrow_mut().insert(key.into(), (value.into(), Some(ttl_secs)));
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.online()?;
        Ok(self.entries.borrow().contains_key(key))
    }

    fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.writable()?;
        Ok(self.entries.borrow_mut().remove(key).map_or(0, |_| 1))
    }

    fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.online()?;
        Ok(self.entries.borrow().keys()
            .filter(|k| glob_match(pattern.as_bytes(), k.as_bytes()))
            .cloned()
            .collect())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.online()?;
        Ok(self.entries.borrow().get(key).map(|(v, _)| v.clone()))
    }

    fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.online()?;
        Ok(match self.entries.borrow().get(key) {
            None                 => -2,
            Some((_, None))      => -1,
            Some((_, Some(ttl))) => *ttl as i64,
        })
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        self.writable()?;
        Ok(match self.entries.borrow_mut().get_mut(key) {
            Some(entry) => { entry.1 = Some(ttl_secs); true }
            None        => false,
        })
    }
}
