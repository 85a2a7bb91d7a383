use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::errors::DomainError;
use crate::wizard::draft::Draft;

/// Per-user drafts, shared by every handler task.
///
/// Writes are last-write-wins per user. `update` works on a copy and only commits it when
/// the closure succeeds, so a rejected field never leaves a half-applied draft behind.
#[derive(Clone, Default)]
pub struct SessionTable {
    drafts: Arc<Mutex<HashMap<String, Draft>>>,
}

impl SessionTable {
    /// Stores a fresh draft, returning the one it replaced.
    pub fn start(&self, draft: Draft) -> Option<Draft> {
        self.lock().insert(draft.user_id.clone(), draft)
    }

    pub fn get(&self, user_id: &str) -> Option<Draft> {
        self.lock().get(user_id).cloned()
    }

    pub fn require(&self, user_id: &str) -> Result<Draft, DomainError> {
        self.get(user_id).ok_or(DomainError::SessionExpired)
    }

    pub fn update<T, F>(&self, user_id: &str, change: F) -> Result<(T, Draft), DomainError>
    where
        F: FnOnce(&mut Draft) -> Result<T, DomainError>,
    {
        let mut drafts = self.lock();
        let current = drafts.get(user_id).ok_or(DomainError::SessionExpired)?;
        let mut candidate = current.clone();
        let value = change(&mut candidate)?;
        candidate.last_active = Utc::now();
        drafts.insert(user_id.to_owned(), candidate.clone());
        Ok((value, candidate))
    }

    /// Removes the draft only when `check` accepts it, so two confirms cannot both take it.
    pub fn take_if<T, F>(&self, user_id: &str, check: F) -> Result<(T, Draft), DomainError>
    where
        F: FnOnce(&Draft) -> Result<T, DomainError>,
    {
        let mut drafts = self.lock();
        let current = drafts.get(user_id).ok_or(DomainError::SessionExpired)?;
        let value = check(current)?;
        let draft = drafts.remove(user_id).ok_or(DomainError::SessionExpired)?;
        Ok((value, draft))
    }

    pub fn remove(&self, user_id: &str) -> Option<Draft> {
        self.lock().remove(user_id)
    }

    /// Drops every draft with no committed change since `now - idle` and returns them.
    pub fn expire_idle(&self, now: DateTime<Utc>, idle: Duration) -> Vec<Draft> {
        let cutoff = now - idle;
        let mut drafts = self.lock();
        let stale: Vec<String> = drafts
            .iter()
            .filter(|(_, draft)| draft.last_active <= cutoff)
            .map(|(user_id, _)| user_id.clone())
            .collect();
        stale.iter().filter_map(|user_id| drafts.remove(user_id)).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Draft>> {
        match self.drafts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
