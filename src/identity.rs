// src/identity.rs

//! Process-wide cache of persona name → identity vector.
//!
//! Population is stampede-safe: at most one in-flight embedding computation
//! per name, with every concurrent resolver for that name subscribing to
//! the same result. Distinct names populate independently and in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, Result};
use crate::profile::ProfileRepository;

pub type IdentityVector = Arc<Vec<f32>>;

/// Outcome fanned out to waiters. The error side is a plain reason string
/// so it can be cloned into an `IdentityResolution` per waiter.
type PopulationOutcome = std::result::Result<IdentityVector, String>;

enum Slot {
    Ready(IdentityVector),
    InFlight {
        token: u64,
        rx: watch::Receiver<Option<PopulationOutcome>>,
    },
}

pub struct IdentityCache {
    provider: Arc<dyn EmbeddingProvider>,
    profiles: Arc<ProfileRepository>,
    // Guarded map, never held across an await. Plain std lock so the
    // cancellation guard can clean up from Drop.
    slots: RwLock<HashMap<String, Slot>>,
    next_token: AtomicU64,
}

impl IdentityCache {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, profiles: Arc<ProfileRepository>) -> Self {
        Self {
            provider,
            profiles,
            slots: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Resolve a persona's identity vector, computing and persisting it on
    /// first use. All concurrent callers for the same name observe the same
    /// `Arc`; a failed population leaves the name absent, never stuck.
    pub async fn resolve(&self, name: &str) -> Result<IdentityVector> {
        loop {
            // Fast path: ready hit, or an in-flight population to join.
            let waiter = {
                let slots = self.slots.read().expect("identity cache lock poisoned");
                match slots.get(name) {
                    Some(Slot::Ready(v)) => return Ok(v.clone()),
                    Some(Slot::InFlight { rx, .. }) => Some(rx.clone()),
                    None => None,
                }
            };

            if let Some(rx) = waiter {
                return Self::await_population(name, rx).await;
            }

            // Install an in-flight slot, double-checking under the write
            // lock; a racing resolver may have beaten us here.
            let (tx, token) = {
                let mut slots = self.slots.write().expect("identity cache lock poisoned");
                match slots.get(name) {
                    Some(Slot::Ready(v)) => return Ok(v.clone()),
                    Some(Slot::InFlight { .. }) => continue,
                    None => {
                        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(None);
                        slots.insert(name.to_string(), Slot::InFlight { token, rx });
                        (tx, token)
                    }
                }
            };

            // We own the population. The guard returns the key to absent if
            // this future is dropped mid-flight (caller timeout/cancel).
            let guard = PopulationGuard {
                cache: self,
                name: name.to_string(),
                token,
                armed: true,
            };
            let result = self.populate(name, token).await;
            return self.finalize(guard, tx, result);
        }
    }

    /// Evict any cached or in-flight entry so the next resolve recomputes.
    /// Call after `put_profile`.
    pub fn invalidate(&self, name: &str) {
        let mut slots = self.slots.write().expect("identity cache lock poisoned");
        if slots.remove(name).is_some() {
            debug!(persona = %name, "identity cache entry invalidated");
        }
    }

    async fn await_population(
        name: &str,
        mut rx: watch::Receiver<Option<PopulationOutcome>>,
    ) -> Result<IdentityVector> {
        let outcome = match rx.wait_for(|v| v.is_some()).await {
            Ok(value) => (*value).clone().expect("checked is_some"),
            // Sender dropped without a result: the population was
            // cancelled. Equivalent to the failure path.
            Err(_) => Err("identity population cancelled".to_string()),
        };
        outcome.map_err(|reason| EngineError::IdentityResolution {
            persona: name.to_string(),
            reason,
        })
    }

    /// Whether the in-flight slot for `name` still belongs to `token`.
    fn owns_slot(&self, name: &str, token: u64) -> bool {
        let slots = self.slots.read().expect("identity cache lock poisoned");
        matches!(
            slots.get(name),
            Some(Slot::InFlight { token: t, .. }) if *t == token
        )
    }

    /// Load the persisted vector, or compute it from the profile body and
    /// persist it. Recomputation also covers a persisted vector whose
    /// dimension no longer matches the provider.
    async fn populate(&self, name: &str, token: u64) -> Result<IdentityVector> {
        let profile = self.profiles.get_profile(name).await?;

        if let Some(vector) = self.profiles.load_identity_vector(name).await? {
            if vector.len() == self.provider.dimension() {
                debug!(persona = %name, "identity vector loaded from disk");
                return Ok(Arc::new(vector));
            }
            warn!(
                persona = %name,
                found = vector.len(),
                expected = self.provider.dimension(),
                "persisted identity vector has wrong dimension, recomputing"
            );
        }

        let vector = self.provider.embed(&profile.body).await?;

        // Persist only while this population still owns its slot. A profile
        // rewrite mid-flight already deleted the superseded vector file;
        // writing ours back would hand the next resolve an embedding of the
        // old text. If ownership is lost during the write itself, take the
        // file back out.
        if self.owns_slot(name, token) {
            self.profiles.store_identity_vector(name, &vector).await?;
            if !self.owns_slot(name, token) {
                self.profiles.remove_identity_vector(name).await?;
            }
            debug!(persona = %name, dims = vector.len(), "identity vector computed");
        } else {
            debug!(persona = %name, "population superseded, skipping persistence");
        }
        Ok(Arc::new(vector))
    }

    fn finalize(
        &self,
        mut guard: PopulationGuard<'_>,
        tx: watch::Sender<Option<PopulationOutcome>>,
        result: Result<IdentityVector>,
    ) -> Result<IdentityVector> {
        guard.armed = false;

        let mut slots = self.slots.write().expect("identity cache lock poisoned");
        let still_ours = matches!(
            slots.get(&guard.name),
            Some(Slot::InFlight { token, .. }) if *token == guard.token
        );

        match result {
            Ok(vector) => {
                if still_ours {
                    slots.insert(guard.name.clone(), Slot::Ready(vector.clone()));
                }
                // If the slot changed under us, a put_profile invalidated
                // this population; waiters still get the vector they asked
                // for, but it is not cached.
                let _ = tx.send(Some(Ok(vector.clone())));
                Ok(vector)
            }
            Err(e) => {
                if still_ours {
                    slots.remove(&guard.name);
                }
                let e = e.into_identity_failure(&guard.name);
                let _ = tx.send(Some(Err(e.to_string())));
                Err(e)
            }
        }
    }
}

/// Clears the in-flight slot if the owning population future is dropped
/// before finalizing, so the key returns to absent instead of wedging.
struct PopulationGuard<'a> {
    cache: &'a IdentityCache,
    name: String,
    token: u64,
    armed: bool,
}

impl Drop for PopulationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut slots) = self.cache.slots.write() {
            if matches!(
                slots.get(&self.name),
                Some(Slot::InFlight { token, .. }) if *token == self.token
            ) {
                slots.remove(&self.name);
            }
        }
    }
}
