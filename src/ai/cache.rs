use super::models::{AiResponse, ModelConfig};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One cached completion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: AiResponse,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    fn new(response: AiResponse) -> Self {
        let now = Utc::now();
        Self {
            response,
            created_at: now,
            hit_count: 0,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= 0 && age.num_seconds() as u64 >= ttl.as_secs()
    }
}

/// Fingerprint-keyed response cache with lazy expiry and single-flight
/// coordination for misses.
///
/// The entry lock is held only for map access; provider calls happen outside
/// it, serialized per fingerprint by the flight guards.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// 128-bit hex fingerprint of the canonical JSON encoding of the request
    /// parameters that determine the completion. `serde_json` maps are sorted
    /// by key, which gives the canonical ordering for free.
    pub fn fingerprint(prompt: &str, config: &ModelConfig) -> String {
        let canonical = serde_json::json!({
            "max_tokens": config.max_tokens,
            "model": config.model_name,
            "prompt": prompt,
            "temperature": config.temperature,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        hex::encode(&digest[..16])
    }

    /// Cached response if present and fresh. An expired hit removes the entry
    /// and reports a miss.
    pub async fn get(&self, fingerprint: &str) -> Option<AiResponse> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();

        match entries.get_mut(fingerprint) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                entry.hit_count += 1;
                entry.last_accessed = now;
                tracing::debug!(fingerprint = &fingerprint[..8], "cache hit");
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(fingerprint);
                tracing::debug!(fingerprint = &fingerprint[..8], "expired cache entry removed");
                None
            }
            None => None,
        }
    }

    /// Unconditionally install a response. Last write wins.
    pub async fn set(&self, fingerprint: &str, response: AiResponse) {
        let mut entries = self.entries.lock().await;
        entries.insert(fingerprint.to_string(), CacheEntry::new(response));
    }

    /// Remove all expired entries, returning how many were evicted.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Per-fingerprint guard ensuring at most one provider call is in flight
    /// for a given fingerprint. Callers lock the returned mutex, re-check the
    /// cache, and call [`Self::finish_flight`] once the entry is installed.
    pub async fn begin_flight(&self, fingerprint: &str) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        Arc::clone(
            flights
                .entry(fingerprint.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub async fn finish_flight(&self, fingerprint: &str) {
        let mut flights = self.flights.lock().await;
        flights.remove(fingerprint);
    }
}
