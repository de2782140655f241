//! User profile storage: static preferences and dynamic context.
//!
//! Both lists live in the key-value cache as JSON arrays, under separate
//! keys so that static expiry never takes the dynamic window with it.
//! Static preferences are a single value whose 7-day idle clock restarts
//! on every static write, duplicates included. The dynamic list has no
//! TTL; a fixed cap evicts its oldest entries instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::Profile;
use crate::ports::KvCache;

/// Upper bound on dynamic entries; the oldest is evicted first.
pub const DYNAMIC_CAP: usize = 20;

pub struct ProfileManager {
    kv: Arc<dyn KvCache>,
    static_key: String,
    dynamic_key: String,
    profile_ttl: Duration,
}

impl ProfileManager {
    pub fn new(kv: Arc<dyn KvCache>, config: &EngineConfig) -> Self {
        let prefix = config.key_prefix.as_str();
        Self {
            kv,
            static_key: format!("{prefix}:profile:static"),
            dynamic_key: format!("{prefix}:profile:dynamic"),
            profile_ttl: config.ttl.profile_ttl(),
        }
    }

    pub fn with_profile_ttl(mut self, ttl: Duration) -> Self {
        self.profile_ttl = ttl;
        self
    }

    /// Append one entry to the static or dynamic list.
    ///
    /// Entries are deduplicated by exact text. Concurrent writers race on
    /// read-modify-write; losing one entry under contention is accepted
    /// for this data.
    pub async fn add_preference(&self, text: &str, static_pref: bool) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::invalid_input("preference text must not be empty"));
        }
        if static_pref {
            self.append_static(text).await
        } else {
            self.append_dynamic(text).await
        }
    }

    /// Both lists, empty when absent or expired.
    pub async fn get_profile(&self) -> Result<Profile> {
        let static_prefs = self.read_list(&self.static_key).await?;
        let dynamic = self.read_list(&self.dynamic_key).await?;
        Ok(Profile {
            static_prefs,
            dynamic,
        })
    }

    async fn append_static(&self, text: &str) -> Result<()> {
        let mut prefs = self.read_list(&self.static_key).await?;
        if !prefs.iter().any(|p| p == text) {
            prefs.push(text.to_string());
        }
        // Rewriting the whole value restarts the expiry clock even when
        // the entry was already present.
        self.kv
            .set(
                &self.static_key,
                &serde_json::to_string(&prefs)?,
                Some(self.profile_ttl),
            )
            .await?;
        debug!(entries = prefs.len(), "static preferences updated");
        Ok(())
    }

    async fn append_dynamic(&self, text: &str) -> Result<()> {
        let mut entries = self.read_list(&self.dynamic_key).await?;
        if entries.iter().any(|e| e == text) {
            return Ok(());
        }
        entries.push(text.to_string());
        while entries.len() > DYNAMIC_CAP {
            entries.remove(0);
        }
        self.kv
            .set(&self.dynamic_key, &serde_json::to_string(&entries)?, None)
            .await?;
        debug!(entries = entries.len(), "dynamic context updated");
        Ok(())
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        match self.kv.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}
