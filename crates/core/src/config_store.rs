// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::audit_log::{record_audit_event, snapshot};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::store::LedgerStore;
use affilink_audit::{Actor, EntityRef};
use affilink_domain::{AffiliateConfig, ConfigUpdate};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

/// How long a loaded config is served from the cache.
pub const DEFAULT_CONFIG_TTL: Duration = Duration::minutes(5);

#[derive(Debug, Clone)]
struct CachedConfig {
    config: Arc<AffiliateConfig>,
    loaded_at: OffsetDateTime,
}

/// Owner of the versioned `AffiliateConfig` document.
///
/// Reads are served from a TTL cache; `update_config` writes through and
/// invalidates it.
pub struct ConfigStore<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    cache: RwLock<Option<CachedConfig>>,
}

/// Fields of the config recorded in audit snapshots.
#[derive(Serialize)]
struct ConfigSummary<'a> {
    version: u64,
    is_system_active: bool,
    rates: &'a affilink_domain::RateCard,
    hold_period_hours: u32,
    release_delay_hours: u32,
}

impl<'a> From<&'a AffiliateConfig> for ConfigSummary<'a> {
    fn from(config: &'a AffiliateConfig) -> Self {
        Self {
            version: config.version,
            is_system_active: config.is_system_active,
            rates: &config.rates,
            hold_period_hours: config.hold_period_hours,
            release_delay_hours: config.release_delay_hours,
        }
    }
}

impl<S: LedgerStore> ConfigStore<S> {
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Returns the current config.
    ///
    /// Served from the cache while it is younger than the TTL. The default
    /// config is seeded into the store on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get_config(&self) -> Result<Arc<AffiliateConfig>, CoreError> {
        let now: OffsetDateTime = self.clock.now();
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            && now - cached.loaded_at < self.ttl
        {
            return Ok(Arc::clone(&cached.config));
        }

        let config: AffiliateConfig = self.store.run_transaction(|tx| -> Result<_, CoreError> {
            if let Some(config) = tx.config()? {
                return Ok(config);
            }
            let seeded: AffiliateConfig = AffiliateConfig::default();
            tx.put_config(&seeded)?;
            info!(version = seeded.version, "Seeded default affiliate config");
            Ok(seeded)
        })?;
        debug!(version = config.version, "Loaded affiliate config");

        let config: Arc<AffiliateConfig> = Arc::new(config);
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(CachedConfig {
            config: Arc::clone(&config),
            loaded_at: now,
        });
        Ok(config)
    }

    /// Applies a partial update and returns the new config.
    ///
    /// # Arguments
    ///
    /// * `update` - The fields to change
    /// * `actor` - The administrator making the change
    /// * `reason` - Why the change was made
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` for an empty reason, a domain
    /// error if the update is empty or invalid, or a store error.
    pub fn update_config(
        &self,
        update: &ConfigUpdate,
        actor: &Actor,
        reason: &str,
    ) -> Result<AffiliateConfig, CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::InvalidArgument(String::from(
                "a reason is required to change the config",
            )));
        }
        let now: OffsetDateTime = self.clock.now();
        let updated: AffiliateConfig = self.store.run_transaction(|tx| -> Result<_, CoreError> {
            let mut config: AffiliateConfig = tx.config()?.unwrap_or_default();
            let before = snapshot(&ConfigSummary::from(&config));
            config.apply_update(update.clone(), &actor.id, reason, now)?;
            tx.put_config(&config)?;
            record_audit_event(
                tx,
                EntityRef::new("config", "affiliate"),
                actor,
                reason,
                "UpdateConfig",
                Some(format!("version {}", config.version)),
                before,
                snapshot(&ConfigSummary::from(&config)),
                now,
            )?;
            Ok(config)
        })?;
        self.invalidate();
        info!(
            version = updated.version,
            actor = %actor.id,
            "Updated affiliate config"
        );
        Ok(updated)
    }

    /// Drops the cached config so the next read goes to the store.
    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
