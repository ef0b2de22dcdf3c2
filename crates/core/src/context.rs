// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::clock::Clock;
use crate::config_store::{ConfigStore, DEFAULT_CONFIG_TTL};
use crate::store::LedgerStore;
use std::sync::Arc;
use time::OffsetDateTime;

/// Shared handles every engine component is built from.
pub struct EngineContext<S> {
    pub store: Arc<S>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ConfigStore<S>>,
}

impl<S> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: LedgerStore> EngineContext<S> {
    /// Builds a context with a config cache using the default TTL.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let config: Arc<ConfigStore<S>> = Arc::new(ConfigStore::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            DEFAULT_CONFIG_TTL,
        ));
        Self {
            store,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}
