//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod cache;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod ibus;
pub mod layer;
pub mod session;
pub mod tasks;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cache::UnitCache;
use crate::config::Config;
use crate::layer::LayerRegistry;

/// Shared state among all PPP sessions.
#[derive(Clone)]
pub struct Shared {
    /// Engine configuration, swapped as a whole on reload.
    pub config: Arc<ArcSwap<Config>>,
    /// Process-wide layer registry, frozen before sessions are served.
    pub layers: Arc<LayerRegistry>,
    /// Pool of released kernel PPP units.
    pub unit_cache: Arc<UnitCache>,
}

// ===== impl Shared =====

impl Shared {
    pub fn new(config: Config, layers: LayerRegistry) -> Shared {
        Shared {
            config: Arc::new(ArcSwap::from_pointee(config)),
            layers: Arc::new(layers),
            unit_cache: Arc::new(UnitCache::default()),
        }
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("config", &self.config)
            .field("unit_cache", &self.unit_cache)
            .finish()
    }
}
