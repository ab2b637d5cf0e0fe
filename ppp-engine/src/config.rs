//
// Copyright (c) The PPP Engine Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

/// Configuration of the `ppp` section.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Enables verbose logging of the PPP data path.
    pub verbose: bool,
    /// Upper bound on the pool of released kernel PPP units. Zero disables
    /// the pool.
    #[serde(rename = "unit-cache")]
    pub unit_cache: usize,
}

// ===== impl Config =====

impl Default for Config {
    fn default() -> Config {
        Config {
            verbose: false,
            unit_cache: 0,
        }
    }
}
