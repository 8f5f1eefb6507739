//! Process-wide configuration for the graph engine.

use std::env;

const MASK_ENV_VAR: &str = "HCCL_PRIM_COLLECTIVE_MASK";
const DEFAULT_MASK: u32 = 0;

/// Layered runtime configuration.
///
/// Only one knob exists today: which collectives the primitive-graph dispatcher is permitted to
/// route through its `primitive_methods` overlay (see [`crate::dispatch`]) rather than the
/// built-in `graph_methods` table. A bitmask keyed by [`crate::types::CollectiveOp`] as its
/// discriminant, read once from the environment and overridable in tests via [`GraphConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    pub primitive_collective_mask: u32,
}

impl GraphConfig {
    pub fn new(primitive_collective_mask: u32) -> Self {
        GraphConfig {
            primitive_collective_mask,
        }
    }

    /// Resolves configuration from the environment. `HCCL_PRIM_COLLECTIVE_MASK` is parsed as a
    /// `u32`; an unset or unparseable value falls back to the default (`0`, meaning no collective
    /// uses the primitive overlay) and is logged at `warn!` rather than treated as fatal, since
    /// configuration is an external, recoverable boundary, unlike the graph's construction-time
    /// invariants.
    pub fn from_env() -> Self {
        let mask = match env::var(MASK_ENV_VAR) {
            Ok(raw) => match raw.parse::<u32>() {
                Ok(mask) => mask,
                Err(err) => {
                    tracing::warn!(value = %raw, %err, "invalid {MASK_ENV_VAR}, falling back to default");
                    DEFAULT_MASK
                }
            },
            Err(_) => DEFAULT_MASK,
        };
        GraphConfig {
            primitive_collective_mask: mask,
        }
    }

    pub fn allows(&self, op_bit: u32) -> bool {
        self.primitive_collective_mask & op_bit != 0
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig::new(DEFAULT_MASK)
    }
}
