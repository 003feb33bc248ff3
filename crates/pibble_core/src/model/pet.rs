//! Pet model: the per-group health accumulator.
//!
//! # Invariants
//! - `0 <= health <= max_health` after every mutation.
//! - Out-of-range results are clamped, never rejected.
//! - All health mutation goes through [`Pet::adjust`].

use super::GroupId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PET_NAME: &str = "Pibble";
pub const DEFAULT_MAX_HEALTH: i32 = 10;

/// Shared health counter owned by one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub group_id: GroupId,
    pub name: String,
    health: i32,
    max_health: i32,
}

impl Pet {
    /// Creates a pet at full default health.
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            name: DEFAULT_PET_NAME.to_string(),
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
        }
    }

    /// Rebuilds a pet from stored values, clamping into range.
    pub fn from_parts(group_id: GroupId, name: String, health: i32, max_health: i32) -> Self {
        let max_health = max_health.max(0);
        Self {
            group_id,
            name,
            health: clamp_health(health, max_health),
            max_health,
        }
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    /// Applies `delta` and returns the new clamped health.
    pub fn adjust(&mut self, delta: i32) -> i32 {
        self.health = clamp_health(self.health.saturating_add(delta), self.max_health);
        self.health
    }
}

/// Clamps `value` into `[0, max_health]`.
pub fn clamp_health(value: i32, max_health: i32) -> i32 {
    value.clamp(0, max_health.max(0))
}
