//! Level curve.
//!
//! Cumulative XP thresholds per level, starting at level 1 with threshold 0.
//! Everything here is integer arithmetic over a fixed table.

use serde::{Deserialize, Serialize};

/// Cumulative XP required to reach each level; index `n` holds level `n + 1`.
pub const LEVEL_THRESHOLDS: [u64; 20] = [
    0, 100, 500, 1_500, 3_000, 5_000, 7_500, 10_500, 14_000, 18_000, 22_500, 27_500, 33_000,
    39_000, 45_500, 52_500, 60_000, 68_000, 76_500, 85_500,
];

/// Highest level defined by [`LEVEL_THRESHOLDS`].
pub const MAX_LEVEL: u32 = 20;

/// XP added past the last threshold to keep progression open-ended.
pub const OPEN_ENDED_INCREMENT: u64 = 10_000;

/// Result of comparing the level before and after an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    /// Level before the award.
    pub old_level: u32,
    /// Level after the award.
    pub new_level: u32,
    /// Whether `new_level > old_level`.
    pub leveled_up: bool,
}

/// Highest level whose threshold is `<= xp`. Never extrapolates past [`MAX_LEVEL`].
#[must_use]
pub fn level_of(xp: u64) -> u32 {
    let reached = LEVEL_THRESHOLDS
        .iter()
        .take_while(|threshold| **threshold <= xp)
        .count();
    u32::try_from(reached).map_or(MAX_LEVEL, |level| level.clamp(1, MAX_LEVEL))
}

/// Cumulative XP needed to reach `level + 1`.
///
/// Levels below 1 are treated as 1; the last level (and anything above it)
/// reports its own threshold plus [`OPEN_ENDED_INCREMENT`].
#[must_use]
pub fn threshold_for(level: u32) -> u64 {
    let level = level.max(1);
    usize::try_from(level)
        .ok()
        .and_then(|next_index| LEVEL_THRESHOLDS.get(next_index).copied())
        .unwrap_or(LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1] + OPEN_ENDED_INCREMENT)
}

/// Compare levels for `old_xp` and `new_xp`.
#[must_use]
pub fn check_level_up(old_xp: u64, new_xp: u64) -> LevelChange {
    let old_level = level_of(old_xp);
    let new_level = level_of(new_xp);
    LevelChange {
        old_level,
        new_level,
        leveled_up: new_level > old_level,
    }
}
