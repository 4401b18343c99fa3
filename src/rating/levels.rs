//! XP to level mapping

use crate::config::rating::MAX_LEVEL;
use serde::{Deserialize, Serialize};

/// Where a player sits inside their current level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankProgress {
    pub level: u8,
    /// XP earned since reaching `level`
    pub xp_into_level: i64,
    /// XP still needed for the next level, `None` at the top level
    pub xp_to_next: Option<i64>,
}

/// Monotonic table of minimum XP per level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<i64>,
}

impl LevelTable {
    /// Thresholds must already be validated: ascending, first entry 0
    pub fn new(thresholds: &[i64]) -> Self {
        Self {
            thresholds: thresholds.to_vec(),
        }
    }

    /// Level for a cumulative XP total
    pub fn level_for(&self, xp: i64) -> u8 {
        let reached = self.thresholds.partition_point(|&min| min <= xp);
        reached.clamp(1, MAX_LEVEL) as u8
    }

    pub fn progress(&self, xp: i64) -> RankProgress {
        let level = self.level_for(xp);
        let floor = self.thresholds[level as usize - 1];
        let xp_to_next = self
            .thresholds
            .get(level as usize)
            .map(|next| next - xp.max(floor));
        RankProgress {
            level,
            xp_into_level: xp.max(floor) - floor,
            xp_to_next,
        }
    }

    pub fn max_level(&self) -> u8 {
        self.thresholds.len() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rating::default_level_thresholds;

    fn table() -> LevelTable {
        LevelTable::new(&default_level_thresholds())
    }

    #[test]
    fn test_level_boundaries() {
        let levels = table();
        assert_eq!(levels.level_for(0), 1);
        assert_eq!(levels.level_for(88), 1);
        assert_eq!(levels.level_for(89), 2);
        assert_eq!(levels.level_for(189), 3);
        assert_eq!(levels.level_for(i64::MAX), 50);
        assert_eq!(levels.level_for(-5), 1);
    }

    #[test]
    fn test_level_is_monotonic() {
        let levels = table();
        let mut last = 1;
        for xp in (0..12_000).step_by(7) {
            let level = levels.level_for(xp);
            assert!(level >= last);
            last = level;
        }
        assert_eq!(last, levels.max_level());
    }

    #[test]
    fn test_progress_within_level() {
        let progress = table().progress(100);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.xp_into_level, 11);
        assert_eq!(progress.xp_to_next, Some(89));
    }

    #[test]
    fn test_progress_at_top_level() {
        let progress = table().progress(1_000_000);
        assert_eq!(progress.level, 50);
        assert_eq!(progress.xp_to_next, None);
    }
}
