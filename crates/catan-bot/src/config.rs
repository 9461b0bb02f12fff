//! Per-brain configuration.

use serde::{Deserialize, Serialize};

/// Planner profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Build the soonest-attainable piece.
    Fast,
    /// Weigh value against threats and ETA.
    Smart,
}

/// Knobs for one robot brain. Constructed once at game join; some fields are
/// adjusted from game options (6-player pacing, bots-only speedup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub strategy: Strategy,
    /// When false, this brain neither makes nor answers trade offers.
    pub trade_flag: bool,
    /// Refused builds tolerated in one turn before we stop trying.
    pub max_denied_per_turn: u32,
    /// Shorter pauses; set automatically in 6-player games.
    pub pause_faster: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Smart,
            trade_flag: true,
            max_denied_per_turn: crate::brain::MAX_DENIED_BUILDING_PER_TURN,
            pause_faster: false,
        }
    }
}

impl BotConfig {
    pub fn fast() -> Self {
        Self {
            strategy: Strategy::Fast,
            ..Self::default()
        }
    }
}
