//! The decision maker: turns the tracker lattice into an ordered building
//! plan.
//!
//! The plan is a stack of possible pieces; the top is what we want next.
//! Every entry is a piece that is potential right now, ordered by decreasing
//! planner value. The scoring itself is a replaceable heuristic; the driver
//! only depends on legality and ordering.

use crate::config::Strategy;
use crate::possible::{PossibleKind, PossiblePiece};
use crate::strategy::score_node;
use crate::tracker::TrackerSet;
use catan_core::{Game, Seat};

/// Modest standing value of buying a development card.
const CARD_SCORE: f32 = 3.0;

/// Stateless planner; per-turn memoization lives in the brain's plan stack.
#[derive(Debug, Clone, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Produce a fresh building plan. The returned stack builds from the
    /// end: `last()` is the next piece to request.
    pub fn plan_stuff(
        &self,
        game: &Game,
        our_seat: Seat,
        trackers: &TrackerSet,
        strategy: Strategy,
    ) -> Vec<PossiblePiece> {
        let mut candidates: Vec<PossiblePiece> = trackers
            .our()
            .all_possibles()
            .cloned()
            .collect();

        if game.dev_cards_remaining > 0 {
            candidates.push(PossiblePiece::card(our_seat));
        }

        for piece in candidates.iter_mut() {
            piece.score = self.score(game, our_seat, piece, strategy);
        }

        // decreasing value; the stack is built so the best ends up on top
        candidates.retain(|p| p.score > f32::NEG_INFINITY);
        candidates.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

        let Some(best) = candidates.pop() else {
            return Vec::new();
        };

        let mut plan = Vec::new();

        // pair a planned road with its best adjacent companion, so a held
        // Road Building card can place both
        if matches!(best.kind, PossibleKind::Road | PossibleKind::Ship { .. }) {
            if let Some(best_edge) = best.edge() {
                let companion = candidates
                    .iter()
                    .rev()
                    .find(|p| {
                        matches!(p.kind, PossibleKind::Road | PossibleKind::Ship { .. })
                            && p.edge().is_some_and(|e| best_edge.adjacent_edges().contains(&e))
                    })
                    .cloned();
                if let Some(second) = companion {
                    plan.push(second);
                }
            }
        }

        plan.push(best);
        plan
    }

    fn score(&self, game: &Game, our_seat: Seat, piece: &PossiblePiece, strategy: Strategy) -> f32 {
        let base = match &piece.kind {
            PossibleKind::Settlement => piece
                .node()
                .map(|n| score_node(game, our_seat, &n) as f32 * 3.0)
                .unwrap_or(0.0),
            PossibleKind::City => piece
                .node()
                .map(|n| score_node(game, our_seat, &n) as f32 * 3.0 + 4.0)
                .unwrap_or(0.0),
            PossibleKind::Road | PossibleKind::Ship { .. } => {
                // expansion value: the better endpoint we could settle later
                piece
                    .edge()
                    .map(|e| {
                        e.endpoints()
                            .iter()
                            .filter(|n| game.board.satisfies_distance_rule(n))
                            .map(|n| score_node(game, our_seat, n))
                            .max()
                            .unwrap_or(0) as f32
                    })
                    .unwrap_or(0.0)
            }
            PossibleKind::Card => CARD_SCORE,
            PossibleKind::SpecialItem { .. } => CARD_SCORE,
        };

        match strategy {
            Strategy::Fast => base / (piece.eta as f32 + 1.0),
            Strategy::Smart => {
                let threat_penalty = piece.threats.len() as f32 * 2.0;
                (base - threat_penalty) / ((piece.eta as f32).sqrt() + 1.0)
            }
        }
    }
}
