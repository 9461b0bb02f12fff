//! Building-speed estimation: how many rolls until a seat can afford a
//! piece, from the dice probabilities of its production nodes.

use catan_core::oracle::dice_pips;
use catan_core::player::ResourceSet;
use catan_core::{Game, NodePiece, Resource, Seat, TileKind};

/// Expected rolls per single card of a resource when the seat has no
/// production for it at all.
const NO_PRODUCTION_ROLLS: u32 = 40;

/// Per-seat production estimate. Rebuild after any placement or robber move;
/// never cache across mirror mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpeed {
    rolls_per_resource: [u32; 5],
}

impl BuildSpeed {
    /// Estimate from the seat's current settlements and cities. Tiles under
    /// the robber produce nothing.
    pub fn for_seat(game: &Game, seat: Seat) -> Self {
        let mut pips = [0u32; 5];

        for (node, piece) in game.board.node_pieces() {
            if piece.owner() != seat {
                continue;
            }
            let multiplier = match piece {
                NodePiece::Settlement(_) => 1,
                NodePiece::City(_) => 2,
            };
            for tile in game.board.tiles_at_node(node) {
                let Some(id) = game.board.tile_id(&tile.coord) else {
                    continue;
                };
                if id == game.board.robber_tile() {
                    continue;
                }
                if let TileKind::Resource(resource) = tile.kind {
                    let number_pips = tile.dice_number.map(dice_pips).unwrap_or(0);
                    pips[resource.index()] += number_pips * multiplier;
                }
            }
        }

        let rolls_per_resource = pips.map(|p| {
            if p == 0 {
                NO_PRODUCTION_ROLLS
            } else {
                36u32.div_ceil(p)
            }
        });
        Self { rolls_per_resource }
    }

    pub fn rolls_per_resource(&self) -> &[u32; 5] {
        &self.rolls_per_resource
    }

    /// Expected rolls to close the gap between a hand and a target cost.
    /// Resources accrue in parallel, so the estimate is the worst single
    /// resource, not the sum.
    pub fn rolls_until(&self, hand: &ResourceSet, target: &ResourceSet) -> u32 {
        let mut worst = 0;
        for resource in Resource::ALL {
            let need = target.amount(resource).saturating_sub(hand.amount(resource));
            if need > 0 {
                worst = worst.max(need * self.rolls_per_resource[resource.index()]);
            }
        }
        worst
    }

    /// ETA in turns for a piece cost given the current hand.
    pub fn eta(&self, hand: &ResourceSet, cost: &ResourceSet) -> u32 {
        self.rolls_until(hand, cost)
    }

    /// The resource the seat waits longest for, among those still needed.
    pub fn most_needed(&self, hand: &ResourceSet, target: &ResourceSet) -> Option<Resource> {
        let mut best: Option<Resource> = None;
        for resource in Resource::ALL {
            if hand.amount(resource) < target.amount(resource) {
                match best {
                    None => best = Some(resource),
                    Some(current) => {
                        if self.rolls_per_resource[resource.index()]
                            > self.rolls_per_resource[current.index()]
                        {
                            best = Some(resource);
                        }
                    }
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catan_core::messages::{PieceCoord, PieceKind};
    use catan_core::{Board, GameOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> Game {
        let mut rng = StdRng::seed_from_u64(5);
        let board = Board::standard_with_rng(&mut rng);
        let mut game = Game::new("speed".into(), board, GameOptions::default());
        game.sit_down(0, "bot".into());
        game
    }

    #[test]
    fn no_production_is_slow_everywhere() {
        let g = game();
        let speed = BuildSpeed::for_seat(&g, 0);
        assert!(speed
            .rolls_per_resource()
            .iter()
            .all(|&r| r == NO_PRODUCTION_ROLLS));
    }

    #[test]
    fn settlement_production_speeds_up_resource() {
        let mut g = game();
        // find a node adjacent to a productive tile not under the robber
        let (node, resource) = g
            .board
            .land_nodes()
            .into_iter()
            .find_map(|n| {
                g.board.tiles_at_node(&n).into_iter().find_map(|t| {
                    let id = g.board.tile_id(&t.coord)?;
                    if id == g.board.robber_tile() {
                        return None;
                    }
                    match t.kind {
                        TileKind::Resource(r) => Some((n, r)),
                        _ => None,
                    }
                })
            })
            .unwrap();

        g.apply_put_piece(0, PieceKind::Settlement, PieceCoord::Node(node));
        let speed = BuildSpeed::for_seat(&g, 0);
        assert!(speed.rolls_per_resource()[resource.index()] < NO_PRODUCTION_ROLLS);
    }

    #[test]
    fn rolls_until_takes_worst_deficit() {
        let speed = BuildSpeed {
            rolls_per_resource: [4, 12, 6, 6, 4],
        };
        let hand = ResourceSet::with_amounts(1, 0, 0, 0, 0);
        let target = ResourceSet::with_amounts(1, 1, 0, 0, 1);
        // ore deficit of 1 at 12 rolls dominates wood at 4
        assert_eq!(speed.rolls_until(&hand, &target), 12);
        assert_eq!(speed.rolls_until(&target, &target), 0);
    }

    #[test]
    fn most_needed_prefers_slowest_resource() {
        let speed = BuildSpeed {
            rolls_per_resource: [4, 12, 6, 6, 4],
        };
        let hand = ResourceSet::new();
        let target = ResourceSet::with_amounts(1, 1, 0, 0, 1);
        assert_eq!(speed.most_needed(&hand, &target), Some(Resource::Ore));
        assert_eq!(speed.most_needed(&target, &target), None);
    }
}
