//! Decision strategies the brain delegates to: opening placements, robber
//! placement and victims, monopoly timing, discards.
//!
//! Scores here are replaceable heuristics. The machine that drives them only
//! relies on every returned choice being currently legal.

use crate::speed::BuildSpeed;
use catan_core::oracle::{self, dice_pips};
use catan_core::player::ResourceSet;
use catan_core::{EdgeCoord, Game, NodeCoord, Resource, Seat, TileId, TileKind};
use std::collections::HashSet;

/// Production score of a node: pips of its tiles, with a diversity bonus and
/// a bonus for resources the seat has no production for yet.
pub fn score_node(game: &Game, seat: Seat, node: &NodeCoord) -> i32 {
    let speed = BuildSpeed::for_seat(game, seat);
    let mut score = 0i32;
    let mut seen: HashSet<Resource> = HashSet::new();

    for tile in game.board.tiles_at_node(node) {
        if let Some(number) = tile.dice_number {
            score += dice_pips(number) as i32;
        }
        if let TileKind::Resource(resource) = tile.kind {
            if seen.insert(resource) {
                score += 3;
            }
            if speed.rolls_per_resource()[resource.index()] >= 36 {
                // no current production of this resource
                score += 5;
            }
        }
    }
    score
}

/// Plans the initial settlements and their roads.
///
/// Remembers the node the most recent road was built towards, so a rejected
/// road can also invalidate the destination it was aiming at.
#[derive(Debug, Clone, Default)]
pub struct OpeningBuildStrategy {
    planned_road_destination: Option<NodeCoord>,
}

impl OpeningBuildStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best legal initial settlement node, skipping banned nodes.
    pub fn plan_settlement(
        &mut self,
        game: &Game,
        seat: Seat,
        banned: &HashSet<NodeCoord>,
    ) -> Option<NodeCoord> {
        game.board
            .land_nodes()
            .into_iter()
            .filter(|n| !banned.contains(n))
            .filter(|n| oracle::is_potential_settlement(game, seat, n))
            .max_by_key(|n| score_node(game, seat, n))
    }

    /// Road off the just-placed settlement, towards the most promising
    /// follow-up settlement node.
    pub fn plan_init_road(
        &mut self,
        game: &Game,
        seat: Seat,
        banned_edges: &HashSet<EdgeCoord>,
        banned_nodes: &HashSet<NodeCoord>,
    ) -> Option<EdgeCoord> {
        let settlement = game.player(seat)?.last_settlement?;

        let mut best: Option<(EdgeCoord, NodeCoord, i32)> = None;
        for edge in settlement.touching_edges() {
            if banned_edges.contains(&edge)
                || game.board.edge_piece(&edge).is_some()
                || !game.board.is_land_edge(&edge)
            {
                continue;
            }
            let [a, b] = edge.endpoints();
            let destination = if a == settlement { b } else { a };
            if banned_nodes.contains(&destination) {
                continue;
            }
            let score = if game.board.is_land_node(&destination) {
                score_node(game, seat, &destination)
            } else {
                0
            };
            if best.map(|(_, _, s)| score > s).unwrap_or(true) {
                best = Some((edge, destination, score));
            }
        }

        let (edge, destination, _) = best?;
        self.planned_road_destination = Some(destination);
        Some(edge)
    }

    /// The settlement node the last planned road was building towards.
    pub fn planned_road_destination(&self) -> Option<NodeCoord> {
        self.planned_road_destination
    }
}

/// Robber placement and victim selection.
pub struct RobberStrategy;

impl RobberStrategy {
    /// Best hex for the robber: productive, next to opponents, never on our
    /// own buildings if any alternative exists.
    pub fn best_robber_hex(game: &Game, our_seat: Seat) -> Option<TileId> {
        let current = game.board.robber_tile();
        let mut best: Option<(TileId, i32)> = None;

        for (id, tile) in game.board.land_tiles() {
            if id == current {
                continue;
            }
            let mut score = match tile.dice_number {
                Some(n) => dice_pips(n) as i32 * 2,
                None => -5,
            };
            for seat in game.board.seats_adjacent_to_tile(id) {
                if seat == our_seat {
                    score -= 20;
                } else {
                    score += 5;
                }
            }
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Victim with the most to steal, weighted toward bigger armies.
    pub fn choose_victim(game: &Game, our_seat: Seat, choices: &[bool]) -> Option<Seat> {
        let mut best: Option<(Seat, u32)> = None;
        for (seat, eligible) in choices.iter().enumerate() {
            let seat = seat as Seat;
            if !eligible || seat == our_seat {
                continue;
            }
            let Some(player) = game.player(seat) else {
                continue;
            };
            let score = player.resources.total() * 2 + player.knights_played;
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((seat, score));
            }
        }
        best.map(|(seat, _)| seat)
    }
}

/// Whether and what to monopolize.
pub struct MonopolyStrategy;

impl MonopolyStrategy {
    /// Monopoly pays off when opponents visibly hold enough of one resource.
    const MIN_TAKE: u32 = 4;

    pub fn decide(game: &Game, our_seat: Seat) -> Option<Resource> {
        let mut best: Option<(Resource, u32)> = None;
        for resource in Resource::ALL {
            let take: u32 = game
                .occupied_seats()
                .filter(|p| p.seat != our_seat)
                .map(|p| p.resources.amount(resource))
                .sum();
            if best.map(|(_, t)| take > t).unwrap_or(true) {
                best = Some((resource, take));
            }
        }
        best.filter(|(_, take)| *take >= Self::MIN_TAKE).map(|(r, _)| r)
    }
}

/// Discard selection when a seven forces us to halve our hand.
pub struct DiscardStrategy;

impl DiscardStrategy {
    /// Discard `count` cards, shedding what the current plan does not need
    /// first, then whatever we hold the most of.
    pub fn discard(hand: &ResourceSet, count: u32, keep_for_plan: Option<&ResourceSet>) -> ResourceSet {
        let mut remaining = hand.clone();
        let mut discard = ResourceSet::new();
        let empty = ResourceSet::new();
        let protected = keep_for_plan.unwrap_or(&empty);

        for _ in 0..count {
            // prefer resources beyond what the plan needs
            let pick = Resource::ALL
                .iter()
                .copied()
                .filter(|&r| remaining.amount(r) > protected.amount(r))
                .max_by_key(|&r| remaining.amount(r))
                .or_else(|| {
                    Resource::ALL
                        .iter()
                        .copied()
                        .filter(|&r| remaining.amount(r) > 0)
                        .max_by_key(|&r| remaining.amount(r))
                });

            match pick {
                Some(resource) => {
                    remaining.lose(resource, 1);
                    discard.add(resource, 1);
                }
                None => break,
            }
        }
        discard
    }
}
