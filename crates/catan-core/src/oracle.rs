//! Read-only legality and probability queries over the game mirror.
//!
//! Everything here is a pure function of the current mirror state. Results
//! must not be cached across any mutation; callers re-ask after every applied
//! message.

use crate::board::{Seat, TileId, TileKind};
use crate::game::{Game, GamePhase};
use crate::hex::{EdgeCoord, NodeCoord};
use crate::messages::BuildKind;
use crate::player::{costs, DevCard, ResourceSet};

/// Could the seat legally place a settlement here, given a free slot?
/// During initial placement connectivity is not required.
pub fn is_potential_settlement(game: &Game, seat: Seat, node: &NodeCoord) -> bool {
    game.board.is_land_node(node)
        && game.board.satisfies_distance_rule(node)
        && (game.is_initial_placement() || game.board.is_connected_to_route(node, seat))
}

/// Could the seat legally place a road here?
pub fn is_potential_road(game: &Game, seat: Seat, edge: &EdgeCoord) -> bool {
    game.board.edge_piece(edge).is_none()
        && game.board.is_land_edge(edge)
        && game.board.edge_connects_to_network(edge, seat)
}

/// Could the seat legally place a ship here?
pub fn is_potential_ship(game: &Game, seat: Seat, edge: &EdgeCoord) -> bool {
    game.options.sea_board
        && game.board.edge_piece(edge).is_none()
        && game.board.is_sea_edge(edge)
        && game.board.edge_connects_to_network(edge, seat)
}

/// Could the seat upgrade a settlement to a city here?
pub fn is_potential_city(game: &Game, seat: Seat, node: &NodeCoord) -> bool {
    matches!(
        game.board.node_piece(node),
        Some(crate::board::NodePiece::Settlement(s)) if s == seat
    )
}

/// Cost of a build target. Sentinel kinds cost nothing by themselves.
pub fn resources_to_build(kind: BuildKind) -> ResourceSet {
    match kind {
        BuildKind::Road => costs::road(),
        BuildKind::Settlement => costs::settlement(),
        BuildKind::City => costs::city(),
        BuildKind::Ship => costs::ship(),
        BuildKind::Card => costs::dev_card(),
        BuildKind::SpecialBuild => ResourceSet::new(),
    }
}

/// May the seat play a Knight now? Requires an aged Knight and no dev card
/// played this turn. In the pirate-islands scenario the Knight converts a
/// ship to a warship, so an unconverted ship must exist.
pub fn may_play_knight(game: &Game, seat: Seat) -> bool {
    let Some(player) = game.player(seat) else {
        return false;
    };
    if player.played_dev_card_this_turn || !player.inventory.has_playable(DevCard::Knight) {
        return false;
    }
    if game.options.pirate_islands {
        let ships_placed = 15u32.saturating_sub(player.ships_remaining);
        player.warships < ships_placed
    } else {
        true
    }
}

/// May the seat play Road Building now? Two road or ship pieces must remain.
pub fn may_play_roads(game: &Game, seat: Seat) -> bool {
    game.player(seat).is_some_and(|p| {
        !p.played_dev_card_this_turn
            && p.inventory.has_playable(DevCard::Roads)
            && (p.roads_remaining >= 2 || p.ships_remaining >= 2)
    })
}

pub fn may_play_mono(game: &Game, seat: Seat) -> bool {
    game.player(seat).is_some_and(|p| {
        !p.played_dev_card_this_turn && p.inventory.has_playable(DevCard::Monopoly)
    })
}

pub fn may_play_disc(game: &Game, seat: Seat) -> bool {
    game.player(seat).is_some_and(|p| {
        !p.played_dev_card_this_turn && p.inventory.has_playable(DevCard::Discovery)
    })
}

/// Number of 36ths of a turn this tile produces on.
pub fn dice_probability_for_hex(game: &Game, hex: TileId) -> f32 {
    game.tile_pips(hex) as f32 / 36.0
}

/// Total production pips per resource across the whole board. Lower totals
/// mean rarer resources.
pub fn estimate_resource_rarity(game: &Game) -> [u32; 5] {
    let mut pips = [0u32; 5];
    for (id, tile) in game.board.land_tiles() {
        if let TileKind::Resource(resource) = tile.kind {
            pips[resource.index()] += game.tile_pips(id);
        }
    }
    pips
}

impl Game {
    /// Pips (out-of-36 roll ways) for a tile's dice number.
    pub fn tile_pips(&self, hex: TileId) -> u32 {
        self.board
            .tile(hex)
            .and_then(|t| t.dice_number)
            .map(dice_pips)
            .unwrap_or(0)
    }
}

/// Roll ways out of 36 for a dice number: 6 and 8 give 5, 2 and 12 give 1.
pub fn dice_pips(number: u8) -> u32 {
    match number {
        2 | 12 => 1,
        3 | 11 => 2,
        4 | 10 => 3,
        5 | 9 => 4,
        6 | 8 => 5,
        7 => 6,
        _ => 0,
    }
}

/// In the pirate-islands scenario: the fortress node the seat could attack,
/// if one of its ships touches the fortress.
pub fn can_attack_pirate_fortress(game: &Game, seat: Seat) -> Option<NodeCoord> {
    if !game.options.pirate_islands {
        return None;
    }
    let fortress = game.board.fortress_node()?;
    let reaches = fortress.touching_edges().iter().any(|e| {
        matches!(game.board.edge_piece(e), Some(crate::board::EdgePiece::Ship(s)) if s == seat)
    });
    reaches.then_some(fortress)
}

pub fn is_initial_placement(game: &Game) -> bool {
    game.is_initial_placement()
}

pub fn is_special_building(game: &Game) -> bool {
    game.phase == GamePhase::SpecialBuilding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Board;
    use crate::game::GameOptions;
    use crate::messages::{PieceCoord, PieceKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> Game {
        let mut rng = StdRng::seed_from_u64(3);
        let board = Board::standard_with_rng(&mut rng);
        let mut game = Game::new("oracle".into(), board, GameOptions::default());
        for seat in 0..4u8 {
            game.sit_down(seat, format!("p{seat}"));
        }
        game.set_phase(GamePhase::InitSettle1A);
        game
    }

    #[test]
    fn initial_placement_needs_no_connectivity() {
        let g = game();
        assert!(g.is_initial_placement());
        let node = *g.board.land_nodes().iter().next().unwrap();
        assert!(is_potential_settlement(&g, 0, &node));
    }

    #[test]
    fn play_settlement_requires_route() {
        let mut g = game();
        g.set_phase(GamePhase::Play);
        let node = *g.board.land_nodes().iter().next().unwrap();
        assert!(!is_potential_settlement(&g, 0, &node));

        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        assert!(is_potential_settlement(&g, 0, &node));
        assert!(!is_potential_settlement(&g, 1, &node));
    }

    #[test]
    fn city_requires_own_settlement() {
        let mut g = game();
        let node = *g.board.land_nodes().iter().next().unwrap();
        assert!(!is_potential_city(&g, 0, &node));
        g.apply_put_piece(0, PieceKind::Settlement, PieceCoord::Node(node));
        assert!(is_potential_city(&g, 0, &node));
        assert!(!is_potential_city(&g, 1, &node));
    }

    #[test]
    fn occupied_edge_is_not_potential() {
        let mut g = game();
        let node = *g.board.land_nodes().iter().next().unwrap();
        let edge = node.touching_edges()[0];
        g.apply_put_piece(0, PieceKind::Settlement, PieceCoord::Node(node));
        assert!(is_potential_road(&g, 0, &edge));

        g.apply_put_piece(0, PieceKind::Road, PieceCoord::Edge(edge));
        assert!(!is_potential_road(&g, 0, &edge));
    }

    #[test]
    fn knight_needs_aged_card_and_no_play_yet() {
        let mut g = game();
        assert!(!may_play_knight(&g, 0));

        g.player_mut(0).unwrap().inventory.add_old(DevCard::Knight, 1);
        assert!(may_play_knight(&g, 0));

        g.set_played_dev_card(0, true);
        assert!(!may_play_knight(&g, 0));
    }

    #[test]
    fn pirate_scenario_knight_needs_unconverted_ship() {
        let mut g = game();
        g.options.pirate_islands = true;
        let p = g.player_mut(0).unwrap();
        p.inventory.add_old(DevCard::Knight, 1);
        assert!(!may_play_knight(&g, 0), "no ships placed yet");

        let p = g.player_mut(0).unwrap();
        p.ships_remaining = 13;
        p.warships = 1;
        assert!(may_play_knight(&g, 0));

        g.player_mut(0).unwrap().warships = 2;
        assert!(!may_play_knight(&g, 0));
    }

    #[test]
    fn pips_table() {
        assert_eq!(dice_pips(2), 1);
        assert_eq!(dice_pips(6), 5);
        assert_eq!(dice_pips(8), 5);
        assert_eq!(dice_pips(12), 1);
    }

    #[test]
    fn rarity_counts_all_production() {
        let g = game();
        let rarity = estimate_resource_rarity(&g);
        // every resource appears on the standard board
        assert!(rarity.iter().all(|&pips| pips > 0));
    }

    #[test]
    fn fortress_attack_needs_adjacent_ship() {
        let mut g = game();
        g.options.pirate_islands = true;
        g.options.sea_board = true;
        let coastal = g.board.coastal_edges();
        let fortress = coastal[0].endpoints()[0];
        g.board.set_fortress_node(Some(fortress));
        assert_eq!(can_attack_pirate_fortress(&g, 0), None);

        g.apply_put_piece(0, PieceKind::Ship, PieceCoord::Edge(fortress.touching_edges()[0]));
        assert_eq!(can_attack_pirate_fortress(&g, 0), Some(fortress));
    }
}
