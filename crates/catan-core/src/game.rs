//! The game model mirror.
//!
//! A local replica of one game's authoritative state, mutated only by
//! applying inbound server messages. Mutators are total: they never fail on
//! well-formed input, never check legality (the server already did) and
//! never perform I/O. Anything the mirror cannot reconcile is reported back
//! to the caller as a value, not an error.

use crate::board::{Board, Resource, Seat, TileId};
use crate::hex::EdgeCoord;
use crate::messages::{ElementField, ElementOp, DevCardOp, PieceCoord, PieceKind};
use crate::player::{DevCard, Player, TradeOffer, MAX_SEATS};
use serde::{Deserialize, Serialize};

/// The server's authoritative game state. The mirror records transitions and
/// never advances the phase on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Game formed but the server has not announced the first phase yet.
    New,
    /// First initial settlement.
    InitSettle1A,
    /// First initial road.
    InitRoad1B,
    /// Second initial settlement.
    InitSettle2A,
    /// Second initial road.
    InitRoad2B,
    /// Third initial settlement (three-placement scenario).
    InitSettle3A,
    /// Third initial road (three-placement scenario).
    InitRoad3B,
    /// Waiting for the dice, or a Knight before the roll.
    Roll,
    /// Main trading and building phase.
    Play,
    PlacingRoad,
    PlacingShip,
    PlacingSettlement,
    PlacingCity,
    PlacingFreeRoad1,
    PlacingFreeRoad2,
    PlacingRobber,
    WaitingForRobberOrPirate,
    WaitingForDiscards,
    WaitingForDiscovery,
    WaitingForMonopoly,
    WaitingForRobChoosePlayer,
    SpecialBuilding,
    Over,
    Reset,
}

impl GamePhase {
    /// Any of the initial-placement phases.
    pub fn is_initial_placement(self) -> bool {
        matches!(
            self,
            GamePhase::InitSettle1A
                | GamePhase::InitRoad1B
                | GamePhase::InitSettle2A
                | GamePhase::InitRoad2B
                | GamePhase::InitSettle3A
                | GamePhase::InitRoad3B
        )
    }
}

/// Option-gated rule variants, fixed at game creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOptions {
    pub six_player: bool,
    pub sea_board: bool,
    pub pirate_islands: bool,
    pub three_initial_placements: bool,
    pub cloth_villages: bool,
    /// All seats are bots; pacing pauses shrink.
    pub bots_only: bool,
}

/// What a resource-count assertion did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAssertOutcome {
    Match,
    /// Opponent hand disagreed and was flattened to all-unknown.
    OpponentFlattened,
    /// Our own hand disagrees; the mirror is left alone for diagnosis.
    OwnHandMismatch,
}

/// A mirrored game: board, seats, phase, dice, deck count and options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub name: String,
    pub board: Board,
    seats: Vec<Option<Player>>,
    pub phase: GamePhase,
    /// The phase before the most recent `set_phase`.
    pub old_phase: GamePhase,
    pub current_seat: Seat,
    pub first_seat: Seat,
    /// Most recent dice roll, cleared at each turn.
    pub dice: Option<u8>,
    pub dev_cards_remaining: u32,
    pub options: GameOptions,
}

impl Game {
    pub fn new(name: String, board: Board, options: GameOptions) -> Self {
        let max_seats = if options.six_player { MAX_SEATS } else { 4 };
        Self {
            name,
            board,
            seats: (0..max_seats).map(|_| None).collect(),
            phase: GamePhase::New,
            old_phase: GamePhase::New,
            current_seat: 0,
            first_seat: 0,
            dice: None,
            dev_cards_remaining: 25,
            options,
        }
    }

    pub fn max_seats(&self) -> usize {
        self.seats.len()
    }

    pub fn player(&self, seat: Seat) -> Option<&Player> {
        self.seats.get(seat as usize).and_then(Option::as_ref)
    }

    pub fn player_mut(&mut self, seat: Seat) -> Option<&mut Player> {
        self.seats.get_mut(seat as usize).and_then(Option::as_mut)
    }

    pub fn is_seat_vacant(&self, seat: Seat) -> bool {
        self.player(seat).is_none()
    }

    pub fn occupied_seats(&self) -> impl Iterator<Item = &Player> {
        self.seats.iter().filter_map(Option::as_ref)
    }

    pub fn is_special_building(&self) -> bool {
        self.phase == GamePhase::SpecialBuilding
    }

    pub fn is_initial_placement(&self) -> bool {
        self.phase.is_initial_placement()
    }

    // ==================== Mutators ====================

    /// A player sat down at a seat.
    pub fn sit_down(&mut self, seat: Seat, name: String) {
        if let Some(slot) = self.seats.get_mut(seat as usize) {
            *slot = Some(Player::new(seat, name));
        }
    }

    /// Record the server's phase transition, remembering the previous one.
    pub fn set_phase(&mut self, phase: GamePhase) {
        self.old_phase = self.phase;
        self.phase = phase;
    }

    pub fn set_current_player(&mut self, seat: Seat) {
        self.current_seat = seat;
    }

    pub fn set_first_player(&mut self, seat: Seat) {
        self.first_seat = seat;
    }

    pub fn set_dev_card_count(&mut self, total: u32) {
        self.dev_cards_remaining = total;
    }

    /// Start of a new player's turn: rotate the current seat, clear the dice
    /// and every seat's open offer, and age the new current player's cards.
    /// Idempotent for a repeated `Turn` naming the same seat.
    pub fn advance_turn(&mut self, seat: Seat) {
        self.current_seat = seat;
        self.dice = None;
        for slot in self.seats.iter_mut().flatten() {
            slot.current_offer = None;
        }
        if let Some(player) = self.player_mut(seat) {
            player.reset_for_turn();
        }
    }

    pub fn apply_dice(&mut self, roll: u8) {
        self.dice = Some(roll);
    }

    /// Apply a placement. No legality check; that was the server's job.
    pub fn apply_put_piece(&mut self, seat: Seat, kind: PieceKind, coord: PieceCoord) {
        match (kind, coord) {
            (PieceKind::Settlement, PieceCoord::Node(node)) => {
                self.board.place_settlement(node, seat);
                let ports = self.board.ports_for(seat);
                if let Some(player) = self.player_mut(seat) {
                    player.settlements.push(node);
                    player.settlements_remaining = player.settlements_remaining.saturating_sub(1);
                    player.last_settlement = Some(node);
                    refresh_port_flags(player, &ports);
                }
            }
            (PieceKind::City, PieceCoord::Node(node)) => {
                self.board.upgrade_to_city(node, seat);
                if let Some(player) = self.player_mut(seat) {
                    player.settlements.retain(|n| *n != node);
                    player.cities.push(node);
                    player.cities_remaining = player.cities_remaining.saturating_sub(1);
                    player.settlements_remaining += 1;
                }
            }
            (PieceKind::Road, PieceCoord::Edge(edge)) => {
                self.board.place_road(edge, seat);
                if let Some(player) = self.player_mut(seat) {
                    player.roads_and_ships.push(edge);
                    player.roads_remaining = player.roads_remaining.saturating_sub(1);
                    player.last_road = Some(edge);
                }
            }
            (PieceKind::Ship, PieceCoord::Edge(edge)) => {
                self.board.place_ship(edge, seat);
                if let Some(player) = self.player_mut(seat) {
                    player.roads_and_ships.push(edge);
                    player.ships_remaining = player.ships_remaining.saturating_sub(1);
                    player.last_road = Some(edge);
                }
            }
            // Mismatched kind/coord pairs cannot be applied; drop them.
            _ => {}
        }
    }

    /// Revert a placement the server rejected. Inverse of `apply_put_piece`.
    pub fn undo_put_piece(&mut self, seat: Seat, kind: PieceKind, coord: PieceCoord) {
        match (kind, coord) {
            (PieceKind::Settlement, PieceCoord::Node(node)) => {
                self.board.remove_node_piece(&node);
                let ports = self.board.ports_for(seat);
                if let Some(player) = self.player_mut(seat) {
                    player.settlements.retain(|n| *n != node);
                    player.settlements_remaining += 1;
                    player.last_settlement = player.settlements.last().copied();
                    refresh_port_flags(player, &ports);
                }
            }
            (PieceKind::City, PieceCoord::Node(node)) => {
                self.board.downgrade_city(node, seat);
                if let Some(player) = self.player_mut(seat) {
                    player.cities.retain(|n| *n != node);
                    player.settlements.push(node);
                    player.cities_remaining += 1;
                    player.settlements_remaining =
                        player.settlements_remaining.saturating_sub(1);
                }
            }
            (PieceKind::Road, PieceCoord::Edge(edge)) => {
                self.board.remove_edge_piece(&edge);
                if let Some(player) = self.player_mut(seat) {
                    player.roads_and_ships.retain(|e| *e != edge);
                    player.roads_remaining += 1;
                    player.last_road = player.roads_and_ships.last().copied();
                }
            }
            (PieceKind::Ship, PieceCoord::Edge(edge)) => {
                self.board.remove_edge_piece(&edge);
                if let Some(player) = self.player_mut(seat) {
                    player.roads_and_ships.retain(|e| *e != edge);
                    player.ships_remaining += 1;
                    player.last_road = player.roads_and_ships.last().copied();
                }
            }
            _ => {}
        }
    }

    /// Ships only.
    pub fn apply_move_piece(&mut self, seat: Seat, from: EdgeCoord, to: EdgeCoord) {
        self.board.move_ship(&from, to);
        if let Some(player) = self.player_mut(seat) {
            for edge in player.roads_and_ships.iter_mut() {
                if *edge == from {
                    *edge = to;
                    break;
                }
            }
        }
    }

    /// Sign-encoded robber move: positive tile id is the robber, negative is
    /// the pirate.
    pub fn apply_robber_move(&mut self, coord: TileId) {
        if coord >= 0 {
            self.board.move_robber(coord);
        } else {
            self.board.move_pirate(-coord);
        }
    }

    /// Update one per-player counter.
    pub fn apply_player_element(
        &mut self,
        seat: Seat,
        field: ElementField,
        op: ElementOp,
        value: u32,
    ) {
        let Some(player) = self.player_mut(seat) else {
            return;
        };

        let apply_count = |current: u32| match op {
            ElementOp::Set => value,
            ElementOp::Gain => current + value,
            ElementOp::Lose => current.saturating_sub(value),
        };

        match field {
            ElementField::Clay => apply_resource(player, Resource::Clay, op, value),
            ElementField::Ore => apply_resource(player, Resource::Ore, op, value),
            ElementField::Sheep => apply_resource(player, Resource::Sheep, op, value),
            ElementField::Wheat => apply_resource(player, Resource::Wheat, op, value),
            ElementField::Wood => apply_resource(player, Resource::Wood, op, value),
            ElementField::Unknown => match op {
                ElementOp::Set => {
                    player.resources.unknown = value;
                }
                ElementOp::Gain => {
                    player.resources.unknown += value;
                }
                ElementOp::Lose => player.resources.lose_unknown(value),
            },
            ElementField::Roads => player.roads_remaining = apply_count(player.roads_remaining),
            ElementField::Settlements => {
                player.settlements_remaining = apply_count(player.settlements_remaining)
            }
            ElementField::Cities => player.cities_remaining = apply_count(player.cities_remaining),
            ElementField::Ships => player.ships_remaining = apply_count(player.ships_remaining),
            ElementField::Knights => player.knights_played = apply_count(player.knights_played),
            ElementField::Warships => player.warships = apply_count(player.warships),
            ElementField::AskSpecialBuild => {}
            ElementField::LongestRoad => {
                player.has_longest_road = match op {
                    ElementOp::Set => value != 0,
                    ElementOp::Gain => true,
                    ElementOp::Lose => false,
                }
            }
            ElementField::LargestArmy => {
                player.has_largest_army = match op {
                    ElementOp::Set => value != 0,
                    ElementOp::Gain => true,
                    ElementOp::Lose => false,
                }
            }
        }
    }

    /// Reconcile a seat's hand against the server's authoritative total.
    /// Opponent hands that disagree are flattened to all-unknown; our own
    /// hand is left for the caller to diagnose.
    pub fn apply_resource_count_assert(
        &mut self,
        seat: Seat,
        total: u32,
        our_seat: Seat,
    ) -> ResourceAssertOutcome {
        let Some(player) = self.player_mut(seat) else {
            return ResourceAssertOutcome::Match;
        };
        if player.resources.total() == total {
            return ResourceAssertOutcome::Match;
        }
        if seat == our_seat {
            ResourceAssertOutcome::OwnHandMismatch
        } else {
            player.resources.flatten_to_unknown(total);
            ResourceAssertOutcome::OpponentFlattened
        }
    }

    /// Apply a dev-card inventory operation. `CannotPlay` is a brain-level
    /// rejection and leaves the mirror untouched.
    pub fn apply_devcard_action(&mut self, seat: Seat, op: DevCardOp, card: DevCard) {
        let Some(player) = self.player_mut(seat) else {
            return;
        };
        match op {
            DevCardOp::Draw | DevCardOp::AddNew => player.inventory.add_new(card, 1),
            DevCardOp::AddOld => player.inventory.add_old(card, 1),
            DevCardOp::Play => player.inventory.remove_old(card),
            DevCardOp::CannotPlay => {}
        }
    }

    pub fn set_played_dev_card(&mut self, seat: Seat, played: bool) {
        if let Some(player) = self.player_mut(seat) {
            player.played_dev_card_this_turn = played;
        }
    }

    pub fn set_current_offer(&mut self, seat: Seat, offer: Option<TradeOffer>) {
        if let Some(player) = self.player_mut(seat) {
            player.current_offer = offer;
        }
    }

    /// `ClearOffer` with seat -1 clears everyone.
    pub fn clear_offers(&mut self, seat: i32) {
        if seat < 0 {
            for slot in self.seats.iter_mut().flatten() {
                slot.current_offer = None;
            }
        } else if let Some(player) = self.player_mut(seat as Seat) {
            player.current_offer = None;
        }
    }
}

fn apply_resource(player: &mut Player, resource: Resource, op: ElementOp, value: u32) {
    match op {
        ElementOp::Set => player.resources.set_amount(resource, value),
        ElementOp::Gain => player.resources.add(resource, value),
        ElementOp::Lose => player.resources.lose(resource, value),
    }
}

fn refresh_port_flags(player: &mut Player, ports: &[crate::board::Port]) {
    player.misc_port = false;
    player.resource_ports = [false; 5];
    for port in ports {
        match port {
            crate::board::Port::Misc => player.misc_port = true,
            crate::board::Port::Resource(r) => player.resource_ports[r.index()] = true,
        }
    }
}
