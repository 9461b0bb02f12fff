//! End-to-end brain tests: literal message traces driven synchronously
//! through the brain's step function against a seeded deterministic board.

use catan_bot::possible::PossiblePiece;
use catan_bot::{BotConfig, RobotBrain};
use catan_core::messages::{Action, BuildKind, DevCardOp, ElementField, ElementOp, Message, PieceCoord, PieceKind};
use catan_core::player::DevCard;
use catan_core::{oracle, Board, Game, GameOptions, GamePhase, NodeCoord, Resource, Seat};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

const US: Seat = 2;

fn new_brain(seed: u64) -> (RobotBrain, UnboundedReceiver<Action>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let board = Board::standard_with_rng(&mut rng);
    let mut game = Game::new("scenario".into(), board, GameOptions::default());
    for seat in 0..4u8 {
        game.sit_down(seat, format!("p{seat}"));
    }
    let (tx, rx) = unbounded_channel();
    (RobotBrain::new(BotConfig::default(), game, US, tx), rx)
}

fn drain(rx: &mut UnboundedReceiver<Action>) -> Vec<Action> {
    let mut actions = Vec::new();
    while let Ok(action) = rx.try_recv() {
        actions.push(action);
    }
    actions
}

fn element(seat: Seat, field: ElementField, op: ElementOp, value: u32) -> Message {
    Message::PlayerElement { seat, field, op, value }
}

/// A node with a settlement of ours on the mirror, fed through the normal
/// message path so the trackers see it too.
fn seed_our_settlement(brain: &mut RobotBrain) -> NodeCoord {
    let node = *brain.game().board.land_nodes().iter().next().unwrap();
    brain.step(Message::PutPiece {
        seat: US,
        kind: PieceKind::Settlement,
        coord: PieceCoord::Node(node),
    });
    node
}

// ==================== 1. initial placement happy path ====================

#[test]
fn initial_placement_happy_path() {
    let (mut brain, mut rx) = new_brain(101);

    brain.step(Message::SitDown { seat: US, name: "us".into(), robot: true });
    brain.step(Message::GameState { phase: GamePhase::InitSettle1A });
    brain.step(Message::Turn { seat: US });

    let actions = drain(&mut rx);
    let settle = actions
        .iter()
        .find_map(|a| match a {
            Action::PutPiece { kind: PieceKind::Settlement, coord } => coord.node(),
            _ => None,
        })
        .expect("an initial settlement should be requested");
    assert!(
        oracle::is_potential_settlement(brain.game(), US, &settle),
        "settlement must be on a legal node"
    );

    // server echoes the placement, then asks for the matching road
    brain.step(Message::PutPiece {
        seat: US,
        kind: PieceKind::Settlement,
        coord: PieceCoord::Node(settle),
    });
    brain.step(Message::GameState { phase: GamePhase::InitRoad1B });

    let actions = drain(&mut rx);
    let road = actions
        .iter()
        .find_map(|a| match a {
            Action::PutPiece { kind: PieceKind::Road, coord } => coord.edge(),
            _ => None,
        })
        .expect("an initial road should follow the settlement");
    assert!(
        settle.touching_edges().contains(&road),
        "initial road must touch the settlement just placed"
    );
}

// ==================== 2. seven rolled, discard required ====================

#[test]
fn seven_roll_discard_then_robber() {
    let (mut brain, mut rx) = new_brain(102);

    brain.step(Message::Turn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Roll });
    assert!(drain(&mut rx).contains(&Action::RollDice));

    // our hand grows to 9 cards
    brain.step(element(US, ElementField::Wheat, ElementOp::Gain, 3));
    brain.step(element(US, ElementField::Sheep, ElementOp::Gain, 3));
    brain.step(element(US, ElementField::Wood, ElementOp::Gain, 3));

    let robber_before = brain.game().board.robber_tile();
    brain.step(Message::DiceResult { roll: 7 });
    brain.step(Message::DiscardRequest { count: 4 });

    let actions = drain(&mut rx);
    let discard = actions
        .iter()
        .find_map(|a| match a {
            Action::Discard { set } => Some(set.clone()),
            _ => None,
        })
        .expect("a discard should be sent");
    assert_eq!(discard.total(), 4);
    assert!(discard.wheat <= 3 && discard.sheep <= 3 && discard.wood <= 3);
    assert_eq!(discard.clay + discard.ore, 0, "we only hold wheat, sheep, wood");

    brain.step(Message::GameState { phase: GamePhase::PlacingRobber });
    let actions = drain(&mut rx);
    let hex = actions
        .iter()
        .find_map(|a| match a {
            Action::MoveRobber { hex } => Some(*hex),
            _ => None,
        })
        .expect("the robber should be moved");
    assert!(hex > 0, "robber, not pirate");
    assert_ne!(hex, robber_before);
    assert!(
        !brain.game().board.seats_adjacent_to_tile(hex).contains(&US),
        "never rob our own production"
    );
}

// ==================== 3. road building card ====================

#[test]
fn road_building_card_places_two_roads() {
    let (mut brain, mut rx) = new_brain(103);

    let node = seed_our_settlement(&mut brain);
    brain.step(Message::DevCardAction { seat: US, op: DevCardOp::AddOld, card: DevCard::Roads });
    // afford a road so planning does not immediately end the turn
    brain.step(element(US, ElementField::Clay, ElementOp::Gain, 1));
    brain.step(element(US, ElementField::Wood, ElementOp::Gain, 1));

    // a plan whose top two entries are adjacent potential roads
    let first = node.touching_edges()[0];
    let second = first
        .adjacent_edges()
        .into_iter()
        .find(|e| brain.game().board.is_land_edge(e))
        .unwrap();
    brain.set_building_plan(vec![
        PossiblePiece::road(US, second),
        PossiblePiece::road(US, first),
    ]);

    brain.step(Message::SetTurn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Play });
    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::PlayDevCard { card: DevCard::Roads }),
        "the Road Building card should be played, got {actions:?}"
    );

    brain.step(Message::GameState { phase: GamePhase::PlacingFreeRoad1 });
    let actions = drain(&mut rx);
    assert!(actions.contains(&Action::PutPiece {
        kind: PieceKind::Road,
        coord: PieceCoord::Edge(first),
    }));

    brain.step(Message::PutPiece { seat: US, kind: PieceKind::Road, coord: PieceCoord::Edge(first) });
    brain.step(Message::GameState { phase: GamePhase::PlacingFreeRoad2 });
    let actions = drain(&mut rx);
    assert!(actions.contains(&Action::PutPiece {
        kind: PieceKind::Road,
        coord: PieceCoord::Edge(second),
    }));
}

// ==================== 4. illegal build self-recovery ====================

#[test]
fn illegal_city_build_recovers_and_ends_turn() {
    let (mut brain, mut rx) = new_brain(104);

    let node = seed_our_settlement(&mut brain);
    brain.step(element(US, ElementField::Ore, ElementOp::Set, 3));
    brain.step(element(US, ElementField::Wheat, ElementOp::Set, 2));

    brain.step(Message::SetTurn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Play });
    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::BuildRequest { kind: BuildKind::City }),
        "city should be the plan with a full city hand, got {actions:?}"
    );

    brain.step(Message::GameState { phase: GamePhase::PlacingCity });
    let actions = drain(&mut rx);
    assert!(actions.contains(&Action::PutPiece {
        kind: PieceKind::City,
        coord: PieceCoord::Node(node),
    }));

    // server refuses: no echo, just the cancel
    brain.step(Message::CancelBuildRequest { kind: BuildKind::City });

    let failed = brain.what_we_failed_to_build().expect("failure must be recorded");
    assert_eq!(failed.kind, PieceKind::City);
    assert_eq!(failed.coord, PieceCoord::Node(node));
    assert!(brain.building_plan().is_empty(), "plan is cleared on refusal");

    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::CancelBuildRequest { kind: BuildKind::City }),
        "the cancel is echoed back to free the resources"
    );
    assert!(
        actions.contains(&Action::EndTurn),
        "the turn ends in the same dispatch window"
    );
}

// ==================== 5. trade-response timeout ====================

#[test]
fn trade_response_timeout_clears_offer() {
    let (mut brain, mut rx) = new_brain(105);

    seed_our_settlement(&mut brain);
    brain.step(element(US, ElementField::Wheat, ElementOp::Set, 2));
    brain.step(element(US, ElementField::Wood, ElementOp::Set, 3));

    brain.step(Message::SetTurn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Play });

    let actions = drain(&mut rx);
    let offer = actions
        .iter()
        .find_map(|a| match a {
            Action::OfferTrade { offer } => Some(offer.clone()),
            _ => None,
        })
        .expect("an offer should go out toward the plan");
    assert!(brain.waits().trade_response);

    for _ in 0..101 {
        brain.step(Message::TimingPing);
    }

    let actions = drain(&mut rx);
    assert!(actions.contains(&Action::ClearOffer), "silence clears the offer");
    assert!(!brain.waits().trade_response);

    // non-responders are recorded as not selling what we asked for
    for resource in Resource::ALL {
        if offer.get.amount(resource) == 0 {
            continue;
        }
        for (seat, &offered) in offer.to.iter().enumerate() {
            if offered {
                assert!(
                    !brain.negotiator().is_selling(seat as Seat, resource),
                    "seat {seat} should be marked not selling {resource:?}"
                );
            }
        }
    }
}

// ==================== 6. deadlock exit ====================

#[test]
fn deadlock_exit_after_15000_ticks() {
    let (mut brain, mut rx) = new_brain(106);

    brain.step(Message::Turn { seat: US });
    for _ in 0..15_001 {
        brain.step(Message::TimingPing);
    }

    assert!(!brain.is_alive());
    let actions = drain(&mut rx);
    assert!(actions.contains(&Action::LeaveGame { reason: "counter 15000".into() }));
}

// ==================== boundary behaviors ====================

#[test]
fn idle_turn_of_ours_is_ended_promptly() {
    let (mut brain, mut rx) = new_brain(107);

    brain.step(Message::GameState { phase: GamePhase::Play });
    brain.step(Message::Turn { seat: US });
    for _ in 0..4000 {
        if drain(&mut rx).contains(&Action::EndTurn) {
            return;
        }
        brain.step(Message::TimingPing);
    }
    assert!(
        drain(&mut rx).contains(&Action::EndTurn),
        "an idle turn must end within 4000 ticks"
    );
}

#[test]
fn denied_builds_stop_after_refusal() {
    let (mut brain, mut rx) = new_brain(108);

    let node = seed_our_settlement(&mut brain);
    brain.step(element(US, ElementField::Ore, ElementOp::Set, 3));
    brain.step(element(US, ElementField::Wheat, ElementOp::Set, 2));
    brain.step(Message::SetTurn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Play });
    brain.step(Message::GameState { phase: GamePhase::PlacingCity });
    brain.step(Message::CancelBuildRequest { kind: BuildKind::City });
    drain(&mut rx);

    // the server answers the cancel; no further build attempts this turn
    brain.step(Message::GameState { phase: GamePhase::Play });
    for _ in 0..10 {
        brain.step(Message::TimingPing);
    }
    let actions = drain(&mut rx);
    assert!(
        !actions.iter().any(|a| matches!(a, Action::BuildRequest { .. })),
        "no build may be retried after a refusal emptied our patience: {actions:?}"
    );
    let _ = node;
}

#[test]
fn six_player_special_building_request() {
    let mut rng = StdRng::seed_from_u64(110);
    let board = Board::standard_with_rng(&mut rng);
    let options = GameOptions { six_player: true, ..GameOptions::default() };
    let mut game = Game::new("sbp".into(), board, options);
    for seat in 0..6u8 {
        game.sit_down(seat, format!("p{seat}"));
    }
    let (tx, mut rx) = unbounded_channel();
    let mut brain = RobotBrain::new(BotConfig::default(), game, US, tx);

    seed_our_settlement(&mut brain);

    // our turn comes and goes with nothing to do
    brain.step(Message::GameState { phase: GamePhase::Play });
    brain.step(Message::Turn { seat: US });
    assert!(drain(&mut rx).contains(&Action::EndTurn));

    // resources arrive while we wait for the turn to come around
    brain.step(element(US, ElementField::Ore, ElementOp::Set, 3));
    brain.step(element(US, ElementField::Wheat, ElementOp::Set, 2));

    brain.step(Message::Turn { seat: 3 });
    brain.step(Message::GameState { phase: GamePhase::Play });

    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::BuildRequest { kind: BuildKind::SpecialBuild }),
        "a full city hand on another's turn should request Special Building, got {actions:?}"
    );
    assert!(brain.waits().special_build);
}

#[test]
fn knight_played_before_roll_when_robber_blocks_us() {
    let (mut brain, mut rx) = new_brain(111);

    // settle a corner of the robber's tile, so the robber blocks us
    let robber = brain.game().board.robber_tile();
    let node = brain.game().board.tile(robber).unwrap().coord.nodes()[0];
    brain.step(Message::PutPiece {
        seat: US,
        kind: PieceKind::Settlement,
        coord: PieceCoord::Node(node),
    });
    brain.step(Message::DevCardAction { seat: US, op: DevCardOp::AddOld, card: DevCard::Knight });

    brain.step(Message::Turn { seat: US });
    brain.step(Message::GameState { phase: GamePhase::Roll });

    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::PlayDevCard { card: DevCard::Knight }),
        "the Knight should be played before rolling, got {actions:?}"
    );
    assert!(!actions.contains(&Action::RollDice));

    // the robber move follows, and afterwards we still expect to roll
    brain.step(Message::GameState { phase: GamePhase::PlacingRobber });
    let actions = drain(&mut rx);
    assert!(actions.iter().any(|a| matches!(a, Action::MoveRobber { .. })));
    assert!(brain.expectations().roll);
}

#[test]
fn resend_requested_when_game_state_is_lost() {
    let (mut brain, mut rx) = new_brain(109);

    // a placement request leaves us waiting for a GameState
    brain.step(Message::GameState { phase: GamePhase::InitSettle1A });
    brain.step(Message::Turn { seat: US });
    assert!(brain.waits().game_state);
    drain(&mut rx);

    for _ in 0..10_001 {
        brain.step(Message::TimingPing);
    }
    let actions = drain(&mut rx);
    assert!(
        actions.contains(&Action::Resend),
        "a lost reply is asked for again, got {actions:?}"
    );
}
