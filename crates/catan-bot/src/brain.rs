//! The robot brain: an event-driven state machine playing one game.
//!
//! The brain consumes one queue carrying server messages, the companion
//! pinger's once-per-second `TimingPing`, and the local kill sentinel. Every
//! decision happens inside [`RobotBrain::step`], which is synchronous; the
//! async [`RobotBrain::run`] wrapper only dequeues, steps, and sleeps out the
//! pacing pause a step requested. The brain therefore suspends at exactly two
//! points: the dequeue and the pause.
//!
//! Current status and the next expected transition live in the `expect_*` and
//! `waiting_*` flag records. The expect flags are the state machine; they are
//! deliberately separate booleans rather than one enum because several need
//! to be distinguishable at once (a robber placement expected from a pre-roll
//! Knight is not the same wait as one from a rolled seven, and
//! `waiting_for_game_state` rides alongside exactly one of them).
//!
//! The brain never surfaces an error to a caller: every failure path either
//! recovers, ends the turn, or leaves the game.

use crate::config::BotConfig;
use crate::negotiator::{Negotiator, OfferResponse};
use crate::planner::Planner;
use crate::possible::{PossibleKind, PossiblePiece};
use crate::speed::BuildSpeed;
use crate::strategy::{DiscardStrategy, MonopolyStrategy, OpeningBuildStrategy, RobberStrategy};
use crate::tracker::TrackerSet;
use catan_core::messages::{
    Action, BuildKind, DevCardOp, ElementField, ElementOp, Message, PieceCoord, PieceKind,
    SimpleActionKind, SimpleRequestKind, SpecialItemOp,
};
use catan_core::player::{DevCard, ResourceSet, TradeOffer};
use catan_core::{oracle, EdgeCoord, Game, GamePhase, NodeCoord, Resource, Seat, MAX_SEATS};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Refused builds tolerated per turn before we stop asking (default; the
/// configured value is carried in [`BotConfig`]).
pub const MAX_DENIED_BUILDING_PER_TURN: u32 = 3;

/// Handler panics tolerated in one turn before the brain gives up and ends
/// the turn.
const MAX_TURN_EXCEPTIONS: u32 = 5;

/// `ChoosePlayer` special choice: move the robber.
const CHOICE_MOVE_ROBBER: i32 = -2;

/// Per-phase transition expectations. At most one of the `placing_*` family
/// is true at any time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expectations {
    pub init_settle_1a: bool,
    pub init_road_1b: bool,
    pub init_settle_2a: bool,
    pub init_road_2b: bool,
    pub init_settle_3a: bool,
    pub init_road_3b: bool,
    /// Expecting the ROLL phase (the next turn's start).
    pub roll: bool,
    /// Expecting the PLAY phase.
    pub play: bool,
    pub placing_road: bool,
    pub placing_settlement: bool,
    pub placing_city: bool,
    pub placing_ship: bool,
    pub placing_robber: bool,
    pub placing_free_road1: bool,
    pub placing_free_road2: bool,
    pub put_piece_from_init_settle_1a: bool,
    pub put_piece_from_init_road_1b: bool,
    pub put_piece_from_init_settle_2a: bool,
    pub put_piece_from_init_road_2b: bool,
    pub put_piece_from_init_settle_3a: bool,
    pub put_piece_from_init_road_3b: bool,
    pub dice_result: bool,
    pub discard: bool,
    pub waiting_for_discovery: bool,
    pub waiting_for_monopoly: bool,
}

impl Expectations {
    /// Clear the per-turn expectations when a new turn starts. The
    /// initial-placement chain flags survive; other players may still be
    /// placing.
    fn reset_for_turn(&mut self) {
        self.roll = false;
        self.play = false;
        self.placing_road = false;
        self.placing_settlement = false;
        self.placing_city = false;
        self.placing_ship = false;
        self.placing_robber = false;
        self.placing_free_road1 = false;
        self.placing_free_road2 = false;
        self.dice_result = false;
        self.discard = false;
        self.waiting_for_discovery = false;
        self.waiting_for_monopoly = false;
    }

    pub fn any_placing(&self) -> bool {
        self.placing_road
            || self.placing_settlement
            || self.placing_city
            || self.placing_ship
            || self.placing_robber
            || self.placing_free_road1
            || self.placing_free_road2
    }
}

/// Waits that are acknowledgments rather than phase transitions.
#[derive(Debug, Clone, Default)]
pub struct Waits {
    /// We emitted an action whose reply is a `GameState`.
    pub game_state: bool,
    /// We ended our turn and wait for it to come around again.
    pub our_turn: bool,
    /// Bank/port trade sent, waiting for its completion notice.
    pub trade_msg: bool,
    /// Peer offer sent, waiting for responses.
    pub trade_response: bool,
    /// Dev card purchase sent.
    pub dev_card: bool,
    /// Special Building slot requested (6-player).
    pub special_build: bool,
    /// Special-item pick sent; holds the type key we wait on.
    pub pick_special_item: Option<String>,
    /// Pirate-fortress attack requested.
    pub fortress_attack: bool,
}

/// The piece we asked the server to let us build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBuild {
    pub kind: PieceKind,
    pub coord: PieceCoord,
}

/// One robot brain, playing one game from one seat.
pub struct RobotBrain {
    config: BotConfig,
    game: Game,
    our_seat: Seat,
    trackers: TrackerSet,
    planner: Planner,
    negotiator: Negotiator,
    opening: OpeningBuildStrategy,

    /// LIFO building plan; `last()` is the next piece we want.
    building_plan: Vec<PossiblePiece>,

    expect: Expectations,
    waiting: Waits,

    /// Ticks since the last progress or emitted action.
    counter: u32,
    alive: bool,
    our_turn: bool,

    what_we_want_to_build: Option<PlannedBuild>,
    what_we_failed_to_build: Option<PlannedBuild>,
    failed_building_attempts: u32,
    rejected_play_dev_card: Option<DevCard>,

    move_robber_on_seven: bool,
    done_trading: bool,
    offer_rejections: [bool; MAX_SEATS],
    decided_if_special_build: bool,

    /// Two free resources we will name if a Discovery pick is requested.
    resource_choices: ResourceSet,
    monopoly_choice: Option<Resource>,

    /// Initial-placement spots the server refused; never retried.
    banned_init_nodes: HashSet<NodeCoord>,
    banned_init_edges: HashSet<EdgeCoord>,
    last_starting_piece: Option<PieceCoord>,

    /// Message histories for the current and previous turn, for diagnosis.
    turn_events_current: Vec<Message>,
    turn_events_prev: Vec<Message>,
    turn_exception_count: u32,

    /// Milliseconds of pacing pause requested by the last step.
    pending_pause_ms: u64,

    actions: mpsc::UnboundedSender<Action>,
}

impl RobotBrain {
    pub fn new(
        config: BotConfig,
        game: Game,
        our_seat: Seat,
        actions: mpsc::UnboundedSender<Action>,
    ) -> Self {
        let mut config = config;
        if game.options.six_player {
            config.pause_faster = true;
        }
        let trackers = TrackerSet::new(&game, our_seat);
        let done_trading = !config.trade_flag;
        let mut resource_choices = ResourceSet::new();
        resource_choices.add(Resource::Clay, 2);

        let mut expect = Expectations::default();
        expect.init_settle_1a = true;

        Self {
            negotiator: Negotiator::new(our_seat),
            config,
            game,
            our_seat,
            trackers,
            planner: Planner::new(),
            opening: OpeningBuildStrategy::new(),
            building_plan: Vec::new(),
            expect,
            waiting: Waits::default(),
            counter: 0,
            alive: true,
            our_turn: false,
            what_we_want_to_build: None,
            what_we_failed_to_build: None,
            failed_building_attempts: 0,
            rejected_play_dev_card: None,
            move_robber_on_seven: false,
            done_trading,
            offer_rejections: [false; MAX_SEATS],
            decided_if_special_build: false,
            resource_choices,
            monopoly_choice: None,
            banned_init_nodes: HashSet::new(),
            banned_init_edges: HashSet::new(),
            last_starting_piece: None,
            turn_events_current: Vec::new(),
            turn_events_prev: Vec::new(),
            turn_exception_count: 0,
            pending_pause_ms: 0,
            actions,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn expectations(&self) -> &Expectations {
        &self.expect
    }

    pub fn waits(&self) -> &Waits {
        &self.waiting
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn building_plan(&self) -> &[PossiblePiece] {
        &self.building_plan
    }

    pub fn set_building_plan(&mut self, plan: Vec<PossiblePiece>) {
        self.building_plan = plan;
    }

    pub fn what_we_failed_to_build(&self) -> Option<PlannedBuild> {
        self.what_we_failed_to_build
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Run until killed, dismissed, deadlocked or the queue closes. A closed
    /// queue means the game was reset elsewhere; exit cleanly.
    pub async fn run(mut self, mut queue: mpsc::Receiver<Message>) {
        while self.alive {
            let Some(message) = queue.recv().await else {
                debug!(game = %self.game.name, "event queue closed, brain exiting");
                break;
            };
            self.step(message);
            let pause = self.take_pending_pause();
            if pause > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(pause)).await;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Handle one dequeued message. Panics inside the handlers are contained
    /// and counted; past a small bound the brain ends its turn rather than
    /// thrash.
    pub fn step(&mut self, message: Message) {
        let result = catch_unwind(AssertUnwindSafe(|| self.handle_message(message)));
        if result.is_err() {
            self.turn_exception_count += 1;
            warn!(
                game = %self.game.name,
                count = self.turn_exception_count,
                "robot caught a handler panic"
            );
            if self.turn_exception_count > MAX_TURN_EXCEPTIONS && self.our_turn {
                self.end_turn();
            }
        }
    }

    /// Milliseconds of pacing the last step asked for.
    pub fn take_pending_pause(&mut self) -> u64 {
        std::mem::take(&mut self.pending_pause_ms)
    }

    /// Flag and counter dump, in the shape of the original status report.
    pub fn brain_status(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "brain {} seat {}: phase {:?} counter {}",
            self.game.name, self.our_seat, self.game.phase, self.counter
        )];
        lines.push(format!(
            "  ourTurn {} doneTrading {} waitingForGameState {} waitingForOurTurn {}",
            self.our_turn, self.done_trading, self.waiting.game_state, self.waiting.our_turn
        ));
        lines.push(format!("  expect: {:?}", self.expect));
        lines.push(format!(
            "  previous turn: {} messages; current turn: {} messages",
            self.turn_events_prev.len(),
            self.turn_events_current.len()
        ));
        lines
    }

    // ==================== The dispatch ====================

    fn handle_message(&mut self, message: Message) {
        if matches!(message, Message::Shutdown) {
            self.alive = false;
            return;
        }

        if !matches!(message, Message::TimingPing) {
            self.turn_events_current.push(message.clone());
        } else {
            self.counter += 1;
        }

        // ---- timeouts ----
        if self.waiting.trade_msg && self.counter > 10 {
            // bank trade considered complete; the notice may have been lost
            self.waiting.trade_msg = false;
            self.counter = 0;
        }
        if self.waiting.trade_response && self.counter > 100 {
            self.trade_stop_waiting_clear_offer();
        }
        if self.waiting.game_state && self.counter > 10_000 {
            self.counter = 0;
            self.emit(Action::Resend);
        }

        // ---- phase and seating updates ----
        match &message {
            Message::GameState { phase } => {
                self.waiting.game_state = false;
                self.game.set_phase(*phase);
            }
            Message::FirstPlayer { seat } => self.game.set_first_player(*seat),
            Message::SetTurn { seat } => self.game.set_current_player(*seat),
            Message::Turn { seat } => self.handle_turn(*seat),
            Message::SitDown { seat, name, .. } => {
                self.game.sit_down(*seat, name.clone());
                self.trackers.add_tracker(*seat);
            }
            _ => {}
        }

        self.our_turn = self.game.current_seat == self.our_seat;
        if self.our_turn {
            self.waiting.special_build = false;
        }

        if let Message::Turn { .. } = message {
            if self.our_turn {
                self.waiting.our_turn = false;
                self.what_we_failed_to_build = None;
                self.failed_building_attempts = 0;
                self.rejected_play_dev_card = None;
            }
        }

        // ---- early handlers: apply the message to the mirror ----
        match &message {
            Message::PlayerElement { seat, field, op, value } => {
                self.handle_player_element(*seat, *field, *op, *value);
            }
            Message::ResourceCount { seat, total } => {
                let outcome =
                    self.game
                        .apply_resource_count_assert(*seat, *total, self.our_seat);
                if outcome == catan_core::ResourceAssertOutcome::OwnHandMismatch {
                    warn!(game = %self.game.name, seat, total, "own hand disagrees with server");
                    self.emit(Action::SendText {
                        text: format!(">>> RESOURCE COUNT ERROR: {total} != our count"),
                    });
                }
            }
            Message::DiceResult { roll } => self.game.apply_dice(*roll),
            Message::PutPiece { seat, kind, coord } => {
                self.game.apply_put_piece(*seat, *kind, *coord);
            }
            Message::MovePiece { seat, from, to, .. } => {
                self.game.apply_move_piece(*seat, *from, *to);
            }
            Message::CancelBuildRequest { kind } => self.handle_cancel_build_request(*kind),
            Message::MoveRobber { hex } => {
                self.move_robber_on_seven = false;
                self.game.apply_robber_move(*hex);
            }
            Message::MakeOffer { offer } => {
                if self.config.trade_flag {
                    self.handle_make_offer(offer.clone());
                }
            }
            Message::ClearOffer { seat } => {
                if self.config.trade_flag {
                    self.game.clear_offers(*seat);
                }
            }
            Message::AcceptOffer { offering, accepting } => {
                if self.waiting.trade_response
                    && self.config.trade_flag
                    && (*offering == self.our_seat || *accepting == self.our_seat)
                {
                    self.waiting.trade_response = false;
                }
            }
            Message::RejectOffer { seat } => {
                if self.config.trade_flag {
                    self.handle_reject_offer(*seat);
                }
            }
            Message::DevCardCount { total } => self.game.set_dev_card_count(*total),
            Message::DevCardAction { seat, op, card } => {
                if *op == DevCardOp::CannotPlay {
                    // rejected by server; don't retry this type this turn
                    self.rejected_play_dev_card = Some(*card);
                    self.waiting.game_state = false;
                    self.expect.placing_free_road1 = false;
                    self.expect.waiting_for_discovery = false;
                    self.expect.waiting_for_monopoly = false;
                    self.expect.placing_robber = false;
                } else {
                    self.game.apply_devcard_action(*seat, *op, *card);
                }
            }
            Message::SetPlayedDevCard { seat, played } => {
                self.game.set_played_dev_card(*seat, *played);
            }
            Message::SimpleRequest { seat, kind, .. } => {
                if self.our_turn
                    && self.waiting.fortress_attack
                    && *kind == SimpleRequestKind::FortressAttack
                    && *seat == -1
                {
                    // attack request denied: end our turn now
                    self.waiting.fortress_attack = false;
                    self.reset_fields_at_end_turn();
                    self.emit(Action::EndTurn);
                }
            }
            Message::PirateFortressAttackResult { .. } => {
                if self.our_turn && self.waiting.fortress_attack {
                    // win or lose, the attack ends the turn on the server
                    self.waiting.fortress_attack = false;
                    self.reset_fields_at_end_turn();
                }
            }
            _ => {}
        }

        // ---- phase-driven actions ----
        if self.game.phase == GamePhase::Roll && !self.waiting.game_state {
            self.roll_or_play_knight_or_expect_dice();
        }

        if self.our_turn
            && self.game.phase == GamePhase::WaitingForRobberOrPirate
            && !self.waiting.game_state
        {
            // the pirate is never chosen; the robber move covers both duties
            self.expect.placing_robber = true;
            self.waiting.game_state = true;
            self.counter = 0;
            self.emit(Action::ChoosePlayer { choice: CHOICE_MOVE_ROBBER });
            self.pause(200);
        } else if self.game.phase == GamePhase::PlacingRobber && !self.waiting.game_state {
            self.handle_placing_robber();
        }

        if self.game.phase == GamePhase::WaitingForDiscovery && !self.waiting.game_state {
            self.expect.waiting_for_discovery = false;
            if !self.waiting.our_turn && self.our_turn && !self.expect.play && self.counter < 4000 {
                self.waiting.game_state = true;
                self.expect.play = true;
                self.counter = 0;
                self.emit(Action::DiscoveryPick { set: self.resource_choices.clone() });
                self.pause(1500);
            }
        }

        if self.game.phase == GamePhase::WaitingForMonopoly && !self.waiting.game_state {
            self.expect.waiting_for_monopoly = false;
            if !self.waiting.our_turn && self.our_turn && !self.expect.play && self.counter < 4000 {
                self.waiting.game_state = true;
                self.expect.play = true;
                self.counter = 0;
                let resource = self.monopoly_choice.take().unwrap_or(Resource::Wheat);
                self.emit(Action::MonopolyPick { resource });
                self.pause(1500);
            }
        }

        if let Message::SimpleAction { seat, kind, .. } = &message {
            if self.waiting.trade_msg && *kind == SimpleActionKind::TradeSuccessful {
                self.waiting.trade_msg = false;
            }
            if self.waiting.dev_card
                && *kind == SimpleActionKind::DevCardBought
                && *seat == self.our_seat
            {
                self.waiting.dev_card = false;
            }
        }

        // ---- planning: decide to build or take other normal actions ----
        self.plan_and_act();

        // ---- placement: the server said yes, put the piece down ----
        if !self.waiting.game_state {
            self.place_if_expect_placing();
        }

        // ---- post-handlers ----
        match &message {
            Message::PutPiece { seat, kind, coord } => {
                self.trackers.track_put_piece(&self.game, *seat, *kind, *coord);
                if *seat == self.our_seat {
                    self.advance_init_placement_expectations(*kind, *coord);
                }
            }
            Message::MovePiece { seat, to, .. } => {
                self.trackers.track_move_piece(&self.game, *seat, *to);
            }
            Message::DiceResult { roll } => self.handle_dice_result(*roll),
            Message::PickResourcesRequest { count } => self.handle_pick_resources(*count),
            Message::DiscardRequest { count } => self.handle_discard_request(*count),
            Message::ChoosePlayerRequest { choices } => {
                let victim = RobberStrategy::choose_victim(&self.game, self.our_seat, choices)
                    .or_else(|| {
                        choices.iter().position(|&c| c).map(|s| s as Seat)
                    });
                if let Some(victim) = victim {
                    self.counter = 0;
                    self.emit(Action::ChoosePlayer { choice: victim as i32 });
                }
            }
            Message::ChoosePlayer { choice } => {
                // cloth is worth more than a random card
                self.emit(Action::ChoosePlayer { choice: -(choice + 1) });
            }
            Message::SetSpecialItem { op, type_key, .. } => {
                if self.waiting.pick_special_item.as_deref() == Some(type_key.as_str()) {
                    match op {
                        SpecialItemOp::Pick | SpecialItemOp::Decline => {
                            self.waiting.pick_special_item = None;
                        }
                        _ => {}
                    }
                }
            }
            Message::RobotDismiss => {
                if !self.expect.discard && !self.expect.placing_robber {
                    self.emit(Action::LeaveGame { reason: "dismiss msg".into() });
                    self.alive = false;
                }
            }
            Message::Reset => {
                // game is being reset in another task; this brain is done
                self.alive = false;
            }
            _ => {}
        }

        // ---- dead-man switches ----
        if self.counter > 15_000 {
            for line in self.brain_status() {
                debug!(game = %self.game.name, "{line}");
            }
            self.emit(Action::LeaveGame { reason: "counter 15000".into() });
            self.alive = false;
        }
        if self.failed_building_attempts > 2 * self.config.max_denied_per_turn
            && self.game.is_initial_placement()
        {
            self.emit(Action::LeaveGame { reason: "failed initial placements".into() });
            self.alive = false;
        }
    }

    // ==================== Turn bookkeeping ====================

    fn handle_turn(&mut self, seat: Seat) {
        self.game.advance_turn(seat);
        self.expect.reset_for_turn();

        self.done_trading = !self.config.trade_flag;
        self.waiting.trade_msg = false;
        self.waiting.trade_response = false;
        self.negotiator.reset_is_selling();
        self.negotiator.reset_wants_another_offer();
        self.negotiator.reset_offers_made();
        self.waiting.pick_special_item = None;
        self.waiting.fortress_attack = false;

        self.decided_if_special_build = false;
        if self.game.phase == GamePhase::SpecialBuilding {
            if !(self.waiting.special_build && !self.building_plan.is_empty()) {
                // no held plan; the loop body will replan or end the phase
                self.building_plan.clear();
            }
        } else {
            self.building_plan.clear();
        }
        self.negotiator.reset_target_pieces();

        std::mem::swap(&mut self.turn_events_prev, &mut self.turn_events_current);
        self.turn_events_current.clear();
        self.turn_exception_count = 0;
    }

    fn handle_player_element(&mut self, seat: Seat, field: ElementField, op: ElementOp, value: u32) {
        // a warship-count gain is the pirate scenario's answer to a played
        // Knight; there is no PLACING_ROBBER coming
        if field == ElementField::Warships
            && op == ElementOp::Gain
            && self.expect.placing_robber
        {
            self.expect.placing_robber = false;
            self.waiting.game_state = false;
        }

        self.game.apply_player_element(seat, field, op, value);

        if self.game.phase == GamePhase::Roll {
            self.negotiator.reset_is_selling();
        }

        // Special Building: if we just lost a resource the plan needs, drop
        // the plan (in normal play it resets at each turn anyway)
        if self.waiting.special_build && seat == self.our_seat && op != ElementOp::Gain {
            if let Some(target) = self.building_plan.last() {
                let cost = target.resources_to_build();
                let affordable = self
                    .game
                    .player(self.our_seat)
                    .map(|p| p.resources.contains(&cost))
                    .unwrap_or(false);
                if !affordable {
                    self.building_plan.clear();
                }
            }
        }
    }

    // ==================== Rolling ====================

    fn roll_or_play_knight_or_expect_dice(&mut self) {
        self.expect.roll = false;

        if self.waiting.our_turn || !self.our_turn {
            self.expect.dice_result = true;
            return;
        }
        if self.expect.play
            || self.expect.discard
            || self.expect.placing_robber
            || (self.expect.dice_result && self.counter < 4000)
        {
            return;
        }

        // a pre-roll Knight only pays when the robber squats on our own
        // production; the pirate scenario has no robber to chase off
        let robber_blocks_us = self
            .game
            .board
            .seats_adjacent_to_tile(self.game.board.robber_tile())
            .contains(&self.our_seat);
        if oracle::may_play_knight(&self.game, self.our_seat)
            && self.rejected_play_dev_card != Some(DevCard::Knight)
            && !self.game.options.pirate_islands
            && robber_blocks_us
        {
            self.play_knight_card();
        } else {
            self.expect.dice_result = true;
            self.counter = 0;
            self.emit(Action::RollDice);
        }
    }

    fn play_knight_card(&mut self) {
        self.expect.placing_robber = true;
        self.waiting.game_state = true;
        self.counter = 0;
        self.emit(Action::PlayDevCard { card: DevCard::Knight });
        self.pause(1500);
    }

    fn handle_placing_robber(&mut self) {
        self.expect.placing_robber = false;
        if self.waiting.our_turn || !self.our_turn {
            return;
        }
        if (self.expect.roll || self.expect.play) && self.counter < 4000 {
            return;
        }

        if self.move_robber_on_seven {
            self.move_robber_on_seven = false;
            self.expect.play = true;
        } else if self.game.old_phase == GamePhase::Roll {
            // robber moved by a Knight played before the roll
            self.expect.roll = true;
        } else {
            self.expect.play = true;
        }
        self.waiting.game_state = true;
        self.counter = 0;

        if let Some(hex) = RobberStrategy::best_robber_hex(&self.game, self.our_seat) {
            self.emit(Action::MoveRobber { hex });
        }
        self.pause(2000);
    }

    // ==================== Planning and building ====================

    fn plan_and_act(&mut self) {
        let phase_ok = matches!(self.game.phase, GamePhase::Play | GamePhase::SpecialBuilding);
        if !phase_ok {
            return;
        }
        if self.waiting.game_state
            || self.waiting.trade_msg
            || self.waiting.trade_response
            || self.waiting.dev_card
            || self.waiting.fortress_attack
            || self.waiting.pick_special_item.is_some()
            || self.expect.any_placing()
            || self.expect.waiting_for_discovery
            || self.expect.waiting_for_monopoly
        {
            return;
        }

        self.expect.play = false;

        // 6-player: on others' turns, decide once whether to Special Build
        if !self.our_turn
            && self.waiting.our_turn
            && self.game.options.six_player
            && !self.decided_if_special_build
            && !self.expect.placing_robber
        {
            self.decided_if_special_build = true;
            let total = self
                .game
                .player(self.our_seat)
                .map(|p| p.resources.total())
                .unwrap_or(0);
            if self.building_plan.is_empty()
                && total > 1
                && self.failed_building_attempts < self.config.max_denied_per_turn
            {
                self.plan_building();
                let target_cost = self.building_plan.last().map(|t| t.resources_to_build());
                let affordable = target_cost
                    .and_then(|cost| {
                        self.game
                            .player(self.our_seat)
                            .map(|p| p.resources.contains(&cost))
                    })
                    .unwrap_or(false);
                if affordable {
                    self.waiting.special_build = true;
                    self.emit(Action::BuildRequest { kind: BuildKind::SpecialBuild });
                    self.pause(100);
                }
            }
        }

        if self.waiting.our_turn || !self.our_turn {
            return;
        }
        if self.expect.roll && self.counter < 4000 {
            return;
        }
        self.counter = 0;

        let played_dev_card = self
            .game
            .player(self.our_seat)
            .map(|p| p.played_dev_card_this_turn)
            .unwrap_or(false);
        if self.game.phase == GamePhase::Play && !played_dev_card {
            self.consider_play_knight_card();
        }

        let total = self
            .game
            .player(self.our_seat)
            .map(|p| p.resources.total())
            .unwrap_or(0);
        if !self.expect.placing_robber
            && self.building_plan.is_empty()
            && total > 1
            && self.failed_building_attempts < self.config.max_denied_per_turn
        {
            self.plan_building();
        }

        if !self.expect.placing_robber && !self.building_plan.is_empty() {
            self.build_or_get_resource_by_trade_or_card();
        }

        // are we done with this turn?
        if !(self.expect.any_placing()
            || self.expect.waiting_for_discovery
            || self.expect.waiting_for_monopoly
            || self.waiting.trade_msg
            || self.waiting.trade_response
            || self.waiting.dev_card
            || self.waiting.pick_special_item.is_some())
        {
            let mut scenario_action = false;
            if self.game.options.pirate_islands {
                scenario_action = self.consider_scenario_turn_final_actions();
            }
            if !scenario_action {
                self.end_turn();
            }
        }
    }

    /// Knight for the army: play when it still grows toward (or defends a
    /// path to) Largest Army. The pirate scenario converts warships instead
    /// and plays whenever an opponent has something to lose.
    fn consider_play_knight_card(&mut self) {
        let Some(us) = self.game.player(self.our_seat) else {
            return;
        };

        let can_grow_army = if self.game.options.pirate_islands {
            self.game
                .occupied_seats()
                .any(|p| p.seat != self.our_seat && p.resources.total() > 0)
        } else {
            let leader = self
                .game
                .occupied_seats()
                .find(|p| p.has_largest_army)
                .map(|p| (p.seat, p.knights_played));
            match leader {
                Some((seat, _)) if seat == self.our_seat => false,
                Some((_, knights)) => {
                    us.knights_played + us.inventory.amount_old(DevCard::Knight) >= knights + 1
                }
                None => us.knights_played + us.inventory.amount_old(DevCard::Knight) >= 3,
            }
        };

        if can_grow_army
            && oracle::may_play_knight(&self.game, self.our_seat)
            && self.rejected_play_dev_card != Some(DevCard::Knight)
        {
            self.play_knight_card();
        }
    }

    fn plan_building(&mut self) {
        self.building_plan =
            self.planner
                .plan_stuff(&self.game, self.our_seat, &self.trackers, self.config.strategy);
        if let Some(target) = self.building_plan.last() {
            self.negotiator.set_target_piece(self.our_seat, Some(target.clone()));
        }
    }

    /// Ask to build the plan's top piece, or play a resource-producing card,
    /// or trade toward it. Sets the expect flag for the placement state the
    /// server will answer with.
    fn build_or_get_resource_by_trade_or_card(&mut self) {
        let in_play = self.game.phase == GamePhase::Play;
        let Some(us) = self.game.player(self.our_seat) else {
            return;
        };
        let played_dev_card = us.played_dev_card_this_turn;
        let roads_left = us.roads_remaining;
        let our_resources = us.resources.clone();

        // Road Building: two planned roads and a playable card
        if in_play
            && !played_dev_card
            && roads_left >= 2
            && oracle::may_play_roads(&self.game, self.our_seat)
            && self.rejected_play_dev_card != Some(DevCard::Roads)
        {
            if self.try_road_building_card() {
                return;
            }
        }

        let Some(target) = self.building_plan.last().cloned() else {
            return;
        };
        self.negotiator.set_target_piece(self.our_seat, Some(target.clone()));
        let target_resources = target.resources_to_build();

        // Discovery: exactly the two resources we lack
        if in_play
            && !played_dev_card
            && oracle::may_play_disc(&self.game, self.our_seat)
            && self.rejected_play_dev_card != Some(DevCard::Discovery)
            && self.choose_free_resources_if_needed(&target_resources, 2, false)
        {
            self.expect.waiting_for_discovery = true;
            self.waiting.game_state = true;
            self.counter = 0;
            self.emit(Action::PlayDevCard { card: DevCard::Discovery });
            self.pause(1500);
        }

        if self.expect.waiting_for_discovery {
            return;
        }

        // Monopoly when the table visibly holds enough of one resource
        if in_play
            && !played_dev_card
            && oracle::may_play_mono(&self.game, self.our_seat)
            && self.rejected_play_dev_card != Some(DevCard::Monopoly)
        {
            if let Some(resource) = MonopolyStrategy::decide(&self.game, self.our_seat) {
                self.monopoly_choice = Some(resource);
                self.expect.waiting_for_monopoly = true;
                self.waiting.game_state = true;
                self.counter = 0;
                self.emit(Action::PlayDevCard { card: DevCard::Monopoly });
                self.pause(1500);
            }
        }

        if self.expect.waiting_for_monopoly {
            return;
        }

        if in_play && !self.done_trading && !our_resources.contains(&target_resources) {
            self.waiting.trade_response = false;
            if self.config.trade_flag {
                self.make_offer_for(&target);
            }
        }

        if in_play && !self.waiting.trade_response {
            if let Some((give, get)) = self.negotiator.offer_to_bank(&self.game, &target_resources)
            {
                self.counter = 0;
                self.waiting.trade_msg = true;
                self.emit(Action::BankTrade { give, get });
                self.pause(1500);
            }
        }

        let our_resources = self
            .game
            .player(self.our_seat)
            .map(|p| p.resources.clone())
            .unwrap_or_default();
        if !(self.waiting.trade_msg || self.waiting.trade_response)
            && our_resources.contains(&target_resources)
        {
            self.build_request_planned_piece();
        }
    }

    /// Pop the top two roads off the plan and play Road Building for them.
    /// Returns true if the card was played.
    fn try_road_building_card(&mut self) -> bool {
        let Some(top) = self.building_plan.pop() else {
            return false;
        };
        let top_is_route = matches!(top.kind, PossibleKind::Road | PossibleKind::Ship { .. });
        let second_is_route = self
            .building_plan
            .last()
            .map(|p| matches!(p.kind, PossibleKind::Road | PossibleKind::Ship { .. }))
            .unwrap_or(false);

        if !(top_is_route && second_is_route) {
            self.building_plan.push(top);
            return false;
        }

        // coastal pairs default to roads; only two true sea ships sail
        let both_ships = matches!(top.kind, PossibleKind::Ship { coastal: false })
            && matches!(
                self.building_plan.last().map(|p| &p.kind),
                Some(PossibleKind::Ship { coastal: false })
            );
        let kind = if both_ships { PieceKind::Ship } else { PieceKind::Road };
        let Some(coord) = top.coord else {
            self.building_plan.push(top);
            return false;
        };
        let wanted = PlannedBuild { kind, coord };

        if self.what_we_failed_to_build == Some(wanted) {
            // already refused this one this turn
            self.cancel_wrong_piece_placement_local(wanted);
            return false;
        }

        self.what_we_want_to_build = Some(wanted);
        self.waiting.game_state = true;
        self.counter = 0;
        self.expect.placing_free_road1 = true;
        self.emit(Action::PlayDevCard { card: DevCard::Roads });
        true
    }

    /// Pop the plan and ask the server for the piece, unless the server
    /// already refused exactly that piece this turn.
    fn build_request_planned_piece(&mut self) {
        let Some(target) = self.building_plan.pop() else {
            return;
        };
        self.negotiator.set_target_piece(self.our_seat, Some(target.clone()));

        match &target.kind {
            PossibleKind::Card => {
                self.waiting.dev_card = true;
                self.emit(Action::BuyDevCard);
            }
            PossibleKind::SpecialItem { type_key, game_index, player_index, .. } => {
                self.waiting.pick_special_item = Some(type_key.clone());
                self.what_we_want_to_build = None;
                self.counter = 0;
                self.emit(Action::PickSpecialItem {
                    type_key: type_key.clone(),
                    game_index: *game_index,
                    player_index: *player_index,
                });
            }
            PossibleKind::Road | PossibleKind::Ship { .. }
            | PossibleKind::Settlement | PossibleKind::City => {
                let kind = match &target.kind {
                    PossibleKind::Road => PieceKind::Road,
                    // coastal candidates are requested as roads
                    PossibleKind::Ship { coastal } => {
                        if *coastal {
                            PieceKind::Road
                        } else {
                            PieceKind::Ship
                        }
                    }
                    PossibleKind::Settlement => PieceKind::Settlement,
                    PossibleKind::City => PieceKind::City,
                    _ => unreachable!(),
                };
                let Some(coord) = target.coord else {
                    return;
                };
                let wanted = PlannedBuild { kind, coord };
                if self.what_we_failed_to_build == Some(wanted) {
                    // never re-request a refused piece in the same turn
                    self.cancel_wrong_piece_placement_local(wanted);
                    return;
                }
                self.what_we_want_to_build = Some(wanted);
                self.waiting.game_state = true;
                self.counter = 0;
                match kind {
                    PieceKind::Road => self.expect.placing_road = true,
                    PieceKind::Ship => self.expect.placing_ship = true,
                    PieceKind::Settlement => self.expect.placing_settlement = true,
                    PieceKind::City => self.expect.placing_city = true,
                }
                self.emit(Action::BuildRequest { kind: kind.into() });
            }
        }
    }

    // ==================== Placement ====================

    fn place_if_expect_placing(&mut self) {
        match self.game.phase {
            GamePhase::PlacingSettlement => {
                if self.can_place_now(self.expect.placing_settlement) {
                    self.expect.placing_settlement = false;
                    self.finish_placing_into_play();
                }
            }
            GamePhase::PlacingRoad => {
                if self.can_place_now(self.expect.placing_road) {
                    self.expect.placing_road = false;
                    self.finish_placing_into_play();
                }
            }
            GamePhase::PlacingCity => {
                if self.can_place_now(self.expect.placing_city) {
                    self.expect.placing_city = false;
                    self.finish_placing_into_play();
                }
            }
            GamePhase::PlacingShip => {
                if self.can_place_now(self.expect.placing_ship) {
                    self.expect.placing_ship = false;
                    self.finish_placing_into_play();
                }
            }
            GamePhase::PlacingFreeRoad1 => {
                if self.can_place_now(self.expect.placing_free_road1) {
                    self.expect.placing_free_road1 = false;
                    self.waiting.game_state = true;
                    self.counter = 0;
                    self.expect.placing_free_road2 = true;
                    self.pause(500);
                    self.put_wanted_piece();
                    self.pause(1000);
                }
            }
            GamePhase::PlacingFreeRoad2 => {
                if self.can_place_now(self.expect.placing_free_road2) {
                    self.expect.placing_free_road2 = false;
                    self.waiting.game_state = true;
                    self.counter = 0;
                    self.expect.play = true;

                    if let Some(piece) = self.building_plan.pop() {
                        let kind = match piece.kind {
                            PossibleKind::Ship { coastal: false } => PieceKind::Ship,
                            _ => PieceKind::Road,
                        };
                        if let Some(coord) = piece.coord {
                            self.what_we_want_to_build = Some(PlannedBuild { kind, coord });
                        }
                    }
                    self.pause(500);
                    self.put_wanted_piece();
                    self.pause(1000);
                }
            }
            GamePhase::InitSettle1A => {
                self.expect.init_settle_1a = false;
                if self.can_start_init_placement(
                    self.expect.put_piece_from_init_settle_1a,
                ) {
                    self.expect.put_piece_from_init_settle_1a = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.place_init_settlement();
                }
            }
            GamePhase::InitSettle2A => {
                self.expect.init_settle_2a = false;
                if self.can_start_init_placement(
                    self.expect.put_piece_from_init_settle_2a,
                ) {
                    self.expect.put_piece_from_init_settle_2a = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.place_init_settlement();
                }
            }
            GamePhase::InitSettle3A => {
                self.expect.init_settle_3a = false;
                if self.can_start_init_placement(
                    self.expect.put_piece_from_init_settle_3a,
                ) {
                    self.expect.put_piece_from_init_settle_3a = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.place_init_settlement();
                }
            }
            GamePhase::InitRoad1B => {
                self.expect.init_road_1b = false;
                if self.can_start_init_placement(self.expect.put_piece_from_init_road_1b) {
                    self.expect.put_piece_from_init_road_1b = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.pause(1500);
                    self.plan_and_place_init_road();
                }
            }
            GamePhase::InitRoad2B => {
                self.expect.init_road_2b = false;
                if self.can_start_init_placement(self.expect.put_piece_from_init_road_2b) {
                    self.expect.put_piece_from_init_road_2b = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.pause(1500);
                    self.plan_and_place_init_road();
                }
            }
            GamePhase::InitRoad3B => {
                self.expect.init_road_3b = false;
                if self.can_start_init_placement(self.expect.put_piece_from_init_road_3b) {
                    self.expect.put_piece_from_init_road_3b = true;
                    self.counter = 0;
                    self.waiting.game_state = true;
                    self.pause(1500);
                    self.plan_and_place_init_road();
                }
            }
            _ => {}
        }
    }

    fn can_place_now(&self, expected: bool) -> bool {
        self.our_turn && !self.waiting.our_turn && expected
    }

    fn can_start_init_placement(&self, already_sent: bool) -> bool {
        !self.waiting.our_turn && self.our_turn && !(already_sent && self.counter < 4000)
    }

    fn finish_placing_into_play(&mut self) {
        self.waiting.game_state = true;
        self.counter = 0;
        self.expect.play = true;
        self.pause(500);
        self.put_wanted_piece();
        self.pause(1000);
    }

    fn put_wanted_piece(&mut self) {
        if let Some(wanted) = self.what_we_want_to_build {
            self.emit(Action::PutPiece { kind: wanted.kind, coord: wanted.coord });
        }
    }

    fn place_init_settlement(&mut self) {
        let node = self
            .opening
            .plan_settlement(&self.game, self.our_seat, &self.banned_init_nodes);
        match node {
            Some(node) => {
                self.last_starting_piece = Some(PieceCoord::Node(node));
                self.pause(500);
                self.emit(Action::PutPiece {
                    kind: PieceKind::Settlement,
                    coord: PieceCoord::Node(node),
                });
                self.pause(1000);
            }
            None => {
                // nowhere left we consider settleable; give up on the game
                self.failed_building_attempts = 2 + 2 * self.config.max_denied_per_turn;
                self.waiting.game_state = false;
            }
        }
    }

    fn plan_and_place_init_road(&mut self) {
        let edge = self.opening.plan_init_road(
            &self.game,
            self.our_seat,
            &self.banned_init_edges,
            &self.banned_init_nodes,
        );
        match edge {
            Some(edge) => {
                self.last_starting_piece = Some(PieceCoord::Edge(edge));
                self.pause(500);
                self.emit(Action::PutPiece { kind: PieceKind::Road, coord: PieceCoord::Edge(edge) });
                self.pause(1000);
            }
            None => {
                self.failed_building_attempts = 2 + 2 * self.config.max_denied_per_turn;
                self.waiting.game_state = false;
            }
        }
    }

    /// Track our initial placements and chain the next expectation.
    fn advance_init_placement_expectations(&mut self, kind: PieceKind, coord: PieceCoord) {
        let us = self.game.player(self.our_seat);
        let last_settlement = us.and_then(|p| p.last_settlement);
        let last_road = us.and_then(|p| p.last_road);

        let is_settlement_echo =
            kind == PieceKind::Settlement && coord.node() == last_settlement;
        let is_road_echo = matches!(kind, PieceKind::Road | PieceKind::Ship)
            && coord.edge() == last_road;

        if self.expect.put_piece_from_init_settle_1a && is_settlement_echo {
            self.expect.put_piece_from_init_settle_1a = false;
            self.expect.init_road_1b = true;
        }
        if self.expect.put_piece_from_init_road_1b && is_road_echo {
            self.expect.put_piece_from_init_road_1b = false;
            self.expect.init_settle_2a = true;
        }
        if self.expect.put_piece_from_init_settle_2a && is_settlement_echo {
            self.expect.put_piece_from_init_settle_2a = false;
            self.expect.init_road_2b = true;
        }
        if self.expect.put_piece_from_init_road_2b && is_road_echo {
            self.expect.put_piece_from_init_road_2b = false;
            if self.game.options.three_initial_placements {
                self.expect.init_settle_3a = true;
            } else {
                // regular play starts once everyone has placed
                self.expect.roll = true;
            }
        }
        if self.expect.put_piece_from_init_settle_3a && is_settlement_echo {
            self.expect.put_piece_from_init_settle_3a = false;
            self.expect.init_road_3b = true;
        }
        if self.expect.put_piece_from_init_road_3b && is_road_echo {
            self.expect.put_piece_from_init_road_3b = false;
            self.expect.roll = true;
        }
    }

    // ==================== Dice, discards, gold ====================

    fn handle_dice_result(&mut self, roll: u8) {
        if !self.expect.dice_result {
            return;
        }
        self.expect.dice_result = false;

        if roll == 7 {
            let rob_without_robber = self.game.options.pirate_islands;
            if !rob_without_robber {
                self.move_robber_on_seven = true;
            }
            let our_total = self
                .game
                .player(self.our_seat)
                .map(|p| p.resources.total())
                .unwrap_or(0);
            if our_total > 7 {
                self.expect.discard = true;
            } else if self.our_turn {
                if !rob_without_robber {
                    self.expect.placing_robber = true;
                } else {
                    self.expect.play = true;
                }
            }
        } else {
            self.expect.play = true;
        }
    }

    fn handle_discard_request(&mut self, count: u32) {
        self.expect.discard = false;

        if self.game.dice == Some(7) && self.our_turn {
            if !self.game.options.pirate_islands {
                self.expect.placing_robber = true;
            } else {
                self.expect.play = true;
            }
        } else {
            self.expect.play = true;
        }
        self.counter = 0;

        let hand = self
            .game
            .player(self.our_seat)
            .map(|p| p.resources.clone())
            .unwrap_or_default();
        let keep = self.building_plan.last().map(|p| p.resources_to_build());
        let set = DiscardStrategy::discard(&hand, count, keep.as_ref());
        self.emit(Action::Discard { set });
    }

    /// Gold hex: pick free resources toward the plan, else by board rarity.
    fn handle_pick_resources(&mut self, count: u32) {
        self.counter = 0;

        if self.building_plan.is_empty() {
            self.plan_building();
        }

        let target_cost = self.building_plan.last().map(|p| p.resources_to_build());
        if let Some(target_resources) = target_cost {
            self.choose_free_resources_if_needed(&target_resources, count, true);
        } else {
            // no plan (initial placement): chase the board's rarest numbers
            self.resource_choices.clear();
            let rarity = oracle::estimate_resource_rarity(&self.game);
            let mut cap = 1u32;
            let mut left = count;
            while left > 0 {
                let pick = Resource::ALL
                    .iter()
                    .copied()
                    .filter(|r| self.resource_choices.amount(*r) < cap)
                    .min_by_key(|r| rarity[r.index()]);
                match pick {
                    Some(resource) => {
                        self.resource_choices.add(resource, 1);
                        left -= 1;
                    }
                    None => cap += 1,
                }
            }
        }

        self.emit(Action::PickFreeResources { set: self.resource_choices.clone() });
        self.waiting.game_state = true;
        if self.game.is_initial_placement() {
            if self.game.options.three_initial_placements {
                self.expect.init_road_3b = true;
            } else {
                self.expect.init_road_2b = true;
            }
        } else {
            self.expect.play = true;
        }
    }

    /// Fill `resource_choices` with up to `num` resources we still need for
    /// `target`, slowest-to-acquire first. With `choose_if_not_needed`, tops
    /// up to `num` with our scarcest production even when the target needs
    /// fewer. Returns whether a pick was assembled.
    fn choose_free_resources_if_needed(
        &mut self,
        target: &ResourceSet,
        num: u32,
        choose_if_not_needed: bool,
    ) -> bool {
        let hand = self
            .game
            .player(self.our_seat)
            .map(|p| p.resources.clone())
            .unwrap_or_default();
        let needed: u32 = Resource::ALL
            .iter()
            .map(|&r| target.amount(r).saturating_sub(hand.amount(r)))
            .sum();

        if !choose_if_not_needed && needed != num {
            return false;
        }

        self.resource_choices.clear();
        let speed = BuildSpeed::for_seat(&self.game, self.our_seat);
        let mut simulated = hand;
        let mut left = num;
        while left > 0 {
            match speed.most_needed(&simulated, target) {
                Some(resource) => {
                    self.resource_choices.add(resource, 1);
                    simulated.add(resource, 1);
                    left -= 1;
                }
                None => break,
            }
        }

        if choose_if_not_needed {
            // top up from our slowest production
            let rolls = *speed.rolls_per_resource();
            let mut order: Vec<Resource> = Resource::ALL.to_vec();
            order.sort_by_key(|r| std::cmp::Reverse(rolls[r.index()]));
            let mut cursor = 0;
            while left > 0 {
                let resource = order[cursor % order.len()];
                self.resource_choices.add(resource, 1);
                cursor += 1;
                left -= 1;
            }
        }

        left == 0
    }

    // ==================== Trading ====================

    fn make_offer_for(&mut self, target: &PossiblePiece) {
        let offer = self.negotiator.make_offer(&self.game, target);
        self.game.set_current_offer(self.our_seat, offer.clone());
        self.negotiator.reset_wants_another_offer();

        match offer {
            Some(offer) => {
                self.offer_rejections = [false; MAX_SEATS];
                self.waiting.trade_response = true;
                self.counter = 0;
                self.emit(Action::OfferTrade { offer });
            }
            None => {
                self.done_trading = true;
                self.waiting.trade_response = false;
            }
        }
    }

    fn handle_make_offer(&mut self, offer: TradeOffer) {
        self.game.set_current_offer(offer.from, Some(offer.clone()));
        if offer.from == self.our_seat {
            return;
        }

        // their give-set is for sale; their get-set is not
        for resource in Resource::ALL {
            if offer.give.amount(resource) > 0 {
                self.negotiator.mark_as_wants_another_offer(offer.from, resource);
            }
            if offer.get.amount(resource) > 0 {
                self.negotiator.mark_as_not_selling(offer.from, resource);
            }
        }

        // a fresh offer from an offeree doubles as a rejection of ours
        if self.waiting.trade_response {
            self.offer_rejections[offer.from as usize] = true;
            self.check_everyone_rejected();
        }

        match self.negotiator.consider_offer(&self.game, &offer) {
            OfferResponse::Accept => {
                self.pause(1500);
                self.emit(Action::AcceptOffer { seat: offer.from });
                // replan around the new hand
                self.building_plan.clear();
                self.negotiator.set_target_piece(self.our_seat, None);
            }
            OfferResponse::Reject => {
                if !self.waiting.trade_response {
                    self.pause(1500);
                    self.emit(Action::RejectOffer);
                }
            }
            OfferResponse::Counter => {
                self.pause(1500);
                match self.negotiator.make_counter_offer(&self.game, &offer) {
                    Some(counter) => {
                        self.game.set_current_offer(self.our_seat, Some(counter.clone()));
                        self.offer_rejections[offer.from as usize] = false;
                        self.waiting.trade_response = true;
                        self.counter = 0;
                        self.emit(Action::OfferTrade { offer: counter });
                    }
                    None => self.emit(Action::RejectOffer),
                }
            }
            OfferResponse::Ignore => {}
        }
    }

    fn handle_reject_offer(&mut self, rejector: Seat) {
        let our_offer = self
            .game
            .player(self.our_seat)
            .and_then(|p| p.current_offer.clone());

        if let (Some(offer), true) = (our_offer, self.waiting.trade_response) {
            for resource in Resource::ALL {
                if offer.get.amount(resource) > 0
                    && !self.negotiator.wants_another_offer(rejector, resource)
                {
                    self.negotiator.mark_as_not_selling(rejector, resource);
                }
            }
            self.offer_rejections[rejector as usize] = true;
            self.check_everyone_rejected();
        } else {
            // learn from rejections of other players' offers too
            let offers: Vec<TradeOffer> = self
                .game
                .occupied_seats()
                .filter_map(|p| p.current_offer.clone())
                .collect();
            for offer in offers {
                if offer.to.get(rejector as usize).copied().unwrap_or(false) {
                    for resource in Resource::ALL {
                        if offer.get.amount(resource) > 0
                            && !self.negotiator.wants_another_offer(rejector, resource)
                        {
                            self.negotiator.mark_as_not_selling(rejector, resource);
                        }
                    }
                }
            }
        }
    }

    fn check_everyone_rejected(&mut self) {
        let Some(offer) = self
            .game
            .player(self.our_seat)
            .and_then(|p| p.current_offer.clone())
        else {
            return;
        };
        let everyone = offer
            .to
            .iter()
            .enumerate()
            .all(|(seat, &offered)| !offered || self.offer_rejections[seat]);
        if everyone {
            self.negotiator.add_to_offers_made(offer);
            self.emit(Action::ClearOffer);
            self.waiting.trade_response = false;
        }
    }

    /// Trade-response timeout: silence counts as rejection everywhere.
    fn trade_stop_waiting_clear_offer(&mut self) {
        let our_offer = self
            .game
            .player(self.our_seat)
            .and_then(|p| p.current_offer.clone());

        if let Some(offer) = our_offer {
            for resource in Resource::ALL {
                if offer.get.amount(resource) > 0 {
                    for (seat, &offered) in offer.to.iter().enumerate() {
                        if offered {
                            self.negotiator.mark_as_not_selling(seat as Seat, resource);
                            self.negotiator
                                .mark_as_not_wanting_another_offer(seat as Seat, resource);
                        }
                    }
                }
            }
            self.pause(1500);
            self.emit(Action::ClearOffer);
            self.pause(500);
            self.game.set_current_offer(self.our_seat, None);
        }

        self.counter = 0;
        self.waiting.trade_response = false;
    }

    // ==================== Failure recovery ====================

    fn handle_cancel_build_request(&mut self, kind: BuildKind) {
        match self.game.phase {
            GamePhase::InitSettle1A
            | GamePhase::InitSettle2A
            | GamePhase::InitSettle3A => {
                if self.our_turn {
                    self.cancel_wrong_piece_placement(kind);
                }
            }
            GamePhase::InitRoad1B | GamePhase::InitRoad2B | GamePhase::InitRoad3B => {
                if self.our_turn {
                    self.cancel_wrong_piece_placement(kind);
                } else {
                    // a human changed their mind about an initial settlement
                    let seat = self.game.current_seat;
                    if let Some(node) =
                        self.game.player(seat).and_then(|p| p.last_settlement)
                    {
                        self.game
                            .undo_put_piece(seat, PieceKind::Settlement, PieceCoord::Node(node));
                    }
                    self.trackers.set_pending_init_settlement(seat, None);
                }
            }
            GamePhase::Play
            | GamePhase::PlacingRoad
            | GamePhase::PlacingSettlement
            | GamePhase::PlacingCity
            | GamePhase::PlacingShip
            | GamePhase::PlacingFreeRoad1
            | GamePhase::PlacingFreeRoad2
            | GamePhase::SpecialBuilding => {
                self.cancel_wrong_piece_placement(kind);
            }
            _ => {
                warn!(
                    game = %self.game.name,
                    phase = ?self.game.phase,
                    "unhandled CancelBuildRequest"
                );
            }
        }
    }

    /// The server said our placement or purchase was illegal. Record it,
    /// invalidate it locally, and either retry (initial placement) or hand
    /// resources back and end the turn (ordinary play).
    fn cancel_wrong_piece_placement(&mut self, kind: BuildKind) {
        let cancel_buy_card = kind == BuildKind::Card;
        if cancel_buy_card {
            self.waiting.dev_card = false;
        } else {
            self.what_we_failed_to_build = self.what_we_want_to_build;
            self.failed_building_attempts += 1;
        }
        self.waiting.game_state = false;

        if self.game.is_initial_placement() {
            // the placement was refused before it was applied anywhere; just
            // ban the spot so the opening planner picks elsewhere
            if let Some(coord) = self.last_starting_piece {
                match coord {
                    PieceCoord::Node(node) => {
                        self.banned_init_nodes.insert(node);
                        self.trackers.cancel_piece(&self.game, PieceKind::Settlement, coord);
                    }
                    PieceCoord::Edge(edge) => {
                        self.banned_init_edges.insert(edge);
                        if let Some(dest) = self.opening.planned_road_destination() {
                            self.banned_init_nodes.insert(dest);
                        }
                        self.trackers.cancel_piece(&self.game, PieceKind::Road, coord);
                    }
                }
            }
            // re-enter the expectation for the phase we are still in
            match self.game.phase {
                GamePhase::InitSettle1A => {
                    self.expect.put_piece_from_init_settle_1a = false;
                    self.expect.init_settle_1a = true;
                }
                GamePhase::InitRoad1B => {
                    self.expect.put_piece_from_init_road_1b = false;
                    self.expect.init_road_1b = true;
                }
                GamePhase::InitSettle2A => {
                    self.expect.put_piece_from_init_settle_2a = false;
                    self.expect.init_settle_2a = true;
                }
                GamePhase::InitRoad2B => {
                    self.expect.put_piece_from_init_road_2b = false;
                    self.expect.init_road_2b = true;
                }
                GamePhase::InitSettle3A => {
                    self.expect.put_piece_from_init_settle_3a = false;
                    self.expect.init_settle_3a = true;
                }
                GamePhase::InitRoad3B => {
                    self.expect.put_piece_from_init_road_3b = false;
                    self.expect.init_road_3b = true;
                }
                _ => {}
            }
            // the loop's dead-man switch leaves the game past 2 * the cap
            return;
        }

        // ordinary play: invalidate the piece, give the resources back, and
        // end this turn rather than thrash against the rules
        if !cancel_buy_card {
            if let Some(wanted) = self.what_we_want_to_build {
                self.cancel_wrong_piece_placement_local(wanted);
            }
        }
        self.what_we_want_to_build = None;
        self.building_plan.clear();

        self.failed_building_attempts = self.config.max_denied_per_turn;
        self.expect.placing_road = false;
        self.expect.placing_settlement = false;
        self.expect.placing_city = false;
        self.expect.placing_ship = false;
        self.expect.placing_free_road1 = false;
        self.expect.placing_free_road2 = false;
        self.decided_if_special_build = true;

        if !cancel_buy_card {
            self.emit(Action::CancelBuildRequest { kind });
        }
        if self.our_turn {
            self.end_turn();
        }
    }

    /// Invalidate a refused piece in the trackers without talking to the
    /// server. The refused placement never reached the mirror (the server
    /// sends no echo for it), so only the lattice needs fixing; the
    /// dummy-cancel seat keeps tracker symmetry.
    fn cancel_wrong_piece_placement_local(&mut self, wanted: PlannedBuild) {
        self.trackers.cancel_piece(&self.game, wanted.kind, wanted.coord);
        self.what_we_want_to_build = None;
        self.building_plan.clear();
    }

    // ==================== Turn end & scenario ====================

    /// Attack the pirate fortress as the turn's last action, once enough
    /// warships escort the fleet. Returns true if the attack was requested.
    fn consider_scenario_turn_final_actions(&mut self) -> bool {
        let warships = self
            .game
            .player(self.our_seat)
            .map(|p| p.warships)
            .unwrap_or(0);
        if warships < 5 {
            return false;
        }
        if oracle::can_attack_pirate_fortress(&self.game, self.our_seat).is_none() {
            return false;
        }
        self.waiting.fortress_attack = true;
        self.emit(Action::SimpleRequest {
            kind: SimpleRequestKind::FortressAttack,
            p1: 0,
            p2: 0,
        });
        true
    }

    fn reset_fields_at_end_turn(&mut self) {
        self.waiting.game_state = true;
        self.counter = 0;
        self.expect.roll = true;
        self.waiting.our_turn = true;

        self.done_trading = !self.config.trade_flag;

        self.negotiator.reset_is_selling();
        self.negotiator.reset_offers_made();
        self.building_plan.clear();
        self.negotiator.reset_target_pieces();
    }

    fn end_turn(&mut self) {
        self.reset_fields_at_end_turn();
        self.pause(1500);
        self.emit(Action::EndTurn);
    }

    // ==================== Plumbing ====================

    fn emit(&mut self, action: Action) {
        let _ = self.actions.send(action);
    }

    /// Request a pacing pause after this step. Quartered in bots-only games;
    /// trimmed to three quarters in 6-player games unless a trade response
    /// is outstanding.
    fn pause(&mut self, ms: u64) {
        let scaled = if self.game.options.bots_only {
            ms / 4
        } else if self.config.pause_faster && !self.waiting.trade_response {
            ms / 2 + ms / 4
        } else {
            ms
        };
        self.pending_pause_ms += scaled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catan_core::{Board, GameOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn brain(our_seat: Seat) -> (RobotBrain, UnboundedReceiver<Action>) {
        let mut rng = StdRng::seed_from_u64(99);
        let board = Board::standard_with_rng(&mut rng);
        let mut game = Game::new("unit".into(), board, GameOptions::default());
        for seat in 0..4u8 {
            game.sit_down(seat, format!("p{seat}"));
        }
        let (tx, rx) = unbounded_channel();
        (RobotBrain::new(BotConfig::default(), game, our_seat, tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Action>) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Ok(action) = rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    fn placing_flag_count(e: &Expectations) -> usize {
        [
            e.placing_road,
            e.placing_settlement,
            e.placing_city,
            e.placing_ship,
            e.placing_robber,
            e.placing_free_road1,
            e.placing_free_road2,
        ]
        .iter()
        .filter(|&&f| f)
        .count()
    }

    #[test]
    fn pings_only_advance_counter_and_exit_at_threshold() {
        let (mut brain, mut rx) = brain(2);

        for _ in 0..100 {
            brain.step(Message::TimingPing);
        }
        assert_eq!(brain.counter(), 100);
        assert!(brain.is_alive());
        assert!(drain(&mut rx).is_empty());

        for _ in 100..15_001 {
            brain.step(Message::TimingPing);
        }
        assert!(!brain.is_alive());
        let actions = drain(&mut rx);
        assert!(actions.contains(&Action::LeaveGame { reason: "counter 15000".into() }));
    }

    #[test]
    fn at_most_one_placing_expectation_through_initial_placement() {
        let (mut brain, mut rx) = brain(2);

        let script = [
            Message::GameState { phase: GamePhase::InitSettle1A },
            Message::Turn { seat: 2 },
        ];
        for message in script {
            brain.step(message);
            assert!(placing_flag_count(brain.expectations()) <= 1);
        }

        // echo the placement back and walk into the road phase
        let actions = drain(&mut rx);
        let Some(Action::PutPiece { kind, coord }) = actions
            .iter()
            .find(|a| matches!(a, Action::PutPiece { .. }))
            .cloned()
        else {
            panic!("expected an initial settlement");
        };
        brain.step(Message::PutPiece { seat: 2, kind, coord });
        assert!(placing_flag_count(brain.expectations()) <= 1);
        brain.step(Message::GameState { phase: GamePhase::InitRoad1B });
        assert!(placing_flag_count(brain.expectations()) <= 1);
    }

    #[test]
    fn game_state_clears_waiting_flag() {
        let (mut brain, _rx) = brain(2);
        brain.step(Message::GameState { phase: GamePhase::InitSettle1A });
        brain.step(Message::Turn { seat: 2 });
        // placement request was sent; we wait for the server's answer
        assert!(brain.waits().game_state);

        brain.step(Message::GameState { phase: GamePhase::InitSettle1A });
        assert!(!brain.waits().game_state);
    }

    #[test]
    fn turn_message_resets_failure_state() {
        let (mut brain, _rx) = brain(2);
        brain.step(Message::GameState { phase: GamePhase::Play });
        brain.step(Message::Turn { seat: 2 });
        brain.step(Message::DevCardAction {
            seat: 2,
            op: DevCardOp::CannotPlay,
            card: DevCard::Knight,
        });
        // next turn of ours starts clean
        brain.step(Message::Turn { seat: 3 });
        brain.step(Message::Turn { seat: 2 });
        assert_eq!(brain.what_we_failed_to_build(), None);
    }

    #[test]
    fn shutdown_sentinel_kills_brain() {
        let (mut brain, mut rx) = brain(2);
        brain.step(Message::Shutdown);
        assert!(!brain.is_alive());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn queue_closure_ends_run_loop() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let (brain, _rx) = brain(2);
            let (queue_tx, queue_rx) = mpsc::channel(8);
            let task = tokio::spawn(brain.run(queue_rx));
            drop(queue_tx);
            task.await.expect("brain task should exit cleanly");
        });
    }
}

