//! Wire messages between the server and a robot client.
//!
//! One tagged enum per direction: `Message` for everything the server sends
//! (plus the local pinger's `TimingPing` and the kill sentinel), `Action` for
//! everything the bot may send back. Frames are JSON text messages over the
//! WebSocket; the exact framing is not load-bearing, the variant roles are.

use crate::board::{Resource, Seat, TileId};
use crate::game::GamePhase;
use crate::hex::{EdgeCoord, NodeCoord};
use crate::player::{DevCard, ResourceSet, TradeOffer};
use serde::{Deserialize, Serialize};

/// Board piece kinds that can be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceKind {
    Road,
    Settlement,
    City,
    Ship,
}

/// Where a piece sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceCoord {
    Node(NodeCoord),
    Edge(EdgeCoord),
}

impl PieceCoord {
    pub fn node(self) -> Option<NodeCoord> {
        match self {
            PieceCoord::Node(n) => Some(n),
            PieceCoord::Edge(_) => None,
        }
    }

    pub fn edge(self) -> Option<EdgeCoord> {
        match self {
            PieceCoord::Edge(e) => Some(e),
            PieceCoord::Node(_) => None,
        }
    }
}

/// Target of a build or cancel request. Beyond the four piece kinds the wire
/// has two sentinels: a Special Building slot request and a dev-card buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildKind {
    Road,
    Settlement,
    City,
    Ship,
    /// Sentinel -2 on the legacy wire: buy (or cancel buying) a dev card.
    Card,
    /// Sentinel -1 on the legacy wire: request a Special Building slot.
    SpecialBuild,
}

impl BuildKind {
    /// Legacy numeric code, kept for log parity with the original protocol.
    pub fn code(self) -> i32 {
        match self {
            BuildKind::Road => 0,
            BuildKind::Settlement => 1,
            BuildKind::City => 2,
            BuildKind::Ship => 3,
            BuildKind::SpecialBuild => -1,
            BuildKind::Card => -2,
        }
    }

    pub fn piece(self) -> Option<PieceKind> {
        match self {
            BuildKind::Road => Some(PieceKind::Road),
            BuildKind::Settlement => Some(PieceKind::Settlement),
            BuildKind::City => Some(PieceKind::City),
            BuildKind::Ship => Some(PieceKind::Ship),
            _ => None,
        }
    }
}

impl From<PieceKind> for BuildKind {
    fn from(kind: PieceKind) -> Self {
        match kind {
            PieceKind::Road => BuildKind::Road,
            PieceKind::Settlement => BuildKind::Settlement,
            PieceKind::City => BuildKind::City,
            PieceKind::Ship => BuildKind::Ship,
        }
    }
}

/// Which per-player counter a `PlayerElement` touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementField {
    Roads,
    Settlements,
    Cities,
    Ships,
    Knights,
    Clay,
    Ore,
    Sheep,
    Wheat,
    Wood,
    Unknown,
    /// Warship count in the pirate-islands scenario.
    Warships,
    /// Whether the seat has requested Special Building.
    AskSpecialBuild,
    /// Longest-road holder flag (value 0 or 1).
    LongestRoad,
    /// Largest-army holder flag (value 0 or 1).
    LargestArmy,
}

/// How a `PlayerElement` changes the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementOp {
    Set,
    Gain,
    Lose,
}

/// Dev-card inventory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevCardOp {
    /// Drawn this turn (goes to the new pile).
    Draw,
    /// Played from the aged pile.
    Play,
    AddOld,
    AddNew,
    /// Server refusal: the requested card cannot be played this turn.
    CannotPlay,
}

/// Simple request kinds the brain cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleRequestKind {
    /// Attack the pirate fortress (pirate-islands scenario).
    FortressAttack,
    /// Anything else; ignored by the brain.
    Other,
}

/// Simple action kinds the brain cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleActionKind {
    /// Bank or port trade completed; sent only to the trading player.
    TradeSuccessful,
    /// Dev card purchase completed.
    DevCardBought,
    Other,
}

/// Special-item operations (scenario wonders etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialItemOp {
    Set,
    Clear,
    Pick,
    Decline,
}

/// Everything the brain dequeues. Server messages, plus the companion
/// pinger's once-per-second tick, plus the local kill sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    // ---- lifecycle ----
    SitDown { seat: Seat, name: String, robot: bool },
    RobotDismiss,
    Reset,

    // ---- game phase ----
    GameState { phase: GamePhase },
    Turn { seat: Seat },
    FirstPlayer { seat: Seat },
    SetTurn { seat: Seat },

    // ---- placement ----
    PutPiece { seat: Seat, kind: PieceKind, coord: PieceCoord },
    MovePiece { seat: Seat, kind: PieceKind, from: EdgeCoord, to: EdgeCoord },
    /// Server to client: your last placement or purchase was illegal.
    CancelBuildRequest { kind: BuildKind },

    // ---- economy ----
    PlayerElement { seat: Seat, field: ElementField, op: ElementOp, value: u32 },
    /// Authoritative total-hand assertion for a seat.
    ResourceCount { seat: Seat, total: u32 },
    DevCardCount { total: u32 },
    DevCardAction { seat: Seat, op: DevCardOp, card: DevCard },
    SetPlayedDevCard { seat: Seat, played: bool },

    // ---- dice & robber ----
    DiceResult { roll: u8 },
    DiscardRequest { count: u32 },
    /// Sign-encoded: positive tile id moves the robber, negative the pirate.
    MoveRobber { hex: TileId },
    ChoosePlayerRequest { choices: Vec<bool> },
    ChoosePlayer { choice: i32 },
    /// Gold-hex pick: choose `count` free resources.
    PickResourcesRequest { count: u32 },

    // ---- trade ----
    MakeOffer { offer: TradeOffer },
    /// seat -1 clears every seat's offer.
    ClearOffer { seat: i32 },
    AcceptOffer { offering: Seat, accepting: Seat },
    RejectOffer { seat: Seat },

    // ---- scenario ----
    /// seat -1 answers a denied request of ours.
    SimpleRequest { seat: i32, kind: SimpleRequestKind, p1: i32, p2: i32 },
    SimpleAction { seat: Seat, kind: SimpleActionKind, p1: i32, p2: i32 },
    SetSpecialItem { op: SpecialItemOp, type_key: String, game_index: i32, player_index: i32 },
    PirateFortressAttackResult { seat: Seat, won: bool },

    // ---- timekeeping & local control ----
    /// Once-per-second tick from the companion pinger task.
    TimingPing,
    /// Local kill sentinel enqueued by `kill()`; never sent by the server.
    Shutdown,
}

/// Everything the brain may emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Action {
    RollDice,
    PutPiece { kind: PieceKind, coord: PieceCoord },
    BuildRequest { kind: BuildKind },
    BuyDevCard,
    PlayDevCard { card: DevCard },
    PickFreeResources { set: ResourceSet },
    DiscoveryPick { set: ResourceSet },
    MonopolyPick { resource: Resource },
    Discard { set: ResourceSet },
    /// Sign-encoded like the inbound form.
    MoveRobber { hex: TileId },
    /// A seat number, or `-(seat + 1)` to rob cloth instead of a resource.
    ChoosePlayer { choice: i32 },
    BankTrade { give: ResourceSet, get: ResourceSet },
    OfferTrade { offer: TradeOffer },
    AcceptOffer { seat: Seat },
    RejectOffer,
    ClearOffer,
    PickSpecialItem { type_key: String, game_index: i32, player_index: i32 },
    SimpleRequest { kind: SimpleRequestKind, p1: i32, p2: i32 },
    EndTurn,
    LeaveGame { reason: String },
    /// Ask the server to resend its last message to us.
    Resend,
    /// Free-text chat line, used for diagnostics only.
    SendText { text: String },
    /// Client to server: give back the resources of a refused build.
    CancelBuildRequest { kind: BuildKind },
}
