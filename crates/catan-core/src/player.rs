//! Per-seat player state: resources, development cards, pieces, ports.
//!
//! Opponent hands are partially hidden, so `ResourceSet` carries an `unknown`
//! pool alongside the five known resources. Our own seat's hand never holds
//! unknowns; for opponents, losses beyond what we believe they hold are
//! debited from the pool, and a server resource-count assertion that
//! disagrees with the mirror flattens the hand to all-unknown.

use crate::board::{Resource, Seat};
use crate::hex::{EdgeCoord, NodeCoord};
use serde::{Deserialize, Serialize};

/// Maximum seats at a table (6-player scenario).
pub const MAX_SEATS: usize = 6;

/// A multiset of resources, with an `unknown` pool for hidden opponent cards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub clay: u32,
    pub ore: u32,
    pub sheep: u32,
    pub wheat: u32,
    pub wood: u32,
    pub unknown: u32,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_amounts(clay: u32, ore: u32, sheep: u32, wheat: u32, wood: u32) -> Self {
        Self {
            clay,
            ore,
            sheep,
            wheat,
            wood,
            unknown: 0,
        }
    }

    pub fn single(resource: Resource, amount: u32) -> Self {
        let mut set = Self::new();
        set.add(resource, amount);
        set
    }

    pub fn amount(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Clay => self.clay,
            Resource::Ore => self.ore,
            Resource::Sheep => self.sheep,
            Resource::Wheat => self.wheat,
            Resource::Wood => self.wood,
        }
    }

    pub fn set_amount(&mut self, resource: Resource, amount: u32) {
        match resource {
            Resource::Clay => self.clay = amount,
            Resource::Ore => self.ore = amount,
            Resource::Sheep => self.sheep = amount,
            Resource::Wheat => self.wheat = amount,
            Resource::Wood => self.wood = amount,
        }
    }

    pub fn add(&mut self, resource: Resource, amount: u32) {
        self.set_amount(resource, self.amount(resource) + amount);
    }

    /// Remove `amount` of a known resource; whatever the hand does not hold
    /// is debited from the unknown pool instead. Total never goes negative.
    pub fn lose(&mut self, resource: Resource, amount: u32) {
        let have = self.amount(resource);
        if amount <= have {
            self.set_amount(resource, have - amount);
        } else {
            self.set_amount(resource, 0);
            self.unknown = self.unknown.saturating_sub(amount - have);
        }
    }

    /// Remove unknown resources. Known resources are converted to unknown
    /// first, because we no longer know which cards remain.
    pub fn lose_unknown(&mut self, amount: u32) {
        let total = self.total();
        *self = Self {
            unknown: total.saturating_sub(amount),
            ..Self::new()
        };
    }

    /// Total cards including the unknown pool.
    pub fn total(&self) -> u32 {
        self.clay + self.ore + self.sheep + self.wheat + self.wood + self.unknown
    }

    /// Total of the five known resources only.
    pub fn known_total(&self) -> u32 {
        self.clay + self.ore + self.sheep + self.wheat + self.wood
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Flatten to all-unknown of the given total.
    pub fn flatten_to_unknown(&mut self, total: u32) {
        *self = Self {
            unknown: total,
            ..Self::new()
        };
    }

    /// Do we hold at least this much of each known resource?
    pub fn contains(&self, other: &ResourceSet) -> bool {
        Resource::ALL.iter().all(|&r| self.amount(r) >= other.amount(r))
            && self.unknown >= other.unknown
    }

    pub fn add_set(&mut self, other: &ResourceSet) {
        for r in Resource::ALL {
            self.add(r, other.amount(r));
        }
        self.unknown += other.unknown;
    }

    pub fn subtract_set(&mut self, other: &ResourceSet) {
        for r in Resource::ALL {
            self.lose(r, other.amount(r));
        }
        self.unknown = self.unknown.saturating_sub(other.unknown);
    }
}

/// Building costs.
pub mod costs {
    use super::ResourceSet;

    /// 1 clay, 1 wood
    pub fn road() -> ResourceSet {
        ResourceSet::with_amounts(1, 0, 0, 0, 1)
    }

    /// 1 sheep, 1 wood
    pub fn ship() -> ResourceSet {
        ResourceSet::with_amounts(0, 0, 1, 0, 1)
    }

    /// 1 clay, 1 sheep, 1 wheat, 1 wood
    pub fn settlement() -> ResourceSet {
        ResourceSet::with_amounts(1, 0, 1, 1, 1)
    }

    /// 3 ore, 2 wheat
    pub fn city() -> ResourceSet {
        ResourceSet::with_amounts(0, 3, 0, 2, 0)
    }

    /// 1 ore, 1 sheep, 1 wheat
    pub fn dev_card() -> ResourceSet {
        ResourceSet::with_amounts(0, 1, 1, 1, 0)
    }
}

/// Development card types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevCard {
    Knight,
    /// Road Building: two free road/ship placements
    Roads,
    /// Discovery / Year of Plenty: two free resources
    Discovery,
    Monopoly,
    VictoryPoint,
}

impl DevCard {
    pub const ALL: [DevCard; 5] = [
        DevCard::Knight,
        DevCard::Roads,
        DevCard::Discovery,
        DevCard::Monopoly,
        DevCard::VictoryPoint,
    ];

    fn index(self) -> usize {
        match self {
            DevCard::Knight => 0,
            DevCard::Roads => 1,
            DevCard::Discovery => 2,
            DevCard::Monopoly => 3,
            DevCard::VictoryPoint => 4,
        }
    }

    pub fn is_playable(self) -> bool {
        !matches!(self, DevCard::VictoryPoint)
    }
}

/// A player's development cards, split into cards aged at least one turn
/// (playable now) and cards drawn this turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevCardInventory {
    old: [u32; 5],
    new: [u32; 5],
}

impl DevCardInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_old(&mut self, card: DevCard, amount: u32) {
        self.old[card.index()] += amount;
    }

    pub fn add_new(&mut self, card: DevCard, amount: u32) {
        self.new[card.index()] += amount;
    }

    /// Remove a played card from the aged pile.
    pub fn remove_old(&mut self, card: DevCard) {
        let slot = &mut self.old[card.index()];
        *slot = slot.saturating_sub(1);
    }

    pub fn has_playable(&self, card: DevCard) -> bool {
        card.is_playable() && self.old[card.index()] > 0
    }

    pub fn amount_old(&self, card: DevCard) -> u32 {
        self.old[card.index()]
    }

    pub fn amount_new(&self, card: DevCard) -> u32 {
        self.new[card.index()]
    }

    pub fn total(&self) -> u32 {
        self.old.iter().sum::<u32>() + self.new.iter().sum::<u32>()
    }

    /// Age this turn's draws so they become playable next turn.
    pub fn promote_new(&mut self) {
        for i in 0..5 {
            self.old[i] += self.new[i];
            self.new[i] = 0;
        }
    }
}

/// A trade offer between seats: the give-set, the get-set and the mask of
/// seats it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub from: Seat,
    pub to: [bool; MAX_SEATS],
    pub give: ResourceSet,
    pub get: ResourceSet,
}

impl TradeOffer {
    pub fn new(from: Seat, to: [bool; MAX_SEATS], give: ResourceSet, get: ResourceSet) -> Self {
        Self { from, to, give, get }
    }

    pub fn is_valid(&self) -> bool {
        !self.give.is_empty() && !self.get.is_empty() && self.to.iter().any(|&t| t)
    }
}

/// One seat's mirrored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub seat: Seat,
    pub name: String,
    pub resources: ResourceSet,
    pub inventory: DevCardInventory,
    pub played_dev_card_this_turn: bool,
    /// Knights played, toward Largest Army.
    pub knights_played: u32,
    /// Converted warships, in the pirate-islands scenario.
    pub warships: u32,
    pub has_longest_road: bool,
    pub has_largest_army: bool,
    pub settlements_remaining: u32,
    pub cities_remaining: u32,
    pub roads_remaining: u32,
    pub ships_remaining: u32,
    pub settlements: Vec<NodeCoord>,
    pub cities: Vec<NodeCoord>,
    pub roads_and_ships: Vec<EdgeCoord>,
    /// Most recent placements, for initial-placement bookkeeping.
    pub last_settlement: Option<NodeCoord>,
    pub last_road: Option<EdgeCoord>,
    pub misc_port: bool,
    pub resource_ports: [bool; 5],
    pub current_offer: Option<TradeOffer>,
}

impl Player {
    pub fn new(seat: Seat, name: String) -> Self {
        Self {
            seat,
            name,
            resources: ResourceSet::new(),
            inventory: DevCardInventory::new(),
            played_dev_card_this_turn: false,
            knights_played: 0,
            warships: 0,
            has_longest_road: false,
            has_largest_army: false,
            settlements_remaining: 5,
            cities_remaining: 4,
            roads_remaining: 15,
            ships_remaining: 15,
            settlements: Vec::new(),
            cities: Vec::new(),
            roads_and_ships: Vec::new(),
            last_settlement: None,
            last_road: None,
            misc_port: false,
            resource_ports: [false; 5],
            current_offer: None,
        }
    }

    pub fn has_resource_port(&self, resource: Resource) -> bool {
        self.resource_ports[resource.index()]
    }

    /// Best maritime rate for giving away this resource: 2, 3 or 4.
    pub fn trade_rate(&self, resource: Resource) -> u32 {
        if self.has_resource_port(resource) {
            2
        } else if self.misc_port {
            3
        } else {
            4
        }
    }

    /// Per-turn reset when this seat's turn begins.
    pub fn reset_for_turn(&mut self) {
        self.played_dev_card_this_turn = false;
        self.inventory.promote_new();
        self.current_offer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_set_totals() {
        let set = ResourceSet::with_amounts(1, 2, 3, 4, 5);
        assert_eq!(set.total(), 15);
        assert_eq!(set.known_total(), 15);
    }

    #[test]
    fn lose_overdraw_debits_unknown_pool() {
        let mut set = ResourceSet::with_amounts(1, 0, 0, 0, 0);
        set.unknown = 3;
        set.lose(Resource::Clay, 2);
        assert_eq!(set.clay, 0);
        assert_eq!(set.unknown, 2);
        assert_eq!(set.total(), 2);
    }

    #[test]
    fn lose_unknown_flattens_known_resources() {
        let mut set = ResourceSet::with_amounts(2, 0, 1, 0, 0);
        set.unknown = 1;
        set.lose_unknown(2);
        assert_eq!(set.known_total(), 0);
        assert_eq!(set.unknown, 2);
    }

    #[test]
    fn contains_and_subtract() {
        let mut hand = ResourceSet::with_amounts(2, 2, 2, 2, 2);
        let cost = costs::settlement();
        assert!(hand.contains(&cost));
        hand.subtract_set(&cost);
        assert_eq!(hand, ResourceSet::with_amounts(1, 2, 1, 1, 1));
        assert!(!hand.contains(&costs::city()));
    }

    #[test]
    fn building_costs() {
        assert_eq!(costs::road().total(), 2);
        assert_eq!(costs::ship().total(), 2);
        assert_eq!(costs::settlement().total(), 4);
        assert_eq!(costs::city().total(), 5);
        assert_eq!(costs::dev_card().total(), 3);
    }

    #[test]
    fn inventory_ages_new_cards() {
        let mut inv = DevCardInventory::new();
        inv.add_new(DevCard::Knight, 1);
        assert!(!inv.has_playable(DevCard::Knight));

        inv.promote_new();
        assert!(inv.has_playable(DevCard::Knight));

        inv.remove_old(DevCard::Knight);
        assert!(!inv.has_playable(DevCard::Knight));
    }

    #[test]
    fn victory_point_cards_are_never_playable() {
        let mut inv = DevCardInventory::new();
        inv.add_old(DevCard::VictoryPoint, 2);
        assert!(!inv.has_playable(DevCard::VictoryPoint));
    }

    #[test]
    fn trade_rate_prefers_best_port() {
        let mut p = Player::new(0, "bot".into());
        assert_eq!(p.trade_rate(Resource::Ore), 4);
        p.misc_port = true;
        assert_eq!(p.trade_rate(Resource::Ore), 3);
        p.resource_ports[Resource::Ore.index()] = true;
        assert_eq!(p.trade_rate(Resource::Ore), 2);
        assert_eq!(p.trade_rate(Resource::Wood), 3);
    }

    #[test]
    fn turn_reset_promotes_and_clears() {
        let mut p = Player::new(1, "bot".into());
        p.played_dev_card_this_turn = true;
        p.inventory.add_new(DevCard::Monopoly, 1);
        p.current_offer = Some(TradeOffer::new(
            1,
            [true, false, false, false, false, false],
            ResourceSet::single(Resource::Clay, 1),
            ResourceSet::single(Resource::Ore, 1),
        ));

        p.reset_for_turn();
        assert!(!p.played_dev_card_this_turn);
        assert!(p.inventory.has_playable(DevCard::Monopoly));
        assert!(p.current_offer.is_none());
    }
}
