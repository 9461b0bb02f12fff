//! Trade negotiation: judging incoming offers, producing our own offers and
//! counter-offers, and constructing bank or port trades.
//!
//! The negotiator keeps per-seat beliefs learned from table talk: who is
//! selling which resource, and who would like to see another offer for one.
//! Both belief tables reset at every turn.

use crate::possible::PossiblePiece;
use crate::speed::BuildSpeed;
use catan_core::player::{ResourceSet, TradeOffer, MAX_SEATS};
use catan_core::{Game, Resource, Seat};

/// Our verdict on an incoming offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResponse {
    Accept,
    Reject,
    Counter,
    /// Not addressed to us, or nothing to say.
    Ignore,
}

/// Negotiation state for one brain.
#[derive(Debug, Clone)]
pub struct Negotiator {
    our_seat: Seat,
    is_selling: [[bool; 5]; MAX_SEATS],
    wants_another_offer: [[bool; 5]; MAX_SEATS],
    offers_made: Vec<TradeOffer>,
    target_pieces: [Option<PossiblePiece>; MAX_SEATS],
}

impl Negotiator {
    pub fn new(our_seat: Seat) -> Self {
        Self {
            our_seat,
            is_selling: [[true; 5]; MAX_SEATS],
            wants_another_offer: [[false; 5]; MAX_SEATS],
            offers_made: Vec::new(),
            target_pieces: std::array::from_fn(|_| None),
        }
    }

    // ---- belief bookkeeping ----

    pub fn reset_is_selling(&mut self) {
        self.is_selling = [[true; 5]; MAX_SEATS];
    }

    pub fn mark_as_not_selling(&mut self, seat: Seat, resource: Resource) {
        if (seat as usize) < MAX_SEATS {
            self.is_selling[seat as usize][resource.index()] = false;
        }
    }

    pub fn is_selling(&self, seat: Seat, resource: Resource) -> bool {
        self.is_selling
            .get(seat as usize)
            .map(|row| row[resource.index()])
            .unwrap_or(false)
    }

    pub fn reset_wants_another_offer(&mut self) {
        self.wants_another_offer = [[false; 5]; MAX_SEATS];
    }

    pub fn mark_as_wants_another_offer(&mut self, seat: Seat, resource: Resource) {
        if (seat as usize) < MAX_SEATS {
            self.wants_another_offer[seat as usize][resource.index()] = true;
        }
    }

    pub fn mark_as_not_wanting_another_offer(&mut self, seat: Seat, resource: Resource) {
        if (seat as usize) < MAX_SEATS {
            self.wants_another_offer[seat as usize][resource.index()] = false;
        }
    }

    pub fn wants_another_offer(&self, seat: Seat, resource: Resource) -> bool {
        self.wants_another_offer
            .get(seat as usize)
            .map(|row| row[resource.index()])
            .unwrap_or(false)
    }

    pub fn reset_offers_made(&mut self) {
        self.offers_made.clear();
    }

    pub fn add_to_offers_made(&mut self, offer: TradeOffer) {
        self.offers_made.push(offer);
    }

    fn already_offered(&self, offer: &TradeOffer) -> bool {
        self.offers_made
            .iter()
            .any(|o| o.give == offer.give && o.get == offer.get)
    }

    pub fn set_target_piece(&mut self, seat: Seat, piece: Option<PossiblePiece>) {
        if (seat as usize) < MAX_SEATS {
            self.target_pieces[seat as usize] = piece;
        }
    }

    pub fn reset_target_pieces(&mut self) {
        self.target_pieces = std::array::from_fn(|_| None);
    }

    pub fn target_piece(&self, seat: Seat) -> Option<&PossiblePiece> {
        self.target_pieces.get(seat as usize).and_then(Option::as_ref)
    }

    // ---- considering incoming offers ----

    /// Judge an offer addressed to us against our current target piece.
    pub fn consider_offer(&self, game: &Game, offer: &TradeOffer) -> OfferResponse {
        if offer.from == self.our_seat
            || !offer.to.get(self.our_seat as usize).copied().unwrap_or(false)
        {
            return OfferResponse::Ignore;
        }
        let Some(target) = self.target_piece(self.our_seat) else {
            return OfferResponse::Reject;
        };
        let Some(us) = game.player(self.our_seat) else {
            return OfferResponse::Ignore;
        };

        let cost = target.resources_to_build();

        // does their give-set move us toward the target at all?
        let helps = Resource::ALL.iter().any(|&r| {
            offer.give.amount(r) > 0 && us.resources.amount(r) < cost.amount(r)
        });
        if !helps {
            return OfferResponse::Reject;
        }

        if !us.resources.contains(&offer.get) {
            // we want what they give but cannot pay their price
            return OfferResponse::Counter;
        }

        // would paying set our target back further than their gives help?
        let speed = BuildSpeed::for_seat(game, self.our_seat);
        let eta_now = speed.rolls_until(&us.resources, &cost);
        let mut after = us.resources.clone();
        after.add_set(&offer.give);
        after.subtract_set(&offer.get);
        let eta_after = speed.rolls_until(&after, &cost);

        if eta_after < eta_now {
            OfferResponse::Accept
        } else if eta_after > eta_now {
            OfferResponse::Reject
        } else {
            OfferResponse::Counter
        }
    }

    // ---- making offers ----

    /// Offer one spare resource for the resource the target waits longest
    /// for, addressed to every seat still believed to sell it. Declines by
    /// returning None.
    pub fn make_offer(&self, game: &Game, target: &PossiblePiece) -> Option<TradeOffer> {
        let us = game.player(self.our_seat)?;
        let cost = target.resources_to_build();
        let speed = BuildSpeed::for_seat(game, self.our_seat);

        let wanted = speed.most_needed(&us.resources, &cost)?;

        // most-held resource beyond what the target needs
        let spare = Resource::ALL
            .iter()
            .copied()
            .filter(|&r| r != wanted && us.resources.amount(r) > cost.amount(r))
            .max_by_key(|&r| us.resources.amount(r) - cost.amount(r))?;

        let mut to = [false; MAX_SEATS];
        let mut anyone = false;
        for player in game.occupied_seats() {
            if player.seat != self.our_seat && self.is_selling(player.seat, wanted) {
                to[player.seat as usize] = true;
                anyone = true;
            }
        }
        if !anyone {
            return None;
        }

        let offer = TradeOffer::new(
            self.our_seat,
            to,
            ResourceSet::single(spare, 1),
            ResourceSet::single(wanted, 1),
        );
        if self.already_offered(&offer) {
            return None;
        }
        Some(offer)
    }

    /// Counter an incoming offer: same goods, our price, addressed only to
    /// the original offerer.
    pub fn make_counter_offer(&self, game: &Game, theirs: &TradeOffer) -> Option<TradeOffer> {
        let us = game.player(self.our_seat)?;
        let target = self.target_piece(self.our_seat)?;
        let cost = target.resources_to_build();

        // what of their give-set do we actually want?
        let wanted = Resource::ALL
            .iter()
            .copied()
            .find(|&r| theirs.give.amount(r) > 0 && us.resources.amount(r) < cost.amount(r))?;

        let spare = Resource::ALL
            .iter()
            .copied()
            .filter(|&r| r != wanted && us.resources.amount(r) > cost.amount(r))
            .max_by_key(|&r| us.resources.amount(r) - cost.amount(r))?;

        let mut to = [false; MAX_SEATS];
        to[theirs.from as usize] = true;

        Some(TradeOffer::new(
            self.our_seat,
            to,
            ResourceSet::single(spare, 1),
            ResourceSet::single(wanted, 1),
        ))
    }

    /// Bank or port trade toward the target resources, if our spare pile
    /// covers the rate. Returns (give, get).
    pub fn offer_to_bank(
        &self,
        game: &Game,
        target: &ResourceSet,
    ) -> Option<(ResourceSet, ResourceSet)> {
        let us = game.player(self.our_seat)?;
        if us.resources.contains(target) {
            return None;
        }
        let speed = BuildSpeed::for_seat(game, self.our_seat);
        let wanted = speed.most_needed(&us.resources, target)?;

        for give in Resource::ALL {
            if give == wanted {
                continue;
            }
            let rate = us.trade_rate(give);
            let spare = us.resources.amount(give).saturating_sub(target.amount(give));
            if spare >= rate {
                return Some((ResourceSet::single(give, rate), ResourceSet::single(wanted, 1)));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catan_core::hex::{EdgeDirection, HexCoord, NodeDirection};
    use catan_core::{Board, GameOptions, NodeCoord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn game() -> Game {
        let mut rng = StdRng::seed_from_u64(29);
        let board = Board::standard_with_rng(&mut rng);
        let mut game = Game::new("nego".into(), board, GameOptions::default());
        for seat in 0..4u8 {
            game.sit_down(seat, format!("p{seat}"));
        }
        game
    }

    fn city_target() -> PossiblePiece {
        PossiblePiece::city(0, NodeCoord::new(HexCoord::new(0, 0), NodeDirection::North))
    }

    use catan_core::EdgeCoord;

    fn road_target() -> PossiblePiece {
        PossiblePiece::road(0, EdgeCoord::new(HexCoord::new(0, 0), EdgeDirection::East))
    }

    #[test]
    fn selling_flags_reset_to_optimistic() {
        let mut n = Negotiator::new(0);
        n.mark_as_not_selling(2, Resource::Ore);
        assert!(!n.is_selling(2, Resource::Ore));
        n.reset_is_selling();
        assert!(n.is_selling(2, Resource::Ore));
    }

    #[test]
    fn offer_not_addressed_to_us_is_ignored() {
        let g = game();
        let n = Negotiator::new(0);
        let offer = TradeOffer::new(
            1,
            [false, false, true, false, false, false],
            ResourceSet::single(Resource::Ore, 1),
            ResourceSet::single(Resource::Wood, 1),
        );
        assert_eq!(n.consider_offer(&g, &offer), OfferResponse::Ignore);
    }

    #[test]
    fn helpful_affordable_offer_is_accepted() {
        let mut g = game();
        // we build a road and lack wood; they give wood for spare ore
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(1, 2, 0, 0, 0);
        let mut n = Negotiator::new(0);
        n.set_target_piece(0, Some(road_target()));

        let offer = TradeOffer::new(
            1,
            [true, false, false, false, false, false],
            ResourceSet::single(Resource::Wood, 1),
            ResourceSet::single(Resource::Ore, 1),
        );
        assert_eq!(n.consider_offer(&g, &offer), OfferResponse::Accept);
    }

    #[test]
    fn unhelpful_offer_is_rejected() {
        let mut g = game();
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(1, 0, 0, 0, 1);
        let mut n = Negotiator::new(0);
        n.set_target_piece(0, Some(road_target()));

        // sheep does nothing for a road
        let offer = TradeOffer::new(
            1,
            [true, false, false, false, false, false],
            ResourceSet::single(Resource::Sheep, 1),
            ResourceSet::single(Resource::Clay, 1),
        );
        assert_eq!(n.consider_offer(&g, &offer), OfferResponse::Reject);
    }

    #[test]
    fn unpayable_price_draws_counter() {
        let mut g = game();
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(1, 0, 0, 0, 0);
        let mut n = Negotiator::new(0);
        n.set_target_piece(0, Some(road_target()));

        // they give wood (we need it) but want sheep we do not hold
        let offer = TradeOffer::new(
            1,
            [true, false, false, false, false, false],
            ResourceSet::single(Resource::Wood, 1),
            ResourceSet::single(Resource::Sheep, 1),
        );
        assert_eq!(n.consider_offer(&g, &offer), OfferResponse::Counter);
    }

    #[test]
    fn make_offer_targets_believed_sellers() {
        let mut g = game();
        // city needs 3 ore 2 wheat; we have wheat and spare wood
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(0, 0, 0, 2, 3);
        let mut n = Negotiator::new(0);

        let offer = n.make_offer(&g, &city_target()).unwrap();
        assert_eq!(offer.get, ResourceSet::single(Resource::Ore, 1));
        assert_eq!(offer.give, ResourceSet::single(Resource::Wood, 1));
        assert!(!offer.to[0]);
        assert!(offer.to[1] && offer.to[2] && offer.to[3]);

        n.mark_as_not_selling(1, Resource::Ore);
        n.mark_as_not_selling(2, Resource::Ore);
        n.mark_as_not_selling(3, Resource::Ore);
        assert!(n.make_offer(&g, &city_target()).is_none());
    }

    #[test]
    fn repeated_offer_is_suppressed() {
        let mut g = game();
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(0, 0, 0, 2, 3);
        let mut n = Negotiator::new(0);

        let offer = n.make_offer(&g, &city_target()).unwrap();
        n.add_to_offers_made(offer);
        assert!(n.make_offer(&g, &city_target()).is_none());
    }

    #[test]
    fn bank_offer_keeps_target_resources_and_uses_port_rate() {
        let mut g = game();
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(0, 0, 0, 0, 4);
        let n = Negotiator::new(0);

        // road needs 1 clay, 1 wood; only 3 wood are spare, below the 4:1 rate
        assert!(n.offer_to_bank(&g, &catan_core::costs::road()).is_none());

        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(0, 0, 0, 0, 5);
        let (give, get) = n.offer_to_bank(&g, &catan_core::costs::road()).unwrap();
        assert_eq!(give, ResourceSet::single(Resource::Wood, 4));
        assert_eq!(get, ResourceSet::single(Resource::Clay, 1));

        // a misc port drops the rate to 3:1
        g.player_mut(0).unwrap().misc_port = true;
        g.player_mut(0).unwrap().resources = ResourceSet::with_amounts(0, 0, 0, 0, 4);
        let (give, _) = n.offer_to_bank(&g, &catan_core::costs::road()).unwrap();
        assert_eq!(give, ResourceSet::single(Resource::Wood, 3));
    }
}
