//! Bookkeeping for broker subscriptions.
//!
//! Each logical topic is subscribed at most once per connection, and every
//! subscription id maps to exactly one [`Route`], so an inbound message is
//! handled once no matter how often a subscription was requested.

use std::collections::HashMap;

use microchess_protocol::{GameId, PlayerId, topics};

use crate::SubscriptionId;

/// Which handler an inbound message belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// The lobby-wide proposals topic.
    Proposals,
    /// This client's player topic.
    Player,
    /// One game's topic.
    Game(GameId),
}

impl Route {
    /// The broker destination for this route.
    pub fn destination(&self, player_id: &PlayerId) -> String {
        match self {
            Self::Proposals => topics::GAME_PROPOSALS_TOPIC.to_owned(),
            Self::Player => topics::player_topic(player_id),
            Self::Game(game_id) => topics::game_topic(game_id),
        }
    }
}

/// Tracks established subscriptions and routes inbound messages.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    established: HashMap<Route, SubscriptionId>,
    routes: HashMap<SubscriptionId, Route>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `route` already has a subscription.
    pub fn is_subscribed(&self, route: &Route) -> bool {
        self.established.contains_key(route)
    }

    /// Subscribes `route` through `subscribe` unless it already is.
    ///
    /// Returns `Ok(true)` if a new subscription was made and `Ok(false)` if
    /// it already existed. On error nothing is recorded, so the next call
    /// tries again.
    pub fn ensure<F, E>(&mut self, route: Route, subscribe: F) -> Result<bool, E>
    where
        F: FnOnce() -> Result<SubscriptionId, E>,
    {
        if self.is_subscribed(&route) {
            return Ok(false);
        }
        let id = subscribe()?;
        self.routes.insert(id.clone(), route.clone());
        self.established.insert(route, id);
        Ok(true)
    }

    /// Finds the route for an inbound message's subscription id.
    pub fn route(&self, subscription: &SubscriptionId) -> Option<&Route> {
        self.routes.get(subscription)
    }

    /// Forgets every subscription. Used when the connection that carried
    /// them is gone.
    pub fn reset(&mut self) {
        self.established.clear();
        self.routes.clear();
    }

    /// Number of established subscriptions.
    pub fn len(&self) -> usize {
        self.established.len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.established.is_empty()
    }
}
