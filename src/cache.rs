//! Live model of the channels the client is in and the users it has seen.
//!
//! The cache only stores and looks up; it never creates entities on its own.
//! [`CacheUpdater`] is the event-bus subscriber that applies JOIN and PART.
//! Users are never expired.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::casemap::irc_to_lower;
use crate::event::{Event, EventBus, EventKind, Membership, SubscriptionId};
use crate::hostmask::Hostmask;

/// Channel type prefixes stripped from names.
pub const CHANNEL_PREFIXES: &[char] = &['#', '&', '+', '!'];

/// Strip one leading channel prefix.
pub fn normalize_channel(name: &str) -> &str {
    name.strip_prefix(CHANNEL_PREFIXES).unwrap_or(name)
}

/// Whether `name` looks like a channel rather than a nick.
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with(CHANNEL_PREFIXES)
}

fn channel_key(name: &str) -> String {
    irc_to_lower(normalize_channel(name))
}

fn user_key(nick: &str) -> String {
    irc_to_lower(nick)
}

/// A user, identified by nickname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub hostmask: Hostmask,
}

impl User {
    pub fn new(hostmask: Hostmask) -> Self {
        Self { hostmask }
    }

    pub fn nick(&self) -> &str {
        &self.hostmask.nick
    }
}

/// A channel and its members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    /// Name without its prefix.
    pub name: String,
    pub topic: String,
    members: BTreeMap<String, User>,
}

impl Channel {
    /// `name` may carry its prefix; it is stripped.
    pub fn new(name: &str, topic: impl Into<String>) -> Self {
        Self {
            name: normalize_channel(name).to_owned(),
            topic: topic.into(),
            members: BTreeMap::new(),
        }
    }

    /// Add a member. Returns false if already present.
    pub fn add_user(&mut self, user: User) -> bool {
        let key = user_key(user.nick());
        if self.members.contains_key(&key) {
            return false;
        }
        self.members.insert(key, user);
        true
    }

    /// Remove a member by nick. Returns false if absent.
    pub fn remove_user(&mut self, nick: &str) -> bool {
        self.members.remove(&user_key(nick)).is_some()
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.members.contains_key(&user_key(nick))
    }

    pub fn members(&self) -> impl Iterator<Item = &User> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Channel registry keyed by normalized name; user registry keyed by nick.
#[derive(Debug, Default)]
pub struct EntityCache {
    channels: RwLock<HashMap<String, Channel>>,
    users: RwLock<HashMap<String, User>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a channel, with or without its prefix.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel_key(name))
            .cloned()
    }

    pub fn user(&self, nick: &str) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_key(nick))
            .cloned()
    }

    /// Insert or replace a channel.
    pub fn put_channel(&self, channel: Channel) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_key(&channel.name), channel);
    }

    pub fn remove_channel(&self, name: &str) -> Option<Channel> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&channel_key(name))
    }

    /// Insert a user unless one with the same nick exists. Returns the cached user.
    pub fn put_user(&self, user: User) -> User {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_key(user.nick()))
            .or_insert(user)
            .clone()
    }

    /// Add `user` to a cached channel.
    ///
    /// Returns false if the channel is unknown or the user is already a member.
    pub fn add_member(&self, channel: &str, user: User) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .get_mut(&channel_key(channel))
            .is_some_and(|c| c.add_user(user))
    }

    /// Remove `nick` from a cached channel.
    pub fn remove_member(&self, channel: &str, nick: &str) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .get_mut(&channel_key(channel))
            .is_some_and(|c| c.remove_user(nick))
    }

    /// Set a cached channel's topic. Returns false if the channel is unknown.
    pub fn set_topic(&self, channel: &str, topic: &str) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        match channels.get_mut(&channel_key(channel)) {
            Some(c) => {
                c.topic = topic.to_owned();
                true
            }
            None => false,
        }
    }

    /// Names of all cached channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = channels.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.channels.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.users.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Applies JOIN and PART events to an [`EntityCache`].
#[derive(Debug, Clone)]
pub struct CacheUpdater {
    cache: Arc<EntityCache>,
}

impl CacheUpdater {
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    /// Subscribe to JOIN and PART on `bus`.
    pub fn attach(self, bus: &EventBus) -> [SubscriptionId; 2] {
        let join = self.clone();
        let part = self;
        [
            bus.subscribe(EventKind::Join, move |event| join.apply(event)),
            bus.subscribe(EventKind::Part, move |event| part.apply(event)),
        ]
    }

    pub fn apply(&self, event: &Event) {
        match event {
            Event::Join(m) => self.joined(m),
            Event::Part(m) => self.parted(m),
            _ => {}
        }
    }

    fn joined(&self, m: &Membership) {
        if m.is_self {
            debug!(channel = %m.channel, "joined channel");
            self.cache.put_channel(Channel::new(&m.channel, ""));
            return;
        }
        let user = match self.cache.user(&m.hostmask.nick) {
            Some(user) => user,
            None => self.cache.put_user(User::new(m.hostmask.clone())),
        };
        if self.cache.channel(&m.channel).is_none() {
            debug!(channel = %m.channel, nick = %m.hostmask.nick, "join for uncached channel ignored");
            return;
        }
        if self.cache.add_member(&m.channel, user) {
            debug!(channel = %m.channel, nick = %m.hostmask.nick, "member added");
        }
    }

    fn parted(&self, m: &Membership) {
        if m.is_self {
            debug!(channel = %m.channel, "left channel");
            self.cache.remove_channel(&m.channel);
            return;
        }
        if self.cache.remove_member(&m.channel, &m.hostmask.nick) {
            debug!(channel = %m.channel, nick = %m.hostmask.nick, "member removed");
        }
    }
}
