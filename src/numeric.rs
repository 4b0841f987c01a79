//! Numeric reply categories and the handler registry.
//!
//! Replies are grouped by their hundreds digit. `1xx` and `8xx` belong to no
//! category and pass through untouched. Inside a category each exact code may
//! have a handler; a code without one is simply not handled yet.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::parse::Params;

/// Category of a numeric reply, by hundreds digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NumericCategory {
    /// 0xx: connection registration.
    Registration,
    /// 2xx: command replies (stats, lusers, admin).
    Command,
    /// 3xx: command replies (whois, names, topic, motd).
    Reply,
    /// 4xx: errors.
    Error,
    /// 5xx: mode errors.
    ModeError,
    /// 6xx: extended replies (STARTTLS).
    Extended,
    /// 7xx: extended replies (monitor, help).
    Extension,
    /// 9xx: SASL.
    Sasl,
}

impl NumericCategory {
    /// Category for `code`, or `None` for 1xx, 8xx and out-of-range codes.
    pub fn of(code: u16) -> Option<Self> {
        match code / 100 {
            0 => Some(Self::Registration),
            2 => Some(Self::Command),
            3 => Some(Self::Reply),
            4 => Some(Self::Error),
            5 => Some(Self::ModeError),
            6 => Some(Self::Extended),
            7 => Some(Self::Extension),
            9 => Some(Self::Sasl),
            _ => None,
        }
    }
}

/// A numeric reply handed to a handler.
#[derive(Clone, Copy, Debug)]
pub struct NumericReply<'a> {
    pub code: u16,
    pub category: NumericCategory,
    pub params: Params<'a>,
}

/// Handler for one numeric code.
pub type NumericHandler = Arc<dyn Fn(&NumericReply<'_>) + Send + Sync>;

/// Maps numeric codes to handlers, grouped by category.
#[derive(Clone, Default)]
pub struct NumericRegistry {
    handlers: HashMap<NumericCategory, HashMap<u16, NumericHandler>>,
}

impl fmt::Debug for NumericRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<u16> = self.handlers.values().flat_map(|m| m.keys().copied()).collect();
        codes.sort_unstable();
        f.debug_struct("NumericRegistry").field("codes", &codes).finish()
    }
}

impl NumericRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with log handlers for nick collisions and SASL outcomes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(433, |reply| {
            warn!(nick = reply.params.remainder, "nickname already in use");
        });
        registry.register(900, |reply| {
            info!(account = reply.params.remainder, "logged in");
        });
        registry.register(903, |_| info!("SASL authentication successful"));
        for code in [902, 904, 905, 906, 907] {
            registry.register(code, move |reply| {
                warn!(code, reason = reply.params.text(), "SASL authentication did not succeed");
            });
        }
        registry
    }

    /// Install `handler` for `code`, replacing any previous one.
    ///
    /// Returns false if `code` falls in no category and can never be dispatched.
    pub fn register<F>(&mut self, code: u16, handler: F) -> bool
    where
        F: Fn(&NumericReply<'_>) + Send + Sync + 'static,
    {
        let Some(category) = NumericCategory::of(code) else {
            return false;
        };
        self.handlers
            .entry(category)
            .or_default()
            .insert(code, Arc::new(handler));
        true
    }

    /// Remove the handler for `code`.
    pub fn unregister(&mut self, code: u16) -> bool {
        NumericCategory::of(code)
            .and_then(|category| self.handlers.get_mut(&category))
            .is_some_and(|m| m.remove(&code).is_some())
    }

    /// Look up the handler for `code` within `category`.
    pub fn lookup(&self, category: NumericCategory, code: u16) -> Option<NumericHandler> {
        self.handlers.get(&category)?.get(&code).cloned()
    }
}
