//! Hold and fulfillment rules for wishlist items.
//!
//! An item's presentation state is derived from `held_until`, the two holder
//! fields and `is_fulfilled`. Nothing here writes on expiry: a lapsed hold
//! just stops evaluating as held.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Item;

/// How long a visitor's hold lasts, in days.
pub const HOLD_WINDOW_DAYS: i64 = 3;

pub fn hold_window() -> Duration {
    Duration::days(HOLD_WINDOW_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Available,
    Held,
    Fulfilled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoldError {
    #[error("please enter your name")]
    BlankName,
    #[error("please enter your email")]
    BlankEmail,
}

/// A visitor's validated request to hold an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldClaim {
    name: String,
    email: String,
}

impl HoldClaim {
    /// Trims both fields and rejects blanks.
    pub fn new(name: &str, email: &str) -> Result<Self, HoldError> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(HoldError::BlankName);
        }
        if email.is_empty() {
            return Err(HoldError::BlankEmail);
        }
        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Expiry of a hold confirmed at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + hold_window()
    }
}

impl Item {
    /// True while a hold expiry is recorded and still in the future.
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        self.held_until.is_some_and(|until| until > now)
    }

    pub fn is_held(&self) -> bool {
        self.is_held_at(Utc::now())
    }

    /// Fulfillment wins over an active hold.
    pub fn state_at(&self, now: DateTime<Utc>) -> ItemState {
        if self.is_fulfilled {
            ItemState::Fulfilled
        } else if self.is_held_at(now) {
            ItemState::Held
        } else {
            ItemState::Available
        }
    }

    pub fn state(&self) -> ItemState {
        self.state_at(Utc::now())
    }

    /// Whether a visitor may place a hold at `now`. Expired holds can be re-claimed.
    pub fn can_hold_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_fulfilled && !self.is_held_at(now)
    }

    pub fn apply_hold(&mut self, claim: &HoldClaim, now: DateTime<Utc>) {
        self.held_by = Some(claim.name.clone());
        self.held_by_email = Some(claim.email.clone());
        self.held_until = Some(claim.expires_at(now));
    }

    /// Clears the hold fields; `is_fulfilled` is left as it was.
    pub fn remove_hold(&mut self) {
        self.held_by = None;
        self.held_by_email = None;
        self.held_until = None;
    }

    /// Sets the fulfilled flag, keeping holder fields so "gifted by" can
    /// still be shown. Returns false if the item was already fulfilled.
    pub fn mark_fulfilled(&mut self) -> bool {
        if self.is_fulfilled {
            return false;
        }
        self.is_fulfilled = true;
        true
    }

    /// Holder name and email, when both are recorded.
    pub fn holder(&self) -> Option<(&str, &str)> {
        match (&self.held_by, &self.held_by_email) {
            (Some(name), Some(email)) => Some((name.as_str(), email.as_str())),
            _ => None,
        }
    }
}
