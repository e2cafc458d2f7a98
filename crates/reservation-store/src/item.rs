//! Wish lists and items as seen by the reservation core.
//!
//! Both are owned by the wish-list CRUD collaborator. The only field this
//! crate ever writes is the item's account claim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ItemId, Money, WishlistId};

/// A wish list, reduced to the fields needed for containment checks and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: WishlistId,
    pub owner: AccountId,
    pub title: String,
    /// Public lists are addressed by slug; `None` means private.
    pub public_slug: Option<String>,
}

impl Wishlist {
    /// Creates a private wish list.
    pub fn new(owner: AccountId, title: impl Into<String>) -> Self {
        Self {
            id: WishlistId::new(),
            owner,
            title: title.into(),
            public_slug: None,
        }
    }

    /// Publishes the list under the given slug.
    pub fn with_public_slug(mut self, slug: impl Into<String>) -> Self {
        self.public_slug = Some(slug.into());
        self
    }

    /// Returns true if the list can be viewed through a public slug.
    pub fn is_public(&self) -> bool {
        self.public_slug.is_some()
    }
}

/// The account claim recorded on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemClaim {
    pub account_id: AccountId,
    pub claimed_at: DateTime<Utc>,
}

/// An entry on a wish list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub wishlist_id: WishlistId,
    pub name: String,
    pub price: Option<Money>,
    /// Set iff an authenticated account currently holds the item.
    pub claim: Option<ItemClaim>,
}

impl Item {
    /// Creates an unclaimed item on the given list.
    pub fn new(wishlist_id: WishlistId, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            wishlist_id,
            name: name.into(),
            price: None,
            claim: None,
        }
    }

    /// Sets the item's price.
    pub fn with_price(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    /// Returns true if an account currently holds the item.
    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    /// Returns the claiming account, if any.
    pub fn claimed_by(&self) -> Option<AccountId> {
        self.claim.map(|c| c.account_id)
    }
}
