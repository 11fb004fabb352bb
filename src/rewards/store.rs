//! Token store: spend AgriTokens on farming supplies.
//!
//! Purchases go through [`TokenLedger::debit`], so the store can never
//! overdraw the balance. Stock and cart live for the session only.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::TokenLedger;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fertilizer,
    Seed,
    Tool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProduct {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Price in tokens.
    pub price: u64,
    pub image_url: String,
    pub category: Category,
    pub stock: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { product_id: String, balance: u64 },
    UnknownProduct,
    OutOfStock,
    InsufficientTokens { price: u64, balance: u64 },
}

pub struct TokenStore {
    ledger: TokenLedger,
    products: Vec<StoreProduct>,
    cart: Vec<StoreProduct>,
}

impl TokenStore {
    /// Open the store with the built-in catalog.
    #[must_use]
    pub fn new(ledger: TokenLedger) -> Self {
        Self::with_catalog(ledger, default_catalog())
    }

    #[must_use]
    pub fn with_catalog(ledger: TokenLedger, products: Vec<StoreProduct>) -> Self {
        Self { ledger, products, cart: Vec::new() }
    }

    #[must_use]
    pub fn products(&self) -> &[StoreProduct] {
        &self.products
    }

    #[must_use]
    pub fn product(&self, id: &str) -> Option<&StoreProduct> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Whether the purchase button for `id` should be enabled.
    #[must_use]
    pub fn can_afford(&self, id: &str) -> bool {
        self.product(id)
            .is_some_and(|p| p.stock > 0 && self.ledger.balance() >= p.price)
    }

    /// Buy one unit of `id`.
    pub fn purchase(&mut self, id: &str) -> PurchaseOutcome {
        let Some(product) = self.products.iter_mut().find(|p| p.id == id) else {
            return PurchaseOutcome::UnknownProduct;
        };
        if product.stock == 0 {
            return PurchaseOutcome::OutOfStock;
        }
        if !self.ledger.debit(product.price) {
            return PurchaseOutcome::InsufficientTokens { price: product.price, balance: self.ledger.balance() };
        }
        product.stock -= 1;
        self.cart.push(product.clone());
        let balance = self.ledger.balance();
        info!(product = %product.id, price = product.price, balance, "store: purchase completed");
        PurchaseOutcome::Purchased { product_id: product.id.clone(), balance }
    }

    /// Items bought this session, in purchase order.
    #[must_use]
    pub fn cart(&self) -> &[StoreProduct] {
        &self.cart
    }

    /// True when there is nothing to spend and the "earn tokens" hint applies.
    #[must_use]
    pub fn has_no_tokens(&self) -> bool {
        self.ledger.balance() == 0
    }

    #[must_use]
    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }
}

fn product(
    id: &str,
    name: &str,
    description: &str,
    price: u64,
    image_url: &str,
    category: Category,
    stock: u32,
) -> StoreProduct {
    StoreProduct {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        price,
        image_url: image_url.into(),
        category,
        stock,
    }
}

#[must_use]
pub fn default_catalog() -> Vec<StoreProduct> {
    vec![
        product(
            "fert-1",
            "Organic Nitrogen Fertilizer",
            "Perfect for leafy vegetables, contains high nitrogen content.",
            15,
            "https://source.unsplash.com/random/300x300/?fertilizer",
            Category::Fertilizer,
            12,
        ),
        product(
            "fert-2",
            "Phosphorus Rich Fertilizer",
            "Best for flowering and fruiting plants.",
            20,
            "https://source.unsplash.com/random/300x300/?plant-food",
            Category::Fertilizer,
            8,
        ),
        product(
            "fert-3",
            "All-Purpose Organic Fertilizer",
            "Balanced nutrients for all types of plants and crops.",
            25,
            "https://source.unsplash.com/random/300x300/?organic-fertilizer",
            Category::Fertilizer,
            5,
        ),
        product(
            "seed-1",
            "Premium Tomato Seeds",
            "Disease-resistant tomato variety for high yields.",
            10,
            "https://source.unsplash.com/random/300x300/?seeds",
            Category::Seed,
            20,
        ),
    ]
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
