//! Session-held shopping cart and its pricing engine.
//!
//! The cart is an explicit value the web layer round-trips through the
//! session bag; nothing here touches storage. Prices inside a [`CartLine`]
//! are carried as strings so the payload stays serializable in plain
//! session storage and must be parsed through the fixed-point decimal path
//! before any arithmetic.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;
use crate::money::{quantize, shipping_for_subtotal};

/// Key under which the cart payload lives in the caller's session bag.
pub const CART_SESSION_KEY: &str = "cart";

/// One product line inside the session cart. At most one line per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub name: String,
    /// String-decimal; parse through [`Decimal`] before arithmetic.
    pub price: String,
    pub quantity: u32,
    pub grind: String,
    pub weight_grams: i32,
    pub sku: String,
    #[serde(default)]
    pub image_url: String,
}

/// Cart payload: ordered mapping of product key (slug) to line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart(pub BTreeMap<String, CartLine>);

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insert a line or increment the quantity of an existing one.
    ///
    /// Price, weight, and sku are refreshed from the caller-supplied line
    /// so a stale cart picks up catalog changes on the next add.
    pub fn add_line(&mut self, key: &str, line: CartLine, quantity: u32) {
        let entry = self.0.entry(key.to_string()).or_insert(CartLine {
            quantity: 0,
            ..line.clone()
        });
        entry.quantity += quantity.max(1);
        entry.grind = line.grind;
        entry.price = line.price;
        entry.weight_grams = line.weight_grams;
        entry.sku = line.sku;
    }

    /// Update quantity (clamped to at least 1) and optionally the grind.
    /// Unknown keys are ignored, mirroring a stale form post.
    pub fn update_line(&mut self, key: &str, quantity: u32, grind: Option<String>) {
        if let Some(line) = self.0.get_mut(key) {
            line.quantity = quantity.max(1);
            if let Some(grind) = grind {
                line.grind = grind;
            }
        }
    }

    pub fn remove_line(&mut self, key: &str) -> Option<CartLine> {
        self.0.remove(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A cart line with its monetary fields resolved to decimals.
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub key: String,
    pub name: String,
    pub sku: String,
    pub grind: String,
    pub grind_label: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub weight_grams: i32,
    pub image_url: String,
}

/// Result of pricing a cart: ordered lines plus the three totals.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub items: Vec<PricedLine>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// Human-friendly label from a grind key like `french_press`.
pub fn grind_label(value: &str) -> String {
    let value = if value.is_empty() { "whole" } else { value };
    value
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Price a cart payload: normalized lines, subtotal, shipping, total.
///
/// Pure over the cart mapping. `total == subtotal + shipping` holds for
/// every summary; all three are quantized half-up at two decimals.
pub fn compute_summary(cart: &Cart) -> Result<CartSummary, ServiceError> {
    let mut items = Vec::with_capacity(cart.len());
    let mut subtotal = Decimal::ZERO;

    for (key, line) in &cart.0 {
        let price = parse_line_price(key, &line.price)?;
        let line_total = quantize(price * Decimal::from(line.quantity));
        subtotal += line_total;

        items.push(PricedLine {
            key: key.clone(),
            name: line.name.clone(),
            sku: line.sku.clone(),
            grind: line.grind.clone(),
            grind_label: grind_label(&line.grind),
            quantity: line.quantity,
            unit_price: quantize(price),
            line_total,
            weight_grams: line.weight_grams,
            image_url: line.image_url.clone(),
        });
    }

    let subtotal = quantize(subtotal);
    let shipping = quantize(shipping_for_subtotal(subtotal));
    let total = quantize(subtotal + shipping);

    Ok(CartSummary {
        items,
        subtotal,
        shipping,
        total,
    })
}

fn parse_line_price(key: &str, raw: &str) -> Result<Decimal, ServiceError> {
    let price = Decimal::from_str(raw).map_err(|_| {
        ServiceError::InvalidCartLine(format!("price '{}' for '{}' is not a decimal", raw, key))
    })?;
    if price.is_sign_negative() {
        return Err(ServiceError::InvalidCartLine(format!(
            "price '{}' for '{}' is negative",
            raw, key
        )));
    }
    Ok(price)
}
