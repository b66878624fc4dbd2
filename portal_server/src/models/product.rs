//! products + purchases: shop catalogue and completed orders.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{products, purchases};

/// Highest accepted unit price (one million in the currency's major unit).
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = products)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub stock: Option<i32>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = products)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub stock: Option<i32>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        super::validate_slug(&self.slug)?;
        validate_price(self.price_cents)?;
        if self.stock.is_some_and(|s| s < 0) {
            return Err("stock must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = products)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "super::nullable_field")]
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    /// `null` switches the product back to unlimited stock.
    #[serde(default, deserialize_with = "super::nullable_field")]
    pub stock: Option<Option<i32>>,
    pub active: Option<bool>,
}

impl ProductChanges {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err("name must not be empty".to_string());
        }
        if let Some(slug) = &self.slug {
            super::validate_slug(slug)?;
        }
        if let Some(price) = self.price_cents {
            validate_price(price)?;
        }
        if self.stock.flatten().is_some_and(|s| s < 0) {
            return Err("stock must not be negative".to_string());
        }
        Ok(())
    }
}

fn validate_price(price_cents: i64) -> Result<(), String> {
    if !(0..=MAX_PRICE_CENTS).contains(&price_cents) {
        return Err(format!("price_cents must be between 0 and {MAX_PRICE_CENTS}"));
    }
    Ok(())
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = purchases)]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = purchases)]
pub struct NewPurchase {
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub total_cents: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Admin view of a purchase with the buyer and product populated.
#[derive(Debug, Serialize)]
pub struct PurchaseJson {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub user_email: String,
    pub product_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        serde_json::from_value(serde_json::json!({
            "name": "Hoodie",
            "slug": "hoodie",
            "price_cents": 4500,
        }))
        .unwrap()
    }

    #[test]
    fn defaults_apply_on_create() {
        let p = new_product();
        assert_eq!(p.currency, "USD");
        assert!(p.active);
        assert_eq!(p.stock, None);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn negative_price_is_rejected() {
        let mut p = new_product();
        p.price_cents = -1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn price_is_capped() {
        let mut p = new_product();
        p.price_cents = 5_000_000_000_000_000_000;
        assert!(p.validate().is_err());
        p.price_cents = MAX_PRICE_CENTS;
        assert!(p.validate().is_ok());
    }

    #[test]
    fn changes_tell_null_from_absent() {
        let absent: ProductChanges = serde_json::from_str(r#"{"name":"Cap"}"#).unwrap();
        assert_eq!(absent.stock, None);
        assert_eq!(absent.description, None);

        let cleared: ProductChanges =
            serde_json::from_str(r#"{"stock":null,"description":null}"#).unwrap();
        assert_eq!(cleared.stock, Some(None));
        assert_eq!(cleared.description, Some(None));

        let limited: ProductChanges = serde_json::from_str(r#"{"stock":12}"#).unwrap();
        assert_eq!(limited.stock, Some(Some(12)));
        assert!(limited.validate().is_ok());

        let negative: ProductChanges = serde_json::from_str(r#"{"stock":-1}"#).unwrap();
        assert!(negative.validate().is_err());
    }

    #[test]
    fn purchase_quantity_defaults_to_one() {
        let req: PurchaseRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.quantity, 1);
    }
}
