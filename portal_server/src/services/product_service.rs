//! Product catalogue and purchases.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::product::{
    NewProduct, NewPurchase, Product, ProductChanges, Purchase, PurchaseJson,
};
use crate::schema::{products, purchases, users};

/// List products, newest first. Inactive products only when `include_inactive`.
pub async fn list_products(
    conn: &mut AsyncPgConnection,
    include_inactive: bool,
) -> anyhow::Result<Vec<Product>> {
    let mut query = products::table.into_boxed();
    if !include_inactive {
        query = query.filter(products::active.eq(true));
    }
    let results = query
        .order(products::id.desc())
        .select(Product::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_product(conn: &mut AsyncPgConnection, product_id: i64) -> anyhow::Result<Product> {
    products::table
        .find(product_id)
        .select(Product::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Product").into())
}

pub async fn create_product(
    conn: &mut AsyncPgConnection,
    new_product: NewProduct,
) -> anyhow::Result<Product> {
    let product = diesel::insert_into(products::table)
        .values(&new_product)
        .returning(Product::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(product_id = product.id, slug = %product.slug, "Product created");
    Ok(product)
}

pub async fn update_product(
    conn: &mut AsyncPgConnection,
    product_id: i64,
    changes: &ProductChanges,
) -> anyhow::Result<Product> {
    let product = diesel::update(products::table.find(product_id))
        .set((changes, products::updated_at.eq(Utc::now())))
        .returning(Product::as_returning())
        .get_result(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("Product"))?;
    Ok(product)
}

pub async fn delete_product(conn: &mut AsyncPgConnection, product_id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(products::table.find(product_id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Product").into());
    }
    Ok(())
}

/// Remaining stock after buying `quantity`, or why the purchase is refused.
pub fn reserve_stock(product: &Product, quantity: i32) -> Result<Option<i32>, ApiError> {
    if quantity < 1 {
        return Err(ApiError::bad_request("quantity must be at least 1"));
    }
    if !product.active {
        return Err(ApiError::conflict("Product is not available"));
    }
    match product.stock {
        None => Ok(None),
        Some(stock) if stock >= quantity => Ok(Some(stock - quantity)),
        Some(_) => Err(ApiError::conflict("Insufficient stock")),
    }
}

/// Price of `quantity` units, rejecting totals that overflow.
pub fn purchase_total(product: &Product, quantity: i32) -> Result<i64, ApiError> {
    product
        .price_cents
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| ApiError::bad_request("order total is too large"))
}

/// Buy a product. The product row is locked so concurrent purchases
/// cannot oversell limited stock.
pub async fn purchase(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    product_id: i64,
    quantity: i32,
) -> anyhow::Result<Purchase> {
    let purchase = conn
        .transaction::<_, anyhow::Error, _>(|conn| {
            async move {
                let product: Product = products::table
                    .find(product_id)
                    .select(Product::as_select())
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?
                    .ok_or(ApiError::not_found("Product"))?;

                let remaining = reserve_stock(&product, quantity)?;
                let total_cents = purchase_total(&product, quantity)?;
                if remaining.is_some() {
                    diesel::update(products::table.find(product_id))
                        .set((
                            products::stock.eq(remaining),
                            products::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }

                let new_purchase = NewPurchase {
                    user_id,
                    product_id,
                    quantity,
                    total_cents,
                    status: "completed".to_string(),
                };
                let purchase = diesel::insert_into(purchases::table)
                    .values(&new_purchase)
                    .returning(Purchase::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(purchase)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::purchase_completed();
    tracing::info!(
        purchase_id = purchase.id,
        user_id,
        product_id,
        quantity,
        "Purchase completed"
    );
    Ok(purchase)
}

/// A user's own purchases, newest first.
pub async fn list_user_purchases(
    conn: &mut AsyncPgConnection,
    user_id: i64,
) -> anyhow::Result<Vec<Purchase>> {
    let results = purchases::table
        .filter(purchases::user_id.eq(user_id))
        .order(purchases::id.desc())
        .select(Purchase::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// All purchases with buyer email and product name populated.
pub async fn list_all_purchases(
    conn: &mut AsyncPgConnection,
    limit: i64,
) -> anyhow::Result<Vec<PurchaseJson>> {
    let rows: Vec<(Purchase, String, String)> = purchases::table
        .inner_join(users::table)
        .inner_join(products::table)
        .order(purchases::id.desc())
        .limit(limit)
        .select((Purchase::as_select(), users::email, products::name))
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(purchase, user_email, product_name)| PurchaseJson {
            purchase,
            user_email,
            product_name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn product(stock: Option<i32>, active: bool) -> Product {
        Product {
            id: 1,
            name: "Sticker".to_string(),
            slug: "sticker".to_string(),
            description: None,
            price_cents: 300,
            currency: "USD".to_string(),
            stock,
            active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unlimited_stock_is_untouched() {
        assert_eq!(reserve_stock(&product(None, true), 50).unwrap(), None);
    }

    #[test]
    fn limited_stock_is_decremented() {
        assert_eq!(reserve_stock(&product(Some(3), true), 3).unwrap(), Some(0));
    }

    #[test]
    fn overselling_conflicts() {
        let err = reserve_stock(&product(Some(2), true), 3).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn inactive_products_cannot_be_bought() {
        let err = reserve_stock(&product(None, false), 1).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn totals_are_price_times_quantity() {
        assert_eq!(purchase_total(&product(None, true), 4).unwrap(), 1200);
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let mut expensive = product(None, true);
        expensive.price_cents = i64::MAX / 2 + 1;
        let err = purchase_total(&expensive, 2).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn quantity_must_be_positive() {
        let err = reserve_stock(&product(None, true), 0).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
