use crate::db::{InventoryMovement, MovementType};
use crate::error::{ZafesysError, ZafesysResult};
use sqlx::PgConnection;

/// Stock arithmetic of one movement, computed before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementPlan {
    pub movement_type: MovementType,
    pub quantity: i32,
    pub stock_before: i32,
    pub stock_after: i32,
}

/// Entries always add, exits always subtract, adjustments keep their sign.
pub fn signed_quantity(movement_type: MovementType, quantity: i32) -> i32 {
    match movement_type {
        MovementType::Entry => quantity.saturating_abs(),
        MovementType::Exit => -quantity.saturating_abs(),
        MovementType::Adjustment => quantity,
    }
}

pub fn plan_movement(
    stock_before: i32,
    movement_type: MovementType,
    quantity: i32,
) -> ZafesysResult<MovementPlan> {
    if quantity == 0 {
        return Err(ZafesysError::Validation(
            "Movement quantity must not be zero".to_string(),
        ));
    }

    let delta = signed_quantity(movement_type, quantity);
    let stock_after = stock_before
        .checked_add(delta)
        .ok_or_else(|| ZafesysError::Validation("Stock quantity out of range".to_string()))?;

    if stock_after < 0 {
        return Err(ZafesysError::InsufficientStock {
            available: stock_before,
            requested: delta.saturating_abs(),
        });
    }

    Ok(MovementPlan {
        movement_type,
        quantity: delta,
        stock_before,
        stock_after,
    })
}

/// A movement to append to the ledger.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: i32,
    pub movement_type: MovementType,
    pub quantity: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<i32>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl NewMovement {
    pub fn new(product_id: i32, movement_type: MovementType, quantity: i32) -> Self {
        Self {
            product_id,
            movement_type,
            quantity,
            reference_type: None,
            reference_id: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn reference(mut self, reference_type: &str, reference_id: i32) -> Self {
        self.reference_type = Some(reference_type.to_string());
        self.reference_id = Some(reference_id);
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn created_by(mut self, created_by: Option<String>) -> Self {
        self.created_by = created_by;
        self
    }
}

async fn lock_product_stock(conn: &mut PgConnection, product_id: i32) -> ZafesysResult<i32> {
    sqlx::query_scalar::<_, i32>("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ZafesysError::not_found("Product"))
}

/// Applies a movement inside the caller's transaction: locks the product row,
/// updates its stock and appends the ledger row. Nothing is written on error.
pub async fn apply_movement(
    conn: &mut PgConnection,
    movement: &NewMovement,
) -> ZafesysResult<InventoryMovement> {
    let stock_before = lock_product_stock(conn, movement.product_id).await?;
    let plan = plan_movement(stock_before, movement.movement_type, movement.quantity)?;
    write_movement(conn, movement, &plan).await
}

/// Physical count: records the difference to `new_stock` as an adjustment.
/// Returns `None` when the count matches the current stock.
pub async fn set_stock(
    conn: &mut PgConnection,
    product_id: i32,
    new_stock: i32,
    notes: Option<String>,
    created_by: Option<String>,
) -> ZafesysResult<Option<InventoryMovement>> {
    if new_stock < 0 {
        return Err(ZafesysError::Validation(
            "Stock cannot be negative".to_string(),
        ));
    }

    let stock_before = lock_product_stock(conn, product_id).await?;
    let delta = new_stock - stock_before;
    if delta == 0 {
        return Ok(None);
    }

    let movement = NewMovement::new(product_id, MovementType::Adjustment, delta)
        .notes(notes)
        .created_by(created_by);
    let plan = plan_movement(stock_before, MovementType::Adjustment, delta)?;
    write_movement(conn, &movement, &plan).await.map(Some)
}

async fn write_movement(
    conn: &mut PgConnection,
    movement: &NewMovement,
    plan: &MovementPlan,
) -> ZafesysResult<InventoryMovement> {
    sqlx::query("UPDATE products SET stock = $1, updated_at = NOW() WHERE id = $2")
        .bind(plan.stock_after)
        .bind(movement.product_id)
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query_as::<_, InventoryMovement>(
        r#"
        INSERT INTO inventory_movements (
            product_id, movement_type, quantity, stock_before, stock_after,
            reference_type, reference_id, notes, created_by
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(movement.product_id)
    .bind(plan.movement_type)
    .bind(plan.quantity)
    .bind(plan.stock_before)
    .bind(plan.stock_after)
    .bind(&movement.reference_type)
    .bind(movement.reference_id)
    .bind(&movement.notes)
    .bind(&movement.created_by)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        "Stock movement on product {}: {:?} {} ({} -> {})",
        movement.product_id,
        plan.movement_type,
        plan.quantity,
        plan.stock_before,
        plan.stock_after
    );

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_and_exit_ignore_sign() {
        assert_eq!(signed_quantity(MovementType::Entry, -4), 4);
        assert_eq!(signed_quantity(MovementType::Exit, 4), -4);
        assert_eq!(signed_quantity(MovementType::Exit, -4), -4);
        assert_eq!(signed_quantity(MovementType::Adjustment, -2), -2);
    }

    #[test]
    fn test_exit_beyond_stock_is_rejected() {
        let err = plan_movement(3, MovementType::Exit, 5).unwrap_err();
        match err {
            ZafesysError::InsufficientStock { available, requested } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_negative_adjustment_cannot_go_below_zero() {
        assert!(matches!(
            plan_movement(2, MovementType::Adjustment, -3),
            Err(ZafesysError::InsufficientStock { .. })
        ));
        let plan = plan_movement(2, MovementType::Adjustment, -2).unwrap();
        assert_eq!(plan.stock_after, 0);
    }

    #[test]
    fn test_snapshots_are_consistent() {
        let cases = [
            (0, MovementType::Entry, 10),
            (10, MovementType::Exit, 10),
            (7, MovementType::Adjustment, 5),
            (7, MovementType::Adjustment, -7),
            (1, MovementType::Entry, -1),
        ];
        for (before, kind, qty) in cases {
            let plan = plan_movement(before, kind, qty).unwrap();
            assert_eq!(plan.stock_after, plan.stock_before + plan.quantity);
            assert!(plan.stock_after >= 0);
        }
    }

    #[test]
    fn test_zero_quantity_is_invalid() {
        assert!(matches!(
            plan_movement(5, MovementType::Entry, 0),
            Err(ZafesysError::Validation(_))
        ));
    }

    #[test]
    fn test_movement_builder() {
        let m = NewMovement::new(3, MovementType::Exit, 1)
            .reference("installation", 42)
            .created_by(Some("bodega".to_string()));
        assert_eq!(m.reference_type.as_deref(), Some("installation"));
        assert_eq!(m.reference_id, Some(42));
        assert_eq!(m.created_by.as_deref(), Some("bodega"));
        assert_eq!(m.notes, None);
    }
}
