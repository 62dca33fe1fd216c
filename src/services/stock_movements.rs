//! Stock Movement Ledger
//!
//! Append-only audit trail of inventory adjustments. Entries are written
//! once, never edited or removed; the service exposes no update or delete
//! surface, and the queries exist for audit/report screens.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::stock_movement::{
    self, Entity as StockMovementEntity, MovementReason, MovementType,
};
use crate::errors::ServiceError;

/// A ledger entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub movement_type: MovementType,
    /// Magnitude of the change, always positive.
    pub quantity: i32,
    /// Total on-hand quantity before the adjustment.
    pub previous_quantity: i32,
    /// Total on-hand quantity after the adjustment.
    pub new_quantity: i32,
    pub reason: MovementReason,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
}

/// Appends one movement on the caller's connection, so the entry commits or
/// rolls back together with the inventory write it describes.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    movement: NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    let model = stock_movement::ActiveModel {
        inventory_id: Set(movement.inventory_id),
        product_id: Set(movement.product_id),
        variant_id: Set(movement.variant_id),
        movement_type: Set(movement.movement_type.to_string()),
        quantity: Set(movement.quantity),
        previous_quantity: Set(movement.previous_quantity),
        new_quantity: Set(movement.new_quantity),
        reason: Set(movement.reason.text().to_string()),
        reference: Set(movement.reference),
        notes: Set(movement.notes),
        processed_by: Set(movement.processed_by),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    Ok(model)
}

/// Read-only queries over the ledger.
#[derive(Clone)]
pub struct StockMovementService {
    db_pool: Arc<DbPool>,
}

impl StockMovementService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Lists movements recorded against an order number, oldest first.
    #[instrument(skip(self))]
    pub async fn list_by_reference(
        &self,
        reference: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = &*self.db_pool;

        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::Reference.eq(reference))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(movements)
    }

    /// Lists movements for one inventory record, oldest first.
    #[instrument(skip(self))]
    pub async fn list_by_inventory(
        &self,
        inventory_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = &*self.db_pool;

        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::InventoryId.eq(inventory_id))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(movements)
    }
}
