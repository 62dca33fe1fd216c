use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter as StrumEnumIter, EnumString};
use uuid::Uuid;

/// Direction of a stock movement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, StrumEnumIter,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

/// Cause of a stock movement, kept as data so transition logic stays
/// table-driven instead of scattering string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementReason {
    OrderConfirmed,
    OrderPending,
    OrderCancelled,
    OrderDelivered,
    PaymentReceived,
    OrderDeleted,
}

impl MovementReason {
    /// The human-readable text persisted on the ledger row.
    pub fn text(&self) -> &'static str {
        match self {
            MovementReason::OrderConfirmed => "Order Confirmed - Inventory Reserved",
            MovementReason::OrderPending => "Order Pending - Inventory Unreserved",
            MovementReason::OrderCancelled => "Order Cancelled - Inventory Restored",
            MovementReason::OrderDelivered => "Order Delivered - Final Inventory Reduction",
            MovementReason::PaymentReceived => "Payment Received - Inventory Reserved",
            MovementReason::OrderDeleted => "Order Deleted - Inventory Restored",
        }
    }
}

/// Append-only audit entry for a single inventory adjustment.
///
/// `previous_quantity`/`new_quantity` record the total on-hand quantity as
/// it was and becomes; for reservation-only adjustments the two are equal.
/// Rows are never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub movement_type: String,
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub reason: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn movement_type(&self) -> Result<MovementType, strum::ParseError> {
        MovementType::from_str(&self.movement_type)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }

        Ok(active_model)
    }
}
