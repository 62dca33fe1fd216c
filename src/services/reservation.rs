//! Reservation Engine
//!
//! Translates order status / payment status transitions into inventory
//! adjustments. The mapping is table-driven: `TransitionEffect` decides
//! what (if anything) a transition does to the reserved and total
//! quantities, and `ReservationEngine` applies that effect to the owning
//! inventory record and appends the matching stock movement, all on the
//! caller's connection so a coordinator transaction spans every item.
//!
//! The engine itself never rejects on stock grounds. Quantities that would
//! go negative are clamped at zero and the clamp is annotated on the
//! movement; availability validation is the coordinator's job and happens
//! before the engine runs.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{
    inventory_record::{self, Entity as InventoryRecord, VariantKey},
    order::{OrderStatus, PaymentStatus},
    order_item,
    stock_movement::{MovementReason, MovementType},
};
use crate::errors::ServiceError;
use crate::services::stock_movements::{self, NewMovement};

/// The before/after pair of order and payment statuses for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub previous_payment_status: PaymentStatus,
    pub new_payment_status: PaymentStatus,
}

impl StatusTransition {
    /// Transition applied when an order is created directly into a
    /// non-pending status or with payment already settled.
    pub fn from_initial(status: OrderStatus, payment_status: PaymentStatus) -> Self {
        Self {
            previous_status: OrderStatus::Pending,
            new_status: status,
            previous_payment_status: PaymentStatus::Pending,
            new_payment_status: payment_status,
        }
    }
}

/// How a transition touches the stock position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// Hold stock: reserved += qty.
    Reserve,
    /// Release a hold: reserved -= qty, floored at zero.
    Release,
    /// Delivery: reserved -= qty and quantity -= qty, both floored at zero.
    Finalize,
}

impl StockEffect {
    pub fn movement_type(&self) -> MovementType {
        match self {
            StockEffect::Reserve | StockEffect::Finalize => MovementType::Out,
            StockEffect::Release => MovementType::In,
        }
    }

    /// Returns (new_reserved, new_quantity, clamped).
    fn apply(&self, reserved: i32, quantity: i32, qty: i32) -> (i32, i32, bool) {
        match self {
            StockEffect::Reserve => (reserved + qty, quantity, false),
            StockEffect::Release => {
                let new_reserved = (reserved - qty).max(0);
                (new_reserved, quantity, reserved - qty < 0)
            }
            StockEffect::Finalize => {
                let new_reserved = (reserved - qty).max(0);
                let new_quantity = (quantity - qty).max(0);
                (
                    new_reserved,
                    new_quantity,
                    reserved - qty < 0 || quantity - qty < 0,
                )
            }
        }
    }
}

/// One row of the transition table: the stock effect plus the reason code
/// recorded on the resulting movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionEffect {
    pub effect: StockEffect,
    pub reason: MovementReason,
}

impl TransitionEffect {
    const fn new(effect: StockEffect, reason: MovementReason) -> Self {
        Self { effect, reason }
    }

    /// The transition table. Every combination not listed here is a no-op,
    /// including identical before/after statuses.
    ///
    /// The payment-received row only fires while the order status stays
    /// pending; once a status change is in play the status rows own the
    /// reservation.
    pub fn for_transition(transition: &StatusTransition) -> Option<Self> {
        use OrderStatus::*;

        if transition.previous_status != transition.new_status {
            return match (transition.previous_status, transition.new_status) {
                (Pending, Confirmed) => Some(Self::new(
                    StockEffect::Reserve,
                    MovementReason::OrderConfirmed,
                )),
                (Confirmed, Pending) => Some(Self::new(
                    StockEffect::Release,
                    MovementReason::OrderPending,
                )),
                (Confirmed | Processing | Shipped, Cancelled) => Some(Self::new(
                    StockEffect::Release,
                    MovementReason::OrderCancelled,
                )),
                (_, Delivered) => Some(Self::new(
                    StockEffect::Finalize,
                    MovementReason::OrderDelivered,
                )),
                _ => None,
            };
        }

        if transition.previous_payment_status == PaymentStatus::Pending
            && transition.new_payment_status == PaymentStatus::Paid
            && transition.new_status == Pending
        {
            return Some(Self::new(
                StockEffect::Reserve,
                MovementReason::PaymentReceived,
            ));
        }

        None
    }
}

/// Raised against `reorder_point` after an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowStockAlert {
    pub available: i32,
    pub reorder_point: i32,
}

/// Outcome of one applied adjustment, consumed by the coordinator for
/// post-commit event emission.
#[derive(Debug, Clone)]
pub struct AppliedMovement {
    pub movement_id: Uuid,
    pub inventory_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub new_reserved: i32,
    pub new_available: i32,
    pub clamped: bool,
    pub low_stock: Option<LowStockAlert>,
}

/// Applies inventory effects of order transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationEngine;

impl ReservationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Applies the inventory effect of a status/payment transition for one
    /// line item. Returns `Ok(None)` when the transition is a no-op, when
    /// the item's product/variant pair is not tracked, or when clamping
    /// leaves the record unchanged.
    pub async fn apply_transition<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &order_item::Model,
        transition: &StatusTransition,
        order_reference: &str,
    ) -> Result<Option<AppliedMovement>, ServiceError> {
        match TransitionEffect::for_transition(transition) {
            Some(effect) => {
                self.apply_effect(conn, item, effect, order_reference)
                    .await
            }
            None => Ok(None),
        }
    }

    /// Releases any hold an order may still have on stock. Deletion is
    /// treated as a cancellation regardless of the transition table.
    pub async fn release_for_deletion<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &order_item::Model,
        order_reference: &str,
    ) -> Result<Option<AppliedMovement>, ServiceError> {
        let effect = TransitionEffect::new(StockEffect::Release, MovementReason::OrderDeleted);
        self.apply_effect(conn, item, effect, order_reference).await
    }

    async fn apply_effect<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &order_item::Model,
        effect: TransitionEffect,
        order_reference: &str,
    ) -> Result<Option<AppliedMovement>, ServiceError> {
        let record = InventoryRecord::find_by_key(item.product_id, item.variant_key())
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        // Un-tracked SKUs never block an order; strict callers pre-validate.
        let Some(record) = record else {
            debug!(
                product_id = %item.product_id,
                order_reference = %order_reference,
                "No inventory record for line item; skipping adjustment"
            );
            return Ok(None);
        };

        let qty = item.quantity;
        let (new_reserved, new_quantity, clamped) =
            effect
                .effect
                .apply(record.reserved_quantity, record.quantity, qty);

        if new_reserved == record.reserved_quantity && new_quantity == record.quantity {
            debug!(
                inventory_id = %record.id,
                order_reference = %order_reference,
                "Transition left stock unchanged; no movement recorded"
            );
            return Ok(None);
        }

        let new_available = new_quantity - new_reserved;

        // Conditional write: the version filter turns a lost race into a
        // zero-row update instead of a lost update.
        let update = inventory_record::ActiveModel {
            quantity: Set(new_quantity),
            reserved_quantity: Set(new_reserved),
            available_quantity: Set(new_available),
            version: Set(record.version + 1),
            updated_at: Set(Some(chrono::Utc::now())),
            ..Default::default()
        };
        let result = InventoryRecord::update_many()
            .set(update)
            .filter(inventory_record::Column::Id.eq(record.id))
            .filter(inventory_record::Column::Version.eq(record.version))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(record.id));
        }

        let notes = if clamped {
            warn!(
                inventory_id = %record.id,
                order_reference = %order_reference,
                reserved = record.reserved_quantity,
                on_hand = record.quantity,
                requested = qty,
                "Stock adjustment clamped at zero; ledger and live state may have diverged"
            );
            Some(format!(
                "Clamped at zero: requested {} against reserved {} / on hand {}",
                qty, record.reserved_quantity, record.quantity
            ))
        } else {
            None
        };

        let movement = stock_movements::record(
            conn,
            NewMovement {
                inventory_id: record.id,
                product_id: record.product_id,
                variant_id: record.variant_id,
                movement_type: effect.effect.movement_type(),
                quantity: qty,
                previous_quantity: record.quantity,
                new_quantity,
                reason: effect.reason,
                reference: Some(order_reference.to_string()),
                notes,
                processed_by: None,
            },
        )
        .await?;

        let low_stock = record
            .reorder_point
            .filter(|reorder_point| new_available <= *reorder_point)
            .map(|reorder_point| {
                warn!(
                    inventory_id = %record.id,
                    available = new_available,
                    reorder_point,
                    "Available stock at or below reorder point"
                );
                LowStockAlert {
                    available: new_available,
                    reorder_point,
                }
            });

        debug!(
            inventory_id = %record.id,
            order_reference = %order_reference,
            movement_type = %movement.movement_type,
            reserved = new_reserved,
            on_hand = new_quantity,
            available = new_available,
            "Applied inventory adjustment"
        );

        Ok(Some(AppliedMovement {
            movement_id: movement.id,
            inventory_id: record.id,
            product_id: record.product_id,
            variant_id: record.variant_id,
            movement_type: effect.effect.movement_type(),
            reason: effect.reason,
            quantity: qty,
            previous_quantity: record.quantity,
            new_quantity,
            new_reserved,
            new_available,
            clamped,
            low_stock,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn transition(
        previous_status: OrderStatus,
        new_status: OrderStatus,
        previous_payment_status: PaymentStatus,
        new_payment_status: PaymentStatus,
    ) -> StatusTransition {
        StatusTransition {
            previous_status,
            new_status,
            previous_payment_status,
            new_payment_status,
        }
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, StockEffect::Reserve, MovementReason::OrderConfirmed)]
    #[case(OrderStatus::Confirmed, OrderStatus::Pending, StockEffect::Release, MovementReason::OrderPending)]
    #[case(OrderStatus::Confirmed, OrderStatus::Cancelled, StockEffect::Release, MovementReason::OrderCancelled)]
    #[case(OrderStatus::Processing, OrderStatus::Cancelled, StockEffect::Release, MovementReason::OrderCancelled)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, StockEffect::Release, MovementReason::OrderCancelled)]
    #[case(OrderStatus::Pending, OrderStatus::Delivered, StockEffect::Finalize, MovementReason::OrderDelivered)]
    #[case(OrderStatus::Confirmed, OrderStatus::Delivered, StockEffect::Finalize, MovementReason::OrderDelivered)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, StockEffect::Finalize, MovementReason::OrderDelivered)]
    fn status_rows(
        #[case] previous: OrderStatus,
        #[case] new: OrderStatus,
        #[case] effect: StockEffect,
        #[case] reason: MovementReason,
    ) {
        let t = transition(previous, new, PaymentStatus::Pending, PaymentStatus::Pending);
        let row = TransitionEffect::for_transition(&t).expect("expected an effect");
        assert_eq!(row.effect, effect);
        assert_eq!(row.reason, reason);
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Processing)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled)]
    #[case(OrderStatus::Processing, OrderStatus::Shipped)]
    #[case(OrderStatus::Confirmed, OrderStatus::Processing)]
    fn pass_through_status_changes(#[case] previous: OrderStatus, #[case] new: OrderStatus) {
        let t = transition(previous, new, PaymentStatus::Pending, PaymentStatus::Pending);
        assert_eq!(TransitionEffect::for_transition(&t), None);
    }

    #[test]
    fn identical_statuses_are_a_noop() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let t = transition(status, status, PaymentStatus::Paid, PaymentStatus::Paid);
            assert_eq!(TransitionEffect::for_transition(&t), None);
        }
    }

    #[test]
    fn payment_received_reserves_only_while_pending() {
        let t = transition(
            OrderStatus::Pending,
            OrderStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Paid,
        );
        let row = TransitionEffect::for_transition(&t).expect("expected an effect");
        assert_eq!(row.effect, StockEffect::Reserve);
        assert_eq!(row.reason, MovementReason::PaymentReceived);

        // Payment settling while the order is already confirmed must not
        // double-reserve.
        let t = transition(
            OrderStatus::Confirmed,
            OrderStatus::Confirmed,
            PaymentStatus::Pending,
            PaymentStatus::Paid,
        );
        assert_eq!(TransitionEffect::for_transition(&t), None);
    }

    #[test]
    fn simultaneous_confirm_and_payment_reserves_once() {
        let t = transition(
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            PaymentStatus::Pending,
            PaymentStatus::Paid,
        );
        let row = TransitionEffect::for_transition(&t).expect("expected an effect");
        assert_eq!(row.reason, MovementReason::OrderConfirmed);
    }

    #[test]
    fn refund_and_failure_do_not_touch_stock() {
        let t = transition(
            OrderStatus::Pending,
            OrderStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Refunded,
        );
        assert_eq!(TransitionEffect::for_transition(&t), None);

        let t = transition(
            OrderStatus::Pending,
            OrderStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Failed,
        );
        assert_eq!(TransitionEffect::for_transition(&t), None);
    }

    #[test]
    fn release_clamps_at_zero() {
        let (reserved, quantity, clamped) = StockEffect::Release.apply(2, 10, 5);
        assert_eq!((reserved, quantity), (0, 10));
        assert!(clamped);

        let (reserved, quantity, clamped) = StockEffect::Release.apply(5, 10, 5);
        assert_eq!((reserved, quantity), (0, 10));
        assert!(!clamped);
    }

    #[test]
    fn finalize_reduces_both_quantities() {
        let (reserved, quantity, clamped) = StockEffect::Finalize.apply(3, 10, 3);
        assert_eq!((reserved, quantity), (0, 7));
        assert!(!clamped);

        let (reserved, quantity, clamped) = StockEffect::Finalize.apply(0, 2, 3);
        assert_eq!((reserved, quantity), (0, 0));
        assert!(clamped);
    }

    proptest! {
        /// After any effect, quantities are non-negative, and un-clamped
        /// effects preserve exact arithmetic.
        #[test]
        fn applied_quantities_never_go_negative(
            reserved in 0..10_000i32,
            quantity in 0..10_000i32,
            qty in 1..10_000i32,
        ) {
            for effect in [StockEffect::Reserve, StockEffect::Release, StockEffect::Finalize] {
                let (new_reserved, new_quantity, clamped) = effect.apply(reserved, quantity, qty);
                prop_assert!(new_reserved >= 0);
                prop_assert!(new_quantity >= 0);
                if !clamped {
                    match effect {
                        StockEffect::Reserve => {
                            prop_assert_eq!(new_reserved, reserved + qty);
                            prop_assert_eq!(new_quantity, quantity);
                        }
                        StockEffect::Release => {
                            prop_assert_eq!(new_reserved, reserved - qty);
                            prop_assert_eq!(new_quantity, quantity);
                        }
                        StockEffect::Finalize => {
                            prop_assert_eq!(new_reserved, reserved - qty);
                            prop_assert_eq!(new_quantity, quantity - qty);
                        }
                    }
                }
            }
        }
    }
}
