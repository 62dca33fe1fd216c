//! Order Lifecycle Coordinator
//!
//! Orchestrates order create/update/delete against the reservation engine.
//! Availability validation is two-phase: every line item is checked against
//! current stock inside the transaction before anything mutates, so an
//! update either applies completely or not at all. The stock-management
//! toggle arrives as an explicit `StockPolicy` snapshot taken once per
//! request.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{
    inventory_record::{Entity as InventoryRecord, VariantKey},
    order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
    order_item::{self, Entity as OrderItemEntity},
};
use crate::errors::{ServiceError, StockIssue};
use crate::events::{Event, EventSender};
use crate::services::reservation::{AppliedMovement, ReservationEngine, StatusTransition};
use crate::services::settings::StockPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub product_name: String,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    #[validate(length(
        min = 1,
        max = 50,
        message = "Order number must be between 1 and 50 characters"
    ))]
    pub order_number: String,
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub currency: String,
    /// Defaults to `pending`.
    pub status: Option<OrderStatus>,
    /// Defaults to `pending`.
    pub payment_status: Option<PaymentStatus>,
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub shipping_amount: Decimal,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub shipping_amount: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub notes: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// `total = subtotal - discount + tax + shipping`
fn compute_total(subtotal: Decimal, discount: Decimal, tax: Decimal, shipping: Decimal) -> Decimal {
    subtotal - discount + tax + shipping
}

/// One line item's claim on stock during validation.
struct StockDemand {
    product_id: Uuid,
    variant_key: VariantKey,
    product_name: String,
    quantity: i32,
}

impl From<&CreateOrderItemRequest> for StockDemand {
    fn from(item: &CreateOrderItemRequest) -> Self {
        Self {
            product_id: item.product_id,
            variant_key: VariantKey::from_column(item.variant_id),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
        }
    }
}

impl From<&order_item::Model> for StockDemand {
    fn from(item: &order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            variant_key: item.variant_key(),
            product_name: item.product_name.clone(),
            quantity: item.quantity,
        }
    }
}

/// Checks every demand against current stock, collecting all failures so a
/// multi-item rejection names every failing line at once. Runs on the
/// caller's transaction so the answer cannot go stale before the mutation.
async fn validate_stock<C: ConnectionTrait>(
    conn: &C,
    demands: &[StockDemand],
) -> Result<(), ServiceError> {
    let mut issues = Vec::new();

    for demand in demands {
        let record = InventoryRecord::find_by_key(demand.product_id, demand.variant_key)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match record {
            None => issues.push(StockIssue::MissingInventoryRecord {
                product_name: demand.product_name.clone(),
            }),
            Some(record) if record.available_quantity < demand.quantity => {
                issues.push(StockIssue::InsufficientStock {
                    product_name: demand.product_name.clone(),
                    available: record.available_quantity,
                    requested: demand.quantity,
                })
            }
            Some(record) if record.quantity <= 0 => issues.push(StockIssue::OutOfStock {
                product_name: demand.product_name.clone(),
            }),
            Some(_) => {}
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::StockValidation(issues))
    }
}

/// Service for managing the order lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    engine: ReservationEngine,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            engine: ReservationEngine::new(),
            event_sender,
        }
    }

    /// Creates an order. With stock management enabled, every line item is
    /// validated against current stock before anything is written; the
    /// create is all-or-nothing. Orders created directly into `confirmed`
    /// (or with payment already `paid`) reserve stock as if transitioning
    /// from `pending`/`pending`.
    #[instrument(skip(self, request), fields(order_number = %request.order_number, customer_id = %request.customer_id))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        policy: StockPolicy,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let initial_status = request.status.unwrap_or(OrderStatus::Pending);
        let initial_payment = request.payment_status.unwrap_or(PaymentStatus::Pending);

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        if policy.is_enabled() {
            let demands: Vec<StockDemand> = request.items.iter().map(StockDemand::from).collect();
            validate_stock(&txn, &demands).await?;
        }

        let total = compute_total(
            request.subtotal,
            request.discount_amount,
            request.tax_amount,
            request.shipping_amount,
        );

        let order = order::ActiveModel {
            order_number: Set(request.order_number.clone()),
            customer_id: Set(request.customer_id),
            status: Set(initial_status.to_string()),
            payment_status: Set(initial_payment.to_string()),
            subtotal: Set(request.subtotal),
            discount_amount: Set(request.discount_amount),
            tax_amount: Set(request.tax_amount),
            shipping_amount: Set(request.shipping_amount),
            total_amount: Set(total),
            currency: Set(request.currency),
            notes: Set(request.notes),
            version: Set(1),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut item_models = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let model = order_item::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                product_name: Set(item.product_name.clone()),
                quantity: Set(item.quantity),
                price: Set(item.price),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            item_models.push(model);
        }

        let mut movements = Vec::new();
        if policy.is_enabled()
            && (initial_status == OrderStatus::Confirmed || initial_payment == PaymentStatus::Paid)
        {
            let transition = StatusTransition::from_initial(initial_status, initial_payment);
            for item in &item_models {
                if let Some(movement) = self
                    .engine
                    .apply_transition(&txn, item, &transition, &order.order_number)
                    .await?
                {
                    movements.push(movement);
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %order.id,
            status = %order.status,
            adjustments = movements.len(),
            "Order created"
        );

        self.emit(Event::OrderCreated(order.id)).await;
        self.emit_movements(&movements).await;

        Ok(model_to_response(order))
    }

    /// Applies status/payment/amount changes to an order. Transitions that
    /// reserve stock re-run full availability validation against current
    /// stock first; a validation failure rejects the entire update. All
    /// field changes and per-item adjustments share one transaction.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
        policy: StockPolicy,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let previous_status = parse_status(&order.status)?;
        let previous_payment = parse_payment(&order.payment_status)?;
        let new_status = request.status.unwrap_or(previous_status);
        let new_payment = request.payment_status.unwrap_or(previous_payment);

        let reserves_stock = (new_status == OrderStatus::Confirmed
            && previous_status != OrderStatus::Confirmed)
            || (new_payment == PaymentStatus::Paid
                && previous_payment != PaymentStatus::Paid
                && new_status == OrderStatus::Pending);

        if policy.is_enabled() && reserves_stock {
            let demands: Vec<StockDemand> = items.iter().map(StockDemand::from).collect();
            validate_stock(&txn, &demands).await?;
        }

        let shipping = request.shipping_amount.unwrap_or(order.shipping_amount);
        let discount = request.discount_amount.unwrap_or(order.discount_amount);
        let amounts_changed = request.shipping_amount.is_some() || request.discount_amount.is_some();

        let mut active: order::ActiveModel = order.clone().into();
        active.status = Set(new_status.to_string());
        active.payment_status = Set(new_payment.to_string());
        if let Some(shipping_amount) = request.shipping_amount {
            active.shipping_amount = Set(shipping_amount);
        }
        if let Some(discount_amount) = request.discount_amount {
            active.discount_amount = Set(discount_amount);
        }
        if amounts_changed {
            active.total_amount = Set(compute_total(
                order.subtotal,
                discount,
                order.tax_amount,
                shipping,
            ));
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.version = Set(order.version + 1);
        active.updated_at = Set(Some(chrono::Utc::now()));

        let updated = active.update(&txn).await.map_err(ServiceError::db_error)?;

        let mut movements = Vec::new();
        if policy.is_enabled() {
            let transition = StatusTransition {
                previous_status,
                new_status,
                previous_payment_status: previous_payment,
                new_payment_status: new_payment,
            };
            for item in &items {
                if let Some(movement) = self
                    .engine
                    .apply_transition(&txn, item, &transition, &updated.order_number)
                    .await?
                {
                    movements.push(movement);
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %order_id,
            old_status = %previous_status,
            new_status = %new_status,
            adjustments = movements.len(),
            "Order updated"
        );

        if previous_status != new_status {
            self.emit(Event::OrderStatusChanged {
                order_id,
                old_status: previous_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        }
        self.emit(Event::OrderUpdated(order_id)).await;
        self.emit_movements(&movements).await;

        Ok(model_to_response(updated))
    }

    /// Deletes an order and its line items. Orders that may hold a
    /// reservation (any status other than `pending` or `cancelled`) release
    /// their stock first, as if cancelled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn delete_order(
        &self,
        order_id: Uuid,
        policy: StockPolicy,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let status = parse_status(&order.status)?;

        let mut movements = Vec::new();
        if policy.is_enabled()
            && !matches!(status, OrderStatus::Pending | OrderStatus::Cancelled)
        {
            for item in &items {
                if let Some(movement) = self
                    .engine
                    .release_for_deletion(&txn, item, &order.order_number)
                    .await?
                {
                    movements.push(movement);
                }
            }
        }

        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        OrderEntity::delete_by_id(order_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(
            order_id = %order_id,
            released = movements.len(),
            "Order deleted"
        );

        self.emit(Event::OrderDeleted(order_id)).await;
        self.emit_movements(&movements).await;

        Ok(())
    }

    /// Retrieves an order by id.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderResponse>, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(order.map(model_to_response))
    }

    /// Retrieves an order together with its line items.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<Option<(OrderResponse, Vec<OrderItemResponse>)>, ServiceError> {
        let db = &*self.db_pool;

        let Some(order) = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
        else {
            return Ok(None);
        };

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let item_responses = items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                product_name: item.product_name,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        Ok(Some((model_to_response(order), item_responses)))
    }

    /// Lists orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if per_page == 0 || per_page > 1000 {
            return Err(ServiceError::ValidationError(
                "Per-page must be between 1 and 1000".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;

        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(OrderListResponse {
            orders: orders.into_iter().map(model_to_response).collect(),
            total,
            page,
            per_page,
        })
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send event");
            }
        }
    }

    async fn emit_movements(&self, movements: &[AppliedMovement]) {
        for movement in movements {
            self.emit(Event::InventoryAdjusted {
                inventory_id: movement.inventory_id,
                product_id: movement.product_id,
                movement_type: movement.movement_type.to_string(),
                quantity: movement.quantity,
                previous_quantity: movement.previous_quantity,
                new_quantity: movement.new_quantity,
                reference: None,
            })
            .await;

            if let Some(alert) = movement.low_stock {
                self.emit(Event::LowStock {
                    inventory_id: movement.inventory_id,
                    product_id: movement.product_id,
                    available: alert.available,
                    reorder_point: alert.reorder_point,
                })
                .await;
            }
        }
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::InternalError(format!("Invalid order status: {}", raw)))
}

fn parse_payment(raw: &str) -> Result<PaymentStatus, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::InternalError(format!("Invalid payment status: {}", raw)))
}

fn model_to_response(model: order::Model) -> OrderResponse {
    let status = model.status.parse().unwrap_or(OrderStatus::Pending);
    let payment_status = model.payment_status.parse().unwrap_or(PaymentStatus::Pending);
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        status,
        payment_status,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        tax_amount: model.tax_amount,
        shipping_amount: model.shipping_amount,
        total_amount: model.total_amount,
        currency: model.currency,
        notes: model.notes,
        created_at: model.created_at,
        updated_at: model.updated_at,
        version: model.version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_is_subtotal_minus_discount_plus_tax_and_shipping() {
        let total = compute_total(dec!(100.00), dec!(10.00), dec!(8.25), dec!(5.00));
        assert_eq!(total, dec!(103.25));
    }

    #[test]
    fn create_request_rejects_empty_items() {
        let request = CreateOrderRequest {
            customer_id: Uuid::new_v4(),
            order_number: "ORD-001".to_string(),
            currency: "USD".to_string(),
            status: None,
            payment_status: None,
            subtotal: dec!(0),
            discount_amount: dec!(0),
            tax_amount: dec!(0),
            shipping_amount: dec!(0),
            notes: None,
            items: vec![],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn item_request_rejects_zero_quantity() {
        let item = CreateOrderItemRequest {
            product_id: Uuid::new_v4(),
            variant_id: None,
            product_name: "Widget".to_string(),
            quantity: 0,
            price: dec!(9.99),
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn model_to_response_carries_statuses() {
        let now = chrono::Utc::now();
        let model = order::Model {
            id: Uuid::new_v4(),
            order_number: "ORD-002".to_string(),
            customer_id: Uuid::new_v4(),
            status: "confirmed".to_string(),
            payment_status: "paid".to_string(),
            subtotal: dec!(20),
            discount_amount: dec!(0),
            tax_amount: dec!(0),
            shipping_amount: dec!(0),
            total_amount: dec!(20),
            currency: "USD".to_string(),
            notes: None,
            created_at: now,
            updated_at: Some(now),
            version: 1,
        };
        let response = model_to_response(model);
        assert_eq!(response.status, OrderStatus::Confirmed);
        assert_eq!(response.payment_status, PaymentStatus::Paid);
        assert_eq!(response.total_amount, dec!(20));
    }
}
