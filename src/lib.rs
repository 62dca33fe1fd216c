//! Back-office order and inventory core.
//!
//! This crate implements the order lifecycle coordinator, the inventory
//! reservation engine, and the append-only stock movement ledger that keep
//! a product's on-hand, reserved, and available quantities consistent as
//! orders move through their lifecycle. HTTP routing, authentication, and
//! catalog modeling live in the surrounding system.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::orders::OrderService;
use services::stock_movements::StockMovementService;

/// Shared state handed to embedding applications.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        Self {
            db,
            config,
            event_sender,
        }
    }

    pub fn order_service(&self) -> OrderService {
        OrderService::new(self.db.clone(), self.event_sender.clone())
    }

    pub fn stock_movement_service(&self) -> StockMovementService {
        StockMovementService::new(self.db.clone())
    }
}
