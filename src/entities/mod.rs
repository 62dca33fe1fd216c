pub mod inventory_record;
pub mod order;
pub mod order_item;
pub mod stock_movement;
