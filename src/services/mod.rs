pub mod orders;
pub mod reservation;
pub mod settings;
pub mod stock_movements;
