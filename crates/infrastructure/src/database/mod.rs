pub mod manager;
pub mod postgres;

pub use manager::DatabaseManager;
