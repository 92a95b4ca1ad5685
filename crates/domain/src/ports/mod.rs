pub mod gateway;

pub use gateway::{DeliveryGateway, DeliveryReceipt, GatewayError};
