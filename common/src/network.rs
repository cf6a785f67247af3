pub mod gateway;
pub mod interface;
