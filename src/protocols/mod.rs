pub mod mqtt;
pub mod websocket;
