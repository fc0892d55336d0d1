pub mod health;
pub mod results;
pub mod vote;
pub mod websocket;
