pub mod connection;
pub mod handler;
pub mod listener;
pub mod sender;
