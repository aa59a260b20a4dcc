pub mod call;
pub mod chat;
pub mod friends;
pub mod group;
pub mod session;
