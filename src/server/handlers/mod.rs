pub mod chat;
pub mod conversations;
pub mod docs;
pub mod health;
