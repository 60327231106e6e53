pub mod agent;
pub mod chat;
pub mod core;
pub mod db;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
