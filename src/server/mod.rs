pub mod handlers;
pub mod openapi;
pub mod router;
