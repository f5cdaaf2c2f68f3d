// Axum route handlers, one module per resource.

pub mod comments;
pub mod events;
pub mod follows;
pub mod notifications;
pub mod posts;
pub mod status;
