pub mod api;
pub mod events;
pub mod models;
pub mod timeline;
