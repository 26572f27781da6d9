pub mod api;
pub mod connections;
