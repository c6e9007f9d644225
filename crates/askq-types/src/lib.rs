pub mod api;
pub mod channels;
pub mod events;
pub mod models;
