pub mod app;
pub mod model;
pub mod msg;
pub mod plugin;
