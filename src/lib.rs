pub mod core;
pub mod server;
pub mod utils;
