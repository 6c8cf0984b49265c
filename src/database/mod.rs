pub mod drama;
mod redis_connection;

pub use drama::*;
pub use redis_connection::*;
