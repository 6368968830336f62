pub mod accounts;
pub mod content;
pub mod models;
pub mod store;

pub use store::{connect, Store};
