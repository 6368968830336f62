pub mod account;
pub mod admin;
pub mod analysis;
pub mod content;
pub mod envelope;
pub mod health;
pub mod latency;
pub mod markets;
pub mod public;
pub mod results;
pub mod routes;
pub mod session;
pub mod system;

pub use envelope::ApiResponse;
pub use routes::{router, ApiState};
