pub mod results_cache;

pub use results_cache::{LiveResult, ResultsCache};
