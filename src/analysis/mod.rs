pub mod analyzer;
pub mod frequency;

pub use analyzer::{validate_period_days, Analyzer, MarketLookup, ResultSource};
