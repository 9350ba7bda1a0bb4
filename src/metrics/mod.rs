//! Performance metric calculation.

mod calculator;

pub use calculator::PerformanceCalculator;
