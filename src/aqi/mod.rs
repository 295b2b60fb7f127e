//! AQI computation: breakpoint tables and the calculator built on them.

mod breakpoints;
mod calculator;

pub use breakpoints::*;
pub use calculator::AqiCalculator;
