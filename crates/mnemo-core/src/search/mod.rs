//! Search planner (C8): query to ranked, optionally diversified and association-enriched
//! results.

mod planner;

pub use planner::{SearchHit, SearchMode, SearchOptions, SearchPlanner};
