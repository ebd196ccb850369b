//! robots.txt compliance
//!
//! [`RobotRules`] evaluates allow/disallow and Crawl-delay for a single
//! domain; [`RobotsGate`] caches rules per domain and runs the
//! deferred-fetch protocol for domains whose rules are not yet known.

mod gate;
mod parser;

pub use gate::{RobotsDecision, RobotsGate, RobotsRecord, RobotsState};
pub use parser::RobotRules;
