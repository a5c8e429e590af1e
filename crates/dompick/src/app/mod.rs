//! Application layer: selector and filter synthesis, the pick session, preferences and reports.

pub mod filters;
pub mod host;
pub mod picker;
pub mod prefs;
pub mod report;
pub mod selector;
