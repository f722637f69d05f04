//! Peripheral monitors.
//!
//! Periodic tasks that add context to the journal alongside the file
//! inventory. They share nothing with the scanner or the watcher beyond the
//! database handle. Every platform query sits behind a probe trait.

mod focus;
mod resources;

pub use focus::{
    clean_title, FocusMonitor, FocusProbe, XdotoolProbe, FOCUS_INTERVAL, UNKNOWN_FOCUS,
};
pub use resources::{
    ProcProbe, ResourceMonitor, ResourceProbe, ResourceSample, ResourceThresholds, TopProcess,
    RESOURCE_INTERVAL,
};
