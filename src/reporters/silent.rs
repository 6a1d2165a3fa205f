//! Event sink that discards everything.

use super::{ReportEvent, Reporter};

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl SilentReporter {
    pub fn new() -> Self {
        SilentReporter
    }
}

impl Reporter for SilentReporter {
    fn report(&self, _event: ReportEvent) {}
}
