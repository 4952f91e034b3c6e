//! Mutation bookkeeping for the host page.
//!
//! Host mutations collapse into at most one pending scan, executed on the next
//! frame. While a scan applies its own changes the observer is paused, so those
//! changes never schedule another scan.

#[derive(Debug, Default)]
pub struct PageObserver {
    observing: bool,
    scan_scheduled: bool,
}

impl PageObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self) {
        self.observing = true;
    }

    /// Returns whether the observer was running.
    pub fn disconnect(&mut self) -> bool {
        std::mem::replace(&mut self.observing, false)
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn is_scan_scheduled(&self) -> bool {
        self.scan_scheduled
    }

    /// A host mutation was seen. Returns true when it scheduled a new scan.
    pub fn record_mutation(&mut self) -> bool {
        if !self.observing {
            return false;
        }
        self.schedule()
    }

    /// Requests a scan regardless of observation state.
    pub fn schedule(&mut self) -> bool {
        if self.scan_scheduled {
            return false;
        }
        self.scan_scheduled = true;
        true
    }

    /// Consumes the pending scan, if any.
    pub fn take_scheduled(&mut self) -> bool {
        std::mem::replace(&mut self.scan_scheduled, false)
    }

    /// Starts a critical section; hand the result back to `resume`.
    pub fn pause(&mut self) -> bool {
        self.disconnect()
    }

    pub fn resume(&mut self, was_observing: bool) {
        if was_observing {
            self.observe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_coalesce_into_one_scan() {
        let mut observer = PageObserver::new();
        assert!(!observer.record_mutation());
        observer.observe();
        assert!(observer.record_mutation());
        assert!(!observer.record_mutation());
        assert!(observer.take_scheduled());
        assert!(!observer.take_scheduled());
    }

    #[test]
    fn paused_section_ignores_own_mutations() {
        let mut observer = PageObserver::new();
        observer.observe();
        let paused = observer.pause();
        assert!(!observer.record_mutation());
        observer.resume(paused);
        assert!(observer.is_observing());
        assert!(!observer.is_scan_scheduled());
    }
}
