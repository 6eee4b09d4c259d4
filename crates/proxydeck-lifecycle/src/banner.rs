//! Startup banner detection in terminal output.

use proxydeck_automation::OutputTail;

/// Watches terminal output for the proxy's "listening" banners.
///
/// Fires at most once until [`release`](BannerWatcher::release) or
/// [`clear`](BannerWatcher::clear) is called, so a banner that stays in the
/// tail does not trigger a probe on every chunk.
#[derive(Debug, Clone)]
pub struct BannerWatcher {
    banners: Vec<String>,
    tail: OutputTail,
    fired: bool,
}

impl BannerWatcher {
    pub fn new(banners: Vec<String>, tail_capacity: usize) -> Self {
        Self {
            banners,
            tail: OutputTail::new(tail_capacity),
            fired: false,
        }
    }

    /// Append output. Returns true when a banner is present, the proxy is
    /// not yet known to be connected, and the watcher has not fired.
    pub fn observe(&mut self, chunk: &[u8], connected: bool) -> bool {
        self.tail.push(chunk);
        if connected || self.fired || !self.tail.contains_any(&self.banners) {
            return false;
        }
        self.fired = true;
        true
    }

    /// Allow the next banner to fire again.
    pub fn release(&mut self) {
        self.fired = false;
    }

    /// Forget buffered output and re-arm.
    pub fn clear(&mut self) {
        self.tail.clear();
        self.fired = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxydeck_config::ProxyConfig;

    fn watcher() -> BannerWatcher {
        BannerWatcher::new(ProxyConfig::default().startup_banners, 2000)
    }

    #[test]
    fn fires_once_per_banner() {
        let mut w = watcher();
        assert!(!w.observe(b"starting...\r\n", false));
        assert!(w.observe(b"Server started successfully\r\n", false));
        assert!(!w.observe(b"Server running at: http://localhost:8642\r\n", false));
        assert!(w.has_fired());
    }

    #[test]
    fn connected_status_suppresses_trigger() {
        let mut w = watcher();
        assert!(!w.observe(b"Server started successfully", true));
        assert!(!w.has_fired());
    }

    #[test]
    fn release_rearms_while_banner_still_in_tail() {
        let mut w = watcher();
        assert!(w.observe(b"Server running at: http://localhost:8642", false));
        w.release();
        assert!(w.observe(b"\r\n", false));
    }

    #[test]
    fn clear_forgets_old_banner() {
        let mut w = watcher();
        assert!(w.observe(b"Server started successfully", false));
        w.clear();
        assert!(!w.observe(b"$ ", false));
        assert!(w.observe(b"Server started successfully", false));
    }

    #[test]
    fn banner_split_across_chunks() {
        let mut w = watcher();
        assert!(!w.observe(b"Server started succ", false));
        assert!(w.observe(b"essfully", false));
    }
}
