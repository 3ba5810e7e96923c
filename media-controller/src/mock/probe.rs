use crate::bridge::UrlProbe;
use crate::errors::ProbeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// URL probe answering every request with the same scripted outcome.
pub struct MockUrlProbe {
    status: Mutex<Option<u16>>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockUrlProbe {
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Mutex::new(Some(status)),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Probe whose requests fail before a status is received.
    pub fn unreachable() -> Self {
        Self {
            status: Mutex::new(None),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: Option<u16>) {
        *self.status.lock() = status;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

impl Default for MockUrlProbe {
    fn default() -> Self {
        Self::with_status(200)
    }
}

#[async_trait]
impl UrlProbe for MockUrlProbe {
    async fn status(&self, url: &str) -> Result<u16, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let status = *self.status.lock();
        status.ok_or_else(|| ProbeError::Unavailable {
            reason: format!("{} is unreachable", url),
        })
    }
}
