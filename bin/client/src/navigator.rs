//! Browser redirects.
//!
//! The provider hands every URL the user must open to a [`Navigator`]. The
//! console implementation prints it; tests record it.

use tracing::info;

/// Sends the user's browser to a URL.
pub trait Navigator: Send + Sync {
    /// Navigates to `url`.
    fn navigate(&self, url: &str);
}

/// Prints redirect targets for the user to open.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, url: &str) {
        info!(%url, "browser redirect");
        println!("Open this URL in your browser:\n  {url}");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every navigation.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct RecordingNavigator {
        visited: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingNavigator {
        pub(crate) fn visited(&self) -> Vec<String> {
            self.visited.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &str) {
            self.visited
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(url.to_string());
        }
    }

    #[test]
    fn recording_navigator_keeps_order() {
        let navigator = RecordingNavigator::default();
        navigator.navigate("http://a");
        navigator.navigate("http://b");
        assert_eq!(navigator.visited(), vec!["http://a", "http://b"]);
    }
}
