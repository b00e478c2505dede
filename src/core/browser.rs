//! Browser Launch
//!
//! Opening a URL in the user's default browser.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::warn;
use url::Url;

use crate::core::lock;

/// Opens URLs for the user (for dependency injection).
///
/// Failures are reported but never abort a flow; the user can still navigate
/// to the printed URL by hand.
pub trait BrowserOpener: Send + Sync {
    /// Open `url`.
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Default browser of the desktop session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

#[derive(Clone, Debug, Default)]
enum MockBehavior {
    #[default]
    Record,
    Fail,
    Approve {
        code: String,
    },
}

/// Mock browser opener for testing.
///
/// In approving mode it plays the user: follows the local start URL to the
/// consent page, then calls the redirect URL back with the consent page's
/// state and a fixed code.
#[derive(Default)]
pub struct MockBrowserOpener {
    opened: Mutex<Vec<String>>,
    callback_statuses: Arc<Mutex<Vec<u16>>>,
    behavior: MockBehavior,
}

impl MockBrowserOpener {
    /// Create a mock that records URLs and reports success.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that records URLs and reports failure.
    pub fn failing() -> Self {
        Self {
            behavior: MockBehavior::Fail,
            ..Self::default()
        }
    }

    /// Create a mock that grants consent and returns `code` to the callback.
    ///
    /// Must be opened from within a tokio runtime.
    pub fn approving(code: impl Into<String>) -> Self {
        Self {
            behavior: MockBehavior::Approve { code: code.into() },
            ..Self::default()
        }
    }

    /// URLs passed to `open`.
    pub fn get_opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }

    /// HTTP statuses the callback path answered in approving mode.
    pub fn get_callback_statuses(&self) -> Vec<u16> {
        lock(&self.callback_statuses).clone()
    }
}

impl BrowserOpener for MockBrowserOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        lock(&self.opened).push(url.to_string());

        match &self.behavior {
            MockBehavior::Record => Ok(()),
            MockBehavior::Fail => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no browser available",
            )),
            MockBehavior::Approve { code } => {
                let start = Url::parse(url)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

                let code = code.clone();
                let statuses = self.callback_statuses.clone();
                runtime.spawn(async move {
                    match grant_consent(start, &code).await {
                        Ok(status) => lock(&statuses).push(status),
                        Err(e) => warn!(error = %e, "mock consent failed"),
                    }
                });
                Ok(())
            }
        }
    }
}

async fn grant_consent(mut start: Url, code: &str) -> Result<u16, String> {
    // Skip name resolution; the listener binds the IPv4 loopback.
    start
        .set_host(Some("127.0.0.1"))
        .map_err(|e| e.to_string())?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| e.to_string())?;

    let response = client
        .get(start.clone())
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let consent = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| format!("no redirect from {} ({})", start, response.status()))?;
    let consent = Url::parse(consent).map_err(|e| e.to_string())?;

    let params: HashMap<String, String> = consent.query_pairs().into_owned().collect();
    let state = params.get("state").ok_or("consent URL without state")?;
    let redirect = params
        .get("redirect_uri")
        .ok_or("consent URL without redirect_uri")?;
    let redirect = Url::parse(redirect).map_err(|e| e.to_string())?;

    let mut callback = start;
    callback.set_path(redirect.path());
    callback
        .query_pairs_mut()
        .clear()
        .append_pair("state", state)
        .append_pair("code", code);

    let response = client
        .get(callback)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    Ok(response.status().as_u16())
}
