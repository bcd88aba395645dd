//! Terminal stand-in for the browser
//!
//! Redirects are printed for the user to open. There is no hidden frame to
//! run a silent SSO check in, so those always report no callback.

use std::io::Write;

use portfolio_auth::store::BoxFuture;
use portfolio_auth::{CallbackParams, Error, Navigator, Result};
use tracing::debug;

pub struct TerminalNavigator<W> {
    out: std::sync::Mutex<W>,
}

impl<W: Write + Send> TerminalNavigator<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: std::sync::Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> Navigator for TerminalNavigator<W> {
    fn redirect<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut out = self
                .out
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            writeln!(out, "Open this URL in your browser:\n  {url}")
                .map_err(|e| Error::Navigation(format!("writing redirect: {e}")))
        })
    }

    fn silent_check<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Option<CallbackParams>>> {
        Box::pin(async move {
            debug!("silent SSO check skipped, no browser available");
            Ok(None)
        })
    }
}
