//! Script-rendering capability for pages that build their links client-side
//!
//! The crate ships no browser. Callers inject a [`RendererFactory`]; the
//! [`RenderSession`] launches it on first need and releases it when the run
//! closes the session. A [`SessionGuard`] releases it when the run is dropped
//! before it could close the session itself.

use crate::classifier::DiscoveredLink;
use crate::crawler::FetchError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Renders a page and returns the links present after scripts ran
///
/// Must be idempotent and free of side effects visible to the crawler.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_page(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Vec<DiscoveredLink>, FetchError>;

    /// Releases the underlying resources
    async fn close(&self) {}
}

/// Launches a renderer when one is first needed
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn PageRenderer>, FetchError>;
}

enum SessionState {
    Idle,
    Ready(Arc<dyn PageRenderer>),
    /// Launch failed or no factory; rendering falls back to plain fetch
    Unavailable,
    Closed,
}

/// Lazily acquired, explicitly released render capability
pub struct RenderSession {
    factory: Option<Arc<dyn RendererFactory>>,
    state: Mutex<SessionState>,
}

impl RenderSession {
    pub fn new(factory: Arc<dyn RendererFactory>) -> Self {
        Self {
            factory: Some(factory),
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// A session that never renders
    pub fn disabled() -> Self {
        Self {
            factory: None,
            state: Mutex::new(SessionState::Unavailable),
        }
    }

    /// Returns the renderer, launching it on first call
    ///
    /// Returns None when rendering is disabled, failed to launch, or the session
    /// was already closed.
    pub async fn get(&self) -> Option<Arc<dyn PageRenderer>> {
        let mut state = self.state.lock().await;
        match &*state {
            SessionState::Ready(renderer) => return Some(Arc::clone(renderer)),
            SessionState::Unavailable | SessionState::Closed => return None,
            SessionState::Idle => {}
        }

        let factory = match &self.factory {
            Some(factory) => Arc::clone(factory),
            None => {
                *state = SessionState::Unavailable;
                return None;
            }
        };

        match factory.launch().await {
            Ok(renderer) => {
                info!("renderer launched");
                *state = SessionState::Ready(Arc::clone(&renderer));
                Some(renderer)
            }
            Err(e) => {
                warn!(error = %e, "renderer failed to launch, falling back to plain fetch");
                *state = SessionState::Unavailable;
                None
            }
        }
    }

    /// True once a renderer has been launched and not yet closed
    pub async fn is_active(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Ready(_))
    }

    /// Releases the renderer if one was launched; later calls to `get` return None
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, SessionState::Closed);
        if let SessionState::Ready(renderer) = previous {
            renderer.close().await;
            debug!("renderer closed");
        }
    }
}

/// Owns a session for the length of a run and closes it on every exit path
///
/// Dropping the guard without calling [`SessionGuard::close`] spawns the close
/// onto the current tokio runtime.
pub struct SessionGuard {
    session: Arc<RenderSession>,
    closed: bool,
}

impl SessionGuard {
    pub fn new(session: Arc<RenderSession>) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub fn session(&self) -> &Arc<RenderSession> {
        &self.session
    }

    pub async fn close(mut self) {
        self.session.close().await;
        self.closed = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("run dropped, releasing renderer in the background");
                handle.spawn(async move { session.close().await });
            }
            Err(_) => warn!("no runtime left to release the renderer"),
        }
    }
}
