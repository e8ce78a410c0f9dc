//! Upgrade hand-off: the host's shared listener list and the path
//! multiplexer that claims one path for the firehose.
//!
//! The host server diverts every HTTP upgrade request to
//! [`UpgradeListeners::emit`]. [`UpgradeMux::install`] takes over that list:
//! whatever handler was registered before it becomes the fallback, and from
//! then on requests for the firehose path are accepted here, other paths go to
//! the fallback, and with no fallback they are terminated.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ::metrics::counter;
use async_trait::async_trait;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::firehose::Firehose;
use crate::metrics::{FIREHOSE_UPGRADES_FORWARDED_TOTAL, FIREHOSE_UPGRADES_REJECTED_TOTAL};
use crate::socket::serve_websocket;

/// Something that takes ownership of an upgrade request and answers it.
#[async_trait]
pub trait UpgradeHandler: Send + Sync {
    /// Answer `request`, typically by completing or refusing the upgrade.
    async fn handle(&self, request: Request) -> Response;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> UpgradeHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, request: Request) -> Response {
        (self.0)(request).await
    }
}

/// Wrap an async closure as an [`UpgradeHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn UpgradeHandler>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// The host's `upgrade` listener list. Clones share the same list.
#[derive(Clone, Default)]
pub struct UpgradeListeners {
    inner: Arc<RwLock<Vec<Arc<dyn UpgradeHandler>>>>,
}

impl UpgradeListeners {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn on(&self, handler: Arc<dyn UpgradeHandler>) {
        self.inner.write().push(handler);
    }

    /// Detach and return every listener.
    pub fn remove_all(&self) -> Vec<Arc<dyn UpgradeHandler>> {
        std::mem::take(&mut *self.inner.write())
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Hand `request` to the first listener; terminate it if there is none.
    pub async fn emit(&self, request: Request) -> Response {
        let first = self.inner.read().first().cloned();
        match first {
            Some(handler) => handler.handle(request).await,
            None => {
                debug!(path = request.uri().path(), "no upgrade listener, terminating");
                terminate()
            }
        }
    }
}

/// Refuse an upgrade and close the underlying connection.
pub fn terminate() -> Response {
    (
        StatusCode::BAD_REQUEST,
        [(header::CONNECTION, "close")],
        "upgrade not handled",
    )
        .into_response()
}

/// Where an upgrade request goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Firehose path: accept as a firehose connection.
    Accept,
    /// Other path, fallback present: hand over unchanged.
    Forward,
    /// Other path, no fallback: terminate.
    Reject,
}

/// Multiplexer settings.
#[derive(Clone, Debug)]
pub struct MuxOptions {
    /// Path owned by the firehose.
    pub path: String,
    /// Max inbound message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub send_queue: usize,
}

impl From<&ServerConfig> for MuxOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            path: config.upgrade_path.clone(),
            max_message_size: config.max_message_size,
            send_queue: config.send_queue_capacity,
        }
    }
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Routes upgrades between the firehose and the pre-existing handler.
pub struct UpgradeMux {
    firehose: Arc<Firehose>,
    options: MuxOptions,
    fallback: Option<Arc<dyn UpgradeHandler>>,
}

impl UpgradeMux {
    /// Detach the current listeners, keep the first as fallback, and register
    /// the multiplexer as the only listener.
    pub fn install(
        listeners: &UpgradeListeners,
        firehose: Arc<Firehose>,
        options: MuxOptions,
    ) -> Arc<Self> {
        let mut previous = listeners.remove_all().into_iter();
        let fallback = previous.next();
        let ignored = previous.count();
        if ignored > 0 {
            warn!(ignored, "multiple upgrade listeners present, only the first is kept as fallback");
        }
        info!(
            path = %options.path,
            fallback = fallback.is_some(),
            "firehose upgrade multiplexer installed"
        );
        let mux = Arc::new(Self {
            firehose,
            options,
            fallback,
        });
        listeners.on(mux.clone());
        mux
    }

    /// Route for a request path. Matching is exact on the path, query excluded.
    pub fn route(&self, path: &str) -> Route {
        if path == self.options.path {
            Route::Accept
        } else if self.fallback.is_some() {
            Route::Forward
        } else {
            Route::Reject
        }
    }

    /// Whether a fallback handler was captured at install.
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Path owned by the firehose.
    pub fn path(&self) -> &str {
        &self.options.path
    }

    async fn accept(&self, request: Request) -> Response {
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let (mut parts, _body) = request.into_parts();
        let upgrade =
            match <WebSocketUpgrade as FromRequestParts<()>>::from_request_parts(&mut parts, &())
                .await
            {
                Ok(upgrade) => upgrade,
                Err(rejection) => {
                    debug!(error = %rejection, "firehose upgrade refused");
                    return rejection.into_response();
                }
            };

        debug!(remote = ?remote, "accepting firehose upgrade");
        let firehose = Arc::clone(&self.firehose);
        let send_queue = self.options.send_queue;
        upgrade
            .max_message_size(self.options.max_message_size)
            .on_upgrade(move |socket| serve_websocket(firehose, socket, remote, send_queue))
    }
}

#[async_trait]
impl UpgradeHandler for UpgradeMux {
    async fn handle(&self, request: Request) -> Response {
        match self.route(request.uri().path()) {
            Route::Accept => self.accept(request).await,
            Route::Forward => {
                counter!(FIREHOSE_UPGRADES_FORWARDED_TOTAL).increment(1);
                debug!(path = request.uri().path(), "forwarding upgrade to fallback");
                match &self.fallback {
                    Some(fallback) => fallback.handle(request).await,
                    None => terminate(),
                }
            }
            Route::Reject => {
                counter!(FIREHOSE_UPGRADES_REJECTED_TOTAL).increment(1);
                debug!(path = request.uri().path(), "rejecting upgrade, no fallback");
                terminate()
            }
        }
    }
}
