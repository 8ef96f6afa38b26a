// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use crate::server::listener::bind_tcp;
use anyhow::Result;
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower::Service;

/// Builder pattern so `main.rs` can inject a per-connection handler
/// factory for either listener (proxy or management API).
///
/// `F` builds one `H` per accepted connection, given that connection's
/// peer address — generalized from a single shared `handler` so the proxy
/// listener can hand each connection's `RequestHandler` its own
/// `clientKey` without a second address lookup per request.
pub struct ServerBuilder<F> {
    addr: SocketAddr,
    make_handler: Option<F>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<F, H> ServerBuilder<F>
where
    F: Fn(SocketAddr) -> H + Send + Sync + 'static,
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            make_handler: None,
            shutdown: None,
        }
    }

    /// Inject a factory producing one handler per connection.
    pub fn with_handler_factory(mut self, make_handler: F) -> Self {
        self.make_handler = Some(make_handler);
        self
    }

    /// Wire a shared cancellation signal: once it observes `true`, the
    /// accept loop stops taking new connections and `serve()` returns
    /// (process bootstrap waits out the drain period separately).
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Consume the builder, boot the TCP listener, spawn Hyper tasks.
    pub async fn serve(self) -> Result<()> {
        let make_handler = self
            .make_handler
            .expect("handler factory must be set via with_handler_factory()");

        let listener = bind_tcp(self.addr).await?;
        tracing::info!("HTTP server listening on {}", self.addr);

        let mut shutdown = self.shutdown;

        loop {
            let accepted = match shutdown.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        res = listener.accept() => Some(res),
                        _ = rx.changed() => {
                            if *rx.borrow() {
                                None
                            } else {
                                continue;
                            }
                        }
                    }
                }
                None => Some(listener.accept().await),
            };

            let (stream, peer) = match accepted {
                Some(Ok(pair)) => pair,
                Some(Err(err)) => {
                    tracing::warn!(%err, "accept error");
                    continue;
                }
                None => {
                    tracing::info!(addr = %self.addr, "listener stopping");
                    break;
                }
            };

            let svc = (make_handler)(peer);

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }

        Ok(())
    }
}
