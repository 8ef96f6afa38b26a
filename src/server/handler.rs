// src/server/handler.rs
use crate::api::ManagementApi;
use crate::proxy::ProxyEngine;
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::Service;

/// Adapts [`ProxyEngine`] to the `tower::Service` the accept loop in
/// `builder.rs` drives. One instance is built per accepted connection (see
/// `ServerBuilder::serve`), carrying that connection's peer address so
/// `clientKey` extraction doesn't need a second lookup per request.
#[derive(Clone)]
pub struct RequestHandler {
    engine: Arc<ProxyEngine>,
    peer: SocketAddr,
}

impl RequestHandler {
    pub fn new(engine: Arc<ProxyEngine>, peer: SocketAddr) -> Self {
        Self { engine, peer }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let engine = self.engine.clone();
        let peer = self.peer;
        Box::pin(async move { Ok(engine.handle(req, peer).await) })
    }
}

/// Adapts [`ManagementApi`] the same way, for the second listener. The
/// management API doesn't need the peer address, so every connection gets
/// a clone of the same handler.
#[derive(Clone)]
pub struct ManagementHandler {
    api: Arc<ManagementApi>,
}

impl ManagementHandler {
    pub fn new(api: Arc<ManagementApi>) -> Self {
        Self { api }
    }
}

impl Service<Request<Body>> for ManagementHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let api = self.api.clone();
        Box::pin(async move { Ok(api.handle(req).await) })
    }
}
