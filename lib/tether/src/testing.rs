//! Scripted transport shared by the unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tower::Service;

use crate::{Error, Headers, Method, Request, Response, Result};

type Script = dyn Fn(&Request, usize) -> Result<Response> + Send + Sync;

/// Transport answering from a closure of `(request, zero-based call index)`,
/// recording every request it receives.
#[derive(Clone)]
pub(crate) struct ScriptedTransport {
    script: Arc<Script>,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        script: impl Fn(&Request, usize) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Arc::new(script),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with `status`.
    pub(crate) fn status(status: u16) -> Self {
        Self::new(move |_, _| Ok(response(status)))
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl Service<Request> for ScriptedTransport {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let index = {
            let mut seen = self
                .seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            seen.push(request.clone());
            seen.len() - 1
        };
        let result = (self.script)(&request, index).map(|r| r.with_request(request.head()));
        Box::pin(async move { result })
    }
}

pub(crate) fn response(status: u16) -> Response {
    Response::new(status, Headers::new(), bytes::Bytes::new())
}

pub(crate) fn get(url: &str) -> Request {
    Request::builder(Method::Get, url::Url::parse(url).expect("valid url")).build()
}
