//! HTTP transport used by the upload client.
//!
//! [`HttpTransport`] is the seam between protocol logic and the network. The
//! client only needs two shapes of exchange: a request without a body
//! (creation, offset probe) and a request whose body is streamed chunk by
//! chunk over several calls (transfer). [`ReqwestTransport`] is the
//! production implementation; tests plug in an in-memory server.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode, Url};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, RedirectPolicy};

/// Redirects followed before giving up.
const MAX_REDIRECTS: usize = 10;

/// Redirects that keep the method and body of any request.
const METHOD_PRESERVING: &[StatusCode] =
    &[StatusCode::TEMPORARY_REDIRECT, StatusCode::PERMANENT_REDIRECT];

/// Redirects followed by `HEAD` requests; reqwest keeps `HEAD` on all of them.
const HEAD_REDIRECTS: &[StatusCode] = &[
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Boxed future returned by transport methods.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Errors raised below the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request body rejected: the server stopped reading before it was complete")]
    BodyRejected,
}

/// An outgoing request, without its body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

/// A received response; the body is never needed by the protocol.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// URL the response actually came from, after redirects.
    pub url: Url,
    pub headers: HeaderMap,
}

impl HttpResponse {
    /// Returns a header value if present and valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl From<&reqwest::Response> for HttpResponse {
    fn from(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            url: response.url().clone(),
            headers: response.headers().clone(),
        }
    }
}

/// Abstract HTTP client.
///
/// Implementations own connection handling, TLS, timeouts and redirects.
pub trait HttpTransport: Send + Sync {
    /// Sends a request without a body and waits for the response.
    fn send(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse>;

    /// Starts a request whose body is written incrementally.
    fn open(&self, request: HttpRequest) -> TransportFuture<'_, Box<dyn BodyWriter>>;
}

/// Body of a request opened with [`HttpTransport::open`].
pub trait BodyWriter: Send {
    /// Transmits `chunk` as the next part of the body.
    ///
    /// Fails with [`TransportError::BodyRejected`] when the server has
    /// already answered or stopped reading; [`close`](Self::close) then
    /// returns that early response, or the error that ended the request
    /// when no response arrived.
    fn write(&mut self, chunk: Bytes) -> TransportFuture<'_, ()>;

    /// Ends the body and waits for the response.
    fn close(self: Box<Self>) -> TransportFuture<'static, HttpResponse>;
}

// ---------------------------------------------------------------------------
// reqwest
// ---------------------------------------------------------------------------

/// Production transport using `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    /// Client for `HEAD` requests, which may follow more redirects.
    head: reqwest::Client,
}

fn follow_only(statuses: &'static [StatusCode]) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if statuses.contains(&attempt.status()) {
            attempt.follow()
        } else {
            attempt.stop()
        }
    })
}

impl ReqwestTransport {
    /// Builds a client honouring the timeout and redirect settings.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let (redirect, head_redirect) = match config.redirects {
            RedirectPolicy::Never => (Policy::none(), Policy::none()),
            RedirectPolicy::PreserveMethod => {
                (follow_only(METHOD_PRESERVING), follow_only(HEAD_REDIRECTS))
            }
        };

        let build = |redirect: Policy| {
            reqwest::Client::builder()
                .connect_timeout(config.connect_timeout())
                .redirect(redirect)
                .build()
        };

        Ok(Self {
            http: build(redirect)?,
            head: build(head_redirect)?,
        })
    }

    /// Wraps an already configured client, used for every request.
    ///
    /// The caller is responsible for its redirect policy: reqwest's default
    /// turns a redirected `POST` into a `GET`.
    pub fn from_client(http: reqwest::Client) -> Self {
        Self {
            head: http.clone(),
            http,
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
        Box::pin(async move {
            let http = if request.method == Method::HEAD {
                &self.head
            } else {
                &self.http
            };
            let response = http
                .request(request.method, request.url)
                .headers(request.headers)
                .send()
                .await?;
            Ok(HttpResponse::from(&response))
        })
    }

    fn open(&self, request: HttpRequest) -> TransportFuture<'_, Box<dyn BodyWriter>> {
        Box::pin(async move {
            // Capacity 1: a write returns once the previous chunk was taken
            // by the connection, so at most two chunks are in memory.
            let (tx, rx) = mpsc::channel::<Bytes>(1);
            let stream = futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv()
                    .await
                    .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
            });

            let pending = self
                .http
                .request(request.method, request.url)
                .headers(request.headers)
                .body(reqwest::Body::wrap_stream(stream))
                .send();

            let writer: Box<dyn BodyWriter> = Box::new(ReqwestBodyWriter {
                tx,
                response: ResponseState::Pending(tokio::spawn(pending)),
            });
            Ok(writer)
        })
    }
}

type PendingResponse = JoinHandle<Result<reqwest::Response, reqwest::Error>>;

enum ResponseState {
    Pending(PendingResponse),
    /// The request ended before its body did.
    Settled(Result<HttpResponse, TransportError>),
}

/// Feeds a streaming request body running on its own task.
struct ReqwestBodyWriter {
    tx: mpsc::Sender<Bytes>,
    response: ResponseState,
}

fn settle(
    joined: Result<Result<reqwest::Response, reqwest::Error>, tokio::task::JoinError>,
) -> Result<HttpResponse, TransportError> {
    let response = joined.map_err(std::io::Error::other)??;
    Ok(HttpResponse::from(&response))
}

impl BodyWriter for ReqwestBodyWriter {
    fn write(&mut self, chunk: Bytes) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let ReqwestBodyWriter { tx, response } = self;
            let ResponseState::Pending(handle) = response else {
                return Err(TransportError::BodyRejected);
            };

            // A response before the body is complete is an early rejection.
            let outcome = tokio::select! {
                biased;
                joined = &mut *handle => Err(Some(joined)),
                sent = tx.send(chunk) => sent.map_err(|_| None),
            };
            let joined = match outcome {
                Ok(()) => return Ok(()),
                Err(Some(joined)) => joined,
                // The connection dropped the body; its task holds the outcome.
                Err(None) => (&mut *handle).await,
            };

            *response = ResponseState::Settled(settle(joined));
            Err(TransportError::BodyRejected)
        })
    }

    fn close(self: Box<Self>) -> TransportFuture<'static, HttpResponse> {
        let ReqwestBodyWriter { tx, response } = *self;
        // Dropping the sender ends the body stream.
        drop(tx);
        Box::pin(async move {
            match response {
                ResponseState::Pending(handle) => settle(handle.await),
                ResponseState::Settled(result) => result,
            }
        })
    }
}
