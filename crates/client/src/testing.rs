//! In-memory tus server for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Method, StatusCode, Url};
use tuskit_protocol::{header, parse_offset};

use crate::transport::{
    BodyWriter, HttpRequest, HttpResponse, HttpTransport, TransportError, TransportFuture,
};

pub(crate) const ENDPOINT: &str = "http://tus.test/files/";

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// An accepted transfer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Patch {
    pub offset: u64,
    /// Sizes of the individual body writes.
    pub writes: Vec<usize>,
}

impl Patch {
    pub fn len(&self) -> usize {
        self.writes.iter().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StoredUpload {
    pub length: u64,
    pub metadata: Option<String>,
    pub data: Vec<u8>,
}

/// Server state and behaviour switches.
#[derive(Debug, Default)]
pub(crate) struct ServerState {
    pub uploads: HashMap<String, StoredUpload>,
    pub requests: Vec<Recorded>,
    pub patches: Vec<Patch>,
    next_id: u32,

    /// URL creation responses report, as if the POST had been redirected.
    pub creation_final_url: Option<Url>,
    pub creation_status: Option<StatusCode>,
    pub omit_location: bool,
    pub head_status: Option<StatusCode>,
    /// Raw `Upload-Offset` value for HEAD responses; `Some("")` omits it.
    pub head_offset: Option<&'static str>,
    pub patch_status: Option<StatusCode>,
    /// Added to the offset reported after a transfer.
    pub patch_offset_skew: u64,
    /// Transfers stop accepting body writes after this many.
    pub cut_after_writes: Option<usize>,
    /// Early response of a cut transfer; `None` drops the connection.
    pub cut_status: Option<StatusCode>,
}

impl ServerState {
    pub fn count(&self, method: Method) -> usize {
        self.requests.iter().filter(|r| r.method == method).count()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::new(self.clone())
    }

    /// Registers an upload that already holds `data`.
    pub fn seed(&self, id: &str, length: u64, data: &[u8]) {
        self.state().uploads.insert(
            id.to_string(),
            StoredUpload {
                length,
                metadata: None,
                data: data.to_vec(),
            },
        );
    }

    pub fn data(&self, id: &str) -> Vec<u8> {
        self.state().uploads[id].data.clone()
    }
}

fn upload_id(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default()
        .to_string()
}

fn request_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn respond(status: StatusCode, url: Url) -> HttpResponse {
    HttpResponse {
        status,
        url,
        headers: HeaderMap::new(),
    }
}

fn with_offset(mut response: HttpResponse, offset: u64) -> HttpResponse {
    response.headers.insert(
        HeaderName::from_static(header::UPLOAD_OFFSET),
        HeaderValue::from(offset),
    );
    response
}

impl ServerState {
    fn record(&mut self, request: &HttpRequest) {
        self.requests.push(Recorded {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
        });
    }

    fn create(&mut self, request: HttpRequest) -> HttpResponse {
        if let Some(status) = self.creation_status {
            return respond(status, request.url);
        }

        self.next_id += 1;
        let id = format!("u{}", self.next_id);
        let length = request_header(&request.headers, header::UPLOAD_LENGTH)
            .and_then(parse_offset)
            .unwrap_or_default();
        let metadata =
            request_header(&request.headers, header::UPLOAD_METADATA).map(str::to_string);
        self.uploads.insert(
            id.clone(),
            StoredUpload {
                length,
                metadata,
                data: Vec::new(),
            },
        );

        let url = self.creation_final_url.clone().unwrap_or(request.url);
        let mut response = respond(StatusCode::CREATED, url);
        if !self.omit_location {
            response
                .headers
                .insert(LOCATION, HeaderValue::from_str(&id).unwrap());
        }
        response
    }

    fn head(&mut self, request: HttpRequest) -> HttpResponse {
        if let Some(status) = self.head_status {
            return respond(status, request.url);
        }
        let Some(upload) = self.uploads.get(&upload_id(&request.url)) else {
            return respond(StatusCode::NOT_FOUND, request.url);
        };

        let mut response = respond(StatusCode::OK, request.url);
        match self.head_offset {
            Some("") => {}
            Some(raw) => {
                response.headers.insert(
                    HeaderName::from_static(header::UPLOAD_OFFSET),
                    HeaderValue::from_static(raw),
                );
            }
            None => response = with_offset(response, upload.data.len() as u64),
        }
        response.headers.insert(
            HeaderName::from_static(header::UPLOAD_LENGTH),
            HeaderValue::from(upload.length),
        );
        response
    }
}

impl HttpTransport for MockServer {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_, HttpResponse> {
        Box::pin(async move {
            let mut state = self.state();
            state.record(&request);
            let overridden = request.headers.contains_key(header::METHOD_OVERRIDE);
            let method = request.method.clone();
            Ok(match method {
                Method::POST if !overridden => state.create(request),
                Method::HEAD => state.head(request),
                _ => respond(StatusCode::METHOD_NOT_ALLOWED, request.url),
            })
        })
    }

    fn open(&self, request: HttpRequest) -> TransportFuture<'_, Box<dyn BodyWriter>> {
        Box::pin(async move {
            let mut state = self.state();
            state.record(&request);

            let id = upload_id(&request.url);
            let offset = request_header(&request.headers, header::UPLOAD_OFFSET)
                .and_then(parse_offset)
                .unwrap_or(u64::MAX);
            let is_patch = request.method == Method::PATCH
                || (request.method == Method::POST
                    && request_header(&request.headers, header::METHOD_OVERRIDE)
                        == Some("PATCH"));

            let rejected = match state.uploads.get(&id) {
                _ if !is_patch => Some(StatusCode::METHOD_NOT_ALLOWED),
                None => Some(StatusCode::NOT_FOUND),
                Some(upload) if upload.data.len() as u64 != offset => Some(StatusCode::CONFLICT),
                Some(_) => None,
            };

            let writer: Box<dyn BodyWriter> = Box::new(MockBody {
                state: Arc::clone(&self.state),
                url: request.url,
                id,
                offset,
                rejected,
                cut: state
                    .cut_after_writes
                    .map(|after| (after, state.cut_status)),
                writes: Vec::new(),
                data: Vec::new(),
            });
            Ok(writer)
        })
    }
}

/// Body of a transfer; the server answers early when `rejected` is set.
struct MockBody {
    state: Arc<Mutex<ServerState>>,
    url: Url,
    id: String,
    offset: u64,
    rejected: Option<StatusCode>,
    /// Writes accepted before the transfer is cut, and its early response.
    cut: Option<(usize, Option<StatusCode>)>,
    writes: Vec<usize>,
    data: Vec<u8>,
}

impl MockBody {
    fn is_cut(&self) -> bool {
        self.cut.is_some_and(|(after, _)| self.writes.len() >= after)
    }
}

impl BodyWriter for MockBody {
    fn write(&mut self, chunk: Bytes) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.rejected.is_some() || self.is_cut() {
                return Err(TransportError::BodyRejected);
            }
            self.writes.push(chunk.len());
            self.data.extend_from_slice(&chunk);
            Ok(())
        })
    }

    fn close(self: Box<Self>) -> TransportFuture<'static, HttpResponse> {
        let is_cut = self.is_cut();
        let MockBody {
            state,
            url,
            id,
            offset,
            rejected,
            cut,
            writes,
            data,
        } = *self;

        Box::pin(async move {
            if let Some(status) = rejected {
                return Ok(respond(status, url));
            }
            if is_cut {
                return match cut.and_then(|(_, status)| status) {
                    Some(status) => Ok(respond(status, url)),
                    None => Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into()),
                };
            }

            let mut state = state.lock().unwrap();
            if let Some(status) = state.patch_status {
                return Ok(respond(status, url));
            }

            let skew = state.patch_offset_skew;
            let Some(upload) = state.uploads.get_mut(&id) else {
                return Ok(respond(StatusCode::NOT_FOUND, url));
            };
            upload.data.extend_from_slice(&data);
            let new_offset = upload.data.len() as u64;
            state.patches.push(Patch { offset, writes });

            Ok(with_offset(
                respond(StatusCode::NO_CONTENT, url),
                new_offset + skew,
            ))
        })
    }
}
