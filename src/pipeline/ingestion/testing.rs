//! Scripted `HttpClientPort` for unit tests of the ingestion components.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::app::ports::{HttpClientPort, HttpRequest, HttpResponse, TransportError};

type Responder = Box<dyn FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send>;

pub struct ScriptedHttp {
    responder: Mutex<Responder>,
    requests: Mutex<Vec<(HttpRequest, Instant)>>,
}

impl ScriptedHttp {
    pub fn new(
        responder: impl FnMut(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + 'static,
    ) -> Self {
        Self {
            responder: Mutex::new(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClientPort for ScriptedHttp {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push((request.clone(), Instant::now()));
        let mut responder = self.responder.lock().unwrap();
        (&mut *responder)(request)
    }
}

pub fn json(status: u16, value: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status, value.to_string().into_bytes(), "application/json")
}

pub fn html(body: &str) -> HttpResponse {
    HttpResponse::new(200, body.as_bytes().to_vec(), "text/html; charset=utf-8")
}

pub fn status(code: u16) -> HttpResponse {
    HttpResponse::new(code, Vec::new(), "text/plain")
}
