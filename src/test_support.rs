//! Stand-ins for the bridge backend, shared by the unit tests: a recording
//! `Transport` mock and a one-request HTTP server for the real transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::api::{BridgeRequest, Transport};
use crate::error::{IntegrationError, IntegrationResult};

type ErrorFactory = Box<dyn Fn() -> IntegrationError + Send + Sync>;

enum Route {
    Respond(Value),
    Fail(ErrorFactory),
    Hang,
    /// Wait for the notify, then answer `{ success: true }`.
    Gate(Arc<Notify>),
}

/// Records every request; unrouted paths answer `{ "success": true }`.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<BridgeRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Respond(body));
    }

    pub fn fail<F>(&self, path: &str, make_error: F)
    where
        F: Fn() -> IntegrationError + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Fail(Box::new(make_error)));
    }

    pub fn hang(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Hang);
    }

    pub fn gate(&self, path: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Gate(notify.clone()));
        notify
    }

    pub fn calls(&self) -> Vec<BridgeRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<BridgeRequest> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }

    pub fn last_body(&self, path: &str) -> Option<Value> {
        self.calls_to(path).pop().and_then(|c| c.body)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: BridgeRequest) -> IntegrationResult<Value> {
        let path = request.path.clone();
        self.calls.lock().unwrap().push(request);

        let gate = {
            let routes = self.routes.lock().unwrap();
            match routes.get(&path) {
                None => return Ok(json!({ "success": true })),
                Some(Route::Respond(body)) => return Ok(body.clone()),
                Some(Route::Fail(make_error)) => return Err(make_error()),
                Some(Route::Hang) => None,
                Some(Route::Gate(notify)) => Some(notify.clone()),
            }
        };

        match gate {
            Some(notify) => {
                notify.notified().await;
                Ok(json!({ "success": true }))
            }
            None => std::future::pending().await,
        }
    }
}

/// What the one-shot server saw. Header names are lowercased.
#[derive(Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Accept one HTTP/1.1 request on a loopback port, answer with `status` and
/// `body`, and hand back the captured request. Returns the base URL.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let reply = body.to_string();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }
        let request_body =
            String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();

        let reason = if status < 400 { "OK" } else { "Error" };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
            reply.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;

        CapturedRequest {
            request_line,
            headers,
            body: request_body,
        }
    });

    (base_url, handle)
}
