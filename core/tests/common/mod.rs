//! Shared fixtures: a scripted transport and a mock server on a random port.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use couchdb_core::{CouchClient, HttpRequest, HttpResponse, Transport, TransportError};

/// Replies with queued responses in order and records every request.
#[derive(Default)]
pub struct Scripted {
    replies: Mutex<VecDeque<HttpResponse>>,
    pub seen: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    pub fn new(replies: impl IntoIterator<Item = HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last(&self) -> HttpRequest {
        self.seen.lock().unwrap().last().cloned().expect("no request sent")
    }
}

impl Transport for Scripted {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Io("no scripted reply left".to_string()))
    }
}

pub fn scripted_client(replies: impl IntoIterator<Item = HttpResponse>) -> (CouchClient, Arc<Scripted>) {
    let transport = Scripted::new(replies);
    let client = CouchClient::with_transport("http://couch.test:5984", transport.clone());
    (client, transport)
}

/// Start the mock server in a background thread and return its base URL.
pub fn spawn_mock_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// Accept connections and never answer them; returns the base URL.
pub fn spawn_silent_server() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming() {
            held.push(stream);
        }
    });
    format!("http://{addr}")
}
