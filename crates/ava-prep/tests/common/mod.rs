// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Shared fixtures: a scripted media tool and a minimal HTTP file server.

#![allow(dead_code)]

use ava_prep::{
    Error, MediaInfo, MediaTool,
    media::TrimRequest,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Marker content for media files the fake probe reports as unreadable.
pub const CORRUPT: &[u8] = b"corrupt";

/// Media tool that writes placeholder clips and records every call.
///
/// A trim writes `b"clip"` to the output. A probe fails for empty files and
/// files holding [`CORRUPT`] and reports `frames` frames of `duration`
/// seconds otherwise.
#[derive(Default)]
pub struct FakeTool {
    pub trims: Mutex<Vec<TrimRequest>>,
    pub probes: AtomicUsize,
    /// Inputs whose trim fails after writing a partial output.
    pub fail_inputs: Vec<String>,
    /// Frames reported for readable files; 150 when unset.
    pub frames: Option<u64>,
    /// Duration reported for readable files; 5 s when unset.
    pub duration: Option<f64>,
}

impl FakeTool {
    pub fn trim_count(&self) -> usize {
        self.trims.lock().unwrap().len()
    }
}

impl MediaTool for FakeTool {
    async fn trim(&self, request: &TrimRequest) -> Result<(), Error> {
        self.trims.lock().unwrap().push(request.clone());
        std::fs::write(&request.output, b"clip")?;

        let input = request.input.to_string_lossy();
        if self.fail_inputs.iter().any(|f| input.contains(f.as_str())) {
            return Err(Error::Trim(format!("{}: decoder error", input)));
        }
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, Error> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let data = std::fs::read(path)?;
        if data.is_empty() || data == CORRUPT {
            return Err(Error::Probe(format!("{}: invalid data", path.display())));
        }
        Ok(MediaInfo {
            duration: self.duration.unwrap_or(5.0),
            frames: self.frames.unwrap_or(150),
            width: 640,
            height: 360,
            codec: "h264".to_string(),
            fps: 30.0,
            has_video: true,
        })
    }
}

/// One canned response.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Advertised length when it should differ from the body.
    pub content_length: Option<usize>,
}

impl Route {
    pub fn ok(body: &[u8]) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            content_length: None,
        }
    }

    pub fn truncated(body: &[u8], advertised: usize) -> Self {
        Self {
            status: 200,
            body: body.to_vec(),
            content_length: Some(advertised),
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub requests: Arc<AtomicUsize>,
    pub paths: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Serves `routes` by request path; anything else is a 404.
pub async fn start_server(routes: HashMap<String, Route>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(AtomicUsize::new(0));
    let paths = Arc::new(Mutex::new(Vec::new()));
    let routes = Arc::new(routes);

    let counter = requests.clone();
    let seen = paths.clone();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            let counter = counter.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let _ = serve_connection(sock, &routes, &counter, &seen).await;
            });
        }
    });

    TestServer {
        addr,
        requests,
        paths,
    }
}

async fn serve_connection(
    mut sock: TcpStream,
    routes: &HashMap<String, Route>,
    counter: &AtomicUsize,
    seen: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 16 * 1024];
    let mut n = 0;
    loop {
        let read = sock.read(&mut buf[n..]).await?;
        if read == 0 {
            return Ok(());
        }
        n += read;
        if buf[..n].windows(4).any(|w| w == b"\r\n\r\n") || n == buf.len() {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf[..n]);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    counter.fetch_add(1, Ordering::SeqCst);
    seen.lock().unwrap().push(path.clone());

    let route = routes.get(&path).cloned().unwrap_or(Route {
        status: 404,
        body: b"not found".to_vec(),
        content_length: None,
    });
    let reason = if route.status == 200 { "OK" } else { "Not Found" };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason,
        route.content_length.unwrap_or(route.body.len())
    );
    sock.write_all(header.as_bytes()).await?;
    sock.write_all(&route.body).await?;
    sock.shutdown().await
}

/// Writes `contents` to `dir/name`, creating `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), contents).unwrap();
}
