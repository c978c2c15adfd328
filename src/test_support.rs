// =============================================================================
// test_support.rs — SHARED TEST SCAFFOLDING
// =============================================================================
//
// Compiled only under #[cfg(test)]. Two things live here:
//
// - `test_config` / `test_client`: a Config pointing at throwaway paths with
//   a zero-delay politeness gate and millisecond timeouts, so unit tests run
//   at full speed, plus the matching reqwest client.
//
// - `TestServer`: a minimal canned-response HTTP server on a random loopback
//   port. We answer each connection by hand over a raw TcpListener instead of
//   pulling in a mock-server crate: the responses we need (fixed bodies,
//   fixed statuses, fail-N-then-succeed, hang) fit in a page of code, and the
//   per-path hit counters double as assertions about how many requests a
//   component actually made — which is half of what the fetcher tests are
//   about.
// =============================================================================

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::config::{Config, PatternSet};

/// A config pointing at throwaway paths, for unit tests across modules.
pub fn test_config() -> Config {
    Config {
        input_list: "test_input.csv".into(),
        docs_dir: "test_docs".into(),
        outcomes_path: "test_outcomes.csv".into(),
        base_url: "http://127.0.0.1:0".to_string(),
        detail_page_template: "http://127.0.0.1:0/cpopg/search.do?n={numero}".to_string(),
        user_agent: "SentencaEngine/test".to_string(),
        request_timeout: Duration::from_millis(500),
        politeness_delay: Duration::ZERO,
        fetch_retry_budget: 3,
        retry_backoff: Duration::from_millis(10),
        tail_fraction: 0.2,
        min_decisory_chars: 50,
        patterns: PatternSet::default(),
    }
}

/// The reqwest client matching `test_config` (timeout and user agent).
pub fn test_client(config: &Config) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .expect("building test http client")
}

/// What the test server answers for a given path.
pub enum CannedResponse {
    Ok {
        content_type: &'static str,
        body: Vec<u8>,
    },
    Status(u16),
    /// Answer 503 for the first `failures` requests, then succeed.
    FlakyThenOk {
        failures: u32,
        content_type: &'static str,
        body: Vec<u8>,
    },
    /// Accept the connection, read the request, never answer.
    Hang,
}

/// Canned-response HTTP server bound to a random loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, u32>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(String, CannedResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("binding test server");
        let addr = listener.local_addr().expect("test server local addr");

        let hits: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));
        let remaining_failures: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(
            routes
                .iter()
                .filter_map(|(path, resp)| match resp {
                    CannedResponse::FlakyThenOk { failures, .. } => {
                        Some((path.clone(), *failures))
                    }
                    _ => None,
                })
                .collect(),
        ));
        let routes = Arc::new(routes);

        {
            let hits = Arc::clone(&hits);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let routes = Arc::clone(&routes);
                    let hits = Arc::clone(&hits);
                    let remaining = Arc::clone(&remaining_failures);
                    tokio::spawn(async move {
                        handle_connection(stream, routes, hits, remaining).await;
                    });
                }
            });
        }

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// How many requests this path has received so far.
    pub fn hits_for(&self, path: &str) -> u32 {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    routes: Arc<Vec<(String, CannedResponse)>>,
    hits: Arc<Mutex<HashMap<String, u32>>>,
    remaining_failures: Arc<Mutex<HashMap<String, u32>>>,
) {
    // Read until the end of the request headers (or EOF).
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            Err(_) => return,
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let Some(target) = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|t| t.to_string())
    else {
        return;
    };

    *hits.lock().unwrap().entry(target.clone()).or_insert(0) += 1;

    let Some((_, response)) = routes.iter().find(|(path, _)| *path == target) else {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
        return;
    };

    match response {
        CannedResponse::Ok { content_type, body } => {
            write_response(&mut stream, 200, content_type, body).await;
        }
        CannedResponse::Status(code) => {
            write_response(&mut stream, *code, "text/plain", b"").await;
        }
        CannedResponse::FlakyThenOk {
            content_type, body, ..
        } => {
            let fail = {
                let mut map = remaining_failures.lock().unwrap();
                match map.get_mut(&target) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if fail {
                write_response(&mut stream, 503, "text/plain", b"").await;
            } else {
                write_response(&mut stream, 200, content_type, body).await;
            }
        }
        CannedResponse::Hang => {
            // Outlive any sane client timeout, then let the drop close it.
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

async fn write_response(
    stream: &mut tokio::net::TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) {
    let head = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(body).await;
    let _ = stream.flush().await;
}

/// Build a one-page PDF with a real text layer, offsets computed from the
/// assembled bytes so the xref table is correct by construction. Enough of
/// a document for the extraction path to produce `text` back out.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let escaped: String = text
        .chars()
        .map(|c| match c {
            '(' | ')' | '\\' => format!("\\{c}"),
            '\n' => " ".to_string(),
            c => c.to_string(),
        })
        .collect();
    let content = format!("BT /F1 11 Tf 50 760 Td ({escaped}) Tj ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{content}\nendstream",
            content.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{obj}\nendobj\n", i + 1).as_bytes());
    }
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_answers_and_counts_hits() {
        let server = TestServer::start(vec![(
            "/ping".to_string(),
            CannedResponse::Ok {
                content_type: "text/plain",
                body: b"pong".to_vec(),
            },
        )])
        .await;
        let client = test_client(&test_config());

        let resp = client.get(server.url("/ping")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.text().await.unwrap(), "pong");
        assert_eq!(server.hits_for("/ping"), 1);

        let resp = client.get(server.url("/missing")).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
        assert_eq!(server.hits_for("/missing"), 1);
    }

    #[test]
    fn test_minimal_pdf_has_a_readable_text_layer() {
        let bytes = minimal_pdf("julgo procedente o pedido");
        assert!(bytes.starts_with(b"%PDF"));
        let text = pdf_extract::extract_text_from_mem(&bytes).unwrap();
        assert!(text.contains("julgo procedente o pedido"));
    }
}
