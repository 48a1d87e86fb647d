use std::path::PathBuf;

use wiremock::matchers::{self, method};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub struct TempDir(pub PathBuf);

impl TempDir {
    pub fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("camlink-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// One field of a `multipart/form-data` body.
#[derive(Debug)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Splits a received multipart request into its fields, in order.
pub fn form_parts(request: &Request) -> Vec<FormPart> {
    let content_type = request
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    let (_, boundary) = content_type.split_once("boundary=").unwrap();
    let delimiter = format!("--{}", boundary).into_bytes();

    split(&request.body, &delimiter)
        .into_iter()
        .skip(1)
        .filter(|part| !part.starts_with(b"--"))
        .map(|part| {
            let part = part.strip_prefix(b"\r\n").unwrap();
            let part = part.strip_suffix(b"\r\n").unwrap();
            let head_len = find(part, b"\r\n\r\n").unwrap();
            let head = std::str::from_utf8(&part[..head_len]).unwrap();

            let mut field = FormPart {
                name: String::new(),
                filename: None,
                content_type: None,
                data: part[head_len + 4..].to_vec(),
            };
            for line in head.split("\r\n") {
                let (key, value) = line.split_once(':').unwrap();
                match key.trim().to_ascii_lowercase().as_str() {
                    "content-disposition" => {
                        for param in value.split(';').map(str::trim) {
                            if let Some(name) = param.strip_prefix("name=") {
                                field.name = name.trim_matches('"').to_string();
                            } else if let Some(filename) = param.strip_prefix("filename=") {
                                field.filename = Some(filename.trim_matches('"').to_string());
                            }
                        }
                    }
                    "content-type" => field.content_type = Some(value.trim().to_string()),
                    _ => {}
                }
            }
            field
        })
        .collect()
}

pub fn form_field<'a>(parts: &'a [FormPart], name: &str) -> Option<&'a FormPart> {
    parts.iter().find(|part| part.name == name)
}

/// Answers every POST to `path` on a fresh mock server with `status` and `body`.
pub async fn analyze_server(path: &str, status: u16, body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(matchers::path(path))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
        .expect(1)
        .mount(&server)
        .await;
    server
}

/// The single request `server` received.
pub async fn only_request(server: &MockServer) -> Request {
    let mut requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    requests.remove(0)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split<'a>(mut haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    while let Some(at) = find(haystack, delimiter) {
        pieces.push(&haystack[..at]);
        haystack = &haystack[at + delimiter.len()..];
    }
    pieces.push(haystack);
    pieces
}
