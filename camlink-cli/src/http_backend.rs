use std::time::Duration;

use anyhow::{anyhow, Result};
use camlink_protocol::driver::backend::{AnalyzeRequest, Backend};
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use crate::file_io::IoErrorWrapper;

pub const DEFAULT_ANALYZE_PATH: &str = "/api/v1/analyze";

/// Posts captures to the analysis service over plain HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
}

impl HttpBackend {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    fn form(request: &AnalyzeRequest<'_>) -> Result<Form> {
        let image = Part::bytes(request.image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let mut form = Form::new()
            .text("session_id", request.session_id.to_string())
            .text("mode", request.mode.as_str())
            .part("image", image);
        if let Some(audio) = request.audio {
            let audio = Part::bytes(audio.to_vec())
                .file_name("audio.wav")
                .mime_str("audio/wav")?;
            form = form.part("audio", audio);
        }
        Ok(form)
    }
}

impl Backend for HttpBackend {
    type Error = anyhow::Error;
    type Response<'a> = ResponseReader;

    async fn analyze(&mut self, request: AnalyzeRequest<'_>) -> Result<ResponseReader> {
        let form = Self::form(&request)?;
        info!(
            "POST {} ({} byte image, {} byte audio)",
            self.url,
            request.image.len(),
            request.audio.map_or(0, |audio| audio.len())
        );
        let response = self.client.post(&self.url).multipart(form).send().await?;
        if response.status() != StatusCode::OK {
            return Err(anyhow!("Server responded {}", response.status()));
        }
        Ok(ResponseReader {
            response,
            pending: Vec::new(),
            offset: 0,
        })
    }
}

/// Streams the response body chunk by chunk.
pub struct ResponseReader {
    response: reqwest::Response,
    pending: Vec<u8>,
    offset: usize,
}

impl embedded_io_async::ErrorType for ResponseReader {
    type Error = IoErrorWrapper;
}

impl embedded_io_async::Read for ResponseReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        while self.offset == self.pending.len() {
            match self.response.chunk().await {
                Ok(Some(chunk)) => {
                    debug!("Received {} response bytes", chunk.len());
                    self.pending = chunk.to_vec();
                    self.offset = 0;
                }
                Ok(None) => return Ok(0),
                Err(e) => return Err(IoErrorWrapper(std::io::Error::other(e))),
            }
        }

        let len = buf.len().min(self.pending.len() - self.offset);
        buf[..len].copy_from_slice(&self.pending[self.offset..self.offset + len]);
        self.offset += len;
        Ok(len)
    }
}
