use core::fmt::Debug;

use embedded_io_async::Read;

use crate::session::state::Mode;

/// One upload to the analysis service.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeRequest<'a> {
    pub session_id: &'a str,
    pub mode: Mode,
    /// JPEG bytes, sent as `image.jpg`.
    pub image: &'a [u8],
    /// Complete WAV file, sent as `audio.wav`. Only present in conversation mode.
    pub audio: Option<&'a [u8]>,
}

/// The analysis service behind the network connection.
///
/// `analyze` posts the request as multipart form data and resolves once the
/// service has answered 200; any other outcome is an error. The response
/// body is a WAV file, header included.
pub trait Backend {
    type Error: Debug;
    type Response<'a>: Read
    where
        Self: 'a;

    async fn analyze(&mut self, request: AnalyzeRequest<'_>) -> Result<Self::Response<'_>, Self::Error>;
}
