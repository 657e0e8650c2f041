use crate::error::{CastError, ParseErrorKind};

/// RTSP methods handled by this server.
///
/// Anything else on the wire is acknowledged with a bare `200 OK`
/// (tracked as `None` on [`RtspRequest::method`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "OPTIONS" => Some(Self::Options),
            "DESCRIBE" => Some(Self::Describe),
            "SETUP" => Some(Self::Setup),
            "PLAY" => Some(Self::Play),
            "PAUSE" => Some(Self::Pause),
            "TEARDOWN" => Some(Self::Teardown),
            _ => None,
        }
    }
}

/// A parsed RTSP request.
///
/// Requests follow HTTP/1.1 syntax:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Only `CSeq` is interpreted from the headers; it is matched
/// case-insensitively per RFC 2326 §4.2 and defaults to `"1"` when absent
/// or empty, so a sloppy client still gets a well-formed response.
#[derive(Debug)]
pub struct RtspRequest {
    /// Recognized method, or `None` for extension methods.
    pub method: Option<Method>,
    /// Method token as received, for logging.
    pub method_name: String,
    /// Request-URI (e.g. `rtsp://host:8554/stream`).
    pub uri: String,
    /// CSeq header value to echo in the response.
    pub cseq: String,
}

impl RtspRequest {
    /// Parse an RTSP request from its text representation.
    ///
    /// Expects a complete request: request line, headers, and trailing
    /// blank line. Returns [`CastError::Parse`] on a malformed request
    /// line; unknown header lines are skipped rather than rejected.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or(CastError::Parse {
                kind: ParseErrorKind::EmptyRequest,
            })?;

        let mut parts = request_line.split_whitespace();
        let (method_name, uri) = match (parts.next(), parts.next()) {
            (Some(method), Some(uri)) => (method, uri),
            _ => {
                return Err(CastError::Parse {
                    kind: ParseErrorKind::InvalidRequestLine,
                });
            }
        };

        if let Some(version) = parts.next()
            && version != "RTSP/1.0"
        {
            tracing::warn!(version, "client sent non-RTSP/1.0 version");
        }

        let mut cseq = None;
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.trim().eq_ignore_ascii_case("CSeq")
            {
                let value = value.trim();
                if !value.is_empty() {
                    cseq = Some(value.to_string());
                }
            }
        }

        Ok(RtspRequest {
            method: Method::parse(method_name),
            method_name: method_name.to_string(),
            uri: uri.to_string(),
            cseq: cseq.unwrap_or_else(|| "1".to_string()),
        })
    }
}
