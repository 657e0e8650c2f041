/// An RTSP response.
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern — chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed automatically when a body is present.
///
/// Every request succeeds at the RTSP layer in this design, so the status
/// line is always `200 OK`; failures surface only as transport errors.
#[must_use]
pub struct RtspResponse {
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    /// 200 OK with the echoed CSeq as its first header.
    pub fn ok(cseq: &str) -> Self {
        RtspResponse {
            headers: vec![("CSeq".to_string(), cseq.to_string())],
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the RTSP text wire format.
    ///
    /// If a body is present, `Content-Length` is appended automatically
    /// (RFC 2326 §12.14).
    pub fn serialize(&self) -> String {
        let mut response = String::from("RTSP/1.0 200 OK\r\n");

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            response.push_str(&format!("Content-Length: {}\r\n", body.len()));
            response.push_str("\r\n");
            response.push_str(body);
        } else {
            response.push_str("\r\n");
        }
        response
    }
}
