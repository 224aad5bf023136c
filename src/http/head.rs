//! HTTP/1.1 message heads.
//!
//! Only the head is parsed here; the chunked body that follows is left
//! unread in the stream for the session to consume.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Upper bound on the number of header fields accepted in a head.
const MAX_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    #[error("connection closed before a head arrived")]
    Closed,

    #[error("connection closed mid-head")]
    Incomplete,

    #[error("head exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("I/O error reading head: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, Vec<u8>)>,
}

impl RequestHead {
    /// First value of `name`, compared case-insensitively.
    pub fn header<'a>(&'a self, name: &'a str) -> Option<&'a [u8]> {
        self.header_values(name).next()
    }

    /// Every value of `name`, in the order the field lines arrived.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Whether the body uses chunked transfer coding.
    ///
    /// Repeated Transfer-Encoding lines form one list, and chunked must be
    /// its final coding. A Content-Length alongside it makes the framing
    /// ambiguous, so that is rejected too.
    pub fn is_chunked(&self) -> bool {
        if self.header("content-length").is_some() {
            return false;
        }
        self.header_values("transfer-encoding")
            .flat_map(|value| value.split(|&b| b == b','))
            .map(|coding| coding.trim_ascii())
            .filter(|coding| !coding.is_empty())
            .last()
            .is_some_and(|coding| coding.eq_ignore_ascii_case(b"chunked"))
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|value| value.trim_ascii().eq_ignore_ascii_case(b"100-continue"))
    }
}

/// Read and parse a request head of at most `max_bytes`.
pub async fn read_request_head<R>(reader: &mut R, max_bytes: usize) -> Result<RequestHead, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let raw = read_head_bytes(reader, max_bytes).await?;
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&raw)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(HeadError::Incomplete),
    }

    Ok(RequestHead {
        method: request.method.unwrap_or_default().to_string(),
        path: request.path.unwrap_or_default().to_string(),
        headers: request
            .headers
            .iter()
            .map(|h| (h.name.to_string(), h.value.to_vec()))
            .collect(),
    })
}

/// Read a response head and return its status code.
pub async fn read_response_status<R>(reader: &mut R, max_bytes: usize) -> Result<u16, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let raw = read_head_bytes(reader, max_bytes).await?;
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&raw)? {
        httparse::Status::Complete(_) => response.code.ok_or(HeadError::Incomplete),
        httparse::Status::Partial => Err(HeadError::Incomplete),
    }
}

/// Read lines up to and including the blank line that ends a head.
async fn read_head_bytes<R>(reader: &mut R, max_bytes: usize) -> Result<Vec<u8>, HeadError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    loop {
        let remaining = max_bytes.saturating_sub(raw.len());
        if remaining == 0 {
            return Err(HeadError::TooLarge { limit: max_bytes });
        }
        let start = raw.len();
        let n = (&mut *reader).take(remaining as u64).read_until(b'\n', &mut raw).await?;
        if n == 0 {
            return Err(if raw.is_empty() { HeadError::Closed } else { HeadError::Incomplete });
        }

        let line = &raw[start..];
        if !line.ends_with(b"\n") {
            // Either the limit cut the line or the stream ended inside it.
            continue;
        }
        // Skip blank lines before the start line, as RFC 9112 allows.
        if start == 0 && (line == b"\r\n" || line == b"\n") {
            raw.clear();
            continue;
        }
        if line == b"\r\n" || line == b"\n" {
            return Ok(raw);
        }
    }
}
