//! Request head extraction from the first packet of a connection.
//!
//! Only the request line and the Host header are read; this is not an HTTP
//! parser. The request line is passed on exactly as sent, minus its line
//! terminator. Malformed input degrades to empty fields instead of failing.

/// Request line and host of the first packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    /// First line of the payload, without its terminator.
    pub request_line: String,
    /// Value of the Host header, or empty when absent.
    pub domain: String,
}

impl RequestHead {
    /// Extract the request line and host from raw packet bytes.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(header_block(payload));
        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line));

        let request_line = lines.next().unwrap_or_default().to_string();

        let domain = lines
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("host")
                    .then(|| value.trim().to_string())
            })
            .unwrap_or_default();

        Self {
            request_line,
            domain,
        }
    }
}

/// Bytes before the blank line ending the header block, or the whole
/// payload when the block is not complete yet.
fn header_block(payload: &[u8]) -> &[u8] {
    let mut start = 0;
    while let Some(offset) = payload[start..].iter().position(|&b| b == b'\n') {
        let line = &payload[start..start + offset];
        if line.is_empty() || line == b"\r" {
            return &payload[..start.saturating_sub(1)];
        }
        start += offset + 1;
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_with_host() {
        let head = RequestHead::parse(
            b"GET /v1/storage/files HTTP/1.1\r\nHost: api.example.com\r\nAccept: */*\r\n\r\n",
        );
        assert_eq!(head.request_line, "GET /v1/storage/files HTTP/1.1");
        assert_eq!(head.domain, "api.example.com");
    }

    #[test]
    fn test_host_not_first_header() {
        let head = RequestHead::parse(
            b"POST /upload HTTP/1.1\r\nUser-Agent: curl\r\nhost:  files.example.com:8080 \r\n\r\n",
        );
        assert_eq!(head.request_line, "POST /upload HTTP/1.1");
        assert_eq!(head.domain, "files.example.com:8080");
    }

    #[test]
    fn test_missing_host_is_empty() {
        let head = RequestHead::parse(b"GET / HTTP/1.0\r\nAccept: */*\r\n\r\n");
        assert_eq!(head.request_line, "GET / HTTP/1.0");
        assert_eq!(head.domain, "");
    }

    #[test]
    fn test_host_in_body_ignored() {
        let head = RequestHead::parse(b"POST / HTTP/1.1\r\n\r\nHost: body.example.com\r\n");
        assert_eq!(head.domain, "");
    }

    #[test]
    fn test_partial_first_packet() {
        let head = RequestHead::parse(b"GET /very/long/pa");
        assert_eq!(head.request_line, "GET /very/long/pa");
        assert_eq!(head.domain, "");
    }

    #[test]
    fn test_request_line_kept_verbatim() {
        let head = RequestHead::parse(b" GET /a  HTTP/1.1 \r\nHost: x.example.com\r\n\r\n");
        assert_eq!(head.request_line, " GET /a  HTTP/1.1 ");
        assert_eq!(head.domain, "x.example.com");
    }

    #[test]
    fn test_header_block_excludes_body() {
        assert_eq!(
            header_block(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\xff\xfebody"),
            b"GET / HTTP/1.1\r\nHost: a\r"
        );
        assert_eq!(header_block(b"GET / HTTP/1.1\n\nbody"), b"GET / HTTP/1.1");
        assert_eq!(header_block(b"\r\n\r\n"), b"");
        assert_eq!(header_block(b"GET /partial"), b"GET /partial");

        // Invalid bytes in the body never reach the lossy conversion
        let head =
            RequestHead::parse(b"POST /up HTTP/1.1\r\nHost: a.example.com\r\n\r\n\xff\xff");
        assert_eq!(head.request_line, "POST /up HTTP/1.1");
        assert_eq!(head.domain, "a.example.com");
    }

    #[test]
    fn test_bare_newlines_and_invalid_utf8() {
        let head = RequestHead::parse(b"GET /\xff HTTP/1.1\nHost: a.example.com\n\n");
        assert_eq!(head.request_line, "GET /\u{fffd} HTTP/1.1");
        assert_eq!(head.domain, "a.example.com");
    }
}
