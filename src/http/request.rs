use std::borrow::Cow;

use crate::http::tokens::has_token_ignore_case;

/// HTTP request methods.
///
/// Anything outside this set is rejected by the parser, which includes the
/// HTTP/2 connection preface (`PRI * HTTP/2.0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Loop-back test
    TRACE,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Method names are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchyard::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "CONNECT" => Some(Method::CONNECT),
            "TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }
}

/// How the request body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(usize),
    Chunked,
}

/// The request line and header section of one HTTP/1.x request.
///
/// Headers keep their wire order; lookups are case-insensitive.
/// [`header`](Self::header) returns the first match, while list-valued
/// fields such as `Connection` go through
/// [`combined_header`](Self::combined_header).
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// The request target (e.g., "/index.html")
    pub path: String,
    /// HTTP version (e.g. "HTTP/1.1")
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a list-valued field joined with `", "`, in wire order.
    ///
    /// ```
    /// # use switchyard::http::parser::parse_request_head;
    /// let head = parse_request_head(b"GET / HTTP/1.1\r\nConnection: keep-alive\r\nConnection: Upgrade").unwrap();
    /// assert_eq!(head.combined_header("connection").as_deref(), Some("keep-alive, Upgrade"));
    /// ```
    pub fn combined_header(&self, name: &str) -> Option<Cow<'_, str>> {
        let mut values = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str());

        let first = values.next()?;
        let Some(second) = values.next() else {
            return Some(Cow::Borrowed(first));
        };

        let mut joined = format!("{first}, {second}");
        for value in values {
            joined.push_str(", ");
            joined.push_str(value);
        }
        Some(Cow::Owned(joined))
    }

    pub fn is_http10(&self) -> bool {
        self.version == "HTTP/1.0"
    }

    /// Whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 keeps the connection unless `Connection: close` is present.
    /// HTTP/1.0 closes it unless `Connection: keep-alive` is present.
    pub fn keep_alive(&self) -> bool {
        let connection = self.combined_header("Connection").unwrap_or_default();
        if self.is_http10() {
            has_token_ignore_case(&connection, "keep-alive")
        } else {
            !has_token_ignore_case(&connection, "close")
        }
    }

    pub fn body_framing(&self) -> Result<BodyFraming, std::num::ParseIntError> {
        if let Some(te) = self.header("Transfer-Encoding") {
            if has_token_ignore_case(te, "chunked") {
                return Ok(BodyFraming::Chunked);
            }
        }

        match self.header("Content-Length") {
            Some(v) => match v.parse::<usize>()? {
                0 => Ok(BodyFraming::Empty),
                n => Ok(BodyFraming::Length(n)),
            },
            None => Ok(BodyFraming::Empty),
        }
    }
}
