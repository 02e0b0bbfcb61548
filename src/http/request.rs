//! HTTP request method.

/// HTTP request methods.
///
/// Only GET is served; any other token on the request line is a protocol
/// error and the request is answered with 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    Get,
}

impl Method {
    /// Parses a method token, case-insensitively.
    ///
    /// # Example
    ///
    /// ```
    /// # use hearth::http::request::Method;
    /// assert_eq!(Method::from_token(b"GET"), Some(Method::Get));
    /// assert_eq!(Method::from_token(b"get"), Some(Method::Get));
    /// assert_eq!(Method::from_token(b"POST"), None);
    /// ```
    pub fn from_token(token: &[u8]) -> Option<Self> {
        if token.eq_ignore_ascii_case(b"GET") {
            Some(Method::Get)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
        }
    }
}
