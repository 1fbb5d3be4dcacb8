//! Service descriptors.
//!
//! A rule's `service` string is parsed once, at validation time, into a
//! closed set of variants. The request path never re-interprets it.

use std::fmt;
use std::str::FromStr;

use axum::http::StatusCode;
use url::Url;

/// Canonical token for the embedded responder.
pub const HELLO_WORLD_SERVICE: &str = "hello_world";

/// Accepted alias for [`HELLO_WORLD_SERVICE`].
const HELLO_WORLD_ALIAS: &str = "hello-world";

const HTTP_STATUS_PREFIX: &str = "http_status:";

/// Where a matched request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Service {
    /// Forward to an HTTP or WebSocket origin.
    Origin(Url),
    /// Answer directly with a fixed status and empty body.
    HttpStatus(StatusCode),
    /// Answer from a responder embedded in the routing engine.
    HelloWorld,
}

impl Service {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Service::Origin(_) => "origin",
            Service::HttpStatus(_) => "http_status",
            Service::HelloWorld => "hello_world",
        }
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();

        if raw == HELLO_WORLD_SERVICE || raw == HELLO_WORLD_ALIAS {
            return Ok(Service::HelloWorld);
        }

        if let Some(code) = raw.strip_prefix(HTTP_STATUS_PREFIX) {
            let code: u16 = code
                .parse()
                .map_err(|_| format!("invalid status code in {raw:?}"))?;
            if !(100..=599).contains(&code) {
                return Err(format!("status code {code} is out of range"));
            }
            return StatusCode::from_u16(code)
                .map(Service::HttpStatus)
                .map_err(|e| e.to_string());
        }

        let url = Url::parse(raw).map_err(|e| format!("invalid service {raw:?}: {e}"))?;
        match url.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => return Err(format!("unsupported service scheme {other:?}")),
        }
        if url.host_str().is_none() {
            return Err(format!("service {raw:?} has no host"));
        }
        Ok(Service::Origin(url))
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Origin(url) => {
                // Url always renders a trailing slash for an empty path.
                let s = url.as_str();
                if url.path() == "/" && url.query().is_none() {
                    f.write_str(s.trim_end_matches('/'))
                } else {
                    f.write_str(s)
                }
            }
            Service::HttpStatus(code) => write!(f, "{HTTP_STATUS_PREFIX}{}", code.as_u16()),
            Service::HelloWorld => f.write_str(HELLO_WORLD_SERVICE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_variant() {
        assert_eq!(
            "http_status:404".parse::<Service>().unwrap(),
            Service::HttpStatus(StatusCode::NOT_FOUND)
        );
        assert_eq!("hello_world".parse::<Service>().unwrap(), Service::HelloWorld);
        assert_eq!("hello-world".parse::<Service>().unwrap(), Service::HelloWorld);

        match "http://192.16.19.1:443".parse::<Service>().unwrap() {
            Service::Origin(url) => {
                assert_eq!(url.host_str(), Some("192.16.19.1"));
                assert_eq!(url.port(), Some(443));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn displays_canonical_tokens() {
        for raw in ["http://192.16.19.1:443", "http_status:418", "hello_world", "ws://a.b/chat"] {
            assert_eq!(raw.parse::<Service>().unwrap().to_string(), raw);
        }
        assert_eq!("hello-world".parse::<Service>().unwrap().to_string(), "hello_world");
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!("http_status:99".parse::<Service>().is_err());
        assert!("http_status:abc".parse::<Service>().is_err());
        assert!("ftp://files.local".parse::<Service>().is_err());
        assert!("not a url".parse::<Service>().is_err());
    }
}
