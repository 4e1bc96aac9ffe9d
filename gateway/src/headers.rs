// Header rewriting applied by the gateway in both directions. Requests lose the
// headers that describe the client's connection to us, responses lose the
// framing headers that no longer describe the fully decoded body we relay.

use http::Version;
use http::header::{
    ACCEPT_ENCODING, ACCESS_CONTROL_ALLOW_ORIGIN, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH,
    HOST, HeaderMap, HeaderName, HeaderValue, TRANSFER_ENCODING,
};
use shared::http::{PROXY_ERROR_HEADER, add_via_header, filter_hop_by_hop};

pub const PROXY_CACHE: HeaderName = HeaderName::from_static("x-proxy-cache");
pub const PROXY_ERROR: HeaderName = HeaderName::from_static(PROXY_ERROR_HEADER);

// accept-encoding is dropped so the upstream client negotiates (and decodes)
// compression itself.
static REQUEST_STRIPPED: &[HeaderName] = &[HOST, CONTENT_LENGTH, CONNECTION, ACCEPT_ENCODING];

// An upstream cannot pose as the gateway by sending its error marker
static RESPONSE_STRIPPED: [HeaderName; 5] = [
    CONTENT_ENCODING,
    CONTENT_LENGTH,
    TRANSFER_ENCODING,
    CONNECTION,
    PROXY_ERROR,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

pub fn prepare_request_headers(headers: &mut HeaderMap, version: Version) {
    filter_hop_by_hop(headers, version);
    for name in REQUEST_STRIPPED {
        headers.remove(name);
    }
    add_via_header(headers, version);
}

pub fn prepare_response_headers(headers: &mut HeaderMap, version: Version) {
    filter_hop_by_hop(headers, version);
    for name in &RESPONSE_STRIPPED {
        headers.remove(name);
    }
    add_via_header(headers, version);
}

/// Headers every gateway response carries, relayed or generated locally.
pub fn add_gateway_headers(headers: &mut HeaderMap, cache_status: CacheStatus) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(PROXY_CACHE, HeaderValue::from_static(cache_status.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, USER_AGENT, VIA};

    #[test]
    fn test_request_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("localhost:3000"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("2"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("unitime-test"));

        prepare_request_headers(&mut headers, Version::HTTP_11);

        assert!(headers.get(HOST).is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get(ACCEPT_ENCODING).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "unitime-test");
        assert_eq!(headers.get(VIA).unwrap(), "1.1 unitime");
    }

    #[test]
    fn test_response_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("120"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        headers.insert(PROXY_ERROR, HeaderValue::from_static("unknown-tenant"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://www.zp.edu.ua"),
        );

        // HTTP/2 responses skip hop-by-hop filtering but still lose framing headers
        prepare_response_headers(&mut headers, Version::HTTP_2);
        add_gateway_headers(&mut headers, CacheStatus::Miss);

        assert!(headers.get(CONTENT_ENCODING).is_none());
        assert!(headers.get(CONTENT_LENGTH).is_none());
        assert!(headers.get(TRANSFER_ENCODING).is_none());
        assert!(headers.get(CONNECTION).is_none());
        assert!(headers.get(PROXY_ERROR).is_none());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(headers.get(PROXY_CACHE).unwrap(), "MISS");
    }
}
