use http::HeaderMap;

pub const SIGNATURE_HEADER: &str = "signature";
pub const SIGNATURE_INPUT_HEADER: &str = "signature-input";

/// How the caller means a request to be treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestIntent {
    /// The request carries a message signature bound to this exact target
    pub is_signed: bool,
}

impl RequestIntent {
    pub fn unsigned() -> Self {
        Self { is_signed: false }
    }

    pub fn signed() -> Self {
        Self { is_signed: true }
    }

    /// Effective signedness: declared by the caller, or implied by
    /// `Signature` / `Signature-Input` headers on the request.
    pub fn resolve(self, headers: &HeaderMap) -> bool {
        self.is_signed || carries_signature(headers)
    }
}

pub fn carries_signature(headers: &HeaderMap) -> bool {
    headers.contains_key(SIGNATURE_HEADER) || headers.contains_key(SIGNATURE_INPUT_HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_declared_intent_wins() {
        assert!(RequestIntent::signed().resolve(&HeaderMap::new()));
        assert!(!RequestIntent::unsigned().resolve(&HeaderMap::new()));
    }

    #[test]
    fn test_signature_headers_imply_signed() {
        let mut headers = HeaderMap::new();
        headers.insert("Signature-Input", HeaderValue::from_static("sig1=(\"@method\")"));
        assert!(RequestIntent::unsigned().resolve(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("SIGNATURE", HeaderValue::from_static("sig1=:AAAA:"));
        assert!(RequestIntent::default().resolve(&headers));
    }

    #[test]
    fn test_other_headers_do_not_imply_signed() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert!(!RequestIntent::unsigned().resolve(&headers));
    }
}
