//! URIs a mobile wallet can open, either by scanning or from a push notification

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// URI scheme registered by the wallet app
pub const DEFAULT_WALLET_SCHEME: &str = "me.uport";

// Signed tokens are base64url segments separated by dots, which all pass unescaped.
const TOKEN_QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'~');

/// URI asking the wallet to answer a disclosure request:
/// `<scheme>:me?requestToken=<token>`
pub fn disclosure_request(scheme: &str, request_token: &str) -> String {
    format!(
        "{scheme}:me?requestToken={}",
        utf8_percent_encode(request_token, TOKEN_QUERY_VALUE)
    )
}

/// URI asking the wallet to store an attestation:
/// `<scheme>:add?attestations=<token>`
pub fn add_attestation(scheme: &str, attestation: &str) -> String {
    format!(
        "{scheme}:add?attestations={}",
        utf8_percent_encode(attestation, TOKEN_QUERY_VALUE)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disclosure_request_uri() {
        assert_eq!(
            disclosure_request(DEFAULT_WALLET_SCHEME, "eyJ0.eyJ1.c2ln"),
            "me.uport:me?requestToken=eyJ0.eyJ1.c2ln"
        );
    }

    #[test]
    fn test_add_attestation_uri() {
        assert_eq!(
            add_attestation("wallet", "ATT1"),
            "wallet:add?attestations=ATT1"
        );
    }

    #[test]
    fn test_tokens_cannot_break_out_of_query() {
        assert_eq!(
            add_attestation("wallet", "a&b=c"),
            "wallet:add?attestations=a%26b%3Dc"
        );
    }
}
