//! Target encoding
//! The relay addresses upstream URLs as standard base64 of their UTF-8 bytes

use crate::error::RelayError;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use url::Url;

/// Standard alphabet that accepts tokens with or without padding
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode an absolute URL into a relay target token
pub fn encode_target(url: &str) -> String {
    STANDARD.encode(url.as_bytes())
}

/// Decode and validate a relay target token
pub fn decode_target(token: &str) -> Result<Url, RelayError> {
    // Form decoding turns '+' into ' '; base64 never contains spaces
    let token = token.trim().replace(' ', "+");

    let bytes = LENIENT
        .decode(token.as_bytes())
        .map_err(|_| RelayError::InvalidEncoding)?;
    let target = String::from_utf8(bytes).map_err(|_| RelayError::InvalidEncoding)?;

    if !has_http_scheme(&target) {
        return Err(RelayError::InvalidTarget);
    }

    Url::parse(&target).map_err(|_| RelayError::InvalidTarget)
}

/// Case-insensitive `^https?://`
fn has_http_scheme(target: &str) -> bool {
    target
        .get(..7)
        .is_some_and(|head| head.eq_ignore_ascii_case("http://"))
        || target
            .get(..8)
            .is_some_and(|head| head.eq_ignore_ascii_case("https://"))
}

/// Look up a query parameter; an empty value counts as absent
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
