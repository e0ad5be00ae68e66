// Portal charset conversion
//
// The portal serves every page in GB2312. GBK is a strict superset, so
// decoding as GBK is lossless for anything the portal can emit.

use std::borrow::Cow;

use encoding_rs::GBK;

use crate::error::Error;

/// Decode a portal response body into a `String`.
///
/// Malformed input (e.g. a lead byte with no trail byte at the end of
/// the stream) is an error, never silently replaced.
pub fn decode(bytes: &[u8]) -> Result<String, Error> {
    GBK.decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or(Error::Decode {
            encoding: GBK.name(),
        })
}

/// Encode text into the portal charset.
///
/// Fails if `text` contains a character with no GBK representation.
pub fn encode(text: &str) -> Result<Vec<u8>, Error> {
    let (bytes, _, had_unmappable) = GBK.encode(text);
    if had_unmappable {
        return Err(Error::Decode {
            encoding: GBK.name(),
        });
    }
    Ok(bytes.into_owned())
}
