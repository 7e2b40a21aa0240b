use crate::protocol::error::MarshalError;

/// Text codec between host strings and remote text.
///
/// The remote side stores text as UTF-16 code units. Lengths declared by the
/// remote schema count those units, not host characters: a single character
/// outside the BMP takes two units, and a field declared with length 10 may
/// hold fewer than 10 host characters.
///
/// # Example
///
/// ```
/// use rfcbridge_common::transport::TextCodec;
///
/// let units = TextCodec::encode("HELLO");
/// let mut padded = units.clone();
/// padded.resize(10, ' ' as u16);
///
/// assert_eq!(TextCodec::decode(&padded, 10, true).unwrap(), "HELLO");
/// assert_eq!(TextCodec::decode(&padded, 10, false).unwrap().len(), 10);
/// ```
pub struct TextCodec;

impl TextCodec {
    /// Encodes host text into remote code units.
    pub fn encode(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    /// Decodes at most `declared_len` remote code units.
    ///
    /// `units` is what the remote side actually returned; when it is shorter
    /// than the declared length only the returned units are decoded. With
    /// `strip` set, trailing spaces and NULs are removed; otherwise the padding
    /// is kept exactly as supplied.
    ///
    /// # Errors
    ///
    /// Returns `MarshalError::Codec` if the units are not valid UTF-16.
    pub fn decode(units: &[u16], declared_len: usize, strip: bool) -> Result<String, MarshalError> {
        let len = declared_len.min(units.len());
        let mut text = String::from_utf16(&units[..len]).map_err(|e| {
            MarshalError::Codec(format!("{} code units could not be decoded: {}", len, e))
        })?;

        if strip {
            let trimmed = text.trim_end_matches(|c| c == ' ' || c == '\0').len();
            text.truncate(trimmed);
        }

        Ok(text)
    }

    /// Decodes all units; shorthand for names and other exact-length text.
    pub fn decode_all(units: &[u16], strip: bool) -> Result<String, MarshalError> {
        Self::decode(units, units.len(), strip)
    }
}
