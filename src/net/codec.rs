//! Text codecs for the wire.
//!
//! Inbound bytes are decoded incrementally in the configured source encoding:
//! a read may end in the middle of a multibyte sequence, so the decoder
//! carries the partial sequence into the next read instead of flagging it.
//! Malformed input becomes U+FFFD. Replies (acks) are encoded back in the
//! same source encoding; event bodies are always UTF-8.

use std::str::FromStr;

/// Character encoding of the byte stream a client sends.
///
/// Bare `utf-16`/`utf-32` mean the big-endian variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    Utf16Be,
    Utf16Le,
    Utf32Be,
    Utf32Le,
}

impl SourceEncoding {
    /// Fewest bytes a single character can occupy in this encoding. Used to
    /// size socket reads so one read cannot decode more characters than the
    /// line buffer has room for.
    pub fn min_bytes_per_char(self) -> usize {
        match self {
            SourceEncoding::Utf8 => 1,
            SourceEncoding::Utf16Be | SourceEncoding::Utf16Le => 2,
            SourceEncoding::Utf32Be | SourceEncoding::Utf32Le => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Utf16Be => "utf-16be",
            SourceEncoding::Utf16Le => "utf-16le",
            SourceEncoding::Utf32Be => "utf-32be",
            SourceEncoding::Utf32Le => "utf-32le",
        }
    }

    /// Encode reply text in this encoding; acks go back the way data came in.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            SourceEncoding::Utf8 => text.as_bytes().to_vec(),
            SourceEncoding::Utf16Be => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
                out
            }
            SourceEncoding::Utf16Le => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                out
            }
            SourceEncoding::Utf32Be => {
                let mut out = Vec::with_capacity(text.len() * 4);
                for c in text.chars() {
                    out.extend_from_slice(&(c as u32).to_be_bytes());
                }
                out
            }
            SourceEncoding::Utf32Le => {
                let mut out = Vec::with_capacity(text.len() * 4);
                for c in text.chars() {
                    out.extend_from_slice(&(c as u32).to_le_bytes());
                }
                out
            }
        }
    }
}

impl FromStr for SourceEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "utf8" => Ok(SourceEncoding::Utf8),
            "utf16" | "utf16be" => Ok(SourceEncoding::Utf16Be),
            "utf16le" => Ok(SourceEncoding::Utf16Le),
            "utf32" | "utf32be" => Ok(SourceEncoding::Utf32Be),
            "utf32le" => Ok(SourceEncoding::Utf32Le),
            _ => Err(format!("unsupported encoding {}", s)),
        }
    }
}

/// Incremental decoder from the source encoding to characters.
///
/// A partial multibyte sequence at the end of one `decode` call is held back
/// and prepended to the next call's input. The carry never exceeds three
/// bytes: the longest incomplete tail is a 3-byte UTF-8 prefix, a UTF-16
/// high surrogate plus one odd byte, or three bytes of a UTF-32 unit.
pub struct TextDecoder {
    encoding: SourceEncoding,
    carry: [u8; 4],
    carry_len: usize,
}

impl TextDecoder {
    pub fn new(encoding: SourceEncoding) -> Self {
        Self {
            encoding,
            carry: [0; 4],
            carry_len: 0,
        }
    }

    /// Decode `input`, appending complete characters to `out`.
    pub fn decode(&mut self, input: &[u8], out: &mut Vec<char>) {
        match self.encoding {
            SourceEncoding::Utf8 => self.decode_utf8(input, out),
            SourceEncoding::Utf16Be | SourceEncoding::Utf16Le => self.decode_utf16(input, out),
            SourceEncoding::Utf32Be | SourceEncoding::Utf32Le => self.decode_utf32(input, out),
        }
    }

    /// Flush at end of stream; a dangling partial sequence becomes U+FFFD.
    pub fn finish(&mut self, out: &mut Vec<char>) {
        if self.carry_len > 0 {
            out.push(char::REPLACEMENT_CHARACTER);
            self.carry_len = 0;
        }
    }

    fn take_carried<'a>(&mut self, input: &'a [u8], joined: &'a mut Vec<u8>) -> &'a [u8] {
        if self.carry_len == 0 {
            input
        } else {
            joined.reserve(self.carry_len + input.len());
            joined.extend_from_slice(&self.carry[..self.carry_len]);
            joined.extend_from_slice(input);
            self.carry_len = 0;
            joined.as_slice()
        }
    }

    fn set_carry(&mut self, tail: &[u8]) {
        self.carry[..tail.len()].copy_from_slice(tail);
        self.carry_len = tail.len();
    }

    fn decode_utf8(&mut self, input: &[u8], out: &mut Vec<char>) {
        let mut joined = Vec::new();
        let mut bytes = self.take_carried(input, &mut joined);

        loop {
            match std::str::from_utf8(bytes) {
                Ok(s) => {
                    out.extend(s.chars());
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.extend(std::str::from_utf8(&bytes[..valid]).unwrap_or("").chars());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            bytes = &bytes[valid + bad..];
                        }
                        None => {
                            // incomplete trailing sequence; carry to the next read
                            self.set_carry(&bytes[valid..]);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn decode_utf16(&mut self, input: &[u8], out: &mut Vec<char>) {
        let little = self.encoding == SourceEncoding::Utf16Le;
        let mut joined = Vec::new();
        let bytes = self.take_carried(input, &mut joined);

        let full = bytes.len() / 2 * 2;
        let mut units = Vec::with_capacity(full / 2);
        for pair in bytes[..full].chunks_exact(2) {
            let unit = if little {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            };
            units.push(unit);
        }

        let mut i = 0;
        while i < units.len() {
            let u = units[i];
            if (0xD800..=0xDBFF).contains(&u) {
                if i + 1 >= units.len() {
                    // stream pauses on a high surrogate; wait for the low half
                    break;
                }
                let v = units[i + 1];
                if (0xDC00..=0xDFFF).contains(&v) {
                    let scalar = 0x10000 + ((u as u32 - 0xD800) << 10) + (v as u32 - 0xDC00);
                    out.push(char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER));
                    i += 2;
                } else {
                    out.push(char::REPLACEMENT_CHARACTER);
                    i += 1;
                }
            } else if (0xDC00..=0xDFFF).contains(&u) {
                // low surrogate with no preceding high one
                out.push(char::REPLACEMENT_CHARACTER);
                i += 1;
            } else {
                out.push(char::from_u32(u as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
                i += 1;
            }
        }

        // carry an unconsumed trailing unit and/or a dangling odd byte
        let mut tail = Vec::with_capacity(3);
        for &u in &units[i..] {
            let b = if little { u.to_le_bytes() } else { u.to_be_bytes() };
            tail.extend_from_slice(&b);
        }
        tail.extend_from_slice(&bytes[full..]);
        self.set_carry(&tail);
    }

    fn decode_utf32(&mut self, input: &[u8], out: &mut Vec<char>) {
        let little = self.encoding == SourceEncoding::Utf32Le;
        let mut joined = Vec::new();
        let bytes = self.take_carried(input, &mut joined);

        let full = bytes.len() / 4 * 4;
        for quad in bytes[..full].chunks_exact(4) {
            let raw = [quad[0], quad[1], quad[2], quad[3]];
            let scalar = if little {
                u32::from_le_bytes(raw)
            } else {
                u32::from_be_bytes(raw)
            };
            out.push(char::from_u32(scalar).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        self.set_carry(&bytes[full..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(encoding: SourceEncoding, chunks: &[&[u8]]) -> String {
        let mut decoder = TextDecoder::new(encoding);
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.decode(chunk, &mut out);
        }
        decoder.finish(&mut out);
        out.into_iter().collect()
    }

    #[test]
    fn test_utf8_plain() {
        assert_eq!(decode_all(SourceEncoding::Utf8, &[b"hello\n"]), "hello\n");
    }

    #[test]
    fn test_utf8_multibyte_split_across_reads() {
        // "é" = 0xC3 0xA9, split between reads
        assert_eq!(
            decode_all(SourceEncoding::Utf8, &[b"caf\xC3", b"\xA9\n"]),
            "café\n"
        );
        // 4-byte emoji split 1+3
        let emoji = "a😀b".as_bytes();
        assert_eq!(
            decode_all(SourceEncoding::Utf8, &[&emoji[..2], &emoji[2..]]),
            "a😀b"
        );
    }

    #[test]
    fn test_utf8_malformed_replaced() {
        assert_eq!(
            decode_all(SourceEncoding::Utf8, &[b"a\xFFb"]),
            "a\u{FFFD}b"
        );
        // overlong encoding of NUL is rejected byte by byte
        assert_eq!(
            decode_all(SourceEncoding::Utf8, &[b"\xC0\x80"]),
            "\u{FFFD}\u{FFFD}"
        );
    }

    #[test]
    fn test_utf8_dangling_tail_replaced_at_eof() {
        assert_eq!(decode_all(SourceEncoding::Utf8, &[b"ok\xE2\x82"]), "ok\u{FFFD}");
    }

    #[test]
    fn test_utf16be_basic_and_surrogates() {
        // "OK\n" in UTF-16BE
        assert_eq!(
            decode_all(SourceEncoding::Utf16Be, &[&[0x00, 0x4F, 0x00, 0x4B, 0x00, 0x0A]]),
            "OK\n"
        );
        // U+1D11E (musical G clef) = D834 DD1E, split mid-pair
        assert_eq!(
            decode_all(SourceEncoding::Utf16Be, &[&[0xD8, 0x34, 0xDD], &[0x1E]]),
            "\u{1D11E}"
        );
    }

    #[test]
    fn test_utf16_unpaired_surrogates_replaced() {
        // lone low surrogate
        assert_eq!(
            decode_all(SourceEncoding::Utf16Be, &[&[0xDC, 0x00, 0x00, 0x41]]),
            "\u{FFFD}A"
        );
        // high surrogate followed by a BMP character
        assert_eq!(
            decode_all(SourceEncoding::Utf16Be, &[&[0xD8, 0x00, 0x00, 0x41]]),
            "\u{FFFD}A"
        );
        // high surrogate at end of stream
        assert_eq!(decode_all(SourceEncoding::Utf16Be, &[&[0xD8, 0x00]]), "\u{FFFD}");
    }

    #[test]
    fn test_utf16le_odd_byte_carry() {
        // "ab" little-endian, delivered one byte at a time
        assert_eq!(
            decode_all(
                SourceEncoding::Utf16Le,
                &[&[0x61], &[0x00], &[0x62], &[0x00]]
            ),
            "ab"
        );
    }

    #[test]
    fn test_utf32_basic_and_invalid_scalar() {
        assert_eq!(
            decode_all(SourceEncoding::Utf32Le, &[&[0x41, 0, 0, 0, 0x0A, 0, 0, 0]]),
            "A\n"
        );
        // out-of-range scalar value
        assert_eq!(
            decode_all(SourceEncoding::Utf32Be, &[&[0x00, 0x11, 0x00, 0x00]]),
            "\u{FFFD}"
        );
        // unit split across reads
        assert_eq!(
            decode_all(SourceEncoding::Utf32Be, &[&[0x00, 0x00], &[0x00, 0x41]]),
            "A"
        );
    }

    #[test]
    fn test_encode_replies() {
        assert_eq!(SourceEncoding::Utf8.encode("OK\n"), b"OK\n".to_vec());
        assert_eq!(
            SourceEncoding::Utf16Be.encode("OK\n"),
            vec![0x00, 0x4F, 0x00, 0x4B, 0x00, 0x0A]
        );
        assert_eq!(
            SourceEncoding::Utf16Le.encode("O"),
            vec![0x4F, 0x00]
        );
        assert_eq!(
            SourceEncoding::Utf32Le.encode("A"),
            vec![0x41, 0x00, 0x00, 0x00]
        );
        // supplementary plane char becomes a surrogate pair in UTF-16
        assert_eq!(
            SourceEncoding::Utf16Be.encode("\u{1D11E}"),
            vec![0xD8, 0x34, 0xDD, 0x1E]
        );
    }

    #[test]
    fn test_encoding_names_parse() {
        assert_eq!("utf-8".parse::<SourceEncoding>(), Ok(SourceEncoding::Utf8));
        assert_eq!("UTF8".parse::<SourceEncoding>(), Ok(SourceEncoding::Utf8));
        assert_eq!(
            "utf-16".parse::<SourceEncoding>(),
            Ok(SourceEncoding::Utf16Be)
        );
        assert_eq!(
            "UTF_16LE".parse::<SourceEncoding>(),
            Ok(SourceEncoding::Utf16Le)
        );
        assert_eq!(
            "utf-32".parse::<SourceEncoding>(),
            Ok(SourceEncoding::Utf32Be)
        );
        assert!("latin-1".parse::<SourceEncoding>().is_err());

        // canonical names are themselves accepted config values
        for enc in [
            SourceEncoding::Utf8,
            SourceEncoding::Utf16Be,
            SourceEncoding::Utf16Le,
            SourceEncoding::Utf32Be,
            SourceEncoding::Utf32Le,
        ] {
            assert_eq!(enc.name().parse::<SourceEncoding>(), Ok(enc));
        }
    }

    #[test]
    fn test_min_bytes_per_char() {
        assert_eq!(SourceEncoding::Utf8.min_bytes_per_char(), 1);
        assert_eq!(SourceEncoding::Utf16Le.min_bytes_per_char(), 2);
        assert_eq!(SourceEncoding::Utf32Be.min_bytes_per_char(), 4);
    }
}
