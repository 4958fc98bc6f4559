//! Length-prefixed chunk codec.
//!
//! Encoding renders every chunk as `LEN.CHUNK,` (`LEN` is the ASCII decimal
//! byte length) and replaces the trailing `,` with `;`. Decoding is strict:
//! a frame must end in `;`, every length must parse and stay below
//! [`MAX_CHUNK_LEN`](crate::limits::MAX_CHUNK_LEN), every chunk must be
//! followed by `,` or the final `;`. Any deviation yields the empty sequence.

use crate::limits::MAX_CHUNK_LEN;

/// Encode chunks of raw bytes into a single frame.
///
/// An empty chunk list encodes to an empty frame.
pub fn encode_bytes<T: AsRef<[u8]>>(chunks: &[T]) -> Vec<u8> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(chunks.iter().map(|c| c.as_ref().len() + 6).sum());
    for chunk in chunks {
        let chunk = chunk.as_ref();
        out.extend_from_slice(chunk.len().to_string().as_bytes());
        out.push(b'.');
        out.extend_from_slice(chunk);
        out.push(b',');
    }
    if let Some(last) = out.last_mut() {
        *last = b';';
    }
    out
}

/// Encode string chunks into a frame, ready to send as a text payload.
pub fn encode<T: AsRef<str>>(chunks: &[T]) -> String {
    let mut out = String::new();
    if chunks.is_empty() {
        return out;
    }
    for chunk in chunks {
        let chunk = chunk.as_ref();
        out.push_str(&chunk.len().to_string());
        out.push('.');
        out.push_str(chunk);
        out.push(',');
    }
    out.pop();
    out.push(';');
    out
}

/// Decode a frame into its chunks. Returns the empty vector on any deviation.
pub fn decode_bytes(input: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();

    if input.last() != Some(&b';') {
        return Vec::new();
    }

    let mut pos = 0usize;
    loop {
        // Decimal length, at least one digit.
        let digits_start = pos;
        while pos < input.len() && input[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == digits_start || pos - digits_start > 6 {
            return Vec::new();
        }
        let len: usize = match std::str::from_utf8(&input[digits_start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
        {
            Some(len) => len,
            None => return Vec::new(),
        };
        if len >= MAX_CHUNK_LEN {
            return Vec::new();
        }

        if input.get(pos) != Some(&b'.') {
            return Vec::new();
        }
        pos += 1;

        if pos + len > input.len() {
            return Vec::new();
        }
        out.push(input[pos..pos + len].to_vec());
        pos += len;

        match input.get(pos) {
            Some(&b',') => pos += 1,
            // The terminator must be the final byte of the frame.
            Some(&b';') if pos + 1 == input.len() => return out,
            _ => return Vec::new(),
        }
    }
}

/// Decode a text frame into string chunks.
///
/// A chunk boundary that splits a UTF-8 sequence counts as a deviation.
pub fn decode(input: &str) -> Vec<String> {
    let chunks = decode_bytes(input.as_bytes());
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match String::from_utf8(chunk) {
            Ok(s) => out.push(s),
            Err(_) => return Vec::new(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_documented_example() {
        assert_eq!(encode(&["chat", "alice", "hello"]), "4.chat,5.alice,5.hello;");
    }

    #[test]
    fn encodes_a_single_chunk() {
        assert_eq!(encode(&["list"]), "4.list;");
        assert_eq!(encode(&["list", "alice", "bob"]), "4.list,5.alice,3.bob;");
    }

    #[test]
    fn encodes_empty_chunks() {
        assert_eq!(encode(&["turn", ""]), "4.turn,0.;");
        assert_eq!(decode("4.turn,0.;"), vec!["turn".to_string(), String::new()]);
    }

    #[test]
    fn round_trips() {
        let cases: &[&[&str]] = &[
            &["list"],
            &["username", "alice"],
            &["chat", "alice", "hello there"],
            &["button", "4", "1"],
            &["a", "", "b"],
            &["verb", "chunk with , and ; and 12.34 inside"],
        ];
        for chunks in cases {
            let owned: Vec<String> = chunks.iter().map(|s| s.to_string()).collect();
            assert_eq!(decode(&encode(chunks)), owned, "case {chunks:?}");
        }
    }

    #[test]
    fn round_trips_bytes() {
        let chunks: Vec<Vec<u8>> = vec![b"frame".to_vec(), vec![0, 1, 2, 255, b';', b',']];
        let frame = encode_bytes(&chunks);
        assert_eq!(decode_bytes(&frame), chunks);
    }

    #[test]
    fn rejects_missing_terminator() {
        assert!(decode("4.chat,5.alice,5.hello").is_empty());
        assert!(decode("4.chat,").is_empty());
        assert!(decode("").is_empty());
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(decode("5.chat;").is_empty());
        assert!(decode("3.chat;").is_empty());
        assert!(decode(".chat;").is_empty());
        assert!(decode("x.chat;").is_empty());
        // At or above the safety bound.
        let frame = format!("{}.{};", MAX_CHUNK_LEN, "x".repeat(MAX_CHUNK_LEN));
        assert!(decode(&frame).is_empty());
    }

    #[test]
    fn rejects_bad_separators() {
        assert!(decode("4,chat;").is_empty());
        assert!(decode("4.chat.5.alice;").is_empty());
        assert!(decode("4.chat;5.alice;").is_empty());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(decode("4.chat;x").is_empty());
    }

    #[test]
    fn accepts_chunk_just_below_the_bound() {
        let chunk = "y".repeat(MAX_CHUNK_LEN - 1);
        let decoded = decode(&encode(&[chunk.as_str()]));
        assert_eq!(decoded, vec![chunk]);
    }

    #[test]
    fn single_byte_perturbations_never_round_trip() {
        let frame = encode(&["chat", "alice", "hello"]).into_bytes();
        let original = decode_bytes(&frame);
        for i in 0..frame.len() {
            let mut mutated = frame.clone();
            mutated[i] = mutated[i].wrapping_add(1);
            let decoded = decode_bytes(&mutated);
            assert!(
                decoded.is_empty() || decoded != original,
                "perturbation at byte {i} produced the original tuple"
            );
        }
    }
}
