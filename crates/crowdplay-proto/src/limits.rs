//! Size limits for the wire protocol.
//!
//! A single source of truth so the codec, the dispatch validation and the
//! socket read path agree on what "too large" means.

/// Upper bound on a single decoded chunk, in bytes.
///
/// Decoding rejects any frame that declares a chunk at or above this bound.
/// It must stay at 1000 or above and must cover the configured maximum chat
/// message in escaped form: with the default `maxMessageSize` of 100 and the
/// longest escape (`\u{1AAAA}`, 9 bytes) that is 900 bytes.
pub const MAX_CHUNK_LEN: usize = 1000;

/// Upper bound on a whole inbound text frame, in bytes.
///
/// Generous enough for any valid client message (verb plus a handful of
/// chunks); the read loop drops larger frames before the codec sees them.
pub const MAX_FRAME_LEN: usize = 8 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bound_covers_escaped_chat() {
        // 100 escaped characters at 9 bytes each.
        assert!(100 * 9 <= MAX_CHUNK_LEN);
        assert!(MAX_CHUNK_LEN >= 1000);
    }

    #[test]
    fn frame_bound_covers_a_full_chat_message() {
        // verb + username + maximal escaped message with framing overhead.
        assert!(MAX_FRAME_LEN > MAX_CHUNK_LEN * 2);
    }
}
