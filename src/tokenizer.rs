//! Whitespace tokenizer for movetext.
//!
//! Tokens borrow from the input line; no semantic knowledge lives here beyond
//! the small lexical predicates the movetext parser dispatches on.

/// Continuation marker printed before Black's move in annotated movetext.
pub const CONTINUATION: &str = "...";

/// Split a line of movetext into whitespace-separated tokens.
pub fn tokenize(movetext: &str) -> Vec<&str> {
    movetext.split_whitespace().collect()
}

/// Game termination markers.
pub fn is_result(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// Numeric annotation glyph such as `$1`.
pub fn is_nag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('$') && token[1..].bytes().all(|b| b.is_ascii_digit())
}

/// A token that opens a `{ ... }` annotation block.
pub fn opens_block(token: &str) -> bool {
    token.starts_with('{')
}

/// A token that closes a `{ ... }` annotation block.
pub fn closes_block(token: &str) -> bool {
    token.ends_with('}')
}

/// A move-number token: whether it carries the continuation marker, and any
/// move glued onto it (`12.e4`). Ply numbering comes from token order, not
/// from the printed number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveNumber<'a> {
    pub continuation: bool,
    pub glued: Option<&'a str>,
}

/// Recognise a move-number token.
///
/// A token ending in `}` closes an annotation block and is never a move
/// number, even when it contains a period.
pub fn move_number(token: &str) -> Option<MoveNumber<'_>> {
    if closes_block(token) {
        return None;
    }
    let digits = token.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &token[digits..];
    let dots = rest.bytes().take_while(|&b| b == b'.').count();
    if dots == 0 {
        return None;
    }
    let glued = &rest[dots..];
    Some(MoveNumber {
        continuation: dots >= CONTINUATION.len(),
        glued: (!glued.is_empty()).then_some(glued),
    })
}
