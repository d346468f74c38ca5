//! Movetext parser.
//!
//! Turns one game's movetext into an ordered list of [`RawPly`] values. Two
//! dialects occur in the archives:
//!
//! - unannotated: `1. e4 e5 2. Nf3 Nc6 1-0`
//! - annotated: `1. e4 { [%eval 0.17] [%clk 0:03:00] } 1... e5 { [%clk 0:02:58] } 1-0`
//!
//! The dialect is chosen once per game by a lexical probe. Board-state
//! enrichment (SAN, UCI, FEN) happens later in the pipeline.

use crate::record::{move_number, Color};
use crate::tokenizer::{
    closes_block, is_nag, is_result, move_number as parse_move_number, opens_block, tokenize,
    CONTINUATION,
};

/// Which flavour of movetext a game uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Move pairs after each number, no annotation blocks.
    Unannotated,
    /// Every move carries its own number (`n.` or `n...`) and an optional
    /// `{ ... }` annotation block.
    Annotated,
}

impl Dialect {
    /// Cheap lexical probe. The continuation marker only appears in annotated
    /// movetext; an opening brace catches one-ply annotated games, which have
    /// no Black move and therefore no continuation marker.
    pub fn detect(movetext: &str) -> Self {
        if movetext.contains(CONTINUATION) || movetext.contains('{') {
            Dialect::Annotated
        } else {
            Dialect::Unannotated
        }
    }
}

/// One half-move as read from movetext, before board enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPly<'a> {
    pub ply: u32,
    pub token: &'a str,
    pub clock: Option<&'a str>,
    pub eval: Option<&'a str>,
}

impl RawPly<'_> {
    pub fn move_number(&self) -> u32 {
        move_number(self.ply)
    }

    pub fn color(&self) -> Color {
        Color::of_ply(self.ply)
    }
}

/// Parse one game's movetext.
///
/// Truncated input (a move number with no move, an unterminated annotation
/// block) ends the parse with whatever has been collected.
pub fn parse_movetext(movetext: &str) -> Vec<RawPly<'_>> {
    parse_with_dialect(movetext, Dialect::detect(movetext))
}

/// Parse with an explicitly chosen dialect.
pub fn parse_with_dialect(movetext: &str, dialect: Dialect) -> Vec<RawPly<'_>> {
    let mut state = ParserState::new(tokenize(movetext));
    match dialect {
        Dialect::Unannotated => state.parse_pairs(),
        Dialect::Annotated => state.parse_annotated(),
    }
    state.plies
}

struct ParserState<'a> {
    tokens: Vec<&'a str>,
    cursor: usize,
    ply: u32,
    plies: Vec<RawPly<'a>>,
}

impl<'a> ParserState<'a> {
    fn new(tokens: Vec<&'a str>) -> Self {
        ParserState {
            plies: Vec::with_capacity(tokens.len() / 2),
            tokens,
            cursor: 0,
            ply: 0,
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.cursor).copied();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.cursor).copied()
    }

    fn push(&mut self, token: &'a str) {
        self.ply += 1;
        self.plies.push(RawPly {
            ply: self.ply,
            token,
            clock: None,
            eval: None,
        });
    }

    /// `<n>. white black` repeated; the result token is dropped up front so
    /// it can never be read as Black's final move.
    fn parse_pairs(&mut self) {
        if self.tokens.last().is_some_and(|t| is_result(t)) {
            self.tokens.pop();
        }
        while let Some(token) = self.next() {
            match parse_move_number(token) {
                Some(number) => {
                    if let Some(glued) = number.glued {
                        self.push(glued);
                    }
                }
                None if is_result(token) || is_nag(token) => {}
                None => self.push(token),
            }
        }
    }

    /// Move number, move, optional annotation block, repeated.
    fn parse_annotated(&mut self) {
        while let Some(token) = self.next() {
            if opens_block(token) {
                // A block not directly after a move still belongs to the last ply.
                self.read_block(token);
                continue;
            }
            let Some(number) = parse_move_number(token) else {
                continue;
            };
            let mv = match number.glued {
                Some(glued) => glued,
                None => match self.next() {
                    Some(mv) => mv,
                    None => return,
                },
            };
            if is_result(mv) {
                return;
            }
            self.push(mv);
            if let Some(open) = self.peek().filter(|t| opens_block(t)) {
                self.cursor += 1;
                self.read_block(open);
            }
        }
    }

    /// Scan an annotation block that starts at `open` (already consumed),
    /// attaching `%clk` and `%eval` to the most recent ply. Stops after the
    /// token ending in `}` or at end of input.
    fn read_block(&mut self, open: &'a str) {
        let mut token = open;
        loop {
            let key = token.trim_start_matches('{');
            if key.starts_with("[%clk") {
                let value = self.peek().map(annotation_value);
                if let Some(last) = self.plies.last_mut() {
                    last.clock = value;
                }
            } else if key.starts_with("[%eval") {
                let value = self.peek().map(annotation_value);
                if let Some(last) = self.plies.last_mut() {
                    last.eval = value;
                }
            }
            if closes_block(token) {
                return;
            }
            match self.next() {
                Some(next) => token = next,
                None => return,
            }
        }
    }
}

/// The value token of a `[%key value]` pair, without its closing brackets.
fn annotation_value(token: &str) -> &str {
    token.trim_end_matches('}').trim_end_matches(']')
}
