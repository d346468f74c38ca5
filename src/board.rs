//! Board-state capability: applies move tokens and reports the resulting
//! position.
//!
//! The pipeline only sees the [`BoardState`] trait. [`ShakmatyBoard`] is the
//! implementation used in production; it covers standard chess, chess960 and
//! the lichess variants.

use shakmaty::{
    fen::Fen,
    san::SanPlus,
    uci::UciMove,
    variant::{Variant, VariantPosition},
    CastlingMode, EnPassantMode, Position, Rank,
};

use crate::header::GameHeader;
use crate::{Error, Result};

/// A move in every notation the moves table stores, plus the position after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub san: String,
    pub uci: String,
    pub fen: String,
    pub shredder_fen: String,
}

/// Something that can play move tokens from a starting position.
pub trait BoardState {
    /// Apply one SAN move token. Fails with [`Error::InvalidMove`] when the
    /// token does not parse or is not legal in the current position.
    fn apply(&mut self, token: &str) -> Result<AppliedMove>;
}

/// [`BoardState`] backed by `shakmaty`.
#[derive(Debug, Clone)]
pub struct ShakmatyBoard {
    pos: VariantPosition,
    mode: CastlingMode,
}

impl Default for ShakmatyBoard {
    fn default() -> Self {
        ShakmatyBoard::new(Variant::Chess, CastlingMode::Standard)
    }
}

impl ShakmatyBoard {
    /// Starting position of `variant`.
    pub fn new(variant: Variant, mode: CastlingMode) -> Self {
        ShakmatyBoard {
            pos: VariantPosition::new(variant),
            mode,
        }
    }

    /// Position set up from a FEN string.
    pub fn from_fen(variant: Variant, mode: CastlingMode, fen: &str) -> Result<Self> {
        let fen: Fen = fen
            .trim()
            .parse()
            .map_err(|e| Error::InvalidPosition(format!("failed to parse FEN {fen:?}: {e}")))?;
        let pos = VariantPosition::from_setup(variant, fen.into_setup(), mode)
            .map_err(|e| Error::InvalidPosition(format!("invalid FEN position: {e}")))?;
        Ok(ShakmatyBoard { pos, mode })
    }

    /// Board for one game, honouring its `Variant` and `FEN` tags.
    ///
    /// `fallback_variant` (usually the shard's variant) applies when the game
    /// carries no recognisable `Variant` tag.
    pub fn for_game(header: &GameHeader, fallback_variant: Option<&str>) -> Result<Self> {
        let (variant, mode) = tag_ignore_case(header, "Variant")
            .and_then(variant_from_name)
            .or_else(|| fallback_variant.and_then(variant_from_name))
            .unwrap_or((Variant::Chess, CastlingMode::Standard));

        match tag_ignore_case(header, "FEN") {
            Some(fen) => ShakmatyBoard::from_fen(variant, mode, fen),
            None => Ok(ShakmatyBoard::new(variant, mode)),
        }
    }

    pub fn variant(&self) -> Variant {
        self.pos.variant()
    }

    /// FEN of the current position, en passant square only when legal.
    pub fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }

    /// Shredder-FEN of the current position: castling rights spelled as rook
    /// files (`HAha`) instead of `KQkq`.
    pub fn shredder_fen(&self) -> String {
        let fen = self.fen();
        let castling = shredder_castling(&self.pos);
        fen.split(' ')
            .enumerate()
            .map(|(i, field)| if i == 2 { castling.as_str() } else { field })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl BoardState for ShakmatyBoard {
    fn apply(&mut self, token: &str) -> Result<AppliedMove> {
        let invalid = |reason: String| Error::InvalidMove {
            token: token.to_owned(),
            reason,
        };
        let san_plus: SanPlus = strip_glyphs(token)
            .parse()
            .map_err(|e| invalid(format!("unparseable SAN: {e}")))?;
        let m = san_plus
            .san
            .to_move(&self.pos)
            .map_err(|e| invalid(format!("illegal move: {e}")))?;

        let uci = UciMove::from_move(&m, self.mode).to_string();
        let san = SanPlus::from_move_and_play_unchecked(&mut self.pos, &m).to_string();

        Ok(AppliedMove {
            san,
            uci,
            fen: self.fen(),
            shredder_fen: self.shredder_fen(),
        })
    }
}

/// Map a variant name, either a lichess `Variant` tag (`Racing Kings`,
/// `Three-check`) or an archive file name segment (`racingKings`,
/// `threeCheck`), to a shakmaty variant and castling mode.
pub fn variant_from_name(name: &str) -> Option<(Variant, CastlingMode)> {
    let normalized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let variant = match normalized.as_str() {
        "standard" | "chess" | "fromposition" => Variant::Chess,
        "chess960" => return Some((Variant::Chess, CastlingMode::Chess960)),
        "atomic" => Variant::Atomic,
        "antichess" => Variant::Antichess,
        "kingofthehill" => Variant::KingOfTheHill,
        "threecheck" | "3check" => Variant::ThreeCheck,
        "crazyhouse" => Variant::Crazyhouse,
        "racingkings" => Variant::RacingKings,
        "horde" => Variant::Horde,
        _ => return None,
    };
    Some((variant, CastlingMode::Standard))
}

fn tag_ignore_case<'a>(header: &'a GameHeader, key: &str) -> Option<&'a str> {
    header
        .keys()
        .find(|k| k.eq_ignore_ascii_case(key))
        .and_then(|k| header.get(k))
}

/// Move annotation glyphs (`!`, `?`, `!?`) are not part of SAN.
fn strip_glyphs(token: &str) -> &str {
    token.trim_end_matches(|c| c == '!' || c == '?')
}

/// White's rights first, each colour from the h-file down, `-` when empty.
fn shredder_castling(pos: &VariantPosition) -> String {
    let rights = pos.castles().castling_rights();
    let mut castling = String::new();
    for (rank, upper) in [(Rank::First, true), (Rank::Eighth, false)] {
        let mut files: Vec<char> = rights
            .into_iter()
            .filter(|sq| sq.rank() == rank)
            .map(|sq| sq.file().char())
            .collect();
        files.reverse();
        for file in files {
            castling.push(if upper { file.to_ascii_uppercase() } else { file });
        }
    }
    if castling.is_empty() {
        castling.push('-');
    }
    castling
}
