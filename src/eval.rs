//! Engine evaluation normalisation.

/// A position evaluation from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eval {
    /// Score in hundredths of a pawn.
    Centipawns(i32),
    /// Forced mate in `n` moves; positive when White mates, negative when
    /// Black mates. Zero means mate has already been given.
    Mate(i32),
}

impl Eval {
    /// Canonical display string, or `None` for shapes with no display form.
    pub fn normalize(self) -> Option<String> {
        match self {
            Eval::Centipawns(cp) => Some(format!("{:.2}", f64::from(cp) / 100.0)),
            Eval::Mate(n) if n > 0 => Some(format!("#{n}")),
            Eval::Mate(n) if n < 0 => Some(format!("-#{}", n.unsigned_abs())),
            Eval::Mate(_) => None,
        }
    }
}

/// Normalise an optional evaluation; absence stays absent.
pub fn normalize(eval: Option<Eval>) -> Option<String> {
    eval.and_then(Eval::normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centipawns() {
        assert_eq!(normalize(Some(Eval::Centipawns(19))), Some("0.19".to_string()));
        assert_eq!(normalize(Some(Eval::Centipawns(17))), Some("0.17".to_string()));
        assert_eq!(normalize(Some(Eval::Centipawns(-150))), Some("-1.50".to_string()));
        assert_eq!(normalize(Some(Eval::Centipawns(0))), Some("0.00".to_string()));
        assert_eq!(normalize(Some(Eval::Centipawns(1234))), Some("12.34".to_string()));
    }

    #[test]
    fn test_mate() {
        assert_eq!(normalize(Some(Eval::Mate(4))), Some("#4".to_string()));
        assert_eq!(normalize(Some(Eval::Mate(-3))), Some("-#3".to_string()));
    }

    #[test]
    fn test_absent_and_mate_given() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(Eval::Mate(0))), None);
    }
}
