//! Tag-pair extraction: `[Key "Value"]` lines into a [`GameHeader`].

use std::collections::BTreeMap;

use crate::record::{Row, Value};
use crate::schema::SchemaRegistry;

/// Synthetic key holding the game identifier.
pub const GAME_ID: &str = "GameId";

/// Tag whose URL value yields [`GAME_ID`].
pub const SITE: &str = "Site";

/// Tag pairs of one game. Values are `None` only where the schema reconciler
/// padded a key the game never had.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameHeader {
    tags: BTreeMap<String, Option<String>>,
}

impl GameHeader {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(|v| v.as_deref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn game_id(&self) -> Option<&str> {
        self.get(GAME_ID)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Insert `key` with a null value unless already present.
    pub(crate) fn pad(&mut self, key: &str) {
        if !self.tags.contains_key(key) {
            self.tags.insert(key.to_owned(), None);
        }
    }

    pub fn to_row(&self) -> Row {
        self.tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GameHeader {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut header = GameHeader::default();
        for (k, v) in iter {
            header.tags.insert(k.into(), Some(v.into()));
        }
        header
    }
}

/// Split a tag line into key and value.
///
/// Quoting in the archives is not always consistent, so the value is taken
/// by stripping whatever markers are present rather than by splitting on `"`.
/// Returns `None` for lines that are not tag lines at all, including
/// bracketed comment commands such as `[%clk 0:03:00]` on wrapped movetext.
pub fn parse_tag_line(line: &str) -> Option<(&str, String)> {
    let inner = line.trim().strip_prefix('[')?;
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    let (key, raw_value) = match inner.split_once(char::is_whitespace) {
        Some((key, rest)) => (key, rest.trim()),
        None => (inner, ""),
    };
    if !is_tag_key(key) {
        return None;
    }
    let value = raw_value.strip_prefix('"').unwrap_or(raw_value);
    let value = value.strip_suffix('"').unwrap_or(value);
    Some((key, unescape(value)))
}

/// Whether `line` starts a tag pair rather than continuing movetext.
pub fn is_tag_line(line: &str) -> bool {
    parse_tag_line(line).is_some()
}

fn is_tag_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unescape(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_owned();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Last path segment of a game URL: `https://lichess.org/abcd1234` → `abcd1234`.
pub fn game_id_from_site(site: &str) -> &str {
    let trimmed = site.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Accumulates the tag lines of the game currently being read.
///
/// Every key seen is registered in the run's [`SchemaRegistry`] immediately,
/// so a key only some games carry still becomes a column for all of them.
#[derive(Debug, Default)]
pub struct HeaderExtractor {
    current: BTreeMap<String, Option<String>>,
}

impl HeaderExtractor {
    pub fn new() -> Self {
        HeaderExtractor::default()
    }

    /// Feed one tag line. Lines that are not tag lines are ignored.
    pub fn push_line(&mut self, line: &str, registry: &mut SchemaRegistry) {
        let Some((key, value)) = parse_tag_line(line) else {
            return;
        };
        registry.observe(key);
        if key == SITE {
            registry.observe(GAME_ID);
            self.current
                .insert(GAME_ID.to_owned(), Some(game_id_from_site(&value).to_owned()));
        }
        self.current.insert(key.to_owned(), Some(value));
    }

    /// Finish the current game's header and reset for the next game.
    ///
    /// `GameId` is always present; it is null when the game had no `Site` tag.
    pub fn finish(&mut self) -> GameHeader {
        let mut tags = std::mem::take(&mut self.current);
        tags.entry(GAME_ID.to_owned()).or_insert(None);
        GameHeader { tags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_line() {
        let (key, value) = parse_tag_line(r#"[Event "Rated Blitz game"]"#).unwrap();
        assert_eq!(key, "Event");
        assert_eq!(value, "Rated Blitz game");
    }

    #[test]
    fn test_parse_tag_line_inner_quote() {
        let (key, value) = parse_tag_line(r#"[White "Bob "the rook" Smith"]"#).unwrap();
        assert_eq!(key, "White");
        assert_eq!(value, r#"Bob "the rook" Smith"#);
    }

    #[test]
    fn test_parse_tag_line_escapes() {
        let (_, value) = parse_tag_line(r#"[Annotator "say \"hi\" \\o/"]"#).unwrap();
        assert_eq!(value, r#"say "hi" \o/"#);
    }

    #[test]
    fn test_parse_tag_line_malformed_quoting() {
        let (key, value) = parse_tag_line(r#"[Opening "Sicilian Defense]"#).unwrap();
        assert_eq!(key, "Opening");
        assert_eq!(value, "Sicilian Defense");

        let (_, value) = parse_tag_line("[Round -]").unwrap();
        assert_eq!(value, "-");

        let (_, value) = parse_tag_line(r#"[Event "Unterminated"#).unwrap();
        assert_eq!(value, "Unterminated");

        let (key, value) = parse_tag_line("[Lonely]").unwrap();
        assert_eq!(key, "Lonely");
        assert_eq!(value, "");
    }

    #[test]
    fn test_parse_tag_line_rejects_non_tags() {
        assert!(parse_tag_line("1. e4 e5 1-0").is_none());
        assert!(parse_tag_line("[]").is_none());
        assert!(parse_tag_line("[%clk 0:03:00] } 1... e5 { [%clk 0:03:00] } 1-0").is_none());
        assert!(parse_tag_line("[%eval 0.17]").is_none());
        assert!(parse_tag_line("[1. e4]").is_none());
        assert!(!is_tag_line("[%clk 0:02:59]"));
        assert!(is_tag_line(r#"[UTCDate "2020.01.01"]"#));
        assert!(is_tag_line(r#"[Black_Team "x"]"#));
    }

    #[test]
    fn test_game_id_from_site() {
        assert_eq!(game_id_from_site("https://lichess.org/abcd1234"), "abcd1234");
        assert_eq!(game_id_from_site("https://lichess.org/abcd1234/"), "abcd1234");
        assert_eq!(game_id_from_site("local"), "local");
    }

    #[test]
    fn test_extractor_assigns_game_id_and_registers_keys() {
        let mut registry = SchemaRegistry::new();
        let mut extractor = HeaderExtractor::new();
        extractor.push_line(r#"[Site "https://lichess.org/xyz789"]"#, &mut registry);
        extractor.push_line(r#"[TimeControl "60+0"]"#, &mut registry);
        let header = extractor.finish();

        assert_eq!(header.game_id(), Some("xyz789"));
        assert_eq!(header.get("TimeControl"), Some("60+0"));
        assert!(registry.contains("TimeControl"));

        // The next game starts empty but the registry remembers the key.
        let next = extractor.finish();
        assert!(!next.contains_key("TimeControl"));
        assert!(next.contains_key(GAME_ID));
        assert_eq!(next.game_id(), None);
        assert!(registry.contains("TimeControl"));
    }
}
