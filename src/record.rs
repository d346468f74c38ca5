//! Records handed to a [`Sink`](crate::sink::Sink).
//!
//! A [`Row`] is a store-neutral mapping of column name to [`Value`]. Header
//! records become rows with every cell typed as text; move records have the
//! fixed ten-column layout in [`MOVE_COLUMNS`](crate::schema::MOVE_COLUMNS).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used when a value serves as a grouping key. Null stays `None`
    /// so all null keys fall into the same group, like a SQL partition.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map(Value::Text).unwrap_or(Value::Null)
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map(Value::Float).unwrap_or(Value::Null)
    }
}

pub type Row = BTreeMap<String, Value>;

/// Side that made a given ply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// White makes the odd plies.
    pub fn of_ply(ply: u32) -> Self {
        if ply % 2 == 1 {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "White",
            Color::Black => "Black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full-move number of a ply: `ceil(ply / 2)`.
pub fn move_number(ply: u32) -> u32 {
    ply.div_ceil(2)
}

/// One enriched half-move.
///
/// `move_number` and `color` are derived from `ply` on demand and only
/// materialised when the record is turned into a row.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    pub game_id: Option<String>,
    pub ply: u32,
    pub san: String,
    pub uci: String,
    /// Remaining time for the mover, in seconds.
    pub clock: Option<f64>,
    pub eval: Option<String>,
    pub fen: String,
    pub shredder_fen: String,
}

impl MoveRecord {
    pub fn move_number(&self) -> u32 {
        move_number(self.ply)
    }

    pub fn color(&self) -> Color {
        Color::of_ply(self.ply)
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("game_id".into(), self.game_id.clone().into());
        row.insert("ply".into(), Value::Integer(self.ply.into()));
        row.insert("move".into(), Value::Integer(self.move_number().into()));
        row.insert("color".into(), Value::Text(self.color().to_string()));
        row.insert("san".into(), Value::Text(self.san.clone()));
        row.insert("uci".into(), Value::Text(self.uci.clone()));
        row.insert("clock".into(), self.clock.into());
        row.insert("eval".into(), self.eval.clone().into());
        row.insert("fen".into(), Value::Text(self.fen.clone()));
        row.insert("shredder_fen".into(), Value::Text(self.shredder_fen.clone()));
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_number_is_ceil_half() {
        let expected = [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3), (100, 50), (101, 51)];
        for (ply, number) in expected {
            assert_eq!(move_number(ply), number, "ply {ply}");
        }
    }

    #[test]
    fn test_color_alternates() {
        for ply in 1..=40 {
            let expected = if ply % 2 == 1 { "White" } else { "Black" };
            assert_eq!(Color::of_ply(ply).as_str(), expected);
        }
    }

    #[test]
    fn test_move_record_row_layout() {
        let record = MoveRecord {
            game_id: Some("abcd1234".to_string()),
            ply: 4,
            san: "Nc6".to_string(),
            uci: "b8c6".to_string(),
            clock: Some(178.0),
            eval: None,
            fen: "fen".to_string(),
            shredder_fen: "sfen".to_string(),
        };
        let row = record.to_row();
        assert_eq!(row.len(), 10);
        assert_eq!(row["move"], Value::Integer(2));
        assert_eq!(row["color"], Value::Text("Black".to_string()));
        assert_eq!(row["clock"], Value::Float(178.0));
        assert!(row["eval"].is_null());
    }

    #[test]
    fn test_value_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Integer(3),
            Value::Text("x".to_string()),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,3,"x"]"#);
    }
}
