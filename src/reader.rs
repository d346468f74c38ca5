//! Streaming source reader: groups the lines of a decompressed archive into
//! raw games without holding more than one game in memory.

use std::io::BufRead;

use crate::header::is_tag_line;
use crate::Result;

/// One game's unparsed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGame {
    /// Tag lines, `[Key "Value"]`, in file order.
    pub tags: Vec<String>,
    /// Movetext. Wrapped movetext lines are joined with single spaces.
    pub movetext: String,
    /// 1-based line number of the game's first line in the source.
    pub line: usize,
}

/// Iterator over the games of a PGN stream.
///
/// A game is a run of tag lines followed by movetext. Movetext ends at the
/// first blank line or at the next tag line, so archives that omit the blank
/// separator still split correctly. A wrapped movetext line that opens with a
/// comment command (`[%clk ...]`) is not a tag line and stays in the movetext.
pub struct GameReader<R> {
    lines: std::io::Lines<R>,
    pending_tag: Option<String>,
    line_number: usize,
}

impl<R: BufRead> GameReader<R> {
    pub fn new(reader: R) -> Self {
        GameReader {
            lines: reader.lines(),
            pending_tag: None,
            line_number: 0,
        }
    }

    fn next_line(&mut self) -> Option<std::io::Result<String>> {
        let line = self.lines.next()?;
        self.line_number += 1;
        Some(line.map(|l| l.trim_end_matches('\r').to_owned()))
    }

    fn read_game(&mut self) -> Result<Option<RawGame>> {
        let mut game = RawGame::default();
        if let Some(tag) = self.pending_tag.take() {
            game.line = self.line_number;
            game.tags.push(tag);
        }

        while let Some(line) = self.next_line() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                if game.movetext.is_empty() {
                    continue;
                }
                return Ok(Some(game));
            }
            if game.line == 0 {
                game.line = self.line_number;
            }
            if is_tag_line(trimmed) {
                if game.movetext.is_empty() {
                    game.tags.push(trimmed.to_owned());
                    continue;
                }
                self.pending_tag = Some(trimmed.to_owned());
                return Ok(Some(game));
            }
            if !game.movetext.is_empty() {
                game.movetext.push(' ');
            }
            game.movetext.push_str(trimmed);
        }

        if game.tags.is_empty() && game.movetext.is_empty() {
            Ok(None)
        } else {
            Ok(Some(game))
        }
    }
}

impl<R: BufRead> Iterator for GameReader<R> {
    type Item = Result<RawGame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_game().transpose()
    }
}
