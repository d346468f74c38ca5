//! Buffers header and move records for one shard and flushes them to the
//! sink in batches.

use crate::config::IngestConfig;
use crate::header::GameHeader;
use crate::record::MoveRecord;
use crate::schema::{move_schema, reconcile, SchemaRegistry};
use crate::sink::Sink;
use crate::{Error, Result};

/// Rows flushed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub headers: usize,
    pub moves: usize,
}

pub struct BatchAccumulator<'s, S: Sink + ?Sized> {
    sink: &'s S,
    games_table: String,
    moves_table: String,
    moves_flush_games: usize,
    headers_flush_games: usize,

    headers: Vec<GameHeader>,
    moves: Vec<MoveRecord>,
    games_in_moves: usize,
    moves_table_ready: bool,
    stats: FlushStats,
}

impl<'s, S: Sink + ?Sized> BatchAccumulator<'s, S> {
    pub fn new(
        sink: &'s S,
        games_table: impl Into<String>,
        moves_table: impl Into<String>,
        config: &IngestConfig,
    ) -> Self {
        BatchAccumulator {
            sink,
            games_table: games_table.into(),
            moves_table: moves_table.into(),
            moves_flush_games: config.moves_flush_games.max(1),
            headers_flush_games: config.headers_flush_games.max(1),
            headers: Vec::new(),
            moves: Vec::new(),
            games_in_moves: 0,
            moves_table_ready: false,
            stats: FlushStats::default(),
        }
    }

    /// Buffer a header; flushes headers once the threshold is reached.
    pub fn add_game(&mut self, header: GameHeader, registry: &SchemaRegistry) -> Result<()> {
        self.headers.push(header);
        if self.headers.len() >= self.headers_flush_games {
            self.flush_headers(registry)?;
        }
        Ok(())
    }

    /// Buffer one game's moves; flushes moves every `moves_flush_games` games.
    pub fn add_moves(&mut self, moves: Vec<MoveRecord>) -> Result<()> {
        self.moves.extend(moves);
        self.games_in_moves += 1;
        if self.games_in_moves >= self.moves_flush_games {
            self.flush_moves()?;
        }
        Ok(())
    }

    pub fn flush_headers(&mut self, registry: &SchemaRegistry) -> Result<()> {
        if self.headers.is_empty() {
            return Ok(());
        }
        let table = self.games_table.as_str();
        reconcile(&mut self.headers, registry);
        self.sink
            .ensure_table(table, &registry.columns())
            .map_err(|e| Error::flush(table, e))?;
        let rows: Vec<_> = self.headers.iter().map(GameHeader::to_row).collect();
        self.sink
            .append_rows(table, &rows)
            .map_err(|e| Error::flush(table, e))?;

        tracing::info!(table, rows = rows.len(), columns = registry.len(), "flushed headers");
        self.stats.headers += rows.len();
        self.headers.clear();
        Ok(())
    }

    pub fn flush_moves(&mut self) -> Result<()> {
        let games = std::mem::take(&mut self.games_in_moves);
        if self.moves.is_empty() {
            return Ok(());
        }
        let table = self.moves_table.as_str();
        if !self.moves_table_ready {
            self.sink
                .ensure_table(table, &move_schema())
                .map_err(|e| Error::flush(table, e))?;
            self.moves_table_ready = true;
        }
        let rows: Vec<_> = self.moves.iter().map(MoveRecord::to_row).collect();
        self.sink
            .append_rows(table, &rows)
            .map_err(|e| Error::flush(table, e))?;

        tracing::info!(table, rows = rows.len(), games, "flushed moves");
        self.stats.moves += rows.len();
        self.moves.clear();
        Ok(())
    }

    /// Flush whatever is still buffered.
    pub fn finish(mut self, registry: &SchemaRegistry) -> Result<FlushStats> {
        self.flush_moves()?;
        self.flush_headers(registry)?;
        Ok(self.stats)
    }

    pub fn pending_headers(&self) -> usize {
        self.headers.len()
    }

    pub fn pending_moves(&self) -> usize {
        self.moves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Row, Value};
    use crate::schema::Column;
    use crate::sink::MemorySink;

    fn config(moves: usize, headers: usize) -> IngestConfig {
        IngestConfig {
            moves_flush_games: moves,
            headers_flush_games: headers,
            ..IngestConfig::default()
        }
    }

    fn game_moves(id: &str, plies: u32) -> Vec<MoveRecord> {
        (1..=plies)
            .map(|ply| MoveRecord {
                game_id: Some(id.to_string()),
                ply,
                san: "e4".to_string(),
                uci: "e2e4".to_string(),
                clock: None,
                eval: None,
                fen: String::new(),
                shredder_fen: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_flushes_at_thresholds() {
        let sink = MemorySink::new();
        let registry = SchemaRegistry::new();
        let mut batch = BatchAccumulator::new(&sink, "games_x_2020-01_0001", "moves_x_2020-01", &config(2, 3));

        for i in 0..5 {
            let id = format!("g{i}");
            batch
                .add_game([("GameId", id.as_str())].into_iter().collect(), &registry)
                .unwrap();
            batch.add_moves(game_moves(&id, 2)).unwrap();
        }
        assert_eq!(sink.row_count("games_x_2020-01_0001"), Some(3));
        assert_eq!(sink.row_count("moves_x_2020-01"), Some(8));
        assert_eq!(batch.pending_headers(), 2);
        assert_eq!(batch.pending_moves(), 2);

        let stats = batch.finish(&registry).unwrap();
        assert_eq!(stats, FlushStats { headers: 5, moves: 10 });
        assert_eq!(sink.row_count("games_x_2020-01_0001"), Some(5));
        assert_eq!(sink.row_count("moves_x_2020-01"), Some(10));
    }

    #[test]
    fn test_header_flush_pads_to_registry() {
        let sink = MemorySink::new();
        let mut registry = SchemaRegistry::empty();
        let mut batch = BatchAccumulator::new(&sink, "g", "moves_x_2020-01", &config(50, 100));

        let first: GameHeader = [("A", "1"), ("B", "2")].into_iter().collect();
        let second: GameHeader = [("A", "3"), ("C", "4")].into_iter().collect();
        for key in first.keys().chain(second.keys()) {
            registry.observe(key);
        }
        batch.add_game(first, &registry).unwrap();
        batch.add_game(second, &registry).unwrap();
        batch.finish(&registry).unwrap();

        assert_eq!(sink.columns("g").unwrap(), vec!["A", "B", "C"]);
        let rows: Vec<Row> = sink.read_rows("g").unwrap();
        for row in &rows {
            assert_eq!(row.keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        }
        assert_eq!(rows[0]["C"], Value::Null);
        assert_eq!(rows[1]["B"], Value::Null);
    }

    #[test]
    fn test_moves_table_gets_fixed_schema() {
        let sink = MemorySink::new();
        let registry = SchemaRegistry::new();
        let mut batch = BatchAccumulator::new(&sink, "g", "moves_x_2020-01", &config(1, 1));
        batch.add_moves(game_moves("a", 1)).unwrap();
        batch.finish(&registry).unwrap();
        let columns = sink.columns("moves_x_2020-01").unwrap();
        assert_eq!(columns.len(), 10);
        assert_eq!(columns[0], "game_id");
        assert_eq!(columns[9], "shredder_fen");
    }

    #[derive(Default)]
    struct FailingSink;

    impl Sink for FailingSink {
        fn ensure_table(&self, _: &str, _: &[Column]) -> Result<()> {
            Ok(())
        }
        fn append_rows(&self, _: &str, _: &[Row]) -> Result<()> {
            Err(Error::Io(std::io::Error::other("disk full")))
        }
        fn list_tables(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn columns(&self, table: &str) -> Result<Vec<String>> {
            Err(Error::TableNotFound(table.to_owned()))
        }
        fn delete_table(&self, _: &str) -> Result<()> {
            Ok(())
        }
        fn rename_table(&self, from: &str, _: &str) -> Result<()> {
            Err(Error::TableNotFound(from.to_owned()))
        }
        fn read_rows(&self, table: &str) -> Result<Vec<Row>> {
            Err(Error::TableNotFound(table.to_owned()))
        }
    }

    #[test]
    fn test_append_failure_is_flush_error() {
        let sink = FailingSink;
        let registry = SchemaRegistry::new();
        let mut batch = BatchAccumulator::new(&sink, "games_x_2020-01_0001", "m", &config(50, 1));
        let err = batch
            .add_game([("GameId", "a")].into_iter().collect(), &registry)
            .unwrap_err();
        assert!(matches!(err, Error::Flush { ref table, .. } if table == "games_x_2020-01_0001"));
    }
}
