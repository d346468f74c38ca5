//! Per-shard ingestion: raw games in, header and move rows out.
//!
//! Each game's tags go through the [`HeaderExtractor`], its movetext through
//! [`parse_movetext`], and every ply is replayed on a [`BoardState`] to add
//! SAN/UCI/FEN. A move the board rejects marks the game invalid; the plies
//! before it are kept and ingestion moves on to the next game.

use std::io::BufRead;

use crate::annotation::{parse_clock, parse_eval};
use crate::batch::BatchAccumulator;
use crate::board::{BoardState, ShakmatyBoard};
use crate::config::IngestConfig;
use crate::eval::normalize;
use crate::header::HeaderExtractor;
use crate::movetext::{parse_movetext, RawPly};
use crate::naming::ShardTarget;
use crate::reader::{GameReader, RawGame};
use crate::record::MoveRecord;
use crate::schema::SchemaRegistry;
use crate::sink::Sink;
use crate::{Error, Result};

/// Counts for one completed shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub games: usize,
    pub moves: usize,
    pub invalid_games: usize,
}

/// Moves of one game after board replay.
#[derive(Debug)]
pub struct EnrichedGame {
    pub moves: Vec<MoveRecord>,
    /// Why replay stopped early, if it did.
    pub error: Option<Error>,
}

impl EnrichedGame {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Replay `plies` on `board`, building one record per accepted ply.
pub fn enrich_moves<B: BoardState + ?Sized>(
    board: &mut B,
    game_id: Option<&str>,
    plies: &[RawPly<'_>],
) -> EnrichedGame {
    let mut moves = Vec::with_capacity(plies.len());
    for raw in plies {
        let applied = match board.apply(raw.token) {
            Ok(applied) => applied,
            Err(error) => {
                return EnrichedGame {
                    moves,
                    error: Some(error),
                }
            }
        };
        moves.push(MoveRecord {
            game_id: game_id.map(str::to_owned),
            ply: raw.ply,
            san: applied.san,
            uci: applied.uci,
            clock: raw.clock.and_then(parse_clock),
            eval: normalize(raw.eval.and_then(parse_eval)),
            fen: applied.fen,
            shredder_fen: applied.shredder_fen,
        });
    }
    EnrichedGame { moves, error: None }
}

/// Ingestion of one source shard into its staging tables.
pub struct ShardIngest<'s, S: Sink + ?Sized> {
    target: ShardTarget,
    registry: SchemaRegistry,
    batch: BatchAccumulator<'s, S>,
    summary: IngestSummary,
}

impl<'s, S: Sink + ?Sized> ShardIngest<'s, S> {
    pub fn new(sink: &'s S, target: ShardTarget, config: &IngestConfig) -> Self {
        let batch = BatchAccumulator::new(
            sink,
            target.games_table().to_string(),
            target.moves_table().to_string(),
            config,
        );
        ShardIngest {
            target,
            registry: SchemaRegistry::new(),
            batch,
            summary: IngestSummary::default(),
        }
    }

    /// Start from a pre-populated registry, e.g. one filled by a pre-scan.
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn target(&self) -> &ShardTarget {
        &self.target
    }

    pub fn ingest_game(&mut self, raw: &RawGame) -> Result<()> {
        let mut extractor = HeaderExtractor::new();
        for line in &raw.tags {
            extractor.push_line(line, &mut self.registry);
        }
        let header = extractor.finish();

        let plies = parse_movetext(&raw.movetext);
        let enriched = match ShakmatyBoard::for_game(&header, Some(self.target.variant.as_str())) {
            Ok(mut board) => enrich_moves(&mut board, header.game_id(), &plies),
            Err(error) => EnrichedGame {
                moves: Vec::new(),
                error: Some(error),
            },
        };

        if let Some(error) = &enriched.error {
            tracing::warn!(
                shard = %self.target,
                line = raw.line,
                game_id = header.game_id().unwrap_or("-"),
                kept_plies = enriched.moves.len(),
                "invalid game: {error}"
            );
            self.summary.invalid_games += 1;
        }
        self.summary.games += 1;
        self.summary.moves += enriched.moves.len();

        self.batch.add_moves(enriched.moves)?;
        self.batch.add_game(header, &self.registry)
    }

    pub fn ingest_reader<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for game in GameReader::new(reader) {
            self.ingest_game(&game?)?;
        }
        Ok(())
    }

    /// Flush the remaining buffers and report the shard's counts.
    pub fn finish(self) -> Result<IngestSummary> {
        let stats = self.batch.finish(&self.registry)?;
        tracing::info!(
            shard = %self.target,
            games = self.summary.games,
            moves = stats.moves,
            invalid_games = self.summary.invalid_games,
            columns = self.registry.len(),
            "finished shard"
        );
        Ok(self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::sink::{FileSink, MemorySink, SqliteSink};

    const RACING_KINGS: &str = r#"[Event "Rated Racing Kings game"]
[Site "https://lichess.org/rk000001"]
[White "a"]
[Black "b"]
[Result "1-0"]
[Variant "Racing Kings"]

1. Kg3 { [%eval 0.19] [%clk 0:00:30] } 1... Kb3 { [%clk 0:00:29] } 2. Kf4 { [%clk 0:00:28] } 2... Kc4 { [%clk 0:00:27] } 3. Ke5 { [%clk 0:00:26] } 1-0

[Event "Rated Racing Kings game"]
[Site "https://lichess.org/rk000002"]
[Result "0-1"]
[WhiteTitle "BOT"]

1. Kg3 Kb3 2. Kf4 0-1
"#;

    fn target() -> ShardTarget {
        ShardTarget::new("racingKings", "2023-01", Some("0001".to_string()))
    }

    #[test]
    fn test_enrich_annotated_game() {
        let plies = parse_movetext(
            "1. Kg3 { [%eval 0.19] [%clk 0:00:30] } 1... Kb3 { [%clk 0:00:29] } 2. Kf4 { [%clk 0:00:28] } 2... Kc4 { [%clk 0:00:27] } 3. Ke5 { [%clk 0:00:26] } 1-0",
        );
        let header = [("Variant", "Racing Kings")].into_iter().collect();
        let mut board = ShakmatyBoard::for_game(&header, None).unwrap();
        let game = enrich_moves(&mut board, Some("rk000001"), &plies);

        assert!(game.is_valid());
        assert_eq!(game.moves.len(), 5);
        let first = &game.moves[0];
        assert_eq!(first.uci, "h2g3");
        assert_eq!(first.clock, Some(30.0));
        assert_eq!(first.eval.as_deref(), Some("0.19"));
        assert_eq!(first.game_id.as_deref(), Some("rk000001"));
        let last = &game.moves[4];
        assert_eq!((last.ply, last.move_number(), last.color().as_str()), (5, 3, "White"));
        assert_eq!(last.clock, Some(26.0));
        assert_eq!(last.eval, None);
    }

    #[test]
    fn test_invalid_move_keeps_prefix() {
        let plies = parse_movetext("1. e4 e5 2. Ke3 Nc6 1-0");
        let mut board = ShakmatyBoard::default();
        let game = enrich_moves(&mut board, None, &plies);
        assert_eq!(game.moves.len(), 2);
        assert!(matches!(game.error, Some(Error::InvalidMove { ref token, .. }) if token == "Ke3"));
    }

    #[test]
    fn test_ingest_reader_writes_tables() {
        let sink = MemorySink::new();
        let mut ingest = ShardIngest::new(&sink, target(), &IngestConfig::default());
        ingest.ingest_reader(RACING_KINGS.as_bytes()).unwrap();
        let summary = ingest.finish().unwrap();

        assert_eq!(
            summary,
            IngestSummary {
                games: 2,
                moves: 8,
                invalid_games: 0
            }
        );
        assert_eq!(sink.row_count("moves_racingKings_2023-01"), Some(8));

        let headers = sink.read_rows("games_racingKings_2023-01_0001").unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0]["GameId"], Value::Text("rk000001".to_string()));
        // keys only one game carried are padded in the other
        assert!(headers[0]["WhiteTitle"].is_null());
        assert!(headers[1]["Variant"].is_null());
        assert!(headers[1]["White"].is_null());
        assert!(headers[0].contains_key("Round"));
    }

    #[test]
    fn test_invalid_game_is_counted_and_skipped() {
        let pgn = "[Site \"https://lichess.org/bad\"]\n\n1. e4 e5 2. Ke3 1-0\n\n[Site \"https://lichess.org/good\"]\n\n1. d4 d5 1/2-1/2\n";
        let sink = MemorySink::new();
        let target = ShardTarget::new("standard", "2020-01", None);
        let mut ingest = ShardIngest::new(&sink, target, &IngestConfig::default());
        ingest.ingest_reader(pgn.as_bytes()).unwrap();
        let summary = ingest.finish().unwrap();

        assert_eq!(summary.games, 2);
        assert_eq!(summary.invalid_games, 1);
        assert_eq!(summary.moves, 4);
        assert_eq!(sink.row_count("games_standard_2020-01_0000"), Some(2));
    }

    #[test]
    fn test_prescanned_registry_fixes_columns_up_front() {
        let mut registry = SchemaRegistry::new();
        registry.prescan(RACING_KINGS.as_bytes()).unwrap();

        let sink = MemorySink::new();
        let config = IngestConfig {
            headers_flush_games: 1,
            ..IngestConfig::default()
        };
        let mut ingest = ShardIngest::new(&sink, target(), &config).with_registry(registry);
        let first = GameReader::new(RACING_KINGS.as_bytes()).next().unwrap().unwrap();
        ingest.ingest_game(&first).unwrap();

        let columns = sink.columns("games_racingKings_2023-01_0001").unwrap();
        assert!(columns.contains(&"WhiteTitle".to_string()));
    }

    fn ingest_one_at_a_time<S: Sink + ?Sized>(sink: &S) -> Vec<crate::record::Row> {
        let pgn = "[Event \"A\"]\n[Site \"https://lichess.org/one\"]\n\n1. e4 1-0\n\n[Event \"B\"]\n[Site \"https://lichess.org/two\"]\n[WhiteElo \"1500\"]\n\n1. d4 0-1\n";
        let config = IngestConfig {
            headers_flush_games: 1,
            ..IngestConfig::default()
        };
        let target = ShardTarget::new("standard", "2020-01", Some("0001".to_string()));
        let mut ingest = ShardIngest::new(sink, target, &config);
        ingest.ingest_reader(pgn.as_bytes()).unwrap();
        ingest.finish().unwrap();
        sink.read_rows("games_standard_2020-01_0001").unwrap()
    }

    fn assert_same_key_set(rows: &[crate::record::Row]) {
        assert_eq!(rows.len(), 2);
        assert!(rows[0]["WhiteElo"].is_null());
        assert_eq!(rows[1]["WhiteElo"], Value::Text("1500".to_string()));
        assert_eq!(
            rows[0].keys().collect::<Vec<_>>(),
            rows[1].keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_late_header_key_reaches_earlier_flushes() {
        assert_same_key_set(&ingest_one_at_a_time(&MemorySink::new()));
        assert_same_key_set(&ingest_one_at_a_time(&SqliteSink::open_in_memory().unwrap()));

        let dir = tempfile::tempdir().unwrap();
        assert_same_key_set(&ingest_one_at_a_time(&FileSink::open(dir.path()).unwrap()));
    }
}
