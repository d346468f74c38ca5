//! Splitting a month archive into fixed-size shard files.
//!
//! `lichess_db_atomic_rated_2020-01.pgn` becomes
//! `lichess_db_atomic_rated_2020-01_0001.pgn`, `..._0002.pgn` and so on, each
//! holding at most `games_per_shard` games. Shard files are what
//! [`crate::ingest_file`] consumes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::naming::ShardTarget;
use crate::reader::{GameReader, RawGame};
use crate::{Error, Result};

/// Games per shard file unless configured otherwise.
pub const DEFAULT_GAMES_PER_SHARD: usize = 200_000;

/// Files written by one split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub shards: Vec<PathBuf>,
    pub games: usize,
}

struct ShardWriter {
    path: PathBuf,
    out: BufWriter<File>,
    games: usize,
}

impl ShardWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let out = BufWriter::new(File::create(&path)?);
        Ok(ShardWriter { path, out, games: 0 })
    }

    fn write_game(&mut self, game: &RawGame) -> Result<()> {
        for tag in &game.tags {
            writeln!(self.out, "{tag}")?;
        }
        writeln!(self.out)?;
        if !game.movetext.is_empty() {
            writeln!(self.out, "{}", game.movetext)?;
            writeln!(self.out)?;
        }
        self.games += 1;
        Ok(())
    }

    fn close(mut self) -> Result<PathBuf> {
        self.out.flush()?;
        tracing::info!(path = %self.path.display(), games = self.games, "wrote shard file");
        Ok(self.path)
    }
}

/// Split the games of `reader` into `{stem}_0001.pgn`, `{stem}_0002.pgn`,
/// ... under `out_dir`. No file is created for an empty input.
pub fn split_reader<R: BufRead>(
    reader: R,
    out_dir: &Path,
    stem: &str,
    games_per_shard: usize,
) -> Result<SplitReport> {
    let games_per_shard = games_per_shard.max(1);
    let mut report = SplitReport::default();
    let mut current: Option<ShardWriter> = None;

    for game in GameReader::new(reader) {
        let game = game?;
        let writer = match current.take() {
            Some(w) if w.games < games_per_shard => current.insert(w),
            full => {
                if let Some(w) = full {
                    report.shards.push(w.close()?);
                }
                let index = report.shards.len() + 1;
                let path = out_dir.join(format!("{stem}_{index:04}.pgn"));
                current.insert(ShardWriter::create(path)?)
            }
        };
        writer.write_game(&game)?;
        report.games += 1;
    }

    if let Some(w) = current {
        report.shards.push(w.close()?);
    }
    Ok(report)
}

/// Split the month archive at `path`. Its name must be an unsharded archive
/// name, `lichess_db_{variant}_rated_{month}.pgn`.
pub fn split_file(path: &Path, out_dir: &Path, games_per_shard: usize) -> Result<SplitReport> {
    let target = ShardTarget::from_path(path)?;
    if target.shard.is_some() {
        return Err(Error::SourceName(path.display().to_string()));
    }
    std::fs::create_dir_all(out_dir)?;
    let stem = format!("lichess_db_{}_rated_{}", target.variant, target.month);
    let report = split_reader(BufReader::new(File::open(path)?), out_dir, &stem, games_per_shard)?;
    tracing::info!(
        path = %path.display(),
        games = report.games,
        shards = report.shards.len(),
        "split archive"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(games: usize) -> String {
        let mut pgn = String::new();
        for i in 1..=games {
            pgn.push_str(&format!(
                "[Event \"Rated Atomic game\"]\n[Site \"https://lichess.org/g{i:07}\"]\n\n1. e4 {{ [%clk 0:01:00] }}\n1... e5 {{ [%clk 0:01:00] }} 1-0\n\n"
            ));
        }
        pgn
    }

    fn games_in(path: &Path) -> Vec<RawGame> {
        GameReader::new(BufReader::new(File::open(path).unwrap()))
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_shard_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let report = split_reader(archive(5).as_bytes(), dir.path(), "lichess_db_atomic_rated_2020-01", 2)
            .unwrap();

        assert_eq!(report.games, 5);
        let names: Vec<_> = report
            .shards
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "lichess_db_atomic_rated_2020-01_0001.pgn",
                "lichess_db_atomic_rated_2020-01_0002.pgn",
                "lichess_db_atomic_rated_2020-01_0003.pgn",
            ]
        );
        let counts: Vec<_> = report.shards.iter().map(|p| games_in(p).len()).collect();
        assert_eq!(counts, vec![2, 2, 1]);

        let first = games_in(&report.shards[0]);
        assert_eq!(first[0].tags[1], "[Site \"https://lichess.org/g0000001\"]");
        assert_eq!(
            first[0].movetext,
            "1. e4 { [%clk 0:01:00] } 1... e5 { [%clk 0:01:00] } 1-0"
        );
        let last = games_in(&report.shards[2]);
        assert_eq!(last[0].tags[1], "[Site \"https://lichess.org/g0000005\"]");

        let target = ShardTarget::from_path(&report.shards[2]).unwrap();
        assert_eq!(target.shard.as_deref(), Some("0003"));
    }

    #[test]
    fn test_exact_multiple_leaves_no_empty_shard() {
        let dir = tempfile::tempdir().unwrap();
        let report = split_reader(archive(4).as_bytes(), dir.path(), "x", 2).unwrap();
        assert_eq!(report.shards.len(), 2);
        assert!(!dir.path().join("x_0003.pgn").exists());

        let empty = split_reader("".as_bytes(), dir.path(), "y", 2).unwrap();
        assert_eq!(empty, SplitReport::default());
    }

    #[test]
    fn test_split_file_names_and_rejects_shards() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lichess_db_threeCheck_rated_2014-07.pgn");
        std::fs::write(&source, archive(3)).unwrap();
        let out = dir.path().join("shards");

        let report = split_file(&source, &out, DEFAULT_GAMES_PER_SHARD).unwrap();
        assert_eq!(report.games, 3);
        assert_eq!(
            report.shards,
            vec![out.join("lichess_db_threeCheck_rated_2014-07_0001.pgn")]
        );

        let err = split_file(&report.shards[0], &out, 2).unwrap_err();
        assert!(matches!(err, Error::SourceName(_)));
    }
}
