//! Elo rating table persisted as a flat `{model: rating}` JSON object.
//!
//! The table keeps insertion order, which breaks rating ties on the
//! leaderboard. Every mutation rewrites the whole file through a temp file
//! and rename; if that fails the in-memory table is rolled back.
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use localrag_core::{Error, Result};

pub const DEFAULT_RATING: f64 = 1000.0;
pub const K_FACTOR: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The first model won.
    A,
    /// The second model won.
    B,
    #[serde(rename = "tie")]
    Tie,
}

impl Outcome {
    /// Actual scores `(S_A, S_B)`.
    pub fn scores(self) -> (f64, f64) {
        match self {
            Outcome::A => (1.0, 0.0),
            Outcome::B => (0.0, 1.0),
            Outcome::Tie => (0.5, 0.5),
        }
    }
}

impl FromStr for Outcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Outcome::A),
            "b" => Ok(Outcome::B),
            "tie" | "draw" => Ok(Outcome::Tie),
            other => Err(Error::InvalidConfig(format!("outcome must be A, B or tie, got '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub model: String,
    /// Rounded to one decimal.
    pub elo: f64,
}

/// `E_A = 1 / (1 + 10^((R_B - R_A) / 400))`.
pub fn expected_score(ra: f64, rb: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rb - ra) / 400.0))
}

/// New `(R_A, R_B)` after one match.
pub fn updated_ratings(ra: f64, rb: f64, outcome: Outcome) -> (f64, f64) {
    let (sa, sb) = outcome.scores();
    (ra + K_FACTOR * (sa - expected_score(ra, rb)), rb + K_FACTOR * (sb - expected_score(rb, ra)))
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Table(Vec<(String, f64)>);

impl Table {
    fn get(&self, model: &str) -> Option<f64> {
        self.0.iter().find(|(m, _)| m == model).map(|(_, r)| *r)
    }

    fn set(&mut self, model: &str, rating: f64) {
        match self.0.iter_mut().find(|(m, _)| m == model) {
            Some(slot) => slot.1 = rating,
            None => self.0.push((model.to_string(), rating)),
        }
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(m, r)| (m, r)))
    }
}

impl<'de> Deserialize<'de> for Table {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = Table;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of model name to rating")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Table, A::Error> {
                let mut table = Table::default();
                while let Some((model, rating)) = access.next_entry::<String, f64>()? {
                    table.set(&model, rating);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

pub struct RatingLedger {
    path: PathBuf,
    table: Mutex<Table>,
}

impl RatingLedger {
    /// Read the table as stored. A missing file is an empty table and nothing is written.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = read_table(&path)?;
        tracing::debug!(path = %path.display(), models = table.0.len(), "ratings loaded");
        Ok(Self { path, table: Mutex::new(table) })
    }

    /// Load and synchronise against the live roster: models not in `roster` are
    /// dropped, new ones start at [`DEFAULT_RATING`], and the result is persisted.
    pub fn load_with_roster(path: impl Into<PathBuf>, roster: &[String]) -> Result<Self> {
        let path = path.into();
        let stored = read_table(&path)?;
        let mut synced = Table::default();
        for model in roster {
            if synced.get(model).is_none() {
                synced.set(model, stored.get(model).unwrap_or(DEFAULT_RATING));
            }
        }
        let dropped = stored.0.iter().filter(|(m, _)| synced.get(m).is_none()).count();
        persist(&path, &synced)?;
        tracing::info!(
            path = %path.display(),
            models = synced.0.len(),
            dropped,
            "leaderboard synchronized with available models"
        );
        Ok(Self { path, table: Mutex::new(synced) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rating(&self, model: &str) -> Result<Option<f64>> {
        Ok(self.lock()?.get(model))
    }

    /// Apply one match and persist the full table. Unknown models enter at
    /// [`DEFAULT_RATING`]. On a write failure nothing changes in memory.
    pub fn record_match(&self, model_a: &str, model_b: &str, outcome: Outcome) -> Result<Vec<LeaderboardEntry>> {
        if model_a == model_b {
            return Err(Error::InvalidConfig(format!("cannot rate '{model_a}' against itself")));
        }
        let mut table = self.lock()?;
        let ra = table.get(model_a).unwrap_or(DEFAULT_RATING);
        let rb = table.get(model_b).unwrap_or(DEFAULT_RATING);
        let (new_a, new_b) = updated_ratings(ra, rb, outcome);

        let mut next = table.clone();
        next.set(model_a, new_a);
        next.set(model_b, new_b);
        persist(&self.path, &next)?;
        *table = next;

        tracing::info!(
            model_a,
            model_b,
            ?outcome,
            elo_a = new_a,
            elo_b = new_b,
            "match recorded"
        );
        Ok(leaderboard_of(&table))
    }

    /// Descending rating, ties in insertion order, ranks from 1.
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(leaderboard_of(&*self.lock()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>> {
        self.table.lock().map_err(|_| Error::Operation("rating table lock poisoned".into()))
    }
}

fn leaderboard_of(table: &Table) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<&(String, f64)> = table.0.iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    rows.into_iter()
        .enumerate()
        .map(|(i, (model, elo))| LeaderboardEntry {
            rank: i + 1,
            model: model.clone(),
            elo: (elo * 10.0).round() / 10.0,
        })
        .collect()
}

fn read_table(path: &Path) -> Result<Table> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Table::default()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::default()),
        Err(e) => Err(Error::persistence(path, e)),
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn persist(path: &Path, table: &Table) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

    let json = serde_json::to_vec_pretty(table)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::persistence(&dir, e))?;
    tmp.write_all(&json).map_err(|e| Error::persistence(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::persistence(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::persistence(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_scores_sum_to_one() {
        let ea = expected_score(1200.0, 1000.0);
        let eb = expected_score(1000.0, 1200.0);
        assert!((ea + eb - 1.0).abs() < 1e-12);
        assert!(ea > 0.75 && ea < 0.77);
    }

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!("a".parse::<Outcome>().ok(), Some(Outcome::A));
        assert_eq!(" B ".parse::<Outcome>().ok(), Some(Outcome::B));
        assert_eq!("TIE".parse::<Outcome>().ok(), Some(Outcome::Tie));
        assert!("c".parse::<Outcome>().is_err());
    }

    #[test]
    fn table_serializes_in_insertion_order() {
        let table = Table(vec![("zeta".into(), 1000.0), ("alpha".into(), 990.5)]);
        let json = serde_json::to_string(&table).expect("json");
        assert_eq!(json, r#"{"zeta":1000.0,"alpha":990.5}"#);
        let back: Table = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, table);
    }
}
