//! SQLite cache for monthly archives and opening evaluations.
//!
//! Evaluations are keyed by (game_url, depth) so results computed at one
//! search depth are never served for another.

use std::collections::HashMap;
use std::path::Path;

use chess_core::{color_name, parse_color, GameOutcome};
use chrono::Utc;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use shakmaty::Color;
use tracing::{debug, info};

use crate::error::Result;
use crate::repertoire::OpeningEvaluation;

/// SQLite caps bound parameters; batch lookups are split into chunks.
const LOOKUP_CHUNK: usize = 500;

const CREATE_TABLES_SQL: &str = "
    CREATE TABLE IF NOT EXISTS archive_months (
        archive_url TEXT PRIMARY KEY,
        username    TEXT NOT NULL,
        raw_json    TEXT NOT NULL,
        fetched_at  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS opening_evaluations (
        game_url        TEXT NOT NULL,
        username        TEXT NOT NULL,
        depth           INTEGER NOT NULL,
        eco_code        TEXT,
        eco_name        TEXT NOT NULL,
        my_color        TEXT NOT NULL,
        deviation_ply   INTEGER NOT NULL,
        deviating_side  TEXT NOT NULL,
        eval_cp         INTEGER NOT NULL,
        is_fully_booked INTEGER NOT NULL,
        PRIMARY KEY (game_url, depth)
    );
";

/// Columns added after the first schema, with the defaults legacy rows get.
const LATER_COLUMNS: &[(&str, &str)] = &[
    ("fen_at_deviation", "TEXT DEFAULT ''"),
    ("best_move_uci", "TEXT"),
    ("played_move_uci", "TEXT"),
    ("book_moves_uci", "TEXT DEFAULT ''"),
    ("eval_loss_cp", "INTEGER DEFAULT 0"),
    ("game_moves_uci", "TEXT DEFAULT ''"),
    ("my_result", "TEXT DEFAULT ''"),
    ("time_class", "TEXT DEFAULT ''"),
    ("created_at", "TEXT DEFAULT ''"),
];

const SELECT_COLUMNS: &str = "game_url, eco_code, eco_name, my_color, deviation_ply,
    deviating_side, eval_cp, is_fully_booked, fen_at_deviation, best_move_uci,
    played_move_uci, book_moves_uci, eval_loss_cp, game_moves_uci, my_result, time_class";

const UPSERT_EVALUATION_SQL: &str = "INSERT OR REPLACE INTO opening_evaluations
    (game_url, username, depth, eco_code, eco_name, my_color, deviation_ply,
     deviating_side, eval_cp, is_fully_booked, fen_at_deviation, best_move_uci,
     played_move_uci, book_moves_uci, eval_loss_cp, game_moves_uci, my_result,
     time_class, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)";

pub struct GameCache {
    conn: Connection,
}

impl GameCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let cache = Self::from_connection(Connection::open(path)?)?;
        info!(path = %path.display(), "Opened cache");
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)?;
        let cache = Self { conn };
        cache.migrate_columns()?;
        Ok(cache)
    }

    fn migrate_columns(&self) -> Result<()> {
        let existing: Vec<String> = self
            .conn
            .prepare("PRAGMA table_info(opening_evaluations)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

        for (name, decl) in LATER_COLUMNS {
            if !existing.iter().any(|c| c == name) {
                debug!(column = name, "Adding cache column");
                self.conn.execute_batch(&format!(
                    "ALTER TABLE opening_evaluations ADD COLUMN {name} {decl}"
                ))?;
            }
        }
        Ok(())
    }

    // --- Archive caching ---

    /// Cached JSON for an archive month, if any.
    pub fn get_archive(&self, archive_url: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT raw_json FROM archive_months WHERE archive_url = ?1",
                params![archive_url],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_archive(&self, archive_url: &str, username: &str, data: &Value) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO archive_months (archive_url, username, raw_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                archive_url,
                username.to_lowercase(),
                serde_json::to_string(data)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // --- Evaluation caching ---

    pub fn get_evaluation(&self, game_url: &str, depth: u32) -> Result<Option<OpeningEvaluation>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM opening_evaluations WHERE game_url = ?1 AND depth = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![game_url, depth], row_to_evaluation)
            .optional()?)
    }

    /// Batch lookup of cached evaluations. Misses are simply absent.
    pub fn get_cached_evaluations(
        &self,
        game_urls: &[&str],
        depth: u32,
    ) -> Result<HashMap<String, OpeningEvaluation>> {
        let mut results = HashMap::new();
        for chunk in game_urls.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT {SELECT_COLUMNS} FROM opening_evaluations
                 WHERE game_url IN ({placeholders}) AND depth = ?"
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let bound = chunk
                .iter()
                .map(|url| SqlValue::Text((*url).to_string()))
                .chain(std::iter::once(SqlValue::Integer(i64::from(depth))));
            let rows = stmt.query_map(params_from_iter(bound), row_to_evaluation)?;
            for row in rows {
                let evaluation = row?;
                results.insert(evaluation.game_url.clone(), evaluation);
            }
        }
        Ok(results)
    }

    /// Upsert evaluations keyed by (game_url, depth) in one transaction.
    pub fn save_evaluations_batch<'a, I>(&mut self, username: &str, depth: u32, evaluations: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a OpeningEvaluation>,
    {
        let username = username.to_lowercase();
        let created_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare(UPSERT_EVALUATION_SQL)?;
            for ev in evaluations {
                stmt.execute(params![
                    ev.game_url,
                    username,
                    depth,
                    ev.eco_code,
                    ev.eco_name,
                    color_name(ev.my_color),
                    ev.deviation_ply as i64,
                    side_name(ev.deviating_side),
                    ev.eval_cp,
                    ev.is_fully_booked,
                    ev.fen_at_deviation,
                    ev.best_move_uci,
                    ev.played_move_uci,
                    ev.book_moves_uci.join(","),
                    ev.eval_loss_cp,
                    ev.game_moves_uci.join(","),
                    ev.my_result.map(|r| r.as_str()).unwrap_or_default(),
                    ev.time_class,
                    created_at,
                ])?;
                saved += 1;
            }
        }
        tx.commit()?;
        Ok(saved)
    }
}

fn side_name(side: Option<Color>) -> &'static str {
    side.map(color_name).unwrap_or("none")
}

fn split_list(raw: Option<String>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.is_empty() => raw.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn color_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Color> {
    let text: String = row.get(name)?;
    parse_color(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("invalid {name}: {text}").into(),
        )
    })
}

/// Decode a row, filling defaults for columns legacy rows never wrote.
fn row_to_evaluation(row: &Row<'_>) -> rusqlite::Result<OpeningEvaluation> {
    let deviating_side: String = row.get("deviating_side")?;
    let my_result: Option<String> = row.get("my_result")?;
    let deviation_ply: i64 = row.get("deviation_ply")?;

    Ok(OpeningEvaluation {
        eco_code: row.get("eco_code")?,
        eco_name: row.get("eco_name")?,
        my_color: color_column(row, "my_color")?,
        deviation_ply: usize::try_from(deviation_ply).unwrap_or_default(),
        deviating_side: parse_color(&deviating_side),
        eval_cp: row.get("eval_cp")?,
        is_fully_booked: row.get("is_fully_booked")?,
        fen_at_deviation: row.get::<_, Option<String>>("fen_at_deviation")?.unwrap_or_default(),
        best_move_uci: row.get("best_move_uci")?,
        played_move_uci: row.get("played_move_uci")?,
        book_moves_uci: split_list(row.get("book_moves_uci")?),
        eval_loss_cp: row.get::<_, Option<i32>>("eval_loss_cp")?.unwrap_or_default(),
        game_moves_uci: split_list(row.get("game_moves_uci")?),
        game_url: row.get("game_url")?,
        my_result: my_result.as_deref().and_then(GameOutcome::parse),
        time_class: row.get::<_, Option<String>>("time_class")?.unwrap_or_default(),
    })
}
