//! Events database updater.
//!
//! Event models derive discrete events (maneuvers, grating moves, obsid
//! changes) from commanded states and write them to a SQLite store. The
//! updater is idempotent: each model processes `[last_update - lookback,
//! date_now]`, skips events already present (`UNIQUE(name, start)`), and
//! commits new events plus the bookkeeping row in one transaction, so
//! re-running with an overlapping window never duplicates events.

use std::path::Path;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use core_cmds::Archive;
use core_time::Date;

pub mod models;

pub use models::{GratingMoveEvents, ManvrEvents, ObsidEvents, builtin_models};

#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    States(#[from] core_states::StatesError),
    #[error(transparent)]
    Cmds(#[from] core_cmds::CmdsError),
    #[error(transparent)]
    Time(#[from] core_time::TimeError),
}

/// One event row: an interval plus free-form key/value details.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub start: String,
    pub stop: String,
    pub details: Vec<(String, String)>,
}

impl EventRecord {
    pub fn new(start: &str, stop: &str) -> Self {
        Self {
            start: start.to_string(),
            stop: stop.to_string(),
            details: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, val: &str) -> Self {
        self.details.push((key.to_string(), val.to_string()));
        self
    }

    fn details_text(&self) -> String {
        self.details
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An event model: a named family of events derivable from the commanding
/// history over a window.
pub trait EventModel {
    fn name(&self) -> &'static str;

    /// Days re-scanned before the last processed date, so events spanning
    /// an update boundary are completed on the next run.
    fn lookback(&self) -> f64;

    fn get_events(
        &self,
        archive: &Archive,
        start: &str,
        stop: &str,
    ) -> Result<Vec<EventRecord>, EventsError>;
}

/// SQLite-backed event store with an `updates` bookkeeping table.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, EventsError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events (
                 name    TEXT NOT NULL,
                 start   TEXT NOT NULL,
                 stop    TEXT NOT NULL,
                 details TEXT NOT NULL DEFAULT '',
                 UNIQUE (name, start)
             );
             CREATE TABLE IF NOT EXISTS updates (
                 name TEXT PRIMARY KEY,
                 date TEXT NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }

    /// Last processed date for a model, if any.
    pub fn last_update(&self, name: &str) -> Result<Option<String>, EventsError> {
        let date = self
            .conn
            .query_row("SELECT date FROM updates WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(date)
    }

    pub fn count_events(&self, name: &str) -> Result<i64, EventsError> {
        let n = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn events(&self, name: &str) -> Result<Vec<EventRecord>, EventsError> {
        let mut stmt = self.conn.prepare(
            "SELECT start, stop, details FROM events WHERE name = ?1 ORDER BY start",
        )?;
        let rows = stmt.query_map([name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (start, stop, details) = row?;
            let mut rec = EventRecord::new(&start, &stop);
            for pair in details.split_whitespace() {
                if let Some((k, v)) = pair.split_once('=') {
                    rec = rec.with(k, v);
                }
            }
            out.push(rec);
        }
        Ok(out)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateStats {
    pub added: usize,
    pub skipped: usize,
}

/// Update one model to `date_now`. Fetches events over
/// `[last_update - lookback, date_now]`, inserts only events not already
/// present, and advances the bookkeeping row, all in one transaction.
pub fn update(
    model: &dyn EventModel,
    archive: &Archive,
    store: &mut EventStore,
    date_now: &str,
) -> Result<UpdateStats, EventsError> {
    let name = model.name();
    let date_now = Date::parse(date_now)?;
    info!(target: "events", model = name, date = date_now.as_str(), "updating");

    let date_start = match store.last_update(name)? {
        Some(date) => Date::parse(&date)?,
        None => {
            info!(target: "events", model = name, "no previous update found");
            date_now.clone()
        }
    };

    let fetch_start = date_start.sub_days(model.lookback());
    let events = model.get_events(archive, fetch_start.as_str(), date_now.as_str())?;

    let mut stats = UpdateStats::default();
    let tx = store.conn.transaction()?;
    for event in &events {
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM events WHERE name = ?1 AND start = ?2",
                params![name, event.start],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            stats.skipped += 1;
            continue;
        }
        tx.execute(
            "INSERT INTO events (name, start, stop, details) VALUES (?1, ?2, ?3, ?4)",
            params![name, event.start, event.stop, event.details_text()],
        )?;
        info!(target: "events", model = name, start = %event.start, "adding event");
        stats.added += 1;
    }
    tx.execute(
        "INSERT INTO updates (name, date) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET date = excluded.date",
        params![name, date_now.as_str()],
    )?;
    tx.commit()?;

    info!(
        target: "events",
        model = name,
        added = stats.added,
        skipped = stats.skipped,
        "update_done"
    );
    Ok(stats)
}

/// Drive updates for every matching model from `date_start` (when given)
/// to `date_now` in 30-day steps, then a final step at `date_now`.
pub fn update_all(
    models: &[Box<dyn EventModel>],
    archive: &Archive,
    store: &mut EventStore,
    date_now: &str,
    date_start: Option<&str>,
    model_patterns: &[Regex],
) -> Result<UpdateStats, EventsError> {
    let date_nows: Vec<String> = match date_start {
        None => vec![Date::parse(date_now)?.as_str().to_string()],
        Some(start) => {
            let stop = Date::parse(date_now)?;
            let mut t = Date::parse(start)?.secs();
            let mut dates = Vec::new();
            while t < stop.secs() {
                dates.push(core_time::secs_to_date(t));
                t += 30.0 * 86400.0;
            }
            dates.push(stop.as_str().to_string());
            dates
        }
    };

    let mut total = UpdateStats::default();
    for model in models {
        if !model_patterns.is_empty()
            && !model_patterns.iter().any(|re| re.is_match(model.name()))
        {
            warn!(target: "events", model = model.name(), "model filtered out");
            continue;
        }
        for date in &date_nows {
            let stats = update(model.as_ref(), archive, store, date)?;
            total.added += stats.added;
            total.skipped += stats.skipped;
        }
    }
    Ok(total)
}
