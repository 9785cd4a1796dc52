use std::cmp::Ordering;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::models::{Category, EventCandidate, PersistedEvent};
use crate::utils;

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                date TEXT,
                time TEXT,
                location TEXT,
                url TEXT NOT NULL UNIQUE,
                image_url TEXT,
                category TEXT NOT NULL,
                source TEXT NOT NULL,
                scraped_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_category ON events(category);
            CREATE INDEX IF NOT EXISTS idx_events_date ON events(date);",
        )?;
        Ok(())
    }

    /// Insert-or-update keyed on the event URL. An update rewrites every
    /// field except the identifier, so an event keeps its id across scrape
    /// cycles; an insert derives a fresh stable id from source and URL.
    pub fn upsert_event(
        &self,
        candidate: &EventCandidate,
        scraped_at: i64,
    ) -> rusqlite::Result<String> {
        if let Some(existing) = self.find_by_url(&candidate.url)? {
            self.conn.execute(
                "UPDATE events SET name = ?2, date = ?3, time = ?4, location = ?5,
                    image_url = ?6, category = ?7, source = ?8, scraped_at = ?9
                 WHERE id = ?1",
                params![
                    existing.id,
                    candidate.name,
                    candidate.date,
                    candidate.time,
                    candidate.location,
                    candidate.image_url,
                    candidate.category.as_str(),
                    candidate.source,
                    scraped_at
                ],
            )?;
            Ok(existing.id)
        } else {
            let id = event_id(&candidate.source, &candidate.url);
            self.conn.execute(
                "INSERT INTO events (id, name, date, time, location, url, image_url, category, source, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    candidate.name,
                    candidate.date,
                    candidate.time,
                    candidate.location,
                    candidate.url,
                    candidate.image_url,
                    candidate.category.as_str(),
                    candidate.source,
                    scraped_at
                ],
            )?;
            Ok(id)
        }
    }

    pub fn find_by_url(&self, url: &str) -> rusqlite::Result<Option<PersistedEvent>> {
        self.conn
            .query_row(
                "SELECT id, name, date, time, location, url, image_url, category, source, scraped_at
                 FROM events WHERE url = ?1",
                params![url],
                row_to_event,
            )
            .optional()
    }

    /// Every stored event, newest date first. Rows whose date is missing or
    /// unparseable sort after the dated ones, in no particular order.
    pub fn list_all(&self) -> rusqlite::Result<Vec<PersistedEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date, time, location, url, image_url, category, source, scraped_at
             FROM events",
        )?;
        let rows = stmt.query_map([], row_to_event)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.sort_by(|a, b| compare_dates(a.date.as_deref(), b.date.as_deref()));
        Ok(out)
    }

    pub fn list_by_category(&self, category: Category) -> rusqlite::Result<Vec<PersistedEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date, time, location, url, image_url, category, source, scraped_at
             FROM events WHERE category = ?1",
        )?;
        let rows = stmt.query_map(params![category.as_str()], row_to_event)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        out.sort_by(|a, b| compare_dates(a.date.as_deref(), b.date.as_deref()));
        Ok(out)
    }

    /// Remove every stored event ahead of a fresh batch. Returns how many
    /// rows were dropped.
    pub fn clear_events(&self) -> rusqlite::Result<usize> {
        self.conn.execute("DELETE FROM events", [])
    }

    pub fn delete_event(&self, id: &str) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn count_events(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
    }

    #[cfg(test)]
    pub(crate) fn raw_conn(&self) -> &Connection {
        &self.conn
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedEvent> {
    let category_raw: String = row.get(7)?;
    let category = Category::parse(&category_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown category {category_raw:?}").into(),
        )
    })?;
    Ok(PersistedEvent {
        id: row.get(0)?,
        name: row.get(1)?,
        date: row.get(2)?,
        time: row.get(3)?,
        location: row.get(4)?,
        url: row.get(5)?,
        image_url: row.get(6)?,
        category,
        source: row.get(8)?,
        scraped_at: row.get(9)?,
    })
}

/// Stable identifier for a persisted event: content hash over provenance and
/// URL, so the same event page maps to the same id run after run.
pub fn event_id(source: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn compare_dates(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (parse_display_date(a), parse_display_date(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => b.cmp(&a),
    }
}

fn parse_display_date(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    for fmt in ["%B %d, %Y", "%B %e, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value.trim(), fmt) {
            return Some(date);
        }
    }
    None
}
