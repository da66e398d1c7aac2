//! `switchy_database`-backed [`IncidentStore`].
//!
//! All statements use raw SQL with `$n` placeholders via
//! `query_raw_params()` / `exec_raw_params()`, and only use syntax shared by
//! `SQLite` and `PostgreSQL` (`ON CONFLICT ... DO UPDATE`, `COALESCE`,
//! `CAST(... AS TEXT)`). Timestamps are stored as fixed-width RFC 3339
//! text in UTC so that lexical and chronological order agree.
//!
//! The change feed is in-process: events are published after each
//! successful write made through this store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fireline_incident_models::{
    ChangeKind, ChatMessage, Coordinates, FeedEvent, Incident, IncidentQuery, IncidentStatus,
    Responder, Station,
};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use tokio::sync::broadcast;

use crate::feed::ChangeFeed;
use crate::{IncidentStore, StoreError};

const INCIDENT_COLUMNS: &str = "id, incident_type, description, latitude, longitude, address,
     reporter_id, station_id, status, dispatcher_id, created_at, updated_at, resolved_at";

/// Store backed by a `switchy_database` connection.
pub struct SqlStore {
    db: Arc<dyn Database>,
    feed: ChangeFeed,
}

impl SqlStore {
    /// Wraps an open connection. Call [`SqlStore::ensure_schema`] once before
    /// first use.
    #[must_use]
    pub fn new(db: Arc<dyn Database>, feed: ChangeFeed) -> Self {
        Self { db, feed }
    }

    /// The feed this store publishes on.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Creates all tables if they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any DDL statement fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS stations (
                    id          TEXT PRIMARY KEY,
                    name        TEXT NOT NULL,
                    phone       TEXT,
                    latitude    DOUBLE PRECISION,
                    longitude   DOUBLE PRECISION
                )",
            )
            .await?;

        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS dispatchers (
                    id          TEXT PRIMARY KEY,
                    station_id  TEXT NOT NULL,
                    name        TEXT NOT NULL,
                    latitude    DOUBLE PRECISION,
                    longitude   DOUBLE PRECISION,
                    is_active   INTEGER NOT NULL DEFAULT 1
                )",
            )
            .await?;

        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS incidents (
                    id             TEXT PRIMARY KEY,
                    incident_type  TEXT NOT NULL,
                    description    TEXT NOT NULL,
                    latitude       DOUBLE PRECISION NOT NULL,
                    longitude      DOUBLE PRECISION NOT NULL,
                    address        TEXT,
                    reporter_id    TEXT NOT NULL,
                    station_id     TEXT NOT NULL,
                    status         TEXT NOT NULL,
                    dispatcher_id  TEXT,
                    created_at     TEXT NOT NULL,
                    updated_at     TEXT NOT NULL,
                    resolved_at    TEXT
                )",
            )
            .await?;

        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS chat_messages (
                    id           TEXT PRIMARY KEY,
                    incident_id  TEXT NOT NULL,
                    sender_id    TEXT NOT NULL,
                    body         TEXT NOT NULL,
                    created_at   TEXT NOT NULL
                )",
            )
            .await?;

        self.db
            .exec_raw(
                "CREATE TABLE IF NOT EXISTS chat_reads (
                    incident_id   TEXT NOT NULL,
                    viewer_id     TEXT NOT NULL,
                    last_read_at  TEXT NOT NULL,
                    PRIMARY KEY (incident_id, viewer_id)
                )",
            )
            .await?;

        self.db
            .exec_raw("CREATE INDEX IF NOT EXISTS idx_incidents_station ON incidents (station_id)")
            .await?;
        self.db
            .exec_raw(
                "CREATE INDEX IF NOT EXISTS idx_incidents_dispatcher ON incidents (dispatcher_id)",
            )
            .await?;
        self.db
            .exec_raw(
                "CREATE INDEX IF NOT EXISTS idx_messages_incident
                 ON chat_messages (incident_id, created_at)",
            )
            .await?;

        log::info!("Store schema ready");
        Ok(())
    }

    async fn write_incident(&self, incident: &Incident, upsert: bool) -> Result<u64, StoreError> {
        let conflict = if upsert {
            " ON CONFLICT (id) DO UPDATE SET
                incident_type = excluded.incident_type,
                description = excluded.description,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                address = excluded.address,
                reporter_id = excluded.reporter_id,
                station_id = excluded.station_id,
                status = excluded.status,
                dispatcher_id = excluded.dispatcher_id,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                resolved_at = excluded.resolved_at"
        } else {
            " ON CONFLICT (id) DO NOTHING"
        };

        let sql = format!(
            "INSERT INTO incidents ({INCIDENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13){conflict}"
        );

        let affected = self
            .db
            .exec_raw_params(
                &sql,
                &[
                    DatabaseValue::String(incident.id.clone()),
                    DatabaseValue::String(incident.incident_type.clone()),
                    DatabaseValue::String(incident.description.clone()),
                    DatabaseValue::Real64(incident.location.latitude),
                    DatabaseValue::Real64(incident.location.longitude),
                    opt_string(incident.address.as_deref()),
                    DatabaseValue::String(incident.reporter_id.clone()),
                    DatabaseValue::String(incident.station_id.clone()),
                    DatabaseValue::String(incident.status.as_ref().to_string()),
                    opt_string(incident.dispatcher_id.as_deref()),
                    timestamp(incident.created_at),
                    timestamp(incident.updated_at),
                    incident.resolved_at.map_or(DatabaseValue::Null, timestamp),
                ],
            )
            .await?;

        Ok(affected)
    }
}

#[async_trait]
impl IncidentStore for SqlStore {
    async fn insert_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        if self.write_incident(incident, false).await? == 0 {
            return Err(StoreError::Duplicate {
                table: "incidents",
                id: incident.id.clone(),
            });
        }
        self.feed.publish_incident(ChangeKind::Insert, incident, None);
        Ok(())
    }

    async fn upsert_incident(&self, incident: &Incident) -> Result<(), StoreError> {
        let previous = self.get_incident(&incident.id).await?;
        self.write_incident(incident, true).await?;
        self.feed
            .publish_incident(ChangeKind::Update, incident, previous.as_ref());
        Ok(())
    }

    async fn get_incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1"),
                &[DatabaseValue::String(id.to_string())],
            )
            .await?;

        rows.first().map(incident_from_row).transpose()
    }

    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<DatabaseValue> = Vec::new();

        let equality = [
            ("station_id", query.station_id.as_ref()),
            ("dispatcher_id", query.dispatcher_id.as_ref()),
            ("reporter_id", query.reporter_id.as_ref()),
            ("id", query.incident_id.as_ref()),
        ];
        for (column, value) in equality {
            if let Some(value) = value {
                params.push(DatabaseValue::String(value.clone()));
                conditions.push(format!("{column} = ${}", params.len()));
            }
        }

        if !query.statuses.is_empty() {
            let placeholders: Vec<String> = query
                .statuses
                .iter()
                .map(|status| {
                    params.push(DatabaseValue::String(status.as_ref().to_string()));
                    format!("${}", params.len())
                })
                .collect();
            conditions.push(format!("status IN ({})", placeholders.join(", ")));
        }

        let mut sql = format!("SELECT {INCIDENT_COLUMNS} FROM incidents");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let rows = self.db.query_raw_params(&sql, &params).await?;
        rows.iter().map(incident_from_row).collect()
    }

    async fn active_responders(&self, station_id: &str) -> Result<Vec<Responder>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, station_id, name, latitude, longitude, is_active
                 FROM dispatchers
                 WHERE station_id = $1 AND is_active = 1
                 ORDER BY id",
                &[DatabaseValue::String(station_id.to_string())],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| Responder {
                id: row.to_value("id").unwrap_or_default(),
                station_id: row.to_value("station_id").unwrap_or_default(),
                name: row.to_value("name").unwrap_or_default(),
                location: coordinates_from_row(row),
                is_active: row.to_value::<i64>("is_active").unwrap_or(0) != 0,
            })
            .collect())
    }

    async fn save_responder(&self, responder: &Responder) -> Result<(), StoreError> {
        self.db
            .exec_raw_params(
                "INSERT INTO dispatchers (id, station_id, name, latitude, longitude, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE SET
                   station_id = excluded.station_id,
                   name = excluded.name,
                   latitude = excluded.latitude,
                   longitude = excluded.longitude,
                   is_active = excluded.is_active",
                &[
                    DatabaseValue::String(responder.id.clone()),
                    DatabaseValue::String(responder.station_id.clone()),
                    DatabaseValue::String(responder.name.clone()),
                    responder
                        .location
                        .map_or(DatabaseValue::Null, |c| DatabaseValue::Real64(c.latitude)),
                    responder
                        .location
                        .map_or(DatabaseValue::Null, |c| DatabaseValue::Real64(c.longitude)),
                    DatabaseValue::Int64(i64::from(responder.is_active)),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_station(&self, station_id: &str) -> Result<Option<Station>, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT id, name, phone, latitude, longitude FROM stations WHERE id = $1",
                &[DatabaseValue::String(station_id.to_string())],
            )
            .await?;

        Ok(rows.first().map(|row| Station {
            id: row.to_value("id").unwrap_or_default(),
            name: row.to_value("name").unwrap_or_default(),
            phone: row.to_value("phone").unwrap_or(None),
            location: coordinates_from_row(row),
        }))
    }

    async fn save_station(&self, station: &Station) -> Result<(), StoreError> {
        self.db
            .exec_raw_params(
                "INSERT INTO stations (id, name, phone, latitude, longitude)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO UPDATE SET
                   name = excluded.name,
                   phone = excluded.phone,
                   latitude = excluded.latitude,
                   longitude = excluded.longitude",
                &[
                    DatabaseValue::String(station.id.clone()),
                    DatabaseValue::String(station.name.clone()),
                    opt_string(station.phone.as_deref()),
                    station
                        .location
                        .map_or(DatabaseValue::Null, |c| DatabaseValue::Real64(c.latitude)),
                    station
                        .location
                        .map_or(DatabaseValue::Null, |c| DatabaseValue::Real64(c.longitude)),
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let inserted = self
            .db
            .exec_raw_params(
                "INSERT INTO chat_messages (id, incident_id, sender_id, body, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (id) DO NOTHING",
                &[
                    DatabaseValue::String(message.id.clone()),
                    DatabaseValue::String(message.incident_id.clone()),
                    DatabaseValue::String(message.sender_id.clone()),
                    DatabaseValue::String(message.body.clone()),
                    timestamp(message.created_at),
                ],
            )
            .await?;

        if inserted == 0 {
            return Err(StoreError::Duplicate {
                table: "chat_messages",
                id: message.id.clone(),
            });
        }
        self.feed.publish_message(message);
        Ok(())
    }

    async fn count_unread(&self, incident_id: &str, viewer_id: &str) -> Result<u32, StoreError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT COUNT(*) AS cnt FROM chat_messages m
                 WHERE m.incident_id = $1
                   AND m.sender_id <> $2
                   AND m.created_at > COALESCE(
                       (SELECT r.last_read_at FROM chat_reads r
                        WHERE r.incident_id = $1 AND r.viewer_id = $2),
                       '')",
                &[
                    DatabaseValue::String(incident_id.to_string()),
                    DatabaseValue::String(viewer_id.to_string()),
                ],
            )
            .await?;

        let count: i64 = rows.first().map_or(0, |r| r.to_value("cnt").unwrap_or(0));
        u32::try_from(count).map_err(|e| StoreError::Conversion {
            message: format!("Invalid unread count {count}: {e}"),
        })
    }

    async fn mark_read(&self, incident_id: &str, viewer_id: &str) -> Result<(), StoreError> {
        // The mark is the newest message timestamp, not the wall clock, so
        // repeated calls with no new messages leave the row unchanged.
        self.db
            .exec_raw_params(
                "INSERT INTO chat_reads (incident_id, viewer_id, last_read_at)
                 SELECT $1, CAST($2 AS TEXT), MAX(created_at) FROM chat_messages
                 WHERE incident_id = $1
                 HAVING MAX(created_at) IS NOT NULL
                 ON CONFLICT (incident_id, viewer_id) DO UPDATE SET
                   last_read_at = excluded.last_read_at",
                &[
                    DatabaseValue::String(incident_id.to_string()),
                    DatabaseValue::String(viewer_id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }
}

fn opt_string(value: Option<&str>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.to_string()))
}

fn timestamp(at: DateTime<Utc>) -> DatabaseValue {
    DatabaseValue::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Conversion {
            message: format!("Invalid {column} timestamp '{value}': {e}"),
        })
}

fn coordinates_from_row(row: &Row) -> Option<Coordinates> {
    let lat: Option<f64> = row.to_value("latitude").unwrap_or(None);
    let lng: Option<f64> = row.to_value("longitude").unwrap_or(None);
    Some(Coordinates::new(lat?, lng?))
}

fn incident_from_row(row: &Row) -> Result<Incident, StoreError> {
    let id: String = row.to_value("id").map_err(|e| StoreError::Conversion {
        message: format!("Failed to parse incident id: {e}"),
    })?;

    let status_raw: String = row.to_value("status").unwrap_or_default();
    let status: IncidentStatus = status_raw.parse().map_err(|_| StoreError::Conversion {
        message: format!("Incident {id} has unknown status '{status_raw}'"),
    })?;

    let location = coordinates_from_row(row).ok_or_else(|| StoreError::Conversion {
        message: format!("Incident {id} has no coordinates"),
    })?;

    let created_at: String = row.to_value("created_at").unwrap_or_default();
    let updated_at: String = row.to_value("updated_at").unwrap_or_default();
    let resolved_at: Option<String> = row.to_value("resolved_at").unwrap_or(None);

    Ok(Incident {
        incident_type: row.to_value("incident_type").unwrap_or_default(),
        description: row.to_value("description").unwrap_or_default(),
        location,
        address: row.to_value("address").unwrap_or(None),
        reporter_id: row.to_value("reporter_id").unwrap_or_default(),
        station_id: row.to_value("station_id").unwrap_or_default(),
        status,
        dispatcher_id: row.to_value("dispatcher_id").unwrap_or(None),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        resolved_at: resolved_at
            .as_deref()
            .map(|s| parse_timestamp("resolved_at", s))
            .transpose()?,
        id,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::db::open_sqlite;

    #[test]
    fn timestamps_are_fixed_width_utc() {
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1500);

        let (DatabaseValue::String(a), DatabaseValue::String(b)) =
            (timestamp(early), timestamp(late))
        else {
            panic!("timestamps must be stored as strings");
        };
        assert_eq!(a, "2026-03-01T08:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn timestamps_parse_back() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let DatabaseValue::String(text) = timestamp(at) else {
            panic!("timestamp must be a string");
        };
        assert_eq!(parse_timestamp("created_at", &text).unwrap(), at);
        assert!(parse_timestamp("created_at", "yesterday").is_err());
    }

    #[test]
    fn missing_optional_string_is_null() {
        assert!(matches!(opt_string(None), DatabaseValue::Null));
        assert!(matches!(opt_string(Some("x")), DatabaseValue::String(ref s) if s == "x"));
    }

    async fn sqlite_store(name: &str) -> SqlStore {
        let path = std::env::temp_dir()
            .join(format!("fireline_sql_{name}_{}", std::process::id()))
            .join("store.db");
        let _ = std::fs::remove_file(&path);

        let db = open_sqlite(&path).unwrap();
        let store = SqlStore::new(Arc::from(db), ChangeFeed::default());
        store.ensure_schema().await.unwrap();
        store
    }

    fn incident(id: &str, station: &str, minutes_ago: i64) -> Incident {
        let at = Utc::now() - chrono::Duration::minutes(minutes_ago);
        Incident {
            id: id.to_string(),
            incident_type: "fire".to_string(),
            description: "grass fire".to_string(),
            location: Coordinates::new(5.6, -0.18),
            address: Some("Ring Road".to_string()),
            reporter_id: "civ-1".to_string(),
            station_id: station.to_string(),
            status: IncidentStatus::Pending,
            dispatcher_id: None,
            created_at: at,
            updated_at: at,
            resolved_at: None,
        }
    }

    fn message(id: &str, sender: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            incident_id: "inc-1".to_string(),
            sender_id: sender.to_string(),
            body: "on our way".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn sqlite_insert_reads_back_and_rejects_duplicates() {
        let store = sqlite_store("insert").await;
        let mut rx = store.subscribe();
        let row = incident("inc-1", "st-1", 0);

        store.insert_incident(&row).await.unwrap();
        let err = store.insert_incident(&row).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { table: "incidents", .. }));

        let stored = store.get_incident("inc-1").await.unwrap().unwrap();
        assert_eq!(stored.address.as_deref(), Some("Ring Road"));
        assert_eq!(stored.status, IncidentStatus::Pending);
        assert_eq!(
            stored.created_at.timestamp_micros(),
            row.created_at.timestamp_micros()
        );
        assert!(store.get_incident("missing").await.unwrap().is_none());

        let FeedEvent::Incident(event) = rx.recv().await.unwrap() else {
            panic!("expected incident event");
        };
        assert_eq!(event.kind, ChangeKind::Insert);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sqlite_upsert_reports_released_dispatcher() {
        let store = sqlite_store("upsert").await;
        let mut row = incident("inc-1", "st-1", 0);
        store.insert_incident(&row).await.unwrap();
        let mut rx = store.subscribe();

        row.status = IncidentStatus::InProgress;
        row.dispatcher_id = Some("disp-1".to_string());
        store.upsert_incident(&row).await.unwrap();
        row.status = IncidentStatus::Cancelled;
        row.dispatcher_id = None;
        store.upsert_incident(&row).await.unwrap();

        let FeedEvent::Incident(assigned) = rx.recv().await.unwrap() else {
            panic!("expected incident event");
        };
        assert_eq!(assigned.previous_dispatcher_id, None);
        let FeedEvent::Incident(cancelled) = rx.recv().await.unwrap() else {
            panic!("expected incident event");
        };
        assert_eq!(cancelled.kind, ChangeKind::Update);
        assert_eq!(cancelled.previous_dispatcher_id.as_deref(), Some("disp-1"));

        let stored = store.get_incident("inc-1").await.unwrap().unwrap();
        assert_eq!(stored.status, IncidentStatus::Cancelled);
        assert!(stored.dispatcher_id.is_none());
    }

    #[tokio::test]
    async fn sqlite_list_applies_where_clause_and_order() {
        let store = sqlite_store("list").await;
        store.insert_incident(&incident("old", "st-1", 30)).await.unwrap();
        store.insert_incident(&incident("new", "st-1", 1)).await.unwrap();
        store.insert_incident(&incident("other", "st-2", 5)).await.unwrap();
        let mut active = incident("active", "st-1", 10);
        active.status = IncidentStatus::InProgress;
        active.dispatcher_id = Some("disp-1".to_string());
        store.insert_incident(&active).await.unwrap();

        let ids = |rows: Vec<Incident>| rows.into_iter().map(|i| i.id).collect::<Vec<_>>();

        let all = store.list_incidents(&IncidentQuery::default()).await.unwrap();
        assert_eq!(ids(all), ["new", "other", "active", "old"]);

        let by_station = IncidentQuery {
            station_id: Some("st-1".to_string()),
            statuses: vec![IncidentStatus::Pending, IncidentStatus::Approved],
            ..IncidentQuery::default()
        };
        assert_eq!(ids(store.list_incidents(&by_station).await.unwrap()), ["new", "old"]);

        let by_dispatcher = IncidentQuery {
            dispatcher_id: Some("disp-1".to_string()),
            statuses: vec![IncidentStatus::InProgress],
            ..IncidentQuery::default()
        };
        assert_eq!(ids(store.list_incidents(&by_dispatcher).await.unwrap()), ["active"]);

        let single = IncidentQuery {
            incident_id: Some("other".to_string()),
            reporter_id: Some("civ-1".to_string()),
            ..IncidentQuery::default()
        };
        assert_eq!(ids(store.list_incidents(&single).await.unwrap()), ["other"]);
    }

    #[tokio::test]
    async fn sqlite_active_responders_filters_station_and_duty() {
        let store = sqlite_store("responders").await;
        for (id, station, active) in [("b", "st-1", true), ("a", "st-1", false), ("c", "st-2", true)]
        {
            store
                .save_responder(&Responder {
                    id: id.to_string(),
                    station_id: station.to_string(),
                    name: id.to_uppercase(),
                    location: Some(Coordinates::new(5.6, -0.2)),
                    is_active: active,
                })
                .await
                .unwrap();
        }

        let roster = store.active_responders("st-1").await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "b");
        assert_eq!(roster[0].location, Some(Coordinates::new(5.6, -0.2)));
    }

    #[tokio::test]
    async fn sqlite_unread_counts_only_other_senders_after_mark() {
        let store = sqlite_store("unread").await;
        let t0 = Utc::now();
        store.insert_message(&message("m1", "civ-1", t0)).await.unwrap();
        store
            .insert_message(&message("m2", "disp-1", t0 + chrono::Duration::seconds(1)))
            .await
            .unwrap();
        let err = store
            .insert_message(&message("m1", "civ-1", t0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { table: "chat_messages", .. }));

        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 1);
        assert_eq!(store.count_unread("inc-1", "civ-1").await.unwrap(), 1);
        assert_eq!(store.count_unread("inc-2", "disp-1").await.unwrap(), 0);

        store.mark_read("inc-1", "disp-1").await.unwrap();
        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 0);
        assert_eq!(store.count_unread("inc-1", "civ-1").await.unwrap(), 1);

        store
            .insert_message(&message("m3", "civ-1", t0 + chrono::Duration::seconds(2)))
            .await
            .unwrap();
        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sqlite_mark_read_is_idempotent() {
        let store = sqlite_store("mark_read").await;
        store.mark_read("inc-1", "disp-1").await.unwrap();
        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 0);

        store
            .insert_message(&message("m1", "civ-1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 1);

        store.mark_read("inc-1", "disp-1").await.unwrap();
        store.mark_read("inc-1", "disp-1").await.unwrap();
        assert_eq!(store.count_unread("inc-1", "disp-1").await.unwrap(), 0);
    }
}
