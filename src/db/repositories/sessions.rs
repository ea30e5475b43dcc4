use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{millis_to_rfc3339, parse_stage, parse_status, to_u32},
        Database,
    },
    engine::SessionStore,
    models::{CuePlayEvent, HardwareProvenance, Session, StageTimings},
};

const SESSION_COLUMNS: &str = "id, start_time, end_time, status, notes, hardware, \
     awake_ms, light_ms, deep_ms, rem_ms, cue_allowed_count";

fn row_to_session(row: &Row) -> Result<Session> {
    let status: String = row.get("status")?;
    let hardware: Option<String> = row.get("hardware")?;
    let cue_allowed_count: i64 = row.get("cue_allowed_count")?;

    let hardware = hardware
        .map(|raw| serde_json::from_str::<HardwareProvenance>(&raw))
        .transpose()
        .context("failed to parse hardware provenance")?;

    Ok(Session {
        id: row.get("id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        status: parse_status(&status)?,
        notes: row.get("notes")?,
        hardware,
        stage_timings: StageTimings {
            awake: row.get("awake_ms")?,
            light: row.get("light_ms")?,
            deep: row.get("deep_ms")?,
            rem: row.get("rem_ms")?,
        },
        cue_allowed_count: to_u32(cue_allowed_count, "cue_allowed_count")?,
        cues_played: Vec::new(),
    })
}

fn load_cue_plays(conn: &Connection, session_id: &str) -> Result<Vec<CuePlayEvent>> {
    let mut stmt = conn.prepare(
        "SELECT played_at, cue_id, cue_name, sleep_stage
         FROM cue_plays
         WHERE session_id = ?1
         ORDER BY played_at ASC, id ASC",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    let mut plays = Vec::new();
    while let Some(row) = rows.next()? {
        let stage: String = row.get(3)?;
        plays.push(CuePlayEvent {
            timestamp: row.get(0)?,
            cue_id: row.get(1)?,
            cue_name: row.get(2)?,
            sleep_stage_at_play: parse_stage(&stage)?,
        });
    }
    Ok(plays)
}

fn query_sessions(conn: &Connection, sql: &str, limit: Option<i64>) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match limit {
        Some(limit) => stmt.query(params![limit])?,
        None => stmt.query([])?,
    };

    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }
    drop(rows);

    for session in &mut sessions {
        session.cues_played = load_cue_plays(conn, &session.id)?;
    }
    Ok(sessions)
}

fn insert_session(conn: &mut Connection, session: &Session) -> Result<()> {
    let hardware = session
        .hardware
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO sessions (id, start_time, end_time, status, notes, hardware,
                               awake_ms, light_ms, deep_ms, rem_ms, cue_allowed_count, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            session.id,
            session.start_time,
            session.end_time,
            session.status.as_str(),
            session.notes,
            hardware,
            session.stage_timings.awake,
            session.stage_timings.light,
            session.stage_timings.deep,
            session.stage_timings.rem,
            session.cue_allowed_count,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("failed to insert session {}", session.id))?;

    for play in &session.cues_played {
        tx.execute(
            "INSERT INTO cue_plays (session_id, played_at, cue_id, cue_name, sleep_stage)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                play.timestamp,
                play.cue_id,
                play.cue_name,
                play.sleep_stage_at_play.as_str(),
            ],
        )
        .with_context(|| format!("failed to insert cue play {}", play.cue_id))?;
    }

    tx.commit()?;
    Ok(())
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| insert_session(conn, &record)).await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let session = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                    params![session_id],
                    |row| Ok(row_to_session(row)),
                )
                .optional()?
                .transpose()?;

            match session {
                Some(mut session) => {
                    session.cues_played = load_cue_plays(conn, &session.id)?;
                    Ok(Some(session))
                }
                None => Ok(None),
            }
        })
        .await
    }

    /// Most recent sessions first.
    pub async fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC LIMIT ?1"
                ),
                Some(limit),
            )
        })
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            query_sessions(
                conn,
                &format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time ASC"),
                None,
            )
        })
        .await
    }
}

impl SessionStore for Database {
    fn append(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        log::debug!(
            "storing session {} started {}",
            record.id,
            millis_to_rfc3339(record.start_time).unwrap_or_default()
        );
        self.execute_blocking(move |conn| insert_session(conn, &record))
    }

    fn list_all(&self) -> Result<Vec<Session>> {
        self.execute_blocking(|conn| {
            query_sessions(
                conn,
                &format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time ASC"),
                None,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BiometricMode, OutputMode, SessionStatus, SleepStage};

    fn completed_session(id: &str, start_time: i64) -> Session {
        let mut session = Session::new(
            id.to_string(),
            start_time,
            Some("after flashcards".into()),
            Some(HardwareProvenance {
                biometric: BiometricMode::Demo,
                biometric_device: None,
                cue_output: OutputMode::Silent,
                cue_output_device: None,
            }),
        );
        session.status = SessionStatus::Completed;
        session.end_time = Some(start_time + 60_000);
        session.stage_timings = StageTimings {
            awake: 10_000,
            light: 20_000,
            deep: 25_000,
            rem: 5_000,
        };
        session.cue_allowed_count = 7;
        session.cues_played = vec![
            CuePlayEvent {
                timestamp: start_time + 30_000,
                cue_id: "cue-a".into(),
                cue_name: "Chime".into(),
                sleep_stage_at_play: SleepStage::Light,
            },
            CuePlayEvent {
                timestamp: start_time + 45_000,
                cue_id: "cue-b".into(),
                cue_name: "Bell".into(),
                sleep_stage_at_play: SleepStage::Deep,
            },
        ];
        session
    }

    #[test]
    fn store_appends_and_lists_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();

        let later = completed_session("later", 2_000_000);
        let earlier = completed_session("earlier", 1_000_000);
        db.append(&later).unwrap();
        db.append(&earlier).unwrap();

        let all = db.list_all().unwrap();
        assert_eq!(all, vec![earlier, later]);
    }

    #[test]
    fn duplicate_ids_are_rejected_without_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();

        let session = completed_session("same", 1_000);
        db.append(&session).unwrap();
        assert!(db.append(&session).is_err());

        let all = db.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].cues_played.len(), 2);
    }

    #[tokio::test]
    async fn async_queries_find_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sessions.sqlite3")).unwrap();

        db.insert_session(&completed_session("one", 1_000)).await.unwrap();
        db.insert_session(&completed_session("two", 5_000)).await.unwrap();

        let found = db.get_session("two").await.unwrap().unwrap();
        assert_eq!(found.cues_played[1].cue_name, "Bell");
        assert!(db.get_session("missing").await.unwrap().is_none());

        let recent = db.list_recent_sessions(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "two");
        assert_eq!(db.list_sessions().await.unwrap().len(), 2);
    }

    #[test]
    fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.append(&completed_session("kept", 1_000)).unwrap();
        }

        let db = Database::new(path).unwrap();
        assert_eq!(db.list_all().unwrap()[0].id, "kept");
    }
}
