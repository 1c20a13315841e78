//! PostgreSQL implementation of [`Store`]
//!
//! Queries are checked at runtime, so the crate builds without a live
//! database. Surrogate ids are read as `bigint` whatever their column width.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use pitlane_common::types::SessionType;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info};

use super::{LockStatus, Store, MATERIALIZED_VIEWS};
use crate::config::DatabaseConfig;
use crate::models::rows::{
    Candidate, LapRow, NaturalKey, PitStopRow, QualifyingResultRow, RaceEventRow, RaceResultRow,
    ReplaceCount, StandingRow, StandingsSnapshot, StoredCircuit, StoredConstructor, StoredDriver,
    StoredRace, StoredSeason, StoredSession, TireStintRow,
};

/// Rows per multi-row INSERT, well under the bind-parameter limit
const BULK_CHUNK_ROWS: usize = 1000;

const RUN_LOCK_ID: i32 = 1;

#[derive(Debug, Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Open a pool and apply pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("Failed to run migrations")?;

        info!("✓ Connected to database");
        Ok(Self::new(db))
    }

    async fn delete_scoped(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        column: &str,
        parent_id: i64,
    ) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", table, column);
        let result = sqlx::query(&sql)
            .bind(parent_id)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to clear {} for {} {}", table, column, parent_id))?;
        Ok(result.rows_affected())
    }

    async fn insert_standings(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        entity_column: &str,
        rows: &[StandingRow],
    ) -> Result<u64> {
        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (race_id, {}, points, position, season, wins) ",
                table, entity_column
            ));
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.race_id)
                    .push_bind(row.entity_id)
                    .push_bind(row.points)
                    .push_bind(row.position)
                    .push_bind(row.season)
                    .push_bind(row.wins);
            });
            inserted += query_builder
                .build()
                .execute(&mut **tx)
                .await
                .with_context(|| format!("Failed to insert {}", table))?
                .rows_affected();
        }
        Ok(inserted)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn seasons(&self) -> Result<Vec<StoredSeason>> {
        let rows: Vec<(i64, i32)> = sqlx::query_as("SELECT id::bigint, year FROM seasons ORDER BY year")
            .fetch_all(&self.db)
            .await
            .context("Failed to load seasons")?;
        Ok(rows.into_iter().map(|(id, year)| StoredSeason { id, year }).collect())
    }

    async fn country_codes(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT country_code FROM countries")
            .fetch_all(&self.db)
            .await
            .context("Failed to load countries")
    }

    async fn circuits(&self) -> Result<Vec<StoredCircuit>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id::bigint, name FROM circuits")
            .fetch_all(&self.db)
            .await
            .context("Failed to load circuits")?;
        Ok(rows.into_iter().map(|(id, name)| StoredCircuit { id, name }).collect())
    }

    async fn constructors(&self) -> Result<Vec<StoredConstructor>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id::bigint, name FROM constructors")
            .fetch_all(&self.db)
            .await
            .context("Failed to load constructors")?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| StoredConstructor { id, name })
            .collect())
    }

    async fn drivers(&self) -> Result<Vec<StoredDriver>> {
        let rows: Vec<(i64, Option<String>, Option<String>, Option<i32>, String, String)> = sqlx::query_as(
            r#"
            SELECT id::bigint, ergast_driver_ref, name_acronym, driver_number, first_name, last_name
            FROM drivers
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("Failed to load drivers")?;

        Ok(rows
            .into_iter()
            .map(
                |(id, external_ref, acronym, number, first_name, last_name)| StoredDriver {
                    id,
                    external_ref,
                    acronym,
                    number,
                    first_name,
                    last_name,
                },
            )
            .collect())
    }

    async fn races_for_season(&self, year: i32) -> Result<Vec<StoredRace>> {
        let rows: Vec<(i64, i64, i32, i32, String, NaiveDate)> = sqlx::query_as(
            r#"
            SELECT r.id::bigint, r.season_id::bigint, s.year, r.round, r.name, r.date
            FROM races r
            JOIN seasons s ON s.id = r.season_id
            WHERE s.year = $1
            ORDER BY r.round
            "#,
        )
        .bind(year)
        .fetch_all(&self.db)
        .await
        .with_context(|| format!("Failed to load races for {}", year))?;

        Ok(rows
            .into_iter()
            .map(|(id, season_id, year, round, name, date)| StoredRace {
                id,
                season_id,
                year,
                round,
                name,
                date,
            })
            .collect())
    }

    async fn sessions_for_races(&self, race_ids: &[i64]) -> Result<Vec<StoredSession>> {
        let rows: Vec<(i64, i64, String, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT id::bigint, race_id::bigint, type, openf1_session_key::bigint
            FROM sessions
            WHERE race_id = ANY($1::bigint[])
            "#,
        )
        .bind(race_ids)
        .fetch_all(&self.db)
        .await
        .context("Failed to load sessions")?;

        rows.into_iter()
            .map(|(id, race_id, session_type, openf1_session_key)| {
                Ok(StoredSession {
                    id,
                    race_id,
                    session_type: session_type.parse::<SessionType>()?,
                    openf1_session_key,
                })
            })
            .collect()
    }

    async fn find_id(&self, key: &NaturalKey) -> Result<Option<i64>> {
        let query = match key {
            NaturalKey::Season(year) => {
                sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM seasons WHERE year = $1").bind(*year)
            },
            NaturalKey::Country(code) => {
                sqlx::query_scalar::<_, i64>("SELECT 0::bigint FROM countries WHERE country_code = $1").bind(code.clone())
            },
            NaturalKey::Circuit(name) => {
                sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM circuits WHERE name = $1").bind(name.clone())
            },
            NaturalKey::Constructor(name) => {
                sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM constructors WHERE name = $1").bind(name.clone())
            },
            NaturalKey::DriverRef(external_ref) => {
                sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM drivers WHERE ergast_driver_ref = $1")
                    .bind(external_ref.clone())
            },
            NaturalKey::DriverAcronym(acronym) => sqlx::query_scalar::<_, i64>(
                "SELECT id::bigint FROM drivers WHERE name_acronym = $1 ORDER BY id DESC LIMIT 1",
            )
            .bind(acronym.clone()),
            NaturalKey::Race { season_id, round } => {
                sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM races WHERE season_id = $1 AND round = $2")
                    .bind(*season_id)
                    .bind(*round)
            },
            NaturalKey::Session {
                race_id,
                session_type,
            } => sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM sessions WHERE race_id = $1 AND type = $2")
                .bind(*race_id)
                .bind(session_type.as_str()),
        };

        query
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("Failed to look up {:?}", key))
    }

    async fn insert(&self, candidate: &Candidate) -> Result<i64> {
        let id: std::result::Result<i64, sqlx::Error> = match candidate {
            Candidate::Season(row) => {
                sqlx::query_scalar("INSERT INTO seasons (year) VALUES ($1) RETURNING id::bigint")
                    .bind(row.year)
                    .fetch_one(&self.db)
                    .await
            },
            Candidate::Country(row) => {
                sqlx::query_scalar(
                    "INSERT INTO countries (country_code, country_name) VALUES ($1, $2) RETURNING 0::bigint",
                )
                .bind(&row.code)
                .bind(&row.name)
                .fetch_one(&self.db)
                .await
            },
            Candidate::Circuit(row) => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO circuits (name, location, country_code, map_url)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id::bigint
                    "#,
                )
                .bind(&row.name)
                .bind(&row.locality)
                .bind(&row.country_code)
                .bind(&row.reference_url)
                .fetch_one(&self.db)
                .await
            },
            Candidate::Constructor(row) => {
                sqlx::query_scalar(
                    "INSERT INTO constructors (name, nationality, url) VALUES ($1, $2, $3) RETURNING id::bigint",
                )
                .bind(&row.name)
                .bind(&row.nationality)
                .bind(&row.reference_url)
                .fetch_one(&self.db)
                .await
            },
            Candidate::Driver(row) => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO drivers (
                        ergast_driver_ref, driver_number, first_name, last_name,
                        name_acronym, country_code, date_of_birth
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING id::bigint
                    "#,
                )
                .bind(&row.external_ref)
                .bind(row.number)
                .bind(&row.first_name)
                .bind(&row.last_name)
                .bind(&row.acronym)
                .bind(&row.country_code)
                .bind(row.date_of_birth)
                .fetch_one(&self.db)
                .await
            },
            Candidate::Race(row) => {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO races (season_id, circuit_id, round, name, date, time)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id::bigint
                    "#,
                )
                .bind(row.season_id)
                .bind(row.circuit_id)
                .bind(row.round)
                .bind(&row.name)
                .bind(row.date)
                .bind(row.time)
                .fetch_one(&self.db)
                .await
            },
            Candidate::Session(row) => {
                let weather = row
                    .weather
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()
                    .context("Failed to serialize weather")?;
                sqlx::query_scalar(
                    r#"
                    INSERT INTO sessions (race_id, type, start_time, openf1_session_key, weather)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id::bigint
                    "#,
                )
                .bind(row.race_id)
                .bind(row.session_type.as_str())
                .bind(row.start_time)
                .bind(row.openf1_session_key)
                .bind(weather)
                .fetch_one(&self.db)
                .await
            },
        };

        id.with_context(|| format!("Failed to insert {}", candidate.kind()))
    }

    async fn update(&self, id: i64, candidate: &Candidate) -> Result<()> {
        let result = match candidate {
            // The year is the whole row
            Candidate::Season(row) => {
                sqlx::query("UPDATE seasons SET year = $2 WHERE id = $1")
                    .bind(id)
                    .bind(row.year)
                    .execute(&self.db)
                    .await
            },
            Candidate::Country(row) => {
                sqlx::query("UPDATE countries SET country_name = $2 WHERE country_code = $1")
                    .bind(&row.code)
                    .bind(&row.name)
                    .execute(&self.db)
                    .await
            },
            Candidate::Circuit(row) => {
                sqlx::query(
                    "UPDATE circuits SET location = $2, country_code = $3, map_url = $4 WHERE id = $1",
                )
                .bind(id)
                .bind(&row.locality)
                .bind(&row.country_code)
                .bind(&row.reference_url)
                .execute(&self.db)
                .await
            },
            Candidate::Constructor(row) => {
                sqlx::query("UPDATE constructors SET nationality = $2, url = $3 WHERE id = $1")
                    .bind(id)
                    .bind(&row.nationality)
                    .bind(&row.reference_url)
                    .execute(&self.db)
                    .await
            },
            Candidate::Driver(row) => {
                sqlx::query(
                    r#"
                    UPDATE drivers SET
                        ergast_driver_ref = COALESCE($2, ergast_driver_ref),
                        driver_number = COALESCE($3, driver_number),
                        first_name = $4,
                        last_name = $5,
                        name_acronym = COALESCE($6, name_acronym),
                        country_code = COALESCE($7, country_code),
                        date_of_birth = COALESCE($8, date_of_birth)
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&row.external_ref)
                .bind(row.number)
                .bind(&row.first_name)
                .bind(&row.last_name)
                .bind(&row.acronym)
                .bind(&row.country_code)
                .bind(row.date_of_birth)
                .execute(&self.db)
                .await
            },
            Candidate::Race(row) => {
                sqlx::query(
                    "UPDATE races SET circuit_id = $2, name = $3, date = $4, time = $5 WHERE id = $1",
                )
                .bind(id)
                .bind(row.circuit_id)
                .bind(&row.name)
                .bind(row.date)
                .bind(row.time)
                .execute(&self.db)
                .await
            },
            Candidate::Session(row) => {
                let weather = row
                    .weather
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()
                    .context("Failed to serialize weather")?;
                sqlx::query(
                    r#"
                    UPDATE sessions SET
                        start_time = COALESCE($2, start_time),
                        openf1_session_key = COALESCE($3, openf1_session_key),
                        weather = COALESCE($4, weather)
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(row.start_time)
                .bind(row.openf1_session_key)
                .bind(weather)
                .execute(&self.db)
                .await
            },
        };

        result.with_context(|| format!("Failed to update {} {}", candidate.kind(), id))?;
        Ok(())
    }

    async fn replace_race_results(&self, session_id: i64, rows: &[RaceResultRow]) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "race_results", "session_id", session_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO race_results (session_id, driver_id, constructor_id, position, points, grid, laps, status, time_ms) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.session_id)
                    .push_bind(row.driver_id)
                    .push_bind(row.constructor_id)
                    .push_bind(row.position)
                    .push_bind(row.points)
                    .push_bind(row.grid)
                    .push_bind(row.laps)
                    .push_bind(&row.status)
                    .push_bind(row.time_ms);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert race results")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(session_id, deleted, inserted, "Replaced race results");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn replace_qualifying_results(
        &self,
        session_id: i64,
        rows: &[QualifyingResultRow],
    ) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "qualifying_results", "session_id", session_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO qualifying_results (session_id, driver_id, constructor_id, position, q1_time_ms, q2_time_ms, q3_time_ms) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.session_id)
                    .push_bind(row.driver_id)
                    .push_bind(row.constructor_id)
                    .push_bind(row.position)
                    .push_bind(row.q1_ms)
                    .push_bind(row.q2_ms)
                    .push_bind(row.q3_ms);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert qualifying results")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(session_id, deleted, inserted, "Replaced qualifying results");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn replace_laps(&self, race_id: i64, rows: &[LapRow]) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "laps", "race_id", race_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO laps (race_id, driver_id, lap_number, position, time_ms) ");
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.race_id)
                    .push_bind(row.driver_id)
                    .push_bind(row.lap_number)
                    .push_bind(row.position)
                    .push_bind(row.time_ms);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert laps")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(race_id, deleted, inserted, "Replaced laps");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn replace_pit_stops(&self, race_id: i64, rows: &[PitStopRow]) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "pit_stops", "race_id", race_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO pit_stops (race_id, driver_id, stop_number, lap_number, duration_ms) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.race_id)
                    .push_bind(row.driver_id)
                    .push_bind(row.stop_number)
                    .push_bind(row.lap_number)
                    .push_bind(row.duration_ms);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert pit stops")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(race_id, deleted, inserted, "Replaced pit stops");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn replace_tire_stints(&self, session_id: i64, rows: &[TireStintRow]) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "tire_stints", "session_id", session_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO tire_stints (session_id, driver_id, stint_number, lap_start, lap_end, compound, tyre_age_at_start) ",
            );
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.session_id)
                    .push_bind(row.driver_id)
                    .push_bind(row.stint_number)
                    .push_bind(row.lap_start)
                    .push_bind(row.lap_end)
                    .push_bind(&row.compound)
                    .push_bind(row.tyre_age_at_start);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert tire stints")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(session_id, deleted, inserted, "Replaced tire stints");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn replace_race_events(&self, session_id: i64, rows: &[RaceEventRow]) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;
        let deleted = Self::delete_scoped(&mut tx, "race_events", "session_id", session_id).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(BULK_CHUNK_ROWS) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO race_events (session_id, date, category, flag, message) ");
            query_builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.session_id)
                    .push_bind(row.occurred_at)
                    .push_bind(&row.category)
                    .push_bind(&row.flag)
                    .push_bind(&row.message);
            });
            inserted += query_builder
                .build()
                .execute(&mut *tx)
                .await
                .context("Failed to insert race events")?
                .rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        debug!(session_id, deleted, inserted, "Replaced race events");
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn rebuild_standings(&self, snapshot: &StandingsSnapshot) -> Result<ReplaceCount> {
        let mut tx = self.db.begin().await.context("Failed to begin transaction")?;

        let mut deleted = 0u64;
        for table in ["driver_standings", "constructor_standings"] {
            deleted += sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {}", table))?
                .rows_affected();
        }

        let inserted = Self::insert_standings(&mut tx, "driver_standings", "driver_id", &snapshot.drivers).await?
            + Self::insert_standings(&mut tx, "constructor_standings", "constructor_id", &snapshot.constructors)
                .await?;

        tx.commit().await.context("Failed to commit transaction")?;
        info!("✓ Rebuilt standings: {} removed, {} written", deleted, inserted);
        Ok(ReplaceCount { deleted, inserted })
    }

    async fn try_acquire_run_lock(&self, owner: &str, ttl: Duration) -> Result<LockStatus> {
        let acquired: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO pipeline_run_lock (id, owner, acquired_at, expires_at)
            VALUES ($1, $2, NOW(), NOW() + make_interval(secs => $3))
            ON CONFLICT (id) DO UPDATE SET
                owner = EXCLUDED.owner,
                acquired_at = EXCLUDED.acquired_at,
                expires_at = EXCLUDED.expires_at
            WHERE pipeline_run_lock.expires_at < NOW()
            RETURNING owner
            "#,
        )
        .bind(RUN_LOCK_ID)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.db)
        .await
        .context("Failed to acquire run lock")?;

        if acquired.is_some() {
            return Ok(LockStatus::Acquired);
        }

        let holder: Option<String> = sqlx::query_scalar("SELECT owner FROM pipeline_run_lock WHERE id = $1")
            .bind(RUN_LOCK_ID)
            .fetch_optional(&self.db)
            .await
            .context("Failed to read run lock")?;

        Ok(LockStatus::HeldBy(holder.unwrap_or_else(|| "unknown".to_string())))
    }

    async fn release_run_lock(&self, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM pipeline_run_lock WHERE id = $1 AND owner = $2")
            .bind(RUN_LOCK_ID)
            .bind(owner)
            .execute(&self.db)
            .await
            .context("Failed to release run lock")?;
        Ok(())
    }

    async fn refresh_materialized_view(&self, view: &str) -> Result<()> {
        if !MATERIALIZED_VIEWS.contains(&view) {
            anyhow::bail!("Unknown materialized view '{}'", view);
        }
        sqlx::query(&format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {}", view))
            .execute(&self.db)
            .await
            .with_context(|| format!("Failed to refresh {}", view))?;
        Ok(())
    }
}
