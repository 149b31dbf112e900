use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tess_schemas::{
    AttrValue, Attribute, AttributeStream, Bounds, EntityId, IntervalRecord, NewIntervalRecord,
    RecordId, StreamKey, TemporalError, ValidState,
};
use tracing::debug;

use crate::adapter::{ensure_scope, IntervalStore, StoreKind};
use crate::rules::{check_close, check_insert, check_repair};

pub const ENV_DB_URL: &str = "TESS_DATABASE_URL";

/// Connect to Postgres using the URL held in env var `var` (normally [`ENV_DB_URL`]).
pub async fn connect_from_env(var: &str) -> Result<PgPool> {
    let url = std::env::var(var).with_context(|| format!("missing env var {var}"))?;
    connect_url(&url).await
}

pub async fn connect_url(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_interval_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='interval_records'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_interval_table: exists,
    })
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "record_id, entity_id, attribute, value, valid_since, valid_until, valid_state, registered";

fn map_db_err(context: &str, err: sqlx::Error) -> TemporalError {
    if let sqlx::Error::Database(db) = &err {
        // 23505 unique_violation, 23514 check_violation
        if matches!(db.code().as_deref(), Some("23505") | Some("23514")) {
            return TemporalError::constraint(format!("{context}: {}", db.message()));
        }
    }
    TemporalError::backend(context, err)
}

fn decode_row(row: &PgRow) -> Result<IntervalRecord, TemporalError> {
    let bad = |e: &dyn std::fmt::Display| TemporalError::backend("decode interval_records row", e);

    let entity: String = row.try_get("entity_id").map_err(|e| bad(&e))?;
    let attribute: String = row.try_get("attribute").map_err(|e| bad(&e))?;
    let value: serde_json::Value = row.try_get("value").map_err(|e| bad(&e))?;
    let state: String = row.try_get("valid_state").map_err(|e| bad(&e))?;

    Ok(IntervalRecord {
        record_id: RecordId(row.try_get("record_id").map_err(|e| bad(&e))?),
        entity_id: EntityId::parse(&entity)?,
        attribute: Attribute::parse(&attribute)?,
        value: serde_json::from_value::<AttrValue>(value).map_err(|e| bad(&e))?,
        valid_since: row.try_get("valid_since").map_err(|e| bad(&e))?,
        valid_until: row.try_get("valid_until").map_err(|e| bad(&e))?,
        valid_state: ValidState::parse(&state)?,
        registered: row.try_get("registered").map_err(|e| bad(&e))?,
    })
}

async fn fetch_stream(
    conn: &mut PgConnection,
    key: &StreamKey,
) -> Result<AttributeStream, TemporalError> {
    let sql = format!(
        "select {SELECT_COLUMNS} from interval_records \
         where entity_id = $1 and attribute = $2 \
         order by valid_since, record_id"
    );
    let rows = sqlx::query(&sql)
        .bind(key.entity_id.as_str())
        .bind(key.attribute.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_db_err("load_stream", e))?;

    let deactivated: Option<(bool,)> =
        sqlx::query_as::<_, (bool,)>("select deactivated from entities where entity_id = $1")
            .bind(key.entity_id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_db_err("load_stream deactivated flag", e))?;

    let records = rows
        .iter()
        .map(decode_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AttributeStream::new(key.clone(), records)
        .with_deactivated(deactivated.map(|(d,)| d).unwrap_or(false)))
}

async fn write_bounds(
    conn: &mut PgConnection,
    record_id: RecordId,
    bounds: Bounds,
) -> Result<(), TemporalError> {
    sqlx::query(
        r#"
        update interval_records
           set valid_since = $2, valid_until = $3, valid_state = $4
         where record_id = $1
        "#,
    )
    .bind(record_id.0)
    .bind(bounds.since)
    .bind(bounds.until)
    .bind(bounds.state().as_str())
    .execute(&mut *conn)
    .await
    .map_err(|e| map_db_err("update interval bounds", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Relational adapter over the `interval_records` table.
pub struct PgStore {
    pool: PgPool,
    tx: Option<(StreamKey, Transaction<'static, Postgres>)>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn tx_conn(&mut self) -> Result<&mut PgConnection, TemporalError> {
        match self.tx.as_mut() {
            Some((_, tx)) => Ok(&mut **tx),
            None => Err(TemporalError::constraint("no open transaction")),
        }
    }

    /// Opens an implicit transaction when none is open. Returns `true` if it did.
    async fn enter(&mut self, key: &StreamKey) -> Result<bool, TemporalError> {
        ensure_scope(self.tx.as_ref().map(|(k, _)| k), key)?;
        if self.tx.is_some() {
            return Ok(false);
        }
        self.begin(key).await?;
        Ok(true)
    }

    async fn leave<T>(
        &mut self,
        implicit: bool,
        res: Result<T, TemporalError>,
    ) -> Result<T, TemporalError> {
        if !implicit {
            return res;
        }
        match res {
            Ok(v) => {
                self.commit().await?;
                Ok(v)
            }
            Err(e) => {
                self.rollback().await?;
                Err(e)
            }
        }
    }

    async fn insert_in_tx(&mut self, record: &NewIntervalRecord) -> Result<RecordId, TemporalError> {
        let conn = self.tx_conn()?;
        let stream = fetch_stream(conn, &record.key).await?;
        check_insert(&stream, record)?;

        let value = serde_json::to_value(&record.value)
            .map_err(|e| TemporalError::backend("encode attribute value", e))?;

        sqlx::query(
            "insert into entities (entity_id) values ($1) on conflict (entity_id) do nothing",
        )
        .bind(record.key.entity_id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_db_err("insert entity", e))?;

        let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
            r#"
            insert into interval_records (
              entity_id, attribute, value, valid_since, valid_until, valid_state, registered
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            returning record_id
            "#,
        )
        .bind(record.key.entity_id.as_str())
        .bind(record.key.attribute.as_str())
        .bind(value)
        .bind(record.bounds.since)
        .bind(record.bounds.until)
        .bind(record.bounds.state().as_str())
        .bind(record.registered)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_db_err("insert interval record", e))?;

        Ok(RecordId(id))
    }

    async fn close_in_tx(
        &mut self,
        key: &StreamKey,
        at: DateTime<Utc>,
    ) -> Result<RecordId, TemporalError> {
        let conn = self.tx_conn()?;
        let stream = fetch_stream(conn, key).await?;
        let idx = check_close(&stream, at)?;
        let cur = &stream.records[idx];
        write_bounds(conn, cur.record_id, Bounds::new(cur.valid_since, at)).await?;
        Ok(cur.record_id)
    }

    async fn repair_in_tx(
        &mut self,
        key: &StreamKey,
        record_id: RecordId,
        bounds: Bounds,
    ) -> Result<IntervalRecord, TemporalError> {
        let conn = self.tx_conn()?;
        let stream = fetch_stream(conn, key).await?;
        let idx = check_repair(&stream, record_id, bounds)?;
        write_bounds(conn, record_id, bounds).await?;
        let mut out = stream.records[idx].clone();
        out.set_bounds(bounds);
        Ok(out)
    }

    async fn key_of(&mut self, record_id: RecordId) -> Result<StreamKey, TemporalError> {
        let sql = "select entity_id, attribute from interval_records where record_id = $1";
        let row: Option<(String, String)> = match self.tx.as_mut() {
            Some((_, tx)) => sqlx::query_as::<_, (String, String)>(sql)
                .bind(record_id.0)
                .fetch_optional(&mut **tx)
                .await,
            None => sqlx::query_as::<_, (String, String)>(sql)
                .bind(record_id.0)
                .fetch_optional(&self.pool)
                .await,
        }
        .map_err(|e| map_db_err("lookup record", e))?;

        let (entity, attribute) =
            row.ok_or_else(|| TemporalError::not_found(format!("record {record_id}")))?;
        Ok(StreamKey::new(EntityId::parse(&entity)?, Attribute::parse(&attribute)?))
    }
}

#[async_trait]
impl IntervalStore for PgStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Relational
    }

    async fn entities(&mut self) -> Result<Vec<EntityId>, TemporalError> {
        let rows: Vec<(String,)> = sqlx::query_as::<_, (String,)>(
            r#"
            select entity_id from entities
            union
            select distinct entity_id from interval_records
            order by 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("list entities", e))?;

        let mut out = rows
            .into_iter()
            .map(|(e,)| EntityId::parse(&e))
            .collect::<Result<Vec<_>, _>>()?;
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn load_stream(&mut self, key: &StreamKey) -> Result<AttributeStream, TemporalError> {
        match self.tx.as_mut() {
            Some((k, tx)) if k == key => fetch_stream(&mut **tx, key).await,
            _ => {
                let mut conn = self
                    .pool
                    .acquire()
                    .await
                    .map_err(|e| map_db_err("acquire connection", e))?;
                fetch_stream(&mut *conn, key).await
            }
        }
    }

    async fn insert(&mut self, record: NewIntervalRecord) -> Result<RecordId, TemporalError> {
        let implicit = self.enter(&record.key).await?;
        let res = self.insert_in_tx(&record).await;
        if let Ok(id) = &res {
            debug!(entity_id = %record.key.entity_id, attribute = %record.key.attribute, record_id = id.0, "pg insert");
        }
        self.leave(implicit, res).await
    }

    async fn close_current(
        &mut self,
        key: &StreamKey,
        at: DateTime<Utc>,
    ) -> Result<RecordId, TemporalError> {
        let implicit = self.enter(key).await?;
        let res = self.close_in_tx(key, at).await;
        if let Ok(id) = &res {
            debug!(entity_id = %key.entity_id, attribute = %key.attribute, record_id = id.0, "pg close_current");
        }
        self.leave(implicit, res).await
    }

    async fn repair(
        &mut self,
        record_id: RecordId,
        new_since: DateTime<Utc>,
        new_until: DateTime<Utc>,
    ) -> Result<IntervalRecord, TemporalError> {
        let key = self.key_of(record_id).await?;
        let implicit = self.enter(&key).await?;
        let res = self
            .repair_in_tx(&key, record_id, Bounds::new(new_since, new_until))
            .await;
        if res.is_ok() {
            debug!(entity_id = %key.entity_id, attribute = %key.attribute, record_id = record_id.0, "pg repair");
        }
        self.leave(implicit, res).await
    }

    async fn begin(&mut self, key: &StreamKey) -> Result<(), TemporalError> {
        if let Some((open, _)) = &self.tx {
            return Err(TemporalError::constraint(format!(
                "transaction already open for {open}"
            )));
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("begin", e))?;

        // Serialize writers of this stream, including while it is still empty.
        sqlx::query("select pg_advisory_xact_lock(hashtext($1 || '/' || $2))")
            .bind(key.entity_id.as_str())
            .bind(key.attribute.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_err("lock stream", e))?;
        sqlx::query(
            "select record_id from interval_records where entity_id = $1 and attribute = $2 for update",
        )
        .bind(key.entity_id.as_str())
        .bind(key.attribute.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_err("lock stream rows", e))?;

        self.tx = Some((key.clone(), tx));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TemporalError> {
        let (_, tx) = self
            .tx
            .take()
            .ok_or_else(|| TemporalError::constraint("commit without an open transaction"))?;
        tx.commit().await.map_err(|e| map_db_err("commit", e))
    }

    async fn rollback(&mut self) -> Result<(), TemporalError> {
        match self.tx.take() {
            Some((_, tx)) => tx.rollback().await.map_err(|e| map_db_err("rollback", e)),
            None => Ok(()),
        }
    }
}
