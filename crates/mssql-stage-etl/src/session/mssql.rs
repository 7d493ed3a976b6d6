//! SQL Server session over a single tiberius connection.

use super::{SqlSession, TextRow};
use crate::config::DatabaseConfig;
use crate::constraints::{ForeignKeyDescriptor, ReferentialAction};
use crate::error::{MigrateError, Result};
use crate::identifier::TableName;
use crate::inference::InferredValue;
use crate::statement::InsertStatement;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

/// SQL Server "Invalid object name".
const ERROR_INVALID_OBJECT: u32 = 208;

const BEGIN_TRAN: &str = "BEGIN TRAN";
const COMMIT_TRAN: &str = "COMMIT TRAN";
const ROLLBACK_TRAN: &str = "ROLLBACK TRAN";

/// Foreign keys of the whole database, one row per constraint.
const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        fk.name AS fk_name,
        ps.name AS child_schema,
        pt.name AS child_table,
        STUFF((
            SELECT ',' + pc2.name
            FROM sys.foreign_key_columns fkc2
            JOIN sys.columns pc2 ON fkc2.parent_object_id = pc2.object_id AND fkc2.parent_column_id = pc2.column_id
            WHERE fkc2.constraint_object_id = fk.object_id
            ORDER BY fkc2.constraint_column_id
            FOR XML PATH('')
        ), 1, 1, '') AS child_columns,
        rs.name AS ref_schema,
        rt.name AS ref_table,
        STUFF((
            SELECT ',' + rc2.name
            FROM sys.foreign_key_columns fkc2
            JOIN sys.columns rc2 ON fkc2.referenced_object_id = rc2.object_id AND fkc2.referenced_column_id = rc2.column_id
            WHERE fkc2.constraint_object_id = fk.object_id
            ORDER BY fkc2.constraint_column_id
            FOR XML PATH('')
        ), 1, 1, '') AS ref_columns,
        fk.delete_referential_action_desc,
        fk.update_referential_action_desc
    FROM sys.foreign_keys fk
    JOIN sys.tables pt ON fk.parent_object_id = pt.object_id
    JOIN sys.schemas ps ON pt.schema_id = ps.schema_id
    JOIN sys.tables rt ON fk.referenced_object_id = rt.object_id
    JOIN sys.schemas rs ON rt.schema_id = rs.schema_id
    ORDER BY ps.name, pt.name, fk.name
"#;

type TdsClient = Client<Compat<TcpStream>>;

/// One long-lived connection to a SQL Server database.
///
/// Every statement of a run goes through the same connection, so an open
/// transaction covers all inserts issued until commit or rollback.
pub struct MssqlSession {
    label: String,
    client: Mutex<TdsClient>,
}

impl MssqlSession {
    /// Open a connection and verify it with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig, label: &str) -> Result<Self> {
        let tds_config = build_config(config);
        let context = format!("connecting to {} database {}", label, config.display_target());

        let tcp = TcpStream::connect(tds_config.get_addr())
            .await
            .map_err(|e| MigrateError::connection(e, context.clone()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds_config, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::connection(e, context.clone()))?;

        let session = Self {
            label: label.to_string(),
            client: Mutex::new(client),
        };
        session.ping().await?;

        info!("Connected to {} database: {}", label, config.display_target());
        Ok(session)
    }

    /// Run a statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("[{}] {}", self.label, sql);
        let mut client = self.client.lock().await;
        match dispatch(sql) {
            Dispatch::Batch => {
                let stream = client.simple_query(sql).await.map_err(map_server_error)?;
                stream.into_results().await.map_err(map_server_error)?;
            }
            Dispatch::Rpc => {
                client.execute(sql, &[]).await.map_err(map_server_error)?;
            }
        }
        Ok(())
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        debug!("[{}] {}", self.label, sql);
        let mut client = self.client.lock().await;
        let stream = client.simple_query(sql).await.map_err(map_server_error)?;
        let rows = stream.into_first_result().await.map_err(map_server_error)?;
        Ok(rows)
    }
}

/// How a statement without parameters reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Plain SQL batch (`simple_query`).
    Batch,
    /// `sp_executesql` call (`execute`).
    Rpc,
}

/// Transaction control must run as a plain batch. Inside `sp_executesql` the
/// server rejects a BEGIN or COMMIT that leaves the call with a different
/// transaction count (error 266).
fn dispatch(sql: &str) -> Dispatch {
    match sql {
        BEGIN_TRAN | COMMIT_TRAN | ROLLBACK_TRAN => Dispatch::Batch,
        _ => Dispatch::Rpc,
    }
}

fn build_config(config: &DatabaseConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.port);
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));

    if config.encryption_enabled() {
        if config.trust_server_cert {
            tds.trust_cert();
        }
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }

    tds
}

/// Map "invalid object name" to [`MigrateError::SchemaObjectMissing`].
fn map_server_error(e: tiberius::error::Error) -> MigrateError {
    match &e {
        tiberius::error::Error::Server(token) if token.code() == ERROR_INVALID_OBJECT => {
            MigrateError::SchemaObjectMissing(token.message().to_string())
        }
        _ => MigrateError::Database(e),
    }
}

fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn foreign_key_from_row(row: &Row) -> ForeignKeyDescriptor {
    let text = |idx: usize| row.get::<&str, _>(idx).unwrap_or_default().to_string();
    ForeignKeyDescriptor {
        constraint_name: text(0),
        child_table: TableName::qualified(text(1), text(2)),
        child_columns: split_columns(&text(3)),
        parent_table: TableName::qualified(text(4), text(5)),
        parent_columns: split_columns(&text(6)),
        on_delete: ReferentialAction::from_catalog(&text(7)),
        on_update: ReferentialAction::from_catalog(&text(8)),
    }
}

/// Render one column value as text. NULL becomes `None`.
fn column_to_text(data: &ColumnData<'static>) -> Result<Option<String>> {
    let text = match data {
        ColumnData::U8(v) => v.map(|n| n.to_string()),
        ColumnData::I16(v) => v.map(|n| n.to_string()),
        ColumnData::I32(v) => v.map(|n| n.to_string()),
        ColumnData::I64(v) => v.map(|n| n.to_string()),
        ColumnData::F32(v) => v.map(|n| n.to_string()),
        ColumnData::F64(v) => v.map(|n| n.to_string()),
        ColumnData::Bit(v) => v.map(|b| if b { "True" } else { "False" }.to_string()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string()),
        ColumnData::Binary(v) => v.as_ref().map(hex::encode),
        ColumnData::Numeric(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::Xml(v) => v.as_ref().map(|x| x.clone().into_owned().into_string()),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?.map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)?.map(|d| d.format("%Y-%m-%d").to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?.map(|t| t.to_string()),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<FixedOffset>::from_sql(data)?.map(|dt| dt.to_rfc3339())
        }
    };
    Ok(text)
}

fn row_to_text(row: Row) -> Result<TextRow> {
    row.into_iter().map(|data| column_to_text(&data)).collect()
}

#[async_trait]
impl SqlSession for MssqlSession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn ping(&self) -> Result<()> {
        self.query_rows("SELECT 1").await?;
        Ok(())
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyDescriptor>> {
        let rows = self.query_rows(FOREIGN_KEYS_QUERY).await?;
        Ok(rows.iter().map(foreign_key_from_row).collect())
    }

    async fn drop_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        self.execute(&fk.drop_sql()?).await
    }

    async fn add_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        self.execute(&fk.add_sql()?).await
    }

    async fn select_all(&self, table: &TableName) -> Result<Vec<TextRow>> {
        let sql = format!("SELECT * FROM {}", table.quoted()?);
        let rows = self.query_rows(&sql).await?;
        rows.into_iter().map(row_to_text).collect()
    }

    async fn truncate(&self, table: &TableName) -> Result<()> {
        self.execute(&format!("TRUNCATE TABLE {}", table.quoted()?))
            .await
    }

    async fn count_rows(&self, table: &TableName) -> Result<i64> {
        let sql = format!("SELECT COUNT_BIG(*) FROM {}", table.quoted()?);
        let rows = self.query_rows(&sql).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get::<i64, _>(0))
            .unwrap_or(0))
    }

    async fn insert(&self, stmt: &InsertStatement) -> Result<u64> {
        let sql = stmt.sql()?;
        let mut query = Query::new(sql);
        for value in stmt.values() {
            match value {
                InferredValue::Integer(n) => query.bind(*n),
                InferredValue::Decimal { rounded, .. } => query.bind(*rounded),
                InferredValue::Date(d) => query.bind(*d),
                InferredValue::Text(s) => query.bind(s.clone()),
            }
        }

        let mut client = self.client.lock().await;
        let result = query.execute(&mut *client).await.map_err(map_server_error)?;
        Ok(result.total())
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.execute(BEGIN_TRAN).await
    }

    async fn commit(&self) -> Result<()> {
        self.execute(COMMIT_TRAN).await
    }

    async fn rollback(&self) -> Result<()> {
        self.execute(ROLLBACK_TRAN).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn db(encrypt: &str) -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".into(),
            port: 1433,
            database: "AmazonKP".into(),
            user: "sa".into(),
            password: "secret".into(),
            schema: "dbo".into(),
            encrypt: encrypt.into(),
            trust_server_cert: true,
        }
    }

    #[test]
    fn test_build_config_addr() {
        let tds = build_config(&db("false"));
        assert_eq!(tds.get_addr(), "localhost:1433");
    }

    #[test]
    fn test_column_to_text_scalars() {
        assert_eq!(column_to_text(&ColumnData::I32(Some(42))).unwrap(), Some("42".into()));
        assert_eq!(column_to_text(&ColumnData::I32(None)).unwrap(), None);
        assert_eq!(column_to_text(&ColumnData::Bit(Some(true))).unwrap(), Some("True".into()));
        assert_eq!(
            column_to_text(&ColumnData::String(Some(Cow::Borrowed("O'Brien")))).unwrap(),
            Some("O'Brien".into())
        );
        assert_eq!(
            column_to_text(&ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad])))).unwrap(),
            Some("dead".into())
        );
    }

    #[test]
    fn test_transaction_control_runs_as_batch() {
        assert_eq!(dispatch(BEGIN_TRAN), Dispatch::Batch);
        assert_eq!(dispatch(COMMIT_TRAN), Dispatch::Batch);
        assert_eq!(dispatch(ROLLBACK_TRAN), Dispatch::Batch);
    }

    #[test]
    fn test_ddl_runs_as_rpc() {
        let fk = ForeignKeyDescriptor::new(
            "FK_Sales_Customer",
            TableName::parse("dbo.SalesKP").unwrap(),
            "CustomerID",
            TableName::parse("dbo.CustomerKP").unwrap(),
            "CustomerID",
        );
        let truncate = format!("TRUNCATE TABLE {}", fk.child_table.quoted().unwrap());
        assert_eq!(dispatch(&fk.drop_sql().unwrap()), Dispatch::Rpc);
        assert_eq!(dispatch(&fk.add_sql().unwrap()), Dispatch::Rpc);
        assert_eq!(dispatch(&truncate), Dispatch::Rpc);
    }

    #[test]
    fn test_split_columns() {
        assert_eq!(split_columns("OrderID,LineNo"), vec!["OrderID", "LineNo"]);
        assert!(split_columns("").is_empty());
    }
}
