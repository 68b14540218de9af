//! MySQL history store.
//!
//! On connect the adapter creates the database if needed, then the history
//! tables `sendtx`, `metering`, `setbalancetx`, `setstaketx`,
//! `setvalidatortx` and `account`. Transaction tables are keyed by `txhash`,
//! `account` by `address`. Every statement binds its values as parameters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{info, warn};

use crate::config::validate_db_name;
use crate::domain::{Account, StorageError, TransactionRecord};
use crate::ports::HistoryStorage;
use crate::LOG_MODULE;

const MAX_CONNECTIONS: u32 = 8;

const SCHEMA: [&str; 6] = [
    "CREATE TABLE IF NOT EXISTS `sendtx` (
        `txhash` VARCHAR(255) NOT NULL,
        `txtype` VARCHAR(255) DEFAULT NULL,
        `height` BIGINT(20) DEFAULT 0,
        `index` INT(11) DEFAULT 0,
        `time` VARCHAR(255) DEFAULT NULL,
        `fromaddress` VARCHAR(255) DEFAULT NULL,
        `toaddress` VARCHAR(255) DEFAULT NULL,
        `amount` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`txhash`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
    "CREATE TABLE IF NOT EXISTS `metering` (
        `txhash` VARCHAR(255) NOT NULL,
        `txtype` VARCHAR(255) DEFAULT NULL,
        `height` BIGINT(20) DEFAULT 0,
        `index` INT(11) DEFAULT 0,
        `time` VARCHAR(255) DEFAULT NULL,
        `dc` VARCHAR(255) DEFAULT NULL,
        `ns` VARCHAR(255) DEFAULT NULL,
        `value` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`txhash`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
    "CREATE TABLE IF NOT EXISTS `setbalancetx` (
        `txhash` VARCHAR(255) NOT NULL,
        `txtype` VARCHAR(255) DEFAULT NULL,
        `height` BIGINT(20) DEFAULT 0,
        `index` INT(11) DEFAULT 0,
        `time` VARCHAR(255) DEFAULT NULL,
        `address` VARCHAR(255) DEFAULT NULL,
        `amount` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`txhash`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
    "CREATE TABLE IF NOT EXISTS `setstaketx` (
        `txhash` VARCHAR(255) NOT NULL,
        `txtype` VARCHAR(255) DEFAULT NULL,
        `height` BIGINT(20) DEFAULT 0,
        `index` INT(11) DEFAULT 0,
        `time` VARCHAR(255) DEFAULT NULL,
        `amount` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`txhash`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
    "CREATE TABLE IF NOT EXISTS `setvalidatortx` (
        `txhash` VARCHAR(255) NOT NULL,
        `txtype` VARCHAR(255) DEFAULT NULL,
        `height` BIGINT(20) DEFAULT 0,
        `index` INT(11) DEFAULT 0,
        `time` VARCHAR(255) DEFAULT NULL,
        `validatorpubkey` VARCHAR(255) DEFAULT NULL,
        `power` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`txhash`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
    "CREATE TABLE IF NOT EXISTS `account` (
        `address` VARCHAR(255) NOT NULL,
        `balance` VARCHAR(255) DEFAULT NULL,
        PRIMARY KEY (`address`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8",
];

/// Format of the `time` column.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(sqlx::FromRow)]
struct AccountRow {
    address: String,
    balance: String,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account::new(row.address, row.balance)
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::DuplicateKey(db.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StorageError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => StorageError::Serialization(err.to_string()),
            _ => StorageError::Query(err.to_string()),
        }
    }
}

/// `HistoryStorage` backed by a MySQL connection pool.
pub struct MySqlHistoryStore {
    pool: MySqlPool,
}

impl MySqlHistoryStore {
    /// Connect, creating the database and tables when missing.
    ///
    /// `host` is `user:pass@host:port`, optionally with a `mysql://` scheme
    /// or in `user:pass@tcp(host:port)` form.
    pub async fn connect(host: &str, db_name: &str) -> Result<Self, StorageError> {
        let db_name = validate_db_name(db_name).map_err(|e| StorageError::Config(e.to_string()))?;
        let server = server_url(host);

        let admin = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(&server)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        sqlx::query(&create_database_sql(db_name))
            .execute(&admin)
            .await
            .map_err(|e| StorageError::Schema(e.to_string()))?;
        admin.close().await;

        let pool = MySqlPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&database_url(&server, db_name))
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| StorageError::Schema(e.to_string()))?;
        }

        info!(module = LOG_MODULE, db_name, "MySQL history store ready");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl HistoryStorage for MySqlHistoryStore {
    async fn add_transaction_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        let head = record.head();
        let time = sql_time(&head.time);
        let query = match record {
            TransactionRecord::SendTx(tx) => sqlx::query(
                "INSERT INTO `sendtx` \
                 (`txhash`, `txtype`, `height`, `index`, `time`, \
                 `fromaddress`, `toaddress`, `amount`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&head.tx_hash)
            .bind(&head.tx_type)
            .bind(head.height)
            .bind(head.index)
            .bind(&time)
            .bind(&tx.from_address)
            .bind(&tx.to_address)
            .bind(&tx.amount),
            TransactionRecord::Metering(tx) => sqlx::query(
                "INSERT INTO `metering` \
                 (`txhash`, `txtype`, `height`, `index`, `time`, `dc`, `ns`, `value`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&head.tx_hash)
            .bind(&head.tx_type)
            .bind(head.height)
            .bind(head.index)
            .bind(&time)
            .bind(&tx.dc)
            .bind(&tx.ns)
            .bind(&tx.value),
            TransactionRecord::SetBalanceTx(tx) => sqlx::query(
                "INSERT INTO `setbalancetx` \
                 (`txhash`, `txtype`, `height`, `index`, `time`, `address`, `amount`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&head.tx_hash)
            .bind(&head.tx_type)
            .bind(head.height)
            .bind(head.index)
            .bind(&time)
            .bind(&tx.address)
            .bind(&tx.amount),
            TransactionRecord::SetStakeTx(tx) => sqlx::query(
                "INSERT INTO `setstaketx` \
                 (`txhash`, `txtype`, `height`, `index`, `time`, `amount`) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&head.tx_hash)
            .bind(&head.tx_type)
            .bind(head.height)
            .bind(head.index)
            .bind(&time)
            .bind(&tx.amount),
            TransactionRecord::SetValidatorTx(tx) => sqlx::query(
                "INSERT INTO `setvalidatortx` \
                 (`txhash`, `txtype`, `height`, `index`, `time`, `validatorpubkey`, `power`) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&head.tx_hash)
            .bind(&head.tx_type)
            .bind(head.height)
            .bind(head.index)
            .bind(&time)
            .bind(&tx.validator_pubkey)
            .bind(&tx.power),
        };
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<Option<Account>, StorageError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT `address`, `balance` FROM `account` WHERE `address` = ?",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Account::from))
    }

    async fn add_account(&self, account: &Account) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO `account` (`address`, `balance`) VALUES (?, ?)")
            .bind(&account.address)
            .bind(&account.balance)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_account_balance(
        &self,
        address: &str,
        balance: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE `account` SET `balance` = ? WHERE `address` = ?")
            .bind(balance)
            .bind(address)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            warn!(module = LOG_MODULE, address, "Balance update matched no account");
        }
        Ok(())
    }
}

/// Server URL without a database path.
fn server_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let host = host.strip_prefix("mysql://").unwrap_or(host);
    let host = match host.split_once("@tcp(") {
        Some((credentials, rest)) => format!("{credentials}@{}", rest.trim_end_matches(')')),
        None => host.to_string(),
    };
    format!("mysql://{host}")
}

fn database_url(server: &str, db_name: &str) -> String {
    format!("{server}/{db_name}")
}

/// Text stored in the `time` column, UTC with microseconds.
fn sql_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// `db_name` must already be validated.
fn create_database_sql(db_name: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS `{db_name}`")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_url_forms() {
        assert_eq!(
            server_url("root:pw@localhost:3306"),
            "mysql://root:pw@localhost:3306"
        );
        assert_eq!(
            server_url("mysql://root:pw@db:3306/"),
            "mysql://root:pw@db:3306"
        );
        assert_eq!(
            server_url("root:pw@tcp(127.0.0.1:3306)"),
            "mysql://root:pw@127.0.0.1:3306"
        );
    }

    #[test]
    fn test_database_url() {
        assert_eq!(
            database_url("mysql://root@db:3306", "history"),
            "mysql://root@db:3306/history"
        );
    }

    #[test]
    fn test_create_database_quotes_name() {
        assert_eq!(
            create_database_sql("history"),
            "CREATE DATABASE IF NOT EXISTS `history`"
        );
    }

    #[test]
    fn test_schema_matches_history_tables() {
        let tables = [
            "sendtx",
            "metering",
            "setbalancetx",
            "setstaketx",
            "setvalidatortx",
        ];
        for (ddl, table) in SCHEMA.iter().zip(tables) {
            assert!(ddl.contains(&format!("CREATE TABLE IF NOT EXISTS `{table}` (")));
            assert!(ddl.contains("`txhash` VARCHAR(255) NOT NULL"));
            assert!(ddl.contains("PRIMARY KEY (`txhash`)"));
            assert!(ddl.contains("`txtype`"));
            assert!(ddl.contains("`index` INT(11)"));
        }
        assert!(SCHEMA[0].contains("`fromaddress`") && SCHEMA[0].contains("`toaddress`"));
        assert!(SCHEMA[4].contains("`validatorpubkey`"));
        assert!(SCHEMA[5].contains("CREATE TABLE IF NOT EXISTS `account` ("));
        assert!(SCHEMA[5].contains("PRIMARY KEY (`address`)"));
        assert!(SCHEMA.iter().all(|ddl| !ddl.contains("tx_hash")));
    }

    #[test]
    fn test_time_column_text() {
        let time = DateTime::parse_from_rfc3339("2019-06-01T12:30:45.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(sql_time(&time), "2019-06-01 12:30:45.123456");
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        assert!(matches!(
            StorageError::from(sqlx::Error::PoolTimedOut),
            StorageError::Connection(_)
        ));
        assert!(matches!(
            StorageError::from(sqlx::Error::RowNotFound),
            StorageError::Query(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_db_name() {
        let err = MySqlHistoryStore::connect("root@localhost:3306", "bad-name")
            .await
            .err();
        assert!(matches!(err, Some(StorageError::Config(_))));
    }
}
