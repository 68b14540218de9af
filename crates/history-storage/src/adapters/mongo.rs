//! MongoDB history store.
//!
//! Records of every kind share the `transaction` collection, unique on
//! `txhash` + `txtype`; accounts live in `account`, unique on `address`.
//! Field names are lower-case. The driver client is created once per
//! process; each call runs inside its own session.

use async_trait::async_trait;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::validate_db_name;
use crate::domain::{Account, StorageError, TransactionRecord};
use crate::ports::HistoryStorage;
use crate::LOG_MODULE;

const ACCOUNT_COLLECTION: &str = "account";
const TRANSACTION_COLLECTION: &str = "transaction";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Process-wide client and the URI it was built from.
static CLIENT: OnceCell<(String, Client)> = OnceCell::const_new();

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write))
                if write.code == DUPLICATE_KEY_CODE =>
            {
                StorageError::DuplicateKey(write.message.clone())
            }
            ErrorKind::Command(command) if command.code == DUPLICATE_KEY_CODE => {
                StorageError::DuplicateKey(command.message.clone())
            }
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => StorageError::Connection(err.to_string()),
            ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
                StorageError::Serialization(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        }
    }
}

/// `HistoryStorage` backed by a MongoDB database.
pub struct MongoHistoryStore {
    client: &'static Client,
    db: Database,
    indexes: OnceCell<()>,
}

impl MongoHistoryStore {
    /// Connect to `host` and check the server answers a ping.
    ///
    /// `host` is a `mongodb://` or `mongodb+srv://` URI, or a bare
    /// `host:port`. All stores in a process share one client, so every call
    /// must use the same host.
    pub async fn connect(host: &str, db_name: &str) -> Result<Self, StorageError> {
        let db_name = validate_db_name(db_name).map_err(|e| StorageError::Config(e.to_string()))?;
        let client = shared_client(&connection_uri(host)).await?;
        let db = client.database(db_name);

        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!(module = LOG_MODULE, db_name, "MongoDB history store ready");
        Ok(Self {
            client,
            db,
            indexes: OnceCell::new(),
        })
    }

    fn accounts(&self) -> Collection<Document> {
        self.db.collection(ACCOUNT_COLLECTION)
    }

    fn transactions(&self) -> Collection<Document> {
        self.db.collection(TRANSACTION_COLLECTION)
    }

    async fn session(&self) -> Result<ClientSession, StorageError> {
        self.ensure_indexes().await?;
        Ok(self.client.start_session(None).await?)
    }

    /// Create both unique indexes on first use.
    async fn ensure_indexes(&self) -> Result<(), StorageError> {
        self.indexes
            .get_or_try_init(|| async {
                let unique = || IndexOptions::builder().unique(true).build();
                self.accounts()
                    .create_index(
                        IndexModel::builder()
                            .keys(doc! { "address": 1 })
                            .options(unique())
                            .build(),
                        None,
                    )
                    .await
                    .map_err(|e| StorageError::Schema(e.to_string()))?;
                self.transactions()
                    .create_index(
                        IndexModel::builder()
                            .keys(doc! { "txhash": 1, "txtype": 1 })
                            .options(unique())
                            .build(),
                        None,
                    )
                    .await
                    .map_err(|e| StorageError::Schema(e.to_string()))?;
                Ok::<(), StorageError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStorage for MongoHistoryStore {
    async fn add_transaction_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        let mut session = self.session().await?;
        self.transactions()
            .insert_one_with_session(record_document(record), None, &mut session)
            .await?;
        Ok(())
    }

    async fn get_account(&self, address: &str) -> Result<Option<Account>, StorageError> {
        let mut session = self.session().await?;
        let found = self
            .accounts()
            .find_one_with_session(doc! { "address": address }, None, &mut session)
            .await?;
        found.as_ref().map(account_from_document).transpose()
    }

    async fn add_account(&self, account: &Account) -> Result<(), StorageError> {
        let mut session = self.session().await?;
        self.accounts()
            .insert_one_with_session(account_document(account), None, &mut session)
            .await?;
        Ok(())
    }

    async fn update_account_balance(
        &self,
        address: &str,
        balance: &str,
    ) -> Result<(), StorageError> {
        let mut session = self.session().await?;
        let result = self
            .accounts()
            .update_one_with_session(
                doc! { "address": address },
                doc! { "$set": { "balance": balance } },
                None,
                &mut session,
            )
            .await?;
        if result.matched_count == 0 {
            warn!(module = LOG_MODULE, address, "Balance update matched no account");
        }
        Ok(())
    }
}

async fn shared_client(uri: &str) -> Result<&'static Client, StorageError> {
    let (bound_uri, client) = CLIENT
        .get_or_try_init(|| async {
            let options = ClientOptions::parse(uri)
                .await
                .map_err(|e| StorageError::Config(e.to_string()))?;
            let client =
                Client::with_options(options).map_err(|e| StorageError::Connection(e.to_string()))?;
            Ok::<_, StorageError>((uri.to_string(), client))
        })
        .await?;

    if bound_uri != uri {
        return Err(StorageError::Config(format!(
            "MongoDB client already bound to {bound_uri}, cannot connect to {uri}"
        )));
    }
    Ok(client)
}

fn connection_uri(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("mongodb://") || host.starts_with("mongodb+srv://") {
        host.to_string()
    } else {
        format!("mongodb://{host}")
    }
}

fn account_document(account: &Account) -> Document {
    doc! {
        "address": account.address.as_str(),
        "balance": account.balance.as_str(),
    }
}

fn account_from_document(document: &Document) -> Result<Account, StorageError> {
    let field = |name: &str| {
        document
            .get_str(name)
            .map(str::to_string)
            .map_err(|e| StorageError::Serialization(format!("account.{name}: {e}")))
    };
    Ok(Account::new(field("address")?, field("balance")?))
}

fn record_document(record: &TransactionRecord) -> Document {
    let head = record.head();
    let mut document = doc! {
        "txhash": head.tx_hash.as_str(),
        "txtype": head.tx_type.as_str(),
        "height": head.height,
        "index": i64::from(head.index),
        "time": BsonDateTime::from_millis(head.time.timestamp_millis()),
    };
    let body = match record {
        TransactionRecord::SendTx(tx) => doc! {
            "fromaddress": tx.from_address.as_str(),
            "toaddress": tx.to_address.as_str(),
            "amount": tx.amount.as_str(),
        },
        TransactionRecord::Metering(tx) => doc! {
            "dc": tx.dc.as_str(),
            "ns": tx.ns.as_str(),
            "value": tx.value.as_str(),
        },
        TransactionRecord::SetBalanceTx(tx) => doc! {
            "address": tx.address.as_str(),
            "amount": tx.amount.as_str(),
        },
        TransactionRecord::SetStakeTx(tx) => doc! { "amount": tx.amount.as_str() },
        TransactionRecord::SetValidatorTx(tx) => doc! {
            "validatorpubkey": tx.validator_pubkey.as_str(),
            "power": tx.power.as_str(),
        },
    };
    document.extend(body);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SendTx, SetValidatorTx, TransactionHead};
    use chrono::{TimeZone, Utc};

    fn head(tx_type: &str) -> TransactionHead {
        TransactionHead {
            tx_hash: "ABCDEF".into(),
            tx_type: tx_type.into(),
            height: 42,
            index: 3,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_connection_uri_forms() {
        assert_eq!(connection_uri("localhost:27017"), "mongodb://localhost:27017");
        assert_eq!(connection_uri("mongodb://db:27017"), "mongodb://db:27017");
        assert_eq!(
            connection_uri("mongodb+srv://cluster.example.net"),
            "mongodb+srv://cluster.example.net"
        );
    }

    #[test]
    fn test_send_document_fields() {
        let record = TransactionRecord::SendTx(SendTx {
            head: head("Send"),
            from_address: "A".into(),
            to_address: "B".into(),
            amount: "500".into(),
        });
        let document = record_document(&record);

        assert_eq!(document.get_str("txhash").unwrap(), "ABCDEF");
        assert_eq!(document.get_str("txtype").unwrap(), "Send");
        assert_eq!(document.get_i64("height").unwrap(), 42);
        assert_eq!(document.get_i64("index").unwrap(), 3);
        assert_eq!(
            document.get_datetime("time").unwrap().timestamp_millis(),
            head("Send").time.timestamp_millis()
        );
        assert_eq!(document.get_str("fromaddress").unwrap(), "A");
        assert_eq!(document.get_str("toaddress").unwrap(), "B");
        assert_eq!(document.get_str("amount").unwrap(), "500");
    }

    #[test]
    fn test_validator_document_uses_lowercase_power() {
        let record = TransactionRecord::SetValidatorTx(SetValidatorTx {
            head: head("UpdateValidator"),
            validator_pubkey: "PK".into(),
            power: "10".into(),
        });
        let document = record_document(&record);
        assert_eq!(document.get_str("validatorpubkey").unwrap(), "PK");
        assert_eq!(document.get_str("power").unwrap(), "10");
        assert!(document.get("Power").is_none());
    }

    #[test]
    fn test_account_document_round_trip() {
        let account = Account::new("ADDR", "123");
        let back = account_from_document(&account_document(&account)).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_account_with_non_string_balance_is_serialization_error() {
        let document = doc! { "address": "ADDR", "balance": 5_i64 };
        assert!(matches!(
            account_from_document(&document),
            Err(StorageError::Serialization(_))
        ));
    }
}
