//! Customer directory: identity lookup, open invoices, and persisted service records.
//!
//! The engine only sees [`CustomerGateway`]. [`FileDirectory`] serves customers and
//! invoices from a JSON file and keeps service records in a second JSON file.

use crate::identity;
use crate::session::TranscriptEntry;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Resolved customer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub customer_id: String,
    /// Punctuated tax id (`XX.XXX.XXX/XXXX-XX`).
    pub tax_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// An open invoice (boleto).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub number: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub typable_line: String,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub payment_url: String,
}

/// Persisted audit record of one service session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub correlation_id: String,
    pub customer_id: String,
    pub tax_id: String,
    pub started_at: DateTime<Utc>,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory data invalid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Lookup and persistence operations the dialogue engine depends on.
#[async_trait]
pub trait CustomerGateway: Send + Sync {
    async fn lookup_by_phone(&self, canonical_phone: &str) -> Result<Option<Customer>, DirectoryError>;

    async fn lookup_by_tax_id(&self, formatted_tax_id: &str) -> Result<Option<Customer>, DirectoryError>;

    /// Open invoices for the tax id, ascending by due date.
    async fn list_open_invoices(&self, tax_id: &str) -> Result<Vec<Invoice>, DirectoryError>;

    async fn record_service_session(
        &self,
        correlation_id: &str,
        customer_id: &str,
        tax_id: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<(), DirectoryError>;

    async fn update_transcript(
        &self,
        correlation_id: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<(), DirectoryError>;

    /// Health check.
    async fn ping(&self) -> Result<(), DirectoryError> {
        Ok(())
    }
}

/// On-disk layout of the directory file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryData {
    #[serde(default)]
    pub customers: Vec<Customer>,
    /// Invoices keyed to a customer by tax id.
    #[serde(default)]
    pub invoices: Vec<DirectoryInvoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryInvoice {
    pub tax_id: String,
    #[serde(flatten)]
    pub invoice: Invoice,
}

/// JSON-file backed directory.
pub struct FileDirectory {
    path: PathBuf,
    records_path: PathBuf,
    data: RwLock<DirectoryData>,
    records: RwLock<Vec<ServiceRecord>>,
    /// Held across snapshot and write so saves land in order.
    save_lock: Mutex<()>,
}

impl FileDirectory {
    /// Load the directory file and any saved records. A missing directory file is an
    /// error (`wabot init` creates one); a missing records file starts empty, an
    /// unreadable one is an error so existing records are never overwritten.
    pub async fn load(
        path: impl AsRef<Path>,
        records_path: impl AsRef<Path>,
    ) -> Result<Self, DirectoryError> {
        let path = path.as_ref().to_path_buf();
        let records_path = records_path.as_ref().to_path_buf();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DirectoryError::Unavailable(format!(
                    "directory file not found: {} (run `wabot init`)",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let records = match tokio::fs::read_to_string(&records_path).await {
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                DirectoryError::Unavailable(format!(
                    "service records at {} unreadable: {}",
                    records_path.display(),
                    e
                ))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_parts(path, records_path, data, records))
    }

    fn from_parts(
        path: PathBuf,
        records_path: PathBuf,
        data: DirectoryData,
        records: Vec<ServiceRecord>,
    ) -> Self {
        log::info!(
            "directory loaded: {} customer(s), {} invoice(s)",
            data.customers.len(),
            data.invoices.len()
        );
        Self {
            path,
            records_path,
            data: RwLock::new(data),
            records: RwLock::new(records),
            save_lock: Mutex::new(()),
        }
    }

    /// Service record for a correlation id, if one was persisted.
    pub async fn record(&self, correlation_id: &str) -> Option<ServiceRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.correlation_id == correlation_id)
            .cloned()
    }

    /// Write all records to a temp file, then rename it over the records file.
    async fn save_records(&self) -> Result<(), DirectoryError> {
        let _saving = self.save_lock.lock().await;
        let json = {
            let records = self.records.read().await;
            serde_json::to_string_pretty(&*records)?
        };
        if let Some(parent) = self.records_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.records_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.records_path).await?;
        Ok(())
    }
}

#[async_trait]
impl CustomerGateway for FileDirectory {
    async fn lookup_by_phone(&self, canonical_phone: &str) -> Result<Option<Customer>, DirectoryError> {
        let data = self.data.read().await;
        Ok(data
            .customers
            .iter()
            .find(|c| {
                c.phone
                    .as_deref()
                    .map(|p| identity::normalize_phone(p) == canonical_phone)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn lookup_by_tax_id(&self, formatted_tax_id: &str) -> Result<Option<Customer>, DirectoryError> {
        let wanted = identity::digits(formatted_tax_id);
        let data = self.data.read().await;
        Ok(data
            .customers
            .iter()
            .find(|c| identity::digits(&c.tax_id) == wanted)
            .cloned())
    }

    async fn list_open_invoices(&self, tax_id: &str) -> Result<Vec<Invoice>, DirectoryError> {
        let wanted = identity::digits(tax_id);
        let data = self.data.read().await;
        let mut out: Vec<Invoice> = data
            .invoices
            .iter()
            .filter(|i| identity::digits(&i.tax_id) == wanted)
            .map(|i| i.invoice.clone())
            .collect();
        out.sort_by_key(|i| i.due_date);
        Ok(out)
    }

    async fn record_service_session(
        &self,
        correlation_id: &str,
        customer_id: &str,
        tax_id: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<(), DirectoryError> {
        let record = ServiceRecord {
            correlation_id: correlation_id.to_string(),
            customer_id: customer_id.to_string(),
            tax_id: tax_id.to_string(),
            started_at: Utc::now(),
            transcript: transcript.to_vec(),
        };
        {
            let mut records = self.records.write().await;
            records.retain(|r| r.correlation_id != correlation_id);
            records.push(record);
        }
        self.save_records().await
    }

    async fn update_transcript(
        &self,
        correlation_id: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<(), DirectoryError> {
        {
            let mut records = self.records.write().await;
            let Some(record) = records
                .iter_mut()
                .find(|r| r.correlation_id == correlation_id)
            else {
                log::debug!("directory: no service record for {}, skipping update", correlation_id);
                return Ok(());
            };
            record.transcript = transcript.to_vec();
        }
        self.save_records().await
    }

    async fn ping(&self) -> Result<(), DirectoryError> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| DirectoryError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Speaker;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wabot-directory-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_directory(dir: &Path) -> PathBuf {
        let path = dir.join("directory.json");
        let json = serde_json::json!({
            "customers": [
                {
                    "customerId": "C1",
                    "taxId": "12.345.678/0001-99",
                    "name": "Padaria Central",
                    "phone": "(31) 8888-7777"
                }
            ],
            "invoices": [
                {
                    "taxId": "12.345.678/0001-99",
                    "number": "202",
                    "amount": "1500.00",
                    "dueDate": "2026-12-10",
                    "typableLine": "2",
                    "paymentUrl": "https://pay/2"
                },
                {
                    "taxId": "12.345.678/0001-99",
                    "number": "101",
                    "amount": 99.9,
                    "dueDate": "2026-11-01",
                    "typableLine": "1",
                    "paymentUrl": "https://pay/1"
                },
                {
                    "taxId": "98.765.432/0001-10",
                    "number": "900",
                    "amount": "1",
                    "dueDate": "2026-01-01"
                }
            ]
        });
        std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn lookups_match_canonical_phone_and_tax_digits() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let d = FileDirectory::load(&path, dir.join("records.json")).await.unwrap();

        let by_phone = d.lookup_by_phone("5531988887777").await.unwrap().unwrap();
        assert_eq!(by_phone.customer_id, "C1");
        let by_tax = d.lookup_by_tax_id("12.345.678/0001-99").await.unwrap().unwrap();
        assert_eq!(by_tax.name, "Padaria Central");
        assert!(d.lookup_by_tax_id("11.111.111/1111-11").await.unwrap().is_none());
        assert!(d.ping().await.is_ok());
    }

    #[tokio::test]
    async fn invoices_are_filtered_and_sorted_by_due_date() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let d = FileDirectory::load(&path, dir.join("records.json")).await.unwrap();
        let invoices = d.list_open_invoices("12.345.678/0001-99").await.unwrap();
        let numbers: Vec<&str> = invoices.iter().map(|i| i.number.as_str()).collect();
        assert_eq!(numbers, vec!["101", "202"]);
    }

    #[tokio::test]
    async fn records_persist_and_update_by_correlation_id() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let records_path = dir.join("records.json");
        let d = FileDirectory::load(&path, &records_path).await.unwrap();

        let mut transcript = vec![TranscriptEntry {
            speaker: Speaker::Customer,
            at: "2026-01-01 10:00:00".into(),
            text: "oi".into(),
        }];
        d.update_transcript("MSG1", &transcript).await.unwrap();
        assert!(d.record("MSG1").await.is_none());

        d.record_service_session("MSG1", "C1", "12.345.678/0001-99", &transcript)
            .await
            .unwrap();
        transcript.push(TranscriptEntry {
            speaker: Speaker::Bot,
            at: "2026-01-01 10:00:01".into(),
            text: "olá".into(),
        });
        d.update_transcript("MSG1", &transcript).await.unwrap();

        let reloaded = FileDirectory::load(&path, &records_path).await.unwrap();
        let record = reloaded.record("MSG1").await.unwrap();
        assert_eq!(record.customer_id, "C1");
        assert_eq!(record.transcript.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_file_is_an_error() {
        let dir = temp_dir();
        let err = FileDirectory::load(dir.join("absent.json"), dir.join("r.json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn ping_fails_once_the_directory_file_disappears() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let d = FileDirectory::load(&path, dir.join("r.json")).await.unwrap();
        assert!(d.ping().await.is_ok());
        std::fs::remove_file(&path).unwrap();
        assert!(d.ping().await.is_err());
    }

    #[tokio::test]
    async fn corrupt_records_file_is_not_discarded() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let records_path = dir.join("records.json");
        std::fs::write(&records_path, "[{\"correlationId\": \"MSG1\"").unwrap();
        assert!(FileDirectory::load(&path, &records_path).await.is_err());
        let raw = std::fs::read_to_string(&records_path).unwrap();
        assert!(raw.contains("MSG1"));
    }

    #[tokio::test]
    async fn concurrent_saves_leave_a_readable_records_file() {
        let dir = temp_dir();
        let path = write_directory(&dir);
        let records_path = dir.join("records.json");
        let d = std::sync::Arc::new(FileDirectory::load(&path, &records_path).await.unwrap());
        let transcript: Vec<TranscriptEntry> = (0..50)
            .map(|i| TranscriptEntry {
                speaker: Speaker::Customer,
                at: "2026-01-01 10:00:00".into(),
                text: format!("line {}", i),
            })
            .collect();

        let mut tasks = Vec::new();
        for n in 0..20 {
            let d = d.clone();
            let transcript = transcript.clone();
            tasks.push(tokio::spawn(async move {
                d.record_service_session(&format!("MSG{}", n), "C1", "12.345.678/0001-99", &transcript)
                    .await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        let reloaded = FileDirectory::load(&path, &records_path).await.unwrap();
        for n in 0..20 {
            assert!(reloaded.record(&format!("MSG{}", n)).await.is_some());
        }
        assert!(!records_path.with_extension("json.tmp").exists());
    }
}
