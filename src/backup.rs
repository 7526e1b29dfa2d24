//! Admin backups: export, validation, restore with undo, rotating auto backups.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::admin::{AdminConsole, Broker, Section};
use crate::blog::Article;
use crate::error::{EtfError, EtfResult};
use crate::logging::{log, log_admin_action, obj, v_str, Domain, Level, ProfileScope};
use crate::storage::{keys, LocalStore};

pub const BACKUP_VERSION: &str = "1.0";
pub const MAX_AUTO_BACKUPS: usize = 5;

const INVALID_FORMAT: &str = "Formato backup non valido";
const INCOMPLETE: &str = "Struttura backup incompleta";
const INVALID_DATA: &str = "Formato dati non valido";
const PARSE_ERROR: &str = "Errore nel parsing del backup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupData {
    pub sections: BTreeMap<String, Section>,
    pub brokers: Vec<Broker>,
    pub articles: Vec<Article>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub version: String,
    pub timestamp: String,
    pub data: BackupData,
}

impl Backup {
    pub fn to_json(&self) -> EtfResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBackup {
    pub timestamp: String,
    /// The serialised `Backup`.
    pub data: String,
}

pub fn create_backup(console: &AdminConsole<'_>) -> Backup {
    Backup {
        version: BACKUP_VERSION.to_string(),
        timestamp: console.now().to_rfc3339(),
        data: BackupData {
            sections: console.data().sections.clone(),
            brokers: console.data().brokers.clone(),
            articles: console.articles().all().to_vec(),
        },
    }
}

pub fn backup_filename(date: NaiveDate) -> String {
    format!("etf-admin-backup-{}.json", date.format("%Y-%m-%d"))
}

/// Hex sha256 of an exported file, sent alongside downloads.
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Deserialize)]
struct KeyedSection {
    key: String,
    #[serde(flatten)]
    section: Section,
}

fn sections_from(value: &Value) -> EtfResult<BTreeMap<String, Section>> {
    let invalid = || EtfError::InvalidBackup(INVALID_DATA.to_string());
    match value {
        Value::Object(_) => serde_json::from_value(value.clone()).map_err(|_| invalid()),
        Value::Array(_) => {
            let list: Vec<KeyedSection> = serde_json::from_value(value.clone()).map_err(|_| invalid())?;
            Ok(list.into_iter().map(|k| (k.key, k.section)).collect())
        }
        _ => Err(invalid()),
    }
}

/// Accepts an enveloped backup (`{version, timestamp, data: {...}}`) or a bare payload.
pub fn validate_backup(value: &Value) -> EtfResult<BackupData> {
    let Some(outer) = value.as_object() else {
        return Err(EtfError::InvalidBackup(INVALID_FORMAT.to_string()));
    };
    let payload = match outer.get("data") {
        Some(Value::Object(inner)) => inner,
        _ => outer,
    };
    let (Some(sections), Some(brokers), Some(articles)) =
        (payload.get("sections"), payload.get("brokers"), payload.get("articles"))
    else {
        return Err(EtfError::InvalidBackup(INCOMPLETE.to_string()));
    };
    if !brokers.is_array() || !articles.is_array() {
        return Err(EtfError::InvalidBackup(INVALID_DATA.to_string()));
    }
    let sections = sections_from(sections)?;
    let brokers: Vec<Broker> = serde_json::from_value(brokers.clone())
        .map_err(|_| EtfError::InvalidBackup(INVALID_DATA.to_string()))?;
    let articles: Vec<Article> = serde_json::from_value(articles.clone())
        .map_err(|_| EtfError::InvalidBackup(INVALID_DATA.to_string()))?;
    Ok(BackupData { sections, brokers, articles })
}

pub fn validate_backup_str(text: &str) -> EtfResult<BackupData> {
    let value: Value =
        serde_json::from_str(text).map_err(|_| EtfError::InvalidBackup(PARSE_ERROR.to_string()))?;
    validate_backup(&value)
}

/// Snapshots the current state under the pre-restore key, then overwrites it.
pub fn restore(console: &mut AdminConsole<'_>, data: BackupData) -> EtfResult<()> {
    let _scope = ProfileScope::new("backup_restore");
    let snapshot = create_backup(console).to_json()?;
    console.store().set_raw(keys::PRE_RESTORE_BACKUP, &snapshot)?;
    apply(console, data, "restore")
}

fn apply(console: &mut AdminConsole<'_>, data: BackupData, action: &str) -> EtfResult<()> {
    let counts = obj(&[
        ("sections", json!(data.sections.len())),
        ("brokers", json!(data.brokers.len())),
        ("articles", json!(data.articles.len())),
    ]);
    console.overwrite(data.sections, data.brokers, data.articles)?;
    log(Level::Info, Domain::Backup, action, counts);
    log_admin_action(action, "adminData", true);
    Ok(())
}

pub fn has_undo(store: &LocalStore) -> EtfResult<bool> {
    Ok(store.get_raw(keys::PRE_RESTORE_BACKUP)?.is_some())
}

/// Puts back the state from before the last restore and forgets the snapshot.
pub fn undo_restore(console: &mut AdminConsole<'_>) -> EtfResult<()> {
    let Some(raw) = console.store().get_raw(keys::PRE_RESTORE_BACKUP)? else {
        return Err(EtfError::NotFound("Nessun backup precedente disponibile".to_string()));
    };
    let data = validate_backup_str(&raw)?;
    apply(console, data, "undo_restore")?;
    console.store().remove(keys::PRE_RESTORE_BACKUP)?;
    Ok(())
}

pub fn auto_backups(store: &LocalStore) -> EtfResult<Vec<AutoBackup>> {
    Ok(store.get_or_default(keys::AUTO_BACKUPS)?)
}

/// True when no auto backup was stamped or the stamp is older than `interval_secs`.
pub fn auto_backup_due(store: &LocalStore, now: DateTime<Utc>, interval_secs: i64) -> EtfResult<bool> {
    let last: Option<i64> = store.get_json(keys::LAST_AUTO_BACKUP)?;
    Ok(match last {
        Some(ms) => now.timestamp_millis() - ms > interval_secs * 1000,
        None => true,
    })
}

/// Appends a snapshot, drops the oldest beyond five and stamps `lastAutoBackup`.
/// Returns how many auto backups are kept.
pub fn create_auto_backup(console: &mut AdminConsole<'_>) -> EtfResult<usize> {
    let backup = create_backup(console);
    let entry = AutoBackup { timestamp: backup.timestamp.clone(), data: serde_json::to_string(&backup)? };
    let now_ms = console.now().timestamp_millis();
    let store = console.store();
    let mut list = auto_backups(store)?;
    list.push(entry);
    if list.len() > MAX_AUTO_BACKUPS {
        let excess = list.len() - MAX_AUTO_BACKUPS;
        list.drain(..excess);
    }
    store.set_json(keys::AUTO_BACKUPS, &list)?;
    store.set_json(keys::LAST_AUTO_BACKUP, &now_ms)?;
    log(
        Level::Info,
        Domain::Backup,
        "auto_backup",
        obj(&[("kept", json!(list.len())), ("timestamp", v_str(&backup.timestamp))]),
    );
    Ok(list.len())
}

pub fn restore_auto_backup(console: &mut AdminConsole<'_>, index: usize) -> EtfResult<()> {
    let list = auto_backups(console.store())?;
    let entry = list
        .get(index)
        .ok_or_else(|| EtfError::NotFound("Backup automatico non trovato".to_string()))?;
    let data = validate_backup_str(&entry.data)?;
    restore(console, data)
}

pub fn delete_auto_backup(store: &mut LocalStore, index: usize) -> EtfResult<AutoBackup> {
    let mut list = auto_backups(store)?;
    if index >= list.len() {
        return Err(EtfError::NotFound("Backup automatico non trovato".to_string()));
    }
    let removed = list.remove(index);
    store.set_json(keys::AUTO_BACKUPS, &list)?;
    Ok(removed)
}
