//! A bounded, newest-first journal of user-visible operations.
use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shield_common::EncryptedOrder;

/// Entries kept before the oldest ones are dropped.
pub const MAX_ENTRIES: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    OfferCreate,
    Decrypt,
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub kind: LogKind,
    pub title: String,
    pub details: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    entries: VecDeque<LogEntry>,
    #[serde(skip)]
    last_status: Option<String>,
}

impl OperationLog {
    pub fn add(&mut self, kind: LogKind, title: &str, details: Option<String>) {
        let timestamp = Utc::now().timestamp_millis();
        let id = format!("{timestamp}-{:06x}", rand::random::<u32>() & 0xff_ffff);
        self.entries.push_front(LogEntry {
            id,
            timestamp,
            kind,
            title: title.to_string(),
            details,
        });
        self.entries.truncate(MAX_ENTRIES);
    }

    /// Journal a status message. Repeating the previous message is a no-op.
    /// `submitted` names the order a "setOrder completed" message refers to.
    pub fn record_status(&mut self, message: &str, submitted: Option<&EncryptedOrder>) {
        if message.is_empty() || self.last_status.as_deref() == Some(message) {
            return;
        }
        self.last_status = Some(message.to_string());

        if let Some(clear) = message.strip_prefix("Order decrypted: ") {
            self.add(LogKind::Decrypt, "Decryption Completed", Some(clear.to_string()));
        } else if message.starts_with("setOrder completed") {
            let details = submitted.map(|order| {
                format!(
                    "fromHandle={}\ntoHandle={}",
                    order.from_amount, order.to_amount
                )
            });
            self.add(LogKind::OfferCreate, "Order Submitted", details);
        } else if message.to_lowercase().contains("failed") {
            self.add(LogKind::Error, "Operation Failed", Some(message.to_string()));
        } else {
            self.add(LogKind::Info, "Status Update", Some(message.to_string()));
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
