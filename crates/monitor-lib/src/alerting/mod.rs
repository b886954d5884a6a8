//! Alert routing for high-risk predictions and daily summaries
//!
//! This module provides:
//! - The alert delivery contract and two in-process sinks
//! - Message composition for mentors and administrators
//! - Per-record deduplication of high-risk alerts

mod alerter;
mod messages;

pub use alerter::{AlertConfig, AlertStats, Alerter, DEFAULT_DEDUP_WINDOW};
pub use messages::{
    high_risk_message, summary_message, DailySummary, HIGH_RISK_SUBJECT, SUMMARY_SUBJECT,
};

use anyhow::Result;
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Delivery contract; the core guarantees content and timing, not delivery
pub trait AlertSink: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, message: &str) -> Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn send(&self, recipient: &str, subject: &str, message: &str) -> Result<()> {
        info!(recipient = %recipient, subject = %subject, message = %message, "Alert sent");
        Ok(())
    }
}

/// One captured alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub recipient: String,
    pub subject: String,
    pub message: String,
}

/// Captures alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    sent: Mutex<Vec<SentAlert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AlertSink for MemoryAlertSink {
    fn send(&self, recipient: &str, subject: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentAlert {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            });
        Ok(())
    }
}
