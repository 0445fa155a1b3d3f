use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CrmError;

/// Payment state of an invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            "cancelled" | "canceled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Draft => write!(f, "Draft"),
            InvoiceStatus::Sent => write!(f, "Sent"),
            InvoiceStatus::Paid => write!(f, "Paid"),
            InvoiceStatus::Overdue => write!(f, "Overdue"),
            InvoiceStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A billed line on an invoice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    #[serde(default)]
    pub notes: String,
}

impl InvoiceItem {
    pub fn new(description: impl Into<String>, quantity: f64, unit_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            quantity,
            unit_price,
            notes: String::new(),
        }
    }

    pub fn amount(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    /// Human-facing number, e.g. "INDY-2024-0001"; assigned on add when empty
    #[serde(default)]
    pub number: String,
    pub client_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub notes: String,
}

impl Invoice {
    /// Creates a draft issued now and due in 30 days
    pub fn new(client_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number: String::new(),
            client_id,
            project_id: None,
            date: now,
            due_date: now + Duration::days(30),
            items: Vec::new(),
            status: InvoiceStatus::Draft,
            notes: String::new(),
        }
    }

    pub fn with_item(mut self, item: InvoiceItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(InvoiceItem::amount).sum()
    }

    /// Paid and cancelled invoices are settled
    pub fn is_settled(&self) -> bool {
        matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if self.due_date < self.date {
            return Err(CrmError::validation(
                "invoice due date cannot precede its issue date",
            ));
        }
        for item in &self.items {
            if item.description.trim().is_empty() {
                return Err(CrmError::validation("invoice item needs a description"));
            }
            if item.quantity < 0.0 || item.unit_price < 0.0 {
                return Err(CrmError::validation(format!(
                    "invoice item '{}' has a negative quantity or price",
                    item.description
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total() {
        let invoice = Invoice::new(Uuid::new_v4())
            .with_item(InvoiceItem::new("Front-end", 5.0, 300.0))
            .with_item(InvoiceItem::new("Hosting", 1.0, 49.5));
        assert_eq!(invoice.total(), 1549.5);
    }

    #[test]
    fn test_validate_items() {
        let invoice = Invoice::new(Uuid::new_v4()).with_item(InvoiceItem::new("Refund", -1.0, 10.0));
        assert!(invoice.validate().is_err());

        let invoice = Invoice::new(Uuid::new_v4()).with_item(InvoiceItem::new("  ", 1.0, 10.0));
        assert!(invoice.validate().is_err());

        let mut invoice = Invoice::new(Uuid::new_v4());
        invoice.due_date = invoice.date - Duration::days(1);
        assert!(invoice.validate().is_err());
    }

    #[test]
    fn test_status_parse_and_settled() {
        assert_eq!(InvoiceStatus::parse("PAID"), Some(InvoiceStatus::Paid));
        assert_eq!(InvoiceStatus::parse("unknown"), None);

        let mut invoice = Invoice::new(Uuid::new_v4());
        assert!(!invoice.is_settled());
        invoice.status = InvoiceStatus::Cancelled;
        assert!(invoice.is_settled());
    }
}
