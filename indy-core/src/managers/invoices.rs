use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::db::Collection;
use crate::error::CrmError;
use crate::models::{Invoice, InvoiceStatus};

pub const DEFAULT_INVOICE_PREFIX: &str = "INDY-";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
struct NumberingState {
    year: i32,
    last_number: u32,
}

/// Hands out invoice numbers of the form `<prefix><year>-<NNNN>`
///
/// The sequence starts again at 1 when the calendar year advances.
pub struct InvoiceNumberer {
    controller: Arc<DataController>,
    prefix: String,
    state: NumberingState,
}

impl InvoiceNumberer {
    pub fn new(controller: Arc<DataController>, prefix: impl Into<String>) -> Self {
        Self {
            controller,
            prefix: prefix.into(),
            state: NumberingState::default(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        self.state = self.controller.load_document(Collection::InvoiceNumbering)?;
        Ok(())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Last number handed out in the current sequence, 0 when none
    pub fn current_sequence(&self) -> u32 {
        self.state.last_number
    }

    /// Reserves and persists the next number for an invoice issued at `now`
    pub fn next_number(&mut self, now: DateTime<Utc>) -> Result<String> {
        let mut next = self.state;
        if now.year() > next.year {
            next = NumberingState {
                year: now.year(),
                last_number: 0,
            };
        }
        next.last_number += 1;
        self.controller
            .save_document(Collection::InvoiceNumbering, &next)?;
        self.state = next;
        Ok(format!("{}{}-{:04}", self.prefix, next.year, next.last_number))
    }
}

/// Sends an invoice to its client
pub trait InvoiceDispatcher {
    fn dispatch(&self, invoice: &Invoice) -> Result<()>;
}

/// Dispatcher that only records the dispatch in the log
pub struct LoggingDispatcher;

impl InvoiceDispatcher for LoggingDispatcher {
    fn dispatch(&self, invoice: &Invoice) -> Result<()> {
        log::info!(
            "event=invoice_dispatch module=invoices number={} client={} total={:.2}",
            invoice.number,
            invoice.client_id,
            invoice.total()
        );
        Ok(())
    }
}

/// Outcome of [`InvoiceManager::process_pending`]
#[derive(Debug, Default, Clone)]
pub struct DispatchReport {
    /// Numbers of the invoices now marked Sent
    pub sent: Vec<String>,
    /// Numbers of the invoices left as drafts, with the failure message
    pub failed: Vec<(String, String)>,
}

/// Owns the invoices and their numbering
pub struct InvoiceManager {
    store: RecordStore<Invoice>,
    numberer: InvoiceNumberer,
}

impl InvoiceManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self::with_prefix(controller, DEFAULT_INVOICE_PREFIX)
    }

    pub fn with_prefix(controller: Arc<DataController>, prefix: impl Into<String>) -> Self {
        Self {
            numberer: InvoiceNumberer::new(controller.clone(), prefix),
            store: RecordStore::new(controller),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.numberer.load()?;
        self.store.load()
    }

    pub fn invoices(&self) -> &[Invoice] {
        self.store.items()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Invoice> {
        self.store.get(id)
    }

    pub fn numberer(&self) -> &InvoiceNumberer {
        &self.numberer
    }

    /// Adds the invoice, numbering it first when it has no number
    pub fn add(&mut self, mut invoice: Invoice) -> Result<()> {
        invoice.validate()?;
        if invoice.number.trim().is_empty() {
            invoice.number = self.numberer.next_number(Utc::now())?;
        } else if self.invoices().iter().any(|i| i.number == invoice.number) {
            return Err(CrmError::validation(format!(
                "invoice number {} is already used",
                invoice.number
            ))
            .into());
        }
        log::info!(
            "event=invoice_add module=invoices id={} number={}",
            invoice.id,
            invoice.number
        );
        self.store.insert(invoice)
    }

    /// Replaces the invoice with the same id, returning the previous version
    pub fn update(&mut self, invoice: Invoice) -> Result<Invoice> {
        invoice.validate()?;
        if invoice.number.trim().is_empty() {
            return Err(CrmError::validation("invoice number is required").into());
        }
        if self
            .invoices()
            .iter()
            .any(|i| i.id != invoice.id && i.number == invoice.number)
        {
            return Err(CrmError::validation(format!(
                "invoice number {} is already used",
                invoice.number
            ))
            .into());
        }
        self.store.replace(invoice)
    }

    pub fn delete(&mut self, id: &Uuid) -> Result<Invoice> {
        let removed = self.store.remove(id)?;
        log::info!(
            "event=invoice_delete module=invoices id={} number={}",
            id,
            removed.number
        );
        Ok(removed)
    }

    pub fn delete_for_client(&mut self, client_id: &Uuid) -> Result<Vec<Invoice>> {
        self.store.remove_where(|i| i.client_id == *client_id)
    }

    /// Clears the project link of invoices billed for `project_id`
    pub fn detach_project(&mut self, project_id: &Uuid) -> Result<usize> {
        let mut invoices = self.invoices().to_vec();
        let mut changed = 0;
        for invoice in invoices.iter_mut().filter(|i| i.project_id == Some(*project_id)) {
            invoice.project_id = None;
            changed += 1;
        }
        if changed > 0 {
            self.store.replace_all(invoices)?;
        }
        Ok(changed)
    }

    pub fn invoices_for_client(&self, client_id: &Uuid) -> Vec<&Invoice> {
        self.invoices()
            .iter()
            .filter(|i| i.client_id == *client_id)
            .collect()
    }

    /// Invoices sent to the client and not yet paid
    pub fn unpaid(&self) -> Vec<&Invoice> {
        self.invoices()
            .iter()
            .filter(|i| matches!(i.status, InvoiceStatus::Sent | InvoiceStatus::Overdue))
            .collect()
    }

    /// Marks the invoice paid, returning its previous status
    pub fn mark_paid(&mut self, id: &Uuid) -> Result<InvoiceStatus> {
        self.set_status(id, InvoiceStatus::Paid)
    }

    pub fn set_status(&mut self, id: &Uuid, status: InvoiceStatus) -> Result<InvoiceStatus> {
        self.store.modify(id, |invoice| {
            let previous = invoice.status;
            invoice.status = status;
            Ok(previous)
        })
    }

    /// Moves sent invoices past their due date to Overdue, returning how many changed
    pub fn refresh_overdue(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let mut invoices = self.invoices().to_vec();
        let mut changed = 0;
        for invoice in &mut invoices {
            if invoice.status == InvoiceStatus::Sent && invoice.due_date < now {
                invoice.status = InvoiceStatus::Overdue;
                changed += 1;
            }
        }
        if changed > 0 {
            log::info!("event=invoices_overdue module=invoices count={}", changed);
            self.store.replace_all(invoices)?;
        }
        Ok(changed)
    }

    /// Dispatches every draft and marks it Sent
    ///
    /// A failed dispatch is logged and leaves the invoice as a draft; the
    /// remaining drafts are still processed.
    pub fn process_pending(&mut self, dispatcher: &dyn InvoiceDispatcher) -> Result<DispatchReport> {
        let drafts: Vec<Invoice> = self
            .invoices()
            .iter()
            .filter(|i| i.status == InvoiceStatus::Draft)
            .cloned()
            .collect();

        let mut report = DispatchReport::default();
        for invoice in drafts {
            match dispatcher.dispatch(&invoice) {
                Ok(()) => {
                    self.set_status(&invoice.id, InvoiceStatus::Sent)?;
                    report.sent.push(invoice.number);
                }
                Err(e) => {
                    log::error!(
                        "event=invoice_dispatch_failed module=invoices number={} error={:#}",
                        invoice.number,
                        e
                    );
                    report.failed.push((invoice.number, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    pub fn backup_data(&self) -> Vec<Invoice> {
        self.invoices().to_vec()
    }

    pub fn restore(&mut self, invoices: Vec<Invoice>) -> Result<()> {
        log::info!("event=invoices_restore module=invoices count={}", invoices.len());
        self.store.replace_all(invoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvoiceItem;
    use chrono::{Duration, TimeZone};

    fn manager() -> (Arc<DataController>, InvoiceManager) {
        let controller = Arc::new(DataController::in_memory());
        (controller.clone(), InvoiceManager::new(controller))
    }

    struct FailingFor(String);

    impl InvoiceDispatcher for FailingFor {
        fn dispatch(&self, invoice: &Invoice) -> Result<()> {
            if invoice.number == self.0 {
                anyhow::bail!("mail server unavailable");
            }
            Ok(())
        }
    }

    #[test]
    fn test_numbers_are_sequential_and_reset_each_year() {
        let controller = Arc::new(DataController::in_memory());
        let mut numberer = InvoiceNumberer::new(controller.clone(), "INDY-");
        let last_year = Utc.with_ymd_and_hms(2024, 12, 31, 10, 0, 0).unwrap();
        let new_year = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();

        assert_eq!(numberer.next_number(last_year).unwrap(), "INDY-2024-0001");
        assert_eq!(numberer.next_number(last_year).unwrap(), "INDY-2024-0002");
        assert_eq!(numberer.next_number(new_year).unwrap(), "INDY-2025-0001");

        // The sequence survives a reload
        let mut reloaded = InvoiceNumberer::new(controller, "INDY-");
        reloaded.load().unwrap();
        assert_eq!(reloaded.current_sequence(), 1);
        assert_eq!(reloaded.next_number(new_year).unwrap(), "INDY-2025-0002");
    }

    #[test]
    fn test_add_assigns_number_and_rejects_duplicates() {
        let (_, mut invoices) = manager();
        let invoice = Invoice::new(Uuid::new_v4()).with_item(InvoiceItem::new("Design", 2.0, 300.0));
        let id = invoice.id;
        invoices.add(invoice).unwrap();

        let number = invoices.get(&id).unwrap().number.clone();
        assert!(number.starts_with("INDY-"));
        assert!(number.ends_with("-0001"));

        let mut duplicate = Invoice::new(Uuid::new_v4());
        duplicate.number = number;
        assert!(invoices.add(duplicate).is_err());
    }

    #[test]
    fn test_update_rejects_taken_or_empty_number() {
        let (_, mut invoices) = manager();
        let client = Uuid::new_v4();
        invoices.add(Invoice::new(client)).unwrap();
        invoices.add(Invoice::new(client)).unwrap();
        let first = invoices.invoices()[0].clone();
        let second = invoices.invoices()[1].clone();

        let mut taken = second.clone();
        taken.number = first.number.clone();
        let err = invoices.update(taken).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Validation(_))));

        let mut blank = second.clone();
        blank.number = "  ".into();
        assert!(invoices.update(blank).is_err());
        assert_eq!(invoices.get(&second.id).unwrap().number, second.number);

        // Keeping its own number is not a duplicate
        let mut edited = second.clone();
        edited.notes = "Second instalment".into();
        invoices.update(edited).unwrap();
        assert_eq!(invoices.get(&second.id).unwrap().notes, "Second instalment");
    }

    #[test]
    fn test_refresh_overdue_and_mark_paid() {
        let (_, mut invoices) = manager();
        let now = Utc::now();
        let mut late = Invoice::new(Uuid::new_v4());
        late.date = now - Duration::days(40);
        late.due_date = now - Duration::days(10);
        late.status = InvoiceStatus::Sent;
        let late_id = late.id;
        let mut draft = Invoice::new(Uuid::new_v4());
        draft.date = now - Duration::days(40);
        draft.due_date = now - Duration::days(10);
        invoices.add(late).unwrap();
        invoices.add(draft).unwrap();

        assert_eq!(invoices.refresh_overdue(now).unwrap(), 1);
        assert_eq!(invoices.get(&late_id).unwrap().status, InvoiceStatus::Overdue);
        assert_eq!(invoices.unpaid().len(), 1);

        assert_eq!(invoices.mark_paid(&late_id).unwrap(), InvoiceStatus::Overdue);
        assert!(invoices.unpaid().is_empty());
    }

    #[test]
    fn test_process_pending_keeps_failed_drafts() {
        let (controller, mut invoices) = manager();
        let client = Uuid::new_v4();
        invoices.add(Invoice::new(client)).unwrap();
        invoices.add(Invoice::new(client)).unwrap();
        let failing = invoices.invoices()[1].number.clone();

        let report = invoices
            .process_pending(&FailingFor(failing.clone()))
            .unwrap();
        assert_eq!(report.sent.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, failing);

        let mut reloaded = InvoiceManager::new(controller);
        reloaded.load().unwrap();
        let statuses: Vec<InvoiceStatus> = reloaded.invoices().iter().map(|i| i.status).collect();
        assert_eq!(statuses, vec![InvoiceStatus::Sent, InvoiceStatus::Draft]);
    }

    #[test]
    fn test_delete_unknown_invoice_is_not_found() {
        let (_, mut invoices) = manager();
        let err = invoices.delete(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::NotFound { .. })));
    }
}
