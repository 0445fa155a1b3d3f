//! Export of CRM records to CSV, vCard, iCalendar and JSON
//!
//! Writers return the document text; [`write_export`] places it in the
//! exports directory under a timestamped name.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::crm::Crm;
use crate::error::CrmError;
use crate::models::{ActivityLog, Contact, Invoice, Message, Project};

/// Byte order mark so spreadsheet tools detect UTF-8
const BOM: &str = "\u{FEFF}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Contacts,
    Projects,
    Tasks,
    Invoices,
    /// Every collection, JSON only
    All,
}

impl ExportKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contacts" => Some(ExportKind::Contacts),
            "projects" => Some(ExportKind::Projects),
            "tasks" => Some(ExportKind::Tasks),
            "invoices" => Some(ExportKind::Invoices),
            "all" => Some(ExportKind::All),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportKind::Contacts => "contacts",
            ExportKind::Projects => "projects",
            ExportKind::Tasks => "tasks",
            ExportKind::Invoices => "invoices",
            ExportKind::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    VCard,
    ICal,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "vcard" | "vcf" => Some(ExportFormat::VCard),
            "ical" | "ics" => Some(ExportFormat::ICal),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::VCard => "vcf",
            ExportFormat::ICal => "ics",
            ExportFormat::Json => "json",
        }
    }
}

/// Quotes a CSV field when it contains a comma, a quote or a line break
pub fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_document(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut out = String::from(BOM);
    let header: Vec<String> = headers.iter().map(|h| escape_csv(h)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = row.iter().map(|f| escape_csv(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn short_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn contacts_csv(contacts: &[Contact]) -> String {
    let rows = contacts
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.first_name.clone(),
                c.last_name.clone(),
                c.email.clone(),
                c.phone.clone(),
                c.contact_type.to_string(),
                c.employment_status.to_string(),
                c.organization.clone(),
                c.notes.clone(),
            ]
        })
        .collect();
    csv_document(
        &[
            "ID",
            "First name",
            "Last name",
            "Email",
            "Phone",
            "Type",
            "Status",
            "Organization",
            "Notes",
        ],
        rows,
    )
}

pub fn projects_csv(projects: &[Project]) -> String {
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.name.clone(),
                short_date(&p.start_date),
                p.deadline.as_ref().map(short_date).unwrap_or_default(),
                p.status.to_string(),
                format!("{:.0}%", p.progress() * 100.0),
                p.notes.clone(),
            ]
        })
        .collect();
    csv_document(
        &["ID", "Name", "Start date", "Deadline", "Status", "Progress", "Notes"],
        rows,
    )
}

/// Every task of every project, one row each
pub fn tasks_csv(projects: &[Project]) -> String {
    let rows = projects
        .iter()
        .flat_map(|p| {
            p.tasks.iter().map(move |t| {
                vec![
                    t.id.to_string(),
                    p.name.clone(),
                    t.title.clone(),
                    t.description.clone(),
                    t.status.to_string(),
                    t.priority.to_string(),
                    if t.is_completed { "Yes" } else { "No" }.to_string(),
                    t.due_date.as_ref().map(short_date).unwrap_or_default(),
                    t.estimated_hours.map(|h| format!("{:.1}", h)).unwrap_or_default(),
                    format!("{:.1}", t.worked_hours),
                ]
            })
        })
        .collect();
    csv_document(
        &[
            "ID",
            "Project",
            "Title",
            "Description",
            "Status",
            "Priority",
            "Completed",
            "Due date",
            "Estimated hours",
            "Worked hours",
        ],
        rows,
    )
}

/// Invoices with the client name resolved from `contacts`
pub fn invoices_csv(invoices: &[Invoice], contacts: &[Contact]) -> String {
    let rows = invoices
        .iter()
        .map(|i| {
            let client = contacts
                .iter()
                .find(|c| c.id == i.client_id)
                .map(Contact::full_name)
                .unwrap_or_default();
            vec![
                i.number.clone(),
                client,
                short_date(&i.date),
                short_date(&i.due_date),
                format!("{:.2} €", i.total()),
                i.status.to_string(),
                i.notes.clone(),
            ]
        })
        .collect();
    csv_document(
        &["Number", "Client", "Date", "Due date", "Amount", "Status", "Notes"],
        rows,
    )
}

fn escape_vcard(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(';', "\\;")
        .replace('\n', "\\n")
}

/// vCard 3.0 cards, one per contact
pub fn contacts_vcard(contacts: &[Contact]) -> String {
    let mut out = String::new();
    for contact in contacts {
        out.push_str("BEGIN:VCARD\r\nVERSION:3.0\r\n");
        out.push_str(&format!(
            "N:{};{};;;\r\n",
            escape_vcard(&contact.last_name),
            escape_vcard(&contact.first_name)
        ));
        out.push_str(&format!("FN:{}\r\n", escape_vcard(&contact.full_name())));
        if !contact.email.is_empty() {
            out.push_str(&format!("EMAIL;TYPE=INTERNET:{}\r\n", escape_vcard(&contact.email)));
        }
        if !contact.phone.is_empty() {
            out.push_str(&format!("TEL;TYPE=CELL:{}\r\n", escape_vcard(&contact.phone)));
        }
        if !contact.organization.is_empty() {
            out.push_str(&format!("ORG:{}\r\n", escape_vcard(&contact.organization)));
        }
        out.push_str(&format!("TITLE:{}\r\n", escape_vcard(&contact.contact_type.to_string())));
        if !contact.notes.is_empty() {
            out.push_str(&format!("NOTE:{}\r\n", escape_vcard(&contact.notes)));
        }
        out.push_str("END:VCARD\r\n");
    }
    out
}

fn ical_date(date: &DateTime<Utc>) -> String {
    date.format("%Y%m%dT%H%M%SZ").to_string()
}

/// One calendar event per project spanning its start date and deadline
pub fn projects_ical(projects: &[Project], now: DateTime<Utc>) -> String {
    let mut out = String::from(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//IndyCRM//EN\r\nCALSCALE:GREGORIAN\r\n",
    );
    for project in projects {
        out.push_str("BEGIN:VEVENT\r\n");
        out.push_str(&format!("UID:{}\r\n", project.id));
        out.push_str(&format!("DTSTAMP:{}\r\n", ical_date(&now)));
        out.push_str(&format!("DTSTART:{}\r\n", ical_date(&project.start_date)));
        if let Some(deadline) = &project.deadline {
            out.push_str(&format!("DTEND:{}\r\n", ical_date(deadline)));
        }
        out.push_str(&format!("SUMMARY:{}\r\n", escape_vcard(&project.name)));
        if !project.notes.is_empty() {
            out.push_str(&format!("DESCRIPTION:{}\r\n", escape_vcard(&project.notes)));
        }
        out.push_str(&format!(
            "STATUS:{}\r\n",
            project.status.to_string().to_uppercase().replace(' ', "-")
        ));
        out.push_str("END:VEVENT\r\n");
    }
    out.push_str("END:VCALENDAR\r\n");
    out
}

/// Every collection in one JSON document
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportBundle {
    pub exported_at: DateTime<Utc>,
    pub app_version: String,
    pub contacts: Vec<Contact>,
    pub projects: Vec<Project>,
    pub invoices: Vec<Invoice>,
    pub messages: Vec<Message>,
    pub activity_logs: Vec<ActivityLog>,
}

impl ExportBundle {
    pub fn from_crm(crm: &Crm, now: DateTime<Utc>) -> Self {
        Self {
            exported_at: now,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            contacts: crm.contacts().backup_data(),
            projects: crm.projects().backup_data(),
            invoices: crm.invoices().backup_data(),
            messages: crm.messaging().backup_data(),
            activity_logs: crm.activity().logs().to_vec(),
        }
    }
}

pub fn json_bundle(crm: &Crm, now: DateTime<Utc>) -> Result<String> {
    serde_json::to_string_pretty(&ExportBundle::from_crm(crm, now)).context("Failed to encode export")
}

/// Renders `kind` in `format`, rejecting combinations that make no sense
pub fn render(crm: &Crm, kind: ExportKind, format: ExportFormat, now: DateTime<Utc>) -> Result<String> {
    let text = match (kind, format) {
        (ExportKind::Contacts, ExportFormat::Csv) => contacts_csv(crm.contacts().contacts()),
        (ExportKind::Contacts, ExportFormat::VCard) => contacts_vcard(crm.contacts().contacts()),
        (ExportKind::Projects, ExportFormat::Csv) => projects_csv(crm.projects().projects()),
        (ExportKind::Projects, ExportFormat::ICal) => projects_ical(crm.projects().projects(), now),
        (ExportKind::Tasks, ExportFormat::Csv) => tasks_csv(crm.projects().projects()),
        (ExportKind::Invoices, ExportFormat::Csv) => {
            invoices_csv(crm.invoices().invoices(), crm.contacts().contacts())
        }
        (_, ExportFormat::Json) => json_bundle(crm, now)?,
        (kind, format) => {
            return Err(CrmError::validation(format!(
                "cannot export {} as {}",
                kind.name(),
                format.extension()
            ))
            .into())
        }
    };
    Ok(text)
}

/// Writes `text` to `<dir>/<kind>_<timestamp>.<ext>`, returning the path
pub fn write_export(dir: &Path, kind: ExportKind, format: ExportFormat, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    let file_name = format!(
        "{}_{}.{}",
        kind.name(),
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    );
    let path = dir.join(file_name);
    fs::write(&path, text).with_context(|| format!("Failed to write export {}", path.display()))?;
    log::info!(
        "event=export module=export kind={} format={} path={}",
        kind.name(),
        format.extension(),
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactType, InvoiceItem, ProjectTask};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_contacts_csv_has_bom_and_quotes() {
        let mut contact = Contact::new("Ada", "Lovelace", ContactType::Client);
        contact.organization = "Analytical Engines, Ltd".into();
        let csv = contacts_csv(&[contact]);

        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID,First name,Last name"));
        assert!(lines[1].contains("\"Analytical Engines, Ltd\""));
    }

    #[test]
    fn test_invoices_csv_resolves_client() {
        let client = Contact::new("Grace", "Hopper", ContactType::Client);
        let mut invoice = Invoice::new(client.id).with_item(InvoiceItem::new("Audit", 2.0, 250.0));
        invoice.number = "INDY-2025-0001".into();

        let csv = invoices_csv(&[invoice], &[client]);
        assert!(csv.contains("INDY-2025-0001,Grace Hopper,"));
        assert!(csv.contains("500.00 €"));
    }

    #[test]
    fn test_tasks_csv_lists_every_task() {
        let mut project = Project::new("Shop", uuid::Uuid::new_v4());
        project.tasks.push(ProjectTask::new("Cart"));
        project.tasks.push(ProjectTask::new("Payment"));
        let csv = tasks_csv(&[project]);
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_vcard() {
        let contact = Contact::new("Ada", "Lovelace", ContactType::Client).with_email("ada@example.com");
        let card = contacts_vcard(&[contact]);
        assert!(card.starts_with("BEGIN:VCARD\r\nVERSION:3.0\r\n"));
        assert!(card.contains("N:Lovelace;Ada;;;\r\n"));
        assert!(card.contains("EMAIL;TYPE=INTERNET:ada@example.com\r\n"));
        assert!(!card.contains("TEL"));
        assert!(card.ends_with("END:VCARD\r\n"));
    }

    #[test]
    fn test_ical_dates() {
        let mut project = Project::new("Launch", uuid::Uuid::new_v4());
        project.start_date = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        project.deadline = Some(Utc.with_ymd_and_hms(2025, 4, 1, 17, 30, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        let cal = projects_ical(&[project], now);
        assert!(cal.contains("DTSTART:20250301T090000Z\r\n"));
        assert!(cal.contains("DTEND:20250401T173000Z\r\n"));
        assert!(cal.contains("STATUS:PLANNING\r\n"));
        assert!(cal.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_render_rejects_unsupported_format() {
        let crm = Crm::in_memory().unwrap();
        let now = Utc::now();
        assert!(render(&crm, ExportKind::Invoices, ExportFormat::VCard, now).is_err());
        let json = render(&crm, ExportKind::All, ExportFormat::Json, now).unwrap();
        let bundle: ExportBundle = serde_json::from_str(&json).unwrap();
        assert!(bundle.contacts.is_empty());
    }

    #[test]
    fn test_write_export() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("Exports");
        let path = write_export(&dir, ExportKind::Contacts, ExportFormat::Csv, "x").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("contacts_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(fs::read_to_string(path).unwrap(), "x");
    }
}
