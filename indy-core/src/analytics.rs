//! Dashboard figures and invoice history

use chrono::{DateTime, Datelike, Months, Utc};
use serde::Serialize;

use crate::models::{
    Contact, ContactType, EmploymentStatus, Invoice, InvoiceStatus, Project, ProjectStatus,
};

/// Window of the transaction history, relative to `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Same ISO week
    Week,
    /// Same calendar month
    Month,
    /// The last three months
    Quarter,
    /// Same calendar year
    Year,
}

impl Period {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "week" => Some(Period::Week),
            "month" => Some(Period::Month),
            "quarter" => Some(Period::Quarter),
            "year" => Some(Period::Year),
            _ => None,
        }
    }

    pub fn contains(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Period::Week => date.iso_week() == now.iso_week(),
            Period::Month => date.year() == now.year() && date.month() == now.month(),
            Period::Quarter => match now.checked_sub_months(Months::new(3)) {
                Some(start) => date >= start,
                None => true,
            },
            Period::Year => date.year() == now.year(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Newest first
    Date,
    /// Largest first
    Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub active_projects: usize,
    /// Sum of paid invoice totals
    pub total_revenue: f64,
    pub unpaid_invoices: usize,
    /// Sum of sent and overdue invoice totals
    pub outstanding_amount: f64,
    /// clients / (clients + prospects), 0 without prospects
    pub conversion_rate: f64,
    pub overdue_projects: usize,
    pub hours_worked: f64,
    /// Project count per employment status of the client
    pub projects_by_client_type: Vec<(EmploymentStatus, usize)>,
}

impl DashboardStats {
    pub fn compute(
        contacts: &[Contact],
        projects: &[Project],
        invoices: &[Invoice],
        now: DateTime<Utc>,
    ) -> Self {
        let unpaid: Vec<&Invoice> = invoices
            .iter()
            .filter(|i| matches!(i.status, InvoiceStatus::Sent | InvoiceStatus::Overdue))
            .collect();

        let clients = contacts
            .iter()
            .filter(|c| c.contact_type == ContactType::Client)
            .count();
        let prospects = contacts
            .iter()
            .filter(|c| c.contact_type == ContactType::Prospect)
            .count();
        let conversion_rate = if prospects == 0 {
            0.0
        } else {
            clients as f64 / (clients + prospects) as f64
        };

        let projects_by_client_type = EmploymentStatus::ALL
            .iter()
            .map(|status| {
                let count = projects
                    .iter()
                    .filter(|p| {
                        contacts
                            .iter()
                            .any(|c| c.id == p.client_id && c.employment_status == *status)
                    })
                    .count();
                (*status, count)
            })
            .collect();

        Self {
            active_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::InProgress)
                .count(),
            total_revenue: invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Paid)
                .map(Invoice::total)
                .sum(),
            unpaid_invoices: unpaid.len(),
            outstanding_amount: unpaid.iter().map(|i| i.total()).sum(),
            conversion_rate,
            overdue_projects: projects.iter().filter(|p| p.is_overdue(now)).count(),
            hours_worked: projects.iter().map(Project::total_worked_hours).sum(),
            projects_by_client_type,
        }
    }
}

/// Invoices dated within `period`, ordered by `sort`
pub fn transaction_history<'a>(
    invoices: &'a [Invoice],
    period: Period,
    sort: SortBy,
    now: DateTime<Utc>,
) -> Vec<&'a Invoice> {
    let mut history: Vec<&Invoice> = invoices
        .iter()
        .filter(|i| period.contains(i.date, now))
        .collect();
    match sort {
        SortBy::Date => history.sort_by(|a, b| b.date.cmp(&a.date)),
        SortBy::Amount => history.sort_by(|a, b| b.total().total_cmp(&a.total())),
    }
    history
}
