use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CrmError;

/// Relationship of a contact to the freelancer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContactType {
    Client,
    Prospect,
    Supplier,
    Partner,
}

impl ContactType {
    pub const ALL: [ContactType; 4] = [
        ContactType::Client,
        ContactType::Prospect,
        ContactType::Supplier,
        ContactType::Partner,
    ];

    /// Parse a contact type from a string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "client" => Some(ContactType::Client),
            "prospect" => Some(ContactType::Prospect),
            "supplier" => Some(ContactType::Supplier),
            "partner" => Some(ContactType::Partner),
            _ => None,
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactType::Client => write!(f, "Client"),
            ContactType::Prospect => write!(f, "Prospect"),
            ContactType::Supplier => write!(f, "Supplier"),
            ContactType::Partner => write!(f, "Partner"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EmploymentStatus {
    #[default]
    Freelance,
    Independent,
    Permanent,
}

impl EmploymentStatus {
    pub const ALL: [EmploymentStatus; 3] = [
        EmploymentStatus::Freelance,
        EmploymentStatus::Independent,
        EmploymentStatus::Permanent,
    ];
}

impl fmt::Display for EmploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmploymentStatus::Freelance => write!(f, "Freelance"),
            EmploymentStatus::Independent => write!(f, "Independent"),
            EmploymentStatus::Permanent => write!(f, "Permanent"),
        }
    }
}

/// Billing unit of a rate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateUnit {
    Hourly,
    Daily,
    Fixed,
}

/// A billing rate negotiated with a contact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rate {
    pub id: Uuid,
    pub description: String,
    pub amount: f64,
    pub unit: RateUnit,
    #[serde(default)]
    pub is_default: bool,
}

impl Rate {
    pub fn new(description: impl Into<String>, amount: f64, unit: RateUnit) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            amount,
            unit,
            is_default: false,
        }
    }

    /// Amount with its unit suffix, e.g. "450.00 €/j"
    pub fn formatted(&self) -> String {
        let amount = format!("{:.2} €", self.amount);
        match self.unit {
            RateUnit::Hourly => format!("{}/h", amount),
            RateUnit::Daily => format!("{}/j", amount),
            RateUnit::Fixed => amount,
        }
    }
}

/// A person or organization the freelancer works with
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub contact_type: ContactType,
    #[serde(default)]
    pub employment_status: EmploymentStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,
    #[serde(default)]
    pub organization: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Creates a new contact with the given names and type
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        contact_type: ContactType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: String::new(),
            phone: String::new(),
            contact_type,
            employment_status: EmploymentStatus::default(),
            notes: String::new(),
            rates: Vec::new(),
            organization: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = organization.into();
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// The rate flagged as default, or the first one
    pub fn default_rate(&self) -> Option<&Rate> {
        self.rates
            .iter()
            .find(|r| r.is_default)
            .or_else(|| self.rates.first())
    }

    /// Checks the record invariants: a name is present and the email, if
    /// any, is well formed
    pub fn validate(&self) -> Result<(), CrmError> {
        if self.first_name.trim().is_empty() && self.last_name.trim().is_empty() {
            return Err(CrmError::validation("contact name cannot be empty"));
        }
        if !self.email.is_empty() && !is_valid_email(&self.email) {
            return Err(CrmError::validation(format!(
                "invalid email address: {}",
                self.email
            )));
        }
        if self.rates.iter().any(|r| r.amount < 0.0) {
            return Err(CrmError::validation("rate amounts cannot be negative"));
        }
        Ok(())
    }

    /// Case-insensitive match against name, email and organization
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.full_name().to_lowercase().contains(&query)
            || self.email.to_lowercase().contains(&query)
            || self.organization.to_lowercase().contains(&query)
    }
}

/// Minimal structural email check: `local@domain.tld`, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+crm@mail.example.fr"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane example@mail.com"));
        assert!(!is_valid_email("jane@@example.com"));
        assert!(!is_valid_email("jane@.c"));
    }

    #[test]
    fn test_validate_requires_name() {
        let contact = Contact::new("  ", "", ContactType::Client);
        assert!(contact.validate().is_err());

        let contact = Contact::new("", "Dupont", ContactType::Client);
        assert!(contact.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let contact = Contact::new("Jane", "Doe", ContactType::Prospect).with_email("nope");
        let err = contact.validate().unwrap_err();
        assert!(err.to_string().contains("invalid email"));
    }

    #[test]
    fn test_rate_formatting_and_default() {
        let mut contact = Contact::new("Jane", "Doe", ContactType::Client);
        contact.rates.push(Rate::new("Dev", 80.0, RateUnit::Hourly));
        let mut daily = Rate::new("Regie", 450.0, RateUnit::Daily);
        daily.is_default = true;
        contact.rates.push(daily);

        assert_eq!(contact.default_rate().unwrap().formatted(), "450.00 €/j");
        assert_eq!(contact.rates[0].formatted(), "80.00 €/h");
        assert_eq!(
            Rate::new("Audit", 1200.0, RateUnit::Fixed).formatted(),
            "1200.00 €"
        );
    }

    #[test]
    fn test_matches_query() {
        let contact = Contact::new("Jane", "Doe", ContactType::Client)
            .with_email("jane@acme.io")
            .with_organization("ACME");
        assert!(contact.matches("jane d"));
        assert!(contact.matches("acme"));
        assert!(!contact.matches("globex"));
    }

    #[test]
    fn test_contact_type_parse() {
        assert_eq!(ContactType::parse("Client"), Some(ContactType::Client));
        assert_eq!(ContactType::parse("partner"), Some(ContactType::Partner));
        assert_eq!(ContactType::parse("vendor"), None);
    }
}
