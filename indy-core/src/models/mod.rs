//! Record types of the CRM
//!
//! Every record is a plain value: callers take a copy, mutate it and hand it
//! back to the owning manager, which replaces the stored record by id.

mod activity;
mod alert;
mod collaboration;
mod contact;
mod help;
mod invoice;
mod message;
mod project;
mod task;

pub use activity::{Action, ActivityLog, EntityType};
pub use alert::{Alert, AlertKind, Severity};
pub use collaboration::{Collaboration, Permission};
pub use contact::{is_valid_email, Contact, ContactType, EmploymentStatus, Rate, RateUnit};
pub use help::{HelpKind, HelpMessage};
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use message::{Attachment, AttachmentKind, Message};
pub use project::{Milestone, Project, ProjectStatus};
pub use task::{Comment, Priority, ProjectTask, TaskStatus, TimeEntry};
