pub mod analytics;
pub mod backup;
pub mod config;
pub mod crm;
pub mod data_controller;
pub mod db;
pub mod error;
pub mod export;
pub mod managers;
pub mod models;
pub mod notify;
pub mod storage;

// Re-export commonly used types
pub use analytics::{transaction_history, DashboardStats, Period, SortBy};
pub use backup::{BackupInfo, BackupManifest, BackupService, RecordCounts};
pub use config::{determine_data_path, get_config_dir, get_config_path, CrmConfig};
pub use crm::{CascadeReport, Crm};
pub use data_controller::DataController;
pub use db::{BackendType, Collection, DatabaseBackend};
pub use error::{CrmError, RecordKind};
pub use export::{ExportFormat, ExportKind};
pub use managers::{
    DispatchReport, InvoiceDispatcher, LoggingDispatcher, LoggingNotifier, MessageNotifier,
};
pub use models::{
    Action, ActivityLog, Alert, AlertKind, Collaboration, Comment, Contact, ContactType,
    EmploymentStatus, EntityType, HelpKind, HelpMessage, Invoice, InvoiceItem, InvoiceStatus,
    Message, Milestone, Permission, Priority, Project, ProjectStatus, ProjectTask, Severity,
    TaskStatus, TimeEntry,
};
pub use notify::{ChangeEvent, ChangeKind};
pub use storage::Storage;
