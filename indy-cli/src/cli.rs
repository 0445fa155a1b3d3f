use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "IndyCRM - contacts, projects and invoices for freelancers")]
pub struct Cli {
    /// Data directory (overrides INDY_DATA and the config file)
    #[clap(long, global = true)]
    pub data: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace); overrides INDY_LOG
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    /// Use a volatile store; nothing is saved
    #[clap(long, global = true)]
    pub in_memory: bool,

    /// Skip confirmation prompts
    #[clap(long, short = 'y', global = true)]
    pub yes: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage contacts
    #[clap(subcommand)]
    Contact(ContactCommand),

    /// Manage projects
    #[clap(subcommand)]
    Project(ProjectCommand),

    /// Manage the tasks of a project
    #[clap(subcommand)]
    Task(TaskCommand),

    /// Manage project milestones
    #[clap(subcommand)]
    Milestone(MilestoneCommand),

    /// Manage invoices
    #[clap(subcommand)]
    Invoice(InvoiceCommand),

    /// Send and read messages
    #[clap(subcommand)]
    Message(MessageCommand),

    /// Deadline and task alerts
    #[clap(subcommand)]
    Alerts(AlertsCommand),

    /// Share records with other users
    #[clap(subcommand)]
    Share(ShareCommand),

    /// Show the activity log
    Log {
        /// Number of entries to show
        #[clap(long, default_value = "20")]
        limit: usize,

        /// Only entries about this record (UUID or prefix)
        #[clap(long)]
        id: Option<String>,
    },

    /// Show dashboard figures and recent transactions
    Stats {
        /// Transaction period (week, month, quarter, year)
        #[clap(long, default_value = "month")]
        period: String,

        /// Order transactions by date or amount
        #[clap(long, default_value = "date")]
        sort: String,
    },

    /// Export records to a file
    Export {
        /// What to export (contacts, projects, tasks, invoices, all)
        kind: String,

        /// Output format (csv, vcard, ical, json)
        #[clap(long, short = 'f', default_value = "csv")]
        format: String,

        /// Output directory (defaults to the Exports directory)
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Manage backups
    #[clap(subcommand)]
    Backup(BackupCommand),

    /// Database location and migration
    #[clap(subcommand)]
    Db(DbCommand),

    /// Show or change the configuration
    #[clap(subcommand)]
    Config(ConfigCommand),

    /// Add a sample client, project and invoice
    Sample,

    /// Delete every stored record
    Reset,
}

#[derive(Subcommand, Debug)]
pub enum ContactCommand {
    /// Add a new contact
    Add {
        /// First name
        #[clap(long)]
        first: Option<String>,

        /// Last name
        #[clap(long)]
        last: Option<String>,

        #[clap(long)]
        email: Option<String>,

        #[clap(long)]
        phone: Option<String>,

        /// Contact type (client, prospect, supplier, partner)
        #[clap(long)]
        r#type: Option<String>,

        #[clap(long)]
        organization: Option<String>,

        #[clap(long)]
        notes: Option<String>,

        /// Use interactive mode (prompts)
        #[clap(long)]
        interactive: bool,
    },

    /// List contacts sorted by name
    List {
        /// Filter by type
        #[clap(long)]
        r#type: Option<String>,

        /// Search name, email and organization
        #[clap(long)]
        search: Option<String>,
    },

    /// Show a contact with its projects and invoices
    Show {
        /// Contact UUID or prefix
        id: String,
    },

    /// Edit a contact
    Edit {
        /// Contact UUID or prefix
        id: String,

        #[clap(long)]
        first: Option<String>,

        #[clap(long)]
        last: Option<String>,

        #[clap(long)]
        email: Option<String>,

        #[clap(long)]
        phone: Option<String>,

        #[clap(long)]
        r#type: Option<String>,

        #[clap(long)]
        organization: Option<String>,

        #[clap(long)]
        notes: Option<String>,
    },

    /// Delete a contact
    Delete {
        /// Contact UUID or prefix
        id: String,

        /// Also delete the contact's invoices and projects
        #[clap(long)]
        cascade: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Add a project for a client
    Add {
        /// Project name
        name: String,

        /// Client UUID or prefix
        #[clap(long)]
        client: String,

        /// Deadline (YYYY-MM-DD)
        #[clap(long)]
        deadline: Option<String>,

        /// Status (planning, in-progress, on-hold, completed, cancelled)
        #[clap(long)]
        status: Option<String>,

        #[clap(long)]
        notes: Option<String>,
    },

    /// List projects
    List {
        /// Only projects of this client
        #[clap(long)]
        client: Option<String>,

        /// Filter by status
        #[clap(long)]
        status: Option<String>,

        /// Only favorite projects
        #[clap(long)]
        favorites: bool,
    },

    /// Show a project with its tasks and milestones
    Show {
        /// Project UUID or prefix
        id: String,
    },

    /// Change the status of a project
    Status {
        /// Project UUID or prefix
        id: String,

        /// New status
        status: String,
    },

    /// Delete a project
    Delete {
        /// Project UUID or prefix
        id: String,
    },

    /// Toggle the favorite flag
    Favorite {
        /// Project UUID or prefix
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a task to a project
    Add {
        /// Project UUID or prefix
        project: String,

        /// Task title
        title: String,

        #[clap(long)]
        description: Option<String>,

        /// Priority (high, medium, low)
        #[clap(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD)
        #[clap(long)]
        due: Option<String>,

        /// Estimated hours
        #[clap(long)]
        estimate: Option<f64>,
    },

    /// List tasks of a project, or every open task by priority
    List {
        /// Project UUID or prefix
        #[clap(long)]
        project: Option<String>,
    },

    /// Change the status of a task
    Status {
        /// Project UUID or prefix
        project: String,

        /// Task UUID or prefix
        task: String,

        /// New status (todo, in-progress, done)
        status: String,
    },

    /// Record hours spent on a task
    LogTime {
        /// Project UUID or prefix
        project: String,

        /// Task UUID or prefix
        task: String,

        /// Hours worked
        hours: f64,

        #[clap(long)]
        comment: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Project UUID or prefix
        project: String,

        /// Task UUID or prefix
        task: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum MilestoneCommand {
    /// Add a milestone to a project
    Add {
        /// Project UUID or prefix
        project: String,

        /// Milestone title
        title: String,

        /// Date (YYYY-MM-DD)
        date: String,
    },

    /// Mark a milestone completed
    Complete {
        /// Project UUID or prefix
        project: String,

        /// Milestone UUID or prefix
        milestone: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum InvoiceCommand {
    /// Create a draft invoice
    Add {
        /// Client UUID or prefix
        client: String,

        /// Project UUID or prefix
        #[clap(long)]
        project: Option<String>,

        /// Line item as "description:quantity:unit price" (repeatable)
        #[clap(long = "item")]
        items: Vec<String>,

        #[clap(long)]
        notes: Option<String>,
    },

    /// List invoices
    List {
        /// Only sent and overdue invoices
        #[clap(long)]
        unpaid: bool,

        /// Only invoices of this client
        #[clap(long)]
        client: Option<String>,
    },

    /// Show an invoice with its items
    Show {
        /// Invoice number, UUID or prefix
        id: String,
    },

    /// Mark an invoice paid
    Pay {
        /// Invoice number, UUID or prefix
        id: String,
    },

    /// Send every draft invoice
    SendPending,

    /// Delete an invoice
    Delete {
        /// Invoice number, UUID or prefix
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum MessageCommand {
    /// Send a message
    Send {
        /// Sender UUID or prefix
        #[clap(long)]
        from: String,

        /// Recipient UUID or prefix (repeatable)
        #[clap(long = "to")]
        to: Vec<String>,

        /// Subject line
        #[clap(long)]
        subject: String,

        /// Message body
        content: String,

        /// Post without notifying recipients
        #[clap(long)]
        public: bool,
    },

    /// List messages
    List {
        /// Only messages sent or received by this contact
        #[clap(long)]
        contact: Option<String>,

        /// Only public messages
        #[clap(long)]
        public: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AlertsCommand {
    /// List alerts
    List {
        /// Include read alerts
        #[clap(long)]
        all: bool,
    },

    /// Mark an alert, or every alert, as read
    Read {
        /// Alert UUID or prefix
        id: Option<String>,

        #[clap(long)]
        all: bool,
    },

    /// Remove alerts older than 30 days
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ShareCommand {
    /// Share a record with one or more users
    Add {
        /// Record type (contact, project, task, invoice)
        entity: String,

        /// Record UUID or prefix
        id: String,

        /// User UUID (repeatable)
        #[clap(long = "with", required = true)]
        users: Vec<String>,

        /// Permission (view, edit, delete, share; repeatable); defaults to view
        #[clap(long = "permission")]
        permissions: Vec<String>,
    },

    /// List the shares of a record
    List {
        /// Record type (contact, project, task, invoice)
        entity: String,

        /// Record UUID or prefix
        id: String,
    },

    /// Stop sharing
    Remove {
        /// Share UUID or prefix
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Back up contacts, projects and invoices
    Create,

    /// List backups, newest first
    List,

    /// Restore a backup by name
    Restore {
        /// Backup name as shown by `backup list`
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Print the location of the data store
    Path,

    /// Copy every collection into the other backend and switch to it
    Migrate {
        /// Target backend (json, sqlite)
        #[clap(long)]
        to: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the configuration
    Show,

    /// Change a setting (data_path, backend, max_backups, invoice_prefix, log_level)
    Set {
        key: String,
        value: String,
    },
}
