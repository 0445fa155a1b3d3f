mod cli;
mod prompts;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use colored::{ColoredString, Colorize};
use flexi_logger::{Logger, LoggerHandle};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use indy_core::db::{migrate_json_to_sqlite, migrate_sqlite_to_json};
use indy_core::export::{self, ExportFormat, ExportKind};
use indy_core::{
    determine_data_path, get_config_path, transaction_history, BackendType, BackupService,
    Contact, ContactType, Crm, CrmConfig, CrmError, DashboardStats, EntityType, Invoice,
    InvoiceItem, InvoiceStatus, LoggingDispatcher, Message, Milestone, Period, Permission,
    Priority, Project, ProjectStatus, ProjectTask, RecordKind, Severity, SortBy, TaskStatus,
    TimeEntry,
};

use crate::cli::{
    AlertsCommand, BackupCommand, Cli, Command, ConfigCommand, ContactCommand, DbCommand,
    InvoiceCommand, MessageCommand, MilestoneCommand, ProjectCommand, ShareCommand, TaskCommand,
};

/// Environment variable holding the log level
const LOG_ENV: &str = "INDY_LOG";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = get_config_path()?;
    let config = CrmConfig::load_or_create(&config_path)?;
    let _logger = init_logging(cli.log_level.as_deref(), &config)?;
    let data_path = determine_data_path(cli.data.as_deref(), &config);

    // Configuration commands work without opening the store
    match &cli.command {
        Command::Config(config_cmd) => {
            return handle_config_command(config_cmd, config, &config_path, &data_path)
        }
        Command::Db(DbCommand::Migrate { to }) => {
            return migrate_store(to, config, &config_path, &data_path)
        }
        _ => {}
    }

    let mut crm = if cli.in_memory {
        Crm::in_memory_with_config(&config)?
    } else {
        let mut store_config = config.clone();
        store_config.data_path = data_path.clone();
        Crm::open(&store_config)?
    };
    log::debug!(
        "event=cli_start module=cli location={}",
        crm.location().display()
    );

    match &cli.command {
        Command::Contact(cmd) => handle_contact_command(cmd, &mut crm, cli.yes)?,
        Command::Project(cmd) => handle_project_command(cmd, &mut crm, cli.yes)?,
        Command::Task(cmd) => handle_task_command(cmd, &mut crm, cli.yes)?,
        Command::Milestone(cmd) => handle_milestone_command(cmd, &mut crm)?,
        Command::Invoice(cmd) => handle_invoice_command(cmd, &mut crm, cli.yes)?,
        Command::Message(cmd) => handle_message_command(cmd, &mut crm)?,
        Command::Alerts(cmd) => handle_alerts_command(cmd, &mut crm)?,
        Command::Share(cmd) => handle_share_command(cmd, &mut crm)?,
        Command::Log { limit, id } => show_log(&crm, *limit, id.as_deref())?,
        Command::Stats { period, sort } => show_stats(&crm, period, sort)?,
        Command::Export {
            kind,
            format,
            output,
        } => {
            let dir = output
                .clone()
                .unwrap_or_else(|| config.exports_dir(&data_path));
            handle_export_command(&crm, kind, format, &dir)?;
        }
        Command::Backup(cmd) => {
            let service = BackupService::new(config.backups_dir(&data_path), config.max_backups)?;
            handle_backup_command(cmd, &service, &mut crm, cli.yes)?;
        }
        Command::Db(DbCommand::Path) => {
            let stats = crm.controller().stats()?;
            println!("{}", crm.location().display());
            println!(
                "{} backend, {} collection(s), {} bytes",
                stats.backend_type, stats.stored_collections, stats.total_bytes
            );
        }
        Command::Sample => {
            crm.create_sample_data()?;
            println!("{}", "Sample data added.".green());
        }
        Command::Reset => {
            if cli.yes || prompts::confirm("Delete every contact, project, invoice and message?")? {
                crm.reset()?;
                println!("{}", "All data deleted.".green());
            } else {
                println!("{}", "Reset cancelled.".yellow());
            }
        }
        Command::Config(_) | Command::Db(DbCommand::Migrate { .. }) => {}
    }

    Ok(())
}

/// Starts logging to stderr; the level comes from the command line, then
/// `INDY_LOG`, then the configuration
fn init_logging(cli_level: Option<&str>, config: &CrmConfig) -> Result<LoggerHandle> {
    let level = cli_level
        .map(str::to_string)
        .or_else(|| std::env::var(LOG_ENV).ok())
        .unwrap_or_else(|| config.log_level.clone());

    Logger::try_with_str(&level)
        .with_context(|| format!("Invalid log level '{}'", level))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("Failed to start logger")
}

// Parsing helpers

/// Accepts a full UUID or an unambiguous prefix of one of `ids`
fn resolve_id<I>(ids: I, input: &str, kind: RecordKind) -> Result<Uuid>
where
    I: IntoIterator<Item = Uuid>,
{
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
        anyhow::bail!("An id is required");
    }
    let matches: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => anyhow::bail!("No {} matches '{}'", kind.to_string().to_lowercase(), input),
        _ => anyhow::bail!(
            "'{}' matches {} records; use more characters",
            input,
            matches.len()
        ),
    }
}

fn resolve_contact(crm: &Crm, input: &str) -> Result<Uuid> {
    resolve_id(
        crm.contacts().contacts().iter().map(|c| c.id),
        input,
        RecordKind::Contact,
    )
}

fn resolve_project(crm: &Crm, input: &str) -> Result<Uuid> {
    resolve_id(
        crm.projects().projects().iter().map(|p| p.id),
        input,
        RecordKind::Project,
    )
}

fn resolve_task(crm: &Crm, project_id: &Uuid, input: &str) -> Result<Uuid> {
    let project = crm
        .projects()
        .get(project_id)
        .ok_or_else(|| CrmError::not_found(RecordKind::Project, *project_id))?;
    resolve_id(project.tasks.iter().map(|t| t.id), input, RecordKind::Task)
}

/// Invoices are also found by their number
fn resolve_invoice(crm: &Crm, input: &str) -> Result<Uuid> {
    if let Some(invoice) = crm.invoices().invoices().iter().find(|i| i.number == input) {
        return Ok(invoice.id);
    }
    resolve_id(
        crm.invoices().invoices().iter().map(|i| i.id),
        input,
        RecordKind::Invoice,
    )
}

fn parse_entity_type(s: &str) -> Result<EntityType> {
    match s.to_lowercase().as_str() {
        "contact" => Ok(EntityType::Contact),
        "project" => Ok(EntityType::Project),
        "task" => Ok(EntityType::Task),
        "invoice" => Ok(EntityType::Invoice),
        _ => anyhow::bail!("Invalid record type '{}'. Use contact, project, task or invoice.", s),
    }
}

/// Tasks are searched across every project
fn resolve_entity(crm: &Crm, entity_type: EntityType, input: &str) -> Result<Uuid> {
    match entity_type {
        EntityType::Contact => resolve_contact(crm, input),
        EntityType::Project => resolve_project(crm, input),
        EntityType::Invoice => resolve_invoice(crm, input),
        EntityType::Task => resolve_id(
            crm.projects()
                .projects()
                .iter()
                .flat_map(|p| p.tasks.iter().map(|t| t.id)),
            input,
            RecordKind::Task,
        ),
    }
}

/// Parses `YYYY-MM-DD` as the end of that day, UTC
fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?;
    let end_of_day = date
        .and_hms_opt(23, 59, 59)
        .with_context(|| format!("Invalid date '{}'", s))?;
    Ok(Utc.from_utc_datetime(&end_of_day))
}

fn parse_contact_type(s: &str) -> Result<ContactType> {
    ContactType::parse(s).with_context(|| {
        format!("Invalid contact type '{}'. Use client, prospect, supplier or partner.", s)
    })
}

fn parse_project_status(s: &str) -> Result<ProjectStatus> {
    ProjectStatus::parse(s).with_context(|| {
        format!(
            "Invalid project status '{}'. Use planning, in-progress, on-hold, completed or cancelled.",
            s
        )
    })
}

fn parse_task_status(s: &str) -> Result<TaskStatus> {
    TaskStatus::parse(s).with_context(|| {
        format!("Invalid task status '{}'. Use todo, in-progress, review or done.", s)
    })
}

fn parse_priority(s: &str) -> Result<Priority> {
    Priority::parse(s)
        .with_context(|| format!("Invalid priority '{}'. Use high, medium or low.", s))
}

/// Parses `description:quantity:unit price`; the description may contain colons
fn parse_item(s: &str) -> Result<InvoiceItem> {
    let mut parts = s.rsplitn(3, ':');
    let (price, quantity, description) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(q), Some(d)) => (p, q, d),
        _ => anyhow::bail!(
            "Invalid item '{}', expected \"description:quantity:unit price\"",
            s
        ),
    };
    let quantity: f64 = quantity
        .trim()
        .parse()
        .with_context(|| format!("Invalid quantity in item '{}'", s))?;
    let price: f64 = price
        .trim()
        .parse()
        .with_context(|| format!("Invalid unit price in item '{}'", s))?;
    Ok(InvoiceItem::new(description.trim(), quantity, price))
}

fn confirm_delete(what: &str, skip_confirm: bool) -> Result<bool> {
    if skip_confirm {
        return Ok(true);
    }
    let confirmed = prompts::confirm(&format!("Are you sure you want to delete {}?", what))?;
    if !confirmed {
        println!("{}", "Deletion cancelled.".yellow());
    }
    Ok(confirmed)
}

// Display helpers

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn project_status_colored(status: ProjectStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        ProjectStatus::Planning => text.blue(),
        ProjectStatus::InProgress => text.yellow(),
        ProjectStatus::OnHold => text.magenta(),
        ProjectStatus::Completed => text.green(),
        ProjectStatus::Cancelled => text.red(),
    }
}

fn task_status_colored(status: TaskStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        TaskStatus::Todo => text.normal(),
        TaskStatus::InProgress => text.yellow(),
        TaskStatus::Review => text.blue(),
        TaskStatus::Done => text.green(),
    }
}

fn invoice_status_colored(status: InvoiceStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        InvoiceStatus::Draft => text.normal(),
        InvoiceStatus::Sent => text.blue(),
        InvoiceStatus::Paid => text.green(),
        InvoiceStatus::Overdue => text.red(),
        InvoiceStatus::Cancelled => text.dimmed(),
    }
}

fn priority_colored(priority: Priority) -> ColoredString {
    let text = priority.to_string();
    match priority {
        Priority::High => text.red(),
        Priority::Medium => text.yellow(),
        Priority::Low => text.green(),
    }
}

fn severity_colored(severity: Severity) -> ColoredString {
    let text = severity.to_string();
    match severity {
        Severity::High => text.red(),
        Severity::Medium => text.yellow(),
        Severity::Low => text.normal(),
    }
}

fn contact_name(crm: &Crm, id: &Uuid) -> String {
    crm.contacts()
        .get(id)
        .map(Contact::full_name)
        .unwrap_or_else(|| format!("<unknown {}>", short_id(id)))
}

// Contacts

fn handle_contact_command(cmd: &ContactCommand, crm: &mut Crm, yes: bool) -> Result<()> {
    match cmd {
        ContactCommand::Add {
            first,
            last,
            email,
            phone,
            r#type,
            organization,
            notes,
            interactive,
        } => {
            let contact = if *interactive || (first.is_none() && last.is_none()) {
                prompts::prompt_new_contact()?
            } else {
                let contact_type = match r#type {
                    Some(t) => parse_contact_type(t)?,
                    None => ContactType::Client,
                };
                let mut contact = Contact::new(
                    first.clone().unwrap_or_default(),
                    last.clone().unwrap_or_default(),
                    contact_type,
                );
                contact.email = email.clone().unwrap_or_default();
                contact.phone = phone.clone().unwrap_or_default();
                contact.organization = organization.clone().unwrap_or_default();
                contact.notes = notes.clone().unwrap_or_default();
                contact
            };

            let name = contact.full_name();
            let id = crm.add_contact(contact)?;
            println!("{} {}", "Contact added:".green(), name);
            println!("ID: {}", id);
            for hint in crm.help().messages() {
                println!("  {} {}", "hint:".cyan(), hint.message);
            }
        }
        ContactCommand::List { r#type, search } => {
            let mut contacts = match search {
                Some(query) => crm.contacts().search(query),
                None => crm.contacts().sorted_by_name(),
            };
            if let Some(t) = r#type {
                let contact_type = parse_contact_type(t)?;
                contacts.retain(|c| c.contact_type == contact_type);
            }

            if contacts.is_empty() {
                println!("{}", "No contacts found.".yellow());
                return Ok(());
            }

            println!(
                "{:<8} | {:<25} | {:<10} | {:<28} | {:<20}",
                "ID", "Name", "Type", "Email", "Organization"
            );
            println!("{}", "-".repeat(100));
            for contact in contacts {
                println!(
                    "{:<8} | {:<25} | {:<10} | {:<28} | {:<20}",
                    short_id(&contact.id),
                    contact.full_name(),
                    contact.contact_type.to_string(),
                    contact.email,
                    contact.organization
                );
            }
        }
        ContactCommand::Show { id } => {
            let id = resolve_contact(crm, id)?;
            let contact = crm
                .contacts()
                .get(&id)
                .ok_or_else(|| CrmError::not_found(RecordKind::Contact, id))?;

            println!("{}", contact.full_name().bold());
            println!("ID: {}", contact.id);
            println!("Type: {}", contact.contact_type);
            println!("Status: {}", contact.employment_status);
            if !contact.email.is_empty() {
                println!("Email: {}", contact.email);
            }
            if !contact.phone.is_empty() {
                println!("Phone: {}", contact.phone);
            }
            if !contact.organization.is_empty() {
                println!("Organization: {}", contact.organization);
            }
            if !contact.notes.is_empty() {
                println!("\n{}", contact.notes);
            }

            let projects = crm.projects().projects_for_client(&id);
            if !projects.is_empty() {
                println!("\n{}", "Projects:".bold());
                for project in projects {
                    println!(
                        "  {} {} [{}]",
                        short_id(&project.id),
                        project.name,
                        project_status_colored(project.status)
                    );
                }
            }
            let invoices = crm.invoices().invoices_for_client(&id);
            if !invoices.is_empty() {
                println!("\n{}", "Invoices:".bold());
                for invoice in invoices {
                    println!(
                        "  {} {:.2} € [{}]",
                        invoice.number,
                        invoice.total(),
                        invoice_status_colored(invoice.status)
                    );
                }
            }
        }
        ContactCommand::Edit {
            id,
            first,
            last,
            email,
            phone,
            r#type,
            organization,
            notes,
        } => {
            let id = resolve_contact(crm, id)?;
            let mut contact = crm
                .contacts()
                .get(&id)
                .cloned()
                .ok_or_else(|| CrmError::not_found(RecordKind::Contact, id))?;

            if let Some(v) = first {
                contact.first_name = v.clone();
            }
            if let Some(v) = last {
                contact.last_name = v.clone();
            }
            if let Some(v) = email {
                contact.email = v.clone();
            }
            if let Some(v) = phone {
                contact.phone = v.clone();
            }
            if let Some(v) = r#type {
                contact.contact_type = parse_contact_type(v)?;
            }
            if let Some(v) = organization {
                contact.organization = v.clone();
            }
            if let Some(v) = notes {
                contact.notes = v.clone();
            }

            crm.update_contact(contact)?;
            println!("{}", "Contact updated.".green());
        }
        ContactCommand::Delete { id, cascade } => {
            let id = resolve_contact(crm, id)?;
            let name = contact_name(crm, &id);
            if !confirm_delete(&format!("contact '{}'", name), yes)? {
                return Ok(());
            }

            if *cascade {
                let report = crm.delete_contact_cascade(&id)?;
                println!(
                    "{} {} ({} project(s), {} invoice(s) removed, {} assignment(s) cleared)",
                    "Contact deleted:".green(),
                    name,
                    report.projects,
                    report.invoices,
                    report.unassigned
                );
            } else {
                match crm.delete_contact(&id) {
                    Ok(_) => println!("{} {}", "Contact deleted:".green(), name),
                    Err(e) => {
                        if let Some(CrmError::InUse { .. }) = e.downcast_ref::<CrmError>() {
                            println!(
                                "{}",
                                "Use --cascade to also delete its projects and invoices.".yellow()
                            );
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
    Ok(())
}

// Projects

fn handle_project_command(cmd: &ProjectCommand, crm: &mut Crm, yes: bool) -> Result<()> {
    match cmd {
        ProjectCommand::Add {
            name,
            client,
            deadline,
            status,
            notes,
        } => {
            let client_id = resolve_contact(crm, client)?;
            let mut project = Project::new(name.clone(), client_id);
            if let Some(d) = deadline {
                project.deadline = Some(parse_date(d)?);
            }
            if let Some(s) = status {
                project.status = parse_project_status(s)?;
            }
            project.notes = notes.clone().unwrap_or_default();

            let id = crm.add_project(project)?;
            println!("{} {}", "Project added:".green(), name);
            println!("ID: {}", id);
        }
        ProjectCommand::List {
            client,
            status,
            favorites,
        } => {
            let mut projects: Vec<&Project> = match client {
                Some(c) => {
                    let client_id = resolve_contact(crm, c)?;
                    crm.projects().projects_for_client(&client_id)
                }
                None if *favorites => crm.projects().favorites(),
                None => crm.projects().projects().iter().collect(),
            };
            if let Some(s) = status {
                let status = parse_project_status(s)?;
                projects.retain(|p| p.status == status);
            }
            if *favorites {
                projects.retain(|p| p.is_favorite);
            }

            if projects.is_empty() {
                println!("{}", "No projects found.".yellow());
                return Ok(());
            }

            println!(
                "{:<8} | {:<28} | {:<22} | {:<12} | {:<10} | {:>8}",
                "ID", "Name", "Client", "Status", "Deadline", "Progress"
            );
            println!("{}", "-".repeat(100));
            let now = Utc::now();
            for project in projects {
                let deadline = project
                    .deadline
                    .as_ref()
                    .map(format_date)
                    .unwrap_or_else(|| "-".to_string());
                let deadline = if project.is_overdue(now) {
                    deadline.red()
                } else {
                    deadline.normal()
                };
                let star = if project.is_favorite { "*" } else { " " };
                println!(
                    "{:<8} | {}{:<27} | {:<22} | {:<12} | {:<10} | {:>7.0}%",
                    short_id(&project.id),
                    star,
                    project.name,
                    contact_name(crm, &project.client_id),
                    project_status_colored(project.status),
                    deadline,
                    project.progress() * 100.0
                );
            }
        }
        ProjectCommand::Show { id } => {
            let id = resolve_project(crm, id)?;
            let project = crm
                .projects()
                .get(&id)
                .ok_or_else(|| CrmError::not_found(RecordKind::Project, id))?;

            println!("{}", project.name.bold());
            println!("ID: {}", project.id);
            println!("Client: {}", contact_name(crm, &project.client_id));
            println!("Status: {}", project_status_colored(project.status));
            println!("Start: {}", format_date(&project.start_date));
            if let Some(deadline) = &project.deadline {
                println!("Deadline: {}", format_date(deadline));
            }
            println!(
                "Hours: {:.1} worked / {:.1} estimated",
                project.total_worked_hours(),
                project.total_estimated_hours()
            );
            if !project.notes.is_empty() {
                println!("\n{}", project.notes);
            }

            if !project.tasks.is_empty() {
                println!("\n{}", "Tasks:".bold());
                for task in &project.tasks {
                    println!(
                        "  {} {} [{}] {}",
                        short_id(&task.id),
                        task.title,
                        task_status_colored(task.status),
                        priority_colored(task.priority)
                    );
                }
            }
            if !project.milestones.is_empty() {
                println!("\n{}", "Milestones:".bold());
                for milestone in &project.milestones {
                    let mark = if milestone.is_completed { "x" } else { " " };
                    println!(
                        "  [{}] {} {} ({})",
                        mark,
                        short_id(&milestone.id),
                        milestone.title,
                        format_date(&milestone.date)
                    );
                }
            }
        }
        ProjectCommand::Status { id, status } => {
            let id = resolve_project(crm, id)?;
            let status = parse_project_status(status)?;
            crm.set_project_status(&id, status)?;
            println!("Project status set to {}.", project_status_colored(status));
        }
        ProjectCommand::Delete { id } => {
            let id = resolve_project(crm, id)?;
            let name = crm
                .projects()
                .get(&id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            if !confirm_delete(&format!("project '{}'", name), yes)? {
                return Ok(());
            }
            crm.delete_project(&id)?;
            println!("{} {}", "Project deleted:".green(), name);
        }
        ProjectCommand::Favorite { id } => {
            let id = resolve_project(crm, id)?;
            if crm.toggle_favorite(&id)? {
                println!("{}", "Added to favorites.".green());
            } else {
                println!("{}", "Removed from favorites.".yellow());
            }
        }
    }
    Ok(())
}

// Tasks and milestones

fn handle_task_command(cmd: &TaskCommand, crm: &mut Crm, yes: bool) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            project,
            title,
            description,
            priority,
            due,
            estimate,
        } => {
            let project_id = resolve_project(crm, project)?;
            let mut task = ProjectTask::new(title.clone());
            task.description = description.clone().unwrap_or_default();
            if let Some(p) = priority {
                task.priority = parse_priority(p)?;
            }
            if let Some(d) = due {
                task.due_date = Some(parse_date(d)?);
            }
            task.estimated_hours = *estimate;

            let id = crm.add_task(&project_id, task)?;
            println!("{} {}", "Task added:".green(), title);
            println!("ID: {}", id);
        }
        TaskCommand::List { project } => {
            let tasks: Vec<(&Project, &ProjectTask)> = match project {
                Some(p) => {
                    let project_id = resolve_project(crm, p)?;
                    let project = crm
                        .projects()
                        .get(&project_id)
                        .ok_or_else(|| CrmError::not_found(RecordKind::Project, project_id))?;
                    project.tasks.iter().map(|t| (project, t)).collect()
                }
                None => crm.projects().tasks_by_priority(),
            };

            if tasks.is_empty() {
                println!("{}", "No tasks found.".yellow());
                return Ok(());
            }

            println!(
                "{:<8} | {:<30} | {:<20} | {:<12} | {:<8} | {:<10}",
                "ID", "Title", "Project", "Status", "Priority", "Due"
            );
            println!("{}", "-".repeat(100));
            let now = Utc::now();
            for (project, task) in tasks {
                let due = task
                    .due_date
                    .as_ref()
                    .map(format_date)
                    .unwrap_or_else(|| "-".to_string());
                let due = if task.is_overdue(now) { due.red() } else { due.normal() };
                println!(
                    "{:<8} | {:<30} | {:<20} | {:<12} | {:<8} | {:<10}",
                    short_id(&task.id),
                    task.title,
                    project.name,
                    task_status_colored(task.status),
                    priority_colored(task.priority),
                    due
                );
            }
        }
        TaskCommand::Status {
            project,
            task,
            status,
        } => {
            let project_id = resolve_project(crm, project)?;
            let task_id = resolve_task(crm, &project_id, task)?;
            let status = parse_task_status(status)?;
            crm.set_task_status(&project_id, &task_id, status)?;
            println!("Task status set to {}.", task_status_colored(status));
        }
        TaskCommand::LogTime {
            project,
            task,
            hours,
            comment,
        } => {
            let project_id = resolve_project(crm, project)?;
            let task_id = resolve_task(crm, &project_id, task)?;
            let entry = TimeEntry::new(Utc::now(), *hours, comment.clone().unwrap_or_default());
            crm.log_time(&project_id, &task_id, entry)?;
            println!("{} {:.2}h", "Logged".green(), hours);
        }
        TaskCommand::Delete { project, task } => {
            let project_id = resolve_project(crm, project)?;
            let task_id = resolve_task(crm, &project_id, task)?;
            if !confirm_delete("this task", yes)? {
                return Ok(());
            }
            let removed = crm.delete_task(&project_id, &task_id)?;
            println!("{} {}", "Task deleted:".green(), removed.title);
        }
    }
    Ok(())
}

fn handle_milestone_command(cmd: &MilestoneCommand, crm: &mut Crm) -> Result<()> {
    match cmd {
        MilestoneCommand::Add {
            project,
            title,
            date,
        } => {
            let project_id = resolve_project(crm, project)?;
            let milestone = Milestone::new(title.clone(), parse_date(date)?);
            let id = crm.add_milestone(&project_id, milestone)?;
            println!("{} {}", "Milestone added:".green(), title);
            println!("ID: {}", id);
        }
        MilestoneCommand::Complete { project, milestone } => {
            let project_id = resolve_project(crm, project)?;
            let ids: Vec<Uuid> = crm
                .projects()
                .get(&project_id)
                .map(|p| p.milestones.iter().map(|m| m.id).collect())
                .unwrap_or_default();
            let milestone_id = resolve_id(ids, milestone, RecordKind::Milestone)?;
            crm.complete_milestone(&project_id, &milestone_id)?;
            println!("{}", "Milestone completed.".green());
        }
    }
    Ok(())
}

// Invoices

fn handle_invoice_command(cmd: &InvoiceCommand, crm: &mut Crm, yes: bool) -> Result<()> {
    match cmd {
        InvoiceCommand::Add {
            client,
            project,
            items,
            notes,
        } => {
            let client_id = resolve_contact(crm, client)?;
            let mut invoice = Invoice::new(client_id);
            if let Some(p) = project {
                invoice.project_id = Some(resolve_project(crm, p)?);
            }
            for item in items {
                invoice.items.push(parse_item(item)?);
            }
            invoice.notes = notes.clone().unwrap_or_default();

            let id = crm.add_invoice(invoice)?;
            if let Some(invoice) = crm.invoices().get(&id) {
                println!(
                    "{} {} ({:.2} €)",
                    "Invoice created:".green(),
                    invoice.number,
                    invoice.total()
                );
            }
        }
        InvoiceCommand::List { unpaid, client } => {
            let mut invoices: Vec<&Invoice> = if *unpaid {
                crm.invoices().unpaid()
            } else {
                crm.invoices().invoices().iter().collect()
            };
            if let Some(c) = client {
                let client_id = resolve_contact(crm, c)?;
                invoices.retain(|i| i.client_id == client_id);
            }

            if invoices.is_empty() {
                println!("{}", "No invoices found.".yellow());
                return Ok(());
            }

            println!(
                "{:<16} | {:<22} | {:<10} | {:<10} | {:>12} | {:<10}",
                "Number", "Client", "Date", "Due", "Amount", "Status"
            );
            println!("{}", "-".repeat(95));
            for invoice in invoices {
                println!(
                    "{:<16} | {:<22} | {:<10} | {:<10} | {:>10.2} € | {:<10}",
                    invoice.number,
                    contact_name(crm, &invoice.client_id),
                    format_date(&invoice.date),
                    format_date(&invoice.due_date),
                    invoice.total(),
                    invoice_status_colored(invoice.status)
                );
            }
        }
        InvoiceCommand::Show { id } => {
            let id = resolve_invoice(crm, id)?;
            let invoice = crm
                .invoices()
                .get(&id)
                .ok_or_else(|| CrmError::not_found(RecordKind::Invoice, id))?;

            println!("{}", invoice.number.bold());
            println!("Client: {}", contact_name(crm, &invoice.client_id));
            if let Some(project) = invoice.project_id.and_then(|p| crm.projects().get(&p)) {
                println!("Project: {}", project.name);
            }
            println!("Date: {}", format_date(&invoice.date));
            println!("Due: {}", format_date(&invoice.due_date));
            println!("Status: {}", invoice_status_colored(invoice.status));
            println!();
            for item in &invoice.items {
                println!(
                    "  {:<40} {:>6.2} x {:>9.2} = {:>10.2} €",
                    item.description,
                    item.quantity,
                    item.unit_price,
                    item.amount()
                );
            }
            println!("  {:>74.2} €", invoice.total());
            if !invoice.notes.is_empty() {
                println!("\n{}", invoice.notes);
            }
        }
        InvoiceCommand::Pay { id } => {
            let id = resolve_invoice(crm, id)?;
            crm.mark_invoice_paid(&id)?;
            println!("{}", "Invoice marked paid.".green());
        }
        InvoiceCommand::SendPending => {
            let report = crm.send_pending_invoices(&LoggingDispatcher)?;
            for number in &report.sent {
                println!("{} {}", "Sent".green(), number);
            }
            for (number, error) in &report.failed {
                println!("{} {}: {}", "Failed".red(), number, error);
            }
            if report.sent.is_empty() && report.failed.is_empty() {
                println!("{}", "No draft invoices to send.".yellow());
            }
        }
        InvoiceCommand::Delete { id } => {
            let id = resolve_invoice(crm, id)?;
            let number = crm
                .invoices()
                .get(&id)
                .map(|i| i.number.clone())
                .unwrap_or_default();
            if !confirm_delete(&format!("invoice {}", number), yes)? {
                return Ok(());
            }
            crm.delete_invoice(&id)?;
            println!("{} {}", "Invoice deleted:".green(), number);
        }
    }
    Ok(())
}

// Messages and alerts

fn handle_message_command(cmd: &MessageCommand, crm: &mut Crm) -> Result<()> {
    match cmd {
        MessageCommand::Send {
            from,
            to,
            subject,
            content,
            public,
        } => {
            let sender = resolve_contact(crm, from)?;
            let recipients = to
                .iter()
                .map(|r| resolve_contact(crm, r))
                .collect::<Result<Vec<_>>>()?;
            let mut message = Message::new(sender, recipients, subject.clone(), content.clone());
            message.is_public = *public;
            crm.messaging_mut().send_message(message)?;
            println!("{}", "Message sent.".green());
        }
        MessageCommand::List { contact, public } => {
            let messages: Vec<&Message> = match contact {
                Some(c) => {
                    let contact_id = resolve_contact(crm, c)?;
                    crm.messaging().messages_for(&contact_id)
                }
                None if *public => crm.messaging().public_messages(),
                None => crm.messaging().messages().iter().collect(),
            };

            if messages.is_empty() {
                println!("{}", "No messages found.".yellow());
                return Ok(());
            }
            for message in messages {
                println!(
                    "{} {} {} {}",
                    format_date(&message.date).dimmed(),
                    contact_name(crm, &message.sender_id).bold(),
                    "-".dimmed(),
                    message.subject
                );
                println!("    {}", message.content);
            }
        }
    }
    Ok(())
}

fn handle_alerts_command(cmd: &AlertsCommand, crm: &mut Crm) -> Result<()> {
    match cmd {
        AlertsCommand::List { all } => {
            let alerts: Vec<_> = if *all {
                crm.alerts().alerts().iter().collect()
            } else {
                crm.alerts().unread()
            };
            if alerts.is_empty() {
                println!("{}", "No alerts.".green());
                return Ok(());
            }
            for alert in alerts {
                let title = if alert.is_read {
                    alert.title.dimmed()
                } else {
                    alert.title.bold()
                };
                println!(
                    "{} [{}] {}: {}",
                    short_id(&alert.id),
                    severity_colored(alert.severity),
                    title,
                    alert.message
                );
            }
        }
        AlertsCommand::Read { id, all } => {
            if *all {
                let count = crm.alerts_mut().mark_all_read()?;
                println!("{} alert(s) marked read.", count);
            } else {
                let input = id
                    .as_deref()
                    .context("Give an alert id or use --all")?;
                let alert_id = resolve_id(
                    crm.alerts().alerts().iter().map(|a| a.id),
                    input,
                    RecordKind::Alert,
                )?;
                crm.alerts_mut().mark_as_read(&alert_id)?;
                println!("{}", "Alert marked read.".green());
            }
        }
        AlertsCommand::Clear => {
            let removed = crm.alerts_mut().clear_old_alerts(Utc::now())?;
            println!("{} old alert(s) removed.", removed);
        }
    }
    Ok(())
}

fn handle_share_command(cmd: &ShareCommand, crm: &mut Crm) -> Result<()> {
    match cmd {
        ShareCommand::Add {
            entity,
            id,
            users,
            permissions,
        } => {
            let entity_type = parse_entity_type(entity)?;
            let entity_id = resolve_entity(crm, entity_type, id)?;
            let user_ids = users
                .iter()
                .map(|u| Uuid::parse_str(u).with_context(|| format!("Invalid user id '{}'", u)))
                .collect::<Result<Vec<_>>>()?;
            let permissions = if permissions.is_empty() {
                Permission::READ_ONLY.to_vec()
            } else {
                permissions
                    .iter()
                    .map(|p| {
                        Permission::parse(p).with_context(|| {
                            format!("Invalid permission '{}'. Use view, edit, delete or share.", p)
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            let share_id = crm.share_entity(entity_type, entity_id, user_ids, &permissions)?;
            println!("{} {}", "Shared:".green(), short_id(&share_id));
        }
        ShareCommand::List { entity, id } => {
            let entity_type = parse_entity_type(entity)?;
            let entity_id = resolve_entity(crm, entity_type, id)?;
            let shares = crm.collaboration().for_entity(entity_type, &entity_id);
            if shares.is_empty() {
                println!("{}", "Not shared.".yellow());
                return Ok(());
            }
            for share in shares {
                let users: Vec<String> = share.shared_with.iter().map(|u| u.to_string()).collect();
                let permissions: Vec<String> =
                    share.permissions.iter().map(|p| p.to_string()).collect();
                println!(
                    "{} [{}] {}",
                    short_id(&share.id),
                    permissions.join(", ").cyan(),
                    users.join(", ")
                );
            }
        }
        ShareCommand::Remove { id } => {
            let share_id = resolve_id(
                crm.collaboration().collaborations().iter().map(|c| c.id),
                id,
                RecordKind::Collaboration,
            )?;
            crm.collaboration_mut().remove_collaboration(&share_id)?;
            println!("{}", "Share removed.".green());
        }
    }
    Ok(())
}

// Reports

fn show_log(crm: &Crm, limit: usize, id: Option<&str>) -> Result<()> {
    let entries = match id {
        Some(input) => {
            let logs = crm.activity().logs();
            let entity_ids: BTreeSet<Uuid> = logs.iter().map(|l| l.entity_id).collect();
            let entity_id = resolve_id(entity_ids, input, RecordKind::ActivityLog)?;
            let mut entries: Vec<_> = logs.iter().filter(|l| l.entity_id == entity_id).collect();
            entries.sort_by(|a, b| b.date.cmp(&a.date));
            entries.truncate(limit);
            entries
        }
        None => crm.activity().recent(limit),
    };

    if entries.is_empty() {
        println!("{}", "No activity recorded.".yellow());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{} {:<15} {:<8} {}",
            entry.date.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            entry.action.to_string(),
            entry.entity_type.to_string(),
            entry.details
        );
    }
    Ok(())
}

fn show_stats(crm: &Crm, period: &str, sort: &str) -> Result<()> {
    let period = Period::parse(period)
        .with_context(|| format!("Invalid period '{}'. Use week, month, quarter or year.", period))?;
    let sort = match sort.to_lowercase().as_str() {
        "date" => SortBy::Date,
        "amount" => SortBy::Amount,
        other => anyhow::bail!("Invalid sort '{}'. Use date or amount.", other),
    };

    let now = Utc::now();
    let invoices = crm.invoices().invoices();
    let stats = DashboardStats::compute(
        crm.contacts().contacts(),
        crm.projects().projects(),
        invoices,
        now,
    );

    println!("{}", "Dashboard".bold());
    println!("  Active projects:   {}", stats.active_projects);
    println!("  Overdue projects:  {}", stats.overdue_projects);
    println!("  Revenue:           {:.2} €", stats.total_revenue);
    println!(
        "  Unpaid invoices:   {} ({:.2} €)",
        stats.unpaid_invoices, stats.outstanding_amount
    );
    println!("  Conversion rate:   {:.0}%", stats.conversion_rate * 100.0);
    println!("  Hours worked:      {:.1}", stats.hours_worked);
    println!("\n{}", "Projects by client status".bold());
    for (status, count) in &stats.projects_by_client_type {
        println!("  {:<12} {}", status.to_string(), count);
    }

    let history = transaction_history(invoices, period, sort, now);
    println!("\n{}", "Transactions".bold());
    if history.is_empty() {
        println!("  {}", "None in this period.".yellow());
    }
    for invoice in history {
        println!(
            "  {} {:<16} {:<22} {:>10.2} € {}",
            format_date(&invoice.date),
            invoice.number,
            contact_name(crm, &invoice.client_id),
            invoice.total(),
            invoice_status_colored(invoice.status)
        );
    }
    Ok(())
}

fn handle_export_command(crm: &Crm, kind: &str, format: &str, dir: &Path) -> Result<()> {
    let kind = ExportKind::parse(kind).with_context(|| {
        format!(
            "Invalid export kind '{}'. Use contacts, projects, tasks, invoices or all.",
            kind
        )
    })?;
    let format = ExportFormat::parse(format).with_context(|| {
        format!("Invalid format '{}'. Use csv, vcard, ical or json.", format)
    })?;

    let text = export::render(crm, kind, format, Utc::now())?;
    let path = export::write_export(dir, kind, format, &text)?;
    println!("{} {}", "Exported to".green(), path.display());
    Ok(())
}

fn handle_backup_command(
    cmd: &BackupCommand,
    service: &BackupService,
    crm: &mut Crm,
    yes: bool,
) -> Result<()> {
    match cmd {
        BackupCommand::Create => {
            let path = service.create_backup(crm)?;
            println!("{} {}", "Backup created:".green(), path.display());
        }
        BackupCommand::List => {
            let backups = service.list_backups()?;
            if backups.is_empty() {
                println!("{}", "No backups found.".yellow());
                return Ok(());
            }
            for backup in backups {
                let counts = &backup.manifest.counts;
                println!(
                    "{}  {} contacts, {} projects, {} invoices (v{})",
                    backup.name.bold(),
                    counts.contacts,
                    counts.projects,
                    counts.invoices,
                    backup.manifest.app_version
                );
            }
        }
        BackupCommand::Restore { name } => {
            if !yes
                && !prompts::confirm(&format!(
                    "Replace current contacts, projects and invoices with '{}'?",
                    name
                ))?
            {
                println!("{}", "Restore cancelled.".yellow());
                return Ok(());
            }
            let manifest = service.restore_backup(name, crm)?;
            println!(
                "{} {} contacts, {} projects, {} invoices",
                "Restored".green(),
                manifest.counts.contacts,
                manifest.counts.projects,
                manifest.counts.invoices
            );
        }
    }
    Ok(())
}

// Configuration

fn handle_config_command(
    cmd: &ConfigCommand,
    mut config: CrmConfig,
    config_path: &Path,
    data_path: &Path,
) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("{} {}", "Config file:".bold(), config_path.display());
            println!("data_path: {}", config.data_path.display());
            if data_path != config.data_path {
                println!("  (overridden: {})", data_path.display());
            }
            println!("backend: {}", config.backend);
            println!("max_backups: {}", config.max_backups);
            println!("invoice_prefix: {}", config.invoice_prefix);
            println!("log_level: {}", config.log_level);
            println!("user_id: {}", config.user_id);
        }
        ConfigCommand::Set { key, value } => {
            config.set(key, value)?;
            config.save(config_path)?;
            println!("{} {} = {}", "Updated".green(), key, value);
        }
    }
    Ok(())
}

/// Copies every collection into the other backend and switches the
/// configuration to it
fn migrate_store(to: &str, mut config: CrmConfig, config_path: &Path, data_path: &Path) -> Result<()> {
    let target = BackendType::parse(to)
        .with_context(|| format!("Invalid backend '{}'. Use json or sqlite.", to))?;
    if target == config.backend {
        println!("{}", format!("Already using the {} backend.", target).yellow());
        return Ok(());
    }

    let source_location = config.store_location(data_path);
    let mut target_config = config.clone();
    target_config.backend = target;
    let target_location: PathBuf = target_config.store_location(data_path);

    let copied = match (config.backend, target) {
        (BackendType::Json, BackendType::Sqlite) => {
            migrate_json_to_sqlite(&source_location, &target_location)?
        }
        (BackendType::Sqlite, BackendType::Json) => {
            migrate_sqlite_to_json(&source_location, &target_location)?
        }
        (from, to) => anyhow::bail!("Cannot migrate from {} to {}", from, to),
    };

    config.backend = target;
    config.save(config_path)?;
    println!(
        "{} {} collection(s) from {} to {}",
        "Migrated".green(),
        copied,
        source_location.display(),
        target_location.display()
    );
    Ok(())
}
