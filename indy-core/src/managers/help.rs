use crate::models::{Contact, ContactType, HelpKind, HelpMessage, Project};

/// Contextual hints about incomplete records; kept in memory only
#[derive(Debug, Default)]
pub struct HelpManager {
    messages: Vec<HelpMessage>,
    showing_help: bool,
}

impl HelpManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[HelpMessage] {
        &self.messages
    }

    /// True once a check produced at least one hint
    pub fn showing_help(&self) -> bool {
        self.showing_help
    }

    pub fn set_showing_help(&mut self, showing: bool) {
        self.showing_help = showing;
    }

    /// Adds hints for a contact without notes or a client without organization
    pub fn check_contact(&mut self, contact: &Contact) -> usize {
        let mut hints = Vec::new();
        if contact.notes.trim().is_empty() {
            hints.push(HelpMessage::new(
                "Missing notes",
                format!(
                    "Contact {} has no notes. Add some details to keep track of them.",
                    contact.full_name()
                ),
                HelpKind::Warning,
            ));
        }
        if contact.contact_type == ContactType::Client && contact.organization.trim().is_empty() {
            hints.push(HelpMessage::new(
                "Missing organization",
                format!("Client {} has no organization.", contact.full_name()),
                HelpKind::Warning,
            ));
        }
        self.push_all(hints)
    }

    /// Adds hints for a project without notes, tasks or deadline
    pub fn check_project(&mut self, project: &Project) -> usize {
        let mut hints = Vec::new();
        if project.notes.trim().is_empty() {
            hints.push(HelpMessage::new(
                "Missing description",
                format!("Project {} has no description.", project.name),
                HelpKind::Warning,
            ));
        }
        if project.tasks.is_empty() {
            hints.push(HelpMessage::new(
                "No tasks",
                format!(
                    "Project {} has no tasks. Add tasks to follow its progress.",
                    project.name
                ),
                HelpKind::Warning,
            ));
        }
        if project.deadline.is_none() {
            hints.push(HelpMessage::new(
                "Missing deadline",
                format!("Project {} has no deadline.", project.name),
                HelpKind::Info,
            ));
        }
        self.push_all(hints)
    }

    pub fn add_tip(&mut self, message: impl Into<String>) {
        self.messages
            .push(HelpMessage::new("Tip", message, HelpKind::Tip));
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.showing_help = false;
    }

    fn push_all(&mut self, hints: Vec<HelpMessage>) -> usize {
        let count = hints.len();
        if count > 0 {
            self.showing_help = true;
        }
        self.messages.extend(hints);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_check_contact() {
        let mut help = HelpManager::new();
        let client = Contact::new("Ada", "Lovelace", ContactType::Client);
        assert_eq!(help.check_contact(&client), 2);
        assert!(help.showing_help());

        let mut prospect = Contact::new("Alan", "Turing", ContactType::Prospect);
        prospect.notes = "Met at a conference".into();
        assert_eq!(help.check_contact(&prospect), 0);
        assert_eq!(help.messages().len(), 2);
    }

    #[test]
    fn test_check_project_and_clear() {
        let mut help = HelpManager::new();
        let project = Project::new("Website", Uuid::new_v4());
        assert_eq!(help.check_project(&project), 3);
        assert_eq!(help.messages()[2].kind, HelpKind::Info);

        help.add_tip("Star the projects you work on most");
        assert_eq!(help.messages().last().unwrap().kind, HelpKind::Tip);

        help.clear_messages();
        assert!(help.messages().is_empty());
        assert!(!help.showing_help());
    }
}
