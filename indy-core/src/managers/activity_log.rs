use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::models::{ActivityLog, EntityType};

/// Append-only audit trail of record changes
pub struct ActivityLogManager {
    store: RecordStore<ActivityLog>,
}

impl ActivityLogManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self {
            store: RecordStore::new(controller),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn logs(&self) -> &[ActivityLog] {
        self.store.items()
    }

    pub fn add_log(&mut self, entry: ActivityLog) -> Result<()> {
        log::debug!(
            "event=activity module=activity_log action={} entity={} id={}",
            entry.action,
            entry.entity_type,
            entry.entity_id
        );
        self.store.insert(entry)
    }

    /// Entries about one record, newest first
    pub fn logs_for_entity(&self, entity_type: EntityType, id: &Uuid) -> Vec<&ActivityLog> {
        let mut logs: Vec<&ActivityLog> = self
            .logs()
            .iter()
            .filter(|l| l.entity_type == entity_type && l.entity_id == *id)
            .collect();
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        logs
    }

    /// The `limit` most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<&ActivityLog> {
        let mut logs: Vec<&ActivityLog> = self.logs().iter().collect();
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        logs.truncate(limit);
        logs
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.replace_all(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use chrono::{Duration, Utc};

    #[test]
    fn test_logs_for_entity_newest_first() {
        let controller = Arc::new(DataController::in_memory());
        let mut logs = ActivityLogManager::new(controller.clone());
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();

        let mut older = ActivityLog::new(user, Action::Created, EntityType::Project, project, "created");
        older.date = Utc::now() - Duration::hours(2);
        let newer = ActivityLog::new(user, Action::Updated, EntityType::Project, project, "renamed");
        let other = ActivityLog::new(user, Action::Created, EntityType::Contact, Uuid::new_v4(), "");
        logs.add_log(older).unwrap();
        logs.add_log(newer).unwrap();
        logs.add_log(other).unwrap();

        let entries = logs.logs_for_entity(EntityType::Project, &project);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, Action::Updated);
        assert_eq!(logs.recent(1).len(), 1);

        let mut reloaded = ActivityLogManager::new(controller);
        assert_eq!(reloaded.load().unwrap(), 3);
    }
}
