use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::models::{Collaboration, EntityType, Permission};

/// Records shared with other users and what each of them may do
pub struct CollaborationManager {
    store: RecordStore<Collaboration>,
}

impl CollaborationManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self {
            store: RecordStore::new(controller),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn collaborations(&self) -> &[Collaboration] {
        self.store.items()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Collaboration> {
        self.store.get(id)
    }

    /// Shares the record with `user_ids`, returning the new share's id
    pub fn share_entity(
        &mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        user_ids: Vec<Uuid>,
        permissions: &[Permission],
    ) -> Result<Uuid> {
        let collaboration = Collaboration::new(entity_type, entity_id, user_ids, permissions);
        collaboration.validate()?;
        let id = collaboration.id;
        log::info!(
            "event=share module=collaboration id={} entity={} entity_id={} users={}",
            id,
            entity_type,
            entity_id,
            collaboration.shared_with.len()
        );
        self.store.insert(collaboration)?;
        Ok(id)
    }

    /// Replaces the share with the same id and stamps `updated_at`
    pub fn update_collaboration(&mut self, mut collaboration: Collaboration) -> Result<Collaboration> {
        collaboration.normalize();
        collaboration.validate()?;
        collaboration.updated_at = Utc::now();
        self.store.replace(collaboration)
    }

    pub fn remove_collaboration(&mut self, id: &Uuid) -> Result<Collaboration> {
        let removed = self.store.remove(id)?;
        log::info!("event=unshare module=collaboration id={}", id);
        Ok(removed)
    }

    /// Removes every share of the record, used when it is deleted
    pub fn remove_for_entity(&mut self, entity_type: EntityType, entity_id: &Uuid) -> Result<usize> {
        let removed = self
            .store
            .remove_where(|c| c.is_about(entity_type, entity_id))?;
        Ok(removed.len())
    }

    pub fn for_entity(&self, entity_type: EntityType, entity_id: &Uuid) -> Vec<&Collaboration> {
        self.collaborations()
            .iter()
            .filter(|c| c.is_about(entity_type, entity_id))
            .collect()
    }

    pub fn has_permission(
        &self,
        permission: Permission,
        entity_type: EntityType,
        entity_id: &Uuid,
        user_id: &Uuid,
    ) -> bool {
        self.collaborations()
            .iter()
            .any(|c| c.is_about(entity_type, entity_id) && c.grants(permission, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrmError;

    fn manager() -> (Arc<DataController>, CollaborationManager) {
        let controller = Arc::new(DataController::in_memory());
        (controller.clone(), CollaborationManager::new(controller))
    }

    #[test]
    fn test_share_and_check_permission() {
        let (controller, mut shares) = manager();
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        shares
            .share_entity(EntityType::Project, project, vec![user], &Permission::READ_ONLY)
            .unwrap();

        assert!(shares.has_permission(Permission::View, EntityType::Project, &project, &user));
        assert!(!shares.has_permission(Permission::Edit, EntityType::Project, &project, &user));
        assert!(!shares.has_permission(Permission::View, EntityType::Invoice, &project, &user));

        let mut reloaded = CollaborationManager::new(controller);
        reloaded.load().unwrap();
        assert_eq!(reloaded.for_entity(EntityType::Project, &project).len(), 1);
    }

    #[test]
    fn test_update_grants_more_permissions() {
        let (_, mut shares) = manager();
        let contact = Uuid::new_v4();
        let user = Uuid::new_v4();
        let id = shares
            .share_entity(EntityType::Contact, contact, vec![user], &Permission::READ_ONLY)
            .unwrap();

        let mut share = shares.get(&id).unwrap().clone();
        share.permissions = Permission::ALL.to_vec();
        let previous = shares.update_collaboration(share).unwrap();

        assert_eq!(previous.permissions, vec![Permission::View]);
        let updated = shares.get(&id).unwrap();
        assert!(updated.updated_at >= previous.updated_at);
        assert!(shares.has_permission(Permission::Share, EntityType::Contact, &contact, &user));
    }

    #[test]
    fn test_share_without_users_rejected() {
        let (_, mut shares) = manager();
        let err = shares
            .share_entity(EntityType::Task, Uuid::new_v4(), Vec::new(), &Permission::ALL)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Validation(_))));
        assert!(shares.collaborations().is_empty());
    }

    #[test]
    fn test_remove_for_entity_keeps_other_shares() {
        let (_, mut shares) = manager();
        let invoice = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = Uuid::new_v4();
        shares
            .share_entity(EntityType::Invoice, invoice, vec![user], &Permission::ALL)
            .unwrap();
        shares
            .share_entity(EntityType::Invoice, invoice, vec![Uuid::new_v4()], &Permission::READ_ONLY)
            .unwrap();
        let kept = shares
            .share_entity(EntityType::Invoice, other, vec![user], &Permission::ALL)
            .unwrap();

        assert_eq!(shares.remove_for_entity(EntityType::Invoice, &invoice).unwrap(), 2);
        assert_eq!(shares.collaborations().len(), 1);
        assert!(shares.get(&kept).is_some());

        assert!(shares.remove_collaboration(&kept).is_ok());
        assert!(shares.remove_collaboration(&kept).is_err());
    }
}
