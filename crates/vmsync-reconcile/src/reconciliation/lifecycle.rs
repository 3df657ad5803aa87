//! Tag lifecycle management.
//!
//! A registry record carries at most one of the two lifecycle tags. Moving
//! between them always removes the old tag before adding the new one, in a
//! single write.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use vmsync_connector::model::TIMESTAMP_FORMAT;
use vmsync_connector::prelude::*;

use super::platform::slugify;
use super::types::{LifecycleTag, Transition};

/// Applies lifecycle and classification tags, caching tag entities per run.
pub struct TagLifecycle<'a> {
    registry: &'a dyn Registry,
    cache: HashMap<String, Tag>,
}

impl<'a> TagLifecycle<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    /// Look up a tag by name, creating it when missing.
    pub async fn resolve_tag(&mut self, name: &str) -> ConnectorResult<Tag> {
        if let Some(tag) = self.cache.get(name) {
            return Ok(tag.clone());
        }

        let tag = match self.registry.find_tag_by_name(name).await? {
            Some(tag) => tag,
            None => {
                let tag = self.registry.create_tag(name, &slugify(name)).await?;
                info!(tag = %tag.name, id = %tag.id, "Created tag");
                tag
            }
        };
        self.cache.insert(name.to_string(), tag.clone());
        Ok(tag)
    }

    /// Put `tag` on the record, replacing the other lifecycle tag.
    ///
    /// Writes only when the tag is not already present. On success `vm` holds
    /// the persisted record.
    #[instrument(skip(self, vm), fields(vm = %vm.name, tag = %tag))]
    pub async fn apply(
        &mut self,
        vm: &mut RegistryVm,
        tag: LifecycleTag,
    ) -> ConnectorResult<Transition> {
        if vm.has_tag(tag.tag_name()) {
            return Ok(Transition::Unchanged);
        }

        let entity = self.resolve_tag(tag.tag_name()).await?;
        let mut desired = vm.clone();
        let replaced = desired.remove_tag(tag.other().tag_name());
        desired.tags.push(entity);

        *vm = self.registry.update_vm(&desired).await?;
        debug!(replaced, "Lifecycle tag applied");
        Ok(if replaced {
            Transition::Replaced
        } else {
            Transition::Added
        })
    }

    /// Tag a record orphaned, set it failed and note why in its comments.
    #[instrument(skip(self, vm), fields(vm = %vm.name))]
    pub async fn mark_orphaned(&mut self, vm: &mut RegistryVm, reason: &str) -> ConnectorResult<()> {
        let entity = self.resolve_tag(LifecycleTag::Orphaned.tag_name()).await?;

        let mut desired = vm.clone();
        desired.remove_tag(LifecycleTag::Synced.tag_name());
        if !desired.has_tag(LifecycleTag::Orphaned.tag_name()) {
            desired.tags.push(entity);
        }
        desired.status = VmStatus::Failed;
        desired.comments = append_note(&desired.comments, reason);

        *vm = self.registry.update_vm(&desired).await?;
        info!("Marked orphaned");
        Ok(())
    }

    /// Add any missing classification tags to the record in memory.
    ///
    /// Never removes tags. Returns whether anything was added; the caller
    /// persists.
    pub async fn ensure_tags(&mut self, vm: &mut RegistryVm, names: &[String]) -> ConnectorResult<bool> {
        let mut added = false;
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            if vm.has_tag(name) {
                continue;
            }
            let tag = self.resolve_tag(name).await?;
            vm.tags.push(tag);
            added = true;
        }
        Ok(added)
    }

    /// Resolve classification tag names to ids for a create request.
    pub async fn tag_ids(&mut self, names: &[String]) -> ConnectorResult<Vec<TagId>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            let id = self.resolve_tag(name).await?.id;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

fn append_note(comments: &str, reason: &str) -> String {
    format!(
        "{}\nUpdated on {}: {}",
        comments,
        Utc::now().format(TIMESTAMP_FORMAT),
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_note() {
        let note = append_note("built by ops", "no longer in vCenter");
        let mut lines = note.lines();
        assert_eq!(lines.next(), Some("built by ops"));
        let last = lines.next().unwrap();
        assert!(last.starts_with("Updated on "));
        assert!(last.ends_with(": no longer in vCenter"));
    }
}
