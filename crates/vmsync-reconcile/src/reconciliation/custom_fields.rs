//! Custom-attribute projection.
//!
//! Source timestamps land in registry custom fields, but only in fields the
//! registry actually declares. The declared set is read once per run.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error};

use vmsync_connector::prelude::*;

pub const CREATED: &str = "created";
pub const LAST_UPDATE: &str = "last_update";
pub const LAST_CHECKED: &str = "last_checked";

/// Projects source timestamps onto declared custom fields.
#[derive(Debug, Clone, Default)]
pub struct CustomFieldProjector {
    declared: HashSet<String>,
}

impl CustomFieldProjector {
    /// Build a projector for an explicit set of declared field names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declared: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Query the registry for its declared fields.
    ///
    /// A failed query yields a projector that emits nothing.
    pub async fn load(registry: &dyn Registry) -> Self {
        match registry.list_custom_fields().await {
            Ok(fields) => {
                let projector = Self::new(fields.into_iter().map(|f| f.name));
                debug!(count = projector.declared.len(), "Loaded custom field names");
                projector
            }
            Err(e) => {
                error!(error = %e, "Failed to list custom fields, timestamps will not be written");
                Self::default()
            }
        }
    }

    /// Check whether the registry declares `name`.
    #[must_use]
    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    /// Custom-field values for a source record.
    #[must_use]
    pub fn project(&self, vm: &SourceVm) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        for (name, value) in [
            (CREATED, vm.created),
            (LAST_UPDATE, vm.last_update),
            (LAST_CHECKED, vm.last_checked),
        ] {
            if let Some(ts) = value.filter(|_| self.is_declared(name)) {
                values.insert(name.to_string(), Value::String(format_timestamp(&ts)));
            }
        }
        values
    }

    /// Overlay projected values onto a record's existing custom fields.
    ///
    /// Fields the projection does not produce are left untouched.
    pub fn apply(&self, vm: &SourceVm, custom_fields: &mut BTreeMap<String, Value>) {
        custom_fields.extend(self.project(vm));
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source_vm() -> SourceVm {
        let mut vm = SourceVm::new("vm-1", "db1");
        vm.created = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        vm.last_checked = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        vm
    }

    #[test]
    fn test_projects_only_declared_and_present() {
        let projector = CustomFieldProjector::new(["created", "last_update"]);
        let values = projector.project(&source_vm());

        assert_eq!(values.len(), 1);
        assert_eq!(values["created"], Value::String("2024-01-02T03:04:05Z".into()));
    }

    #[test]
    fn test_empty_schema_projects_nothing() {
        let projector = CustomFieldProjector::default();
        assert!(projector.project(&source_vm()).is_empty());
    }

    #[test]
    fn test_apply_keeps_unrelated_fields() {
        let projector = CustomFieldProjector::new(["created", "last_checked"]);
        let mut fields = BTreeMap::new();
        fields.insert("owner".to_string(), Value::String("ops".into()));
        fields.insert("created".to_string(), Value::Null);

        projector.apply(&source_vm(), &mut fields);

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["owner"], Value::String("ops".into()));
        assert_eq!(fields["last_checked"], Value::String("2024-06-01T00:00:00Z".into()));
    }
}
