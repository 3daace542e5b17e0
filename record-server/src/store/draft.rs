//! Write-side record values and their validation.

use crate::models::entity::{self, EntityKind};
use crate::models::record::{RecordRow, RecordType};
use crate::store::error::{FieldErrors, StoreResult};
use crate::store::resolver::EntityResolver;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a related entity, either by id or by natural name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRef {
    Id(String),
    Name(String),
}

impl EntityRef {
    pub fn id(id: impl Into<String>) -> Self {
        EntityRef::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        EntityRef::Name(name.into())
    }
}

/// A record as submitted for a write.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub host: Option<EntityRef>,
    #[serde(default, alias = "backupset")]
    pub backup_set: Option<EntityRef>,
    #[serde(default, alias = "appset")]
    pub app_set: Option<EntityRef>,
    #[serde(default)]
    pub path: Option<EntityRef>,
    #[serde(default)]
    pub filename: String,
    #[serde(default, rename = "type")]
    pub record_type: RecordType,
    #[serde(default, alias = "archiveid")]
    pub archive_id: String,
    #[serde(default, alias = "backuptime")]
    pub backup_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "archivedtime")]
    pub archived_time: Option<DateTime<Utc>>,
}

impl RecordDraft {
    pub fn new(record_type: RecordType, path: EntityRef, filename: impl Into<String>) -> Self {
        Self {
            record_type,
            path: Some(path),
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn host(mut self, host: EntityRef) -> Self {
        self.host = Some(host);
        self
    }

    pub fn app_set(mut self, app_set: EntityRef) -> Self {
        self.app_set = Some(app_set);
        self
    }

    pub fn backup_set(mut self, backup_set: EntityRef) -> Self {
        self.backup_set = Some(backup_set);
        self
    }

    pub fn backup_time(mut self, at: DateTime<Utc>) -> Self {
        self.backup_time = Some(at);
        self
    }

    pub fn archived(mut self, archive_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.archive_id = archive_id.into();
        self.archived_time = Some(at);
        self
    }
}

/// Foreign-key ids the draft's references resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResolvedRefs {
    pub host_id: Option<String>,
    pub backup_set_id: Option<String>,
    pub app_set_id: Option<String>,
    pub path_id: Option<String>,
}

/// Hyphenated 36-character UUID.
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == 36 && Uuid::try_parse(id).is_ok()
}

fn resolve_ref<R: EntityResolver + ?Sized>(
    resolver: &R,
    conn: &Connection,
    kind: EntityKind,
    reference: Option<&EntityRef>,
    errors: &mut FieldErrors,
) -> StoreResult<Option<String>> {
    match reference {
        None => Ok(None),
        Some(EntityRef::Id(id)) => {
            if entity::exists(conn, kind, id)? {
                Ok(Some(id.clone()))
            } else {
                errors.push(kind.field(), format!("unknown id '{}'", id));
                Ok(None)
            }
        }
        Some(EntityRef::Name(name)) if name.trim().is_empty() => {
            errors.push(kind.field(), "can not be empty");
            Ok(None)
        }
        Some(EntityRef::Name(name)) => match resolver.resolve_one(conn, kind, name)? {
            Some(found) => Ok(Some(found.id)),
            None => {
                errors.push(kind.field(), format!("no {} named '{}'", kind, name));
                Ok(None)
            }
        },
    }
}

/// Resolves every reference on the draft. A reference that points nowhere
/// is a field error: the row can not be written against a missing entity.
pub(crate) fn resolve_refs<R: EntityResolver + ?Sized>(
    resolver: &R,
    conn: &Connection,
    draft: &RecordDraft,
    errors: &mut FieldErrors,
) -> StoreResult<ResolvedRefs> {
    let path_id = resolve_ref(resolver, conn, EntityKind::Path, draft.path.as_ref(), errors)?;
    if draft.path.is_none() {
        errors.push("path", "can not be empty");
    }
    Ok(ResolvedRefs {
        host_id: resolve_ref(resolver, conn, EntityKind::Host, draft.host.as_ref(), errors)?,
        backup_set_id: resolve_ref(
            resolver,
            conn,
            EntityKind::BackupSet,
            draft.backup_set.as_ref(),
            errors,
        )?,
        app_set_id: resolve_ref(
            resolver,
            conn,
            EntityKind::AppSet,
            draft.app_set.as_ref(),
            errors,
        )?,
        path_id,
    })
}

/// Checks the draft's own fields and builds the row to write. `errors`
/// carries anything already found while resolving references.
pub(crate) fn validate(
    draft: &RecordDraft,
    id: String,
    refs: ResolvedRefs,
    mut errors: FieldErrors,
) -> Result<RecordRow, FieldErrors> {
    if id.is_empty() {
        errors.push("id", "can not be empty");
    } else if !is_well_formed_id(&id) {
        errors.push("id", "must be a hyphenated UUID");
    }
    if draft.filename.trim().is_empty() {
        errors.push("filename", "can not be empty");
    }
    match draft.record_type {
        RecordType::All => errors.push("type", "must be backup or archive"),
        RecordType::Backup => {
            if !draft.archive_id.is_empty() {
                errors.push("archive_id", "only allowed for archive records");
            }
            if draft.archived_time.is_some() {
                errors.push("archived_time", "only allowed for archive records");
            }
        }
        RecordType::Archive => {}
    }

    let path_id = match refs.path_id {
        Some(path_id) if errors.is_empty() => path_id,
        _ => return Err(errors),
    };

    Ok(RecordRow {
        id,
        host_id: refs.host_id,
        backup_set_id: refs.backup_set_id,
        app_set_id: refs.app_set_id,
        path_id,
        filename: draft.filename.clone(),
        record_type: draft.record_type,
        archive_id: draft.archive_id.clone(),
        backup_time: draft.backup_time.unwrap_or_else(Utc::now),
        archived_time: draft.archived_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "6f1d2f7a-3b0e-4d5c-8a9b-0c1d2e3f4a5b";

    fn refs_with_path() -> ResolvedRefs {
        ResolvedRefs {
            path_id: Some("path-1".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_well_formed_ids() {
        assert!(is_well_formed_id(ID));
        assert!(!is_well_formed_id("6f1d2f7a3b0e4d5c8a9b0c1d2e3f4a5b"));
        assert!(!is_well_formed_id("not-a-uuid"));
        assert!(!is_well_formed_id(""));
    }

    #[test]
    fn test_validate_builds_row() {
        let draft = RecordDraft::new(RecordType::Backup, EntityRef::name("/data"), "f.tar");
        let row = validate(&draft, ID.into(), refs_with_path(), FieldErrors::default())
            .expect("valid draft");
        assert_eq!(row.id, ID);
        assert_eq!(row.path_id, "path-1");
        assert_eq!(row.filename, "f.tar");
        assert_eq!(row.archived_time, None);
    }

    #[test]
    fn test_validate_collects_every_failure() {
        let draft = RecordDraft {
            filename: "  ".into(),
            archive_id: "vault-1".into(),
            ..Default::default()
        };
        let mut errors = FieldErrors::default();
        errors.push("path", "can not be empty");

        let errors = validate(&draft, "bogus".into(), ResolvedRefs::default(), errors)
            .expect_err("invalid draft");
        for field in ["path", "id", "filename", "type"] {
            assert!(errors.has(field), "missing error for {}", field);
        }
        // All is a wildcard, so the archive-only check does not apply
        assert!(!errors.has("archive_id"));
    }

    #[test]
    fn test_archive_fields_rejected_on_backups() {
        let draft = RecordDraft::new(RecordType::Backup, EntityRef::name("/data"), "f.tar")
            .archived("vault-1", Utc::now());
        let errors = validate(&draft, ID.into(), refs_with_path(), FieldErrors::default())
            .expect_err("backup with archive fields");
        assert!(errors.has("archive_id"));
        assert!(errors.has("archived_time"));

        let draft = RecordDraft::new(RecordType::Archive, EntityRef::name("/data"), "f.tar")
            .archived("vault-1", Utc::now());
        assert!(validate(&draft, ID.into(), refs_with_path(), FieldErrors::default()).is_ok());
    }

    #[test]
    fn test_draft_deserializes_references() {
        let draft: RecordDraft = serde_json::from_str(
            r#"{
                "host": {"name": "h1"},
                "appset": {"id": "a-1"},
                "path": {"name": "/p1"},
                "filename": "f.tar",
                "type": "backup",
                "backuptime": "2024-03-01T10:00:00Z"
            }"#,
        )
        .expect("valid json");
        assert_eq!(draft.host, Some(EntityRef::name("h1")));
        assert_eq!(draft.app_set, Some(EntityRef::id("a-1")));
        assert_eq!(draft.record_type, RecordType::Backup);
        assert!(draft.backup_time.is_some());
    }
}
