//! Record filters and their translation into SQL.
//!
//! A [`RecordFilter`] names what to look for, possibly by entity name. Names
//! are turned into ids by [`resolve_filter`], which drops whatever does not
//! resolve. [`compose`] is then a pure mapping from the resolved filter and
//! the [`QueryOptions`] to a [`SelectPlan`] of predicates and order terms.

use crate::db::connection::CASEFOLD_FN;
use crate::models::entity::EntityKind;
use crate::models::format_ts;
use crate::models::record::{self, RecordType};
use crate::store::resolver::EntityResolver;
use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "false" => Ok(SortOrder::Asc),
            "desc" | "true" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// What to look for. `None` and empty strings are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub id: Option<String>,
    /// Case-insensitive substring.
    pub filename: Option<String>,
    pub archive_id: Option<String>,
    pub host: Option<String>,
    pub app_set: Option<String>,
    pub backup_set: Option<String>,
    /// Path string of the storage path.
    pub path: Option<String>,
    /// Also picks the ordering, see [`order_terms`].
    pub record_type: RecordType,
}

/// Inclusive bounds on backup and archive times. Each bound is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRanges {
    pub backup_start: Option<DateTime<Utc>>,
    pub backup_end: Option<DateTime<Utc>>,
    pub archive_start: Option<DateTime<Utc>>,
    pub archive_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// 0 means unbounded.
    pub limit: usize,
    pub offset: usize,
    pub backup_order: SortOrder,
    pub archive_order: SortOrder,
    pub times: TimeRanges,
}

/// A [`RecordFilter`] with names replaced by the ids they resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFilter {
    pub id: Option<String>,
    pub filename: Option<String>,
    pub archive_id: Option<String>,
    pub host_id: Option<String>,
    pub app_set_id: Option<String>,
    pub backup_set_id: Option<String>,
    pub path_id: Option<String>,
    pub record_type: RecordType,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn resolve_name<R: EntityResolver + ?Sized>(
    resolver: &R,
    conn: &Connection,
    kind: EntityKind,
    name: &Option<String>,
) -> Option<String> {
    let name = present(name)?;
    match resolver.resolve_one(conn, kind, &name) {
        Ok(Some(found)) => Some(found.id),
        Ok(None) => {
            tracing::debug!(kind = %kind, name = %name, "[STORE] Name did not resolve");
            None
        }
        Err(e) => {
            tracing::debug!(kind = %kind, name = %name, "[STORE] Resolution failed: {}", e);
            None
        }
    }
}

/// Turns entity names into ids. Names that do not resolve, or whose lookup
/// fails, leave their clause out instead of failing the query.
pub fn resolve_filter<R: EntityResolver + ?Sized>(
    resolver: &R,
    conn: &Connection,
    filter: &RecordFilter,
) -> ResolvedFilter {
    ResolvedFilter {
        id: present(&filter.id),
        filename: present(&filter.filename),
        archive_id: present(&filter.archive_id),
        path_id: resolve_name(resolver, conn, EntityKind::Path, &filter.path),
        host_id: resolve_name(resolver, conn, EntityKind::Host, &filter.host),
        app_set_id: resolve_name(resolver, conn, EntityKind::AppSet, &filter.app_set),
        backup_set_id: resolve_name(resolver, conn, EntityKind::BackupSet, &filter.backup_set),
        record_type: filter.record_type,
    }
}

/// One predicate over the `records r` alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    IdEq(String),
    FilenameContains(String),
    FilenameEq(String),
    ArchiveIdEq(String),
    RefEq { column: &'static str, id: String },
    /// Like `RefEq` but a missing id only matches NULL.
    RefMatches { column: &'static str, id: Option<String> },
    AtOrAfter { column: &'static str, at: DateTime<Utc> },
    AtOrBefore { column: &'static str, at: DateTime<Utc> },
}

impl Clause {
    fn sql(&self) -> String {
        match self {
            Clause::IdEq(_) => "r.id = ?".into(),
            Clause::FilenameContains(_) => {
                format!("instr({f}(r.filename), {f}(?)) > 0", f = CASEFOLD_FN)
            }
            Clause::FilenameEq(_) => "r.filename = ?".into(),
            Clause::ArchiveIdEq(_) => "r.archive_id = ?".into(),
            Clause::RefEq { column, .. } => format!("r.{} = ?", column),
            Clause::RefMatches { column, .. } => format!("IFNULL(r.{}, '') = ?", column),
            Clause::AtOrAfter { column, .. } => format!("r.{} >= ?", column),
            Clause::AtOrBefore { column, .. } => format!("r.{} <= ?", column),
        }
    }

    fn param(&self) -> Box<dyn ToSql> {
        match self {
            Clause::IdEq(v)
            | Clause::FilenameContains(v)
            | Clause::FilenameEq(v)
            | Clause::ArchiveIdEq(v) => Box::new(v.clone()),
            Clause::RefEq { id, .. } => Box::new(id.clone()),
            Clause::RefMatches { id, .. } => Box::new(id.clone().unwrap_or_default()),
            Clause::AtOrAfter { at, .. } | Clause::AtOrBefore { at, .. } => {
                Box::new(format_ts(at))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: &'static str,
    pub order: SortOrder,
}

/// Ordering for a record type. Backup and Archive sort on their own time;
/// All sorts on backup time with archive time breaking ties.
pub fn order_terms(
    record_type: RecordType,
    backup_order: SortOrder,
    archive_order: SortOrder,
) -> Vec<OrderTerm> {
    let backup = OrderTerm { column: "backup_time", order: backup_order };
    let archive = OrderTerm { column: "archived_time", order: archive_order };
    match record_type {
        RecordType::Backup => vec![backup],
        RecordType::Archive => vec![archive],
        RecordType::All => vec![backup, archive],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectPlan {
    pub clauses: Vec<Clause>,
    pub order: Vec<OrderTerm>,
    pub limit: usize,
    pub offset: usize,
}

impl SelectPlan {
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self.clauses.iter().map(Clause::sql).collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    /// Insertion order breaks whatever ties the terms leave.
    pub fn order_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .order
            .iter()
            .map(|t| format!("r.{} {}", t.column, t.order.sql()))
            .collect();
        parts.push("r.rowid ASC".into());
        format!(" ORDER BY {}", parts.join(", "))
    }

    /// Full statement on top of the record select head, with its parameters
    /// in placeholder order.
    pub fn to_sql(&self, expand: bool) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = String::from(record::select_head(expand));
        sql.push_str(&self.where_sql());
        sql.push_str(&self.order_sql());

        let mut params: Vec<Box<dyn ToSql>> = self.clauses.iter().map(Clause::param).collect();
        if self.limit > 0 || self.offset > 0 {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Box::new(crate::models::sql_limit(self.limit)));
            params.push(Box::new(crate::models::sql_offset(self.offset)));
        }
        (sql, params)
    }
}

/// Maps a resolved filter and options to predicates and ordering.
pub fn compose(filter: &ResolvedFilter, options: &QueryOptions) -> SelectPlan {
    let mut clauses = Vec::new();

    if let Some(id) = &filter.id {
        clauses.push(Clause::IdEq(id.clone()));
    }
    if let Some(filename) = &filter.filename {
        clauses.push(Clause::FilenameContains(filename.clone()));
    }
    if let Some(archive_id) = &filter.archive_id {
        clauses.push(Clause::ArchiveIdEq(archive_id.clone()));
    }
    let refs = [
        ("path_id", &filter.path_id),
        ("host_id", &filter.host_id),
        ("app_set_id", &filter.app_set_id),
        ("backup_set_id", &filter.backup_set_id),
    ];
    for (column, id) in refs {
        if let Some(id) = id {
            clauses.push(Clause::RefEq { column, id: id.clone() });
        }
    }

    let times = &options.times;
    let bounds = [
        (times.backup_start, "backup_time", true),
        (times.backup_end, "backup_time", false),
        (times.archive_start, "archived_time", true),
        (times.archive_end, "archived_time", false),
    ];
    for (at, column, lower) in bounds {
        if let Some(at) = at {
            clauses.push(if lower {
                Clause::AtOrAfter { column, at }
            } else {
                Clause::AtOrBefore { column, at }
            });
        }
    }

    SelectPlan {
        clauses,
        order: order_terms(filter.record_type, options.backup_order, options.archive_order),
        limit: options.limit,
        offset: options.offset,
    }
}

/// Most recent existing record with the same (host, app set, path, filename).
/// A missing host or app set only matches rows that lack one too.
pub fn natural_key(
    host_id: Option<&str>,
    app_set_id: Option<&str>,
    path_id: &str,
    filename: &str,
) -> SelectPlan {
    SelectPlan {
        clauses: vec![
            Clause::RefMatches { column: "host_id", id: host_id.map(str::to_string) },
            Clause::RefMatches { column: "app_set_id", id: app_set_id.map(str::to_string) },
            Clause::RefEq { column: "path_id", id: path_id.to_string() },
            Clause::FilenameEq(filename.to_string()),
        ],
        order: order_terms(RecordType::All, SortOrder::Desc, SortOrder::Desc),
        limit: 1,
        offset: 0,
    }
}
