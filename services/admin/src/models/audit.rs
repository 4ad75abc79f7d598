//! Audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Logical zone an action happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Admin,
    Customer,
    Public,
    System,
}

impl Area {
    pub fn as_str(&self) -> &'static str {
        match self {
            Area::Admin => "admin",
            Area::Customer => "customer",
            Area::Public => "public",
            Area::System => "system",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Area::Admin),
            "customer" => Ok(Area::Customer),
            "public" => Ok(Area::Public),
            "system" => Ok(Area::System),
            other => Err(format!("Unknown audit area: {}", other)),
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// `None` for system-originated events or users deleted since
    pub user_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub area: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub metadata: Option<Value>,
}

/// Caller-supplied description of an audited action.
///
/// Request context fields left empty are filled in from the ambient
/// request when the entry is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogInput {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub module: String,
    pub area: Option<Area>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub metadata: Option<Value>,
}

impl AuditLogInput {
    pub fn new(action: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            module: module.into(),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn area(mut self, area: Area) -> Self {
        self.area = Some(area);
        self
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl ToString) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Optional filters for audit queries, combined with AND
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLogFilters {
    pub user_id: Option<Uuid>,
    pub module: Option<String>,
    pub action: Option<String>,
    pub area: Option<Area>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub request_id: Option<String>,
    /// Inclusive lower bound
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditLogFilters {
    /// Whether an entry satisfies every filter that is set
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        fn eq(filter: &Option<String>, value: &Option<String>) -> bool {
            match filter {
                Some(f) => value.as_deref() == Some(f.as_str()),
                None => true,
            }
        }

        self.user_id.is_none_or(|id| entry.user_id == Some(id))
            && self.module.as_ref().is_none_or(|m| &entry.module == m)
            && self.action.as_ref().is_none_or(|a| &entry.action == a)
            && self
                .area
                .is_none_or(|a| entry.area.as_deref() == Some(a.as_str()))
            && eq(&self.entity_type, &entry.entity_type)
            && eq(&self.entity_id, &entry.entity_id)
            && eq(&self.request_id, &entry.request_id)
            && self.start_date.is_none_or(|start| entry.timestamp >= start)
            && self.end_date.is_none_or(|end| entry.timestamp <= end)
    }
}

/// One page of audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogEntry>,
    /// Rows matching the filters, ignoring pagination
    pub total: i64,
    /// Rows in this page
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}
