//! Navigation menu models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Flat menu row as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub id: Uuid,
    pub label: String,
    /// Absent for group nodes
    pub href: Option<String>,
    pub icon: Option<String>,
    pub permission_id: Option<String>,
    pub is_active: bool,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    pub parent_id: Option<Uuid>,
}

/// Rendered menu node with its visible children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuNode {
    pub id: Uuid,
    pub label: String,
    pub href: Option<String>,
    pub icon: Option<String>,
    pub permission_id: Option<String>,
    pub order: i32,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    /// Group nodes carry no link of their own
    pub fn is_group(&self) -> bool {
        self.href.is_none()
    }
}
