//! Entity Types and Role Bindings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of tenant an entity represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    District,
    Nonprofit,
    Business,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::District => "district",
            EntityKind::Nonprofit => "nonprofit",
            EntityKind::Business => "business",
        }
    }

    /// Only nonprofits carry a governance board.
    pub fn supports_boards(&self) -> bool {
        matches!(self, EntityKind::Nonprofit)
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "district" => Ok(EntityKind::District),
            "nonprofit" => Ok(EntityKind::Nonprofit),
            "business" => Ok(EntityKind::Business),
            _ => Err(format!("Invalid entity kind: {}", s)),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role a profile holds on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    Admin,
    Editor,
    Viewer,
    Employee,
}

impl EntityRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityRole::Admin => "admin",
            EntityRole::Editor => "editor",
            EntityRole::Viewer => "viewer",
            EntityRole::Employee => "employee",
        }
    }

    pub fn can_manage_governance(&self) -> bool {
        matches!(self, EntityRole::Admin | EntityRole::Editor)
    }

    pub fn can_manage_users(&self) -> bool {
        matches!(self, EntityRole::Admin)
    }
}

impl FromStr for EntityRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(EntityRole::Admin),
            "editor" => Ok(EntityRole::Editor),
            "viewer" => Ok(EntityRole::Viewer),
            "employee" => Ok(EntityRole::Employee),
            _ => Err(format!("Invalid entity role: {}", s)),
        }
    }
}

impl fmt::Display for EntityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityUser {
    pub id: i64,
    pub entity_id: i64,
    pub profile_id: String,
    pub role: EntityRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEntity {
    pub kind: EntityKind,
    pub name: String,
    pub slug: Option<String>,
}

/// Lowercase, hyphen-separated slug derived from a display name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
