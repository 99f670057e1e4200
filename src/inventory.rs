//! Local entity collaborators.
//!
//! The panel proper owns the repositories that enumerate websites,
//! databases and managed projects; the migration subsystem only consumes
//! their connection-relevant attributes. This module defines those seams
//! as traits plus an in-memory implementation used by tests and the CLI
//! driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by entity lookups.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error("inventory backend error: {0}")]
    Backend(String),
}

/// Connection-relevant attributes of a local website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteInfo {
    pub id: u64,
    pub name: String,
    /// Listen addresses (e.g. `80`, `443 ssl`). Empty means default.
    #[serde(default)]
    pub listens: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    /// Custom serving path; empty when the site serves from its root.
    #[serde(default)]
    pub path: String,
    /// Site kind tag (`php`, `static`, `proxy`, ...).
    pub kind: String,
}

/// Connection-relevant attributes of a local database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    /// Database kind tag; `mysql` and `postgresql` are migratable.
    pub kind: String,
    /// Identifier of the owning database server entry on the panel.
    pub server_id: u64,
}

/// Connection-relevant attributes of a managed project/process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: u64,
    pub name: String,
    pub kind: String,
    /// Working directory; empty when the project has no directory of its own.
    #[serde(default)]
    pub root_dir: String,
    pub exec_start: String,
    pub user: String,
}

pub trait WebsiteRepo: Send + Sync {
    fn list(&self) -> Result<Vec<WebsiteInfo>, InventoryError>;
    fn get(&self, id: u64) -> Result<WebsiteInfo, InventoryError>;
}

pub trait DatabaseRepo: Send + Sync {
    fn list(&self) -> Result<Vec<DatabaseInfo>, InventoryError>;
}

pub trait ProjectRepo: Send + Sync {
    fn list(&self) -> Result<Vec<ProjectInfo>, InventoryError>;
    fn get(&self, id: u64) -> Result<ProjectInfo, InventoryError>;
}

/// Panel settings the migration needs (database credentials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MysqlRootPassword,
    PostgresPassword,
}

pub trait SettingStore: Send + Sync {
    /// Fetch a setting; `None` when unset (dump runs without a password).
    fn get(&self, key: SettingKey) -> Option<String>;
}

/// In-memory inventory implementing every collaborator trait. Tests build
/// one programmatically; the CLI deserializes one from its inventory file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MemoryInventory {
    #[serde(default)]
    pub websites: Vec<WebsiteInfo>,
    #[serde(default)]
    pub databases: Vec<DatabaseInfo>,
    #[serde(default)]
    pub projects: Vec<ProjectInfo>,
    #[serde(default)]
    pub mysql_root_password: Option<String>,
    #[serde(default)]
    pub postgres_password: Option<String>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_website(mut self, website: WebsiteInfo) -> Self {
        self.websites.push(website);
        self
    }

    pub fn with_database(mut self, database: DatabaseInfo) -> Self {
        self.databases.push(database);
        self
    }

    pub fn with_project(mut self, project: ProjectInfo) -> Self {
        self.projects.push(project);
        self
    }
}

impl WebsiteRepo for MemoryInventory {
    fn list(&self) -> Result<Vec<WebsiteInfo>, InventoryError> {
        Ok(self.websites.clone())
    }

    fn get(&self, id: u64) -> Result<WebsiteInfo, InventoryError> {
        self.websites
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(InventoryError::NotFound { kind: "website", id })
    }
}

impl DatabaseRepo for MemoryInventory {
    fn list(&self) -> Result<Vec<DatabaseInfo>, InventoryError> {
        Ok(self.databases.clone())
    }
}

impl ProjectRepo for MemoryInventory {
    fn list(&self) -> Result<Vec<ProjectInfo>, InventoryError> {
        Ok(self.projects.clone())
    }

    fn get(&self, id: u64) -> Result<ProjectInfo, InventoryError> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(InventoryError::NotFound { kind: "project", id })
    }
}

impl SettingStore for MemoryInventory {
    fn get(&self, key: SettingKey) -> Option<String> {
        match key {
            SettingKey::MysqlRootPassword => self.mysql_root_password.clone(),
            SettingKey::PostgresPassword => self.postgres_password.clone(),
        }
    }
}
