//! Seed data model: scopes and pages to load at startup.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::NewScope;

/// Root seed data structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub scopes: Vec<SeedScope>,
}

impl Seed {
    /// Load seed data from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate scope definitions and reject duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.scopes.is_empty() {
            return Err(AppError::validation("No scopes defined in seed data"));
        }

        let mut names = HashSet::new();
        for scope in &self.scopes {
            scope.to_new_scope().validate()?;
            if !names.insert(scope.name.trim().to_lowercase()) {
                return Err(AppError::validation(format!(
                    "Duplicate scope name in seed data: {}",
                    scope.name
                )));
            }
        }
        Ok(())
    }

    /// Find a seeded scope by case-insensitive name.
    pub fn find(&self, name: &str) -> Option<&SeedScope> {
        self.scopes
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// A scope definition with its initial pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedScope {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub auto_track: bool,

    /// Page URLs attached to the scope
    #[serde(default)]
    pub pages: Vec<String>,
}

impl SeedScope {
    pub fn to_new_scope(&self) -> NewScope {
        NewScope {
            name: self.name.clone(),
            description: self.description.clone(),
            patterns: self.patterns.clone(),
            auto_track: self.auto_track,
        }
    }
}
