//! Core data model.
//!
//! A shipment owns its workflow steps and alerts; users are referenced,
//! never owned. All ids are database-assigned numeric keys.

pub mod alert;
pub mod shipment;
pub mod workflow;

use serde::{Deserialize, Serialize};

/// Newtype for user ids. Users live in a thin directory table; the core
/// only ever references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as resolved from the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub department: String,
}

/// PPR/APR assignment for one department, resolved at step-generation time.
#[derive(Debug, Clone, Copy)]
pub struct Assignment {
    pub ppr: UserId,
    pub apr: Option<UserId>,
}
