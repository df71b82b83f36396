//! # CretoAI RBAC Core
//!
//! Role inheritance resolution and effect combination for the CretoAI
//! authorization engine.
//!
//! ## Features
//!
//! - **Role managers** answering "does X inherit Y (in domain D)?" over a
//!   name-indexed graph with a bounded breadth-first walk
//! - **Multi-tenant domains** with wildcard domain patterns and an LRU of
//!   pattern-match results
//! - **Conditional links** gated by caller-supplied guards
//! - **Group fallback** through default-namespace group memberships
//! - **Effectors** folding per-rule effects into a decision, with a streaming
//!   form that stops as soon as the outcome is fixed
//! - **Cycle detection** for offline model validation
//!
//! ## Example
//!
//! ```rust
//! use cretoai_rbac::{DomainRoleManager, RoleManager};
//! use cretoai_rbac::role_manager::wildcard_match;
//!
//! let rm = DomainRoleManager::new(10);
//! rm.add_domain_matching_fn(wildcard_match);
//!
//! rm.add_link("alice", "admin", &["*"]).unwrap();
//! rm.add_link("bob", "viewer", &["tenant1"]).unwrap();
//!
//! assert!(rm.has_link("alice", "admin", &["tenant7"]).unwrap());
//! assert!(rm.has_link("bob", "viewer", &["tenant1"]).unwrap());
//! assert!(!rm.has_link("bob", "viewer", &["tenant2"]).unwrap());
//! ```

pub mod config;
pub mod cycle;
pub mod effector;
pub mod enforcer;
pub mod error;
pub mod role_manager;

// Re-export commonly used types
pub use config::{ModelConfig, RbacConfig, RoleManagerConfig};
pub use cycle::CycleDetector;
pub use effector::{
    DefaultEffector, DefaultStreamEffector, Effect, EffectExpr, EffectState, Effector,
    StreamEffector,
};
pub use enforcer::{Enforcer, MatchContext, Matcher, Model};
pub use error::{RbacError, Result};
pub use role_manager::{
    ConditionalRoleManager, DefaultRoleManager, DomainRoleManager, GroupRoleManager, RoleLinks,
    RoleManager,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
