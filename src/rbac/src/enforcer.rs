//! Enforcement loop
//!
//! Ties the pieces together: each policy rule is tested by the [`Matcher`],
//! which may ask the registered role managers about inheritance; the rule's
//! effect is fed to a stream effector until the decision is final.
//!
//! ```text
//! request → for each rule: Matcher(ctx) ──→ Effect ──→ StreamEffector
//!                             │                             │
//!                             └─ ctx.has_link("g", ..) ─→ RoleManager
//!                                                           ↓
//!                                                (decision, explaining rule)
//! ```
//!
//! # Example
//!
//! ```rust
//! use cretoai_rbac::config::ModelConfig;
//! use cretoai_rbac::enforcer::{Enforcer, Model};
//!
//! let model = Model::from_config(&ModelConfig::default()).unwrap();
//! let enforcer = Enforcer::new(model, |ctx| {
//!     Ok(ctx.has_link("g", ctx.r("sub"), ctx.p("sub"), None)?
//!         && ctx.r("obj") == ctx.p("obj")
//!         && ctx.r("act") == ctx.p("act"))
//! });
//!
//! enforcer.add_policy(&["editor", "doc1", "write"]).unwrap();
//! enforcer.add_grouping_policy(&["alice", "editor"]).unwrap();
//!
//! assert!(enforcer.enforce(&["alice", "doc1", "write"]).unwrap());
//! assert!(!enforcer.enforce(&["bob", "doc1", "write"]).unwrap());
//! ```

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ModelConfig, RbacConfig, RoleManagerConfig};
use crate::effector::{DefaultEffector, Effect, EffectExpr, Effector};
use crate::error::{RbacError, Result};
use crate::role_manager::{DomainRoleManager, RoleManager};

/// Grouping type used by [`Enforcer::add_grouping_policy`]
pub const DEFAULT_GROUPING_TYPE: &str = "g";

const EFFECT_TOKEN: &str = "eft";

/// Request and policy layout plus the effect combination rule
#[derive(Debug, Clone)]
pub struct Model {
    request: Vec<String>,
    policy: Vec<String>,
    eft_index: Option<usize>,
    effect: EffectExpr,
}

impl Model {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        if config.request.is_empty() || config.policy.is_empty() {
            return Err(RbacError::Config(
                "model must name request and policy tokens".to_string(),
            ));
        }
        let effect: EffectExpr = config.effect.parse()?;

        Ok(Self {
            request: config.request.clone(),
            policy: config.policy.clone(),
            eft_index: config.policy.iter().position(|t| t == EFFECT_TOKEN),
            effect,
        })
    }

    pub fn request_tokens(&self) -> &[String] {
        &self.request
    }

    pub fn policy_tokens(&self) -> &[String] {
        &self.policy
    }

    pub fn effect(&self) -> EffectExpr {
        self.effect
    }

    /// Effect a matched rule contributes; rules without an `eft` field allow
    fn rule_effect(&self, rule: &[String]) -> Effect {
        match self.eft_index.and_then(|i| rule.get(i)) {
            Some(eft) => Effect::from_eft(eft),
            None => Effect::Allow,
        }
    }
}

/// View of one (request, rule) pair handed to the matcher
pub struct MatchContext<'a> {
    model: &'a Model,
    request: &'a [String],
    rule: &'a [String],
    role_managers: &'a DashMap<String, Arc<dyn RoleManager>>,
}

impl<'a> MatchContext<'a> {
    /// Request field named `token`, or `""` if the model has no such token
    pub fn r(&self, token: &str) -> &'a str {
        field(&self.model.request, self.request, token)
    }

    /// Rule field named `token`, or `""` if the model has no such token
    pub fn p(&self, token: &str) -> &'a str {
        field(&self.model.policy, self.rule, token)
    }

    pub fn request(&self) -> &'a [String] {
        self.request
    }

    pub fn rule(&self) -> &'a [String] {
        self.rule
    }

    /// Ask the role manager registered for `ptype` whether `name1` inherits `name2`
    pub fn has_link(
        &self,
        ptype: &str,
        name1: &str,
        name2: &str,
        domain: Option<&str>,
    ) -> Result<bool> {
        let rm = self
            .role_managers
            .get(ptype)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                RbacError::InvalidArgument(format!("no role manager for grouping type {}", ptype))
            })?;

        match domain {
            Some(domain) => rm.has_link(name1, name2, &[domain]),
            None => rm.has_link(name1, name2, &[]),
        }
    }
}

fn field<'a>(tokens: &[String], values: &'a [String], token: &str) -> &'a str {
    tokens
        .iter()
        .position(|t| t == token)
        .and_then(|i| values.get(i))
        .map(String::as_str)
        .unwrap_or("")
}

/// Decides whether a rule applies to a request
pub trait Matcher: Send + Sync {
    fn matches(&self, ctx: &MatchContext<'_>) -> anyhow::Result<bool>;
}

impl<F> Matcher for F
where
    F: Fn(&MatchContext<'_>) -> anyhow::Result<bool> + Send + Sync,
{
    fn matches(&self, ctx: &MatchContext<'_>) -> anyhow::Result<bool> {
        self(ctx)
    }
}

/// Policy store, role managers and effector behind `enforce`
pub struct Enforcer {
    model: Model,
    matcher: Arc<dyn Matcher>,
    effector: Box<dyn Effector>,
    policy: RwLock<Vec<Vec<String>>>,
    grouping_policy: RwLock<IndexMap<String, Vec<Vec<String>>>>,
    role_managers: DashMap<String, Arc<dyn RoleManager>>,
    role_manager_config: RoleManagerConfig,
}

impl Enforcer {
    /// Enforcer with a default role manager registered for `g`
    pub fn new<F>(model: Model, matcher: F) -> Self
    where
        F: Fn(&MatchContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::with_matcher(model, Arc::new(matcher), RoleManagerConfig::default())
    }

    /// Build the model and role manager bound from configuration
    pub fn from_config<F>(config: &RbacConfig, matcher: F) -> Result<Self>
    where
        F: Fn(&MatchContext<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        config.validate()?;
        let model = Model::from_config(&config.model)?;
        Ok(Self::with_matcher(
            model,
            Arc::new(matcher),
            config.role_manager.clone(),
        ))
    }

    /// Enforcer whose default role managers are built from `role_manager_config`
    pub fn with_matcher(
        model: Model,
        matcher: Arc<dyn Matcher>,
        role_manager_config: RoleManagerConfig,
    ) -> Self {
        let role_managers: DashMap<String, Arc<dyn RoleManager>> = DashMap::new();
        role_managers.insert(
            DEFAULT_GROUPING_TYPE.to_string(),
            Arc::new(DomainRoleManager::from_config(&role_manager_config)),
        );

        info!(
            effect = %model.effect,
            request = ?model.request,
            policy = ?model.policy,
            "enforcer initialized"
        );

        Self {
            model,
            matcher,
            effector: Box::new(DefaultEffector::new()),
            policy: RwLock::new(Vec::new()),
            grouping_policy: RwLock::new(IndexMap::new()),
            role_managers,
            role_manager_config,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Settings used for role managers the enforcer creates itself
    pub fn role_manager_config(&self) -> &RoleManagerConfig {
        &self.role_manager_config
    }

    pub fn set_effector(&mut self, effector: Box<dyn Effector>) {
        self.effector = effector;
    }

    /// Replace the role manager for `ptype` and load the stored grouping rules into it
    pub fn set_role_manager(&self, ptype: &str, rm: Arc<dyn RoleManager>) -> Result<()> {
        rm.clear();
        if let Some(rules) = self.grouping_policy.read().get(ptype) {
            for rule in rules {
                apply_link(rm.as_ref(), rule, true)?;
            }
        }
        self.role_managers.insert(ptype.to_string(), rm);
        Ok(())
    }

    pub fn role_manager(&self, ptype: &str) -> Option<Arc<dyn RoleManager>> {
        self.role_managers.get(ptype).map(|entry| Arc::clone(entry.value()))
    }

    /// Add a rule; returns `false` if it was already present
    pub fn add_policy(&self, rule: &[&str]) -> Result<bool> {
        if rule.len() != self.model.policy.len() {
            return Err(RbacError::InvalidPolicy(format!(
                "rule has {} fields, model declares {}",
                rule.len(),
                self.model.policy.len()
            )));
        }
        let rule = owned(rule);
        let mut policy = self.policy.write();
        if policy.contains(&rule) {
            return Ok(false);
        }
        policy.push(rule);
        Ok(true)
    }

    /// Remove a rule; returns `false` if it was not present
    pub fn remove_policy(&self, rule: &[&str]) -> Result<bool> {
        let rule = owned(rule);
        let mut policy = self.policy.write();
        match policy.iter().position(|r| *r == rule) {
            Some(idx) => {
                policy.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn policy(&self) -> Vec<Vec<String>> {
        self.policy.read().clone()
    }

    /// Add a `g` rule: `[user, role]` or `[user, role, domain]`
    pub fn add_grouping_policy(&self, rule: &[&str]) -> Result<bool> {
        self.add_named_grouping_policy(DEFAULT_GROUPING_TYPE, rule)
    }

    pub fn remove_grouping_policy(&self, rule: &[&str]) -> Result<bool> {
        self.remove_named_grouping_policy(DEFAULT_GROUPING_TYPE, rule)
    }

    /// Add a grouping rule of type `ptype`, registering a default role manager
    /// for it if none exists
    pub fn add_named_grouping_policy(&self, ptype: &str, rule: &[&str]) -> Result<bool> {
        check_grouping_rule(rule)?;
        let rule = owned(rule);

        let mut grouping = self.grouping_policy.write();
        let rules = grouping.entry(ptype.to_string()).or_default();
        if rules.contains(&rule) {
            return Ok(false);
        }

        let rm = self.role_manager_or_default(ptype);
        apply_link(rm.as_ref(), &rule, true)?;
        rules.push(rule);
        Ok(true)
    }

    pub fn remove_named_grouping_policy(&self, ptype: &str, rule: &[&str]) -> Result<bool> {
        check_grouping_rule(rule)?;
        let rule = owned(rule);

        let mut grouping = self.grouping_policy.write();
        let Some(rules) = grouping.get_mut(ptype) else {
            return Ok(false);
        };
        let Some(idx) = rules.iter().position(|r| *r == rule) else {
            return Ok(false);
        };

        if let Some(rm) = self.role_manager(ptype) {
            apply_link(rm.as_ref(), &rule, false)?;
        }
        rules.remove(idx);
        Ok(true)
    }

    pub fn grouping_policy(&self, ptype: &str) -> Vec<Vec<String>> {
        self.grouping_policy
            .read()
            .get(ptype)
            .cloned()
            .unwrap_or_default()
    }

    /// Clear every role manager and reload it from the stored grouping rules
    pub fn build_role_links(&self) -> Result<()> {
        let grouping = self.grouping_policy.read();
        for entry in self.role_managers.iter() {
            entry.value().clear();
        }
        for (ptype, rules) in grouping.iter() {
            let rm = self.role_manager_or_default(ptype);
            for rule in rules {
                apply_link(rm.as_ref(), rule, true)?;
            }
        }
        debug!(grouping_types = grouping.len(), "role links rebuilt");
        Ok(())
    }

    pub fn enforce(&self, request: &[&str]) -> Result<bool> {
        self.enforce_ex(request).map(|(allowed, _)| allowed)
    }

    /// Decide a request and return the rule that explains the decision, if any
    pub fn enforce_ex(&self, request: &[&str]) -> Result<(bool, Option<Vec<String>>)> {
        if request.len() != self.model.request.len() {
            return Err(RbacError::InvalidArgument(format!(
                "request has {} fields, model declares {}",
                request.len(),
                self.model.request.len()
            )));
        }
        let request = owned(request);

        let policy = self.policy.read();
        let total = policy.len();
        let mut stream = self.effector.new_stream_effector(self.model.effect.as_str())?;

        for (index, rule) in policy.iter().enumerate() {
            let ctx = MatchContext {
                model: &self.model,
                request: &request,
                rule,
                role_managers: &self.role_managers,
            };
            let matched = self
                .matcher
                .matches(&ctx)
                .map_err(|e| RbacError::Evaluation(format!("rule {}: {:#}", index, e)))?;

            let effect = if matched {
                self.model.rule_effect(rule)
            } else {
                Effect::Indeterminate
            };

            if stream.push(effect, index, total) {
                break;
            }
        }

        let state = stream.current();
        let explain = state.explain_index.and_then(|i| policy.get(i).cloned());
        debug!(
            request = ?request,
            allowed = state.has_effect,
            explain = ?explain,
            "request enforced"
        );
        Ok((state.has_effect, explain))
    }

    fn role_manager_or_default(&self, ptype: &str) -> Arc<dyn RoleManager> {
        let config = &self.role_manager_config;
        let entry = self
            .role_managers
            .entry(ptype.to_string())
            .or_insert_with(|| Arc::new(DomainRoleManager::from_config(config)));
        Arc::clone(entry.value())
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

fn check_grouping_rule(rule: &[&str]) -> Result<()> {
    match rule.len() {
        2 | 3 => Ok(()),
        n => Err(RbacError::InvalidPolicy(format!(
            "grouping rule needs 2 or 3 fields, got {}",
            n
        ))),
    }
}

fn apply_link(rm: &dyn RoleManager, rule: &[String], add: bool) -> Result<()> {
    let domains: Vec<&str> = rule.iter().skip(2).map(String::as_str).collect();
    match (rule, add) {
        ([user, role, ..], true) => rm.add_link(user, role, &domains),
        ([user, role, ..], false) => rm.delete_link(user, role, &domains),
        _ => Err(RbacError::InvalidPolicy(format!(
            "grouping rule needs 2 or 3 fields, got {}",
            rule.len()
        ))),
    }
}
