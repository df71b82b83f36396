//! Effect combination
//!
//! Folds the ordered per-rule effects produced by the matcher into one
//! decision. [`DefaultEffector::merge_effects`] takes the whole sequence at
//! once; [`StreamEffector`] consumes it rule by rule and reports when the
//! outcome can no longer change.

mod stream;

pub use stream::{DefaultStreamEffector, EffectState, StreamEffector};

use std::fmt;
use std::str::FromStr;

use crate::error::{RbacError, Result};

/// Outcome of a single rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Allow,
    Deny,
    /// The rule did not match the request
    Indeterminate,
}

impl Effect {
    /// Effect declared by a rule's `eft` field
    ///
    /// Anything other than `allow` or `deny` leaves the rule without an effect.
    pub fn from_eft(value: &str) -> Self {
        match value {
            "allow" => Effect::Allow,
            "deny" => Effect::Deny,
            _ => Effect::Indeterminate,
        }
    }
}

/// Combination rule declared by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectExpr {
    /// `some(where (p.eft == allow))`
    AllowOverride,
    /// `!some(where (p.eft == deny))`
    DenyOverride,
    /// `some(where (p.eft == allow)) && !some(where (p.eft == deny))`
    AllowAndDeny,
    /// `priority(p.eft) || deny`
    Priority,
}

impl EffectExpr {
    pub const ALL: [EffectExpr; 4] = [
        EffectExpr::AllowOverride,
        EffectExpr::DenyOverride,
        EffectExpr::AllowAndDeny,
        EffectExpr::Priority,
    ];

    /// Canonical expression text
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectExpr::AllowOverride => "some(where (p.eft == allow))",
            EffectExpr::DenyOverride => "!some(where (p.eft == deny))",
            EffectExpr::AllowAndDeny => {
                "some(where (p.eft == allow)) && !some(where (p.eft == deny))"
            }
            EffectExpr::Priority => "priority(p.eft) || deny",
        }
    }

    /// Decision over a sequence that contains no deciding rule
    pub(crate) fn default_verdict(&self) -> bool {
        matches!(self, EffectExpr::DenyOverride)
    }
}

impl fmt::Display for EffectExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectExpr {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self> {
        let compact = strip_whitespace(s);
        EffectExpr::ALL
            .into_iter()
            .find(|expr| strip_whitespace(expr.as_str()) == compact)
            .ok_or_else(|| RbacError::UnsupportedEffect(s.trim().to_string()))
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Effect combination capability
pub trait Effector: Send + Sync {
    /// Combine a complete effect sequence
    ///
    /// `matches` holds the matcher result per rule; an entry of `0.0` marks the
    /// rule as not matched regardless of its effect. It may be empty, in which
    /// case every effect is taken as given. Returns the decision and the index
    /// of the rule that explains it, if any.
    fn merge_effects(
        &self,
        expr: &str,
        effects: &[Effect],
        matches: &[f64],
    ) -> Result<(bool, Option<usize>)>;

    /// Fresh incremental combiner for one enforcement call
    fn new_stream_effector(&self, expr: &str) -> Result<Box<dyn StreamEffector>>;
}

/// Effector implementing the four built-in combination rules
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEffector;

impl DefaultEffector {
    pub fn new() -> Self {
        Self
    }

    /// Combine a sequence under an already parsed expression
    pub fn merge(expr: EffectExpr, effects: &[Effect]) -> (bool, Option<usize>) {
        let first = |wanted: Effect| effects.iter().position(|e| *e == wanted);

        match expr {
            EffectExpr::AllowOverride => match first(Effect::Allow) {
                Some(idx) => (true, Some(idx)),
                None => (false, None),
            },
            EffectExpr::DenyOverride => match first(Effect::Deny) {
                Some(idx) => (false, Some(idx)),
                None => (true, None),
            },
            EffectExpr::AllowAndDeny => match (first(Effect::Deny), first(Effect::Allow)) {
                (Some(deny), _) => (false, Some(deny)),
                (None, Some(allow)) => (true, Some(allow)),
                (None, None) => (false, None),
            },
            EffectExpr::Priority => effects
                .iter()
                .position(|e| *e != Effect::Indeterminate)
                .map(|idx| (effects[idx] == Effect::Allow, Some(idx)))
                .unwrap_or((false, None)),
        }
    }
}

impl Effector for DefaultEffector {
    fn merge_effects(
        &self,
        expr: &str,
        effects: &[Effect],
        matches: &[f64],
    ) -> Result<(bool, Option<usize>)> {
        let expr: EffectExpr = expr.parse()?;

        if !matches.is_empty() && matches.len() != effects.len() {
            return Err(RbacError::InvalidArgument(format!(
                "{} match results for {} effects",
                matches.len(),
                effects.len()
            )));
        }

        let effective: Vec<Effect> = effects
            .iter()
            .enumerate()
            .map(|(i, effect)| match matches.get(i) {
                Some(m) if *m == 0.0 => Effect::Indeterminate,
                _ => *effect,
            })
            .collect();

        Ok(Self::merge(expr, &effective))
    }

    fn new_stream_effector(&self, expr: &str) -> Result<Box<dyn StreamEffector>> {
        let expr: EffectExpr = expr.parse()?;
        Ok(Box::new(DefaultStreamEffector::new(expr)))
    }
}
