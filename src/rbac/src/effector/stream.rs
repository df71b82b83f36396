//! Incremental effect combination

use super::{Effect, EffectExpr};

/// Snapshot of a stream effector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EffectState {
    /// Decision so far
    pub has_effect: bool,
    /// No further rule can change the decision
    pub done: bool,
    /// Rule that explains the decision
    pub explain_index: Option<usize>,
}

/// Effect combiner fed one rule at a time
pub trait StreamEffector: Send {
    /// Feed the effect of rule `index` out of `total`; returns whether the
    /// decision is final
    fn push(&mut self, effect: Effect, index: usize, total: usize) -> bool;

    fn current(&self) -> EffectState;
}

/// Stream counterpart of [`DefaultEffector`](super::DefaultEffector)
///
/// At the point the stream reports done, the decision and explain index are the
/// ones the whole-sequence form yields for the rules pushed so far.
#[derive(Debug, Clone)]
pub struct DefaultStreamEffector {
    expr: EffectExpr,
    state: EffectState,
}

impl DefaultStreamEffector {
    pub fn new(expr: EffectExpr) -> Self {
        Self {
            expr,
            state: EffectState {
                has_effect: expr.default_verdict(),
                done: false,
                explain_index: None,
            },
        }
    }

    pub fn expr(&self) -> EffectExpr {
        self.expr
    }

    fn settle(&mut self, has_effect: bool, index: usize) {
        self.state.has_effect = has_effect;
        self.state.explain_index = Some(index);
        self.state.done = true;
    }
}

impl StreamEffector for DefaultStreamEffector {
    fn push(&mut self, effect: Effect, index: usize, total: usize) -> bool {
        if self.state.done {
            return true;
        }

        match (self.expr, effect) {
            (EffectExpr::AllowOverride, Effect::Allow) => self.settle(true, index),
            (EffectExpr::DenyOverride, Effect::Deny) => self.settle(false, index),
            (EffectExpr::AllowAndDeny, Effect::Deny) => self.settle(false, index),
            (EffectExpr::AllowAndDeny, Effect::Allow) => {
                // a later deny may still override
                if self.state.explain_index.is_none() {
                    self.state.has_effect = true;
                    self.state.explain_index = Some(index);
                }
            }
            (EffectExpr::Priority, Effect::Allow) => self.settle(true, index),
            (EffectExpr::Priority, Effect::Deny) => self.settle(false, index),
            _ => {}
        }

        if index + 1 >= total {
            self.state.done = true;
        }
        self.state.done
    }

    fn current(&self) -> EffectState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effector::Effect::{Allow, Deny, Indeterminate};

    fn run(expr: EffectExpr, effects: &[Effect]) -> (EffectState, usize) {
        let mut stream = DefaultStreamEffector::new(expr);
        let mut consumed = 0;
        for (i, effect) in effects.iter().enumerate() {
            consumed += 1;
            if stream.push(*effect, i, effects.len()) {
                break;
            }
        }
        (stream.current(), consumed)
    }

    #[test]
    fn test_allow_override_stops_at_first_allow() {
        let (state, consumed) = run(EffectExpr::AllowOverride, &[Deny, Allow, Deny]);
        assert_eq!(consumed, 2);
        assert!(state.has_effect && state.done);
        assert_eq!(state.explain_index, Some(1));
    }

    #[test]
    fn test_allow_and_deny_waits_for_deny() {
        let mut stream = DefaultStreamEffector::new(EffectExpr::AllowAndDeny);
        assert!(!stream.push(Allow, 0, 3));
        assert!(stream.current().has_effect);
        assert!(stream.push(Deny, 1, 3));

        let state = stream.current();
        assert!(!state.has_effect);
        assert_eq!(state.explain_index, Some(1));
    }

    #[test]
    fn test_allow_and_deny_keeps_first_allow() {
        let (state, consumed) = run(EffectExpr::AllowAndDeny, &[Indeterminate, Allow, Allow]);
        assert_eq!(consumed, 3);
        assert!(state.has_effect && state.done);
        assert_eq!(state.explain_index, Some(1));
    }

    #[test]
    fn test_deny_override() {
        let stream = DefaultStreamEffector::new(EffectExpr::DenyOverride);
        assert!(stream.current().has_effect);

        let (state, consumed) = run(EffectExpr::DenyOverride, &[Allow, Deny, Allow]);
        assert_eq!(consumed, 2);
        assert!(!state.has_effect);
        assert_eq!(state.explain_index, Some(1));

        let (state, _) = run(EffectExpr::DenyOverride, &[Allow, Indeterminate]);
        assert!(state.has_effect && state.done);
        assert_eq!(state.explain_index, None);
    }

    #[test]
    fn test_priority_first_decisive_rule() {
        let (state, consumed) = run(EffectExpr::Priority, &[Indeterminate, Deny, Allow]);
        assert_eq!(consumed, 2);
        assert!(!state.has_effect);
        assert_eq!(state.explain_index, Some(1));
    }

    #[test]
    fn test_done_after_last_rule() {
        let (state, consumed) = run(EffectExpr::AllowOverride, &[Deny, Indeterminate]);
        assert_eq!(consumed, 2);
        assert!(state.done);
        assert!(!state.has_effect);
        assert_eq!(state.explain_index, None);
    }

    #[test]
    fn test_push_after_done_is_ignored() {
        let mut stream = DefaultStreamEffector::new(EffectExpr::Priority);
        assert!(stream.push(Allow, 0, 2));
        assert!(stream.push(Deny, 1, 2));
        assert!(stream.current().has_effect);
        assert_eq!(stream.current().explain_index, Some(0));
    }
}
