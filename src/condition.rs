use std::collections::HashSet;

/// A conjunction of key presence/absence terms over the observed board,
/// with an optional global negation. Disjunction is obtained through
/// De Morgan: `or(a, b) = neg(and(neg(a), neg(b)))`.
///
/// Evaluation is a pure function of the observed key set, so the driver
/// snapshots the board once per cycle and evaluates every rule against
/// that snapshot.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    terms: Vec<(String, bool)>,
    negated: bool,
}

impl Condition {
    /// The empty conjunction, which is true.
    pub fn trivial() -> Condition {
        Condition::default()
    }

    pub fn present(key: impl Into<String>) -> Condition {
        Condition {
            terms: vec![(key.into(), true)],
            negated: false,
        }
    }

    pub fn absent(key: impl Into<String>) -> Condition {
        Condition {
            terms: vec![(key.into(), false)],
            negated: false,
        }
    }

    pub fn and_present(mut self, key: impl Into<String>) -> Condition {
        self.terms.push((key.into(), true));
        self
    }

    pub fn and_absent(mut self, key: impl Into<String>) -> Condition {
        self.terms.push((key.into(), false));
        self
    }

    /// Conjunction of two non-negated conditions; negated operands
    /// belong in a [`JointCondition`].
    pub fn and(mut self, other: Condition) -> Condition {
        debug_assert!(!self.negated && !other.negated);
        self.terms.extend(other.terms);
        self
    }

    pub fn neg(mut self) -> Condition {
        self.negated = !self.negated;
        self
    }

    pub fn eval(&self, files: &HashSet<String>) -> bool {
        let conjunction = self
            .terms
            .iter()
            .all(|(key, expected)| files.contains(key) == *expected);

        conjunction != self.negated
    }
}

/// A conjunction of conditions, evaluated with short-circuit.
#[derive(Debug, Clone, Default)]
pub struct JointCondition {
    conditions: Vec<Condition>,
}

impl JointCondition {
    pub fn of(conditions: Vec<Condition>) -> JointCondition {
        JointCondition { conditions }
    }

    pub fn and(mut self, condition: Condition) -> JointCondition {
        self.conditions.push(condition);
        self
    }

    pub fn eval(&self, files: &HashSet<String>) -> bool {
        self.conditions.iter().all(|c| c.eval(files))
    }
}

impl From<Condition> for JointCondition {
    fn from(condition: Condition) -> JointCondition {
        JointCondition {
            conditions: vec![condition],
        }
    }
}
