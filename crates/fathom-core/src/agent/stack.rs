//! Depth-bounded subtask stack.
//!
//! The stack is the agent's recursion spine: the bottom record is the root
//! task (its knowledge gaps double as the checklist for the whole run), the
//! top record is the subtask being actively worked. Depth is bounded so
//! that decomposition cannot recurse forever.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One unit of work: an objective plus the plan and gap checklist the
/// decomposition engine fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskRecord {
    pub objective: String,
    pub working_plan: Option<String>,
    pub knowledge_gaps: Option<String>,
}

impl SubtaskRecord {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            working_plan: None,
            knowledge_gaps: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackError {
    /// Cannot decompose further; caller proceeds with the current top.
    #[error("subtask depth limit of {max_depth} reached")]
    DepthExceeded { max_depth: usize },
    /// Terminal condition: no subtask remains.
    #[error("subtask stack is empty")]
    Empty,
}

/// Explicit bounded stack. Invariant: `0 <= len <= max_depth + 1` (the root
/// does not count against the decomposition budget).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskStack {
    records: Vec<SubtaskRecord>,
    max_depth: usize,
}

impl SubtaskStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            records: Vec::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a follow-up exploration may push at the current depth. This
    /// gate is deliberately stricter than `push` itself: exploration stops
    /// at `max_depth`, while failure reflection may still grow the stack to
    /// `max_depth + 1`.
    pub fn can_push(&self) -> bool {
        self.records.len() < self.max_depth
    }

    /// Push a fresh subtask. Fails with `DepthExceeded` once the stack
    /// already holds `max_depth + 1` records, leaving the stack unchanged.
    pub fn push(&mut self, objective: impl Into<String>) -> Result<(), StackError> {
        if self.records.len() > self.max_depth {
            return Err(StackError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.records.push(SubtaskRecord::new(objective));
        Ok(())
    }

    /// Pop the active subtask. Fails with `Empty` when nothing remains.
    pub fn pop(&mut self) -> Result<SubtaskRecord, StackError> {
        self.records.pop().ok_or(StackError::Empty)
    }

    pub fn peek(&self) -> Result<&SubtaskRecord, StackError> {
        self.records.last().ok_or(StackError::Empty)
    }

    pub fn peek_mut(&mut self) -> Result<&mut SubtaskRecord, StackError> {
        self.records.last_mut().ok_or(StackError::Empty)
    }

    /// The root record; its gaps are the whole-task checklist.
    pub fn root(&self) -> Result<&SubtaskRecord, StackError> {
        self.records.first().ok_or(StackError::Empty)
    }

    /// Partial update of the top record. Omitted fields are untouched.
    pub fn revise_top(
        &mut self,
        plan: Option<String>,
        gaps: Option<String>,
    ) -> Result<(), StackError> {
        let top = self.peek_mut()?;
        if let Some(plan) = plan {
            top.working_plan = Some(plan);
        }
        if let Some(gaps) = gaps {
            top.knowledge_gaps = Some(gaps);
        }
        Ok(())
    }

    /// Records from bottom to top, for ancestor-plan context.
    pub fn records(&self) -> &[SubtaskRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Replace the contents wholesale (snapshot restore). Entries beyond
    /// the depth bound are refused.
    pub fn restore(&mut self, records: Vec<SubtaskRecord>) -> Result<(), StackError> {
        if records.len() > self.max_depth + 1 {
            return Err(StackError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        self.records = records;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_invariant_holds_under_push_pop_sequences() {
        let mut stack = SubtaskStack::new(2);
        stack.push("root").unwrap();
        stack.push("child").unwrap();
        // The exploration gate closes at max_depth, but a reflection push
        // may still grow the stack one past it.
        assert!(!stack.can_push());
        stack.push("grandchild").unwrap();
        assert_eq!(
            stack.push("great-grandchild"),
            Err(StackError::DepthExceeded { max_depth: 2 })
        );
        // Failed push left the stack unchanged.
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.peek().unwrap().objective, "grandchild");

        stack.pop().unwrap();
        stack.push("child2").unwrap();
        assert!(stack.len() <= stack.max_depth() + 1);
    }

    #[test]
    fn reflection_may_push_once_past_the_exploration_gate() {
        let mut stack = SubtaskStack::new(1);
        stack.push("root").unwrap();
        assert!(!stack.can_push());
        stack.push("decomposed step").unwrap();
        assert_eq!(stack.len(), stack.max_depth() + 1);
        assert_eq!(
            stack.push("too deep"),
            Err(StackError::DepthExceeded { max_depth: 1 })
        );
    }

    #[test]
    fn pop_after_push_returns_fresh_record() {
        let mut stack = SubtaskStack::new(3);
        stack.push("investigate X").unwrap();
        let record = stack.pop().unwrap();
        assert_eq!(record.objective, "investigate X");
        assert!(record.working_plan.is_none());
        assert!(record.knowledge_gaps.is_none());
    }

    #[test]
    fn pop_and_peek_on_empty_stack_fail() {
        let mut stack = SubtaskStack::new(1);
        assert_eq!(stack.pop(), Err(StackError::Empty));
        assert_eq!(stack.peek().err(), Some(StackError::Empty));
    }

    #[test]
    fn revise_top_is_partial() {
        let mut stack = SubtaskStack::new(2);
        stack.push("root").unwrap();
        stack
            .revise_top(Some("1. search".into()), Some("- [ ] find y".into()))
            .unwrap();
        stack.revise_top(None, Some("- [x] find y".into())).unwrap();

        let top = stack.peek().unwrap();
        assert_eq!(top.working_plan.as_deref(), Some("1. search"));
        assert_eq!(top.knowledge_gaps.as_deref(), Some("- [x] find y"));
    }

    #[test]
    fn restore_refuses_over_budget_snapshots() {
        let mut stack = SubtaskStack::new(1);
        let too_deep = vec![
            SubtaskRecord::new("a"),
            SubtaskRecord::new("b"),
            SubtaskRecord::new("c"),
        ];
        assert!(stack.restore(too_deep).is_err());
        assert!(stack.is_empty());
    }
}
