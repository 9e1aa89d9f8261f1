//! The three-stage brainstorm taxonomy and its status enums.
//!
//! Prompt templates and ordering are plain data in [`PHASE_TABLE`]; the
//! transition rules that consume these statuses live in the
//! [`workflow`](crate::workflow) module, not here.

use serde::{Deserialize, Serialize};

/// One stage of the fixed three-stage brainstorm workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseType {
    /// Each persona brainstorms independently from its own professional angle.
    IdeaGeneration,
    /// Each persona assesses the feasibility of the ideas produced so far.
    FeasibilityAnalysis,
    /// Each persona critiques the weaknesses of the surviving ideas.
    DrawbackDiscussion,
}

/// Static description of one phase: its position and prompt templates.
///
/// Templates carry the named placeholders `{roleType}`, `{topic}` and
/// `{context}`, substituted by the orchestrator when tasks are built.
pub struct PhaseSpec {
    pub phase: PhaseType,
    pub order: usize,
    pub display_name: &'static str,
    pub system_prompt_template: &'static str,
    pub user_prompt_template: &'static str,
}

/// The canonical phase sequence, in execution order.
pub static PHASE_TABLE: [PhaseSpec; 3] = [
    PhaseSpec {
        phase: PhaseType::IdeaGeneration,
        order: 0,
        display_name: "Idea Generation",
        system_prompt_template: "You are a {roleType} taking part in a collaborative \
             brainstorm. Generate original, concrete ideas from the perspective of your \
             profession. Be specific and constructive.",
        user_prompt_template: "Topic: {topic}\n\nSession background:\n{context}\n\n\
             Propose your best ideas for this topic, each with a short rationale.",
    },
    PhaseSpec {
        phase: PhaseType::FeasibilityAnalysis,
        order: 1,
        display_name: "Feasibility Analysis",
        system_prompt_template: "You are a {roleType} taking part in a collaborative \
             brainstorm. Evaluate the feasibility of the ideas produced in the previous \
             stage from the perspective of your profession: cost, effort, dependencies, \
             and risk.",
        user_prompt_template: "Topic: {topic}\n\nSession background and prior results:\n\
             {context}\n\nAssess how feasible each idea is and rank them.",
    },
    PhaseSpec {
        phase: PhaseType::DrawbackDiscussion,
        order: 2,
        display_name: "Drawback Discussion",
        system_prompt_template: "You are a {roleType} taking part in a collaborative \
             brainstorm. Critically examine the surviving ideas for weaknesses, failure \
             modes, and hidden costs from the perspective of your profession.",
        user_prompt_template: "Topic: {topic}\n\nSession background and prior results:\n\
             {context}\n\nList the most important drawbacks of each idea and how they \
             might be mitigated.",
    },
];

impl PhaseType {
    /// The first phase of every session.
    pub fn first() -> PhaseType {
        PHASE_TABLE[0].phase
    }

    /// The final phase of every session.
    pub fn last() -> PhaseType {
        PHASE_TABLE[PHASE_TABLE.len() - 1].phase
    }

    /// All phases, in execution order.
    pub fn all() -> impl Iterator<Item = PhaseType> {
        PHASE_TABLE.iter().map(|spec| spec.phase)
    }

    pub fn order_index(self) -> usize {
        self.spec().order
    }

    /// The phase after this one, or `None` for the last phase.
    pub fn next(self) -> Option<PhaseType> {
        PHASE_TABLE.get(self.order_index() + 1).map(|spec| spec.phase)
    }

    /// The phase before this one, or `None` for the first phase.
    pub fn previous(self) -> Option<PhaseType> {
        let order = self.order_index();
        if order == 0 {
            None
        } else {
            Some(PHASE_TABLE[order - 1].phase)
        }
    }

    pub fn is_first(self) -> bool {
        self.order_index() == 0
    }

    pub fn is_last(self) -> bool {
        self.order_index() == PHASE_TABLE.len() - 1
    }

    pub fn display_name(self) -> &'static str {
        self.spec().display_name
    }

    pub fn spec(self) -> &'static PhaseSpec {
        &PHASE_TABLE[match self {
            PhaseType::IdeaGeneration => 0,
            PhaseType::FeasibilityAnalysis => 1,
            PhaseType::DrawbackDiscussion => 2,
        }]
    }

    /// Stable key used by the progress tracker (`"IDEA_GENERATION"` etc.).
    pub fn key(self) -> &'static str {
        match self {
            PhaseType::IdeaGeneration => "IDEA_GENERATION",
            PhaseType::FeasibilityAnalysis => "FEASIBILITY_ANALYSIS",
            PhaseType::DrawbackDiscussion => "DRAWBACK_DISCUSSION",
        }
    }
}

/// Lifecycle status of a single phase within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    WaitingApproval,
    Approved,
    Rejected,
    Completed,
}

impl PhaseStatus {
    /// A phase may be (re)started only before it has run or after a rejection.
    pub fn can_start(self) -> bool {
        matches!(self, PhaseStatus::NotStarted | PhaseStatus::Rejected)
    }

    pub fn can_submit_for_approval(self) -> bool {
        self == PhaseStatus::InProgress
    }

    /// Approve and reject are only legal while the phase awaits review.
    pub fn can_review(self) -> bool {
        self == PhaseStatus::WaitingApproval
    }

    pub fn is_settled(self) -> bool {
        matches!(self, PhaseStatus::Approved | PhaseStatus::Completed)
    }
}

/// Lifecycle status of a brainstorm session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn can_start(self) -> bool {
        matches!(self, SessionStatus::Created | SessionStatus::Paused)
    }

    pub fn can_pause(self) -> bool {
        self == SessionStatus::InProgress
    }

    pub fn is_terminated(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_stable() {
        assert_eq!(PhaseType::first(), PhaseType::IdeaGeneration);
        assert_eq!(PhaseType::last(), PhaseType::DrawbackDiscussion);
        assert_eq!(
            PhaseType::IdeaGeneration.next(),
            Some(PhaseType::FeasibilityAnalysis)
        );
        assert_eq!(
            PhaseType::DrawbackDiscussion.previous(),
            Some(PhaseType::FeasibilityAnalysis)
        );
        assert_eq!(PhaseType::DrawbackDiscussion.next(), None);
        assert_eq!(PhaseType::IdeaGeneration.previous(), None);
        assert!(PhaseType::IdeaGeneration.is_first());
        assert!(PhaseType::DrawbackDiscussion.is_last());
    }

    #[test]
    fn templates_carry_placeholders() {
        for spec in &PHASE_TABLE {
            assert!(spec.system_prompt_template.contains("{roleType}"));
            assert!(spec.user_prompt_template.contains("{topic}"));
            assert!(spec.user_prompt_template.contains("{context}"));
        }
    }

    #[test]
    fn status_guards() {
        assert!(PhaseStatus::NotStarted.can_start());
        assert!(PhaseStatus::Rejected.can_start());
        assert!(!PhaseStatus::InProgress.can_start());
        assert!(PhaseStatus::InProgress.can_submit_for_approval());
        assert!(PhaseStatus::WaitingApproval.can_review());
        assert!(!PhaseStatus::Approved.can_review());

        assert!(SessionStatus::Created.can_start());
        assert!(SessionStatus::Paused.can_start());
        assert!(!SessionStatus::Completed.can_start());
        assert!(SessionStatus::InProgress.can_pause());
        assert!(SessionStatus::Cancelled.is_terminated());
    }
}
