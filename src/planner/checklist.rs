//! The checklist rule registry: the fixed set of vulnerability-category
//! rules the planner pairs with every target (spec §4.G, GLOSSARY
//! "checklist rule").

use crate::model::task::ChecklistRule;

/// The built-in checklist, grounded in common smart-contract audit
/// categories. A deployment may override this via configuration; this is
/// the default registry used when none is supplied.
pub fn default_checklist() -> Vec<ChecklistRule> {
    vec![
        ChecklistRule {
            key: "reentrancy".to_string(),
            prompt_fragment: "Check whether external calls in this code can re-enter before state is finalized.".to_string(),
        },
        ChecklistRule {
            key: "access_control".to_string(),
            prompt_fragment: "Check whether privileged operations are properly restricted to authorized callers.".to_string(),
        },
        ChecklistRule {
            key: "arithmetic".to_string(),
            prompt_fragment: "Check for overflow, underflow, precision loss, or rounding errors in arithmetic.".to_string(),
        },
        ChecklistRule {
            key: "unchecked_external_call".to_string(),
            prompt_fragment: "Check whether return values of external calls are validated.".to_string(),
        },
        ChecklistRule {
            key: "denial_of_service".to_string(),
            prompt_fragment: "Check for unbounded loops, gas griefing, or operations one party could block.".to_string(),
        },
        ChecklistRule {
            key: "oracle_manipulation".to_string(),
            prompt_fragment: "Check whether price or state data from an oracle can be manipulated within a single transaction.".to_string(),
        },
    ]
}
