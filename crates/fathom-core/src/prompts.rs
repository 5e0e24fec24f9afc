//! Built-in prompt fragments.
//!
//! Prompt wording is deliberately minimal and kept as data so hosts can
//! override it; the engine only depends on the placeholders each template
//! carries. Hints are first-person nudges injected as assistant-visible
//! text, templates are filled by the helpers below.

/// Injected instruction describing the active subtask for a reasoning turn.
pub const REASONING_PROMPT: &str = "## Current Subtask:\n{objective}\n\
    ## Working Plan:\n{plan}\n\
    {knowledge_gap}\n\
    ## Research Depth:\n{depth}";

/// Ancestor context prefixed when decomposing below the root.
pub const PREVIOUS_PLAN_INST: &str =
    "## Previous Plan:\n{previous_plan}\n## Current Subtask:\n{objective}\n";

/// Recorded when decomposition or expansion is requested at the depth limit.
pub const MAX_DEPTH_HINT: &str = "The search depth has reached the maximum limit. So the \
    current subtask can not be further decomposed and expanded anymore. I need to find \
    another way to get it done no matter what.";

/// Recorded when a structured payload failed to validate; `{state}` names
/// the operation that failed.
pub const RETRY_HINT: &str = "Something went wrong when {state}. I need to retry.";

/// Follow-up judged the gathered information insufficient.
pub const NEED_DEEPER_HINT: &str = "The information is insufficient and I need to make \
    deeper research to fill the knowledge gap.";

/// Follow-up judged the gathered information sufficient.
pub const SUFFICIENT_HINT: &str =
    "The information after web search and extraction is sufficient enough!";

/// Summarize was invoked with no milestone result in memory.
pub const NO_RESULT_HINT: &str = "I mistakenly called the `summarize_intermediate_results` \
    tool as there exists no milestone result to summarize now.";

/// Asks the model to tick completed checklist items; expects the updated
/// plan back verbatim.
pub const SUMMARIZE_PLAN_UPDATE: &str = "Based on your work history above, examine which \
    step in the following working plan has been completed. Mark the fulfill knowledge gap \
    with [x] (e.g., [x] Search yyy; [x] learn zzz) and leave the uncompleted steps \
    unchanged. You MUST return only the updated plan, preserving exactly the same format \
    as the original plan. Do not include any explanations, reasoning, or section headers, \
    just output the updated status itself.\n\n## Knowledge Gaps:\n{knowledge_gaps}";

/// Body handed to the condenser model call.
pub const SUMMARIZE_INST: &str = "**Ultimate Task:**\n{objective}\n\
    **Ultimate Checklist:**\n{root_gaps}\n\
    **Knowledge Gaps:**\n{cur_gaps}\n\
    **Gathered Information:**\n{tool_result}";

/// Replaces compacted search results in memory with the report digest.
pub const UPDATE_REPORT_HINT: &str = "To condense the gathered information, I have \
    replaced the original bulk search results from the research phase with the following \
    report that consolidates and summarizes the essential findings:\n\
    {intermediate_report}\n\nSuch report has been saved to the {report_path}.";

/// Recorded alongside a freshly written intermediate report.
pub const SAVE_REPORT_HINT: &str = "The milestone results of the current item in working \
    plan are summarized into the following report:\n{intermediate_report}";

/// Recorded when a finished subtask pops and focus falls back to its parent.
pub const SUBTASK_COMPLETE_HINT: &str = "Subtask '{cur_obj}' is completed. Now the \
    current subtask fallbacks to '{next_obj}'";

/// Context block handed to the failure-reflection model call.
pub const REFLECT_INSTRUCTION: &str = "## Work History:\n{conversation_history}\n\
    ## Current Objective:\n{objective}\n\
    ## Working Plan:\n{plan}\n\
    ## Knowledge Gaps:\n{knowledge_gaps}\n";

/// Single-page extraction screening after a web search.
pub const EXPANSION_INST: &str = "Review the web search results and identify whether \
    there is any information that can potentially help address checklist items or \
    fulfill knowledge gaps of the task, but whose content is limited or only briefly \
    mentioned.\n\
    **Ultimate Task Checklist:**\n{checklist}\n\
    **Current Knowledge Gaps:**\n{knowledge_gaps}\n\
    **Current Search Query:**\n{search_query}\n\
    **Search Results:**\n{search_results}\n\
    **Output:**\n";

/// System prompt for the follow-up judgment call.
pub const FOLLOW_UP_JUDGE_SYS_PROMPT: &str = "1. You have conducted a web search and \
    extraction to obtain additional information. Now, you assess whether, after both the \
    web search and extraction process, the information content is adequate to address \
    the given task. Mark those items in `Current Knowledge Gaps` as [x] if there is \
    information for that.\n\
    2. If the gathered information inspires you, and you believe diving deeper following \
    this can help providing more comprehensive analysis of the user query, formulate the \
    dive-deeper plan in `subtask` field; otherwise, you can leave it empty.";

/// System prompt for subtask decomposition.
pub const DECOMPOSE_SYS_PROMPT: &str = "You are a research planner. Given a research \
    objective, produce the knowledge gaps that must be filled to complete it and a \
    concise working plan of 3-5 steps. Steps that would benefit from dedicated deeper \
    research should be marked with an (EXPANSION) flag.";

/// System prompt for intermediate-report condensation.
pub const SUMMARIZE_SYS_PROMPT: &str = "You are a research archivist. Condense the \
    gathered information into a self-contained markdown report that preserves every \
    concrete finding, figure, and source reference relevant to the checklist. Do not \
    editorialize or drop citations.";

/// System prompt for the final report pass.
pub const REPORTING_SYS_PROMPT: &str = "You are a research writer. Merge the \
    intermediate reports below into one coherent, well-structured final report that \
    fully answers the original task. Preserve all sourced facts and citations.";

/// System prompt for failure reflection.
pub const REFLECT_SYS_PROMPT: &str = "You are reviewing a research attempt that has \
    stalled. Diagnose from the work history why progress halted, then either rephrase \
    the current subtask to be more tractable or propose a decomposition into a smaller \
    first step. Do not do both.";

/// Minimal single-placeholder substitution; templates above use `{name}`
/// markers and no escaping.
pub fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_each_placeholder() {
        let out = fill(RETRY_HINT, &[("state", "decomposing the subtask")]);
        assert_eq!(
            out,
            "Something went wrong when decomposing the subtask. I need to retry."
        );
    }

    #[test]
    fn fill_leaves_unknown_placeholders_alone() {
        let out = fill(SUBTASK_COMPLETE_HINT, &[("cur_obj", "find sources")]);
        assert!(out.contains("'find sources'"));
        assert!(out.contains("{next_obj}"));
    }
}
