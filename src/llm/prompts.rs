//! Prompt construction for every LLM-facing stage.
//!
//! Each stage gets a fixed system prompt (the non-negotiable contract)
//! and a builder for the per-call user prompt. Per spec.md §9, the
//! canonical persona document is threaded through by reference into
//! every prompt that needs it (C6, C8's rewriter, C8's tone gate) rather
//! than re-described, so the stages never drift out of agreement about
//! tone.

use crate::models::{EpisodeMetadata, Quote, Segment, SelectedSegment, VerificationVerdict};

pub const SYSTEM_PROMPT_C1_ANALYZER: &str = r#"You are a transcript analyst for a fact-checking commentary pipeline.
You are given a full diarized interview transcript as an attached document plus a host-specific rules
document describing the categories of interest, examples, a severity scale, and the exact output schema.

Rules:
1. Identify candidate segments matching the categories in the rules document.
2. Every quote you extract MUST be a verbatim substring of the transcript text for that turn. Never paraphrase.
3. Every quote's timestamp MUST match the start of the transcript turn it was drawn from, to within 0.5 seconds.
4. Classify each segment by harm category, rhetorical strategies, and societal impact.
5. Emit at most ~20 candidates, proportional to duration (roughly 5-8 per hour of transcript).
6. Do not invent a segment to hit a target count; fewer, well-grounded segments are better than padding."#;

pub fn build_c1_user_prompt(metadata: &EpisodeMetadata, analysis_rules: &str) -> String {
    format!(
        "# Episode\nHost: {}\nGuest: {}\nTitle: {}\n\n# Host-specific analysis rules\n{}\n\n\
         # Task\nThe attached document is the full diarized transcript. Identify candidate segments \
         per the rules above and submit them with the submit_structured_output tool.",
        metadata.host_name, metadata.guest_name, metadata.episode_title, analysis_rules
    )
}

pub const SYSTEM_PROMPT_C2_GATES: &str = r#"You are the admission filter for a fact-checking commentary pipeline.
For the given segment, evaluate five binary gates IN ORDER and stop reasoning about later gates once an
earlier one clearly fails (but still report a placeholder verdict for every gate in the schema):

1. rebuttability: Does the segment contain material worth a substantive rebuttal? This includes non-factual
   but societally-damaging content — dehumanizing rhetoric, institutional erosion — not only specific factual
   claims. Rejecting a segment solely because it is not a checkable factual claim is a defect in your judgment.
2. verifiability: Is there a named entity, date, numeric claim, or cited source to anchor a rebuttal?
3. accuracy_at_risk: Does independent knowledge indicate the statement is false, misleading, or materially
   one-sided? Answer conservatively: "fails" means CLEARLY false or misleading. If you are uncertain, pass
   this gate and note the uncertainty in "reason" rather than failing it — downstream verification will check it.
4. harm: Does propagation of the statement plausibly contribute to concrete harm (health, safety, democratic
   process, discrimination)?
5. context_sufficiency: Are the extracted quotes and context range enough for a listener to follow the
   argument without the full episode?

Gate 1 is non-negotiable: a segment failing rebuttability never recovers at a later stage."#;

pub fn build_c2_user_prompt(segment: &Segment) -> String {
    format!(
        "# Segment {}\nTitle: {}\nPrimary speaker: {}\nHarm category: {} ({:?})\n\
         Rhetorical strategies: {:?}\nSocietal impacts: {:?}\nReasoning from Pass 1: {}\n\n\
         ## Quotes\n{}\n\n## Context\n{}\n\n\
         Evaluate all five gates and submit your verdict with the submit_structured_output tool.",
        segment.segment_id,
        segment.title,
        segment.primary_speaker,
        segment.harm_category.primary,
        segment.harm_category.subtypes,
        segment.rhetorical_strategies,
        segment.societal_impacts,
        segment.reasoning,
        format_quotes(&segment.quotes),
        segment.clip_context_description,
    )
}

fn format_quotes(quotes: &[Quote]) -> String {
    quotes
        .iter()
        .map(|q| format!("- [{:.1}s] {}: \"{}\"", q.timestamp, q.speaker, q.quote))
        .collect::<Vec<_>>()
        .join("\n")
}

pub const SYSTEM_PROMPT_C3_VERIFY: &str = r#"You are checking whether a specific, date-sensitive claim made in an
interview is still accurate given current public information. Answer directly and cite what you find; do not
produce structured output in this call."#;

pub fn build_c3_search_prompt(segment: &Segment, quote: &Quote) -> String {
    format!(
        "In an interview, {} said: \"{}\" (the broader point being discussed: {}).\n\n\
         Using web search, determine whether this specific claim is accurate as of today. State plainly \
         whether the claim is true, false, or cannot be determined, and explain why with reference to what \
         you found.",
        segment.primary_speaker, quote.quote, segment.title
    )
}

pub const SYSTEM_PROMPT_C3_PARSE: &str = "You convert a free-form web-grounded research answer into the \
required structured verdict. Do not add information that was not present in the research answer.";

pub fn build_c3_parse_prompt(research_text: &str) -> String {
    format!(
        "# Research answer to convert\n{}\n\n\
         Classify it as confirmed_false, confirmed_true, or unverified, with sources and a short rationale, \
         and submit it with the submit_structured_output tool.",
        research_text
    )
}

pub const SYSTEM_PROMPT_C4_TOPIC: &str = "You assign a short, stable topic label to a segment for diversity \
balancing across a commentary script. Reuse an existing label from the candidate list whenever the segment \
clearly belongs to it; only propose a new label when none fit.";

pub fn build_c4_topic_prompt(segment: &Segment, candidate_labels: &[String]) -> String {
    format!(
        "# Segment\nHarm category: {}\nRhetorical strategies: {:?}\nTitle: {}\n\n\
         # Existing topic labels\n{}\n\n\
         Submit the best topic label with the submit_structured_output tool.",
        segment.harm_category.primary,
        segment.rhetorical_strategies,
        segment.title,
        candidate_labels.join(", "),
    )
}

pub const SYSTEM_PROMPT_C5_RECOVERY: &str = r#"You are a second, independent reviewer re-examining a segment
that a first reviewer rejected. Apply RELAXED thresholds and a perspective DISTINCT from a typical first pass:
assume the first reviewer may have been too strict about specificity, context, or borderline harm. You are not
re-checking rebuttability or accuracy-at-risk — those were already confirmed acceptable for this segment to
reach you. Decide only whether, under a more generous reading, this segment should be readmitted."#;

pub fn build_c5_recovery_prompt(segment: &Segment, rejection_reason: &str) -> String {
    format!(
        "# Segment\nTitle: {}\nQuotes:\n{}\n\nContext: {}\n\n\
         # Original rejection reason\n{}\n\n\
         Submit your second-opinion verdict with the submit_structured_output tool.",
        segment.title,
        format_quotes(&segment.quotes),
        segment.clip_context_description,
        rejection_reason,
    )
}

pub const SYSTEM_PROMPT_C6_STRUCTURE: &str = r#"You are the structure planner for a fact-checking commentary
video. Given a list of selected segments, decide playback order (including which segment opens as the
"hook"), assign each segment estimated PreClip/PostClip durations and clip padding, and draft short intro and
outro stubs. You MUST use every provided segment, OR explicitly mark it dropped with a justification in the
"dropped" list — do not silently omit a segment."#;

pub fn build_c6_structure_prompt(selected: &[SelectedSegment], persona: &str) -> String {
    let mut body = format!("# Persona (voice for intro/outro framing)\n{}\n\n# Selected segments\n", persona);
    for s in selected {
        body.push_str(&format!(
            "- {} | topic={} | harm={} | duration={:.1}s | verification={:?}\n  title: {}\n",
            s.segment_id(),
            s.diversity_topic,
            s.segment.harm_category.primary,
            s.segment.duration_seconds,
            s.verification.kind,
            s.segment.title,
        ));
    }
    body.push_str("\nSubmit the structure plan with the submit_structured_output tool.");
    body
}

pub const SYSTEM_PROMPT_C6_CREATIVE: &str = r#"You are the scriptwriter for a fact-checking commentary video.
Given a structure plan and each segment's full Pass 1 metadata (rhetorical strategies, societal impacts, harm
category) plus its verification verdict and sources, write the speakable prose for the intro, outro, each
PreClip setup, and each PostClip rebuttal. Use the rhetorical-strategy and societal-impact fields explicitly —
do not write a generic rebuttal that ignores what Pass 1 already found. A segment verified confirmed_true must
never appear here; if one does, do not write a rebuttal for it. Do not include TTS-specific formatting
(pronunciation hints, prosody punctuation) — that is applied by a separate pass outside of this one."#;

pub fn build_c6_creative_prompt(
    structure: &crate::models::StructurePlan,
    selected: &[SelectedSegment],
    persona: &str,
) -> String {
    let mut body = format!("# Persona\n{}\n\n# Structure plan\n", persona);
    body.push_str(&format!("Hook: {:?}\n", structure.hook_segment_id));
    body.push_str(&format!("Intro stub: {}\nOutro stub: {}\n\n", structure.intro_stub, structure.outro_stub));
    body.push_str("# Segments (in order)\n");
    for entry in &structure.entries {
        if let Some(s) = selected.iter().find(|s| s.segment_id() == entry.segment_id) {
            body.push_str(&format!(
                "## {}\nTitle: {}\nRhetorical strategies: {:?}\nSocietal impacts: {:?}\nHarm category: {}\n\
                 Verification: {:?} ({})\nSources: {}\nQuotes:\n{}\n\n",
                entry.segment_id,
                s.segment.title,
                s.segment.rhetorical_strategies,
                s.segment.societal_impacts,
                s.segment.harm_category.primary,
                s.verification.kind,
                s.verification.rationale,
                s.verification.sources.iter().map(|src| src.url.as_str()).collect::<Vec<_>>().join(", "),
                format_quotes(&s.segment.quotes),
            ));
        }
    }
    body.push_str("Submit the creative script with the submit_structured_output tool.");
    body
}

pub const SYSTEM_PROMPT_C8_VERIFY: &str = r#"You are verifying a single rebuttal against four binary gates:

1. grounded: Every factual claim in the rebuttal is supported by a named source, a cited statistic, or a
   widely-known fact — never a bare assertion like "studies show".
2. on_target: The rebuttal addresses the segment's actual claim, not a straw man or tangent.
3. tone_consistent: The rebuttal matches the canonical persona described below.
4. safe: The rebuttal does not itself introduce new misinformation or defamatory material.

Evaluate all four and report every verdict, even after an earlier failure."#;

pub fn build_c8_verify_prompt(segment: &Segment, verification: &VerificationVerdict, rebuttal_text: &str, persona: &str) -> String {
    format!(
        "# Persona\n{}\n\n# Segment claim\nTitle: {}\nAll quotes:\n{}\n\nHarm category: {}\nRhetorical strategies: {:?}\n\n\
         # Verification from prior stage\n{:?}: {}\n\n# Rebuttal to verify\n{}\n\n\
         Submit your four-gate verdict with the submit_structured_output tool.",
        persona,
        segment.title,
        format_quotes(&segment.quotes),
        segment.harm_category.primary,
        segment.rhetorical_strategies,
        verification.kind,
        verification.rationale,
        rebuttal_text,
    )
}

pub const SYSTEM_PROMPT_C8_REWRITE: &str = r#"You are rewriting a rebuttal that failed one or more verification
gates. Address every failure reason given. Keep the persona. Do not introduce new unsupported claims while
fixing the ones flagged."#;

pub fn build_c8_rewrite_prompt(
    segment: &Segment,
    verification: &VerificationVerdict,
    previous_text: &str,
    failure_reasons: &[String],
    persona: &str,
) -> String {
    format!(
        "# Persona\n{}\n\n# Segment claim\nTitle: {}\nAll quotes:\n{}\n\n# Verification\n{:?}: {}\n\n\
         # Previous rebuttal draft\n{}\n\n# Gate failures to fix\n{}\n\n\
         Submit the rewritten rebuttal text with the submit_structured_output tool.",
        persona,
        segment.title,
        format_quotes(&segment.quotes),
        verification.kind,
        verification.rationale,
        previous_text,
        failure_reasons.join("\n- "),
    )
}

pub const SYSTEM_PROMPT_C9_VALIDATE: &str = r#"You are a final fact-checker spot-checking the rebuttals THIS
pipeline wrote, not the original interview claims. Identify specific factual assertions in the rebuttal text
(numbers, named studies, attributions, dates) and use web search to confirm or contradict each one. Do not
produce structured output in this call."#;

pub fn build_c9_search_prompt(rebuttal_text: &str) -> String {
    format!(
        "# Rebuttal text to spot-check\n{}\n\n\
         List the specific factual claims it makes and, for each, state using web search whether it holds up, \
         citing what you found.",
        rebuttal_text
    )
}

pub const SYSTEM_PROMPT_C9_PARSE: &str = "You convert a free-form fact-check research answer about a rebuttal's \
own claims into the required structured list of flagged claims.";

pub fn build_c9_parse_prompt(research_text: &str) -> String {
    format!(
        "# Research answer to convert\n{}\n\nSubmit the flagged claims with the submit_structured_output tool.",
        research_text
    )
}
