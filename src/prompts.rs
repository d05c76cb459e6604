//! User-facing instructions sent with each stage.
//!
//! System instructions live in `data/templates/` so they can be edited
//! without a rebuild; the short per-call instructions below are fixed.

use crate::output::StageKind;

/// Stage 1: enumerate metrics.
pub const IDENTIFY_PROMPT: &str = "Identify all energy consumption metrics mentioned in the document. \
Return each metric with its code and item name.";

/// Stage 2: fill in raw values for the listed metrics.
pub const EXTRACT_PROMPT: &str = r#"For each metric listed in the provided text file:

Extract the following information from the corresponding PDF:

* Raw numerical value
* Unit of measurement
* Page number
* Relevant text snippet

Important notes:

* Include metrics with null values in the output
* Maintain the original order of metrics as listed in the text file
* Ensure the output contains the same number of items as the input list

Present the information in a structured format for each metric."#;

/// Stage 3: contextualise each extracted value.
pub const CLASSIFY_PROMPT: &str = r#"For each extracted metric, using the provided PDF:

* Determine the reporting year, focusing on the most recent if multiple years are present.
* Assign a scope (Global, Regional, or Country-Specific) and a flag (Full or Partial) to each value. Provide reasoning for the flag assignment.
* Classify each value as either 'Operational Consumption' or 'Supply Chain Consumption' based on the context in the document.
* Keep the same metrics, in the same order and the same number, as the provided text file."#;

/// All-in-one extraction; the rules are in the system instructions.
pub const SINGLE_SHOT_PROMPT: &str = "Analyze the following PDF and follow the rules.";

/// The instruction for `stage`.
pub fn user_prompt(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Identify => IDENTIFY_PROMPT,
        StageKind::Extract => EXTRACT_PROMPT,
        StageKind::Classify => CLASSIFY_PROMPT,
        StageKind::SingleShot => SINGLE_SHOT_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_prompt_demands_order_and_count() {
        assert!(EXTRACT_PROMPT.contains("original order"));
        assert!(EXTRACT_PROMPT.contains("same number of items"));
        assert!(EXTRACT_PROMPT.contains("null values"));
    }

    #[test]
    fn classify_prompt_names_categories() {
        for needle in ["Global", "Regional", "Country-Specific", "Full", "Partial", "Supply Chain"] {
            assert!(CLASSIFY_PROMPT.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn every_stage_has_a_prompt() {
        for stage in StageKind::CHAIN.into_iter().chain([StageKind::SingleShot]) {
            assert!(!user_prompt(stage).is_empty());
        }
    }
}
