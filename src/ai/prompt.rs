//! Plan Prompts
//!
//! Builds the prompts for weekly plan generation and conversational
//! revision. Both end with the same output contract: a single fenced JSON
//! object carrying the required plan fields, nothing else.

use crate::constants::plan as plan_constants;
use crate::types::{
    PlanDocument, ProfileRecord, capitalize_first, json_i64, json_string_array, json_string_or,
};

/// Build the generation prompt from a user profile
pub fn build_plan_prompt(profile: &ProfileRecord) -> String {
    let v = profile.as_value();
    let goal = json_string_or(&v, "goal", "general fitness");
    let days = json_i64(&v, "days_per_week", 3);
    let diet = json_string_or(&v, "diet", "no restrictions");
    let equipment = json_string_array(&v, "equipment");
    let limitations = json_string_array(&v, "limitations");

    let mut prompt = String::new();
    prompt.push_str(ROLE_SECTION);

    prompt.push_str("# User Profile\n\n");
    prompt.push_str(&format!("**Goal**: {}\n", capitalize_first(&goal)));
    prompt.push_str(&format!("**Training days per week**: {}\n", days));
    prompt.push_str(&format!("**Diet**: {}\n", diet));
    if !equipment.is_empty() {
        prompt.push_str(&format!("**Available equipment**: {}\n", equipment.join(", ")));
    }
    if !limitations.is_empty() {
        prompt.push_str(&format!(
            "**Limitations to respect**: {}\n",
            limitations.join(", ")
        ));
    }
    prompt.push('\n');

    prompt.push_str(
        "# Task\n\nCreate this user's plan for the coming week: one workout entry per \
         training day matched to the goal and equipment, plus a daily meal outline \
         matching the diet. Respect every limitation.\n\n",
    );
    prompt.push_str(&output_contract());
    prompt
}

/// Build the revision prompt from the current plan and an instruction
pub fn build_revision_prompt(plan: &PlanDocument, instruction: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(ROLE_SECTION);

    prompt.push_str("# Current Plan\n\n```json\n");
    prompt.push_str(&serde_json::to_string_pretty(&plan.payload).unwrap_or_default());
    prompt.push_str("\n```\n\n");

    prompt.push_str("# Requested Change\n\n");
    prompt.push_str(instruction.trim());
    prompt.push_str("\n\n");

    prompt.push_str(
        "# Task\n\nApply the requested change to the plan above. Keep everything not \
         touched by the request exactly as it is, and return the complete updated \
         plan.\n\n",
    );
    prompt.push_str(&output_contract());
    prompt
}

const ROLE_SECTION: &str = r#"<ROLE>
You are a certified fitness and nutrition coach. You produce structured weekly
plans as machine-readable JSON for an app; you never address the user directly.
</ROLE>

"#;

fn output_contract() -> String {
    format!(
        r#"# Output Contract

Respond with ONE fenced JSON code block and no other text.
The object MUST contain these fields: {fields}.

- "title": short human-readable name for the week
- "days": array with one object per training day ("day", "focus", "exercises")
- "meals": array with one object per day ("day", "breakfast", "lunch", "dinner")

Do not add commentary before or after the block.
"#,
        fields = plan_constants::REQUIRED_FIELDS.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile_with(fields: serde_json::Value) -> ProfileRecord {
        let map = fields.as_object().cloned().unwrap_or_default();
        ProfileRecord::new(map)
    }

    #[test]
    fn test_plan_prompt_reflects_profile() {
        let profile = profile_with(json!({
            "goal": "build muscle",
            "days_per_week": 5,
            "diet": "vegetarian",
            "equipment": ["dumbbells", "bands"],
            "limitations": ["bad knee"]
        }));
        let prompt = build_plan_prompt(&profile);

        assert!(prompt.contains("Build muscle"));
        assert!(prompt.contains("5"));
        assert!(prompt.contains("vegetarian"));
        assert!(prompt.contains("dumbbells, bands"));
        assert!(prompt.contains("bad knee"));
    }

    #[test]
    fn test_plan_prompt_substitutes_defaults() {
        let prompt = build_plan_prompt(&profile_with(json!({})));
        assert!(prompt.contains("General fitness"));
        assert!(prompt.contains("3"));
        assert!(prompt.contains("no restrictions"));
        assert!(!prompt.contains("Available equipment"));
    }

    #[test]
    fn test_prompts_state_the_output_contract() {
        let plan_prompt = build_plan_prompt(&profile_with(json!({})));
        let plan_doc = PlanDocument::new(serde_json::Map::new());
        let revision_prompt = build_revision_prompt(&plan_doc, "swap Tuesday to cardio");

        for prompt in [&plan_prompt, &revision_prompt] {
            for field in plan_constants::REQUIRED_FIELDS {
                assert!(prompt.contains(field), "missing {field}");
            }
            assert!(prompt.contains("ONE fenced JSON code block"));
        }
    }

    #[test]
    fn test_revision_prompt_embeds_plan_and_instruction() {
        let mut payload = serde_json::Map::new();
        payload.insert("title".to_string(), json!("Week of Aug 24"));
        let plan = PlanDocument::new(payload);

        let prompt = build_revision_prompt(&plan, "  make Friday a rest day  ");
        assert!(prompt.contains("Week of Aug 24"));
        assert!(prompt.contains("make Friday a rest day"));
        assert!(prompt.contains("Keep everything not"));
    }
}
