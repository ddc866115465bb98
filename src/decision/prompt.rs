

use crate::decision::models::ActionKind;
use crate::session::SessionState;


pub const SYSTEM_PROMPT: &str = r#"You are the planner of a cooking assistant. Given the session state, choose the ONE next action.

Available actions, in priority order (pick the first whose precondition is unmet):
1. request_dish_name       - dish_name is null
2. fetch_recipe            - recipe is null
3. request_pantry_items    - pantry_items is null
4. compute_missing         - missing_ingredients is null
5. request_email           - missing_ingredients is non-empty and user_email is null
6. place_order             - missing_ingredients is non-empty and order_id is null
7. send_confirmation_email - order_id is set and email_sent is false
8. present_recipe          - otherwise

Always respond with valid JSON: {"action": "<action name>", "reasoning": "<one sentence>"}"#;


pub fn build_decision_prompt(state: &SessionState) -> String {
    let snapshot = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
    let names = ActionKind::ALL
        .iter()
        .map(|kind| kind.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"**Session State:**
{snapshot}

**Your Task:**
Choose the next action. The "action" value must be one of: {names}."#
    )
}
