//! The single-turn, page-aware assistant behind [`SwarmEngine::send_message`].
//!
//! [`SwarmEngine::send_message`]: crate::SwarmEngine::send_message

use serde_json::{json, Map, Value};

use cauldron_core::agent::{models, Agent, FunctionParameters, SwarmFunction};
use cauldron_core::types::ContextVars;

pub const ASSISTANT_NAME: &str = "CauldronOS Assistant";

const BASE_INSTRUCTIONS: &str = "You are CauldronOS Assistant, a helpful AI assistant integrated into the CauldronOS platform. \nYou provide concise, accurate, and helpful responses to user queries.";

const RESPONSE_GUIDELINES: &str = "When responding:
1. Be concise and to the point
2. Provide specific, actionable information
3. If you're unsure about something, be honest about your limitations
4. Use markdown formatting for structured responses
5. When appropriate, suggest relevant actions the user can take";

/// The page the user is looking at, as reported in the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    UserManagement,
    Modules,
    WorkspaceSettings,
    Other,
}

impl Page {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Dashboard" => Page::Dashboard,
            "User Management" => Page::UserManagement,
            "Modules" => Page::Modules,
            "Workspace Settings" => Page::WorkspaceSettings,
            _ => Page::Other,
        }
    }

    fn help_topics(self) -> Option<(&'static str, [&'static str; 3])> {
        match self {
            Page::Dashboard => Some((
                "Dashboard",
                [
                    "Explaining metrics and data visualizations",
                    "Providing insights about workspace activity",
                    "Suggesting ways to improve workspace usage",
                ],
            )),
            Page::UserManagement => Some((
                "User Management",
                [
                    "Explaining user roles and permissions",
                    "Suggesting user management strategies",
                    "Providing insights about user activity",
                ],
            )),
            Page::Modules => Some((
                "Modules",
                [
                    "Explaining module functionality",
                    "Recommending modules based on user needs",
                    "Providing guidance on module configuration",
                ],
            )),
            Page::WorkspaceSettings => Some((
                "Workspace Settings",
                [
                    "Explaining settings and their impact",
                    "Recommending optimal configurations",
                    "Providing guidance on workspace customization",
                ],
            )),
            Page::Other => None,
        }
    }
}

/// String value of `key`, treating a missing or empty value as absent.
fn context_str<'a>(context: &'a ContextVars, key: &str) -> Option<&'a str> {
    context
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Build the assistant agent for the page, role and workspace in `context`.
pub fn create_assistant_agent(context: &ContextVars) -> Agent {
    let mut agent = Agent::new(ASSISTANT_NAME, assistant_instructions(context))
        .with_model(models::LLAMA3_70B);
    for function in assistant_functions(context) {
        agent = agent.with_function(function);
    }
    agent
}

/// Instructions reflecting `currentPage`, `userRole` and `workspaceName`.
pub fn assistant_instructions(context: &ContextVars) -> String {
    let page = context_str(context, "currentPage").unwrap_or("unknown");
    let role = context_str(context, "userRole").unwrap_or("User");
    let workspace = context_str(context, "workspaceName").unwrap_or("Default");

    let mut instructions = format!(
        "{BASE_INSTRUCTIONS}\n\nCurrent context:\n- Page: {page}\n- User role: {role}\n- Workspace: {workspace}\n\n{RESPONSE_GUIDELINES}"
    );

    if let Some((title, topics)) = Page::from_name(page).help_topics() {
        instructions.push_str(&format!(
            "\n\nYou're currently on the {title} page. You can help with:"
        ));
        for topic in topics {
            instructions.push_str("\n- ");
            instructions.push_str(topic);
        }
    }
    instructions
}

/// `search_documentation`, plus the functions of the current page.
pub fn assistant_functions(context: &ContextVars) -> Vec<SwarmFunction> {
    let page = Page::from_name(context_str(context, "currentPage").unwrap_or_default());
    let mut functions = vec![function(
        "search_documentation",
        "Search the documentation for information",
        json!({"query": {"type": "string", "description": "The search query"}}),
        &["query"],
    )];

    let timeframe = json!({
        "type": "string",
        "description": "The timeframe to analyze (e.g., \"last 7 days\", \"last month\")"
    });
    match page {
        Page::Dashboard => functions.push(function(
            "analyze_metrics",
            "Analyze dashboard metrics and provide insights",
            json!({
                "metric": {"type": "string", "description": "The metric to analyze"},
                "timeframe": timeframe,
            }),
            &["metric"],
        )),
        Page::UserManagement => functions.push(function(
            "analyze_user_activity",
            "Analyze user activity and provide insights",
            json!({
                "userId": {"type": "string", "description": "The user ID to analyze"},
                "timeframe": timeframe,
            }),
            &["userId"],
        )),
        _ => {}
    }
    functions
}

fn function(name: &str, description: &str, properties: Value, required: &[&str]) -> SwarmFunction {
    let properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    SwarmFunction {
        name: name.to_string(),
        description: description.to_string(),
        parameters: FunctionParameters {
            properties,
            required: required.iter().map(|r| r.to_string()).collect(),
            ..FunctionParameters::default()
        },
    }
}
