//! Prompt builders. Pure functions; no I/O.

use crate::retry::Feedback;
use sqlcraft_db::Schema;
use sqlcraft_llm::ChatMessage;

const SQLITE_EXPERT: &str = "You are an SQLite expert. You write correct, efficient SQLite \
    queries against the schema you are given and never modify data.";

/// Schema text handed to every prompt of one question
#[derive(Debug, Clone, Default)]
pub struct SchemaContext {
    pub schema: String,
    pub samples: String,
}

impl SchemaContext {
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            schema: schema.describe(),
            samples: schema.describe_samples(),
        }
    }

    fn render(&self) -> String {
        if self.samples.is_empty() {
            format!("Database Schema:\n{}", self.schema)
        } else {
            format!("Database Schema:\n{}\n\nSample Data:\n{}", self.schema, self.samples)
        }
    }
}

/// Ask for a short plan before any SQL is written
pub fn planning_messages(question: &str, ctx: &SchemaContext) -> Vec<ChatMessage> {
    let user = format!(
        "Given the database schema and sample data below, plan an efficient SQLite query \
         that answers the user's question. Describe the tables, joins and filters you would \
         use in a few short steps. Do not write the final SQL yet.\n\n\
         {}\n\n\
         User's question: \"{}\"",
        ctx.render(),
        question
    );
    vec![ChatMessage::system(SQLITE_EXPERT), ChatMessage::user(user)]
}

/// Ask for exactly one statement, with the plan and the last failure if any
pub fn sql_messages(
    question: &str,
    ctx: &SchemaContext,
    plan: Option<&str>,
    feedback: Option<&Feedback>,
) -> Vec<ChatMessage> {
    let mut user = ctx.render();

    if let Some(plan) = plan {
        user.push_str(&format!("\n\nYour plan: {}", plan.trim()));
    }
    if let Some(feedback) = feedback {
        user.push_str("\n\n");
        user.push_str(&feedback.to_prompt());
    }

    user.push_str(&format!(
        "\n\nBased on the above and the database structure, write one SQLite query to answer: \"{}\"\n\
         Only SELECT or WITH ... SELECT statements are allowed. Do not limit the number of rows \
         unless the question asks for it.\n\n\
         Return ONLY the SQL query, no preamble.",
        question
    ));

    vec![ChatMessage::system(SQLITE_EXPERT), ChatMessage::user(user)]
}

/// Turn rows into a natural-language answer
pub fn answer_messages(
    question: &str,
    sql: &str,
    results: &str,
    metadata: &serde_json::Value,
) -> Vec<ChatMessage> {
    let user = format!(
        "Given the following user question, corresponding SQL query, and SQL result, \
         answer the user question with precision.\n\n\
         Question: {}\n\
         SQL Query: {}\n\
         SQL Result:\n{}\n\
         Metadata: {}\n\
         Answer: ",
        question, sql, results, metadata
    );
    vec![
        ChatMessage::system(
            "You answer questions about a database using only the query results you are shown.",
        ),
        ChatMessage::user(user),
    ]
}

/// System prompt for the tool-calling agent
pub fn tool_system_prompt() -> &'static str {
    "You are a database assistant with access to a SQLite database through tools.\n\
     - Call `describe_schema` first if you do not know the tables.\n\
     - Call `sql_query` with a single read-only SELECT (or WITH ... SELECT) statement.\n\
     - If a query fails or returns no rows, read the error and the attached schema, \
       fix the query and try again.\n\
     - When you have the rows you need, answer the question in plain language without \
       calling any more tools."
}
