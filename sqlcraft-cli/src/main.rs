//! # sqlcraft CLI
//!
//! Ask a SQLite database questions in plain language.
//!
//! Usage:
//!   sqlcraft <question>
//!   sqlcraft repl
//!   sqlcraft schema
//!   sqlcraft query <sql>
//!   sqlcraft check <sql>
//!
//! Examples:
//!   sqlcraft --db data/shop.db "Which customer spent the most?"
//!   sqlcraft --provider groq --mode tools "How many orders shipped last week?"
//!   sqlcraft query "SELECT * FROM customers LIMIT 5"

mod logging;

use clap::builder::RangedU64ValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use sqlcraft_agent::{
    schema_diagnostic, AgentConfig, Answer, Outcome, QueryAgent, RetryPolicy, ToolAgent,
    ToolRegistry,
};
use sqlcraft_db::{check_statement, clean_candidate, introspect, IntrospectOptions, QueryExecutor};
use sqlcraft_llm::{OpenAIProvider, ProviderConfig, ProviderType, UsageTracker};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const PROMPT: &str = "How can I help you? ";

#[derive(Parser)]
#[command(name = "sqlcraft")]
#[command(author, version, about = "sqlcraft - ask a SQLite database questions in plain language")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Question to ask (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    question: Vec<String>,

    /// SQLite database file
    #[arg(long, global = true, env = "SQLCRAFT_DB", default_value = "data/temp.db")]
    db: PathBuf,

    /// Model provider: azure, groq, openai or local
    #[arg(short, long, global = true, env = "SQLCRAFT_PROVIDER", default_value = "azure")]
    provider: String,

    /// Override the provider's default model (deployment name for Azure)
    #[arg(long, global = true, env = "SQLCRAFT_MODEL")]
    model: Option<String>,

    /// How the model reaches the database
    #[arg(long, global = true, value_enum, default_value_t = Mode::Pipeline)]
    mode: Mode,

    /// Query attempts per question (pipeline mode)
    #[arg(long, global = true, default_value_t = 3)]
    attempts: usize,

    /// Pause between attempts, in milliseconds
    #[arg(long, global = true, default_value_t = 0)]
    delay_ms: u64,

    /// Skip the planning call before each query
    #[arg(long, global = true)]
    no_plan: bool,

    /// Include one sample row per table in prompts (default)
    #[arg(long, global = true, overrides_with = "no_samples")]
    samples: bool,

    /// Leave sample rows out of prompts
    #[arg(long, global = true, overrides_with = "samples")]
    no_samples: bool,

    /// Print the result rows instead of a model-written answer
    #[arg(long, global = true)]
    raw: bool,

    /// Read at most this many rows per query
    #[arg(long, global = true, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    row_cap: Option<usize>,

    /// Model round trips per question (tools mode)
    #[arg(long, global = true, default_value_t = 5)]
    max_steps: usize,

    /// More output: -v shows SQL, attempts and usage plus info logs; -vv debug logs
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only errors are logged
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question
    Ask {
        /// The question
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
    },
    /// Ask questions until EOF, `exit` or `quit`
    Repl,
    /// Print the database schema as JSON
    Schema,
    /// Run one read-only statement and print the rows as JSON
    Query {
        /// SQL statement
        #[arg(required = true)]
        sql: String,
    },
    /// Report whether a statement would be allowed to run
    Check {
        /// SQL statement
        #[arg(required = true)]
        sql: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Plan, generate, execute and retry; then summarize
    Pipeline,
    /// Let the model call sql_query / describe_schema itself
    Tools,
}

/// Either agent behind one interface
enum Runner {
    Pipeline(QueryAgent<OpenAIProvider>),
    Tools(ToolAgent<OpenAIProvider>),
}

impl Runner {
    async fn ask(&mut self, question: &str) -> Answer {
        match self {
            Runner::Pipeline(agent) => agent.ask(question).await,
            Runner::Tools(agent) => agent.ask(question).await,
        }
    }

    fn usage(&self) -> &UsageTracker {
        match self {
            Runner::Pipeline(agent) => agent.usage(),
            Runner::Tools(agent) => agent.usage(),
        }
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn build_runner(cli: &Cli) -> Runner {
    let provider_type: ProviderType = match cli.provider.parse() {
        Ok(t) => t,
        Err(e) => fail(e.message()),
    };

    // Credentials are checked before any question is read
    let mut config = match ProviderConfig::from_env(provider_type) {
        Ok(c) => c,
        Err(e) => fail(e.message()),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }

    let provider = match OpenAIProvider::new(config) {
        Ok(p) => p,
        Err(e) => fail(e.message()),
    };
    tracing::info!(provider = provider_type.as_str(), mode = ?cli.mode, "provider ready");

    match cli.mode {
        Mode::Pipeline => {
            let config = AgentConfig {
                db_path: cli.db.clone(),
                retry: RetryPolicy::new(cli.attempts).with_delay(Duration::from_millis(cli.delay_ms)),
                plan_first: !cli.no_plan,
                include_samples: !cli.no_samples,
                summarize: !cli.raw,
                row_cap: cli.row_cap,
            };
            Runner::Pipeline(QueryAgent::new(provider, config))
        }
        Mode::Tools => {
            let registry = ToolRegistry::for_database(&cli.db, cli.row_cap);
            Runner::Tools(ToolAgent::new(provider, registry).with_max_steps(cli.max_steps))
        }
    }
}

/// Print `prompt`, read one line. `None` on EOF.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    std::io::stdout().flush().ok();

    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn print_answer(answer: &Answer, runner: &Runner, verbose: u8) {
    println!("{}", answer.text);

    if verbose > 0 {
        println!();
        if let Some(sql) = &answer.sql {
            println!("SQL: {}", sql);
        }
        println!("Attempts: {}", answer.attempts);
        if let Some(reason) = answer.reason() {
            println!("Reason: {}", reason.message());
        }
        let usage = runner.usage();
        println!(
            "Usage: {} calls, {} prompt + {} completion tokens",
            usage.total_calls, usage.total_prompt_tokens, usage.total_completion_tokens
        );
    }
}

async fn ask_once(runner: &mut Runner, cli: &Cli, question: &str) {
    let answer = runner.ask(question).await;
    print_answer(&answer, runner, cli.verbose);

    if answer.outcome == Outcome::Failed {
        std::process::exit(1);
    }
}

async fn repl(cli: &Cli) {
    let mut runner = build_runner(cli);
    while let Some(line) = read_line(PROMPT) {
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        let answer = runner.ask(&line).await;
        print_answer(&answer, &runner, cli.verbose);
        println!();
    }
}

fn show_schema(cli: &Cli) {
    let options = IntrospectOptions {
        include_samples: !cli.no_samples,
    };
    match introspect(&cli.db, &options) {
        Ok(schema) => {
            println!("{}", serde_json::to_string_pretty(&schema.to_json()).unwrap_or_default());
            let samples = schema.describe_samples();
            if cli.verbose > 0 && !samples.is_empty() {
                println!("\n{}", samples);
            }
        }
        Err(e) => fail(&schema_diagnostic(&e)),
    }
}

fn run_query(cli: &Cli, sql: &str) {
    let mut executor = QueryExecutor::new(&cli.db);
    if let Some(cap) = cli.row_cap {
        executor = executor.with_row_cap(cap);
    }

    match executor.execute(&clean_candidate(sql)) {
        Ok(rows) if cli.raw => print!("{}", rows.render_block()),
        Ok(rows) => {
            println!("{}", serde_json::to_string_pretty(&rows.to_json()).unwrap_or_default());
            if rows.truncated {
                eprintln!("(truncated after {} rows)", rows.len());
            }
        }
        Err(e) => fail(e.message()),
    }
}

fn check(sql: &str) {
    let cleaned = clean_candidate(sql);
    match check_statement(&cleaned) {
        Ok(()) => println!("allowed: {}", cleaned),
        Err(e) => {
            println!("rejected: {}", e.message());
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match &cli.command {
        Some(Commands::Ask { question }) => {
            let mut runner = build_runner(&cli);
            ask_once(&mut runner, &cli, &question.join(" ")).await;
        }
        Some(Commands::Repl) => repl(&cli).await,
        Some(Commands::Schema) => show_schema(&cli),
        Some(Commands::Query { sql }) => run_query(&cli, sql),
        Some(Commands::Check { sql }) => check(sql),
        None => {
            // Credentials fail fast, before waiting on stdin
            let mut runner = build_runner(&cli);
            let question = if cli.question.is_empty() {
                match read_line(PROMPT) {
                    Some(q) if !q.is_empty() => q,
                    _ => return,
                }
            } else {
                cli.question.join(" ")
            };
            ask_once(&mut runner, &cli, &question).await;
        }
    }
}
