use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cauldron_core::config::AppConfig;
use cauldron_core::error::SwarmError;
use cauldron_core::types::{ContextVars, Message, StreamEvent};
use cauldron_swarm::{
    create_reasoning_workflow, create_research_workflow, create_research_workflow_with_graph,
    create_workflow, create_workflow_with_graph, GraphWorkflow, StepDefaults, SwarmEngine,
    Workflow,
};

#[derive(Parser)]
#[command(name = "cauldron", version, about = "Run multi-agent workflows on a Groq swarm")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cauldron.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan, execute and review a task
    Run {
        /// Print content as it arrives
        #[arg(long)]
        stream: bool,
        /// Delegate the run to the graph endpoint
        #[arg(long)]
        graph: bool,
        /// The task (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        task: Vec<String>,
    },
    /// Research a topic in five steps
    Research {
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        graph: bool,
        #[arg(trailing_var_arg = true)]
        topic: Vec<String>,
    },
    /// Run the reasoning graph on a task
    Reason {
        #[arg(long)]
        stream: bool,
        #[arg(trailing_var_arg = true)]
        task: Vec<String>,
    },
    /// Ask the assistant a single question
    Ask {
        #[arg(long)]
        stream: bool,
        /// Page the question is asked from (e.g. "Dashboard")
        #[arg(long)]
        page: Option<String>,
        /// Role of the asking user
        #[arg(long)]
        role: Option<String>,
        /// Workspace the user is in
        #[arg(long)]
        workspace: Option<String>,
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Run a graph workflow loaded from a JSON file
    Graph {
        /// Workflow document with `name`, `description` and `graph`
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        stream: bool,
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// What a command asked the engine to run.
enum Job {
    Linear(Workflow),
    Graph(GraphWorkflow),
    Message(ContextVars),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cauldron=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cauldron", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    let (job, input, stream) = match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&redacted(&config))?);
            return Ok(());
        }
        Commands::Completions { .. } => return Ok(()),
        Commands::Run {
            stream,
            graph,
            task,
        } => {
            let task = text_or_stdin(task)?;
            let workflow = if graph {
                create_workflow_with_graph(&task)
            } else {
                create_workflow("Task Workflow", &format!("Plan, execute and review: {task}"), &task)
            };
            (Job::Linear(workflow), task, stream)
        }
        Commands::Research {
            stream,
            graph,
            topic,
        } => {
            let topic = text_or_stdin(topic)?;
            let workflow = if graph {
                create_research_workflow_with_graph(&topic)
            } else {
                create_research_workflow(&topic)
            };
            (Job::Linear(workflow), topic, stream)
        }
        Commands::Reason { stream, task } => {
            let task = text_or_stdin(task)?;
            (Job::Graph(create_reasoning_workflow(&task)), task, stream)
        }
        Commands::Ask {
            stream,
            page,
            role,
            workspace,
            question,
        } => {
            let question = text_or_stdin(question)?;
            let mut context = ContextVars::new();
            for (key, value) in [
                ("currentPage", page),
                ("userRole", role),
                ("workspaceName", workspace),
            ] {
                if let Some(value) = value {
                    context.insert(key.to_string(), value.into());
                }
            }
            (Job::Message(context), question, stream)
        }
        Commands::Graph {
            file,
            stream,
            input,
        } => {
            let workflow = load_graph_workflow(&file)?;
            let input = text_or_stdin(input)?;
            (Job::Graph(workflow), input, stream)
        }
    };

    let cancel = CancellationToken::new();
    let transport = cauldron_transport::create_transport(&config.swarm);
    let engine = SwarmEngine::new(Arc::from(transport))
        .with_defaults(StepDefaults::from(&config.swarm))
        .cancellable(cancel.clone());

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Cancelling workflow...");
        cancel_clone.cancel();
    });

    let mut streamed = false;
    let run = execute(&engine, &job, &input, stream, &mut streamed);
    let message = match config.swarm.timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
            Ok(message) => message,
            Err(_) => {
                cancel.cancel();
                error!(timeout_secs = secs, "Workflow timed out");
                SwarmError::TimedOut(secs).into_message()
            }
        },
        None => run.await,
    };

    if message.is_error() {
        if streamed {
            println!();
        }
        anyhow::bail!("{}", message.content);
    }
    if streamed {
        println!();
    } else {
        println!("{}", message.content);
    }
    Ok(())
}

async fn execute(
    engine: &SwarmEngine,
    job: &Job,
    input: &str,
    stream: bool,
    streamed: &mut bool,
) -> Message {
    let context = ContextVars::new();
    if !stream {
        return match job {
            Job::Linear(workflow) => engine.execute_workflow(workflow, input, &context).await,
            Job::Graph(workflow) => engine.execute_graph(workflow, input, &context).await,
            Job::Message(page) => engine.send_message(input, page).await,
        };
    }

    let printer = |event: StreamEvent| print_event(event, streamed);
    match job {
        Job::Linear(workflow) => {
            engine
                .execute_workflow_streaming(workflow, input, &context, printer)
                .await
        }
        Job::Graph(workflow) => {
            engine
                .execute_graph_streaming(workflow, input, &context, printer)
                .await
        }
        Job::Message(page) => engine.send_message_streaming(input, page, printer).await,
    }
}

fn print_event(event: StreamEvent, streamed: &mut bool) {
    match event {
        StreamEvent::Content { delta, .. } => {
            print!("{delta}");
            io::stdout().flush().ok();
            *streamed = true;
        }
        StreamEvent::NodeTransition { node, node_id } => {
            let label = node_id.unwrap_or_else(|| match node {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
            eprintln!("\n[{label}]");
        }
        StreamEvent::ToolCalls { tool_calls, .. } => {
            let count = tool_calls.as_array().map_or(1, Vec::len);
            eprintln!("\n[{count} tool call(s)]");
        }
        StreamEvent::Start | StreamEvent::End => {}
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    warn!(
        path = %path.display(),
        "No config file found, using CAULDRON_SWARM_URL and GROQ_API_KEY"
    );
    Ok(AppConfig::from_env())
}

fn load_graph_workflow(path: &Path) -> anyhow::Result<GraphWorkflow> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow file {}", path.display()))?;
    let workflow = GraphWorkflow::from_json(&json)
        .with_context(|| format!("parsing workflow file {}", path.display()))?;
    workflow.validate()?;
    Ok(workflow)
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    if let Some(key) = shown.swarm.api_key.as_mut() {
        if !key.is_empty() {
            *key = "********".to_string();
        }
    }
    shown
}

/// Join trailing args, or read all of stdin when there are none.
fn text_or_stdin(words: Vec<String>) -> anyhow::Result<String> {
    let text = words.join(" ");
    if !text.trim().is_empty() {
        return Ok(text);
    }
    let stdin = io::stdin();
    let input = stdin
        .lock()
        .lines()
        .map_while(|l| l.ok())
        .collect::<Vec<_>>()
        .join("\n");
    if input.trim().is_empty() {
        anyhow::bail!("no input given on the command line or stdin");
    }
    Ok(input)
}
