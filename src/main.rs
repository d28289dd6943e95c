use anyhow::{Context, Result, bail};
use clap::Parser;
use dotenvy::dotenv;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use askweb::app::{App, QueryRequest};
use askweb::chat::{ChatClient, ChatCommand, Conversation};
use askweb::config::AppConfig;
use askweb::globals::get_http_client;
use askweb::output::{write_chat_reply, write_outcome, write_suggestions, write_summary};
use askweb::search::SearchType;
use askweb::suggest::SuggestClient;

/// Web search with AI answers over a rotating pool of Gemini API keys
#[derive(Debug, Parser)]
#[command(name = "askweb", version, about)]
struct Cli {
    /// Search query (the first question in --chat mode)
    #[arg(required_unless_present = "chat")]
    query: Vec<String>,

    /// Result page (10 results per page)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=10))]
    page: u16,

    /// Search images instead of web pages
    #[arg(long)]
    images: bool,

    /// Skip the AI answer
    #[arg(long)]
    no_ai: bool,

    /// Skip the web search
    #[arg(long)]
    no_search: bool,

    /// Print API key status after the query
    #[arg(long)]
    status: bool,

    /// Interactive AI chat; follow-ups are read from stdin
    #[arg(long, conflicts_with_all = ["images", "no_ai", "no_search", "status", "suggest"])]
    chat: bool,

    /// Print query suggestions instead of searching
    #[arg(long)]
    suggest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askweb=warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");
    let _ = get_http_client();

    let query = cli.query.join(" ");

    if cli.chat {
        let first = (!query.trim().is_empty()).then_some(query);
        return run_chat(&config, first).await;
    }

    if cli.suggest {
        let Some(key) = config.suggest_key.as_deref() else {
            bail!("RAPIDAPI_KEY is not set; suggestions are unavailable");
        };
        let client = SuggestClient::new(&config.suggest_url, &config.suggest_host, key);
        let suggestions = client
            .suggest(&query)
            .await
            .context("Failed to fetch suggestions")?;
        let mut stdout = io::stdout().lock();
        write_suggestions(&mut stdout, &suggestions)?;
        stdout.flush()?;
        return Ok(());
    }

    let app = App::new(&config);

    let request = QueryRequest {
        query,
        page: usize::from(cli.page),
        search_type: if cli.images {
            SearchType::Image
        } else {
            SearchType::Web
        },
        with_search: !cli.no_search,
        with_answer: !cli.no_ai,
    };

    let outcome = app.run_query(&request).await;

    let mut stdout = io::stdout().lock();
    write_outcome(&mut stdout, &outcome).context("Failed to write results")?;
    if cli.status {
        write_summary(&mut stdout, app.key_count(), &app.key_summary())
            .context("Failed to write key status")?;
    }
    stdout.flush()?;

    Ok(())
}

/// Read questions from stdin until EOF or `/quit`
async fn run_chat(config: &AppConfig, first: Option<String>) -> Result<()> {
    let client = ChatClient::new(&config.chat_url);
    let mut stdout = io::stdout();

    if !client.health_check().await {
        writeln!(stdout, "! AI chat service did not answer its health check")?;
    }
    writeln!(
        stdout,
        "AI chat: /regen to retry the last answer, /new to start over, /quit to leave"
    )?;

    let mut conversation = Conversation::new();
    let mut related: Vec<String> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = first;

    loop {
        let input = match pending.take() {
            Some(question) => question,
            None => {
                write!(stdout, "> ")?;
                stdout.flush()?;
                match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };

        let reply = match ChatCommand::parse(&input, &related) {
            ChatCommand::Quit => break,
            ChatCommand::Skip => continue,
            ChatCommand::New => {
                conversation.clear();
                related.clear();
                writeln!(stdout, "Started a new conversation")?;
                continue;
            }
            ChatCommand::Regenerate => conversation.regenerate(&client).await,
            ChatCommand::Ask(question) => conversation.ask(&client, &question).await,
        };

        match reply {
            Ok(response) => {
                write_chat_reply(&mut stdout, &response)?;
                related = response.related_questions;
            }
            Err(e) => writeln!(stdout, "! Sorry, I encountered an error: {e}")?,
        }
    }

    Ok(())
}
