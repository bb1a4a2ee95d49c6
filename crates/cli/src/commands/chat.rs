//! Local REPL against the same runtime the webhook uses.
//!
//! Every non-command line is one seller message. `image <url>` queues an image
//! for the next message, `reset` forgets the conversation and `quit` ends the
//! session.

use std::sync::Arc;

use anyhow::Context;
use catalogbot_agent::catalog::CatalogService;
use catalogbot_agent::guardrails::GuardrailPolicy;
use catalogbot_agent::tools::ToolRegistry;
use catalogbot_agent::{AgentRuntime, ConversationEngine, OpenAiCompatibleClient, RuntimeSettings};
use catalogbot_core::config::AppConfig;
use catalogbot_db::repositories::{
    ConversationStore, InMemoryConversationStore, InMemoryProductRepository, InMemorySellerRepository,
    ProductRepository, SellerRepository, SqlConversationStore, SqlProductRepository, SqlSellerRepository,
};
use catalogbot_db::{connect_with_config, migrations, DbPool};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::commands::{current_thread_runtime, load_config, CommandResult};

pub const PROMPT: &str = "you> ";
pub const REPLY_PREFIX: &str = "bot> ";
pub const FAILURE_REPLY: &str = "Sorry, something went wrong. Please try again.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: usize,
    pub failures: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Quit,
    Reset,
    Image(&'a str),
    Message(&'a str),
    Blank,
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    match trimmed {
        "" => Line::Blank,
        "quit" | "exit" => Line::Quit,
        "reset" => Line::Reset,
        _ => match trimmed.strip_prefix("image ") {
            Some(url) if !url.trim().is_empty() => Line::Image(url.trim()),
            _ => Line::Message(trimmed),
        },
    }
}

pub fn run(seller: &str, ephemeral: bool) -> CommandResult {
    let config = match load_config("chat") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match current_thread_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let (agent, pool) = build_agent(&config, ephemeral).await?;
        let summary =
            run_session(&agent, seller, tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await
                .context("terminal i/o failed")?;
        if let Some(pool) = pool {
            pool.close().await;
        }
        Ok::<SessionSummary, anyhow::Error>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "chat",
            format!("session ended after {} turn(s), {} failed", summary.turns, summary.failures),
        ),
        Err(error) => CommandResult::failure("chat", "chat_setup", format!("{error:#}"), 4),
    }
}

/// Wires the agent runtime from configuration. The pool is returned so the
/// caller can close it once the session ends.
pub async fn build_agent(
    config: &AppConfig,
    ephemeral: bool,
) -> anyhow::Result<(AgentRuntime, Option<DbPool>)> {
    let llm = OpenAiCompatibleClient::from_config(&config.llm).context("language model client")?;

    let (products, conversations, sellers, pool): (
        Arc<dyn ProductRepository>,
        Arc<dyn ConversationStore>,
        Arc<dyn SellerRepository>,
        Option<DbPool>,
    ) = if ephemeral {
        (
            Arc::new(InMemoryProductRepository::default()),
            Arc::new(InMemoryConversationStore::default()),
            Arc::new(InMemorySellerRepository::default()),
            None,
        )
    } else {
        let pool = connect_with_config(&config.database)
            .await
            .with_context(|| format!("connecting to `{}`", config.database.url))?;
        migrations::run_pending(&pool).await.context("applying migrations")?;
        (
            Arc::new(SqlProductRepository::new(pool.clone())),
            Arc::new(SqlConversationStore::new(pool.clone())),
            Arc::new(SqlSellerRepository::new(pool.clone())),
            Some(pool),
        )
    };

    let engine = ConversationEngine::new(
        Arc::new(llm),
        Arc::new(ToolRegistry::catalog(Arc::new(CatalogService::new(products)))),
        GuardrailPolicy::default(),
        config.agent.max_dispatch_rounds,
    );
    let agent = AgentRuntime::new(engine, conversations, sellers, RuntimeSettings::from_config(config));
    Ok((agent, pool))
}

/// Reads lines until `quit` or end of input, answering each message through
/// `agent` as `seller`.
pub async fn run_session<R, W>(
    agent: &AgentRuntime,
    seller: &str,
    input: R,
    mut output: W,
) -> std::io::Result<SessionSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = SessionSummary::default();
    let mut pending_images: Vec<String> = Vec::new();
    let mut lines = input.lines();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let reply = match classify(&line) {
            Line::Blank => continue,
            Line::Quit => break,
            Line::Reset => {
                pending_images.clear();
                if agent.reset_conversation(seller).await {
                    "(conversation cleared)".to_string()
                } else {
                    "(nothing to clear)".to_string()
                }
            }
            Line::Image(url) => {
                pending_images.push(url.to_string());
                format!("(image attached to your next message, {} queued)", pending_images.len())
            }
            Line::Message(text) => {
                summary.turns += 1;
                let images = std::mem::take(&mut pending_images);
                match agent.process_turn(seller, text, &images).await {
                    Ok(outcome) => format!("{REPLY_PREFIX}{}", outcome.reply),
                    Err(error) => {
                        summary.failures += 1;
                        format!("{REPLY_PREFIX}{FAILURE_REPLY} ({error})")
                    }
                }
            }
        };

        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
    }

    output.flush().await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{classify, Line};

    #[test]
    fn commands_are_recognised_before_messages() {
        assert_eq!(classify("  quit "), Line::Quit);
        assert_eq!(classify("exit"), Line::Quit);
        assert_eq!(classify("reset"), Line::Reset);
        assert_eq!(classify("image https://cdn.example.com/a.jpg"), Line::Image("https://cdn.example.com/a.jpg"));
        assert_eq!(classify("image "), Line::Message("image"));
        assert_eq!(classify("   "), Line::Blank);
        assert_eq!(classify("add red sneakers 15000"), Line::Message("add red sneakers 15000"));
    }
}
