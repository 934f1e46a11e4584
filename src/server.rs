//! Line-delimited JSON hook protocol over stdin/stdout.
//!
//! Each request and response is one JSON object per line, tagged by
//! `type`. A `before_turn` runs while the server keeps reading input, so a
//! `cancel` for that session can abandon it; other requests arriving
//! mid-turn are queued.

use anyhow::{Context, Result};
use ctxguard_common::Message;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, info, warn};

use crate::session::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    BeforeTurn {
        session_id: String,
        context: Vec<Message>,
        #[serde(default)]
        model: Option<String>,
    },
    Command {
        session_id: String,
        name: String,
    },
    Cancel {
        session_id: String,
    },
    EndSession {
        session_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Context {
        session_id: String,
        compacted: bool,
        context: Vec<Message>,
    },
    Text {
        session_id: String,
        text: String,
    },
    Cancelled {
        session_id: String,
    },
    #[serde(rename = "ok")]
    Ended {
        session_id: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
    },
}

impl Response {
    fn error(session_id: Option<String>, message: impl Into<String>) -> Self {
        Response::Error {
            session_id,
            message: message.into(),
        }
    }
}

/// Serve requests from `input` until it reaches EOF.
pub async fn serve<R, W>(registry: &mut SessionRegistry, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut input_open = true;

    info!("hook server ready");

    loop {
        let line = match queued.pop_front() {
            Some(line) => line,
            None if input_open => match lines.next_line().await.context("Failed to read request")? {
                Some(line) => line,
                None => break,
            },
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "malformed request");
                let response = Response::error(None, format!("Malformed request: {}", err));
                write_response(&mut output, &response).await?;
                continue;
            }
        };

        let response = match request {
            Request::BeforeTurn {
                session_id,
                context,
                model,
            } => {
                let mut turn = Turn {
                    lines: &mut lines,
                    queued: &mut queued,
                    input_open: &mut input_open,
                };
                turn.run(registry, session_id, context, model).await?
            }
            Request::Command { session_id, name } => match registry.run_command(&session_id, &name) {
                Ok(text) => Response::Text { session_id, text },
                Err(message) => Response::error(Some(session_id), message),
            },
            Request::Cancel { session_id } => {
                Response::error(Some(session_id), "No turn in flight to cancel")
            }
            Request::EndSession { session_id } => {
                if registry.end_session(&session_id) {
                    debug!(session_id = %session_id, "session ended");
                }
                Response::Ended { session_id }
            }
        };

        write_response(&mut output, &response).await?;
    }

    info!(sessions = registry.session_count(), "input closed; shutting down");
    Ok(())
}

/// Serve the protocol on the process's stdin and stdout.
pub async fn serve_stdio(registry: &mut SessionRegistry) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(registry, stdin, tokio::io::stdout()).await
}

/// Input plumbing borrowed for the duration of one `before_turn`.
struct Turn<'a, R> {
    lines: &'a mut Lines<R>,
    queued: &'a mut VecDeque<String>,
    input_open: &'a mut bool,
}

impl<R: AsyncBufRead + Unpin> Turn<'_, R> {
    async fn run(
        &mut self,
        registry: &mut SessionRegistry,
        session_id: String,
        context: Vec<Message>,
        model: Option<String>,
    ) -> Result<Response> {
        let turn = registry.before_turn(&session_id, &context, model.as_deref());
        tokio::pin!(turn);

        loop {
            tokio::select! {
                result = &mut turn => {
                    return Ok(Response::Context {
                        session_id: session_id.clone(),
                        compacted: result.compacted(),
                        context: result.context,
                    });
                }
                line = self.lines.next_line(), if *self.input_open => {
                    match line.context("Failed to read request")? {
                        Some(line) if is_cancel_for(&line, &session_id) => {
                            info!(session_id = %session_id, "turn cancelled by host");
                            return Ok(Response::Cancelled {
                                session_id: session_id.clone(),
                            });
                        }
                        Some(line) => self.queued.push_back(line),
                        None => *self.input_open = false,
                    }
                }
            }
        }
    }
}

fn is_cancel_for(line: &str, session_id: &str) -> bool {
    matches!(
        serde_json::from_str::<Request>(line),
        Ok(Request::Cancel { session_id: id }) if id == session_id
    )
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &Response) -> Result<()> {
    let mut line = serde_json::to_string(response).context("Failed to serialize response")?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .context("Failed to write response")?;
    output.flush().await.context("Failed to flush response")?;
    Ok(())
}
