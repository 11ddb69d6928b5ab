//! Terminal chat over a single PDF.
//!
//! `docqa chat <file>` loads the document into a fresh [`Session`] and reads
//! questions line by line. Answers print as they stream, followed by the
//! numbered sources they were grounded on.
//!
//! | Input | Effect |
//! |-------|--------|
//! | `/clear` | Forget the conversation |
//! | `/history` | Reprint completed turns |
//! | `/quit`, `/exit` | Leave |

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{Config, Secrets};
use crate::providers::Providers;
use crate::render::{format_sources, format_turn};
use crate::session::{Session, UploadOutcome};

/// Run the interactive chat against the PDF at `path`.
pub async fn run_chat(config: &Config, path: &Path) -> Result<()> {
    let secrets = Secrets::from_env(config)?;
    let providers = Providers::from_config(config, &secrets)?;
    let mut session = Session::new(Arc::new(config.clone()), providers);

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut stdout = std::io::stdout();
    load_document(&mut session, &name, &bytes, &mut stdout).await?;

    let input = BufReader::new(tokio::io::stdin());
    chat_loop(&mut session, input, &mut stdout).await
}

/// Upload `bytes` into `session`, reporting progress to `out`.
pub async fn load_document<W: Write>(
    session: &mut Session,
    name: &str,
    bytes: &[u8],
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Processing {}...", name)?;
    match session.upload(name, bytes).await? {
        UploadOutcome::Processed { chunks } => {
            writeln!(out, "Processed {}: split into {} chunks.", name, chunks)?
        }
        UploadOutcome::Unchanged { chunks } => {
            writeln!(out, "{} already loaded ({} chunks).", name, chunks)?
        }
    }
    writeln!(out, "Ask a question, or /quit to leave.")?;
    Ok(())
}

/// Read questions from `input` until EOF or `/quit`.
///
/// A failed answer is reported and the loop continues; the conversation
/// is left as it was before the question.
pub async fn chat_loop<R, W>(session: &mut Session, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "\n> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                writeln!(out, "Conversation cleared.")?;
            }
            "/history" => {
                if session.history().is_empty() {
                    writeln!(out, "No questions asked yet.")?;
                }
                for turn in session.history() {
                    writeln!(out, "{}", format_turn(turn))?;
                }
            }
            query => {
                let result = session
                    .ask(query, |token| {
                        let _ = write!(out, "{}", token);
                        let _ = out.flush();
                    })
                    .await;
                match result {
                    Ok(turn) => {
                        writeln!(out)?;
                        let sources = format_sources(&turn.sources);
                        if !sources.is_empty() {
                            writeln!(out, "\n{}", sources)?;
                        }
                    }
                    Err(e) => writeln!(out, "\n{}", e)?,
                }
            }
        }
    }
    Ok(())
}
