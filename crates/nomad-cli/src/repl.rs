use std::io::Write;

use anyhow::Context;
use nomad_gateway::SharedState;
use tokio::io::{AsyncBufReadExt, BufReader};

enum Input<'a> {
    Quit,
    Reset,
    Skip,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => Input::Skip,
        "quit" | "exit" | "/quit" | "/exit" => Input::Quit,
        "reset" | "/reset" => Input::Reset,
        _ => Input::Message(trimmed),
    }
}

/// Interactive chat loop over stdin/stdout sharing the gateway runtime.
pub async fn run(
    state: SharedState,
    hotel: Option<String>,
    language: String,
) -> anyhow::Result<()> {
    let session_id = format!("cli-{}", std::process::id());
    let hotel_id = hotel.as_deref();

    println!(
        "NomadAI concierge ({}). Type 'reset' to start over, 'quit' to leave.",
        state.runtime.settings().model
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };

        match parse_input(&line) {
            Input::Quit => break,
            Input::Skip => continue,
            Input::Reset => {
                state.sessions.reset(&session_id);
                println!("(conversation cleared)");
            }
            Input::Message(text) => {
                let message = match state.validator.sanitize_message(text) {
                    Ok(message) => message,
                    Err(err) => {
                        println!("! {err}");
                        continue;
                    }
                };
                match state
                    .runtime
                    .process_turn(&session_id, &message, hotel_id, &language)
                    .await
                {
                    Ok(outcome) => println!("concierge> {}\n", outcome.response),
                    Err(err) => {
                        tracing::warn!(error = %err, "turn failed");
                        println!("! {}\n", err.user_message());
                    }
                }
            }
        }
    }

    state.sessions.reset(&session_id);
    Ok(())
}
