//! Interactive phone driven by stdin line commands

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

use dialtone_core::Config;
use dialtone_phone::{CallPhase, CallState, Phone, PhoneHandle, SignalingClient, WebRtcBackend};

const HELP: &str = "commands: call <id> | accept | decline | hangup | cancel | status | quit";

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Call(String),
    Accept,
    End,
    Status,
    Help,
    Quit,
}

fn parse(line: &str) -> Result<Option<Action>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let action = match command.to_lowercase().as_str() {
        "call" => match words.next() {
            Some(id) => Action::Call(id.to_string()),
            None => return Err("usage: call <id>".to_string()),
        },
        "accept" | "answer" => Action::Accept,
        "decline" | "hangup" | "cancel" | "end" => Action::End,
        "status" => Action::Status,
        "help" | "?" => Action::Help,
        "quit" | "exit" => Action::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(action))
}

/// Run a phone against the configured relay until stdin closes or `quit`
pub async fn run(config: Config, call: Option<String>, auto_answer: bool) -> Result<()> {
    let backend = Arc::new(WebRtcBackend::new(&config.phone.ice_servers)?);
    let client = SignalingClient::connect(&config.phone.server_url).await?;
    let connection = client.cancel_token();
    let (outbound, inbound) = client.into_parts();

    let phone = Phone::spawn(backend, outbound, inbound, config.phone.busy_policy);
    let registered = phone.wait_for(|state| state.local_id.is_some()).await?;
    if let Some(id) = &registered.local_id {
        println!("Your id: {id}");
    }
    println!("{HELP}");

    tokio::spawn(report_state(phone.watch(), phone.clone(), auto_answer));

    if let Some(target) = call {
        if let Err(e) = phone.place_call(target).await {
            println!("Call failed: {e}");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse(&line) {
                    Ok(Some(Action::Quit)) => break,
                    Ok(Some(action)) => execute(&phone, action).await,
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
            () = phone.stopped() => {
                println!("Disconnected from relay");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(e) = phone.end().await {
        debug!(error = %e, "Phone already stopped");
    }
    connection.cancel();
    info!("Phone stopped");
    Ok(())
}

async fn execute(phone: &PhoneHandle, action: Action) {
    let result = match action {
        Action::Call(id) => phone.place_call(id).await,
        Action::Accept => phone.accept().await,
        Action::End => phone.end().await,
        Action::Status => {
            print_state(&phone.state());
            Ok(())
        }
        Action::Help => {
            println!("{HELP}");
            Ok(())
        }
        Action::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("{e}");
    }
}

async fn report_state(mut state: watch::Receiver<CallState>, phone: PhoneHandle, auto_answer: bool) {
    let mut last = state.borrow_and_update().phase;

    while state.changed().await.is_ok() {
        let current = state.borrow_and_update().clone();
        if current.phase == last {
            continue;
        }
        last = current.phase;
        print_state(&current);

        if auto_answer && current.phase == CallPhase::IncomingPending {
            if let Err(e) = phone.accept().await {
                println!("Auto-answer failed: {e}");
            }
        }
    }
}

fn print_state(state: &CallState) {
    let counterpart = state
        .counterpart
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);

    match state.phase {
        CallPhase::Idle => println!("[idle]"),
        CallPhase::OutgoingPending => println!("[calling {counterpart}]"),
        CallPhase::IncomingPending => println!("[incoming call from {counterpart}] type 'accept' or 'decline'"),
        CallPhase::Active => println!("[in call with {counterpart}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("call b1"), Ok(Some(Action::Call("b1".to_string()))));
        assert_eq!(parse("  ACCEPT "), Ok(Some(Action::Accept)));
        assert_eq!(parse("decline"), Ok(Some(Action::End)));
        assert_eq!(parse("hangup"), Ok(Some(Action::End)));
        assert_eq!(parse("cancel"), Ok(Some(Action::End)));
        assert_eq!(parse("status"), Ok(Some(Action::Status)));
        assert_eq!(parse("quit"), Ok(Some(Action::Quit)));
        assert_eq!(parse(""), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("call").is_err());
        assert!(parse("dial b1").is_err());
    }
}
