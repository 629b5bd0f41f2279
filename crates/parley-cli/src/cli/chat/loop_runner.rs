//! The interactive chat loop.
//!
//! Input lines and view updates are multiplexed with `tokio::select!`;
//! output goes through the readline `SharedWriter` so incoming messages
//! never clobber the prompt.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use parley_core::chat::{ChatSessionController, ChatView};
use parley_core::connection::SupervisorConfig;
use parley_core::transport::ChatTransport;
use parley_infra::http::HttpSessionRepository;
use parley_infra::ws::WsConnector;
use parley_types::config::ParleyConfig;
use parley_types::connection::ConnectionState;
use parley_types::page::LoadMoreState;
use rustyline_async::{Readline, ReadlineEvent, SharedWriter};
use secrecy::{ExposeSecret, SecretString};

use super::commands::{self, ChatCommand};
use super::render;

/// Tracks what has already been printed so view updates only print deltas.
#[derive(Default)]
struct Printed {
    ids: HashSet<i64>,
    connection: Option<ConnectionState>,
    load_more: Option<LoadMoreState>,
}

impl Printed {
    /// Lines to print for the difference between `view` and what is on
    /// screen, oldest message first.
    fn delta(&mut self, view: &ChatView) -> Vec<String> {
        let mut lines = Vec::new();

        // Timeline is newest-first: unseen entries before the first seen one
        // are live, unseen entries after it are older history.
        let first_seen = view.messages.iter().position(|m| self.ids.contains(&m.id));
        let (live, older) = match first_seen {
            Some(index) => view.messages.split_at(index),
            None => (view.messages.as_slice(), &[][..]),
        };

        let older: Vec<_> = older.iter().filter(|m| !self.ids.contains(&m.id)).collect();
        if !older.is_empty() {
            lines.push(format!("  {}", style("-- earlier --").dim()));
            for message in older.iter().rev() {
                lines.push(render::message_line(message));
            }
        }
        for message in live.iter().rev() {
            lines.push(render::message_line(message));
        }
        self.ids.extend(view.messages.iter().map(|m| m.id));

        if self.connection.as_ref() != Some(&view.connection) {
            if self.connection.is_some() || view.connection != ConnectionState::Disconnected {
                lines.push(render::connection_line(&view.connection));
            }
            self.connection = Some(view.connection.clone());
        }

        if self.load_more != Some(view.load_more) {
            if let Some(line) = render::load_more_line(view.load_more) {
                lines.push(line);
            }
            self.load_more = Some(view.load_more);
        }

        lines
    }
}

fn clone_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn emit(out: &mut SharedWriter, lines: impl IntoIterator<Item = String>) {
    for line in lines {
        let _ = writeln!(out, "{line}");
    }
}

pub async fn run_chat_loop(config: &ParleyConfig, token: SecretString) -> anyhow::Result<()> {
    let repository = Arc::new(
        HttpSessionRepository::new(&config.api, clone_secret(&token))
            .context("failed to set up session API client")?,
    );
    let transport = ChatTransport::new(
        WsConnector::new(),
        SupervisorConfig::from_gateway(&config.gateway, config.events.capacity),
    );
    let controller =
        ChatSessionController::new(repository, transport, token, config.history.page_size);

    let spinner = indicatif::ProgressBar::new_spinner();
    if let Ok(spinner_style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message("opening session...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    let started = controller.start().await;
    spinner.finish_and_clear();

    match &started {
        Ok(session_id) => println!("{}", render::banner(*session_id, &config.gateway.url)),
        Err(e) => eprintln!(
            "\n  {} Could not open a session: {e}. Type /retry to try again.\n",
            style("!").red().bold()
        ),
    }

    let prompt = format!("  {} ", style("You >").green().bold());
    let (mut readline, mut out) =
        Readline::new(prompt).map_err(|e| anyhow::anyhow!("failed to initialize input: {e}"))?;

    let mut view_rx = controller.subscribe_view();
    let mut notices = controller.transport().subscribe_notices();
    let mut printed = Printed::default();
    emit(&mut out, printed.delta(&view_rx.borrow_and_update()));

    loop {
        tokio::select! {
            event = readline.readline() => {
                let line = match event {
                    Ok(ReadlineEvent::Line(line)) => line,
                    Ok(ReadlineEvent::Interrupted) => {
                        emit(&mut out, [format!("  {}", style("Press Ctrl+D to exit, or keep chatting.").dim())]);
                        continue;
                    }
                    Ok(ReadlineEvent::Eof) | Err(_) => break,
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                readline.add_history_entry(text.to_string());

                match commands::parse(text) {
                    None => {
                        if !controller.send_message(text).await {
                            emit(&mut out, [format!(
                                "  {} not sent: {} -- reconnecting",
                                style("!").yellow().bold(),
                                controller.view().connection
                            )]);
                        }
                    }
                    Some(ChatCommand::Quit) => break,
                    Some(ChatCommand::Help) => emit(&mut out, [commands::help_text()]),
                    Some(ChatCommand::Status) => emit(&mut out, [render::status_block(&controller.view())]),
                    Some(ChatCommand::More) => {
                        let state = controller.load_more().await;
                        if state == LoadMoreState::NoMore && printed.load_more == Some(LoadMoreState::NoMore) {
                            emit(&mut out, [format!("  {}", style("no older messages").dim())]);
                        }
                    }
                    Some(ChatCommand::Refresh) => {
                        if let Err(e) = controller.refresh().await {
                            emit(&mut out, [format!("  {} {e}", style("!").yellow().bold())]);
                        }
                    }
                    Some(ChatCommand::Read) => {
                        let count = controller.mark_all_unread_as_read().await;
                        emit(&mut out, [format!("  {} marked {count} message(s) read", style("*").cyan())]);
                    }
                    Some(ChatCommand::Retry) => {
                        if let Err(e) = controller.retry().await {
                            emit(&mut out, [format!("  {} retry failed: {e}", style("!").red().bold())]);
                        } else if let Some(id) = controller.view().phase.session_id() {
                            if started.is_err() && printed.ids.is_empty() {
                                emit(&mut out, [render::banner(id, &config.gateway.url)]);
                            }
                        }
                    }
                    Some(ChatCommand::Unknown(name)) => emit(&mut out, [format!(
                        "  {} Unknown command: {}. Type /help for available commands.",
                        style("?").yellow().bold(),
                        style(name).dim()
                    )]),
                }
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                emit(&mut out, printed.delta(&view));
            }
            notice = notices.recv() => {
                if let Ok(text) = notice {
                    emit(&mut out, [format!("  {} {}", style("i").blue(), style(text).dim())]);
                }
            }
        }
    }

    controller.close();
    let _ = readline.flush();
    println!("\n  {}", style("Session ended.").dim());
    tracing::debug!("chat loop finished");
    Ok(())
}
