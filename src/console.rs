use std::collections::HashMap;

use anyhow::Result;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use helpline::{
    ClientChat, EventStream, ManagerWorkspace, Message, MessageId, Position, Session, UserId,
    ViewDelta,
};

const BLOCKED_NOTICE: &str = "[message removed: it contained restricted content]";

/// First group of the uuid, enough to tell chats and people apart on a
/// terminal line.
fn short(id: Uuid) -> String {
    id.to_string().split('-').next().unwrap_or_default().to_string()
}

/// Presentation mirror of a timeline. It applies deltas verbatim and
/// renders plain lines; every ordering decision already happened upstream.
///
/// Live arrivals and one-line notices print immediately. History prepends
/// are buffered silently, and the run loop reprints the whole transcript
/// once the operation that triggered them finishes.
struct Transcript {
    me: UserId,
    order: Vec<MessageId>,
    messages: HashMap<MessageId, Message>,
}

impl Transcript {
    fn new(me: UserId) -> Self {
        Transcript {
            me,
            order: Vec::new(),
            messages: HashMap::new(),
        }
    }

    fn apply(&mut self, delta: ViewDelta) {
        match delta {
            ViewDelta::MessageInserted { message, position } => {
                match position {
                    Position::Start => self.order.insert(0, message.id),
                    Position::End => {
                        self.order.push(message.id);
                        println!("{}", self.line(&message));
                    }
                }
                self.messages.insert(message.id, message);
            }
            ViewDelta::MessageDelivered { message_id } => {
                if let Some(message) = self.messages.get_mut(&message_id) {
                    message.delivered = true;
                    println!("(delivered)");
                }
            }
            ViewDelta::MessageBlocked { message_id } => {
                if let Some(message) = self.messages.get_mut(&message_id) {
                    message.blocked = true;
                    println!("(a message was removed by the moderation filter)");
                }
            }
            ViewDelta::NoMoreHistory => println!("-- no more messages --"),
            ViewDelta::TimelineCleared => {
                self.order.clear();
                self.messages.clear();
            }
            ViewDelta::ChatOpened { chat } => {
                println!("+ chat {} with client {}", short(chat.id), short(chat.client_id));
            }
            ViewDelta::ChatClosed { chat_id } => {
                println!("- chat {} closed", short(chat_id));
            }
            ViewDelta::ChatSelected { chat_id } => match chat_id {
                Some(id) => println!("= talking in chat {}", short(id)),
                None => println!("= no chat selected"),
            },
            ViewDelta::FreeHandsAvailable { available } => {
                if available {
                    println!("= you may take the next problem (/ready)");
                } else {
                    println!("= at capacity, ready button unavailable");
                }
            }
            ViewDelta::FreeHandsWaiting => println!("= waiting for problems..."),
            ViewDelta::OperationFailed { operation, details } => {
                println!("! could not {operation}: {details}");
            }
        }
    }

    fn line(&self, message: &Message) -> String {
        let time = message.created_at.with_timezone(&Local).format("%H:%M");
        let body = if message.blocked {
            BLOCKED_NOTICE
        } else {
            message.body.as_str()
        };
        if message.service {
            return format!("[{time}] * {body}");
        }
        let author = match message.author_id {
            Some(id) if id == self.me => "you".to_string(),
            Some(id) => short(id),
            None => "?".to_string(),
        };
        let ack = if message.author_id == Some(self.me) {
            if message.delivered {
                " ✓✓"
            } else {
                " ✓"
            }
        } else {
            ""
        };
        format!("[{time}] {author}: {body}{ack}")
    }

    fn print_transcript(&self) {
        if self.order.is_empty() {
            println!("(no messages)");
            return;
        }
        for id in &self.order {
            if let Some(message) = self.messages.get(id) {
                println!("{}", self.line(message));
            }
        }
    }

    /// Applies everything the core has emitted so far without blocking.
    fn drain(&mut self, deltas: &mut UnboundedReceiver<ViewDelta>) {
        while let Ok(delta) = deltas.try_recv() {
            self.apply(delta);
        }
    }
}

pub async fn run_client(
    session: &Session,
    mut chat: ClientChat,
    mut deltas: UnboundedReceiver<ViewDelta>,
    mut stream: EventStream,
) -> Result<()> {
    println!("helpline customer console. Type to send; /older, /refresh, /show, /quit.");
    let mut transcript = Transcript::new(session.user_id());

    chat.load_initial().await;
    transcript.drain(&mut deltas);
    transcript.print_transcript();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stream_alive = true;
    loop {
        tokio::select! {
            event = stream.next_event(), if stream_alive => match event {
                Some(event) => {
                    chat.handle_event(event);
                    transcript.drain(&mut deltas);
                }
                None => {
                    println!("(event stream ended; sending still works, live updates stop)");
                    stream_alive = false;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/older" => {
                        chat.load_older().await;
                        transcript.drain(&mut deltas);
                        transcript.print_transcript();
                    }
                    "/refresh" => {
                        chat.refresh().await;
                        transcript.drain(&mut deltas);
                        transcript.print_transcript();
                    }
                    "/show" => transcript.print_transcript(),
                    command if command.starts_with('/') => {
                        println!("unknown command: {command}");
                    }
                    text => {
                        chat.send(text).await;
                        transcript.drain(&mut deltas);
                    }
                }
            }
        }
    }

    stream.shutdown().await;
    println!("bye");
    Ok(())
}

pub async fn run_manager(
    session: &Session,
    mut workspace: ManagerWorkspace,
    mut deltas: UnboundedReceiver<ViewDelta>,
    mut stream: EventStream,
) -> Result<()> {
    println!(
        "helpline manager console. /chats, /open <n>, /ready, /resolve, /older, /refresh, \
         /show, /quit; anything else sends to the selected chat."
    );
    let mut transcript = Transcript::new(session.user_id());

    workspace.refresh().await;
    transcript.drain(&mut deltas);
    transcript.print_transcript();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stream_alive = true;
    loop {
        tokio::select! {
            event = stream.next_event(), if stream_alive => match event {
                Some(event) => {
                    workspace.handle_event(event).await;
                    transcript.drain(&mut deltas);
                }
                None => {
                    println!("(event stream ended; commands still work, live updates stop)");
                    stream_alive = false;
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/chats" => {
                        if workspace.chats().is_empty() {
                            println!("(no chats)");
                        }
                        for (index, chat) in workspace.chats().iter().enumerate() {
                            let marker = if Some(chat.id) == workspace.selected_chat() {
                                "*"
                            } else {
                                " "
                            };
                            println!(
                                "{marker} {}: chat {} with client {}",
                                index + 1,
                                short(chat.id),
                                short(chat.client_id)
                            );
                        }
                    }
                    "/ready" => {
                        workspace.free_hands().await;
                        transcript.drain(&mut deltas);
                    }
                    "/resolve" => {
                        workspace.resolve().await;
                        transcript.drain(&mut deltas);
                    }
                    "/older" => {
                        workspace.load_older().await;
                        transcript.drain(&mut deltas);
                        transcript.print_transcript();
                    }
                    "/refresh" => {
                        workspace.refresh().await;
                        transcript.drain(&mut deltas);
                        transcript.print_transcript();
                    }
                    "/show" => transcript.print_transcript(),
                    command if command.starts_with("/open") => {
                        let number = command
                            .strip_prefix("/open")
                            .map(str::trim)
                            .and_then(|n| n.parse::<usize>().ok());
                        match number {
                            Some(number) if number >= 1 => {
                                match workspace.chats().get(number - 1).map(|chat| chat.id) {
                                    Some(chat_id) => {
                                        workspace.select_chat(chat_id).await;
                                        transcript.drain(&mut deltas);
                                        transcript.print_transcript();
                                    }
                                    None => println!("no chat number {number}; see /chats"),
                                }
                            }
                            _ => println!("usage: /open <number>"),
                        }
                    }
                    command if command.starts_with('/') => {
                        println!("unknown command: {command}");
                    }
                    text => {
                        workspace.send(text).await;
                        transcript.drain(&mut deltas);
                    }
                }
            }
        }
    }

    stream.shutdown().await;
    println!("bye");
    Ok(())
}
