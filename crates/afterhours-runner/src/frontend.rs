//! Line-oriented terminal front end.
//!
//! Reads commands and chat lines from stdin, writes every simulation event
//! to stdout. Plain text goes to the active channel or conversation.

use afterhours_core::{SimEvent, Simulation, Speed};
use afterhours_types::{Message, MessageKind, Target};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::RunnerError;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Say something in the active target (`/me` included).
    Say(String),
    /// Switch to a channel, creating and joining it if needed.
    Join(String),
    /// Leave the active channel.
    Part,
    /// Open a direct conversation.
    Query(String),
    /// Change simulation speed.
    Speed(Speed),
    /// Set the active channel's topic.
    Topic(String),
    /// Exit.
    Quit,
    /// Anything unrecognised, with a hint.
    Invalid(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') || line.starts_with("/me ") {
        return Some(Command::Say(line.to_owned()));
    }
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    Some(match name {
        "/join" | "/j" if !rest.is_empty() => {
            let channel = if rest.starts_with('#') { rest.to_owned() } else { format!("#{rest}") };
            Command::Join(channel)
        }
        "/part" => Command::Part,
        "/query" | "/msg" if !rest.is_empty() => Command::Query(rest.to_owned()),
        "/speed" => match parse_speed(rest) {
            Some(speed) => Command::Speed(speed),
            None => Command::Invalid("usage: /speed off|slow|normal|fast".to_owned()),
        },
        "/topic" if !rest.is_empty() => Command::Topic(rest.to_owned()),
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Invalid(format!("unknown command {name}")),
    })
}

fn parse_speed(s: &str) -> Option<Speed> {
    match s.to_lowercase().as_str() {
        "off" | "pause" => Some(Speed::Off),
        "slow" => Some(Speed::Slow),
        "normal" => Some(Speed::Normal),
        "fast" => Some(Speed::Fast),
        _ => None,
    }
}

/// Render an event as a terminal line. Typing indicators are not shown.
pub fn render_event(event: &SimEvent) -> Option<String> {
    match event {
        SimEvent::MessageAdded { target, message } => Some(render_message(target, message)),
        SimEvent::Unread { target } => Some(format!("   (new activity in {target})")),
        SimEvent::TypingStarted { .. } | SimEvent::TypingStopped { .. } => None,
    }
}

fn render_message(target: &Target, m: &Message) -> String {
    let time = m.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    let mut body = match m.kind {
        MessageKind::Action => format!("* {} {}", m.author, m.content),
        MessageKind::Topic => format!("-- {} set the topic: {}", m.author, m.content),
        MessageKind::Join
        | MessageKind::Part
        | MessageKind::Quit
        | MessageKind::Kick
        | MessageKind::Ban
        | MessageKind::Notice
        | MessageKind::System => format!("-- {}", m.content),
        MessageKind::User | MessageKind::Ai | MessageKind::Pm | MessageKind::Bot => {
            format!("<{}> {}", m.author, m.content)
        }
    };
    for url in m.links.iter().chain(&m.images) {
        body.push(' ');
        body.push_str(url);
    }
    format!("[{time}] {target} {body}")
}

/// Drives a [`Simulation`] from stdin and prints its events.
pub struct Terminal {
    sim: Simulation,
    human: String,
    active: Option<Target>,
}

impl Terminal {
    /// Terminal for `sim`, starting in `active`.
    pub fn new(sim: Simulation, active: Option<Target>) -> Self {
        let human = sim.config().human.clone();
        sim.set_active_context(active.clone());
        Self { sim, human, active }
    }

    /// Run until `/quit` or end of input.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        let printer = tokio::spawn(print_events(self.sim.subscribe()));
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let Some(command) = parse_command(&line) else {
                continue;
            };
            if command == Command::Quit {
                break;
            }
            self.apply(command);
        }
        printer.abort();
        Ok(())
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Say(text) => match &self.active {
                Some(target) => {
                    if let Err(e) = self.sim.send_human_message(target, &text) {
                        warn!(error = %e, "message not sent");
                    }
                }
                None => info!("join a channel or open a query first"),
            },
            Command::Join(channel) => {
                if self.sim.create_channel(&channel, "").is_ok() {
                    info!(channel = %channel, "channel created");
                }
                match self.sim.join_channel(&channel, &self.human) {
                    Ok(()) => self.focus(Target::Channel(channel)),
                    Err(e) => warn!(error = %e, "join failed"),
                }
            }
            Command::Part => {
                if let Some(Target::Channel(channel)) = self.active.take() {
                    if let Err(e) = self.sim.part_channel(&channel, &self.human) {
                        warn!(error = %e, "part failed");
                    }
                    self.sim.set_active_context(None);
                }
            }
            Command::Query(nick) => self.focus(Target::Direct(nick)),
            Command::Speed(speed) => {
                self.sim.set_speed(speed);
                info!(speed = ?speed, "speed changed");
            }
            Command::Topic(topic) => {
                if let Some(Target::Channel(channel)) = &self.active
                    && let Err(e) = self.sim.set_topic(channel, &topic, &self.human)
                {
                    warn!(error = %e, "topic not set");
                }
            }
            Command::Invalid(hint) => info!("{hint}"),
            Command::Quit => {}
        }
    }

    fn focus(&mut self, target: Target) {
        info!(target = %target, "now viewing");
        self.sim.set_active_context(Some(target.clone()));
        self.active = Some(target);
    }
}

async fn print_events(mut events: broadcast::Receiver<SimEvent>) {
    let mut stdout = tokio::io::stdout();
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(mut text) = render_event(&event) else {
                    continue;
                };
                text.push('\n');
                if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "terminal fell behind, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn plain_text_and_actions_are_said() {
        assert_eq!(parse_command("  hi all \n"), Some(Command::Say("hi all".into())));
        assert_eq!(parse_command("/me waves"), Some(Command::Say("/me waves".into())));
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("/join lobby"), Some(Command::Join("#lobby".into())));
        assert_eq!(parse_command("/j #synth"), Some(Command::Join("#synth".into())));
        assert_eq!(parse_command("/query nova"), Some(Command::Query("nova".into())));
        assert_eq!(parse_command("/speed FAST"), Some(Command::Speed(Speed::Fast)));
        assert_eq!(parse_command("/topic night radio"), Some(Command::Topic("night radio".into())));
        assert_eq!(parse_command("/quit"), Some(Command::Quit));
        assert!(matches!(parse_command("/speed warp"), Some(Command::Invalid(_))));
        assert!(matches!(parse_command("/join"), Some(Command::Invalid(_))));
    }

    #[test]
    fn messages_render_by_kind() {
        let lobby = Target::Channel("#lobby".into());
        let mut said = Message::new("nova", "look", MessageKind::Ai, Utc::now());
        said.images.push("https://i.imgur.com/cat.png".into());
        let line = render_message(&lobby, &said);
        assert!(line.ends_with("#lobby <nova> look https://i.imgur.com/cat.png"));

        let action = Message::new("nova", "waves", MessageKind::Action, Utc::now());
        assert!(render_message(&lobby, &action).ends_with("* nova waves"));

        let typing = SimEvent::TypingStarted {
            target: lobby,
            actor: "nova".into(),
        };
        assert_eq!(render_event(&typing), None);
    }
}
