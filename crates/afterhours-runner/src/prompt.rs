//! Prompt template loading and rendering via `minijinja`.
//!
//! Templates are loaded from the filesystem (default: `templates/`) so the
//! voice of the chat can be tuned without recompiling. Each generation
//! request kind has its own user template; all share one system template.

use afterhours_core::{GenerationRequest, Persona};
use afterhours_types::Message;
use minijinja::Environment;
use serde_json::{Value, json};

use crate::error::RunnerError;

/// Template names and the files they are loaded from.
const TEMPLATES: &[(&str, &str)] = &[
    ("system", "system.j2"),
    ("channel", "channel.j2"),
    ("reaction", "reaction.j2"),
    ("direct", "direct.j2"),
];

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

/// The complete rendered prompt ready to send to an LLM backend.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// System message setting up the chat network.
    pub system: String,
    /// User message with the participants, history and the ask.
    pub user: String,
}

impl PromptEngine {
    /// Create a new prompt engine loading templates from the given directory.
    ///
    /// The directory must contain `system.j2`, `channel.j2`, `reaction.j2`
    /// and `direct.j2`.
    pub fn new(templates_dir: &str) -> Result<Self, RunnerError> {
        let mut env = Environment::new();
        for (name, file) in TEMPLATES {
            let source = load_template(templates_dir, file)?;
            env.add_template_owned(*name, source)
                .map_err(|e| RunnerError::Template(format!("failed to add {name} template: {e}")))?;
        }
        Ok(Self { env })
    }

    /// Render the prompt for one generation request.
    pub fn render(&self, request: &GenerationRequest) -> Result<RenderedPrompt, RunnerError> {
        let (template, ctx) = context(request);
        let system = self.render_one("system", &ctx)?;
        let user = self.render_one(template, &ctx)?;
        Ok(RenderedPrompt { system, user })
    }

    fn render_one(&self, name: &str, ctx: &Value) -> Result<String, RunnerError> {
        self.env
            .get_template(name)
            .map_err(|e| RunnerError::Template(format!("missing {name} template: {e}")))?
            .render(ctx)
            .map_err(|e| RunnerError::Template(format!("{name} render failed: {e}")))
    }
}

/// Template name and render context for `request`.
fn context(request: &GenerationRequest) -> (&'static str, Value) {
    match request {
        GenerationRequest::Channel {
            channel,
            topic,
            human,
            members,
            recent,
            trigger,
        } => (
            "channel",
            json!({
                "mode": "channel",
                "channel": channel,
                "topic": topic,
                "human": human,
                "members": members.iter().map(persona).collect::<Vec<_>>(),
                "recent": recent.iter().map(line).collect::<Vec<_>>(),
                "trigger": trigger.as_ref().map(line),
            }),
        ),
        GenerationRequest::Reaction {
            channel,
            topic,
            human,
            members,
            recent,
            target,
        } => (
            "reaction",
            json!({
                "mode": "reaction",
                "channel": channel,
                "topic": topic,
                "human": human,
                "members": members.iter().map(persona).collect::<Vec<_>>(),
                "recent": recent.iter().map(line).collect::<Vec<_>>(),
                "target": line(target),
            }),
        ),
        GenerationRequest::Direct {
            actor,
            human,
            history,
            opener,
        } => (
            "direct",
            json!({
                "mode": "direct",
                "actor": persona(actor),
                "human": human,
                "history": history.iter().map(line).collect::<Vec<_>>(),
                "opener": opener,
            }),
        ),
    }
}

fn persona(p: &Persona) -> Value {
    json!({
        "name": p.name,
        "personality": p.personality,
        "formality": p.profile.formality,
        "verbosity": p.profile.verbosity,
        "humor": p.profile.humor,
        "emoji_usage": p.profile.emoji_usage,
        "punctuation": p.profile.punctuation,
        "memory": p.memory,
    })
}

fn line(m: &Message) -> Value {
    json!({
        "author": m.author,
        "content": m.content,
        "kind": m.kind,
        "time": m.timestamp.format("%H:%M").to_string(),
    })
}

/// Read a template file from disk.
fn load_template(dir: &str, filename: &str) -> Result<String, RunnerError> {
    let path = format!("{dir}/{filename}");
    std::fs::read_to_string(&path)
        .map_err(|e| RunnerError::Template(format!("failed to read {path}: {e}")))
}

#[cfg(test)]
mod tests {
    use afterhours_types::{Actor, ActorKind, MessageKind};
    use chrono::Utc;

    use super::*;

    fn shipped_templates() -> String {
        format!("{}/templates", env!("CARGO_MANIFEST_DIR"))
    }

    fn nova() -> Persona {
        let mut actor = Actor::new("nova", ActorKind::Synthetic);
        actor.personality = "night owl, into modular synths".to_owned();
        Persona::of(&actor, "kit is a friendly regular.".to_owned())
    }

    #[test]
    fn channel_prompt_lists_members_and_history() {
        let engine = PromptEngine::new(&shipped_templates());
        assert!(engine.is_ok(), "shipped templates should load");
        let Ok(engine) = engine else { return };

        let request = GenerationRequest::Channel {
            channel: "#lobby".to_owned(),
            topic: "late night radio".to_owned(),
            human: "kit".to_owned(),
            members: vec![nova()],
            recent: vec![Message::new("kit", "anyone awake?", MessageKind::User, Utc::now())],
            trigger: None,
        };
        let result = engine.render(&request);
        assert!(result.is_ok(), "channel prompt should render");
        let Ok(prompt) = result else { return };
        assert!(prompt.system.contains("kit"));
        assert!(prompt.user.contains("#lobby"));
        assert!(prompt.user.contains("nova"));
        assert!(prompt.user.contains("modular synths"));
        assert!(prompt.user.contains("anyone awake?"));
    }

    #[test]
    fn direct_prompt_carries_the_opener() {
        let engine = PromptEngine::new(&shipped_templates());
        assert!(engine.is_ok(), "shipped templates should load");
        let Ok(engine) = engine else { return };
        let request = GenerationRequest::Direct {
            actor: nova(),
            human: "kit".to_owned(),
            history: Vec::new(),
            opener: Some("ask what they are listening to".to_owned()),
        };
        let result = engine.render(&request);
        assert!(result.is_ok(), "direct prompt should render");
        let Ok(prompt) = result else { return };
        assert!(prompt.user.contains("ask what they are listening to"));
        assert!(prompt.user.contains("kit is a friendly regular."));
    }

    #[test]
    fn missing_template_returns_error() {
        let unique = format!(
            "afterhours_missing_templates_{}_{:?}",
            std::process::id(),
            std::thread::current().id(),
        );
        let dir = std::env::temp_dir().join(unique);
        std::fs::create_dir_all(&dir).ok();
        std::fs::write(dir.join("system.j2"), "test").ok();

        let result = PromptEngine::new(dir.to_str().unwrap_or(""));
        assert!(result.is_err(), "should fail when templates are missing");

        std::fs::remove_dir_all(&dir).ok();
    }
}
