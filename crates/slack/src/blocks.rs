use serde::Serialize;
use welcomebot_core::WelcomeState;

pub const WELCOME_BANNER: &str =
    "Welcome to this awesome channel! \n\n*Get started by completing the tasks!*";
pub const REACTION_TASK_CAPTION: &str = "*React to this message!*";
pub const CHECKED_GLYPH: &str = ":white_check_mark:";
pub const UNCHECKED_GLYPH: &str = ":white_large_square:";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        text: TextObject,
    },
    Divider,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: Some(block_id.into()), text: builder.build() });
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::Divider);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

/// Renders a welcome message: banner, divider, then the reaction checklist line.
///
/// The checklist glyph is the only part that changes between renders of the
/// same state.
pub fn welcome_message(state: &WelcomeState) -> MessageTemplate {
    MessageBuilder::new("Welcome to this awesome channel!")
        .section("welcome.banner.v1", |section| {
            section.mrkdwn(WELCOME_BANNER);
        })
        .divider()
        .section("welcome.task.reaction.v1", |section| {
            section.mrkdwn(reaction_task_line(state.completed));
        })
        .build()
}

pub fn reaction_task_line(completed: bool) -> String {
    let glyph = if completed { CHECKED_GLYPH } else { UNCHECKED_GLYPH };
    format!("{glyph} {REACTION_TASK_CAPTION}")
}

pub fn message_count_text(count: u64) -> String {
    format!("Message: {count}")
}
