use flowerbot_core::domain::submission::SubmissionRecord;
use flowerbot_core::moderation::{ModerationRequest, TicketStatus};
use flowerbot_core::wizard::{Draft, MESSAGE_MAX_CHARS, MESSAGE_MIN_CHARS, NAME_MAX_CHARS};
use serde::Serialize;

pub const MESSAGE_OPEN_ACTION: &str = "flower.message.open.v1";
pub const NAME_OPEN_ACTION: &str = "flower.name.open.v1";
pub const CONSENT_YES_ACTION: &str = "flower.consent.yes.v1";
pub const CONSENT_NO_ACTION: &str = "flower.consent.no.v1";
pub const SHARE_YES_ACTION: &str = "flower.share.yes.v1";
pub const SHARE_NO_ACTION: &str = "flower.share.no.v1";
pub const IMAGE_UPLOAD_ACTION: &str = "flower.image.upload.v1";
pub const IMAGE_SKIP_ACTION: &str = "flower.image.skip.v1";
pub const REVIEW_EDIT_MESSAGE_ACTION: &str = "flower.review.edit_message.v1";
pub const REVIEW_EDIT_NAME_ACTION: &str = "flower.review.edit_name.v1";
pub const REVIEW_EDIT_CONSENT_ACTION: &str = "flower.review.edit_consent.v1";
pub const REVIEW_EDIT_SHARING_ACTION: &str = "flower.review.edit_sharing.v1";
pub const REVIEW_REPLACE_IMAGE_ACTION: &str = "flower.review.replace_image.v1";
pub const REVIEW_CONFIRM_ACTION: &str = "flower.review.confirm.v1";
pub const MODERATION_APPROVE_ACTION: &str = "flower.moderation.approve.v1";
pub const MODERATION_DECLINE_ACTION: &str = "flower.moderation.decline.v1";

pub const MESSAGE_MODAL_ID: &str = "flower.modal.message.v1";
pub const NAME_MODAL_ID: &str = "flower.modal.name.v1";

pub const ANNOUNCEMENT_TITLE: &str = "🌸 New Flower Submission 💐";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A labelled value rendered side by side with its siblings in a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        block_id: String,
        text: TextObject,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Field>,
    },
    Actions {
        block_id: String,
        elements: Vec<ButtonElement>,
    },
    Context {
        block_id: String,
        elements: Vec<TextObject>,
    },
    Image {
        block_id: String,
        image_url: String,
        alt_text: String,
    },
}

impl Block {
    pub fn block_id(&self) -> &str {
        match self {
            Self::Section { block_id, .. }
            | Self::Actions { block_id, .. }
            | Self::Context { block_id, .. }
            | Self::Image { block_id, .. } => block_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.block_id() == block_id)
    }

    /// Every button across all action rows, in render order.
    pub fn buttons(&self) -> Vec<&ButtonElement> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn action_ids(&self) -> Vec<&str> {
        self.buttons().into_iter().map(|button| button.action_id.as_str()).collect()
    }

    pub fn field(&self, label: &str) -> Option<&str> {
        self.blocks.iter().find_map(|block| match block {
            Block::Section { fields, .. } => fields
                .iter()
                .find(|field| field.label == label)
                .map(|field| field.value.as_str()),
            _ => None,
        })
    }
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
        let (text, fields) = builder.build();
        self.blocks.push(Block::Section { block_id: block_id.into(), text, fields });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn image(
        mut self,
        block_id: impl Into<String>,
        image_url: impl Into<String>,
        alt_text: impl Into<String>,
    ) -> Self {
        self.blocks.push(Block::Image {
            block_id: block_id.into(),
            image_url: image_url.into(),
            alt_text: alt_text.into(),
        });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
    fields: Vec<Field>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    pub fn field(&mut self, label: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push(Field { label: label.into(), value: value.into() });
        self
    }

    fn build(self) -> (TextObject, Vec<Field>) {
        (self.text.unwrap_or_else(|| TextObject::plain("")), self.fields)
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputStyle {
    Short,
    Paragraph,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInput {
    pub label: String,
    pub style: TextInputStyle,
    pub min_length: usize,
    pub max_length: usize,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<String>,
}

/// Single-input form opened in response to an interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalTemplate {
    pub modal_id: String,
    pub title: String,
    pub input: TextInput,
}

/// What an interaction handler sends back to the user who triggered it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    Message(MessageTemplate),
    Modal(ModalTemplate),
}

pub fn message_modal(current: Option<&str>) -> ModalTemplate {
    ModalTemplate {
        modal_id: MESSAGE_MODAL_ID.to_owned(),
        title: "Your Flower Message".to_owned(),
        input: TextInput {
            label: "Message".to_owned(),
            style: TextInputStyle::Paragraph,
            min_length: MESSAGE_MIN_CHARS,
            max_length: MESSAGE_MAX_CHARS,
            required: true,
            placeholder: Some("Share your appreciation, good news, or a kind word...".to_owned()),
            initial_value: current.map(str::to_owned),
        },
    }
}

pub fn name_modal(current: Option<&str>) -> ModalTemplate {
    ModalTemplate {
        modal_id: NAME_MODAL_ID.to_owned(),
        title: "Your Name".to_owned(),
        input: TextInput {
            label: "Name (leave blank to stay anonymous)".to_owned(),
            style: TextInputStyle::Short,
            min_length: 0,
            max_length: NAME_MAX_CHARS,
            required: false,
            placeholder: Some("How should we credit you?".to_owned()),
            initial_value: current.map(str::to_owned),
        },
    }
}

pub fn message_prompt() -> MessageTemplate {
    MessageBuilder::new("Let's submit your flower")
        .section("flower.prompt.message.v1", |section| {
            section.mrkdwn(format!(
                "🌸 *Let's submit your flower!*\nStep 1: write your message ({MESSAGE_MIN_CHARS}-{MESSAGE_MAX_CHARS} characters)."
            ));
        })
        .actions("flower.prompt.message.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(MESSAGE_OPEN_ACTION, "📝 Write Message")
                    .style(ButtonStyle::Primary),
            );
        })
        .build()
}

pub fn name_prompt() -> MessageTemplate {
    MessageBuilder::new("What name should appear with your flower?")
        .section("flower.prompt.name.v1", |section| {
            section.mrkdwn(
                "✅ *Message saved!*\nStep 2: what name should appear with your flower? Leave it blank to stay anonymous.",
            );
        })
        .actions("flower.prompt.name.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(NAME_OPEN_ACTION, "✏️ Enter Name").style(ButtonStyle::Primary),
            );
        })
        .build()
}

pub fn consent_prompt() -> MessageTemplate {
    MessageBuilder::new("May we feature your flower on our website?")
        .section("flower.prompt.consent.v1", |section| {
            section.mrkdwn(
                "Step 3: may we feature your flower on our website? Website posts are reviewed by a moderator first.",
            );
        })
        .actions("flower.prompt.consent.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(CONSENT_YES_ACTION, "✅ Yes, share it")
                        .style(ButtonStyle::Primary),
                )
                .button(ButtonElement::new(CONSENT_NO_ACTION, "🚫 No, keep it here"));
        })
        .build()
}

pub fn share_username_prompt() -> MessageTemplate {
    MessageBuilder::new("Would you like to show your username?")
        .section("flower.prompt.share.v1", |section| {
            section.mrkdwn(
                "You didn't give a name. Would you like your username shown with your flower?",
            );
        })
        .actions("flower.prompt.share.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(SHARE_YES_ACTION, "👤 Show my username")
                        .style(ButtonStyle::Primary),
                )
                .button(ButtonElement::new(SHARE_NO_ACTION, "🕶️ Stay anonymous"));
        })
        .build()
}

pub fn image_prompt(has_image: bool, window_secs: u64) -> MessageTemplate {
    let skip_label = if has_image { "⏭️ Keep Current Image" } else { "⏭️ Skip Image" };
    MessageBuilder::new("Add an image to your flower")
        .section("flower.prompt.image.v1", |section| {
            section.mrkdwn(format!(
                "Step 4 (optional): add an image. Click *Upload Image*, then send the picture in this channel within {}.",
                describe_window(window_secs)
            ));
        })
        .actions("flower.prompt.image.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(IMAGE_UPLOAD_ACTION, "📸 Upload Image")
                        .style(ButtonStyle::Primary),
                )
                .button(ButtonElement::new(IMAGE_SKIP_ACTION, skip_label));
        })
        .build()
}

pub fn image_capture_started(window_secs: u64) -> MessageTemplate {
    MessageBuilder::new("Waiting for your image")
        .section("flower.capture.waiting.v1", |section| {
            section.mrkdwn(format!(
                "📸 Send your image as a message in this channel within {}. PNG, JPEG, WebP and GIF files work.",
                describe_window(window_secs)
            ));
        })
        .build()
}

/// Re-offers the image step after the capture window closed with nothing usable.
pub fn image_capture_retry(reason: &str, has_image: bool, window_secs: u64) -> MessageTemplate {
    let mut message = image_prompt(has_image, window_secs);
    message.fallback_text = reason.to_owned();
    message.blocks.insert(
        0,
        Block::Section {
            block_id: "flower.capture.retry.v1".to_owned(),
            text: TextObject::mrkdwn(reason),
            fields: Vec::new(),
        },
    );
    message
}

pub fn image_capture_timeout(has_image: bool, window_secs: u64) -> MessageTemplate {
    image_capture_retry(
        "⌛ Image upload timeout. Upload again or skip to the review; you can also use \"Replace Image\" from the review later.",
        has_image,
        window_secs,
    )
}

pub fn review_card(draft: &Draft, ask_share_username: bool) -> MessageTemplate {
    let message = draft.message.clone().unwrap_or_default();
    let identity = draft.effective_identity();
    let consent = if draft.consent { "✅ Yes" } else { "❌ No" };
    let show_sharing = draft.is_anonymous() && ask_share_username;

    let mut builder = MessageBuilder::new("Review your flower before submitting")
        .section("flower.review.header.v1", |section| {
            section.mrkdwn("🔍 *Review your flower*\nCheck everything below, then confirm.");
        })
        .section("flower.review.details.v1", |section| {
            section
                .mrkdwn(format!("*Message*\n{message}"))
                .field("Submitted by", identity.clone())
                .field("Website consent", consent);
            if show_sharing {
                section.field(
                    "Username sharing",
                    if draft.share_username { "👤 Shown" } else { "🕶️ Hidden" },
                );
            }
            section.field("Image", if draft.image.is_some() { "📎 Attached" } else { "None" });
        });

    if let Some(image) = &draft.image {
        builder = builder.image("flower.review.image.v1", image.url.clone(), image.filename.clone());
    }

    builder
        .actions("flower.review.edit.actions.v1", |actions| {
            actions
                .button(ButtonElement::new(REVIEW_EDIT_MESSAGE_ACTION, "📝 Edit Message"))
                .button(ButtonElement::new(REVIEW_EDIT_NAME_ACTION, "✏️ Edit Name"))
                .button(ButtonElement::new(REVIEW_EDIT_CONSENT_ACTION, "🌐 Edit Consent"));
            if show_sharing {
                actions.button(ButtonElement::new(REVIEW_EDIT_SHARING_ACTION, "👤 Edit Sharing"));
            }
            actions.button(ButtonElement::new(REVIEW_REPLACE_IMAGE_ACTION, "🖼️ Replace Image"));
        })
        .actions("flower.review.confirm.actions.v1", |actions| {
            actions.button(
                ButtonElement::new(REVIEW_CONFIRM_ACTION, "✅ Confirm & Submit")
                    .style(ButtonStyle::Primary),
            );
        })
        .build()
}

pub fn announcement(record: &SubmissionRecord, identity: &str) -> MessageTemplate {
    let mut builder = MessageBuilder::new(format!("{ANNOUNCEMENT_TITLE} from {identity}"))
        .section("flower.announcement.body.v1", |section| {
            section
                .mrkdwn(format!("*{ANNOUNCEMENT_TITLE}*\n\n{}", record.message))
                .field("Submitted by", identity);
        });
    if let Some(picture) = &record.picture {
        builder = builder.image("flower.announcement.image.v1", picture.clone(), "Flower image");
    }
    builder
        .context("flower.announcement.footer.v1", |context| {
            context.plain(format!("Thank you for celebrating with us! 🌸 · Flower ID: {}", record.id));
        })
        .build()
}

pub fn submission_acknowledgement(consent: bool, warning: Option<&str>) -> MessageTemplate {
    let mut body = "🌸 *Thank you!* Your flower has been submitted.".to_owned();
    if consent {
        body.push_str("\nIt will be reviewed by a moderator before appearing on our website.");
    }
    let mut builder = MessageBuilder::new("Your flower has been submitted")
        .section("flower.ack.summary.v1", |section| {
            section.mrkdwn(body);
        });
    if let Some(warning) = warning {
        builder = builder.context("flower.ack.warning.v1", |context| {
            context.plain(warning);
        });
    }
    builder.build()
}

pub fn moderation_ticket(request: &ModerationRequest, status: &TicketStatus) -> MessageTemplate {
    let submission_id = request.submission_id.as_str();
    let mut builder = MessageBuilder::new(format!(
        "Flower {submission_id} from {} needs moderation",
        request.display_identity
    ))
    .section("flower.moderation.summary.v1", |section| {
        section
            .mrkdwn(format!(
                "🔍 *New flower for website review*\n<{}|Jump to Message →>",
                request.announcement_link
            ))
            .field("📛 Submitted by", request.submitted_by())
            .field("⏰ Submitted at", format!("<t:{}:F>", request.submitted_at.timestamp()))
            .field("📝 Message Content", request.message_preview())
            .field("📊 Status", status.label());
    });
    if let Some(image_url) = &request.image_url {
        builder = builder.image("flower.moderation.image.v1", image_url.clone(), "Submitted image");
    }
    builder = builder.context("flower.moderation.footer.v1", |context| {
        context.plain(format!(
            "Flower ID: {submission_id} | Requires approval for website publication"
        ));
    });
    if !status.is_terminal() {
        builder = builder.actions("flower.moderation.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(MODERATION_APPROVE_ACTION, "✅ Approve for Website")
                        .style(ButtonStyle::Primary)
                        .value(submission_id),
                )
                .button(
                    ButtonElement::new(MODERATION_DECLINE_ACTION, "❌ Decline")
                        .style(ButtonStyle::Danger)
                        .value(submission_id),
                );
        });
    }
    builder.build()
}

pub fn notice(block_id: &str, text: &str) -> MessageTemplate {
    MessageBuilder::new(text.to_owned())
        .section(block_id, |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("flower.error.summary.v1", |section| {
            section.mrkdwn(format!(":warning: {summary}"));
        })
        .context("flower.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

pub fn help_message() -> MessageTemplate {
    MessageBuilder::new("Flower command help")
        .section("flower.help.summary.v1", |section| {
            section.mrkdwn(
                "*Share a flower* 🌸\n• `/flower` starts a new submission\n• `/flower help` shows this message\n\nRunning `/flower` again discards any submission you have in progress.",
            );
        })
        .build()
}

fn describe_window(window_secs: u64) -> String {
    match window_secs {
        60 => "1 minute".to_owned(),
        secs if secs >= 60 && secs % 60 == 0 => format!("{} minutes", secs / 60),
        secs => format!("{secs} seconds"),
    }
}
