use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flowerbot_chat::blocks::{self, MessageTemplate, Reply};
use flowerbot_chat::events::{ButtonPressEvent, EventContext, InteractionRef, ModalSubmitEvent};
use flowerbot_chat::images::{ImageStore, ImageStoreError};
use flowerbot_chat::surface::{ChatSurface, MessageRef, SurfaceError};
use flowerbot_chat::FlowerServices;
use flowerbot_core::audit::InMemoryAuditSink;
use flowerbot_core::collector::CollectedMessage;
use flowerbot_core::config::AppConfig;
use flowerbot_core::domain::image::{DraftImage, ImageAttachment};
use flowerbot_core::wizard::WizardStep;
use flowerbot_db::{InMemorySubmissionRepository, SubmissionRepository};

const USER: &str = "U100";
const CHANNEL: &str = "C-garden";
const ANNOUNCE_CHANNEL: &str = "C-announce";
const MOD_CHANNEL: &str = "C-moderation";
const STORED_URL: &str = "https://media.flowers.test/media/stored.png";

#[derive(Default)]
struct RecordingSurface {
    fail_publish: bool,
    published: Mutex<Vec<(String, MessageTemplate)>>,
    tickets: Mutex<Vec<(String, MessageTemplate)>>,
    ephemerals: Mutex<Vec<(String, MessageTemplate)>>,
    ticket_updates: Mutex<Vec<(String, String, String, bool)>>,
    deleted: Mutex<Vec<(String, String)>>,
}

impl RecordingSurface {
    fn failing_publish() -> Self {
        Self { fail_publish: true, ..Self::default() }
    }

    fn published(&self) -> Vec<(String, MessageTemplate)> {
        self.published.lock().expect("lock").clone()
    }

    fn tickets(&self) -> Vec<(String, MessageTemplate)> {
        self.tickets.lock().expect("lock").clone()
    }

    fn ephemerals(&self) -> Vec<(String, MessageTemplate)> {
        self.ephemerals.lock().expect("lock").clone()
    }

    fn ticket_updates(&self) -> Vec<(String, String, String, bool)> {
        self.ticket_updates.lock().expect("lock").clone()
    }

    fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChatSurface for RecordingSurface {
    async fn reply(&self, _interaction: &InteractionRef, _reply: &Reply) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn send_ephemeral(
        &self,
        _channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), SurfaceError> {
        self.ephemerals.lock().expect("lock").push((user_id.to_owned(), message.clone()));
        Ok(())
    }

    async fn publish(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError> {
        if self.fail_publish {
            return Err(SurfaceError::Unavailable("announcement channel offline".to_owned()));
        }
        let mut published = self.published.lock().expect("lock");
        published.push((channel_id.to_owned(), message.clone()));
        Ok(message_ref(channel_id, "announce", published.len()))
    }

    async fn post_review_ticket(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<MessageRef, SurfaceError> {
        let mut tickets = self.tickets.lock().expect("lock");
        tickets.push((channel_id.to_owned(), message.clone()));
        Ok(message_ref(channel_id, "ticket", tickets.len()))
    }

    async fn update_ticket(
        &self,
        channel_id: &str,
        message_id: &str,
        status: &str,
        remove_controls: bool,
    ) -> Result<(), SurfaceError> {
        self.ticket_updates.lock().expect("lock").push((
            channel_id.to_owned(),
            message_id.to_owned(),
            status.to_owned(),
            remove_controls,
        ));
        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), SurfaceError> {
        self.deleted.lock().expect("lock").push((channel_id.to_owned(), message_id.to_owned()));
        Ok(())
    }
}

fn message_ref(channel_id: &str, kind: &str, sequence: usize) -> MessageRef {
    let message_id = format!("{kind}-{sequence}");
    MessageRef {
        channel_id: channel_id.to_owned(),
        permalink: format!("https://chat.test/{channel_id}/{message_id}"),
        message_id,
    }
}

#[derive(Clone, Copy)]
enum Upload {
    Stored,
    Fails,
    Stalls,
}

struct FakeImageStore {
    reachable: bool,
    upload: Upload,
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn check_reachable(&self, source_url: &str) -> Result<(), ImageStoreError> {
        if self.reachable {
            Ok(())
        } else {
            Err(ImageStoreError::SourceStatus { url: source_url.to_owned(), status: 404 })
        }
    }

    async fn store(&self, image: &DraftImage) -> Result<String, ImageStoreError> {
        match self.upload {
            Upload::Stored => Ok(STORED_URL.to_owned()),
            Upload::Fails => {
                Err(ImageStoreError::SourceStatus { url: image.url.clone(), status: 502 })
            }
            Upload::Stalls => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(STORED_URL.to_owned())
            }
        }
    }
}

struct Harness {
    services: FlowerServices,
    repository: Arc<InMemorySubmissionRepository>,
    surface: Arc<RecordingSurface>,
    audit: InMemoryAuditSink,
}

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.chat.moderation_channel_id = MOD_CHANNEL.to_owned();
    config.chat.announcement_channel_id = Some(ANNOUNCE_CHANNEL.to_owned());
    config.wizard.image_capture_window_secs = 60;
    config
}

fn harness_with(surface: RecordingSurface, reachable: bool) -> Harness {
    harness_with_store(surface, FakeImageStore { reachable, upload: Upload::Stored })
}

fn harness_with_upload(upload: Upload) -> Harness {
    harness_with_store(RecordingSurface::default(), FakeImageStore { reachable: true, upload })
}

fn harness_with_store(surface: RecordingSurface, images: FakeImageStore) -> Harness {
    let repository = Arc::new(InMemorySubmissionRepository::default());
    let surface = Arc::new(surface);
    let audit = InMemoryAuditSink::default();
    let services = FlowerServices::new(
        &config(),
        repository.clone(),
        surface.clone(),
        Arc::new(images),
        Arc::new(audit.clone()),
    );
    Harness { services, repository, surface, audit }
}

fn harness() -> Harness {
    harness_with(RecordingSurface::default(), true)
}

fn ctx() -> EventContext {
    EventContext { correlation_id: "req-flower-1".to_owned() }
}

fn press(action_id: &str) -> ButtonPressEvent {
    ButtonPressEvent {
        interaction: InteractionRef::new("I1", CHANNEL, USER),
        username: "rosa".to_owned(),
        message_id: "M-prompt".to_owned(),
        action_id: action_id.to_owned(),
        value: None,
    }
}

fn moderator_press(action_id: &str, submission_id: &str, message_id: &str) -> ButtonPressEvent {
    ButtonPressEvent {
        interaction: InteractionRef::new("I-mod", MOD_CHANNEL, "U-moderator"),
        username: "moss".to_owned(),
        message_id: message_id.to_owned(),
        action_id: action_id.to_owned(),
        value: Some(submission_id.to_owned()),
    }
}

fn modal(modal_id: &str, value: &str) -> ModalSubmitEvent {
    ModalSubmitEvent {
        interaction: InteractionRef::new("I2", CHANNEL, USER),
        username: "rosa".to_owned(),
        modal_id: modal_id.to_owned(),
        value: value.to_owned(),
    }
}

fn upload() -> CollectedMessage {
    CollectedMessage {
        message_id: "M-upload".to_owned(),
        channel_id: CHANNEL.to_owned(),
        author_id: USER.to_owned(),
        attachments: vec![ImageAttachment {
            url: "https://cdn.chat.test/attachments/tulip.png".to_owned(),
            content_type: Some("image/png".to_owned()),
            filename: Some("tulip.png".to_owned()),
            size_bytes: Some(120_000),
        }],
    }
}

fn message(reply: Reply) -> MessageTemplate {
    match reply {
        Reply::Message(message) => message,
        Reply::Modal(modal) => panic!("expected a message, got modal {}", modal.modal_id),
    }
}

fn offers(reply: Reply, action_id: &str) -> bool {
    message(reply).action_ids().contains(&action_id)
}

fn step_of(harness: &Harness) -> Option<WizardStep> {
    harness.services.wizard.sessions().get(USER).map(|draft| draft.step)
}

/// Walks a named, consenting submitter up to the review card with an uploaded image.
async fn reach_review_with_image(harness: &Harness) {
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    assert!(offers(wizard.start(USER, "rosa", CHANNEL, "req-flower-1"), blocks::MESSAGE_OPEN_ACTION));
    assert!(matches!(wizard.press(&press(blocks::MESSAGE_OPEN_ACTION), &ctx).await, Reply::Modal(_)));
    assert!(offers(
        wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx),
        blocks::NAME_OPEN_ACTION
    ));
    assert!(offers(
        wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "Rosa"), &ctx),
        blocks::CONSENT_YES_ACTION
    ));
    assert!(offers(
        wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await,
        blocks::IMAGE_UPLOAD_ACTION
    ));

    let waiting = message(wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await);
    assert!(waiting.block("flower.capture.waiting.v1").is_some());
    assert!(wizard.collectors().is_active(USER));

    assert!(wizard.collectors().offer(&upload()));
    wizard.settle_captures().await;
    assert_eq!(step_of(harness), Some(WizardStep::Review));
}

#[tokio::test]
async fn full_submission_is_stored_announced_and_sent_for_review() {
    let harness = harness();
    reach_review_with_image(&harness).await;

    let review = harness.surface.ephemerals();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].1.field("Submitted by"), Some("Rosa"));
    assert!(review[0].1.action_ids().contains(&blocks::REVIEW_CONFIRM_ACTION));
    assert_eq!(harness.surface.deleted(), vec![(CHANNEL.to_owned(), "M-upload".to_owned())]);

    let ack = message(harness.services.wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx()).await);
    assert!(ack.block("flower.ack.summary.v1").is_some());
    assert!(ack.block("flower.ack.warning.v1").is_none());
    assert_eq!(step_of(&harness), None, "draft is removed once submitted");

    let records = harness.repository.list_recent(10).await.expect("list");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.name.as_deref(), Some("Rosa"));
    assert_eq!(record.username, None);
    assert_eq!(record.message, "Thank you for the lovely tulips!");
    assert_eq!(record.picture.as_deref(), Some(STORED_URL));
    assert!(record.website);
    assert!(!record.approved);

    let published = harness.surface.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, ANNOUNCE_CHANNEL);
    assert_eq!(published[0].1.field("Submitted by"), Some("Rosa"));

    let tickets = harness.surface.tickets();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].0, MOD_CHANNEL);
    assert!(tickets[0].1.action_ids().contains(&blocks::MODERATION_APPROVE_ACTION));

    let events = harness.audit.event_types();
    assert!(events.contains(&"submission.record_created".to_owned()));
    assert!(events.contains(&"submission.published".to_owned()));
    assert!(events.contains(&"moderation.ticket_opened".to_owned()));
}

#[tokio::test]
async fn approval_is_recorded_once() {
    let harness = harness();
    reach_review_with_image(&harness).await;
    harness.services.wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx()).await;

    let records = harness.repository.list_recent(1).await.expect("list");
    let submission_id = records[0].id.to_string();

    let first = message(
        harness
            .services
            .moderation
            .handle_press(
                &moderator_press(blocks::MODERATION_APPROVE_ACTION, &submission_id, "ticket-1"),
                &ctx(),
            )
            .await,
    );
    assert!(first.fallback_text.contains("approved"));
    let stored = harness.repository.find_by_id(&records[0].id).await.expect("find");
    assert!(stored.map(|record| record.approved).unwrap_or(false));

    let updates = harness.surface.ticket_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!((updates[0].0.as_str(), updates[0].1.as_str()), (MOD_CHANNEL, "ticket-1"));
    assert!(updates[0].3, "buttons are removed after a decision");

    let repeat = message(
        harness
            .services
            .moderation
            .handle_press(
                &moderator_press(blocks::MODERATION_DECLINE_ACTION, &submission_id, "ticket-1"),
                &ctx(),
            )
            .await,
    );
    assert!(repeat.fallback_text.contains("already handled"));
    assert_eq!(harness.surface.ticket_updates().len(), 1);
    let stored = harness.repository.find_by_id(&records[0].id).await.expect("find");
    assert!(stored.map(|record| record.approved).unwrap_or(false), "second press never writes");
}

#[tokio::test]
async fn anonymous_submission_without_consent_skips_moderation() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Happy anniversary to the whole team"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "   "), &ctx);
    assert!(offers(wizard.press(&press(blocks::CONSENT_NO_ACTION), &ctx).await, blocks::SHARE_NO_ACTION));
    assert!(offers(wizard.press(&press(blocks::SHARE_NO_ACTION), &ctx).await, blocks::IMAGE_SKIP_ACTION));

    let review = message(wizard.press(&press(blocks::IMAGE_SKIP_ACTION), &ctx).await);
    assert_eq!(review.field("Submitted by"), Some("Anonymous"));
    assert_eq!(review.field("Website consent"), Some("❌ No"));

    wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx).await;

    let records = harness.repository.list_recent(10).await.expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, None);
    assert_eq!(records[0].username, None);
    assert!(!records[0].website);
    assert_eq!(records[0].picture, None);
    assert_eq!(harness.surface.published().len(), 1);
    assert!(harness.surface.tickets().is_empty());
}

#[tokio::test]
async fn anonymous_submitter_can_share_their_username() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Sunflowers for everyone on the night shift"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, ""), &ctx);
    wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await;
    wizard.press(&press(blocks::SHARE_YES_ACTION), &ctx).await;
    let review = message(wizard.press(&press(blocks::IMAGE_SKIP_ACTION), &ctx).await);
    assert_eq!(review.field("Submitted by"), Some("rosa"));

    wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx).await;

    let records = harness.repository.list_recent(10).await.expect("list");
    assert_eq!(records[0].username.as_deref(), Some("rosa"));
    assert_eq!(records[0].name, None);
    assert_eq!(harness.surface.tickets().len(), 1);
}

#[tokio::test]
async fn short_message_is_rejected_and_draft_kept() {
    let harness = harness();
    let wizard = &harness.services.wizard;

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    let rejected = message(wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "hiya"), &ctx()));

    assert!(rejected.fallback_text.contains("at least 10 characters"));
    let draft = harness.services.wizard.sessions().get(USER).expect("draft");
    assert_eq!(draft.step, WizardStep::Message);
    assert_eq!(draft.message, None);
}

#[tokio::test]
async fn stale_button_is_refused_without_changing_the_draft() {
    let harness = harness();
    let wizard = &harness.services.wizard;

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    let refused = message(wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx()).await);

    assert!(refused.fallback_text.contains("no longer active"));
    assert_eq!(step_of(&harness), Some(WizardStep::Message));
    assert!(harness.repository.is_empty().await);
}

#[tokio::test]
async fn buttons_without_a_session_ask_for_a_restart() {
    let harness = harness();

    let expired =
        message(harness.services.wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx()).await);

    assert!(expired.fallback_text.contains("Run /flower again"));
}

#[tokio::test]
async fn failed_announcement_rolls_back_the_record() {
    let harness = harness_with(RecordingSurface::failing_publish(), true);
    reach_review_with_image(&harness).await;

    let failure = message(harness.services.wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx()).await);

    assert!(failure.block("flower.error.summary.v1").is_some());
    assert!(harness.repository.is_empty().await);
    assert!(harness.surface.tickets().is_empty());
    assert!(harness.audit.event_types().contains(&"submission.rollback_applied".to_owned()));
}

#[tokio::test]
async fn unreachable_upload_reoffers_the_image_step() {
    let harness = harness_with(RecordingSurface::default(), false);
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "Rosa"), &ctx);
    wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await;
    wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await;
    assert!(wizard.collectors().offer(&upload()));
    wizard.settle_captures().await;

    let follow_ups = harness.surface.ephemerals();
    assert_eq!(follow_ups.len(), 1);
    assert!(follow_ups[0].1.block("flower.capture.retry.v1").is_some());
    assert!(follow_ups[0].1.action_ids().contains(&blocks::IMAGE_UPLOAD_ACTION));
    assert_eq!(step_of(&harness), Some(WizardStep::Image));
    assert!(wizard.sessions().get(USER).and_then(|draft| draft.image).is_none());
    assert!(harness.surface.deleted().is_empty(), "rejected uploads stay in the channel");
}

#[tokio::test(start_paused = true)]
async fn capture_window_timeout_keeps_the_image_step() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "Rosa"), &ctx);
    wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await;
    wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await;

    tokio::time::advance(Duration::from_secs(61)).await;
    wizard.settle_captures().await;

    let follow_ups = harness.surface.ephemerals();
    assert_eq!(follow_ups.len(), 1);
    assert!(follow_ups[0].1.fallback_text.contains("timeout"));
    assert!(!wizard.collectors().is_active(USER));
    assert_eq!(step_of(&harness), Some(WizardStep::Image));
}

#[tokio::test]
async fn restarting_cancels_the_pending_capture() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "Rosa"), &ctx);
    wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await;
    wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await;
    assert!(wizard.collectors().is_active(USER));

    wizard.start(USER, "rosa", CHANNEL, "req-flower-2");
    wizard.settle_captures().await;

    assert!(!wizard.collectors().is_active(USER));
    assert!(!wizard.collectors().offer(&upload()));
    assert!(harness.surface.ephemerals().is_empty());
    assert_eq!(step_of(&harness), Some(WizardStep::Message));
}

#[tokio::test]
async fn double_confirm_submits_once() {
    let harness = harness();
    reach_review_with_image(&harness).await;
    let wizard = &harness.services.wizard;

    let (press_a, ctx_a) = (press(blocks::REVIEW_CONFIRM_ACTION), ctx());
    let (press_b, ctx_b) = (press(blocks::REVIEW_CONFIRM_ACTION), ctx());
    let (first, second) = tokio::join!(
        wizard.press(&press_a, &ctx_a),
        wizard.press(&press_b, &ctx_b),
    );

    let acknowledged = [first, second]
        .into_iter()
        .map(message)
        .filter(|reply| reply.block("flower.ack.summary.v1").is_some())
        .count();
    assert_eq!(acknowledged, 1);
    assert_eq!(harness.repository.len().await, 1);
    assert_eq!(harness.surface.published().len(), 1);
}

async fn confirm_without_stored_image(harness: &Harness) {
    reach_review_with_image(harness).await;

    let ack = message(harness.services.wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx()).await);
    assert!(ack.block("flower.ack.summary.v1").is_some());
    assert!(ack.block("flower.ack.warning.v1").is_some(), "submitter is told the image was dropped");

    let records = harness.repository.list_recent(10).await.expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].picture, None);
    assert_eq!(records[0].message, "Thank you for the lovely tulips!");
    assert_eq!(harness.surface.published().len(), 1);
    assert_eq!(harness.surface.tickets().len(), 1);
    assert!(harness.audit.event_types().contains(&"submission.image_skipped".to_owned()));
}

#[tokio::test]
async fn failed_image_upload_submits_without_the_image() {
    let harness = harness_with_upload(Upload::Fails);
    confirm_without_stored_image(&harness).await;
}

#[tokio::test(start_paused = true)]
async fn slow_image_upload_times_out_and_submits_without_the_image() {
    let harness = harness_with_upload(Upload::Stalls);
    confirm_without_stored_image(&harness).await;
}

#[tokio::test]
async fn editing_from_review_keeps_the_other_answers() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx);
    assert!(offers(
        wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "   "), &ctx),
        blocks::CONSENT_YES_ACTION
    ));
    assert!(offers(wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await, blocks::SHARE_YES_ACTION));
    assert!(offers(wizard.press(&press(blocks::SHARE_YES_ACTION), &ctx).await, blocks::IMAGE_UPLOAD_ACTION));
    wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await;
    assert!(wizard.collectors().offer(&upload()));
    wizard.settle_captures().await;
    assert_eq!(step_of(&harness), Some(WizardStep::Review));
    let before = wizard.sessions().get(USER).expect("draft");

    assert!(matches!(
        wizard.press(&press(blocks::REVIEW_EDIT_MESSAGE_ACTION), &ctx).await,
        Reply::Modal(_)
    ));
    assert!(offers(
        wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thanks for the sunflowers, neighbour!"), &ctx),
        blocks::REVIEW_CONFIRM_ACTION
    ));
    assert!(offers(
        wizard.press(&press(blocks::REVIEW_EDIT_CONSENT_ACTION), &ctx).await,
        blocks::CONSENT_NO_ACTION
    ));
    assert_eq!(step_of(&harness), Some(WizardStep::Consent));
    assert!(offers(
        wizard.press(&press(blocks::CONSENT_NO_ACTION), &ctx).await,
        blocks::REVIEW_CONFIRM_ACTION
    ));

    let edited = wizard.sessions().get(USER).expect("draft");
    assert_eq!(edited.step, WizardStep::Review);
    assert_eq!(edited.message.as_deref(), Some("Thanks for the sunflowers, neighbour!"));
    assert!(!edited.consent);
    assert_eq!(edited.display_name, before.display_name);
    assert_eq!(edited.share_username, before.share_username);
    assert!(edited.share_username);
    assert_eq!(edited.image, before.image);

    wizard.press(&press(blocks::REVIEW_CONFIRM_ACTION), &ctx).await;

    let records = harness.repository.list_recent(10).await.expect("list");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.message, "Thanks for the sunflowers, neighbour!");
    assert_eq!(record.name, None);
    assert_eq!(record.username.as_deref(), Some("rosa"));
    assert_eq!(record.picture.as_deref(), Some(STORED_URL));
    assert!(!record.website);
    assert!(harness.surface.tickets().is_empty(), "declined consent skips moderation");
}

#[tokio::test]
async fn abandoned_draft_expires_and_its_capture_stops() {
    let harness = harness();
    let wizard = &harness.services.wizard;
    let ctx = ctx();

    wizard.start(USER, "rosa", CHANNEL, "req-flower-1");
    wizard.submit_modal(&modal(blocks::MESSAGE_MODAL_ID, "Thank you for the lovely tulips!"), &ctx);
    wizard.submit_modal(&modal(blocks::NAME_MODAL_ID, "Rosa"), &ctx);
    wizard.press(&press(blocks::CONSENT_YES_ACTION), &ctx).await;
    wizard.press(&press(blocks::IMAGE_UPLOAD_ACTION), &ctx).await;
    assert!(wizard.collectors().is_active(USER));

    assert_eq!(wizard.expire_idle_sessions(Utc::now() + chrono::Duration::minutes(5)), 0);
    assert_eq!(step_of(&harness), Some(WizardStep::Image));

    assert_eq!(wizard.expire_idle_sessions(Utc::now() + chrono::Duration::minutes(31)), 1);
    wizard.settle_captures().await;

    assert!(wizard.sessions().is_empty());
    assert!(!wizard.collectors().is_active(USER));
    assert!(harness.surface.ephemerals().is_empty());
    assert!(harness.audit.event_types().contains(&"wizard.session_expired".to_string()));
    let expired = message(wizard.press(&press(blocks::IMAGE_SKIP_ACTION), &ctx).await);
    assert!(expired.fallback_text.contains("Run /flower again"));
}
