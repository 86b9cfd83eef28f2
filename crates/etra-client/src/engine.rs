use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use etra_codec::{DataUri, MAX_MEDIA_BYTES, Payload, PayloadError};
use etra_types::api::{CreateNoteRequest, SendMessageRequest};
use etra_types::{AllowList, FeedEvent};

use crate::backend::{ChangeFeed, Notifier, Prompt, Session, Store, Subscription};
use crate::error::EngineError;
use crate::notify;
use crate::policy::Operation;
use crate::recorder::AudioClip;
use crate::state::{ChatState, NoteDraft};

pub const SEND_FAILED: &str = "Failed to send the message";
pub const VOICE_FAILED: &str = "Failed to send the voice message";
pub const UPLOAD_FAILED: &str = "Failed to upload the file";
pub const FILE_TOO_LARGE: &str = "File is too large! The limit is 5MB";
pub const CONFIRM_DELETE_MESSAGE: &str = "Delete this message?";
pub const CONFIRM_CLEAR: &str = "Delete the whole conversation? This cannot be undone!";
pub const DELETE_FAILED: &str = "Failed to delete the message";
pub const CLEAR_FAILED: &str = "Failed to delete the conversation";
pub const NOTE_SAVE_FAILED: &str = "Failed to save the note";
pub const NOTE_UPDATE_FAILED: &str = "Failed to update the note";
pub const NOTE_DELETE_FAILED: &str = "Failed to delete the note";

/// Everything the engine needs, handed over at construction.
pub struct EngineContext {
    pub session: Session,
    pub allow_list: AllowList,
    pub store: Arc<dyn Store>,
    pub feed: Arc<dyn ChangeFeed>,
    pub notifier: Arc<dyn Notifier>,
    pub prompt: Arc<dyn Prompt>,
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Keeps the local view of the conversation and notes in step with the
/// backend.
///
/// Nothing happens until [`Engine::start`]. [`Engine::stop`] (also run on
/// drop) tears down the change feed; requests still in flight at that point
/// complete, but their results are dropped.
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: EngineContext,
    state: Mutex<ChatState>,
    running: AtomicBool,
    /// Bumped on every start and stop. Work started under an older epoch
    /// must not touch state.
    epoch: AtomicU64,
    note_fetches: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn self_id(&self) -> Uuid {
        self.ctx.session.user.id
    }

    fn live_epoch(&self) -> Result<u64, EngineError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(EngineError::Stopped);
        }
        Ok(self.epoch.load(Ordering::SeqCst))
    }

    fn is_live(&self, epoch: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn next_note_generation(&self) -> u64 {
        self.note_fetches.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn alert(&self, epoch: u64, message: &str) {
        if self.is_live(epoch) {
            self.ctx.prompt.alert(message);
        }
    }

    fn apply_event(self: &Arc<Self>, event: FeedEvent, epoch: u64) {
        let self_id = self.self_id();
        match event {
            FeedEvent::MessageInsert { message } => {
                let notification = notify::for_message(&message, self_id);
                let (added, enabled) = {
                    let mut state = self.state();
                    (state.merge_message(message), state.notifications_enabled)
                };
                if added && enabled {
                    if let Some(notification) = notification {
                        self.ctx.notifier.show(notification);
                    }
                }
            }
            FeedEvent::MessageDelete { id } => {
                if !self.state().remove_message(id) {
                    debug!("Delete for unknown message {}", id);
                }
            }
            FeedEvent::NoteInsert { note } => {
                if self.state().notifications_enabled {
                    if let Some(notification) = notify::for_note(&note, self_id) {
                        self.ctx.notifier.show(notification);
                    }
                }
                self.refresh_notes(epoch);
            }
            FeedEvent::NoteUpdate { .. } | FeedEvent::NoteDelete { .. } => self.refresh_notes(epoch),
            FeedEvent::PresenceSync { user_ids } => self.state().apply_presence(self_id, &user_ids),
            FeedEvent::Ready { .. } | FeedEvent::Tracked => {}
        }
    }

    /// Re-fetch the whole note list in the background.
    fn refresh_notes(self: &Arc<Self>, epoch: u64) {
        let generation = self.next_note_generation();
        let store = self.ctx.store.clone();
        let inner = Arc::downgrade(self);

        tokio::spawn(async move {
            let result = store.fetch_notes().await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if !inner.is_live(epoch) {
                return;
            }
            match result {
                Ok(notes) => {
                    if !inner.state().replace_notes(generation, notes) {
                        debug!("Discarding stale note fetch #{}", generation);
                    }
                }
                Err(e) => warn!("Note refresh failed: {}", e),
            }
        });
    }
}

async fn listen(inner: Weak<Inner>, mut subscription: Subscription, epoch: u64) {
    while let Some(event) = subscription.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.is_live(epoch) {
            break;
        }
        inner.apply_event(event, epoch);
    }
    debug!("Change feed closed");
}

impl Engine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                state: Mutex::new(ChatState::default()),
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                note_fetches: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.ctx.session
    }

    pub fn self_id(&self) -> Uuid {
        self.inner.self_id()
    }

    pub fn self_display_name(&self) -> String {
        self.inner.ctx.allow_list.display_name(&self.inner.ctx.session.user.email)
    }

    pub fn other_display_name(&self) -> String {
        self.inner
            .ctx
            .allow_list
            .other_display_name(&self.inner.ctx.session.user.email)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Copy of the current view state.
    pub fn snapshot(&self) -> ChatState {
        self.inner.state().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state().unread_count(self.self_id())
    }

    /// Subscribe, load both lists and start applying pushed changes.
    ///
    /// The feed is opened before the initial fetch so that changes made in
    /// between are replayed rather than lost. Calling `start` on a running
    /// engine does nothing.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.is_running() {
            return Ok(());
        }
        let inner = &self.inner;
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let self_id = inner.self_id();

        let subscription = inner.ctx.feed.subscribe(self_id).await?;
        let other = inner
            .ctx
            .store
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.id != self_id);
        let messages = inner.ctx.store.fetch_messages().await?;
        let generation = inner.next_note_generation();
        let notes = inner.ctx.store.fetch_notes().await?;
        let notifications_enabled = inner.ctx.notifier.request_permission().await;

        // `stop` takes the listener lock too, so it cannot slip in between
        // the epoch check and going live.
        let mut listener = inner.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.epoch.load(Ordering::SeqCst) != epoch {
            // Stopped (or restarted) while loading.
            return Err(EngineError::Stopped);
        }

        {
            let mut state = inner.state();
            if other.is_none() {
                warn!("Other participant has no account yet");
            }
            state.other = other;
            state.load_messages(messages);
            state.replace_notes(generation, notes);
            state.notifications_enabled = notifications_enabled;
            state.other_online = false;
            state.sending = false;
            state.uploading = false;
        }

        inner.running.store(true, Ordering::SeqCst);
        *listener = Some(tokio::spawn(listen(Arc::downgrade(inner), subscription, epoch)));
        drop(listener);

        info!("Engine started for {}", inner.ctx.session.user.email);
        Ok(())
    }

    /// Drop the change feed. Completions of requests still in flight are
    /// discarded.
    pub fn stop(&self) {
        let (listener, was_running) = {
            let mut listener = self.inner.listener.lock().unwrap_or_else(PoisonError::into_inner);
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
            (listener.take(), self.inner.running.swap(false, Ordering::SeqCst))
        };
        if let Some(listener) = listener {
            listener.abort();
        }
        if was_running {
            info!("Engine stopped");
        }
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.inner.state().draft = draft.into();
    }

    /// Turn notifications on (asking for permission) or off. Returns whether
    /// they are enabled afterwards.
    pub async fn set_notifications_enabled(&self, enabled: bool) -> bool {
        let enabled = enabled && self.inner.ctx.notifier.request_permission().await;
        self.inner.state().notifications_enabled = enabled;
        enabled
    }

    // -- Messages --

    /// Send a text message. The draft is cleared right away and put back
    /// if the store rejects the message.
    pub async fn send_text(&self, body: &str) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        let content = body.trim().to_string();
        if content.is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        {
            let mut state = self.inner.state();
            if state.sending {
                return Err(EngineError::Busy);
            }
            state.sending = true;
            state.draft.clear();
        }

        let result = self.insert_message(Operation::SendText, content.clone(), epoch).await;

        if self.inner.is_live(epoch) {
            let mut state = self.inner.state();
            state.sending = false;
            if result.is_err() {
                state.draft = content;
            }
        }
        if let Err(e) = &result {
            error!("Failed to send message: {}", e);
            self.inner.alert(epoch, SEND_FAILED);
        }
        result
    }

    pub async fn send_voice(&self, clip: AudioClip) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        if clip.bytes.is_empty() {
            return Err(PayloadError::EmptyData.into());
        }
        let data = DataUri::new(clip.mime, clip.bytes).to_uri();
        let payload = Payload::voice(clip.duration_secs, data)?;
        {
            let mut state = self.inner.state();
            if state.sending {
                return Err(EngineError::Busy);
            }
            state.sending = true;
        }

        let result = self.insert_message(Operation::SendVoice, payload.encode(), epoch).await;

        if self.inner.is_live(epoch) {
            self.inner.state().sending = false;
        }
        if let Err(e) = &result {
            error!("Failed to send voice message: {}", e);
            self.inner.alert(epoch, VOICE_FAILED);
        }
        result
    }

    /// Upload a file inline. Images become IMAGE payloads, anything else
    /// a FILE payload carrying the name.
    pub async fn send_file(&self, file: OutgoingFile) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        if file.bytes.len() > MAX_MEDIA_BYTES {
            self.inner.ctx.prompt.alert(FILE_TOO_LARGE);
            return Err(EngineError::FileTooLarge {
                size: file.bytes.len(),
                limit: MAX_MEDIA_BYTES,
            });
        }
        if file.bytes.is_empty() {
            return Err(PayloadError::EmptyData.into());
        }

        let uri = DataUri::new(file.mime, file.bytes);
        let payload = if uri.is_image() {
            Payload::image(uri.to_uri())?
        } else {
            Payload::file(attachment_name(&file.name), uri.to_uri())?
        };
        {
            let mut state = self.inner.state();
            if state.uploading {
                return Err(EngineError::Busy);
            }
            state.uploading = true;
        }

        let result = self.insert_message(Operation::SendFile, payload.encode(), epoch).await;

        if self.inner.is_live(epoch) {
            self.inner.state().uploading = false;
        }
        if let Err(e) = &result {
            error!("Failed to upload file: {}", e);
            self.inner.alert(epoch, UPLOAD_FAILED);
        }
        result
    }

    async fn insert_message(&self, op: Operation, content: String, epoch: u64) -> Result<(), EngineError> {
        let request = SendMessageRequest {
            content,
            client_token: Some(Uuid::new_v4()),
        };
        let message = self.inner.ctx.store.insert_message(request).await?;
        if !self.inner.is_live(epoch) {
            debug!("Dropping {:?} completion after stop", op);
            return Ok(());
        }
        debug!("{:?} confirmed as {} ({:?})", op, message.id, op.policy());
        self.inner.state().merge_message(message);
        Ok(())
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        if !self.inner.ctx.prompt.confirm(CONFIRM_DELETE_MESSAGE).await {
            return Err(EngineError::Cancelled);
        }

        if let Err(e) = self.inner.ctx.store.delete_message(id).await {
            error!("Failed to delete message {}: {}", id, e);
            self.inner.alert(epoch, &format!("{DELETE_FAILED}: {e}"));
            return Err(e.into());
        }
        if self.inner.is_live(epoch) && Operation::DeleteMessage.is_optimistic() {
            self.inner.state().remove_message(id);
        }
        Ok(())
    }

    pub async fn clear_all_messages(&self) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        if !self.inner.ctx.prompt.confirm(CONFIRM_CLEAR).await {
            return Err(EngineError::Cancelled);
        }

        if let Err(e) = self.inner.ctx.store.clear_messages().await {
            error!("Failed to clear conversation: {}", e);
            self.inner.alert(epoch, &format!("{CLEAR_FAILED}: {e}"));
            return Err(e.into());
        }
        if self.inner.is_live(epoch) && Operation::ClearMessages.is_optimistic() {
            self.inner.state().clear_messages();
        }
        info!("Conversation cleared");
        Ok(())
    }

    // -- Notes --

    pub fn open_note_form(&self) {
        self.inner.state().note_form.open = true;
    }

    pub fn close_note_form(&self) {
        self.inner.state().note_form.open = false;
    }

    pub fn edit_note_form(&self, edit: impl FnOnce(&mut NoteDraft)) {
        edit(&mut self.inner.state().note_form.draft);
    }

    /// Create a note from the form's current contents.
    pub async fn submit_note_form(&self) -> Result<(), EngineError> {
        let draft = self.inner.state().note_form.draft.clone();
        self.create_note(&draft).await
    }

    /// Create a note. On success the form is reset and closed; the note
    /// itself shows up with the reload the change feed triggers.
    pub async fn create_note(&self, draft: &NoteDraft) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(EngineError::EmptyTitle);
        }

        let assigned_to = if draft.assigned_to_self {
            self.self_id()
        } else {
            self.inner
                .state()
                .other
                .as_ref()
                .map(|u| u.id)
                .ok_or(EngineError::NoOtherParticipant)?
        };
        let content = draft.content.trim();
        let request = CreateNoteRequest {
            assigned_to,
            title: title.to_string(),
            content: (!content.is_empty()).then(|| content.to_string()),
            priority: draft.priority,
        };

        if let Err(e) = self.inner.ctx.store.insert_note(request).await {
            error!("Failed to create note: {}", e);
            self.inner.alert(epoch, NOTE_SAVE_FAILED);
            return Err(e.into());
        }
        if self.inner.is_live(epoch) {
            self.inner.state().note_form.reset();
        }
        Ok(())
    }

    /// Flip a note's completion flag. Local state follows the reload.
    pub async fn toggle_note_completion(&self, id: Uuid, currently_completed: bool) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        if let Err(e) = self
            .inner
            .ctx
            .store
            .set_note_completed(id, !currently_completed)
            .await
        {
            error!("Failed to update note {}: {}", id, e);
            self.inner.alert(epoch, NOTE_UPDATE_FAILED);
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete a note we created. Local state follows the reload.
    pub async fn delete_note(&self, id: Uuid) -> Result<(), EngineError> {
        let epoch = self.inner.live_epoch()?;
        let self_id = self.self_id();
        let deletable = self
            .inner
            .state()
            .note(id)
            .map(|note| note.can_delete(self_id))
            .ok_or(EngineError::UnknownNote(id))?;
        if !deletable {
            return Err(EngineError::NotCreator(id));
        }

        if let Err(e) = self.inner.ctx.store.delete_note(id).await {
            error!("Failed to delete note {}: {}", id, e);
            self.inner.alert(epoch, NOTE_DELETE_FAILED);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// FILE tags carry the name unescaped, so characters the tag cannot hold
/// are replaced.
fn attachment_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            ':' => '_',
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => ' ',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "file".into()
    } else {
        cleaned
    }
}
