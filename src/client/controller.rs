//! Shared session controller for both chat roles.
//!
//! One controller drives either side of a conversation; the [`Role`]
//! carries the capability differences (claiming and closing are librarian
//! capabilities). The local view is provisional: claims are applied
//! optimistically and reconciled against the authoritative response, and
//! every reconnect refetches full history instead of trusting a resumed
//! stream.

use anyhow::{bail, Result};

use crate::models::{
    chat::Chat,
    enums::{ChatStatus, Role},
    message::Message,
};

use super::{
    api::{ChatApi, ClaimOutcome},
    socket::{ChatSocket, ConnectionStatus, RetryPolicy, SocketEvent},
};

pub struct ChatController {
    role: Role,
    api: ChatApi,
    retry: RetryPolicy,
    /// Own chats (patron) or assigned chats (librarian).
    chats: Vec<Chat>,
    /// Waiting queue; librarian only, provisional until claims reconcile.
    unassigned: Vec<Chat>,
    /// Rendered history of the selected chat.
    messages: Vec<Message>,
    selected: Option<i64>,
    status: ConnectionStatus,
    socket: Option<ChatSocket>,
    /// Set while a reconnect is in flight; the next Connected status
    /// triggers a history refetch.
    rebinding: bool,
}

impl ChatController {
    pub fn new(role: Role, server_url: &str, token: &str) -> Self {
        Self {
            role,
            api: ChatApi::new(server_url, token),
            retry: RetryPolicy::default(),
            chats: Vec::new(),
            unassigned: Vec::new(),
            messages: Vec::new(),
            selected: None,
            status: ConnectionStatus::Disconnected,
            socket: None,
            rebinding: false,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn unassigned(&self) -> &[Chat] {
        &self.unassigned
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn selected(&self) -> Option<i64> {
        self.selected
    }

    pub fn selected_chat(&self) -> Option<&Chat> {
        self.selected
            .and_then(|id| self.chats.iter().find(|c| c.id == id))
    }

    /// Reload the chat list for this role.
    pub async fn refresh_chats(&mut self) -> Result<()> {
        self.chats = match self.role {
            Role::User => self.api.my_chats().await?,
            Role::Librarian => self.api.assigned_chats().await?,
        };
        Ok(())
    }

    /// Reload the waiting queue (librarian capability).
    pub async fn refresh_unassigned(&mut self) -> Result<()> {
        if !self.role.can_claim() {
            bail!("Role '{}' cannot view the waiting queue", self.role);
        }
        self.unassigned = self.api.unassigned_chats().await?;
        Ok(())
    }

    /// Create a new chat and select it.
    pub async fn create_chat(&mut self, title: &str) -> Result<i64> {
        let chat = self.api.create_chat(title).await?;
        let chat_id = chat.id;
        self.chats.insert(0, chat);
        self.select_chat(chat_id).await?;
        Ok(chat_id)
    }

    /// Select a chat: fetch its history, then open a live subscription.
    pub async fn select_chat(&mut self, chat_id: i64) -> Result<()> {
        self.disconnect();
        self.messages = self.api.history(chat_id).await?;
        self.selected = Some(chat_id);
        self.status = ConnectionStatus::Connecting;
        self.socket = Some(ChatSocket::connect(
            self.api.base_url(),
            self.api.token(),
            chat_id,
            self.retry.clone(),
        ));
        Ok(())
    }

    /// Navigate away from the current chat. Cancels the subscription and
    /// any pending reconnect in one call.
    pub fn deselect(&mut self) {
        self.disconnect();
        self.selected = None;
        self.messages.clear();
    }

    fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        self.status = ConnectionStatus::Disconnected;
        self.rebinding = false;
    }

    /// Whether the input should be enabled. False whenever the locally
    /// known status is closed, regardless of what the server would say.
    pub fn can_send(&self) -> bool {
        let chat_open = self
            .selected_chat()
            .map(|c| c.status != ChatStatus::Closed)
            .unwrap_or(false);
        chat_open && self.status == ConnectionStatus::Connected
    }

    /// Send a message into the selected chat.
    pub fn send(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            bail!("Message content must not be empty");
        }
        if !self.can_send() {
            bail!("Chat is closed or not connected");
        }
        let Some(socket) = &self.socket else {
            bail!("No active subscription");
        };
        socket.send(content)
    }

    /// Claim a waiting chat. The chat leaves the local queue immediately;
    /// losing the race keeps it removed and returns `Ok(None)` with no
    /// error surfaced.
    pub async fn claim(&mut self, chat_id: i64) -> Result<Option<Chat>> {
        if !self.role.can_claim() {
            bail!("Role '{}' cannot claim chats", self.role);
        }

        self.unassigned.retain(|c| c.id != chat_id);

        let outcome = self.api.claim(chat_id).await?;
        Ok(self.apply_claim_outcome(outcome))
    }

    fn apply_claim_outcome(&mut self, outcome: ClaimOutcome) -> Option<Chat> {
        match outcome {
            ClaimOutcome::Claimed(chat) => {
                self.chats.insert(0, chat.clone());
                Some(chat)
            }
            ClaimOutcome::AlreadyAssigned => None,
        }
    }

    /// Close the selected chat (librarian capability).
    pub async fn close_chat(&mut self) -> Result<Chat> {
        if !self.role.can_close() {
            bail!("Role '{}' cannot close chats", self.role);
        }
        let Some(chat_id) = self.selected else {
            bail!("No chat selected");
        };

        let closed = self.api.close(chat_id).await?;
        self.mark_chat_closed(chat_id);
        Ok(closed)
    }

    /// Wait for the next socket event and fold it into local state.
    pub async fn next_event(&mut self) -> Option<SocketEvent> {
        let event = self.socket.as_mut()?.recv().await?;
        self.apply_event(&event).await;
        Some(event)
    }

    async fn apply_event(&mut self, event: &SocketEvent) {
        match event {
            SocketEvent::Status(status) => {
                if matches!(status, ConnectionStatus::Reconnecting { .. }) {
                    self.rebinding = true;
                }
                self.status = *status;

                // A reconnect is a fresh subscription; anything delivered
                // while we were away exists only in the store.
                if *status == ConnectionStatus::Connected && self.rebinding {
                    self.rebinding = false;
                    if let Some(chat_id) = self.selected {
                        match self.api.history(chat_id).await {
                            Ok(history) => self.messages = history,
                            Err(e) => tracing::warn!("History refetch failed: {}", e),
                        }
                    }
                }
            }
            SocketEvent::Message(message) => self.integrate_message(message.clone()),
            SocketEvent::Rejected { error, .. } => {
                if error == "chat_closed" {
                    if let Some(chat_id) = self.selected {
                        self.mark_chat_closed(chat_id);
                    }
                }
            }
        }
    }

    fn integrate_message(&mut self, message: Message) {
        if self.selected != Some(message.chat_id) {
            return;
        }
        // Dedupe against history refetches racing the live stream.
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        self.messages.push(message);
    }

    fn mark_chat_closed(&mut self, chat_id: i64) {
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.status = ChatStatus::Closed;
        }
        // A closed chat never receives another message; drop the
        // subscription so the retry loop stops with it.
        if self.selected == Some(chat_id) {
            if let Some(socket) = self.socket.take() {
                socket.close();
            }
            self.status = ConnectionStatus::Disconnected;
            self.rebinding = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn controller(role: Role) -> ChatController {
        ChatController::new(role, "http://localhost:8080", "test-token")
    }

    fn chat(id: i64, status: ChatStatus) -> Chat {
        Chat {
            id,
            title: format!("Chat {}", id),
            patron_id: 10,
            user_name: "Anna".to_string(),
            librarian_id: (status != ChatStatus::Waiting).then_some(20),
            status,
            created_at: Utc::now(),
        }
    }

    fn message(chat_id: i64, id: i64, content: &str) -> Message {
        Message {
            id,
            chat_id,
            sender_id: 10,
            sender_name: "Anna".to_string(),
            sender_role: Role::User,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cannot_send_without_a_selection() {
        let ctrl = controller(Role::User);
        assert!(!ctrl.can_send());
        assert!(ctrl.send("hello").is_err());
    }

    #[tokio::test]
    async fn closed_chat_disables_sending_even_while_connected() {
        let mut ctrl = controller(Role::User);
        ctrl.chats.push(chat(1, ChatStatus::Closed));
        ctrl.selected = Some(1);
        ctrl.status = ConnectionStatus::Connected;

        assert!(!ctrl.can_send());
        assert!(ctrl.send("still there?").is_err());
    }

    #[tokio::test]
    async fn active_connected_chat_is_sendable() {
        let mut ctrl = controller(Role::User);
        ctrl.chats.push(chat(1, ChatStatus::Active));
        ctrl.selected = Some(1);
        ctrl.status = ConnectionStatus::Connected;

        assert!(ctrl.can_send());
        // No live socket in the test; eligibility is what matters here.
        assert!(ctrl.send("hello").is_err());
    }

    #[tokio::test]
    async fn chat_closed_rejection_disables_the_input() {
        let mut ctrl = controller(Role::User);
        ctrl.chats.push(chat(1, ChatStatus::Active));
        ctrl.selected = Some(1);
        ctrl.status = ConnectionStatus::Connected;
        assert!(ctrl.can_send());

        ctrl.apply_event(&SocketEvent::Rejected {
            error: "chat_closed".to_string(),
            message: "Chat is closed".to_string(),
        })
        .await;

        assert!(!ctrl.can_send());
        assert_eq!(ctrl.selected_chat().unwrap().status, ChatStatus::Closed);
    }

    #[tokio::test]
    async fn lost_claim_race_is_reconciled_silently() {
        let mut ctrl = controller(Role::Librarian);
        ctrl.unassigned.push(chat(1, ChatStatus::Waiting));

        // The optimistic removal happens in claim(); losing the race keeps
        // the chat out of both local views.
        ctrl.unassigned.retain(|c| c.id != 1);
        let result = ctrl.apply_claim_outcome(ClaimOutcome::AlreadyAssigned);

        assert!(result.is_none());
        assert!(ctrl.unassigned.is_empty());
        assert!(ctrl.chats.is_empty());
    }

    #[tokio::test]
    async fn won_claim_joins_the_assigned_list() {
        let mut ctrl = controller(Role::Librarian);
        let claimed = chat(1, ChatStatus::Active);
        let result = ctrl.apply_claim_outcome(ClaimOutcome::Claimed(claimed));

        assert!(result.is_some());
        assert_eq!(ctrl.chats.len(), 1);
        assert_eq!(ctrl.chats[0].status, ChatStatus::Active);
    }

    #[tokio::test]
    async fn patrons_cannot_claim_or_close() {
        let mut ctrl = controller(Role::User);
        assert!(ctrl.claim(1).await.is_err());
        assert!(ctrl.close_chat().await.is_err());
        assert!(ctrl.refresh_unassigned().await.is_err());
    }

    #[tokio::test]
    async fn incoming_messages_are_deduplicated_by_id() {
        let mut ctrl = controller(Role::User);
        ctrl.selected = Some(1);
        ctrl.messages.push(message(1, 1, "hello"));

        ctrl.integrate_message(message(1, 1, "hello"));
        ctrl.integrate_message(message(1, 2, "world"));

        assert_eq!(ctrl.messages.len(), 2);
        assert_eq!(ctrl.messages[1].id, 2);
    }

    #[tokio::test]
    async fn frames_for_other_chats_are_ignored() {
        let mut ctrl = controller(Role::User);
        ctrl.selected = Some(1);

        ctrl.integrate_message(message(2, 1, "wrong chat"));

        assert!(ctrl.messages.is_empty());
    }

    #[tokio::test]
    async fn deselect_clears_the_session() {
        let mut ctrl = controller(Role::User);
        ctrl.chats.push(chat(1, ChatStatus::Active));
        ctrl.selected = Some(1);
        ctrl.messages.push(message(1, 1, "hello"));
        ctrl.status = ConnectionStatus::Connected;

        ctrl.deselect();

        assert!(ctrl.selected.is_none());
        assert!(ctrl.messages.is_empty());
        assert_eq!(ctrl.status(), ConnectionStatus::Disconnected);
    }
}
