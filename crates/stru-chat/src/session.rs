//! Chat session: sends user turns and folds the streamed answer into the conversation

use futures::StreamExt;
use std::sync::Arc;
use stru_api::{
    Button, ChatMessage, Completion, CompletionRequest, SessionContext, StreamEvent, apply_event,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    conversation::Conversation,
    error::{Error, Result},
    events::ChatEvent,
    handle::ChatHandle,
    transport::Transport,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One user's conversation with the completion service
pub struct ChatSession {
    context: SessionContext,
    conversation: Conversation,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<ChatEvent>,
    handle: ChatHandle,
}

impl ChatSession {
    /// Create a new session
    pub fn new(context: SessionContext, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            context,
            conversation: Conversation::new(),
            transport,
            event_tx,
            handle: ChatHandle::new(),
        }
    }

    /// Subscribe to chat events
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Replace the session token (after login/logout)
    pub fn set_token(&mut self, token: Option<String>) {
        self.context.token = token;
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    /// Get a cloneable handle for aborting from another task
    pub fn handle(&self) -> ChatHandle {
        self.handle.clone()
    }

    /// Abort the in-flight turn
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_streaming(&self) -> bool {
        self.handle.is_streaming()
    }

    /// Start over: drop the transcript and begin a new server-side session id
    pub fn clear(&mut self) -> Result<()> {
        if self.handle.is_streaming() {
            return Err(Error::Busy);
        }
        self.close_abandoned_turn();
        self.conversation.clear()?;
        self.context.renew();
        Ok(())
    }

    /// Send a user message and stream the answer into the conversation.
    ///
    /// Returns how the stream ended. A transport failure is fatal for the turn:
    /// if it happens before the stream opens, no assistant message is created.
    /// Aborting before the stream opens ends the turn as
    /// [`Completion::Cancelled`], also without an assistant message.
    pub async fn send(&mut self, text: &str) -> Result<Completion> {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if self.handle.is_streaming() {
            return Err(Error::Busy);
        }
        self.close_abandoned_turn();

        let user = self.conversation.push_user(text)?.clone();
        self.emit(ChatEvent::UserMessage { message: user });

        let turn = self.handle.begin_turn();
        let result = self.run_turn(text, turn.token()).await;
        drop(turn);

        let completion = match &result {
            Ok(completion) => {
                self.conversation.error = None;
                tracing::debug!(?completion, "turn finished");
                Some(*completion)
            }
            Err(e) => {
                tracing::warn!("turn failed: {}", e);
                self.conversation.error = Some(e.to_string());
                self.emit(ChatEvent::Error {
                    message: e.to_string(),
                });
                None
            }
        };
        self.emit(ChatEvent::TurnEnd { completion });
        result
    }

    /// Close a message left open by a `send` future that was dropped mid-turn
    fn close_abandoned_turn(&mut self) {
        if let Some(message) = self.conversation.close_open() {
            tracing::warn!("closing assistant message of an abandoned turn");
            self.emit(ChatEvent::MessageEnd {
                message,
                completion: Completion::Cancelled,
            });
        }
    }

    async fn run_turn(&mut self, text: &str, cancel: CancellationToken) -> Result<Completion> {
        let request = CompletionRequest::new(&self.context, text);
        let opened = self
            .transport
            .run(request, &self.context, cancel.clone())
            .await;
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(stru_api::Error::Cancelled) => {
                tracing::debug!("turn aborted before the stream opened");
                return Ok(Completion::Cancelled);
            }
            Err(e) => return Err(e.into()),
        };

        let opened = self.conversation.open_assistant()?.clone();
        self.emit(ChatEvent::MessageStart { message: opened });

        let mut saw_done = false;
        let mut failure = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::Done) => {
                    saw_done = true;
                    break;
                }
                Ok(event) => self.apply_event(&event),
                Err(e) if !e.is_fatal() => {
                    self.emit(ChatEvent::DecodeWarning {
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        let completion = if saw_done {
            Completion::Done
        } else if cancel.is_cancelled() {
            Completion::Cancelled
        } else {
            if failure.is_none() {
                tracing::warn!("completion stream closed without [DONE]");
            }
            Completion::Truncated
        };

        if let Some(message) = self.conversation.close_open() {
            self.emit(ChatEvent::MessageEnd {
                message,
                completion,
            });
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(completion),
        }
    }

    /// Apply one event to the open message and publish what changed
    fn apply_event(&mut self, event: &StreamEvent) {
        let Some(message) = self.conversation.open_message_mut() else {
            return;
        };
        if !apply_event(message, event) {
            return;
        }

        let update = match event {
            StreamEvent::Text { value } => ChatEvent::MessageUpdate {
                delta: value.clone(),
            },
            StreamEvent::Model { value } => ChatEvent::ModelSet {
                model: value.clone(),
            },
            StreamEvent::Button { file_id, value } => ChatEvent::ButtonAdded {
                button: Button::new(file_id.clone(), value.clone()),
            },
            StreamEvent::Done => return,
        };
        self.emit(update);
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpTransport;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::time::Duration;
    use stru_api::{CompletionClient, Sender, StreamEventStream, decode_byte_stream};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// What the mock answers with for one turn
    enum Reply {
        Body(Vec<&'static str>),
        /// Chunks, then the connection hangs until cancelled
        Hang(Vec<&'static str>),
        /// Chunks, then a transport failure
        FailAfter(Vec<&'static str>),
        Refuse(u16),
    }

    struct MockTransport {
        replies: Mutex<Vec<Reply>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockTransport {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(vec![]),
            }
        }
    }

    fn to_bytes(chunks: Vec<&'static str>) -> Vec<stru_api::Result<Bytes>> {
        chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect()
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn run(
            &self,
            request: CompletionRequest,
            _session: &SessionContext,
            cancel: CancellationToken,
        ) -> stru_api::Result<StreamEventStream> {
            self.requests.lock().push(request);
            let reply = {
                let mut replies = self.replies.lock();
                if replies.is_empty() {
                    Reply::Body(vec!["data: [DONE]\n"])
                } else {
                    replies.remove(0)
                }
            };

            Ok(match reply {
                Reply::Body(chunks) => {
                    decode_byte_stream(futures::stream::iter(to_bytes(chunks)), cancel)
                }
                Reply::Hang(chunks) => decode_byte_stream(
                    futures::stream::iter(to_bytes(chunks))
                        .chain(futures::stream::pending::<stru_api::Result<Bytes>>()),
                    cancel,
                ),
                Reply::FailAfter(chunks) => {
                    let mut items = to_bytes(chunks);
                    items.push(Err(stru_api::Error::Transport("connection reset".into())));
                    decode_byte_stream(futures::stream::iter(items), cancel)
                }
                Reply::Refuse(status) => {
                    return Err(stru_api::Error::status(status, "refused"));
                }
            })
        }
    }

    fn make_session(replies: Vec<Reply>) -> (ChatSession, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(replies));
        let session = ChatSession::new(SessionContext::new("user-1"), transport.clone());
        (session, transport)
    }

    fn drain(rx: &mut broadcast::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = vec![];
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streamed_answer_is_folded_into_open_message() {
        let (mut session, transport) = make_session(vec![Reply::Body(vec![
            "data: {\"type\":\"text\",\"valu",
            "e\":\"Hel",
            "lo\"}\n",
            "data: [DONE]\n",
        ])]);
        let mut rx = session.subscribe();

        let completion = session.send("hi").await.unwrap();
        assert_eq!(completion, Completion::Done);

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].text, "Hello");
        assert!(!session.conversation().is_streaming());

        let events = drain(&mut rx);
        let updates: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::MessageUpdate { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec!["Hello"]);
        assert!(matches!(events.first(), Some(ChatEvent::UserMessage { .. })));
        assert!(matches!(
            &events[events.len() - 2],
            ChatEvent::MessageEnd {
                completion: Completion::Done,
                ..
            }
        ));
        assert!(matches!(
            events.last(),
            Some(ChatEvent::TurnEnd {
                completion: Some(Completion::Done)
            })
        ));

        let requests = transport.requests.lock();
        assert_eq!(requests[0].message, "hi");
        assert_eq!(requests[0].user_id, "user-1");
        assert_eq!(requests[0].session_id, session.context().session_id);
    }

    #[tokio::test]
    async fn test_model_and_buttons() {
        let (mut session, _) = make_session(vec![Reply::Body(vec![
            "data: {\"type\":\"model\",\"value\":\"stru-large\"}\n",
            "data: {\"type\":\"button\",\"file_id\":\"f1\",\"value\":\"a.pdf\"}\n\
             data: {\"type\":\"button\",\"file_id\":\"f2\",\"value\":\"b.pdf\"}\n",
            "data: [DONE]\n",
        ])]);
        let mut rx = session.subscribe();

        session.send("files?").await.unwrap();

        let answer = session.messages().last().unwrap();
        assert_eq!(answer.model.as_deref(), Some("stru-large"));
        assert_eq!(
            answer.buttons,
            vec![Button::new("f1", "a.pdf"), Button::new("f2", "b.pdf")]
        );

        let added = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ChatEvent::ButtonAdded { .. }))
            .count();
        assert_eq!(added, 2);
    }

    #[tokio::test]
    async fn test_malformed_line_only_drops_that_line() {
        let (mut session, _) = make_session(vec![Reply::Body(vec![
            "data: {\"type\":\"text\",\"value\":\"one \"}\n",
            "data: {broken\n",
            "data: {\"type\":\"text\",\"value\":\"two\"}\ndata: [DONE]\n",
        ])]);
        let mut rx = session.subscribe();

        assert_eq!(session.send("x").await.unwrap(), Completion::Done);
        assert_eq!(session.messages().last().unwrap().text, "one two");

        let warnings = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ChatEvent::DecodeWarning { .. }))
            .count();
        assert_eq!(warnings, 1);
    }

    #[tokio::test]
    async fn test_stream_without_done_is_truncated() {
        let (mut session, _) = make_session(vec![Reply::Body(vec![
            "data: {\"type\":\"text\",\"value\":\"partial\"}\n",
        ])]);

        assert_eq!(session.send("x").await.unwrap(), Completion::Truncated);
        assert_eq!(session.messages().last().unwrap().text, "partial");
    }

    #[tokio::test]
    async fn test_refused_request_opens_no_message() {
        let (mut session, _) = make_session(vec![Reply::Refuse(500)]);
        let mut rx = session.subscribe();

        let err = session.send("x").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Api(stru_api::Error::Status { status: 500, .. })
        ));
        assert_eq!(session.messages().len(), 1);
        assert!(session.conversation().error.is_some());
        assert!(!session.is_streaming());

        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ChatEvent::MessageStart { .. })));
        assert!(matches!(&events[events.len() - 2], ChatEvent::Error { .. }));
        assert!(matches!(
            events.last(),
            Some(ChatEvent::TurnEnd { completion: None })
        ));
    }

    #[tokio::test]
    async fn test_failure_mid_stream_keeps_partial_message() {
        let (mut session, _) = make_session(vec![Reply::FailAfter(vec![
            "data: {\"type\":\"text\",\"value\":\"so far\"}\n",
        ])]);

        let err = session.send("x").await.unwrap_err();
        assert!(matches!(err, Error::Api(stru_api::Error::Transport(_))));

        let answer = session.messages().last().unwrap();
        assert_eq!(answer.text, "so far");
        assert!(!session.conversation().is_streaming());
    }

    #[tokio::test]
    async fn test_abort_after_first_event() {
        let (mut session, _) = make_session(vec![Reply::Hang(vec![
            "data: {\"type\":\"text\",\"value\":\"first\"}\n",
        ])]);
        let mut rx = session.subscribe();
        let handle = session.handle();

        let aborter = tokio::spawn(async move {
            let mut seen = vec![];
            while let Ok(event) = rx.recv().await {
                if matches!(event, ChatEvent::MessageUpdate { .. }) {
                    handle.abort();
                }
                let done = event.is_terminal();
                seen.push(event);
                if done {
                    return seen;
                }
            }
            panic!("channel closed before the turn ended");
        });

        let completion = session.send("x").await.unwrap();
        assert_eq!(completion, Completion::Cancelled);
        assert_eq!(session.messages().last().unwrap().text, "first");

        let seen = aborter.await.unwrap();
        assert!(seen.iter().any(|e| matches!(
            e,
            ChatEvent::MessageEnd {
                completion: Completion::Cancelled,
                ..
            }
        )));
        assert!(matches!(
            seen.last(),
            Some(ChatEvent::TurnEnd {
                completion: Some(Completion::Cancelled)
            })
        ));
    }

    #[tokio::test]
    async fn test_abort_while_connecting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completion"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("data: {\"type\":\"text\",\"value\":\"late\"}\n")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let transport = HttpTransport::new(CompletionClient::new(server.uri()));
        let mut session = ChatSession::new(SessionContext::new("user-1"), Arc::new(transport));
        let mut rx = session.subscribe();
        let handle = session.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.abort();
        });

        let completion = tokio::time::timeout(Duration::from_secs(5), session.send("x"))
            .await
            .expect("abort did not end the turn")
            .unwrap();

        assert_eq!(completion, Completion::Cancelled);
        assert_eq!(session.messages().len(), 1);
        assert!(!session.is_streaming());

        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ChatEvent::MessageStart { .. })));
        assert!(matches!(
            events.last(),
            Some(ChatEvent::TurnEnd {
                completion: Some(Completion::Cancelled)
            })
        ));
    }

    #[tokio::test]
    async fn test_dropped_send_does_not_leave_session_busy() {
        let (mut session, _) = make_session(vec![Reply::Hang(vec![
            "data: {\"type\":\"text\",\"value\":\"half\"}\n",
        ])]);

        let dropped = tokio::time::timeout(Duration::from_millis(100), session.send("x")).await;
        assert!(dropped.is_err());
        assert!(!session.is_streaming());

        // The next turn closes the stale message and runs normally
        assert_eq!(session.send("y").await.unwrap(), Completion::Done);
        assert!(!session.conversation().is_streaming());

        let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["x", "half", "y", ""]);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (mut session, transport) = make_session(vec![]);
        assert!(matches!(session.send("   ").await, Err(Error::EmptyMessage)));
        assert!(session.messages().is_empty());
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_turns_and_clear() {
        let (mut session, transport) = make_session(vec![
            Reply::Body(vec!["data: {\"type\":\"text\",\"value\":\"a\"}\ndata: [DONE]\n"]),
            Reply::Body(vec!["data: {\"type\":\"text\",\"value\":\"b\"}\ndata: [DONE]\n"]),
        ]);

        session.send("1").await.unwrap();
        session.send("2").await.unwrap();

        let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "a", "2", "b"]);

        let first_id = session.context().session_id;
        session.clear().unwrap();
        assert!(session.messages().is_empty());
        assert_ne!(session.context().session_id, first_id);
        assert_eq!(transport.requests.lock().len(), 2);
    }
}
