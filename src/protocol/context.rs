//! Request/response carrier handed to middlewares and handlers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::core::message::{Entry, MessageId};
use crate::error::{constants, ProtocolError, Result};
use crate::transport::session::Session;

/// One request/response interaction bound to a target session.
///
/// Setting a response never sends it. Sending consumes the context, so one instance
/// posts at most once; fan-out goes through [`Context::copy`] or
/// [`Session::allocate_context`].
#[derive(Clone)]
pub struct Context {
    request: Option<Entry>,
    response: Option<Entry>,
    session: Arc<Session>,
    values: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("session_id", &self.session.id())
            .finish()
    }
}

impl Context {
    pub(crate) fn new(request: Entry, session: Arc<Session>) -> Self {
        Self {
            request: Some(request),
            response: None,
            session,
            values: HashMap::new(),
        }
    }

    pub(crate) fn allocate(session: Arc<Session>) -> Self {
        Self {
            request: None,
            response: None,
            session,
            values: HashMap::new(),
        }
    }

    /// The request that produced this context; `None` for allocated contexts
    pub fn request(&self) -> Option<&Entry> {
        self.request.as_ref()
    }

    pub fn response(&self) -> Option<&Entry> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, entry: Entry) -> &mut Self {
        self.response = Some(entry);
        self
    }

    /// Builder form of [`Context::set_response`]
    pub fn with_response(mut self, entry: Entry) -> Self {
        self.response = Some(entry);
        self
    }

    /// Encode `data` with the session's codec and set it as the response payload.
    ///
    /// Without a codec, fails with [`ProtocolError::SerializeError`]; use
    /// [`Context::set_response`] for raw bytes.
    pub fn set_response_message<T: Serialize + ?Sized>(
        &mut self,
        id: MessageId,
        data: &T,
    ) -> Result<&mut Self> {
        let codec = self
            .session
            .codec()
            .ok_or_else(|| ProtocolError::SerializeError("No codec configured".to_string()))?;
        let payload = codec.encode(data)?;
        self.response = Some(Entry::new(id, payload));
        Ok(self)
    }

    /// Decode the request payload with the session's codec.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T> {
        let request = self.request.as_ref().ok_or_else(|| {
            ProtocolError::DeserializeError(constants::ERR_NO_REQUEST.to_string())
        })?;
        let codec = self
            .session
            .codec()
            .ok_or_else(|| ProtocolError::DeserializeError("No codec configured".to_string()))?;
        codec.decode(&request.data)
    }

    /// The session this context currently targets
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Retarget this context
    pub fn set_session(&mut self, session: Arc<Session>) -> &mut Self {
        self.session = session;
        self
    }

    /// Store a value for later middlewares or the handler
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// An independent copy: same request, response, target and stored values
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Post the response to the target session's queue.
    ///
    /// A context without a response posts nothing and returns `Ok(())`.
    pub async fn send(self) -> Result<()> {
        let Some(response) = self.response else {
            trace!(session_id = self.session.id(), "No response to send");
            return Ok(());
        };
        self.session.send(response).await
    }

    /// Retarget to `session`, then [`Context::send`]
    pub async fn send_to(mut self, session: Arc<Session>) -> Result<()> {
        self.session = session;
        self.send().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::core::packet::DefaultPacker;
    use crate::core::serialization::SerializationFormat;
    use serde::Deserialize;

    fn session(codec: Option<SerializationFormat>) -> Arc<Session> {
        Session::new(Arc::new(DefaultPacker::new()), codec, 4, None)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn bind_and_set_response_message_use_session_codec() {
        let sess = session(Some(SerializationFormat::Json));
        let mut ctx = Context::new(Entry::new(1, &br#"{"seq":5}"#[..]), sess);

        let ping: Ping = ctx.bind().unwrap();
        assert_eq!(ping, Ping { seq: 5 });

        ctx.set_response_message(2, &Ping { seq: 6 }).unwrap();
        let resp = ctx.response().unwrap();
        assert_eq!(resp.id, 2);
        assert_eq!(&resp.data[..], br#"{"seq":6}"#);
    }

    #[test]
    fn bind_without_codec_fails() {
        let ctx = Context::new(Entry::new(1, &b"{}"[..]), session(None));
        assert!(ctx.bind::<Ping>().is_err());
    }

    #[test]
    fn copy_is_independent() {
        let mut ctx = Context::new(Entry::new(1, &b"a"[..]), session(None));
        ctx.set("user", String::from("alice"));
        let mut copied = ctx.copy();
        copied.set_response(Entry::new(9, &b"only-copy"[..]));

        assert!(ctx.response().is_none());
        assert_eq!(copied.get::<String>("user").unwrap(), "alice");
        assert_eq!(copied.request(), ctx.request());
    }

    #[tokio::test]
    async fn send_to_posts_on_target_only() {
        let origin = session(None);
        let target = session(None);
        let ctx = Context::new(Entry::new(1, &b"req"[..]), Arc::clone(&origin))
            .with_response(Entry::new(2, &b"resp"[..]));

        ctx.send_to(Arc::clone(&target)).await.unwrap();

        let mut target_rx = target.take_response_queue_for_test();
        assert_eq!(target_rx.try_recv().unwrap().id, 2);
        let mut origin_rx = origin.take_response_queue_for_test();
        assert!(origin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_closed_session_fails() {
        let target = session(None);
        target.close();
        let result = target
            .allocate_context()
            .with_response(Entry::new(3, &b"late"[..]))
            .send()
            .await;
        assert!(matches!(result, Err(ProtocolError::SessionClosed)));
    }
}
