/// State the relay keeps for one chat session.
///
/// Passed explicitly into every handler invocation; the only durable field is
/// the remote thread the session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    key: String,
    thread_id: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            thread_id: None,
        }
    }

    /// The UI session key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The bound remote thread, if one was created.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Bind the session to `thread_id` unless it is already bound.
    ///
    /// Returns the id the session ends up bound to.
    pub fn bind_thread(&mut self, thread_id: impl Into<String>) -> &str {
        self.thread_id.get_or_insert_with(|| thread_id.into())
    }
}
