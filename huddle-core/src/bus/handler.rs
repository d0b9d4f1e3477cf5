use super::error::HandlerError;
use super::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;

/// Something that can process messages delivered to a named agent
#[async_trait]
pub trait AgentHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into an [`AgentHandler`]
pub struct FnHandler<F, Fut> {
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

/// Wrap `func` so it can be registered on the bus
///
/// ```rust,ignore
/// bus.register("echo", handler_fn(|message| async move {
///     Ok(message.payload)
/// }))?;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler {
        func,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> AgentHandler for FnHandler<F, Fut>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        (self.func)(message).await
    }
}
