use crate::broker::{ChannelDeclarations, ChannelMessageAcknowledgment, PublisherChannel};
use crate::message::Message;
use crate::pipeline::acknowledge::AcknowledgeHandler;
use crate::pipeline::dead_letter::DeadLetterHandler;
use crate::pipeline::error::PipelineError;
use crate::pipeline::handler::Handler;
use crate::pipeline::interceptor::{AfterInterceptors, BeforeInterceptors};
use crate::pipeline::reply_to::ReplyToHandler;
use crate::pipeline::retry::RetryHandler;
use crate::registry::Registry;
use std::sync::Arc;

/// Assembles and runs the composed pipeline for one inbound channel.
///
/// Construction order (outer to inner):
/// `beforeInterceptors* → retry → deadLetter → acknowledge → replyTo? → router`,
/// with `afterInterceptors*` wrapping the whole retry-onward chain from the
/// outside, but still inside the before-interceptors.
pub struct Gateway {
    chain: Arc<dyn Handler>,
}

impl Gateway {
    /// Builds a gateway for one channel's declarations.
    ///
    /// `interceptors` resolves interceptor names declared by the adapter
    /// into handler implementations (looked up from the action-handler
    /// registry built during [`Start`](crate::bootstrap::Middleware::start)).
    pub fn build(
        declarations: &ChannelDeclarations,
        channels: Arc<Registry<Arc<dyn PublisherChannel>>>,
        acknowledger: Option<Arc<dyn ChannelMessageAcknowledgment>>,
        interceptors: &Registry<Arc<dyn Handler>>,
    ) -> Result<Self, crate::registry::NotFoundError> {
        let router = crate::router::Router::new(channels.clone());
        let innermost: Arc<dyn Handler> = Arc::new(RouterHandler(router));

        let mut chain = innermost;

        if declarations.send_reply_using_reply_to {
            chain = Arc::new(ReplyToHandler::new(chain, channels.clone()));
        }

        chain = Arc::new(AcknowledgeHandler::new(chain, acknowledger));

        if let Some(dead_letter_name) = &declarations.dead_letter_channel_name {
            let dead_letter_channel = channels.get(dead_letter_name)?;
            chain = Arc::new(DeadLetterHandler::new(chain, dead_letter_channel));
        }

        chain = Arc::new(RetryHandler::new(chain, declarations.retry_delays_ms.clone()));

        let after = resolve(interceptors, &declarations.after_interceptors)?;
        if !after.is_empty() {
            chain = Arc::new(AfterInterceptors::new(after, chain));
        }

        let before = resolve(interceptors, &declarations.before_interceptors)?;
        if !before.is_empty() {
            chain = Arc::new(BeforeInterceptors::new(before, chain));
        }

        Ok(Self { chain })
    }

    /// Runs the composed chain for `message`.
    pub async fn execute(&self, message: Message) -> Result<Message, PipelineError> {
        self.chain.handle(message).await
    }
}

fn resolve(
    interceptors: &Registry<Arc<dyn Handler>>,
    names: &[String],
) -> Result<Vec<Arc<dyn Handler>>, crate::registry::NotFoundError> {
    names.iter().map(|name| interceptors.get(name)).collect()
}

struct RouterHandler(crate::router::Router);

#[async_trait::async_trait]
impl Handler for RouterHandler {
    async fn handle(&self, message: Message) -> Result<Message, PipelineError> {
        self.0
            .route(message)
            .await
            .map_err(|error| PipelineError::from_source(error.to_string(), error))
    }
}
