//! Converts a post-pipeline [`MessageContext`] into an ack, nack, or reply.

use coworkers_core::CoworkersResult;
use coworkers_middleware::{AckDecision, MessageContext};
use coworkers_transport::{ChannelHandle, PublishOptions, Transport};

/// Reads the pending ack/nack/reply decision off `ctx` and issues exactly
/// one broker action.
///
/// If a reply was set, it is published on `publisher_channel` first (with
/// routing metadata derived from the inbound message's `reply_to`/
/// `correlation_id`), then the message is acked. If no decision was made by
/// any middleware, the default is `ack` -- matching the pipeline's
/// "well-behaved handler" assumption, not an error condition.
///
/// # Errors
///
/// Returns whatever the transport call itself fails with. The caller (the
/// message handler factory) is responsible for routing that failure to the
/// error sink rather than letting it fail the handler's own completion.
pub(crate) async fn respond(
    transport: &dyn Transport,
    consumer_channel: &ChannelHandle,
    publisher_channel: &ChannelHandle,
    ctx: &mut MessageContext,
) -> CoworkersResult<()> {
    if let Some(reply) = ctx.reply() {
        let options = PublishOptions {
            exchange: String::new(),
            routing_key: ctx.message().reply_to.clone().unwrap_or_default(),
            correlation_id: ctx.message().correlation_id.clone(),
        };
        transport
            .publish(publisher_channel, reply.content.clone(), &options)
            .await?;
    }

    match ctx.ack_decision().clone() {
        AckDecision::Unset | AckDecision::Ack => {
            transport.ack(consumer_channel, ctx.message().delivery_tag).await
        }
        AckDecision::Nack { requeue } => {
            transport
                .nack(consumer_channel, ctx.message().delivery_tag, requeue)
                .await
        }
    }
}
