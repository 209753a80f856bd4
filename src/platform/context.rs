use crate::{
    common::{
        errors::PlatformResult,
        types::{ChannelId, MessageId},
    },
    platform::Platform,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionResponse {
    /// Acknowledge now, answer later.
    Defer,
    Message(String),
    /// Replace the original response.
    Edit(String),
}

/// Where a command came from and how to answer it.
///
/// Slash interactions and prefixed text messages answer through different
/// primitives; callers use `reply`, `edit` and `deferred_ack` without caring which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    Interaction {
        id: u64,
        token: String,
        channel_id: ChannelId,
        acknowledged: bool,
    },
    Message {
        channel_id: ChannelId,
        message_id: MessageId,
        /// Our own reply, once sent.
        reply_id: Option<MessageId>,
    },
}

impl RequestContext {
    pub fn interaction(id: u64, token: impl Into<String>, channel_id: ChannelId) -> Self {
        Self::Interaction {
            id,
            token: token.into(),
            channel_id,
            acknowledged: false,
        }
    }

    pub fn message(channel_id: ChannelId, message_id: MessageId) -> Self {
        Self::Message {
            channel_id,
            message_id,
            reply_id: None,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::Interaction { channel_id, .. } | Self::Message { channel_id, .. } => *channel_id,
        }
    }

    /// Acknowledges an interaction; text messages get nothing.
    pub async fn deferred_ack(&mut self, platform: &dyn Platform) -> PlatformResult<()> {
        match self {
            Self::Interaction {
                id,
                token,
                acknowledged,
                ..
            } => {
                if !*acknowledged {
                    platform
                        .respond_interaction(*id, token, InteractionResponse::Defer)
                        .await?;
                    *acknowledged = true;
                }
                Ok(())
            }
            Self::Message { .. } => Ok(()),
        }
    }

    pub async fn reply(&mut self, platform: &dyn Platform, content: &str) -> PlatformResult<()> {
        match self {
            Self::Interaction {
                id,
                token,
                acknowledged,
                ..
            } => {
                let response = if *acknowledged {
                    InteractionResponse::Edit(content.to_string())
                } else {
                    InteractionResponse::Message(content.to_string())
                };
                platform.respond_interaction(*id, token, response).await?;
                *acknowledged = true;
                Ok(())
            }
            Self::Message {
                channel_id,
                message_id,
                reply_id,
            } => {
                let sent = platform
                    .send_message(*channel_id, content, Some(*message_id))
                    .await?;
                *reply_id = Some(sent);
                Ok(())
            }
        }
    }

    /// Rewrites the previous answer, or sends one if there is none yet.
    pub async fn edit(&mut self, platform: &dyn Platform, content: &str) -> PlatformResult<()> {
        match self {
            Self::Interaction { acknowledged: false, .. } => self.reply(platform, content).await,
            Self::Interaction { id, token, .. } => {
                platform
                    .respond_interaction(*id, token, InteractionResponse::Edit(content.to_string()))
                    .await
            }
            Self::Message {
                channel_id,
                reply_id: Some(reply_id),
                ..
            } => platform.edit_message(*channel_id, *reply_id, content).await,
            Self::Message { reply_id: None, .. } => self.reply(platform, content).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::{GuildId, UserId},
        platform::mock::{MockPlatform, Sent},
    };

    #[tokio::test]
    async fn deferred_interaction_is_answered_by_edit() {
        let platform = MockPlatform::new(UserId(1), GuildId(1));
        let mut ctx = RequestContext::interaction(5, "tok", ChannelId(2));

        ctx.deferred_ack(&platform).await.unwrap();
        ctx.deferred_ack(&platform).await.unwrap();
        ctx.reply(&platform, "done").await.unwrap();

        assert_eq!(
            platform.interactions(),
            vec![
                (5, InteractionResponse::Defer),
                (5, InteractionResponse::Edit("done".into()))
            ]
        );
    }

    #[tokio::test]
    async fn text_command_replies_then_edits_its_reply() {
        let platform = MockPlatform::new(UserId(1), GuildId(1));
        let mut ctx = RequestContext::message(ChannelId(2), MessageId(40));

        ctx.deferred_ack(&platform).await.unwrap();
        ctx.edit(&platform, "first").await.unwrap();
        ctx.edit(&platform, "second").await.unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to, Some(MessageId(40)));
        let RequestContext::Message { reply_id, .. } = &ctx else {
            panic!("context kind changed");
        };
        assert_eq!(
            platform.edits(),
            vec![(ChannelId(2), reply_id.unwrap(), "second".to_string())]
        );
        assert!(matches!(sent[0], Sent { ref content, .. } if content == "first"));
    }
}
