use uuid::Uuid;

use crate::{messages::MessageLedger, telegram::Message};

/// A reply found on an inbound message, classified by who wrote the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRef {
    /// The sender replied to their own earlier message.
    Own(i64),
    /// The sender replied to something the other side sent.
    Counterpart(i64),
}

impl ReplyRef {
    pub fn message_id(self) -> i64 {
        match self {
            ReplyRef::Own(id) | ReplyRef::Counterpart(id) => id,
        }
    }
}

/// Extracts the reply an inbound message makes, if any. Forwards never carry
/// one, and the implicit reference every topic message holds to the topic's
/// root is not a reply.
pub fn reply_ref(message: &Message) -> Option<ReplyRef> {
    if message.is_forwarded() {
        return None;
    }
    let target = message.reply_to_message.as_deref()?;
    if message.is_topic_message && Some(target.message_id) == message.message_thread_id {
        return None;
    }

    match (message.author_id(), target.author_id()) {
        (Some(sender), Some(author)) if sender == author => Some(ReplyRef::Own(target.message_id)),
        _ => Some(ReplyRef::Counterpart(target.message_id)),
    }
}

/// Finds the id of the replied-to message on the far side of the relay.
/// `chat_id` is the chat the reply was written in, which is also where the
/// replied-to message lives.
///
/// An own message is the origin of a link, so its counterpart is the mirror;
/// a counterpart message is a mirror, so its counterpart is the source. The
/// classified direction is tried first, then the other one.
pub async fn resolve(
    ledger: &MessageLedger,
    owner_id: Uuid,
    chat_id: i64,
    reply: ReplyRef,
) -> anyhow::Result<Option<i64>> {
    let resolved = match reply {
        ReplyRef::Own(id) => match mirror_of(ledger, owner_id, chat_id, id).await? {
            Some(found) => Some(found),
            None => source_of(ledger, owner_id, chat_id, id).await?,
        },
        ReplyRef::Counterpart(id) => match source_of(ledger, owner_id, chat_id, id).await? {
            Some(found) => Some(found),
            None => mirror_of(ledger, owner_id, chat_id, id).await?,
        },
    };
    Ok(resolved)
}

async fn mirror_of(
    ledger: &MessageLedger,
    owner_id: Uuid,
    chat_id: i64,
    source_message_id: i64,
) -> anyhow::Result<Option<i64>> {
    Ok(ledger
        .find_by_source(owner_id, chat_id, source_message_id)
        .await?
        .map(|link| link.mirror_message_id))
}

async fn source_of(
    ledger: &MessageLedger,
    owner_id: Uuid,
    chat_id: i64,
    mirror_message_id: i64,
) -> anyhow::Result<Option<i64>> {
    Ok(ledger
        .find_by_mirror(owner_id, chat_id, mirror_message_id)
        .await?
        .map(|link| link.source_message_id))
}
