//! Forum browse and publish operations.
//!
//! Threads are long-form (kind 30023) or bare kind-1 events tagged with a
//! board hashtag; comments are kind-1 events referencing the thread with
//! NIP-10 markers. Builders are pure so drafts validate before anything is
//! signed; publish failures carry the relay's message back to the form.

use std::borrow::Cow;

use nostr_sdk::prelude::*;
use uuid::Uuid;

use crate::constants::{kinds, BOARDS};
use crate::error::{FetchError, PublishError};
use crate::identity::Signer;
use crate::models::Post;
use crate::relay::{EventSource, RelayPool};

#[derive(Debug, Clone)]
pub struct ThreadDraft {
    pub title: String,
    pub board: String,
    pub content: String,
}

pub fn list_boards() -> &'static [&'static str] {
    BOARDS
}

/// Thread roots on a board, newest first.
pub async fn fetch_threads(
    source: &dyn EventSource,
    board: &str,
    limit: usize,
) -> Result<Vec<Post>, FetchError> {
    let events = source
        .get_events(
            Filter::new()
                .kinds([Kind::from(kinds::TEXT_NOTE), Kind::from(kinds::LONG_FORM)])
                .hashtag(board)
                .limit(limit),
        )
        .await?;
    let mut threads: Vec<Post> = events
        .iter()
        .map(Post::from_event)
        .filter(Post::is_thread)
        .collect();
    threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(threads)
}

/// Comments referencing a thread, oldest first.
pub async fn fetch_comments(
    source: &dyn EventSource,
    thread_id: EventId,
    limit: usize,
) -> Result<Vec<Post>, FetchError> {
    let events = source
        .get_events(
            Filter::new()
                .kinds([Kind::from(kinds::TEXT_NOTE), Kind::from(kinds::COMMENT)])
                .event(thread_id)
                .limit(limit),
        )
        .await?;
    let mut comments: Vec<Post> = events.iter().map(Post::from_event).collect();
    comments.sort_by_key(|p| p.created_at);
    Ok(comments)
}

/// Validate a draft and build the unsigned thread event.
/// Returns the generated thread identifier (the `d` tag) with the builder.
pub fn thread_builder(draft: &ThreadDraft) -> Result<(String, EventBuilder), PublishError> {
    if draft.title.trim().is_empty() {
        return Err(PublishError::EmptyDraft("title"));
    }
    if draft.content.trim().is_empty() {
        return Err(PublishError::EmptyDraft("content"));
    }
    if !BOARDS.contains(&draft.board.as_str()) {
        return Err(PublishError::UnknownBoard(draft.board.clone()));
    }

    let thread_id = Uuid::new_v4().to_string();
    let builder = EventBuilder::new(Kind::from(kinds::LONG_FORM), &draft.content)
        .tag(Tag::identifier(thread_id.clone()))
        .tag(Tag::custom(
            TagKind::Custom(Cow::Borrowed("title")),
            vec![draft.title.clone()],
        ))
        .tag(Tag::hashtag(&draft.board))
        .tag(Tag::custom(
            TagKind::Custom(Cow::Borrowed("published_at")),
            vec![Timestamp::now().as_u64().to_string()],
        ));
    Ok((thread_id, builder))
}

/// Validate a comment and build the unsigned event: NIP-10 root marker,
/// optional reply marker, optional p-tag of the parent author.
pub fn comment_builder(
    thread_id: EventId,
    reply_to: Option<EventId>,
    parent_author: Option<PublicKey>,
    content: &str,
) -> Result<EventBuilder, PublishError> {
    if content.trim().is_empty() {
        return Err(PublishError::EmptyDraft("comment"));
    }

    let mut builder = EventBuilder::new(Kind::from(kinds::TEXT_NOTE), content).tag(Tag::custom(
        TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::E)),
        vec![thread_id.to_hex(), String::new(), "root".to_string()],
    ));
    if let Some(reply_id) = reply_to {
        builder = builder.tag(Tag::custom(
            TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::E)),
            vec![reply_id.to_hex(), String::new(), "reply".to_string()],
        ));
    }
    if let Some(author) = parent_author {
        builder = builder.tag(Tag::public_key(author));
    }
    Ok(builder)
}

/// Sign and send a new thread. Returns the thread identifier and the signed
/// event's id.
pub async fn publish_thread(
    pool: &RelayPool,
    signer: &Signer,
    author: PublicKey,
    draft: &ThreadDraft,
) -> Result<(String, EventId), PublishError> {
    let (thread_id, builder) = thread_builder(draft)?;
    let event = signer.sign(builder, author).await?;
    let event_id = pool.publish(&event).await?;
    Ok((thread_id, event_id))
}

/// Sign and send a comment under a thread (or under another comment).
pub async fn publish_comment(
    pool: &RelayPool,
    signer: &Signer,
    author: PublicKey,
    thread_id: EventId,
    reply_to: Option<EventId>,
    parent_author: Option<PublicKey>,
    content: &str,
) -> Result<EventId, PublishError> {
    let builder = comment_builder(thread_id, reply_to, parent_author, content)?;
    let event = signer.sign(builder, author).await?;
    pool.publish(&event).await
}
