use nostr_sdk::prelude::*;

use crate::constants::kinds;

/// Forum read model over kind-1 and kind-30023 events.
///
/// Thread detection: long-form events are always thread roots; kind-1 events
/// are threads when they carry no e-tag reference, replies otherwise.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub kind: u16,
    pub title: Option<String>,
    pub board: Option<String>,
    pub content: String,
    pub created_at: u64,
    /// Thread root referenced via NIP-10 "root" marker (or positional e-tag)
    pub root: Option<String>,
    /// Direct parent referenced via NIP-10 "reply" marker
    pub reply_to: Option<String>,
}

impl Post {
    pub fn from_event(event: &Event) -> Self {
        let mut title: Option<String> = None;
        let mut board: Option<String> = None;
        let mut root: Option<String> = None;
        let mut reply_to: Option<String> = None;
        let mut unmarked_e: Vec<String> = Vec::new();

        for tag in event.tags.iter() {
            let parts = tag.as_slice();
            match parts.first().map(String::as_str) {
                Some("title") => {
                    title = parts.get(1).filter(|s| !s.is_empty()).cloned();
                }
                Some("t") => {
                    if board.is_none() {
                        board = parts.get(1).cloned();
                    }
                }
                Some("e") => {
                    let Some(id) = parts.get(1) else { continue };
                    // NIP-10: ["e", id, relay, marker]; some clients omit relay
                    let marker = parts
                        .get(3)
                        .map(String::as_str)
                        .or_else(|| parts.get(2).map(String::as_str));
                    match marker {
                        Some("root") => root = Some(id.clone()),
                        Some("reply") => reply_to = Some(id.clone()),
                        _ => unmarked_e.push(id.clone()),
                    }
                }
                _ => {}
            }
        }

        // Positional fallback for clients that don't write markers:
        // first e-tag is the root, last is the direct parent.
        if root.is_none() && reply_to.is_none() && !unmarked_e.is_empty() {
            root = unmarked_e.first().cloned();
            if unmarked_e.len() > 1 {
                reply_to = unmarked_e.last().cloned();
            }
        }

        Self {
            id: event.id.to_hex(),
            author: event.pubkey.to_hex(),
            kind: event.kind.as_u16(),
            title,
            board,
            content: event.content.clone(),
            created_at: event.created_at.as_u64(),
            root,
            reply_to,
        }
    }

    /// Thread root vs. reply. Long-form posts are always thread roots.
    pub fn is_thread(&self) -> bool {
        self.kind == kinds::LONG_FORM || (self.root.is_none() && self.reply_to.is_none())
    }

    /// Title tag if present, first line of content otherwise.
    pub fn title_or_excerpt(&self) -> String {
        match &self.title {
            Some(t) => t.clone(),
            None => excerpt(&self.content, 80),
        }
    }
}

/// First line of `content`, truncated to `max` chars on a char boundary.
pub fn excerpt(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed(builder: EventBuilder) -> Event {
        let keys = Keys::generate();
        builder.sign_with_keys(&keys).unwrap()
    }

    #[test]
    fn test_kind1_without_e_tags_is_thread() {
        let event = signed(
            EventBuilder::new(Kind::from(kinds::TEXT_NOTE), "hello forum")
                .tag(Tag::hashtag("general")),
        );
        let post = Post::from_event(&event);
        assert!(post.is_thread());
        assert_eq!(post.board.as_deref(), Some("general"));
        assert_eq!(post.title_or_excerpt(), "hello forum");
    }

    #[test]
    fn test_marked_reply() {
        let keys = Keys::generate();
        let parent = EventBuilder::new(Kind::from(kinds::TEXT_NOTE), "parent")
            .sign_with_keys(&keys)
            .unwrap();
        let event = signed(EventBuilder::new(Kind::from(kinds::TEXT_NOTE), "child").tag(
            Tag::custom(
                TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::E)),
                vec![parent.id.to_hex(), String::new(), "root".to_string()],
            ),
        ));
        let post = Post::from_event(&event);
        assert!(!post.is_thread());
        assert_eq!(post.root.as_deref(), Some(parent.id.to_hex().as_str()));
    }

    #[test]
    fn test_positional_e_tag_fallback() {
        let event = signed(
            EventBuilder::new(Kind::from(kinds::TEXT_NOTE), "child")
                .tag(Tag::custom(
                    TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::E)),
                    vec!["a".repeat(64)],
                ))
                .tag(Tag::custom(
                    TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::E)),
                    vec!["b".repeat(64)],
                )),
        );
        let post = Post::from_event(&event);
        assert_eq!(post.root.as_deref(), Some("a".repeat(64).as_str()));
        assert_eq!(post.reply_to.as_deref(), Some("b".repeat(64).as_str()));
        assert!(!post.is_thread());
    }

    #[test]
    fn test_excerpt_truncates_first_line() {
        assert_eq!(excerpt("short\nsecond line", 80), "short");
        let long = "x".repeat(100);
        let e = excerpt(&long, 10);
        assert_eq!(e.chars().count(), 11);
        assert!(e.ends_with('…'));
    }
}
