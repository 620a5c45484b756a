/// Per-identity toggles controlling which categories the sync loop polls for.
/// Created lazily on first read; persisted per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    pub mentions: bool,
    pub replies: bool,
    pub zaps: bool,
    pub follows: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            mentions: true,
            replies: true,
            zaps: true,
            follows: false,
        }
    }
}

impl NotificationSettings {
    pub fn set(&mut self, category: &str, enabled: bool) -> bool {
        match category {
            "mentions" => self.mentions = enabled,
            "replies" => self.replies = enabled,
            "zaps" => self.zaps = enabled,
            "follows" => self.follows = enabled,
            _ => return false,
        }
        true
    }
}
