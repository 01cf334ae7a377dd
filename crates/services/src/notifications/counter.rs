use super::model::Notification;

pub fn unread_count(feed: &[Notification]) -> usize {
    feed.iter().filter(|n| !n.read).count()
}

/// Text for the bell badge. `None` hides the badge; counts above `cap`
/// collapse to "{cap}+".
pub fn badge_label(count: usize, cap: usize) -> Option<String> {
    match count {
        0 => None,
        n if n > cap => Some(format!("{cap}+")),
        n => Some(n.to_string()),
    }
}
