use tripwire_common::types::{AlertInstance, NotificationChannel};

/// Whether an enabled channel accepts the alert. Each present filter must
/// pass; an absent filter accepts everything.
///
/// The tag filter matches a label key (`env`) or a `key=value` pair
/// (`env=prod`) of the alert.
pub fn channel_accepts(channel: &NotificationChannel, alert: &AlertInstance) -> bool {
    if !channel.enabled {
        return false;
    }
    if let Some(ref severities) = channel.severity_filter {
        if !severities.contains(&alert.severity) {
            return false;
        }
    }
    if let Some(ref categories) = channel.category_filter {
        if !categories.iter().any(|c| c == &alert.category) {
            return false;
        }
    }
    if let Some(ref tags) = channel.tag_filter {
        if !tags.iter().any(|tag| label_matches(alert, tag)) {
            return false;
        }
    }
    true
}

pub(crate) fn label_matches(alert: &AlertInstance, tag: &str) -> bool {
    match tag.split_once('=') {
        Some((key, value)) => alert.labels.get(key).is_some_and(|v| v == value),
        None => alert.labels.contains_key(tag),
    }
}

pub fn select_channels(
    channels: Vec<NotificationChannel>,
    alert: &AlertInstance,
) -> Vec<NotificationChannel> {
    channels
        .into_iter()
        .filter(|ch| channel_accepts(ch, alert))
        .collect()
}
