//! MQTT-style topic matching.
//!
//! Subscriptions use the standard wildcards: `+` matches exactly one topic
//! level, `#` matches zero or more trailing levels.

/// Check if a channel matches a subscription pattern with wildcards.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    // Exact matches first
    if pattern == topic {
        return true;
    }

    // A lone "#" matches any topic
    if pattern == "#" {
        return true;
    }

    // Multi-level wildcard at the end
    if let Some(prefix) = pattern.strip_suffix("/#") {
        if prefix.contains('+') {
            return matches_mixed_wildcards(pattern, topic);
        }

        if topic.starts_with(prefix) {
            // Either the exact prefix, or the prefix followed by '/'
            return topic.len() == prefix.len() || topic.as_bytes().get(prefix.len()) == Some(&b'/');
        }
        return false;
    }

    if pattern.contains('+') {
        return matches_single_level_wildcards(pattern, topic);
    }

    false
}

/// The first `count` pattern parts must match the topic parts, with `+`
/// matching any single level.
fn matches_pattern_parts(pattern_parts: &[&str], topic_parts: &[&str], count: usize) -> bool {
    if topic_parts.len() < count {
        return false;
    }

    for i in 0..count {
        if pattern_parts[i] != "+" && pattern_parts[i] != topic_parts[i] {
            return false;
        }
    }

    true
}

fn matches_single_level_wildcards(pattern: &str, topic: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    // Without '#', the level counts must agree
    if pattern_parts.len() != topic_parts.len() {
        return false;
    }

    matches_pattern_parts(&pattern_parts, &topic_parts, pattern_parts.len())
}

fn matches_mixed_wildcards(pattern: &str, topic: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let topic_parts: Vec<&str> = topic.split('/').collect();

    if pattern_parts.last() != Some(&"#") {
        return false;
    }

    let prefix_len = pattern_parts.len() - 1;
    matches_pattern_parts(&pattern_parts, &topic_parts, prefix_len)
}
