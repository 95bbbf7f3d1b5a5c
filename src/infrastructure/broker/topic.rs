/// Matches a routing key against a topic binding pattern
///
/// Both are dot-separated words. `*` matches exactly one word and `#`
/// matches zero or more words.
///
/// # Example
/// ```
/// use pokemon_tracker_api::infrastructure::broker::topic::topic_matches;
///
/// assert!(topic_matches("pokemon.sighting.#", "pokemon.sighting.fire"));
/// assert!(topic_matches("pokemon.*.fire", "pokemon.sighting.fire"));
/// assert!(!topic_matches("pokemon.sighting.water", "pokemon.sighting.fire"));
/// ```
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_words(rest, &key[1..]),
        Some((word, rest)) => {
            key.first().is_some_and(|first| first == word) && matches_words(rest, &key[1..])
        }
    }
}
