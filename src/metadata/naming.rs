//! Connection name derivation.
//!
//! Registry connection names are limited to ASCII letters, digits and single hyphens, at most
//! [`MAX_CONNECTION_NAME_LEN`] characters, without leading or trailing hyphens. Names come from
//! the English organization display name when one exists and from the entity ID otherwise.

// self
use crate::_prelude::*;

/// Longest connection name the registry accepts.
pub const MAX_CONNECTION_NAME_LEN: usize = 127;

/// Sanitizes an arbitrary seed into a registry connection name.
///
/// Whitespace runs become one hyphen, as do spaces, colons, periods and slashes; any other
/// character outside `[A-Za-z0-9-]` is dropped. The result is truncated, repeated hyphens are
/// collapsed and edge hyphens trimmed. Applying it to its own output changes nothing.
pub fn sanitize(seed: &str) -> String {
	let mut spaced = String::with_capacity(seed.len());

	for word in seed.split_whitespace() {
		if !spaced.is_empty() {
			spaced.push(' ');
		}

		spaced.push_str(word);
	}

	let kept = spaced
		.chars()
		.map(|c| if matches!(c, ' ' | ':' | '.' | '/') { '-' } else { c })
		.filter(|c| c.is_ascii_alphanumeric() || *c == '-')
		.take(MAX_CONNECTION_NAME_LEN)
		.collect::<String>();
	let mut name = String::with_capacity(kept.len());

	for c in kept.chars() {
		if c == '-' && name.ends_with('-') {
			continue;
		}

		name.push(c);
	}

	name.trim_matches('-').to_owned()
}

/// Name seeded from an organization display name.
pub fn from_display_name(display_name: &str) -> String {
	sanitize(display_name)
}

/// Name seeded from an entity ID.
///
/// URLs with a host contribute the host (periods as hyphens) followed by the path segments;
/// anything else is treated as a URN and contributes every colon-separated segment after the
/// first.
pub fn from_entity_id(entity_id: &str) -> String {
	match Url::parse(entity_id) {
		Ok(url) if url.host_str().is_some_and(|host| !host.is_empty()) => {
			let mut seed = url.host_str().unwrap_or_default().replace('.', "-");
			let path = url.path().trim_start_matches('/');

			if !path.is_empty() {
				seed.push('-');
				seed.push_str(&path.replace('/', "-"));
			}

			sanitize(&seed)
		},
		_ => {
			let seed = entity_id
				.split(':')
				.skip(1)
				.map(|part| part.replace('/', "-"))
				.collect::<Vec<_>>()
				.join("-");

			sanitize(&seed)
		},
	}
}
