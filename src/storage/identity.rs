//! Identity keys for job listings.

use sha2::{Digest, Sha256};

use crate::domain::{IdentityKey, JobListing};

/// Lowercase, punctuation stripped, whitespace collapsed.
pub fn normalize_field(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ext:<id>` when the source exposes an id, otherwise the content key.
/// The URL never participates.
pub fn identity_key(listing: &JobListing) -> IdentityKey {
    match external_id(listing) {
        Some(id) => IdentityKey(format!("ext:{}", id)),
        None => content_key(listing),
    }
}

/// `hash:<sha256>` of the normalized title, company, location, and description.
pub fn content_key(listing: &JobListing) -> IdentityKey {
    let mut hasher = Sha256::new();
    for (i, field) in [&listing.title, &listing.company, &listing.location, &listing.description]
        .iter()
        .enumerate()
    {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(normalize_field(field).as_bytes());
    }
    IdentityKey(format!("hash:{}", hex::encode(hasher.finalize())))
}

fn external_id(listing: &JobListing) -> Option<&str> {
    listing.external_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Every key a listing is known by.
///
/// A source may drop the external id on a retry, so the content key is an
/// alias even when an `ext:` key exists. Stores map all aliases to the key
/// the entity was first stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingIdentity {
    /// `identity_key` of the sighting.
    pub primary: IdentityKey,
    pub content: IdentityKey,
    pub external_id: Option<String>,
}

impl ListingIdentity {
    pub fn of(listing: &JobListing) -> Self {
        Self {
            primary: identity_key(listing),
            content: content_key(listing),
            external_id: external_id(listing).map(str::to_string),
        }
    }

    /// An identity with a single key and no aliases.
    pub fn exact(key: IdentityKey) -> Self {
        Self {
            primary: key.clone(),
            content: key,
            external_id: None,
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = &IdentityKey> {
        let content = (self.content != self.primary).then_some(&self.content);
        std::iter::once(&self.primary).chain(content)
    }

    /// Whether a content-key match against `stored` is the same entity.
    /// Two different external ids never merge.
    pub fn can_merge_into(&self, stored: &JobListing) -> bool {
        match (self.external_id.as_deref(), external_id(stored)) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => true,
        }
    }
}
