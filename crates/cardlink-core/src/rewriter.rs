//! Assigns safe tokens to a whole set and rejects collisions
//!
//! Collision detection needs every record, so the rewriter consumes the full
//! ordered sequence. The token map lives in the [`Rewriter`] value, never in
//! process-wide state, so independent sets never see each other's tokens.

use crate::card::{CardRecord, RewrittenRecord, SafeToken};
use crate::error::{Error, Result};
use crate::sanitize::sanitize;
use std::collections::HashMap;

/// Token assignment for one set
#[derive(Debug, Default)]
pub struct Rewriter {
    /// Case-folded token -> (token, display name that claimed it)
    claimed: HashMap<String, (SafeToken, String)>,
    duplicates: usize,
}

impl Rewriter {
    /// Create a rewriter with an empty token map
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every record, preserving order
    ///
    /// Fails on the first record whose token is empty or already claimed by
    /// a different display name. A repeated display name (two printings
    /// sharing art) is not a collision.
    pub fn rewrite(&mut self, records: &[CardRecord]) -> Result<Vec<RewrittenRecord>> {
        let mut rewritten = Vec::with_capacity(records.len());

        for record in records {
            let safe_token = self.claim(&record.display_name)?;
            let image_file = safe_token.file_name(record.image_extension());

            log::debug!("'{}' -> '{}'", record.display_name, image_file);

            rewritten.push(RewrittenRecord {
                record: record.clone(),
                safe_token,
                image_file,
            });
        }

        Ok(rewritten)
    }

    /// Number of records that repeated an already-seen display name
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Number of distinct tokens assigned so far
    pub fn token_count(&self) -> usize {
        self.claimed.len()
    }

    fn claim(&mut self, display_name: &str) -> Result<SafeToken> {
        let token = sanitize(display_name)?;

        // Case-insensitive filesystems would put "Bolt" and "BOLT" in one file
        let key = token.as_str().to_lowercase();

        match self.claimed.get(&key) {
            Some((existing, owner)) if owner != display_name => Err(Error::TokenCollision {
                first: owner.clone(),
                second: display_name.to_string(),
                token: existing.to_string(),
            }),
            Some(_) => {
                log::warn!("duplicate card '{}' shares image '{}'", display_name, token);
                self.duplicates += 1;
                Ok(token)
            }
            None => {
                self.claimed
                    .insert(key, (token.clone(), display_name.to_string()));
                Ok(token)
            }
        }
    }
}

/// Rewrite records with a fresh [`Rewriter`]
pub fn rewrite_records(records: &[CardRecord]) -> Result<Vec<RewrittenRecord>> {
    Rewriter::new().rewrite(records)
}
