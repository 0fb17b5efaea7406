//! Per-file, per-variant staleness decision.
//!
//! A variant is stale when `(fingerprint changed) OR (output artifact
//! missing)`. The fingerprint covers both the source content digest and the
//! effective settings; the existence check is the safety net that retries an
//! encode that failed or was interrupted after its fingerprint was already
//! committed.

use crate::cache::CacheStore;
use crate::settings::{Schema, SettingsBlob};
use crate::variant::Variant;
use anyhow::Result;
use std::collections::HashSet;
use std::path::PathBuf;

/// Computes the stale-variant set without touching the store.
///
/// Staleness per requested variant in `outputs`:
/// - first-seen file (no prior entry): every variant;
/// - a schema field whose value differs from the prior entry: that field's
///   affected variants;
/// - content digest differs: every variant;
/// - independently of all of the above: the variant's output artifact does
///   not exist on disk.
#[must_use]
pub fn stale_variants(
    store: &CacheStore,
    schema: &Schema,
    file_id: &str,
    content_hash: &str,
    effective: &SettingsBlob,
    outputs: &[(Variant, PathBuf)],
) -> HashSet<Variant> {
    let requested: HashSet<Variant> = outputs.iter().map(|(variant, _)| *variant).collect();
    let mut stale = HashSet::new();

    match store.get(file_id) {
        None => {
            stale.extend(&requested);
        }
        Some(prior) => {
            for field in schema.fields {
                if effective.get(field.name) != prior.settings.get(field.name) {
                    stale.extend(
                        field
                            .affects
                            .iter()
                            .filter(|variant| requested.contains(*variant)),
                    );
                }
            }
            if prior.content_hash != content_hash {
                stale.extend(&requested);
            }
        }
    }

    for (variant, artifact) in outputs {
        if !stale.contains(variant) && !artifact.exists() {
            stale.insert(*variant);
        }
    }

    stale
}

/// Decides staleness and commits the new fingerprint in one step.
///
/// The upsert is unconditional: the entry is written and the id marked seen
/// even when no variant is stale, and before any encode is attempted. A
/// subsequently failing encode therefore does not mark its variant up to
/// date; the missing artifact is re-detected on the next run.
pub fn detect_stale(
    store: &mut CacheStore,
    schema: &Schema,
    file_id: &str,
    content_hash: &str,
    effective: &SettingsBlob,
    outputs: &[(Variant, PathBuf)],
) -> Result<HashSet<Variant>> {
    let stale = stale_variants(store, schema, file_id, content_hash, effective, outputs);
    store.set(file_id, content_hash.to_string(), effective.clone())?;
    Ok(stale)
}
