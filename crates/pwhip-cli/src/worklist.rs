use std::fmt::Display;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use pwhip::{Fetch, WebScraper};
use serde::Deserialize;

use crate::store::Store;

/// Worklists come from JSON exports where the id may be a number or a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PolicyId {
    Number(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct PolicyEntry {
    id: PolicyId,
}

pub fn read_policy_ids(path: &Path) -> Result<Vec<u32>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read worklist {}", path.display()))?;
    parse_policy_ids(&json)
}

fn parse_policy_ids(json: &str) -> Result<Vec<u32>> {
    let entries: Vec<PolicyEntry> = serde_json::from_str(json)
        .context("worklist must be a JSON array of objects with an 'id' field")?;

    entries
        .into_iter()
        .map(|entry| match entry.id {
            PolicyId::Number(id) => Ok(id),
            PolicyId::Text(id) => id
                .trim()
                .parse()
                .with_context(|| format!("invalid policy id '{}'", id)),
        })
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WorklistSummary {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub motions: usize,
}

impl Display for WorklistSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Policies stored:  {}", self.stored)?;
        writeln!(f, "  Policies skipped: {}", self.skipped)?;
        writeln!(f, "  Policies failed:  {}", self.failed)?;
        writeln!(f, "  Motions stored:   {}", self.motions)
    }
}

/// Fetches one policy and upserts its flattened motions and votes.
pub async fn store_policy<F: Fetch>(
    scraper: &WebScraper<F>,
    store: &mut Store,
    policy_id: u32,
) -> Result<usize> {
    let policy = scraper.fetch_policy_by_id(policy_id).await?;
    let count = policy.motions.len();

    let records: Vec<_> = policy
        .motions
        .into_iter()
        .map(|motion| motion.into_records(policy_id))
        .collect();
    for (motion, _) in &records {
        println!("  {} {}", motion.id, motion.text);
    }
    store.save_policy(&records)?;

    Ok(count)
}

/// Runs the worklist. Policies that already have motions stored are skipped
/// unless `force` is set; a failing policy is logged and the loop moves on.
pub async fn store_policies<F: Fetch>(
    scraper: &WebScraper<F>,
    store: &mut Store,
    policy_ids: &[u32],
    force: bool,
) -> WorklistSummary {
    let mut summary = WorklistSummary::default();

    for &policy_id in policy_ids {
        if !force {
            match store.has_policy(policy_id) {
                Ok(true) => {
                    println!("Skipping Policy {}", policy_id);
                    summary.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => log::warn!("Could not check policy {}: {:#}", policy_id, e),
            }
        }

        println!("Fetching Policy {}", policy_id);
        match store_policy(scraper, store, policy_id).await {
            Ok(count) => {
                summary.stored += 1;
                summary.motions += count;
            }
            Err(e) => {
                log::error!("Policy {} failed: {:#}", policy_id, e);
                summary.failed += 1;
            }
        }
    }

    summary
}
