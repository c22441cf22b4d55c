use std::fmt::Display;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::VoteTally;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teller => "teller",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivisionResult {
    Passed,
    Failed,
}

impl DivisionResult {
    /// A division passes only when the ayes strictly outnumber the noes.
    pub fn from_counts(yes: usize, no: usize) -> Self {
        if yes > no {
            DivisionResult::Passed
        } else {
            DivisionResult::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DivisionResult::Passed => "passed",
            DivisionResult::Failed => "failed",
        }
    }
}

impl Display for DivisionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub name: String,
    pub url: String,
    pub constituency: String,
    pub party: String,
    /// Normalized choice: `yes`, `no`, `both`, or whatever else the page recorded.
    pub option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  ▸ {} ({}, {}): {}",
            self.name, self.party, self.constituency, self.option
        )?;
        if let Some(role) = &self.role {
            write!(f, " [{}]", role.as_str())?;
        }
        Ok(())
    }
}

/// One voting division as read from its division page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motion {
    /// `pw-<date>-<number>`
    pub id: String,
    pub text: String,
    pub date: NaiveDate,
    pub datetime: Option<NaiveDateTime>,
    pub hansard: String,
    pub result: DivisionResult,
    /// Set from the policy row when the motion was reached through a policy page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    pub votes: Vec<Vote>,
}

impl Motion {
    /// Splits the motion into flat storage records tagged with their parents.
    pub fn into_records(self, policy: u32) -> (MotionRecord, Vec<VoteRecord>) {
        let votes = self
            .votes
            .into_iter()
            .map(|v| VoteRecord {
                motion: self.id.clone(),
                name: v.name,
                url: v.url,
                constituency: v.constituency,
                party: v.party,
                option: v.option,
                role: v.role,
            })
            .collect();

        let motion = MotionRecord {
            id: self.id,
            policy,
            text: self.text,
            date: self.date,
            datetime: self.datetime,
            hansard: self.hansard,
            result: self.result,
            direction: self.direction,
        };

        (motion, votes)
    }
}

impl Display for Motion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "┌─ {} ─ {}", self.id, self.date)?;
        writeln!(f, "│  {}", self.text)?;
        if let Some(datetime) = self.datetime {
            writeln!(f, "│  Time:    {}", datetime)?;
        }
        write!(f, "│  Result:  {}", self.result)?;
        if let Some(direction) = &self.direction {
            write!(f, " · Direction: {}", direction)?;
        }
        writeln!(f)?;
        writeln!(f, "│  Hansard: {}", self.hansard)?;
        writeln!(f, "└─ {} vote(s)", self.votes.len())?;
        write!(f, "{}", VoteTally::from_votes(&self.votes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub text: String,
    pub motions: Vec<Motion>,
}

impl Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Policy: \"{}\"", self.text)?;
        writeln!(f, "{} Commons motion(s)", self.motions.len())?;
        for (i, motion) in self.motions.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{:>3}. {}", i + 1, motion.text)?;
            writeln!(
                f,
                "     {} · {} · {}",
                motion.id,
                motion.result,
                motion.direction.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

/// A Commons row of a policy's motions table, pointing at its division page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionLink {
    pub date: String,
    pub subject: String,
    pub direction: String,
    /// Relative division page link requesting the full vote listing.
    pub url: String,
}

/// What a policy page says before any of its divisions are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPage {
    pub text: String,
    pub divisions: Vec<DivisionLink>,
}

/// Flat motion row, keyed by `(id, policy)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionRecord {
    pub id: String,
    pub policy: u32,
    pub text: String,
    pub date: NaiveDate,
    pub datetime: Option<NaiveDateTime>,
    pub hansard: String,
    pub result: DivisionResult,
    pub direction: Option<String>,
}

/// Flat vote row, keyed by `(motion, constituency, option)` so a split vote
/// from one constituency keeps both rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub motion: String,
    pub name: String,
    pub url: String,
    pub constituency: String,
    pub party: String,
    pub option: String,
    pub role: Option<Role>,
}
