//! Stage-scoped accumulator of cluster job ids

use serde::{Deserialize, Serialize};

/// Prefix of the job-id report line printed by anything that submits jobs
pub const CLUSTER_JOBS_PREFIX: &str = "[CLUSTER_JOBS]";

/// Job ids produced by one stage, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    stage: String,
    ids: Vec<String>,
}

impl DependencySet {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            ids: Vec::new(),
        }
    }

    /// Build a set from ids collected elsewhere (e.g. an external stage's report)
    pub fn from_ids<I, S>(stage: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new(stage);
        for id in ids {
            set.push(id);
        }
        set
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Record a job id; an id already present is ignored
    pub fn push(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() && !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// `afterok:<id>:<id>...`, or `None` when there is nothing to wait for
    pub fn precondition(&self) -> Option<String> {
        precondition_for(self.ids.iter().map(String::as_str))
    }

    /// The single stdout line reporting these ids
    pub fn report_line(&self) -> String {
        format!("{} {}", CLUSTER_JOBS_PREFIX, self.ids.join(","))
    }
}

/// Build an `afterok` precondition over several sets, keeping first-seen order
pub fn merged_precondition<'a, I>(sets: I) -> Option<String>
where
    I: IntoIterator<Item = &'a DependencySet>,
{
    let mut merged: Vec<&str> = Vec::new();
    for set in sets {
        for id in set.ids() {
            if !merged.contains(&id.as_str()) {
                merged.push(id);
            }
        }
    }
    precondition_for(merged)
}

fn precondition_for<'a, I>(ids: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let ids: Vec<&str> = ids.into_iter().collect();
    if ids.is_empty() {
        None
    } else {
        Some(format!("afterok:{}", ids.join(":")))
    }
}

/// Extract job ids from the last `[CLUSTER_JOBS]` line of some output
pub fn parse_report_line(output: &str) -> Option<Vec<String>> {
    output
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(CLUSTER_JOBS_PREFIX))
        .map(|rest| {
            rest.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        })
}
