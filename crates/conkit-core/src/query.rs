//! Session query engine
//!
//! Read-only filter, sort and paginate over a set of sessions. Predicates are
//! conjunctive, except `any_labels` which matches when at least one of its
//! labels is present. Time bounds are inclusive.

use crate::session::{SessionState, SessionStatus, SessionSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Sort key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Creation time
    Created,
    /// Last access time
    #[default]
    Accessed,
    /// Expiry time
    Expires,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" | "created_at" => Ok(Self::Created),
            "accessed" | "last_accessed" => Ok(Self::Accessed),
            "expires" | "expires_at" => Ok(Self::Expires),
            other => Err(format!("unknown sort key: {}", other)),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Oldest first
    Asc,
    /// Newest first
    #[default]
    Desc,
}

/// Session filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionQuery {
    /// Session must carry every one of these labels
    pub labels: Vec<String>,
    /// Session must carry at least one of these labels
    pub any_labels: Vec<String>,
    /// Session k8s labels must contain each pair exactly
    pub k8s_labels: BTreeMap<String, String>,

    /// Created strictly after
    pub created_after: Option<DateTime<Utc>>,
    /// Created strictly before
    pub created_before: Option<DateTime<Utc>>,
    /// Accessed strictly after
    pub accessed_after: Option<DateTime<Utc>>,
    /// Accessed strictly before
    pub accessed_before: Option<DateTime<Utc>>,
    /// Expires strictly after
    pub expires_after: Option<DateTime<Utc>>,
    /// Expires strictly before
    pub expires_before: Option<DateTime<Utc>>,

    /// Filter on a recorded tool error
    pub has_last_error: Option<bool>,
    /// Filter on pending or running jobs
    pub has_active_jobs: Option<bool>,
    /// Filter on a stored repository analysis
    pub has_analysis: Option<bool>,
    /// Filter on derived status
    pub status: Option<SessionStatus>,
    /// Exact repository URL
    pub repo_url: Option<String>,

    /// Sort key
    pub sort_by: SortBy,
    /// Sort direction
    pub order: SortOrder,
    /// Matches to skip; negative values count as zero
    pub offset: i64,
    /// Maximum matches to return; zero or negative means no limit
    pub limit: i64,
}

impl SessionQuery {
    /// Empty query matching everything, accessed-descending
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require all of `labels`
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Require any of `labels`
    #[must_use]
    pub fn with_any_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Require a k8s label pair
    #[must_use]
    pub fn with_k8s_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.k8s_labels.insert(key.into(), value.into());
        self
    }

    /// Restrict to a derived status
    #[must_use]
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set sort key and direction
    #[must_use]
    pub fn sorted_by(mut self, sort_by: SortBy, order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.order = order;
        self
    }

    /// Set offset and limit
    #[must_use]
    pub fn paginate(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Whether `session` satisfies every predicate as of `now`
    #[must_use]
    pub fn matches_at(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        if !self.labels.iter().all(|l| session.labels.contains(l)) {
            return false;
        }
        if !self.any_labels.is_empty() && !self.any_labels.iter().any(|l| session.labels.contains(l)) {
            return false;
        }
        if !self
            .k8s_labels
            .iter()
            .all(|(k, v)| session.k8s_labels.get(k) == Some(v))
        {
            return false;
        }

        if !in_range(session.created_at, self.created_after, self.created_before)
            || !in_range(session.last_accessed, self.accessed_after, self.accessed_before)
            || !in_range(session.expires_at, self.expires_after, self.expires_before)
        {
            return false;
        }

        if !flag_matches(self.has_last_error, session.last_error.is_some())
            || !flag_matches(self.has_active_jobs, session.has_active_jobs())
            || !flag_matches(self.has_analysis, session.repo_analysis.is_some())
        {
            return false;
        }

        if let Some(status) = self.status {
            if session.status_at(now) != status {
                return false;
            }
        }
        if let Some(url) = &self.repo_url {
            if session.repo_url.as_deref() != Some(url.as_str()) {
                return false;
            }
        }
        true
    }

    fn sort_key(&self, session: &SessionState) -> DateTime<Utc> {
        match self.sort_by {
            SortBy::Created => session.created_at,
            SortBy::Accessed => session.last_accessed,
            SortBy::Expires => session.expires_at,
        }
    }

    fn compare(&self, a: &SessionState, b: &SessionState) -> Ordering {
        let by_key = self.sort_key(a).cmp(&self.sort_key(b));
        let by_key = match self.order {
            SortOrder::Asc => by_key,
            SortOrder::Desc => by_key.reverse(),
        };
        // Ties resolve by id so pages are stable
        by_key.then_with(|| a.session_id.cmp(&b.session_id))
    }
}

fn in_range(
    value: DateTime<Utc>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) -> bool {
    after.is_none_or(|a| value >= a) && before.is_none_or(|b| value <= b)
}

fn flag_matches(wanted: Option<bool>, actual: bool) -> bool {
    wanted.is_none_or(|w| w == actual)
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching sessions on this page
    pub sessions: Vec<SessionState>,
    /// Matches before pagination
    pub total: usize,
    /// Effective offset
    pub offset: usize,
    /// Effective limit, `None` when unlimited
    pub limit: Option<usize>,
}

impl QueryResult {
    /// Summary view of the page
    #[must_use]
    pub fn summaries_at(&self, now: DateTime<Utc>) -> Vec<SessionSummary> {
        self.sessions.iter().map(|s| s.summary_at(now)).collect()
    }

    /// Whether more matches follow this page
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + self.sessions.len() < self.total
    }
}

/// Filter, sort and paginate `sessions`
pub fn query_sessions<'a, I>(sessions: I, query: &SessionQuery, now: DateTime<Utc>) -> QueryResult
where
    I: IntoIterator<Item = &'a SessionState>,
{
    let mut matched: Vec<&SessionState> = sessions
        .into_iter()
        .filter(|s| query.matches_at(s, now))
        .collect();
    matched.sort_by(|a, b| query.compare(a, b));

    let total = matched.len();
    let offset = usize::try_from(query.offset.max(0))
        .unwrap_or(usize::MAX)
        .min(total);
    let limit = (query.limit > 0).then(|| usize::try_from(query.limit).unwrap_or(usize::MAX));

    let page = matched
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    QueryResult {
        sessions: page,
        total,
        offset,
        limit,
    }
}

#[cfg(test)]
mod tests;
