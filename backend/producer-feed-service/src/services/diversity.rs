use std::collections::VecDeque;
use tracing::debug;

use crate::models::AuthorKey;
use crate::services::scoring::ScoredCandidate;

/// Authors of the most recently accepted items, newest at the back.
/// Anonymous items occupy a slot with no key, so they break author runs.
#[derive(Debug)]
pub struct RecentAuthors {
    ring: VecDeque<Option<AuthorKey>>,
    capacity: usize,
}

impl RecentAuthors {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, author: Option<AuthorKey>) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(author);
    }

    /// Occurrences of `author` among the last `k` accepted items
    pub fn count_recent(&self, author: &AuthorKey, k: usize) -> usize {
        self.ring
            .iter()
            .rev()
            .take(k)
            .filter(|recent| recent.as_ref() == Some(author))
            .count()
    }
}

/// Diversity Layer - caps consecutive posts from one author
pub struct DiversityLayer {
    max_consecutive_from_author: usize,
}

impl DiversityLayer {
    pub fn new(max_consecutive_from_author: usize) -> Self {
        Self {
            max_consecutive_from_author: max_consecutive_from_author.max(1),
        }
    }

    /// Walk the ranked window once, keeping rank order. An item whose author already fills
    /// the last K slots is skipped for good. Stops at `page_size` or window exhaustion, so
    /// heavily clustered windows produce short pages.
    pub fn rerank(&self, window: Vec<ScoredCandidate>, page_size: usize) -> Vec<ScoredCandidate> {
        let k = self.max_consecutive_from_author;
        let mut recent = RecentAuthors::with_capacity(2 * k);
        let mut selected = Vec::with_capacity(page_size.min(window.len()));
        let mut skipped = 0usize;

        for candidate in window {
            if selected.len() >= page_size {
                break;
            }

            let author = candidate.item.author.key();
            if let Some(key) = &author {
                if recent.count_recent(key, k) >= k {
                    skipped += 1;
                    continue;
                }
            }

            recent.push(author);
            selected.push(candidate);
        }

        if skipped > 0 {
            debug!(skipped, kept = selected.len(), "Diversity layer skipped clustered authors");
        }
        selected
    }
}
