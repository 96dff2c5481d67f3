use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;

use crate::model::CatalogSnapshot;
use crate::model::Task;

/// Terms shorter than this are noise and never indexed or matched.
const MIN_TERM_LEN: usize = 2;

/// Inverted index over one snapshot's task text.
///
/// Built once per snapshot and swapped alongside it; never mutated in
/// place. Slots address tasks in snapshot order (committed, then pending).
#[derive(Debug, Default)]
pub struct SearchIndex {
    postings: BTreeMap<String, Vec<Posting>>,
}

#[derive(Clone, Copy, Debug)]
struct Posting {
    slot: usize,
    in_title: bool,
}

#[derive(Default)]
struct SlotMatch {
    matched_terms: usize,
    title_hit: bool,
}

impl SearchIndex {
    /// Index `title`, `description`, `tags`, and `task_id` of every task.
    pub fn build(snapshot: &CatalogSnapshot) -> Self {
        // term -> slot -> seen-in-title, collapsed into sorted postings.
        let mut terms: BTreeMap<String, BTreeMap<usize, bool>> = BTreeMap::new();
        for (slot, task) in snapshot.iter().enumerate() {
            let mut record = |text: &str, in_title: bool| {
                for term in tokenize(text) {
                    let hit = terms.entry(term).or_default().entry(slot).or_default();
                    *hit |= in_title;
                }
            };
            record(&task.title, true);
            record(&task.description, false);
            record(&task.task_id, false);
            for tag in &task.tags {
                record(tag, false);
            }
        }
        let postings = terms
            .into_iter()
            .map(|(term, slots)| {
                let postings = slots
                    .into_iter()
                    .map(|(slot, in_title)| Posting { slot, in_title })
                    .collect();
                (term, postings)
            })
            .collect();
        Self { postings }
    }

    /// Relevance-ranked matches for a free-text query.
    ///
    /// A query term matches any indexed term it prefixes. Ranking is
    /// deterministic: distinct matched query terms descending, then
    /// title matches before description/tag-only matches, then lexical
    /// `task_id`.
    pub fn query<'s>(&self, snapshot: &'s CatalogSnapshot, text: &str) -> Vec<&'s Task> {
        let query_terms = {
            let mut terms = tokenize(text);
            terms.sort();
            terms.dedup();
            terms
        };
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut slots: HashMap<usize, SlotMatch> = HashMap::new();
        for term in &query_terms {
            for (slot, in_title) in self.slots_with_prefix(term) {
                let entry = slots.entry(slot).or_default();
                entry.matched_terms += 1;
                entry.title_hit |= in_title;
            }
        }

        let mut ranked: Vec<(SlotMatch, &Task)> = slots
            .into_iter()
            .filter_map(|(slot, hit)| snapshot.task_at(slot).map(|task| (hit, task)))
            .collect();
        ranked.sort_by(|(a, task_a), (b, task_b)| {
            b.matched_terms
                .cmp(&a.matched_terms)
                .then_with(|| b.title_hit.cmp(&a.title_hit))
                .then_with(|| task_a.task_id.cmp(&task_b.task_id))
                .then_with(|| task_a.benchmark.cmp(&task_b.benchmark))
        });
        ranked.into_iter().map(|(_, task)| task).collect()
    }

    /// Collapse the postings of every indexed term starting with `prefix`
    /// into one slot set, OR-ing the title flags.
    fn slots_with_prefix(&self, prefix: &str) -> Vec<(usize, bool)> {
        let mut merged: BTreeMap<usize, bool> = BTreeMap::new();
        let range = self
            .postings
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded));
        for (term, postings) in range {
            if !term.starts_with(prefix) {
                break;
            }
            for posting in postings {
                let flag = merged.entry(posting.slot).or_default();
                *flag |= posting.in_title;
            }
        }
        merged.into_iter().collect()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }
}

/// Case-folded alphanumeric terms of one text field.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.len() >= MIN_TERM_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceState;
    use crate::model::sample_task;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn snapshot(tasks: Vec<Task>) -> CatalogSnapshot {
        let (pending, committed) = tasks
            .into_iter()
            .partition(|task| task.source_state == SourceState::PendingPr);
        CatalogSnapshot {
            version: 1,
            built_at: Utc::now(),
            partial: false,
            committed,
            pending,
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn empty_query_returns_nothing_even_on_a_populated_snapshot() {
        let mut task = sample_task("swebench", "task-1");
        task.title = "Authentication Flow".to_string();
        let snap = snapshot(vec![task]);
        let index = SearchIndex::build(&snap);
        assert!(index.query(&snap, "").is_empty());
        assert!(index.query(&snap, "   ").is_empty());
        assert!(index.query(&snap, "?!").is_empty());
    }

    #[test]
    fn title_match_outranks_tag_only_match() {
        let mut titled = sample_task("swebench", "zz-auth-flow");
        titled.title = "Authentication Flow".to_string();
        let mut tagged = sample_task("swebench", "aa-hardening");
        tagged.tags = vec!["auth".to_string()];
        // `zz-` vs `aa-` would invert the order if the tie-break ran first.
        let snap = snapshot(vec![tagged, titled]);
        let index = SearchIndex::build(&snap);

        let hits = index.query(&snap, "auth");
        let ids: Vec<&str> = hits.iter().map(|task| task.task_id.as_str()).collect();
        assert_eq!(ids, vec!["zz-auth-flow", "aa-hardening"]);
    }

    #[test]
    fn more_matched_terms_outrank_fewer() {
        let mut both = sample_task("swebench", "zz-both");
        both.description = "rotate tls certificates".to_string();
        let mut one = sample_task("swebench", "aa-one");
        one.description = "tls handshake".to_string();
        let snap = snapshot(vec![one, both]);
        let index = SearchIndex::build(&snap);

        let hits = index.query(&snap, "tls certificates");
        let ids: Vec<&str> = hits.iter().map(|task| task.task_id.as_str()).collect();
        assert_eq!(ids, vec!["zz-both", "aa-one"]);
    }

    #[test]
    fn query_terms_match_as_prefixes() {
        let mut task = sample_task("swebench", "task-1");
        task.title = "Authentication Flow".to_string();
        let snap = snapshot(vec![task]);
        let index = SearchIndex::build(&snap);
        assert_eq!(index.query(&snap, "auth").len(), 1);
        assert_eq!(index.query(&snap, "authentication").len(), 1);
        assert!(index.query(&snap, "authx").is_empty());
    }

    #[test]
    fn ties_fall_back_to_lexical_task_id() {
        let mut b = sample_task("swebench", "banana");
        b.description = "shared term".to_string();
        let mut a = sample_task("swebench", "apple");
        a.description = "shared term".to_string();
        let snap = snapshot(vec![b, a]);
        let index = SearchIndex::build(&snap);

        let first = index.query(&snap, "shared");
        let second = index.query(&snap, "shared");
        let ids: Vec<&str> = first.iter().map(|task| task.task_id.as_str()).collect();
        assert_eq!(ids, vec!["apple", "banana"]);
        // Deterministic across repeated calls.
        assert_eq!(
            first.iter().map(|t| &t.task_id).collect::<Vec<_>>(),
            second.iter().map(|t| &t.task_id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn task_id_terms_are_searchable() {
        let task = sample_task("swebench", "fix-dns-cache");
        let snap = snapshot(vec![task]);
        let index = SearchIndex::build(&snap);
        assert_eq!(index.query(&snap, "dns").len(), 1);
    }
}
