//! Name resolution against a per-guild roster
//!
//! Maps OCR-extracted strings to canonical roster names via, in order:
//! case-insensitive exact match, case-insensitive nickname match, then
//! a bounded fuzzy match with digit-for-letter confusables folded.
//! Resolution is pure over a [`RosterSnapshot`]; the snapshot itself is
//! served through a versioned read-through cache that roster mutations
//! invalidate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// One roster member as seen by the resolver.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub canonical: String,
    pub nicknames: Vec<String>,
}

/// Immutable view of a guild's active roster.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    pub entries: Vec<RosterEntry>,
}

/// Outcome of resolving a raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Canonical roster name on a hit, the input string on a miss.
    pub name: String,
    pub is_roster_member: bool,
}

impl RosterSnapshot {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    /// Resolve `raw` to a canonical roster name.
    pub fn resolve(&self, raw: &str) -> Resolution {
        let raw = raw.trim();
        if raw.is_empty() {
            return Resolution { name: raw.to_string(), is_roster_member: false };
        }

        // 1. Exact canonical match, case-insensitive.
        for entry in &self.entries {
            if entry.canonical.eq_ignore_ascii_case(raw) {
                return hit(&entry.canonical);
            }
        }

        // 2. Nickname match, case-insensitive. Ambiguity is broken by
        // the longest name (canonical or nickname) the candidate owns,
        // then lexicographic canonical order.
        let mut nickname_hits: Vec<&RosterEntry> = self
            .entries
            .iter()
            .filter(|e| e.nicknames.iter().any(|n| n.eq_ignore_ascii_case(raw)))
            .collect();
        if nickname_hits.len() > 1 {
            nickname_hits.sort_by(|a, b| {
                longest_name(b)
                    .cmp(&longest_name(a))
                    .then_with(|| a.canonical.cmp(&b.canonical))
            });
        }
        if let Some(entry) = nickname_hits.first() {
            return hit(&entry.canonical);
        }

        // 3. Fuzzy match over canonical names and nicknames with
        // confusables folded. Requires a unique qualifying player.
        let folded_raw = fold_confusables(raw);
        let budget = (raw.chars().count() / 4).min(2);
        let mut fuzzy_hit: Option<&RosterEntry> = None;
        for entry in &self.entries {
            let qualifies = std::iter::once(&entry.canonical)
                .chain(entry.nicknames.iter())
                .any(|name| edit_distance(&folded_raw, &fold_confusables(name)) <= budget);
            if qualifies {
                match fuzzy_hit {
                    None => fuzzy_hit = Some(entry),
                    // Two distinct players qualify: give up.
                    Some(prev) if prev.canonical != entry.canonical => {
                        return miss(raw);
                    }
                    Some(_) => {}
                }
            }
        }
        if let Some(entry) = fuzzy_hit {
            return hit(&entry.canonical);
        }

        // 4. Miss.
        miss(raw)
    }

    /// Find a roster name embedded in a longer corrupted token.
    /// Returns the owning canonical name of the longest embedded
    /// name of length >= 3. Used by the OCR token parser as a last
    /// resort on tokens the resolver missed.
    pub fn find_embedded_name(&self, token: &str) -> Option<&str> {
        let token_lower = token.to_ascii_lowercase();
        let mut best: Option<(&str, usize)> = None;
        for entry in &self.entries {
            for name in std::iter::once(&entry.canonical).chain(entry.nicknames.iter()) {
                if name.chars().count() >= 3
                    && token_lower.contains(&name.to_ascii_lowercase())
                {
                    let len = name.chars().count();
                    if best.map_or(true, |(_, l)| len > l) {
                        best = Some((entry.canonical.as_str(), len));
                    }
                }
            }
        }
        best.map(|(canonical, _)| canonical)
    }
}

fn hit(canonical: &str) -> Resolution {
    Resolution { name: canonical.to_string(), is_roster_member: true }
}

fn miss(raw: &str) -> Resolution {
    Resolution { name: raw.to_string(), is_roster_member: false }
}

fn longest_name(entry: &RosterEntry) -> usize {
    std::iter::once(&entry.canonical)
        .chain(entry.nicknames.iter())
        .map(|n| n.chars().count())
        .max()
        .unwrap_or(0)
}

/// Lowercase and fold the digit shapes OCR most often substitutes for
/// letters: 0->o, 1->l, 5->s, 3->e. `i` also folds to `l` so that a
/// `1` read in place of either letter compares equal.
fn fold_confusables(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_ascii_lowercase() {
            '0' => 'o',
            '1' => 'l',
            'i' => 'l',
            '5' => 's',
            '3' => 'e',
            c => c,
        })
        .collect()
}

/// Levenshtein distance; inputs are short player names, so the O(n*m)
/// two-row DP is plenty.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            curr[j + 1] = sub.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Read-through roster cache keyed by guild, invalidated by any roster
/// mutation in that guild. A short TTL bounds staleness from mutations
/// made by the other service process.
pub struct RosterCache {
    inner: RwLock<HashMap<i64, CachedRoster>>,
    ttl: Duration,
}

struct CachedRoster {
    version: u64,
    fetched_at: Instant,
    stale: bool,
    snapshot: Arc<RosterSnapshot>,
}

impl RosterCache {
    pub fn new(ttl: Duration) -> Self {
        Self { inner: RwLock::new(HashMap::new()), ttl }
    }

    /// Return the cached snapshot for `guild_id` if still fresh.
    pub async fn get(&self, guild_id: i64) -> Option<Arc<RosterSnapshot>> {
        let inner = self.inner.read().await;
        inner.get(&guild_id).and_then(|c| {
            (!c.stale && c.fetched_at.elapsed() < self.ttl).then(|| Arc::clone(&c.snapshot))
        })
    }

    /// Store a freshly loaded snapshot.
    pub async fn put(&self, guild_id: i64, snapshot: RosterSnapshot) -> Arc<RosterSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut inner = self.inner.write().await;
        let version = inner.get(&guild_id).map_or(0, |c| c.version + 1);
        inner.insert(
            guild_id,
            CachedRoster {
                version,
                fetched_at: Instant::now(),
                stale: false,
                snapshot: Arc::clone(&snapshot),
            },
        );
        snapshot
    }

    /// Drop the cached snapshot after a roster mutation.
    pub async fn invalidate(&self, guild_id: i64) {
        let mut inner = self.inner.write().await;
        if let Some(c) = inner.get_mut(&guild_id) {
            c.version += 1;
            c.stale = true;
        }
    }
}

impl Default for RosterCache {
    fn default() -> Self {
        // 30s bounds cross-process staleness; in-process mutations
        // invalidate immediately.
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(entries: &[(&str, &[&str])]) -> RosterSnapshot {
        RosterSnapshot::new(
            entries
                .iter()
                .map(|(canonical, nicks)| RosterEntry {
                    canonical: canonical.to_string(),
                    nicknames: nicks.iter().map(|n| n.to_string()).collect(),
                })
                .collect(),
        )
    }

    #[test]
    fn exact_match_is_case_insensitive() {
        let r = roster(&[("Alpha", &[])]);
        assert_eq!(r.resolve("alpha"), Resolution { name: "Alpha".into(), is_roster_member: true });
    }

    #[test]
    fn nickname_match_returns_canonical() {
        let r = roster(&[("Alpha", &["Alph"])]);
        let res = r.resolve("alph");
        assert!(res.is_roster_member);
        assert_eq!(res.name, "Alpha");
    }

    #[test]
    fn ambiguous_nickname_prefers_longest_name() {
        // Both own the nickname "Ace"; Bartholomew's canonical name is longer.
        let r = roster(&[("Bo", &["Ace"]), ("Bartholomew", &["Ace"])]);
        let res = r.resolve("ace");
        assert!(res.is_roster_member);
        assert_eq!(res.name, "Bartholomew");
    }

    #[test]
    fn ambiguous_nickname_tie_breaks_lexicographically() {
        let r = roster(&[("Zed", &["Ace"]), ("Ann", &["Ace"])]);
        assert_eq!(r.resolve("ace").name, "Ann");
    }

    #[test]
    fn fuzzy_folds_digit_confusables() {
        let r = roster(&[("Willow", &[])]);
        let res = r.resolve("Wi11ow");
        assert!(res.is_roster_member);
        assert_eq!(res.name, "Willow");
    }

    #[test]
    fn fuzzy_respects_length_budget() {
        // len("Bob") / 4 == 0, so only a folded-exact match qualifies.
        let r = roster(&[("Bob", &[])]);
        assert!(!r.resolve("Bab").is_roster_member);
        // "B0b" folds straight to "bob".
        assert!(r.resolve("B0b").is_roster_member);
    }

    #[test]
    fn fuzzy_requires_unique_candidate() {
        let r = roster(&[("Marlo", &[]), ("Marla", &[])]);
        // One edit away from both; ambiguous, so a miss.
        let res = r.resolve("Marle");
        assert!(!res.is_roster_member);
        assert_eq!(res.name, "Marle");
    }

    #[test]
    fn miss_echoes_input() {
        let r = roster(&[("Alpha", &[])]);
        let res = r.resolve("Stranger");
        assert!(!res.is_roster_member);
        assert_eq!(res.name, "Stranger");
    }

    #[test]
    fn embedded_name_prefers_longest() {
        let r = roster(&[("Ann", &[]), ("Annabel", &[])]);
        assert_eq!(r.find_embedded_name("xxannabelxx"), Some("Annabel"));
        assert_eq!(r.find_embedded_name("zq"), None);
    }

    #[tokio::test]
    async fn cache_round_trip_and_invalidation() {
        let cache = RosterCache::new(Duration::from_secs(60));
        assert!(cache.get(1).await.is_none());

        cache.put(1, roster(&[("Alpha", &[])])).await;
        assert!(cache.get(1).await.is_some());
        // Other guilds are unaffected.
        assert!(cache.get(2).await.is_none());

        cache.invalidate(1).await;
        assert!(cache.get(1).await.is_none());
    }
}
