//! In-memory scope and page registry.
//!
//! ## Locking
//!
//! Scopes and pages live in two sharded maps. A mutation locks only the shard
//! holding its key, so edits to unrelated scopes never serialize. Code never
//! holds a scope guard while acquiring a page guard; the reverse nesting
//! (reading scopes while a page shard is read-locked) is the only one allowed.
//!
//! ## Membership cache
//!
//! A page belongs to every scope whose patterns match it plus every scope it
//! was explicitly attached to. Pattern-derived membership is cached per page
//! and stamped with the store's pattern epoch; any pattern change bumps the
//! epoch, and stale caches recompute on their next read instead of an eager
//! rescan of all pages.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::models::{NewScope, PageUrl, Scope, ScopeId, ScopePatch};
use crate::pipeline::matcher::PatternSet;
use crate::utils::monotonic_now;

struct ScopeEntry {
    scope: Scope,
    compiled: PatternSet,
    /// Pages crawled on behalf of this scope; `scope.page_count` mirrors its size
    indexed: HashSet<PageUrl>,
}

struct PageEntry {
    title: Option<String>,
    attached: BTreeSet<ScopeId>,
    matched: Option<(u64, BTreeSet<ScopeId>)>,
}

/// A page resolved against a set of scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPage {
    pub url: PageUrl,
    pub title: Option<String>,
    /// The requested scopes this page belongs to
    pub scopes: Vec<ScopeId>,
}

/// Owner of all scopes, their patterns and page membership.
pub struct ScopeStore {
    scopes: DashMap<ScopeId, ScopeEntry>,
    pages: DashMap<PageUrl, PageEntry>,
    epoch: AtomicU64,
}

impl ScopeStore {
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
            pages: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Create a scope. `created_at` and `updated_at` start equal.
    pub fn create(&self, new: NewScope) -> Result<Scope> {
        new.validate()?;
        let compiled = PatternSet::compile(&new.patterns)?;
        let now = Utc::now();
        let scope = Scope {
            id: ScopeId::new(),
            name: new.name.trim().to_string(),
            description: new.description,
            patterns: new.patterns,
            auto_track: new.auto_track,
            page_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.scopes.insert(
            scope.id,
            ScopeEntry {
                scope: scope.clone(),
                compiled,
                indexed: HashSet::new(),
            },
        );
        self.bump_epoch();

        log::info!("Created scope {} ({})", scope.id, scope.name);
        Ok(scope)
    }

    pub fn get(&self, id: ScopeId) -> Result<Scope> {
        self.scopes
            .get(&id)
            .map(|entry| entry.scope.clone())
            .ok_or(AppError::NotFound(id))
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(&id)
    }

    pub fn name_of(&self, id: ScopeId) -> Option<String> {
        self.scopes.get(&id).map(|entry| entry.scope.name.clone())
    }

    /// Apply a partial update atomically; unspecified fields are untouched.
    pub fn update(&self, id: ScopeId, patch: ScopePatch) -> Result<Scope> {
        patch.validate()?;
        let compiled = match patch.patterns.as_set() {
            Some(patterns) => Some(PatternSet::compile(patterns)?),
            None => None,
        };

        let updated = {
            let mut entry = self.scopes.get_mut(&id).ok_or(AppError::NotFound(id))?;
            let scope = &mut entry.scope;

            if let Some(name) = patch.name.as_set() {
                scope.name = name.trim().to_string();
            }
            patch.description.apply_to(&mut scope.description);
            patch.patterns.apply_to(&mut scope.patterns);
            patch.auto_track.apply_to(&mut scope.auto_track);
            scope.updated_at = monotonic_now(scope.updated_at);

            let snapshot = scope.clone();
            if let Some(compiled) = compiled.as_ref() {
                entry.compiled = compiled.clone();
            }
            snapshot
        };

        if compiled.is_some() {
            self.bump_epoch();
        }

        log::info!("Updated scope {} ({})", updated.id, updated.name);
        Ok(updated)
    }

    /// Delete a scope and release pages no other scope owns.
    ///
    /// Returns the released page URLs. Once this returns, `get(id)` fails.
    pub fn delete(&self, id: ScopeId) -> Result<Vec<PageUrl>> {
        let (_, removed) = self.scopes.remove(&id).ok_or(AppError::NotFound(id))?;
        self.bump_epoch();

        for mut page in self.pages.iter_mut() {
            page.attached.remove(&id);
        }
        let released = self.release_unowned();

        log::info!(
            "Deleted scope {} ({}), released {} pages",
            id,
            removed.scope.name,
            released.len()
        );
        Ok(released)
    }

    /// Drop every page that no scope attaches or matches.
    ///
    /// Pattern edits and deletions can leave such pages behind; the caller
    /// owns any per-URL state that should go with them.
    pub fn release_unowned(&self) -> Vec<PageUrl> {
        let candidates: Vec<PageUrl> = self
            .pages
            .iter()
            .filter(|page| page.attached.is_empty())
            .map(|page| page.key().clone())
            .collect();

        let mut released = Vec::new();
        for url in candidates {
            if !self.matched_scopes(&url).is_empty() {
                continue;
            }
            if self
                .pages
                .remove_if(&url, |_, page| page.attached.is_empty())
                .is_some()
            {
                released.push(url);
            }
        }
        released
    }

    /// All scopes, oldest first.
    pub fn list(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.scopes.iter().map(|e| e.scope.clone()).collect();
        scopes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        scopes
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Attach a page to a scope, registering it if new.
    ///
    /// A later title overwrites an earlier one; `None` keeps the existing title.
    pub fn attach_page(&self, id: ScopeId, url: &PageUrl, title: Option<String>) -> Result<()> {
        if !self.contains(id) {
            return Err(AppError::NotFound(id));
        }

        {
            let mut page = self.pages.entry(url.clone()).or_insert_with(|| PageEntry {
                title: None,
                attached: BTreeSet::new(),
                matched: None,
            });
            page.attached.insert(id);
            if title.is_some() {
                page.title = title;
            }
        }

        // A concurrent delete may have swept pages before this attach landed
        if !self.contains(id) {
            self.detach(id, url);
            return Err(AppError::NotFound(id));
        }
        Ok(())
    }

    fn detach(&self, id: ScopeId, url: &PageUrl) {
        let orphaned = match self.pages.get_mut(url) {
            Some(mut page) => {
                page.attached.remove(&id);
                page.attached.is_empty()
            }
            None => false,
        };
        if orphaned && self.matched_scopes(url).is_empty() {
            self.pages.remove_if(url, |_, page| page.attached.is_empty());
        }
    }

    /// Scopes a page belongs to, or None if the page is unknown.
    pub fn membership(&self, url: &PageUrl) -> Option<BTreeSet<ScopeId>> {
        let epoch = self.epoch.load(Ordering::Acquire);

        {
            let page = self.pages.get(url)?;
            if let Some((cached_epoch, matched)) = &page.matched {
                if *cached_epoch == epoch {
                    return Some(matched.union(&page.attached).copied().collect());
                }
            }
        }

        let matched = self.matched_scopes(url);
        let mut page = self.pages.get_mut(url)?;
        let newer_cached = matches!(&page.matched, Some((e, _)) if *e > epoch);
        if !newer_cached {
            page.matched = Some((epoch, matched.clone()));
        }
        Some(matched.union(&page.attached).copied().collect())
    }

    /// Title and membership of a known page.
    pub fn page(&self, url: &PageUrl) -> Option<(Option<String>, BTreeSet<ScopeId>)> {
        let membership = self.membership(url)?;
        let title = self.pages.get(url)?.title.clone();
        Some((title, membership))
    }

    /// Every known page belonging to at least one of `ids`.
    pub fn pages_in_scopes(&self, ids: &[ScopeId]) -> Vec<ScopedPage> {
        let wanted: BTreeSet<ScopeId> = ids.iter().copied().collect();
        if wanted.is_empty() {
            return Vec::new();
        }

        // Snapshot keys so no page guard is held across membership lookups
        let urls: Vec<PageUrl> = self.pages.iter().map(|p| p.key().clone()).collect();

        let mut out = Vec::new();
        for url in urls {
            let Some(membership) = self.membership(&url) else {
                continue;
            };
            let scopes: Vec<ScopeId> = membership.intersection(&wanted).copied().collect();
            if scopes.is_empty() {
                continue;
            }
            let title = self.pages.get(&url).and_then(|p| p.title.clone());
            out.push(ScopedPage { url, title, scopes });
        }
        out.sort_by(|a, b| a.url.cmp(&b.url));
        out
    }

    pub fn page_len(&self) -> usize {
        self.pages.len()
    }

    /// Count a completed crawl toward a scope's pages.
    ///
    /// Returns false when the scope no longer exists, so a result arriving
    /// after deletion is discarded rather than resurrecting the scope.
    pub fn record_indexed(&self, id: ScopeId, url: &PageUrl) -> bool {
        match self.scopes.get_mut(&id) {
            Some(mut entry) => {
                entry.indexed.insert(url.clone());
                entry.scope.page_count = entry.indexed.len();
                true
            }
            None => false,
        }
    }

    /// Scopes with auto-track enabled.
    pub fn auto_tracked(&self) -> Vec<ScopeId> {
        self.scopes
            .iter()
            .filter(|e| e.scope.auto_track)
            .map(|e| *e.key())
            .collect()
    }

    /// Sum of page counts over all scopes.
    pub fn total_page_count(&self) -> usize {
        self.scopes.iter().map(|e| e.scope.page_count).sum()
    }

    fn matched_scopes(&self, url: &PageUrl) -> BTreeSet<ScopeId> {
        self.scopes
            .iter()
            .filter(|e| e.compiled.matches(url.as_str()))
            .map(|e| *e.key())
            .collect()
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for ScopeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn url(s: &str) -> PageUrl {
        PageUrl::parse(s).unwrap()
    }

    fn docs(store: &ScopeStore) -> Scope {
        store
            .create(NewScope::new("Docs").with_patterns(["https://example.com/docs/**"]))
            .unwrap()
    }

    #[test]
    fn test_create_then_get_round_trips() {
        let store = ScopeStore::new();
        let new = NewScope::new("Docs")
            .with_description("Product docs")
            .with_patterns(["https://example.com/docs/**"])
            .auto_track(true);
        let created = store.create(new.clone()).unwrap();
        let fetched = store.get(created.id).unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.name, new.name);
        assert_eq!(fetched.description, new.description);
        assert_eq!(fetched.patterns, new.patterns);
        assert!(fetched.auto_track);
        assert_eq!(fetched.page_count, 0);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let store = ScopeStore::new();
        assert!(matches!(
            store.create(NewScope::new("")),
            Err(AppError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let store = ScopeStore::new();
        let id = ScopeId::new();
        assert!(matches!(store.get(id), Err(AppError::NotFound(_))));
        assert!(matches!(
            store.update(id, ScopePatch::default().name("x")),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(store.delete(id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_partial_update_keeps_unspecified_fields() {
        let store = ScopeStore::new();
        let scope = docs(&store);
        let updated = store
            .update(scope.id, ScopePatch::default().description("New description"))
            .unwrap();

        assert_eq!(updated.name, "Docs");
        assert_eq!(updated.patterns, scope.patterns);
        assert_eq!(updated.description, "New description");
        assert!(updated.updated_at >= scope.updated_at);
        assert_eq!(updated.created_at, scope.created_at);
    }

    #[test]
    fn test_delete_then_get_fails() {
        let store = ScopeStore::new();
        let scope = docs(&store);
        store.delete(scope.id).unwrap();
        assert!(matches!(store.get(scope.id), Err(AppError::NotFound(_))));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_membership_follows_pattern_edits_lazily() {
        let store = ScopeStore::new();
        let scope = docs(&store);
        let page = url("https://example.com/blog/post");
        let other = store.create(NewScope::new("Holder")).unwrap();
        store.attach_page(other.id, &page, None).unwrap();

        assert!(!store.membership(&page).unwrap().contains(&scope.id));

        store
            .update(
                scope.id,
                ScopePatch::default().patterns(["https://example.com/blog/*"]),
            )
            .unwrap();
        assert!(store.membership(&page).unwrap().contains(&scope.id));

        store
            .update(scope.id, ScopePatch::default().patterns(Vec::<String>::new()))
            .unwrap();
        assert!(!store.membership(&page).unwrap().contains(&scope.id));
    }

    #[test]
    fn test_pages_in_scopes_unions_requested_scopes() {
        let store = ScopeStore::new();
        let docs_scope = docs(&store);
        let blog = store
            .create(NewScope::new("Blog").with_patterns(["https://example.com/blog/*"]))
            .unwrap();
        let api = url("https://example.com/docs/api");
        let post = url("https://example.com/blog/post");
        store.attach_page(docs_scope.id, &api, Some("API".into())).unwrap();
        store.attach_page(blog.id, &post, None).unwrap();

        let only_docs = store.pages_in_scopes(&[docs_scope.id]);
        assert_eq!(only_docs.len(), 1);
        assert_eq!(only_docs[0].url, api);
        assert_eq!(only_docs[0].title.as_deref(), Some("API"));

        let both = store.pages_in_scopes(&[docs_scope.id, blog.id]);
        assert_eq!(both.len(), 2);
        assert!(store.pages_in_scopes(&[]).is_empty());
    }

    #[test]
    fn test_delete_releases_only_exclusive_pages() {
        let store = ScopeStore::new();
        let docs_scope = docs(&store);
        let mirror = store
            .create(NewScope::new("Mirror").with_patterns(["https://example.com/docs/shared"]))
            .unwrap();
        let exclusive = url("https://example.com/docs/api");
        let shared = url("https://example.com/docs/shared");
        store.attach_page(docs_scope.id, &exclusive, None).unwrap();
        store.attach_page(docs_scope.id, &shared, None).unwrap();

        let released = store.delete(docs_scope.id).unwrap();
        assert_eq!(released, vec![exclusive.clone()]);
        assert!(store.membership(&exclusive).is_none());
        assert_eq!(
            store.membership(&shared).unwrap(),
            BTreeSet::from([mirror.id])
        );
    }

    #[test]
    fn test_deleting_last_matching_scope_releases_page() {
        let store = ScopeStore::new();
        let holder = store.create(NewScope::new("Holder")).unwrap();
        let docs_scope = docs(&store);
        let page = url("https://example.com/docs/api");
        store.attach_page(holder.id, &page, None).unwrap();

        assert!(store.delete(holder.id).unwrap().is_empty());
        assert_eq!(
            store.membership(&page).unwrap(),
            BTreeSet::from([docs_scope.id])
        );

        assert_eq!(store.delete(docs_scope.id).unwrap(), vec![page.clone()]);
        assert_eq!(store.page_len(), 0);
        assert!(store.membership(&page).is_none());
    }

    #[test]
    fn test_pattern_edit_leaves_unowned_pages_releasable() {
        let store = ScopeStore::new();
        let holder = store.create(NewScope::new("Holder")).unwrap();
        let docs_scope = docs(&store);
        let page = url("https://example.com/docs/api");
        store.attach_page(holder.id, &page, None).unwrap();
        store.delete(holder.id).unwrap();

        assert!(store.release_unowned().is_empty());
        store
            .update(
                docs_scope.id,
                ScopePatch::default().patterns(["https://example.com/blog/*"]),
            )
            .unwrap();
        assert_eq!(store.release_unowned(), vec![page]);
        assert_eq!(store.page_len(), 0);
    }

    #[test]
    fn test_attach_to_missing_scope_fails() {
        let store = ScopeStore::new();
        let page = url("https://example.com/a");
        assert!(matches!(
            store.attach_page(ScopeId::new(), &page, None),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.page_len(), 0);
    }

    #[test]
    fn test_record_indexed_counts_distinct_pages() {
        let store = ScopeStore::new();
        let scope = docs(&store);
        let page = url("https://example.com/docs/api");

        assert!(store.record_indexed(scope.id, &page));
        assert!(store.record_indexed(scope.id, &page));
        assert_eq!(store.get(scope.id).unwrap().page_count, 1);
        assert_eq!(store.total_page_count(), 1);

        store.delete(scope.id).unwrap();
        assert!(!store.record_indexed(scope.id, &page));
        assert!(store.get(scope.id).is_err());
    }

    #[test]
    fn test_concurrent_updates_do_not_interleave() {
        let store = Arc::new(ScopeStore::new());
        let scope = docs(&store);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let tag = format!("writer-{i}");
                        store
                            .update(
                                scope.id,
                                ScopePatch::default().name(tag.clone()).description(tag),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Both fields always come from the same writer
        let final_scope = store.get(scope.id).unwrap();
        assert_eq!(final_scope.name, final_scope.description);
    }
}
