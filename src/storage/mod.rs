//! Scope and page storage.
//!
//! All state is in memory and scoped to one process. The store is shared
//! behind an `Arc` by the crawl coordinator, the query orchestrator and the
//! service facade.
//!
//! ```text
//! ScopeStore
//! ├── scopes   ScopeId -> Scope + compiled patterns + indexed pages
//! └── pages    PageUrl -> title + explicit attachments + membership cache
//! ```

pub mod scopes;

pub use scopes::{ScopeStore, ScopedPage};
