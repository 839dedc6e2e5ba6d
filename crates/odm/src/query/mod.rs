//! Collection query compilation.
//!
//! A [`CollectionQuery`] carries generic filter, sort, paging, projection and full-text
//! parameters. [`Collection::get_collection`] validates them against the class schema,
//! compiles them into a [`Search`] and executes it, returning a [`CollectionResponse`].

mod collection;
mod response;
mod search;

pub use collection::{Collection, CollectionQuery, MATCH_ALL};
pub use response::{CollectionResponse, Hits, ResultMeta};
pub use search::Search;

pub(crate) use collection::validate_fields;
