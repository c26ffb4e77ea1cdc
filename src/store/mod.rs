pub mod backend;
pub mod local;
pub mod object;
pub mod types;

pub use backend::{join_id, ChildStream, ContentStream, StoreAdapter};
pub use local::LocalStore;
pub use object::ObjectStore;
pub use types::*;
