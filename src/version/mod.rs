//! Version tokens: packing primitives, ACL resolution, URI mapping and the
//! token encoder/decoder.

pub mod acl;
pub mod codec;
pub mod token;
pub mod uri;

pub use acl::{AclPair, AclPolicy, FAIL_CLOSED_PRINCIPAL};
pub use token::{decode_version, AmbiguityFlag, PathAttribute, Version, VersionEncoder};
pub use uri::UriMapping;
