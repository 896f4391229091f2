//! Lazy cursors over OPEN parameters/capabilities, AS paths (with AS4
//! merge), MP prefixes, and communities (spec §3 "Iterators" row).

pub mod aspath;
pub mod community;
pub mod params;
pub mod prefix;

pub use aspath::AsPathView;
pub use community::{iterate_communities, CommunityWord, WellKnownCommunity};
pub use params::{iterate_capabilities, Capability, ParamIter};
pub use prefix::{iterate_prefixes, Prefix, PrefixSource};
