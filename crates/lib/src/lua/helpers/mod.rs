//! Helper tables exposed under the `kiln` global.

pub mod path;
