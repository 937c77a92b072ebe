// autosync-common: ignore rules, path normalization and shared outcome types.

pub mod ignore;
pub mod path;
pub mod types;
