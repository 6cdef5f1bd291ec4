//! Detection of boundary changes. A boundary is crossed when the set of workspaces, the set of
//! repository heads or the branch tracking flag changes; every crossing closes the tracked
//! interval and opens a new one.

pub mod probe;
pub mod watcher;
