mod git;

pub use git::GitAdapter;
