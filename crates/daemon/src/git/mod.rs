// Git sync: command worker, commit messages, failure hints, orchestration.

pub mod hint;
pub mod message;
pub mod orchestrator;
pub mod worker;

#[cfg(test)]
pub(crate) mod mock;
