pub mod github;
pub mod llm;
pub mod outline;
pub mod publisher;
pub mod workflow;

#[cfg(test)]
pub mod testing;
