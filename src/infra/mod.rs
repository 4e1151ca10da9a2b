pub mod git;
pub mod llm;

pub use git::GitCli;
pub use llm::ChatCompletionClient;
