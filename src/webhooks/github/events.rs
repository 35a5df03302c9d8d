use serde::Deserialize;

mod issue_comment;
mod issues;

pub use issue_comment::*;
pub use issues::*;

#[derive(Debug, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct Issue {
    pub number: u64,
    // absent on comment payloads in our fixtures, and `null` when an issue is opened without a
    // description
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
}
