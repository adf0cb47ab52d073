use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("command template: {0}")]
    Template(String),
    #[error("no {what} command configured for {project}")]
    MissingCommand { project: String, what: &'static str },
    #[error("quirk `{name}`: {reason}")]
    Quirk { name: String, reason: String },
}
