use miette::Diagnostic;
use mdlive_sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Unable to create an execution context: {0}")]
    #[diagnostic(
        code(mdlive::sandbox),
        help("Check the time limit, memory limit and granted capabilities.")
    )]
    Sandbox(#[from] SandboxError),
}
