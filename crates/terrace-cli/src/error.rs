use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as JSON")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("import address must look like ADDRESS=ID, got \"{raw}\"")]
    ImportSyntax { raw: String },
    #[error(transparent)]
    Address(#[from] terrace_domain::AddressError),
    #[error(transparent)]
    Import(#[from] terrace_engine::ImportError),
    #[error(transparent)]
    Context(#[from] terrace_engine::ContextError),
    #[error(transparent)]
    Report(#[from] terrace_report::ReportError),
}
