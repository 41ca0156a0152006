use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GatherConfigError {
    #[error(transparent)]
    #[diagnostic(code(gather_config::error))]
    ConfigError(#[from] config::ConfigError),

    /// A configured value couldn't be parsed into the option's type.
    #[error("invalid value for `{0}` in configuration: {1}")]
    #[diagnostic(
        code(gather_config::invalid_value),
        help("Check your gatherrc.toml files and GATHER_CONFIG_* environment variables.")
    )]
    InvalidValue(String, String),
}
